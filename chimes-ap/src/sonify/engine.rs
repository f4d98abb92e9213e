//! Sonification engine
//!
//! Consumes transaction records and turns each into a deterministic musical
//! phrase: a primary note from the id hash, harmony notes from the amount,
//! echoes, and (for designated kinds) a percussive burst, all layered over a
//! background drone. Scheduling is sample-accurate through the synth mixer;
//! the engine itself never blocks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use chimes_common::config::{AudioConfig, EngineConfig};
use chimes_common::{ChimesEvent, Error, EventBus, Result, TransactionRecord};

use super::melody;
use super::output::AudioOutput;
use super::style::StyleProfile;
use super::synth::{SynthMixer, DRONE_FADE_OUT_SECS, DRONE_SETTLE_SECS};
use super::voice::{Voice, VoicePriority, VoiceSource};

/// Peak gain of the primary voice
const MAIN_GAIN: f32 = 0.3;

/// Base gain of the first harmony voice; later ones divide by index
const HARMONY_GAIN: f32 = 0.2;

/// Percussive burst gain
const PERCUSSION_GAIN: f32 = 0.15;

/// Percussive burst length
const PERCUSSION_SECS: f32 = 0.25;

/// Echo offsets and their duration/gain scaling
const ECHOES: [(f32, f32, f32); 2] = [(0.5, 0.8, 0.5), (1.0, 0.6, 0.25)];

/// Stagger between successive harmony voices
const HARMONY_STAGGER_SECS: f32 = 0.2;

/// Synthesis rate used until a device reports its own
const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Silent-mode clock tick period
const SILENT_TICK: Duration = Duration::from_millis(50);

/// Sonification engine instance
///
/// Owned by the composition root; lifecycle is bound to `start()`/`stop()`
/// calls, not to process lifetime.
pub struct SonificationEngine {
    mixer: Arc<Mutex<SynthMixer>>,
    volume: Arc<Mutex<f32>>,
    style: Mutex<StyleProfile>,
    events: EventBus,
    voice_cap: usize,
    min_bpm: f32,
    max_bpm: f32,
    throughput_ceiling: u32,
    device: Option<String>,
    running: Arc<AtomicBool>,
    tx_count: AtomicU32,
    /// Stop signal for the thread owning the output stream (cpal streams are
    /// not Send, so the stream never leaves its thread)
    audio_stop: Mutex<Option<mpsc::Sender<()>>>,
    silent_ticker: Mutex<Option<JoinHandle<()>>>,
    audio_notified: AtomicBool,
}

impl SonificationEngine {
    /// Build an engine from configuration.
    ///
    /// # Errors
    /// `Error::Config` when the configured style name is unknown.
    pub fn new(engine: &EngineConfig, audio: &AudioConfig, events: EventBus) -> Result<Self> {
        let style = StyleProfile::by_name(&engine.style)
            .ok_or_else(|| Error::Config(format!("unknown style '{}'", engine.style)))?;
        style.validate()?;

        Ok(Self {
            mixer: Arc::new(Mutex::new(SynthMixer::new(
                engine.voice_cap,
                DEFAULT_SAMPLE_RATE,
            ))),
            volume: Arc::new(Mutex::new(audio.volume.clamp(0.0, 1.0))),
            style: Mutex::new(style),
            events,
            voice_cap: engine.voice_cap,
            min_bpm: engine.min_bpm,
            max_bpm: engine.max_bpm,
            throughput_ceiling: engine.throughput_ceiling,
            device: audio.device.clone(),
            running: Arc::new(AtomicBool::new(false)),
            tx_count: AtomicU32::new(0),
            audio_stop: Mutex::new(None),
            silent_ticker: Mutex::new(None),
            audio_notified: AtomicBool::new(false),
        })
    }

    /// Start the session: open the output stream (or fall back to silent
    /// mode) and fade the drone in. Idempotent while already running.
    pub fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("start() ignored: engine already running");
            return Ok(());
        }

        self.tx_count.store(0, Ordering::SeqCst);
        self.mixer.lock().unwrap().clear();

        let audio_ready = match self.spawn_audio_thread() {
            Ok(stop_tx) => {
                *self.audio_stop.lock().unwrap() = Some(stop_tx);
                true
            }
            Err(e) => {
                self.notify_audio_unavailable(&e);
                false
            }
        };

        if !audio_ready {
            // Silent mode: a timer drives the sample clock so scheduling and
            // pruning behave exactly as with a device.
            let mixer = Arc::clone(&self.mixer);
            let running = Arc::clone(&self.running);
            let handle = tokio::spawn(async move {
                let mut tick = tokio::time::interval(SILENT_TICK);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    let mut mixer = mixer.lock().unwrap();
                    let frames =
                        (mixer.sample_rate() as u64 * SILENT_TICK.as_millis() as u64) / 1000;
                    mixer.advance(frames);
                }
            });
            *self.silent_ticker.lock().unwrap() = Some(handle);
        }

        let style = self.style.lock().unwrap().clone();
        self.mixer
            .lock()
            .unwrap()
            .start_drone(style.base_frequency, style.waveform, 0.0);

        info!(
            "Sonification engine started (style {}, {})",
            style.name,
            if audio_ready { "audio" } else { "silent" }
        );
        Ok(())
    }

    /// Open the output device on its own thread and start the render stream.
    ///
    /// The thread owns the stream for the whole session and tears it down
    /// when the returned stop sender fires (or drops).
    fn spawn_audio_thread(&self) -> Result<mpsc::Sender<()>> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();

        let device = self.device.clone();
        let volume = Arc::clone(&self.volume);
        let mixer = Arc::clone(&self.mixer);
        let voice_cap = self.voice_cap;

        thread::Builder::new()
            .name("chimes-audio".to_string())
            .spawn(move || {
                let mut output = match AudioOutput::new(device, volume) {
                    Ok(output) => output,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Rebuild the mixer at the device rate before any frame is
                // pulled
                let rate = output.sample_rate();
                {
                    let mut mixer = mixer.lock().unwrap();
                    if mixer.sample_rate() != rate {
                        *mixer = SynthMixer::new(voice_cap, rate);
                    }
                }

                let render_mixer = Arc::clone(&mixer);
                if let Err(e) = output.start(move || render_mixer.lock().unwrap().next_frame()) {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(rate));

                // Park until stop; dropping the sender also ends the session
                let _ = stop_rx.recv();
                output.stop();
            })
            .map_err(|e| Error::Internal(format!("cannot spawn audio thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(_rate)) => Ok(stop_tx),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::AudioUnavailable(
                "audio thread exited before reporting".to_string(),
            )),
        }
    }

    /// Stop the session: cancel every pending voice and the drone
    /// immediately. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(stop_tx) = self.audio_stop.lock().unwrap().take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.silent_ticker.lock().unwrap().take() {
            handle.abort();
        }
        self.mixer.lock().unwrap().clear();
        info!("Sonification engine stopped");
    }

    /// Swap the active style.
    ///
    /// Restarts only the drone (fade out, settle, fade back in); voices
    /// already in flight keep sounding under the old profile.
    pub fn set_style(&self, profile: StyleProfile) -> Result<()> {
        profile.validate()?;
        info!("Switching style to {}", profile.name);
        *self.style.lock().unwrap() = profile.clone();

        if self.running.load(Ordering::SeqCst) {
            let mut mixer = self.mixer.lock().unwrap();
            mixer.retire_drones();
            mixer.start_drone(
                profile.base_frequency,
                profile.waveform,
                DRONE_FADE_OUT_SECS + DRONE_SETTLE_SECS,
            );
        }
        Ok(())
    }

    /// Set the master volume; applied atomically to every sounding and
    /// future voice at the output stage.
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        *self.volume.lock().unwrap() = clamped;
        debug!("Volume set to {:.2}", clamped);
    }

    /// Current master volume
    pub fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }

    /// Sonify one record: schedule its voices and emit a note-played event.
    ///
    /// Melodic content is a pure function of the record and the active
    /// style; the same inputs always produce the same phrase.
    pub fn on_transaction(&self, record: &TransactionRecord) {
        if !self.running.load(Ordering::SeqCst) {
            debug!("Ignoring transaction {}: engine stopped", record.id);
            return;
        }

        let count = self.tx_count.fetch_add(1, Ordering::SeqCst) + 1;
        let style = self.style.lock().unwrap().clone();

        let note = melody::primary_note(&record.id, &style);
        let frequency = melody::frequency(style.base_frequency, note);
        let duration = melody::duration_secs(record.kind, record.fee);
        let harmonies = melody::harmony_offsets(record.amount, &style);

        {
            let mut mixer = self.mixer.lock().unwrap();
            let now = mixer.clock();
            let rate = mixer.sample_rate() as f32;
            let frames = move |secs: f32| (secs.max(0.0) * rate) as u64;

            // Primary note
            mixer.schedule(Voice::new(
                VoiceSource::Oscillator {
                    frequency,
                    waveform: style.waveform,
                },
                now,
                frames(duration),
                MAIN_GAIN,
                VoicePriority::Main,
            ));

            // Echoes of the primary note
            for (offset, duration_scale, gain_scale) in ECHOES {
                mixer.schedule(Voice::new(
                    VoiceSource::Oscillator {
                        frequency,
                        waveform: style.waveform,
                    },
                    now + frames(offset),
                    frames(duration * duration_scale),
                    MAIN_GAIN * gain_scale,
                    VoicePriority::Echo,
                ));
            }

            // Harmony notes, staggered
            for (index, semitones) in harmonies.iter().enumerate() {
                mixer.schedule(Voice::new(
                    VoiceSource::Oscillator {
                        frequency: melody::frequency(style.base_frequency, note + semitones),
                        waveform: style.waveform,
                    },
                    now + frames(HARMONY_STAGGER_SECS * (index + 1) as f32),
                    frames(duration * 0.8),
                    HARMONY_GAIN / (index + 1) as f32,
                    VoicePriority::Harmony,
                ));
            }

            // Percussive burst for high-priority kinds
            if melody::has_percussion(record.kind) {
                mixer.schedule(Voice::new(
                    VoiceSource::Noise {
                        cutoff_hz: melody::percussion_cutoff_hz(record.fee),
                    },
                    now,
                    frames(PERCUSSION_SECS),
                    PERCUSSION_GAIN,
                    VoicePriority::Percussion,
                ));
            }
        }

        debug!(
            "Sonified {} {}: note {} ({:.1} Hz), {} harmonies, {:.2} s, tempo {:.0} bpm",
            record.kind.name(),
            record.id,
            note,
            frequency,
            harmonies.len(),
            duration,
            melody::tempo_bpm(count, self.min_bpm, self.max_bpm, self.throughput_ceiling)
        );

        self.events.emit_lossy(ChimesEvent::NotePlayed {
            id: record.id.clone(),
            frequency,
            timestamp: Utc::now(),
        });
    }

    /// Throughput-derived tempo; reported metric only, never a gate
    pub fn tempo_bpm(&self) -> f32 {
        melody::tempo_bpm(
            self.tx_count.load(Ordering::SeqCst),
            self.min_bpm,
            self.max_bpm,
            self.throughput_ceiling,
        )
    }

    /// Transactions processed this session
    pub fn transaction_count(&self) -> u32 {
        self.tx_count.load(Ordering::SeqCst)
    }

    /// Voices currently held (pending and sounding)
    pub fn active_voices(&self) -> usize {
        self.mixer.lock().unwrap().active_voices()
    }

    /// Voices dropped at the cap since engine creation
    pub fn dropped_voices(&self) -> u64 {
        self.mixer.lock().unwrap().dropped_voices()
    }

    /// Whether a session is active
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn notify_audio_unavailable(&self, error: &Error) {
        if !self.audio_notified.swap(true, Ordering::SeqCst) {
            warn!("Audio backend unavailable, running silently: {}", error);
            self.events.emit_lossy(ChimesEvent::AudioUnavailable {
                reason: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

impl Drop for SonificationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimes_common::TxKind;

    fn test_engine() -> SonificationEngine {
        let engine_cfg = EngineConfig::default();
        let audio_cfg = AudioConfig::default();
        SonificationEngine::new(&engine_cfg, &audio_cfg, EventBus::new(256)).unwrap()
    }

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord {
            id: id.to_string(),
            timestamp: 946_684_800_000,
            amount: 12.34,
            kind: TxKind::Payment,
            account: "rSender".to_string(),
            destination: Some("rReceiver".to_string()),
            fee: 12,
            ledger_index: 1,
        }
    }

    #[test]
    fn test_unknown_style_rejected() {
        let mut engine_cfg = EngineConfig::default();
        engine_cfg.style = "polka".to_string();
        let result =
            SonificationEngine::new(&engine_cfg, &AudioConfig::default(), EventBus::new(16));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_transaction_before_start_is_ignored() {
        let engine = test_engine();
        engine.on_transaction(&record("AAAA0000"));
        assert_eq!(engine.transaction_count(), 0);
        assert_eq!(engine.active_voices(), 0);
    }

    #[tokio::test]
    async fn test_burst_never_exceeds_voice_cap() {
        let engine = test_engine();
        engine.start().unwrap();

        for i in 0..50 {
            engine.on_transaction(&record(&format!("{:08X}AB", i)));
            assert!(engine.active_voices() <= 32, "cap exceeded");
        }
        assert_eq!(engine.transaction_count(), 50);
        assert!(engine.dropped_voices() > 0);

        engine.stop();
    }

    #[tokio::test]
    async fn test_stop_cancels_all_voices() {
        let engine = test_engine();
        engine.start().unwrap();
        for i in 0..5 {
            engine.on_transaction(&record(&format!("{:08X}", i)));
        }
        assert!(engine.active_voices() > 0);

        engine.stop();
        assert_eq!(engine.active_voices(), 0);
        assert!(!engine.is_running());

        // A fresh session observes nothing from the prior one
        engine.start().unwrap();
        assert_eq!(engine.active_voices(), 0);
        assert_eq!(engine.transaction_count(), 0);
        engine.stop();
    }

    #[tokio::test]
    async fn test_stop_and_start_are_idempotent() {
        let engine = test_engine();
        engine.stop();
        engine.stop();
        engine.start().unwrap();
        engine.start().unwrap();
        engine.stop();
        engine.stop();
    }

    #[tokio::test]
    async fn test_tempo_tracks_throughput() {
        let engine = test_engine();
        engine.start().unwrap();
        assert_eq!(engine.tempo_bpm(), 80.0);

        for i in 0..15 {
            engine.on_transaction(&record(&format!("{:08X}", i)));
        }
        assert!((engine.tempo_bpm() - 130.0).abs() < 1e-3);

        for i in 15..100 {
            engine.on_transaction(&record(&format!("{:08X}", i)));
        }
        assert_eq!(engine.tempo_bpm(), 180.0);

        engine.stop();
    }

    #[tokio::test]
    async fn test_note_played_event_is_deterministic() {
        let engine = test_engine();
        let mut rx = engine.events.subscribe();
        engine.start().unwrap();

        let rec = record("E3FE6EA3D48F0C2B");
        let style = StyleProfile::techno();
        let expected =
            melody::frequency(style.base_frequency, melody::primary_note(&rec.id, &style));

        engine.on_transaction(&rec);

        loop {
            match rx.recv().await.unwrap() {
                ChimesEvent::NotePlayed { id, frequency, .. } => {
                    assert_eq!(id, rec.id);
                    assert_eq!(frequency, expected);
                    break;
                }
                _ => continue,
            }
        }

        engine.stop();
    }

    #[tokio::test]
    async fn test_set_style_keeps_inflight_voices() {
        let engine = test_engine();
        engine.start().unwrap();
        engine.on_transaction(&record("00FF00FF"));
        let before = engine.active_voices();
        assert!(before > 0);

        engine.set_style(StyleProfile::jazz()).unwrap();
        assert_eq!(engine.active_voices(), before);

        engine.stop();
    }

    #[tokio::test]
    async fn test_set_volume_clamps() {
        let engine = test_engine();
        engine.set_volume(1.5);
        assert_eq!(engine.volume(), 1.0);
        engine.set_volume(-0.3);
        assert_eq!(engine.volume(), 0.0);
        engine.set_volume(0.42);
        assert_eq!(engine.volume(), 0.42);
    }
}
