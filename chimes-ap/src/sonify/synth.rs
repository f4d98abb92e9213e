//! Sample synthesis and mixing
//!
//! Renders the active voice registry and the drone layer into output frames.
//! One `SynthMixer` lives behind a mutex shared by the scheduling side and
//! the audio callback; all synthesis state (phases, filters, the sample
//! clock) is owned here.

use super::style::Waveform;
use super::voice::{envelope_gain, Voice, VoiceRegistry, VoiceSource};

/// Drone fade-in after `start()` or a style swap
pub const DRONE_FADE_IN_SECS: f32 = 2.0;

/// Drone fade-out on `stop()` or a style swap
pub const DRONE_FADE_OUT_SECS: f32 = 1.0;

/// Settle delay between drone teardown and restart on a style swap
pub const DRONE_SETTLE_SECS: f32 = 0.1;

/// Drone loudness relative to full scale
const DRONE_GAIN: f32 = 0.12;

/// How often the render loop prunes expired voices, in frames
const PRUNE_INTERVAL_FRAMES: u64 = 1024;

/// One stereo output frame
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame {
    pub left: f32,
    pub right: f32,
}

impl AudioFrame {
    /// Silent frame
    pub fn zero() -> Self {
        AudioFrame {
            left: 0.0,
            right: 0.0,
        }
    }

    /// Duplicate a mono sample to both channels
    pub fn from_mono(sample: f32) -> Self {
        AudioFrame {
            left: sample,
            right: sample,
        }
    }

    /// Scale both channels
    pub fn apply_volume(&mut self, volume: f32) {
        self.left *= volume;
        self.right *= volume;
    }

    /// Clamp samples to [-1.0, 1.0] to prevent clipping
    pub fn clamp(&mut self) {
        self.left = self.left.clamp(-1.0, 1.0);
        self.right = self.right.clamp(-1.0, 1.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DroneStage {
    Sounding,
    FadingOut { since_frame: u64 },
}

/// Continuous background tone, independent of per-transaction voices and
/// exempt from the voice cap
struct DroneVoice {
    frequency: f32,
    waveform: Waveform,
    start_frame: u64,
    stage: DroneStage,
    phase: f32,
}

impl DroneVoice {
    fn gain_at(&self, now: u64, sample_rate: u32) -> f32 {
        if now < self.start_frame {
            return 0.0;
        }
        let t = (now - self.start_frame) as f32 / sample_rate as f32;
        let fade_in = (t / DRONE_FADE_IN_SECS).min(1.0);
        let fade_out = match self.stage {
            DroneStage::Sounding => 1.0,
            DroneStage::FadingOut { since_frame } => {
                let out_t = now.saturating_sub(since_frame) as f32 / sample_rate as f32;
                (1.0 - out_t / DRONE_FADE_OUT_SECS).max(0.0)
            }
        };
        DRONE_GAIN * fade_in * fade_out
    }

    fn finished(&self, now: u64, sample_rate: u32) -> bool {
        match self.stage {
            DroneStage::Sounding => false,
            DroneStage::FadingOut { since_frame } => {
                let out_t = now.saturating_sub(since_frame) as f32 / sample_rate as f32;
                out_t >= DRONE_FADE_OUT_SECS
            }
        }
    }
}

/// Voice-registry renderer with a monotonic sample clock
pub struct SynthMixer {
    registry: VoiceRegistry,
    drones: Vec<DroneVoice>,
    sample_rate: u32,
    clock: u64,
}

impl SynthMixer {
    pub fn new(voice_cap: usize, sample_rate: u32) -> Self {
        Self {
            registry: VoiceRegistry::new(voice_cap),
            drones: Vec::new(),
            sample_rate,
            clock: 0,
        }
    }

    /// Current position of the sample clock, in frames
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Convert a relative time to frames at this mixer's rate
    pub fn seconds_to_frames(&self, seconds: f32) -> u64 {
        (seconds.max(0.0) * self.sample_rate as f32) as u64
    }

    /// Admit a voice against the cap; false when it was dropped
    pub fn schedule(&mut self, voice: Voice) -> bool {
        let now = self.clock;
        self.registry.admit(voice, now)
    }

    /// Start a drone `delay_secs` from now with the standard fade-in
    pub fn start_drone(&mut self, frequency: f32, waveform: Waveform, delay_secs: f32) {
        let start_frame = self.clock + self.seconds_to_frames(delay_secs);
        self.drones.push(DroneVoice {
            frequency,
            waveform,
            start_frame,
            stage: DroneStage::Sounding,
            phase: 0.0,
        });
    }

    /// Begin the fade-out on every sounding drone
    pub fn retire_drones(&mut self) {
        let now = self.clock;
        for drone in &mut self.drones {
            if drone.stage == DroneStage::Sounding {
                drone.stage = DroneStage::FadingOut { since_frame: now };
            }
        }
    }

    /// Cancel every pending and sounding voice and the drone immediately
    pub fn clear(&mut self) {
        self.registry.clear();
        self.drones.clear();
    }

    /// Voices currently held by the registry (pending and sounding)
    pub fn active_voices(&self) -> usize {
        self.registry.len()
    }

    /// Voices dropped at the cap since creation
    pub fn dropped_voices(&self) -> u64 {
        self.registry.dropped_count()
    }

    /// Render one output frame and advance the clock
    pub fn next_frame(&mut self) -> AudioFrame {
        let now = self.clock;
        self.clock += 1;

        if now % PRUNE_INTERVAL_FRAMES == 0 {
            self.prune(now);
        }

        let sample_rate = self.sample_rate;
        let mut sample = 0.0f32;

        for voice in self.registry.voices_mut() {
            if voice.start_frame > now || now >= voice.start_frame + voice.duration_frames {
                continue;
            }
            let t = (now - voice.start_frame) as f32 / sample_rate as f32;
            let duration = voice.duration_frames as f32 / sample_rate as f32;
            let env = envelope_gain(t, duration);

            let raw = match voice.source {
                VoiceSource::Oscillator {
                    frequency,
                    waveform,
                } => {
                    let s = osc_sample(waveform, voice.phase);
                    voice.phase = (voice.phase + frequency / sample_rate as f32).fract();
                    s
                }
                VoiceSource::Noise { cutoff_hz } => {
                    let white = next_noise(&mut voice.noise_state);
                    let filtered = highpass(
                        white,
                        cutoff_hz,
                        sample_rate,
                        voice.filter_prev_in,
                        voice.filter_prev_out,
                    );
                    voice.filter_prev_in = white;
                    voice.filter_prev_out = filtered;
                    filtered
                }
            };
            sample += raw * env * voice.gain;
        }

        for drone in &mut self.drones {
            let gain = drone.gain_at(now, sample_rate);
            if gain > 0.0 {
                sample += osc_sample(drone.waveform, drone.phase) * gain;
            }
            if now >= drone.start_frame {
                drone.phase = (drone.phase + drone.frequency / sample_rate as f32).fract();
            }
        }

        let mut frame = AudioFrame::from_mono(sample);
        frame.clamp();
        frame
    }

    /// Advance the clock without rendering (silent mode)
    pub fn advance(&mut self, frames: u64) {
        self.clock += frames;
        let now = self.clock;
        self.prune(now);
    }

    fn prune(&mut self, now: u64) {
        self.registry.prune(now, self.sample_rate);
        let sample_rate = self.sample_rate;
        self.drones.retain(|d| !d.finished(now, sample_rate));
    }
}

/// One oscillator sample at normalized phase [0, 1)
fn osc_sample(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}

/// Linear congruential white-noise step in [-1, 1)
fn next_noise(state: &mut u32) -> f32 {
    *state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
    ((*state >> 8) & 0x00FF_FFFF) as f32 / 8_388_608.0 - 1.0
}

/// One-pole highpass step
fn highpass(input: f32, cutoff_hz: f32, sample_rate: u32, prev_in: f32, prev_out: f32) -> f32 {
    let dt = 1.0 / sample_rate as f32;
    let rc = 1.0 / (std::f32::consts::TAU * cutoff_hz);
    let alpha = rc / (rc + dt);
    alpha * (prev_out + input - prev_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::voice::VoicePriority;

    const SAMPLE_RATE: u32 = 44_100;

    fn test_voice(start_frame: u64, duration_frames: u64) -> Voice {
        Voice::new(
            VoiceSource::Oscillator {
                frequency: 220.0,
                waveform: Waveform::Sine,
            },
            start_frame,
            duration_frames,
            0.3,
            VoicePriority::Main,
        )
    }

    #[test]
    fn test_empty_mixer_renders_silence() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        for _ in 0..100 {
            let frame = mixer.next_frame();
            assert_eq!(frame.left, 0.0);
            assert_eq!(frame.right, 0.0);
        }
        assert_eq!(mixer.clock(), 100);
    }

    #[test]
    fn test_scheduled_voice_sounds_then_expires() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        mixer.schedule(test_voice(0, 4410)); // 100 ms

        let mut heard = false;
        for _ in 0..4410 {
            let frame = mixer.next_frame();
            if frame.left.abs() > 0.0 {
                heard = true;
            }
        }
        assert!(heard);

        // Envelope over: silent output even before pruning
        for _ in 0..100 {
            assert_eq!(mixer.next_frame().left, 0.0);
        }

        // Past the guard interval the voice is pruned
        mixer.advance(SAMPLE_RATE as u64);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_pending_voice_is_silent_until_start() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        mixer.schedule(test_voice(1000, 4410));

        for _ in 0..1000 {
            assert_eq!(mixer.next_frame().left, 0.0);
        }
        let mut heard = false;
        for _ in 0..2000 {
            if mixer.next_frame().left.abs() > 0.0 {
                heard = true;
            }
        }
        assert!(heard);
    }

    #[test]
    fn test_drone_fades_in_and_retires() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        mixer.start_drone(140.0, Waveform::Sawtooth, 0.0);

        let mut heard = false;
        for _ in 0..1000 {
            if mixer.next_frame().left.abs() > 0.0 {
                heard = true;
            }
        }
        assert!(heard);

        mixer.retire_drones();
        // After the full fade-out the drone is pruned
        for _ in 0..(SAMPLE_RATE as usize + PRUNE_INTERVAL_FRAMES as usize + 1) {
            mixer.next_frame();
        }
        for _ in 0..100 {
            assert_eq!(mixer.next_frame().left, 0.0);
        }
    }

    #[test]
    fn test_clear_cancels_everything_immediately() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        mixer.start_drone(140.0, Waveform::Sine, 0.0);
        for _ in 0..8 {
            mixer.schedule(test_voice(0, 44_100));
        }
        for _ in 0..100 {
            mixer.next_frame();
        }

        mixer.clear();
        assert_eq!(mixer.active_voices(), 0);
        for _ in 0..100 {
            assert_eq!(mixer.next_frame().left, 0.0);
        }
    }

    #[test]
    fn test_output_is_clamped() {
        let mut mixer = SynthMixer::new(64, SAMPLE_RATE);
        for _ in 0..40 {
            let mut voice = test_voice(0, 44_100);
            voice.gain = 1.0;
            mixer.schedule(voice);
        }
        for _ in 0..5000 {
            let frame = mixer.next_frame();
            assert!(frame.left >= -1.0 && frame.left <= 1.0);
        }
    }

    #[test]
    fn test_noise_voice_renders() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        mixer.schedule(Voice::new(
            VoiceSource::Noise { cutoff_hz: 3000.0 },
            0,
            4410,
            0.2,
            VoicePriority::Percussion,
        ));
        let mut heard = false;
        for _ in 0..4410 {
            if mixer.next_frame().left.abs() > 0.0 {
                heard = true;
            }
        }
        assert!(heard);
    }

    #[test]
    fn test_advance_prunes_in_silent_mode() {
        let mut mixer = SynthMixer::new(32, SAMPLE_RATE);
        mixer.schedule(test_voice(0, 4410));
        assert_eq!(mixer.active_voices(), 1);

        mixer.advance(SAMPLE_RATE as u64 * 2);
        assert_eq!(mixer.active_voices(), 0);
    }
}
