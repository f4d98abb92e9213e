//! Voice model and capped voice registry
//!
//! A voice is one transient synthesized sound instance: a tone or noise
//! source plus a timed envelope. Voices are owned exclusively by the
//! registry from scheduling until expiry; the registry enforces the
//! concurrent-voice cap so scheduling latency never grows under bursts.

use uuid::Uuid;

use super::style::Waveform;

/// Guard interval kept after a voice's envelope finishes before it is pruned
pub const GUARD_INTERVAL_SECS: f32 = 0.25;

/// Envelope attack length
const ATTACK_SECS: f32 = 0.05;

/// Envelope decay endpoint
const DECAY_END_SECS: f32 = 0.2;

/// Sustain level after decay, as a fraction of peak gain
const SUSTAIN_LEVEL: f32 = 0.7;

/// Release length at the tail of the envelope
const RELEASE_SECS: f32 = 0.1;

/// Release floor treated as silence
const RELEASE_FLOOR: f32 = 0.001;

/// Cap-eviction ordering: lower values are dropped first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VoicePriority {
    Percussion = 0,
    Harmony = 1,
    Echo = 2,
    Main = 3,
}

/// Sound source for a voice
#[derive(Debug, Clone)]
pub enum VoiceSource {
    /// Periodic oscillator at a fixed frequency
    Oscillator { frequency: f32, waveform: Waveform },
    /// Highpass-filtered noise burst
    Noise { cutoff_hz: f32 },
}

/// One scheduled sound instance
#[derive(Debug, Clone)]
pub struct Voice {
    pub id: Uuid,
    pub source: VoiceSource,
    /// Absolute start, in output frames
    pub start_frame: u64,
    /// Envelope length, in output frames
    pub duration_frames: u64,
    /// Peak gain before the master volume
    pub gain: f32,
    pub priority: VoicePriority,
    // Synthesis state, advanced by the mixer
    pub(super) phase: f32,
    pub(super) noise_state: u32,
    pub(super) filter_prev_in: f32,
    pub(super) filter_prev_out: f32,
}

impl Voice {
    pub fn new(
        source: VoiceSource,
        start_frame: u64,
        duration_frames: u64,
        gain: f32,
        priority: VoicePriority,
    ) -> Self {
        let id = Uuid::new_v4();
        // Noise voices get a per-voice generator seed so bursts differ
        let noise_state = id.as_u128() as u32 | 1;
        Self {
            id,
            source,
            start_frame,
            duration_frames,
            gain,
            priority,
            phase: 0.0,
            noise_state,
            filter_prev_in: 0.0,
            filter_prev_out: 0.0,
        }
    }

    /// Frame past which the voice may be pruned (envelope end plus guard)
    pub fn expiry_frame(&self, sample_rate: u32) -> u64 {
        let guard = (GUARD_INTERVAL_SECS * sample_rate as f32) as u64;
        self.start_frame + self.duration_frames + guard
    }

    /// Whether the voice has not yet started sounding
    pub fn is_pending(&self, now_frame: u64) -> bool {
        self.start_frame > now_frame
    }
}

/// Envelope gain at `t` seconds into a voice lasting `duration` seconds.
///
/// Attack 0→1 over 50 ms, decay to 70 % by 200 ms, hold until 100 ms before
/// the end, then an exponential release to silence. Stage boundaries
/// compress proportionally when the duration is too short to fit them.
pub fn envelope_gain(t: f32, duration: f32) -> f32 {
    if t < 0.0 || t >= duration || duration <= 0.0 {
        return 0.0;
    }

    let attack_end = ATTACK_SECS.min(duration * 0.2);
    let decay_end = DECAY_END_SECS.min(duration * 0.4).max(attack_end);
    let release_start = (duration - RELEASE_SECS).max(decay_end);

    if t < attack_end {
        t / attack_end
    } else if t < decay_end {
        1.0 - (1.0 - SUSTAIN_LEVEL) * (t - attack_end) / (decay_end - attack_end)
    } else if t < release_start {
        SUSTAIN_LEVEL
    } else {
        let release_len = duration - release_start;
        let progress = (t - release_start) / release_len;
        SUSTAIN_LEVEL * (RELEASE_FLOOR / SUSTAIN_LEVEL).powf(progress)
    }
}

/// Active-voice registry with a fixed concurrency cap.
///
/// When a new voice would exceed the cap, the lowest-priority pending voice
/// (the newcomer included) is dropped rather than queued.
pub struct VoiceRegistry {
    voices: Vec<Voice>,
    cap: usize,
    dropped: u64,
}

impl VoiceRegistry {
    pub fn new(cap: usize) -> Self {
        Self {
            voices: Vec::with_capacity(cap),
            cap,
            dropped: 0,
        }
    }

    /// Try to admit a voice; returns false when it was dropped at the cap.
    ///
    /// At the cap, the newcomer replaces the lowest-priority pending voice
    /// only when strictly higher priority than it; otherwise the newcomer
    /// itself is the dropped one.
    pub fn admit(&mut self, voice: Voice, now_frame: u64) -> bool {
        if self.voices.len() < self.cap {
            self.voices.push(voice);
            return true;
        }

        let weakest = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_pending(now_frame))
            .min_by_key(|(_, v)| v.priority)
            .map(|(index, v)| (index, v.priority));

        match weakest {
            Some((index, weakest_priority)) if weakest_priority < voice.priority => {
                self.voices[index] = voice;
                self.dropped += 1;
                true
            }
            _ => {
                self.dropped += 1;
                false
            }
        }
    }

    /// Remove voices whose envelope (plus guard) has passed
    pub fn prune(&mut self, now_frame: u64, sample_rate: u32) {
        self.voices
            .retain(|v| v.expiry_frame(sample_rate) > now_frame);
    }

    /// Drop every voice immediately
    pub fn clear(&mut self) {
        self.voices.clear();
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Voices dropped or evicted at the cap since creation
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    pub(super) fn voices_mut(&mut self) -> &mut [Voice] {
        &mut self.voices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(priority: VoicePriority, start_frame: u64) -> Voice {
        Voice::new(
            VoiceSource::Oscillator {
                frequency: 220.0,
                waveform: Waveform::Sine,
            },
            start_frame,
            44_100,
            0.3,
            priority,
        )
    }

    #[test]
    fn test_envelope_shape() {
        let d = 3.0;

        assert_eq!(envelope_gain(-0.1, d), 0.0);
        assert_eq!(envelope_gain(3.0, d), 0.0);
        assert_eq!(envelope_gain(5.0, d), 0.0);

        // Attack ramps linearly to peak
        assert!((envelope_gain(0.025, d) - 0.5).abs() < 1e-3);
        assert!((envelope_gain(0.05, d) - 1.0).abs() < 1e-3);

        // Decay lands on the sustain level
        assert!((envelope_gain(0.2, d) - 0.7).abs() < 1e-3);

        // Hold
        assert!((envelope_gain(1.5, d) - 0.7).abs() < 1e-3);
        assert!((envelope_gain(2.89, d) - 0.7).abs() < 1e-3);

        // Release decays toward silence
        let late = envelope_gain(2.99, d);
        assert!(late < 0.01 && late > 0.0);
    }

    #[test]
    fn test_envelope_monotonic_release() {
        let d = 2.0;
        let mut prev = envelope_gain(1.9, d);
        for i in 1..10 {
            let t = 1.9 + i as f32 * 0.01;
            let g = envelope_gain(t, d);
            assert!(g <= prev);
            prev = g;
        }
    }

    #[test]
    fn test_envelope_short_duration_compresses() {
        // A 0.25 s burst still has a well-formed envelope
        let d = 0.25;
        assert_eq!(envelope_gain(d, d), 0.0);
        let peak_t = d * 0.2;
        assert!((envelope_gain(peak_t, d) - 1.0).abs() < 1e-3);
        for i in 0..25 {
            let t = i as f32 * 0.01;
            let g = envelope_gain(t, d);
            assert!((0.0..=1.0).contains(&g));
        }
    }

    #[test]
    fn test_registry_respects_cap() {
        let mut registry = VoiceRegistry::new(4);
        for _ in 0..10 {
            registry.admit(voice(VoicePriority::Main, 1000), 0);
        }
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.dropped_count(), 6);
    }

    #[test]
    fn test_registry_evicts_lowest_priority_pending() {
        let mut registry = VoiceRegistry::new(2);
        assert!(registry.admit(voice(VoicePriority::Harmony, 1000), 0));
        assert!(registry.admit(voice(VoicePriority::Echo, 1000), 0));

        // Main evicts the pending harmony
        assert!(registry.admit(voice(VoicePriority::Main, 1000), 0));
        assert_eq!(registry.len(), 2);

        // A new harmony cannot displace echo or main
        assert!(!registry.admit(voice(VoicePriority::Harmony, 1000), 0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_registry_never_evicts_sounding_voices() {
        let mut registry = VoiceRegistry::new(1);
        // Already sounding at frame 500
        assert!(registry.admit(voice(VoicePriority::Harmony, 0), 0));
        assert!(!registry.admit(voice(VoicePriority::Main, 1000), 500));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_prune_removes_expired() {
        let sample_rate = 44_100;
        let mut registry = VoiceRegistry::new(8);
        registry.admit(voice(VoicePriority::Main, 0), 0);

        // One-second voice plus guard is gone two seconds in
        registry.prune(sample_rate as u64 / 2, sample_rate);
        assert_eq!(registry.len(), 1);
        registry.prune(2 * sample_rate as u64, sample_rate);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_clear() {
        let mut registry = VoiceRegistry::new(8);
        for _ in 0..5 {
            registry.admit(voice(VoicePriority::Echo, 0), 0);
        }
        registry.clear();
        assert!(registry.is_empty());
    }
}
