//! Sonification engine: deterministic melody mapping, voice scheduling,
//! synthesis, and audio output

pub mod engine;
pub mod melody;
pub mod output;
pub mod style;
pub mod synth;
pub mod voice;

pub use engine::SonificationEngine;
pub use style::{StyleProfile, Waveform};
