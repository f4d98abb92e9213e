//! Audio output using cpal
//!
//! Manages the output device and render stream. The render callback pulls
//! frames from the synth mixer; master volume is applied here so a volume
//! change takes effect atomically for every sounding and future voice.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use chimes_common::{Error, Result};

use super::synth::AudioFrame;

/// Preferred sample rate for synthesis
const PREFERRED_SAMPLE_RATE: u32 = 44_100;

/// Audio output manager
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    volume: Arc<Mutex<f32>>,
}

impl AudioOutput {
    /// Open an output device.
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    /// - `volume`: Shared master volume, applied in the render callback
    ///
    /// # Errors
    /// `Error::AudioUnavailable` when no device can be opened; the engine
    /// treats that as a signal to run silently.
    ///
    /// # Fallback Behavior
    /// A named device that cannot be found falls back to the default device.
    pub fn new(device_name: Option<String>, volume: Arc<Mutex<f32>>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name.as_ref() {
            Some(name) => {
                let found = host
                    .output_devices()
                    .map_err(|e| Error::AudioUnavailable(format!("cannot enumerate devices: {}", e)))?
                    .find(|d| d.name().ok().as_deref() == Some(name));
                match found {
                    Some(device) => {
                        info!("Using requested audio device: {}", name);
                        device
                    }
                    None => {
                        warn!("Audio device '{}' not found, falling back to default", name);
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioUnavailable(format!(
                                "device '{}' not found and no default device",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioUnavailable("no default output device".to_string()))?,
        };

        let (config, sample_format) = Self::best_config(&device)?;
        debug!(
            "Audio config: rate={}, channels={}, format={:?}",
            config.sample_rate.0, config.channels, sample_format
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
            volume,
        })
    }

    /// Pick the closest supported configuration to 44.1 kHz stereo f32
    fn best_config(device: &Device) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| Error::AudioUnavailable(format!("cannot query configs: {}", e)))?;

        let preferred = supported.find(|c| {
            c.channels() == 2
                && c.min_sample_rate().0 <= PREFERRED_SAMPLE_RATE
                && c.max_sample_rate().0 >= PREFERRED_SAMPLE_RATE
                && c.sample_format() == SampleFormat::F32
        });

        if let Some(config) = preferred {
            let sample_format = config.sample_format();
            let config = config
                .with_sample_rate(cpal::SampleRate(PREFERRED_SAMPLE_RATE))
                .config();
            return Ok((config, sample_format));
        }

        let fallback = device
            .default_output_config()
            .map_err(|e| Error::AudioUnavailable(format!("cannot get default config: {}", e)))?;
        let sample_format = fallback.sample_format();
        Ok((fallback.config(), sample_format))
    }

    /// Start the render stream.
    ///
    /// The callback runs on the real-time audio thread; it must not block
    /// beyond the short mixer lock.
    pub fn start<F>(&mut self, callback: F) -> Result<()>
    where
        F: FnMut() -> AudioFrame + Send + 'static,
    {
        info!("Starting audio stream");

        let callback = Arc::new(Mutex::new(callback));
        let volume = Arc::clone(&self.volume);

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(callback, volume)?,
            SampleFormat::I16 => self.build_stream_i16(callback, volume)?,
            SampleFormat::U16 => self.build_stream_u16(callback, volume)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("failed to start stream: {}", e)))?;
        self.stream = Some(stream);

        info!("Audio stream started on '{}'", self.device_name());
        Ok(())
    }

    fn build_stream_f32(
        &self,
        callback: Arc<Mutex<dyn FnMut() -> AudioFrame + Send + 'static>>,
        volume: Arc<Mutex<f32>>,
    ) -> Result<Stream> {
        let channels = self.config.channels as usize;
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut callback = callback.lock().unwrap();
                    let volume = *volume.lock().unwrap();
                    for frame in data.chunks_mut(channels) {
                        let mut audio = callback();
                        audio.apply_volume(volume);
                        audio.clamp();
                        frame[0] = audio.left;
                        if channels > 1 {
                            frame[1] = audio.right;
                        }
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))
    }

    fn build_stream_i16(
        &self,
        callback: Arc<Mutex<dyn FnMut() -> AudioFrame + Send + 'static>>,
        volume: Arc<Mutex<f32>>,
    ) -> Result<Stream> {
        let channels = self.config.channels as usize;
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut callback = callback.lock().unwrap();
                    let volume = *volume.lock().unwrap();
                    for frame in data.chunks_mut(channels) {
                        let mut audio = callback();
                        audio.apply_volume(volume);
                        audio.clamp();
                        frame[0] = (audio.left * i16::MAX as f32) as i16;
                        if channels > 1 {
                            frame[1] = (audio.right * i16::MAX as f32) as i16;
                        }
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))
    }

    fn build_stream_u16(
        &self,
        callback: Arc<Mutex<dyn FnMut() -> AudioFrame + Send + 'static>>,
        volume: Arc<Mutex<f32>>,
    ) -> Result<Stream> {
        let channels = self.config.channels as usize;
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    let mut callback = callback.lock().unwrap();
                    let volume = *volume.lock().unwrap();
                    for frame in data.chunks_mut(channels) {
                        let mut audio = callback();
                        audio.apply_volume(volume);
                        audio.clamp();
                        frame[0] = ((audio.left + 1.0) * 32_767.5) as u16;
                        if channels > 1 {
                            frame[1] = ((audio.right + 1.0) * 32_767.5) as u16;
                        }
                    }
                },
                |err| warn!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("failed to build stream: {}", e)))
    }

    /// Stop and drop the stream
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Failed to pause stream on stop: {}", e);
            }
            drop(stream);
            info!("Audio stream stopped");
        }
    }

    /// Output device name
    pub fn device_name(&self) -> String {
        self.device.name().unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Actual stream sample rate
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_default_device() {
        // Requires audio hardware; absence must surface as AudioUnavailable,
        // never a panic
        let volume = Arc::new(Mutex::new(0.75));
        match AudioOutput::new(None, volume) {
            Ok(output) => assert!(output.sample_rate() > 0),
            Err(Error::AudioUnavailable(_)) => {}
            Err(other) => panic!("unexpected error kind: {}", other),
        }
    }

    #[test]
    fn test_missing_named_device_falls_back() {
        let volume = Arc::new(Mutex::new(0.75));
        match AudioOutput::new(Some("no-such-device-xyz".to_string()), volume) {
            Ok(_) => {}                          // fell back to default
            Err(Error::AudioUnavailable(_)) => {} // headless machine
            Err(other) => panic!("unexpected error kind: {}", other),
        }
    }
}
