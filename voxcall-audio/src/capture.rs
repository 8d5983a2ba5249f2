//! Microphone capture with cpal
//!
//! The device callback downmixes to mono, resamples to the pipeline rate,
//! then fans out to the tap buffer (activity detection) and the window
//! accumulator (recording segments). The stream itself is gated by two
//! atomics so arming and window capture can be toggled without rebuilding
//! the stream.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::buffer::CircularBuffer;
use crate::error::{AudioError, Result};
use crate::resampler::Resampler;
use crate::window::{AudioSegment, WindowAccumulator};
use crate::AudioConfig;

/// Audio device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
    pub max_input_channels: u16,
    pub default_sample_rate: u32,
}

/// Cloneable consumer handle for the tap buffer
///
/// Lets the activity-detector task drain the tap after the capture itself
/// has been moved into the call engine.
#[derive(Clone)]
pub struct TapReader {
    tap: Arc<Mutex<CircularBuffer>>,
}

impl TapReader {
    /// Drain all samples currently in the tap
    pub fn drain(&self) -> Vec<f32> {
        self.tap.lock().read_all()
    }
}

/// Microphone capture with an acquire/arm/window/release lifecycle
pub struct AudioCapture {
    config: AudioConfig,
    tap: Arc<Mutex<CircularBuffer>>,
    accumulator: Arc<Mutex<WindowAccumulator>>,
    stream: Option<Stream>,
    is_live: Arc<AtomicBool>,
    windows_enabled: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
    host: Host,
    device: Option<Device>,
    segment_tx: mpsc::UnboundedSender<AudioSegment>,
    segment_rx: Option<mpsc::UnboundedReceiver<AudioSegment>>,
    resampler: Arc<Mutex<Option<Resampler>>>,
    resample_buffer: Arc<Mutex<Vec<f32>>>,
}

impl AudioCapture {
    /// Create new capture instance. Does not touch the device.
    pub fn new(config: AudioConfig) -> Result<Self> {
        config.validate()?;

        let host = cpal::default_host();

        let tap_capacity = (config.tap_duration * config.sample_rate as f32) as usize;
        let tap = Arc::new(Mutex::new(CircularBuffer::new(tap_capacity)));

        let accumulator = Arc::new(Mutex::new(WindowAccumulator::new(
            config.window_duration,
            config.sample_rate,
        )?));

        let (segment_tx, segment_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            tap,
            accumulator,
            stream: None,
            is_live: Arc::new(AtomicBool::new(false)),
            windows_enabled: Arc::new(AtomicBool::new(false)),
            released: Arc::new(AtomicBool::new(false)),
            host,
            device: None,
            segment_tx,
            segment_rx: Some(segment_rx),
            resampler: Arc::new(Mutex::new(None)),
            resample_buffer: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// List all available input devices
    pub fn list_devices() -> Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        let default_input = host.default_input_device();

        for (index, device) in host
            .input_devices()
            .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?
            .enumerate()
        {
            let name = device
                .name()
                .unwrap_or_else(|_| format!("Unknown Device {}", index));

            let is_default = default_input
                .as_ref()
                .and_then(|d| d.name().ok())
                .map(|n| n == name)
                .unwrap_or(false);

            let (max_input_channels, default_sample_rate) =
                if let Ok(config) = device.default_input_config() {
                    (config.channels(), config.sample_rate().0)
                } else {
                    (0, 0)
                };

            devices.push(DeviceInfo {
                index,
                name,
                is_default,
                max_input_channels,
                default_sample_rate,
            });
        }

        Ok(devices)
    }

    /// Open the microphone and build the (paused) input stream
    ///
    /// Fails with `PermissionDenied` when no input device is available or
    /// the stream cannot be built; nothing is held on failure.
    pub fn acquire(&mut self) -> Result<()> {
        if self.released.load(Ordering::Relaxed) {
            return Err(AudioError::Released);
        }

        if self.stream.is_some() {
            debug!("Capture already acquired");
            return Ok(());
        }

        let device = if let Some(index) = self.config.device_index {
            let mut devices = self
                .host
                .input_devices()
                .map_err(|e| AudioError::device(format!("Failed to enumerate devices: {}", e)))?;
            devices
                .nth(index)
                .ok_or_else(|| AudioError::device(format!("Device index {} not found", index)))?
        } else {
            self.host.default_input_device().ok_or_else(|| {
                AudioError::permission_denied("No input device available")
            })?
        };

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported_config = device.default_input_config().map_err(|e| {
            AudioError::permission_denied(format!("Failed to get device config: {}", e))
        })?;

        let source_sample_rate = supported_config.sample_rate().0;
        let source_channels = supported_config.channels();

        info!(
            "Acquired input device: {} ({} Hz, {} ch -> {} Hz mono)",
            device_name, source_sample_rate, source_channels, self.config.sample_rate
        );

        self.tap.lock().clear();
        self.accumulator.lock().clear();
        self.resample_buffer.lock().clear();

        if source_sample_rate != self.config.sample_rate {
            let resampler = Resampler::new(source_sample_rate, self.config.sample_rate, 1)?;
            *self.resampler.lock() = Some(resampler);
        } else {
            *self.resampler.lock() = None;
        }

        let stream_config = StreamConfig {
            channels: source_channels,
            sample_rate: cpal::SampleRate(source_sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.config.blocksize as u32),
        };

        let tap = Arc::clone(&self.tap);
        let accumulator = Arc::clone(&self.accumulator);
        let is_live = Arc::clone(&self.is_live);
        let windows_enabled = Arc::clone(&self.windows_enabled);
        let resampler = Arc::clone(&self.resampler);
        let resample_buffer = Arc::clone(&self.resample_buffer);
        let segment_tx = self.segment_tx.clone();

        let resample_chunk_size = (source_sample_rate as f32 * 0.1) as usize;

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_live.load(Ordering::Relaxed) {
                        return;
                    }

                    // First channel only. Averaging would halve amplitude
                    // when the mic is wired into one channel.
                    let mono: Vec<f32> = if source_channels > 1 {
                        data.chunks(source_channels as usize)
                            .map(|frame| frame[0])
                            .collect()
                    } else {
                        data.to_vec()
                    };

                    let mut audio = mono;
                    if resampler.lock().is_some() {
                        let mut resample_buf = resample_buffer.lock();
                        resample_buf.extend_from_slice(&audio);

                        if resample_buf.len() >= resample_chunk_size {
                            let chunk: Vec<f32> =
                                resample_buf.drain(..resample_chunk_size).collect();
                            drop(resample_buf);

                            match resampler.lock().as_mut() {
                                Some(r) => match r.process(&chunk) {
                                    Ok(resampled) => audio = resampled,
                                    Err(e) => {
                                        warn!("Resampling error: {}", e);
                                        return;
                                    }
                                },
                                None => return,
                            }
                        } else {
                            return;
                        }
                    }

                    let written = tap.lock().write(&audio);
                    if written < audio.len() {
                        trace!("Tap full, dropped {} samples", audio.len() - written);
                    }

                    if windows_enabled.load(Ordering::Relaxed) {
                        let segments = {
                            let mut acc = accumulator.lock();
                            acc.push(&audio)
                        };
                        match segments {
                            Ok(segments) => {
                                for segment in segments {
                                    if segment_tx.send(segment).is_err() {
                                        trace!("Segment receiver dropped");
                                    }
                                }
                            }
                            Err(e) => warn!("Window finalization failed: {}", e),
                        }
                    }
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| {
                AudioError::permission_denied(format!("Failed to build input stream: {}", e))
            })?;

        // Hold the stream paused until arm(). Some backends do not support
        // pausing; the is_live gate covers those.
        if let Err(e) = stream.pause() {
            debug!("Stream pause unsupported, relying on live gate: {}", e);
        }

        self.stream = Some(stream);
        self.device = Some(device);

        Ok(())
    }

    /// Start the live stream; the tap begins filling
    pub fn arm(&mut self) -> Result<()> {
        if self.released.load(Ordering::Relaxed) {
            return Err(AudioError::Released);
        }

        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| AudioError::stream("Capture not acquired"))?;

        stream
            .play()
            .map_err(|e| AudioError::stream(format!("Failed to start stream: {}", e)))?;

        self.is_live.store(true, Ordering::Relaxed);
        info!("Capture armed");

        Ok(())
    }

    /// Enable bounded recording windows (idempotent)
    pub fn start_windows(&mut self) -> Result<()> {
        if self.released.load(Ordering::Relaxed) {
            return Err(AudioError::Released);
        }

        if self.windows_enabled.swap(true, Ordering::Relaxed) {
            return Ok(());
        }

        // Drop any stale partial so the first window starts clean
        self.accumulator.lock().clear();
        debug!("Recording windows enabled");

        Ok(())
    }

    /// Release the device. Idempotent; safe to call from any state.
    pub fn release(&mut self) {
        if self.released.swap(true, Ordering::Relaxed) {
            return;
        }

        self.is_live.store(false, Ordering::Relaxed);
        self.windows_enabled.store(false, Ordering::Relaxed);

        if let Some(stream) = self.stream.take() {
            drop(stream);
        }
        self.device = None;

        info!("Capture released");
    }

    /// Whether release() has run
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }

    /// Whether the live stream is running
    pub fn is_live(&self) -> bool {
        self.is_live.load(Ordering::Relaxed)
    }

    /// Drain the tap buffer (activity-detector side)
    pub fn read_tap(&self) -> Vec<f32> {
        self.tap.lock().read_all()
    }

    /// Consumer handle for the tap buffer
    pub fn tap_reader(&self) -> TapReader {
        TapReader {
            tap: Arc::clone(&self.tap),
        }
    }

    /// Take the receiver of finalized segments (single consumer)
    pub fn take_segments(&mut self) -> Option<mpsc::UnboundedReceiver<AudioSegment>> {
        self.segment_rx.take()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_creation_is_inert() {
        let capture = AudioCapture::new(AudioConfig::default()).unwrap();
        assert!(!capture.is_live());
        assert!(!capture.is_released());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut capture = AudioCapture::new(AudioConfig::default()).unwrap();
        capture.release();
        assert!(capture.is_released());
        capture.release();
        assert!(capture.is_released());
    }

    #[test]
    fn test_operations_fail_after_release() {
        let mut capture = AudioCapture::new(AudioConfig::default()).unwrap();
        capture.release();
        assert!(matches!(capture.acquire(), Err(AudioError::Released)));
        assert!(matches!(capture.arm(), Err(AudioError::Released)));
        assert!(matches!(capture.start_windows(), Err(AudioError::Released)));
    }

    #[test]
    fn test_take_segments_single_consumer() {
        let mut capture = AudioCapture::new(AudioConfig::default()).unwrap();
        assert!(capture.take_segments().is_some());
        assert!(capture.take_segments().is_none());
    }
}
