//! Voxcall Audio Capture
//!
//! Microphone capture for realtime voice calls. Audio flows from the device
//! callback into two consumers:
//!
//! ```text
//! Audio Device (cpal)
//!   │
//!   ├─> CircularBuffer tap (lock-free ringbuf) -> activity detection
//!   │
//!   └─> WindowAccumulator -> fixed-length AudioSegments (WAV) -> transcoding
//! ```
//!
//! Capture has an explicit lifecycle: `acquire()` opens the device,
//! `arm()` starts the live stream, `start_windows()` enables bounded
//! recording windows, and `release()` (idempotent) gives the device back.

pub mod buffer;
pub mod capture;
pub mod error;
pub mod resampler;
pub mod window;

pub use buffer::CircularBuffer;
pub use capture::{AudioCapture, TapReader};
pub use error::{AudioError, Result};
pub use resampler::Resampler;
pub use window::{AudioSegment, WindowAccumulator};

/// Pipeline sample rate (16kHz mono)
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Default audio blocksize (samples per callback)
pub const DEFAULT_BLOCKSIZE: usize = 1024;

/// Audio configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// Target sample rate (default: 16000 Hz)
    pub sample_rate: u32,
    /// Number of channels (default: 1 = mono)
    pub channels: u16,
    /// Samples per callback (default: 1024)
    pub blocksize: usize,
    /// Recording window length in seconds (default: 3.0)
    pub window_duration: f32,
    /// Tap buffer length in seconds (default: 2.0)
    pub tap_duration: f32,
    /// Device index (None = default device)
    pub device_index: Option<usize>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            channels: 1,
            blocksize: DEFAULT_BLOCKSIZE,
            window_duration: 3.0,
            tap_duration: 2.0,
            device_index: None,
        }
    }
}

impl AudioConfig {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }
        if self.channels == 0 {
            return Err(AudioError::invalid_config("Channel count cannot be zero"));
        }
        if self.window_duration <= 0.0 {
            return Err(AudioError::invalid_config(
                "Window duration must be positive",
            ));
        }
        if self.tap_duration <= 0.0 {
            return Err(AudioError::invalid_config("Tap duration must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AudioConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AudioConfig {
            window_duration: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AudioConfig {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
