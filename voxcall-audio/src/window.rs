//! Bounded recording windows
//!
//! Capture never produces an open-ended stream. Samples accumulate into
//! fixed-length windows and every full window is finalized into one
//! immutable `AudioSegment`. At most one window is open at any time.

use std::io::Cursor;
use std::time::Duration;

use crate::error::{AudioError, Result};

/// One finalized recording window
///
/// The payload is a complete WAV file (16-bit PCM mono) so downstream
/// consumers can treat it like any other container the backend might see.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    data: Vec<u8>,
    mime: String,
    sample_rate: u32,
    duration: Duration,
}

impl AudioSegment {
    /// Wrap pre-encoded bytes with a declared container type
    pub fn new(data: Vec<u8>, mime: impl Into<String>, sample_rate: u32, duration: Duration) -> Self {
        Self {
            data,
            mime: mime.into(),
            sample_rate,
            duration,
        }
    }

    /// Encode mono f32 samples into a WAV-containerized segment
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| AudioError::encode(format!("Failed to create WAV writer: {}", e)))?;

            for &sample in samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer
                    .write_sample((clamped * 32767.0) as i16)
                    .map_err(|e| AudioError::encode(format!("Failed to write sample: {}", e)))?;
            }

            writer
                .finalize()
                .map_err(|e| AudioError::encode(format!("Failed to finalize WAV: {}", e)))?;
        }

        let duration = Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64);

        Ok(Self {
            data: cursor.into_inner(),
            mime: "audio/wav".to_string(),
            sample_rate,
            duration,
        })
    }

    /// Encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the segment, returning the encoded bytes
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Declared container type
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Sample rate the window was recorded at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Wall-clock length of the window
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// Accumulates samples into fixed-length windows
///
/// `push()` finalizes every window that fills. `start_window()` finalizes
/// any open window before beginning a new one, so two windows can never be
/// open concurrently.
pub struct WindowAccumulator {
    window_frames: usize,
    sample_rate: u32,
    pending: Vec<f32>,
}

impl WindowAccumulator {
    pub fn new(window_duration: f32, sample_rate: u32) -> Result<Self> {
        if window_duration <= 0.0 {
            return Err(AudioError::invalid_config(
                "Window duration must be positive",
            ));
        }
        if sample_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        let window_frames = (window_duration * sample_rate as f32) as usize;
        if window_frames == 0 {
            return Err(AudioError::invalid_config(
                "Window duration shorter than one frame",
            ));
        }

        Ok(Self {
            window_frames,
            sample_rate,
            pending: Vec::with_capacity(window_frames),
        })
    }

    /// Append samples, finalizing every window that fills
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<AudioSegment>> {
        self.pending.extend_from_slice(samples);

        let mut segments = Vec::new();
        while self.pending.len() >= self.window_frames {
            let window: Vec<f32> = self.pending.drain(..self.window_frames).collect();
            segments.push(AudioSegment::from_samples(&window, self.sample_rate)?);
        }

        Ok(segments)
    }

    /// Begin a fresh window, finalizing the open one if non-empty
    pub fn start_window(&mut self) -> Result<Option<AudioSegment>> {
        if self.pending.is_empty() {
            return Ok(None);
        }

        let window: Vec<f32> = self.pending.drain(..).collect();
        Ok(Some(AudioSegment::from_samples(&window, self.sample_rate)?))
    }

    /// Finalize a partial window, if any
    pub fn flush(&mut self) -> Result<Option<AudioSegment>> {
        self.start_window()
    }

    /// Discard any accumulated samples without finalizing
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Frames currently accumulated in the open window
    pub fn pending_frames(&self) -> usize {
        self.pending.len()
    }

    /// Frames per full window
    pub fn window_frames(&self) -> usize {
        self.window_frames
    }
}
