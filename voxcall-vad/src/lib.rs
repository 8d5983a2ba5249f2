//! Voxcall Activity Detection
//!
//! Frequency-domain voice activity estimation. Each analysis tick takes the
//! most recent samples from the capture tap, computes a Hann-windowed power
//! spectrum, and maps the mean power in dB onto a 0-100 intensity scale.
//! A sample block is classified as speech when its intensity is strictly
//! greater than the configured threshold. The classification is a pure
//! function of the input block: identical blocks always classify the same
//! way, including at the threshold boundary.

pub mod error;
pub mod spectrum;

pub use error::{ActivityError, Result};

use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Default speech threshold on the 0-100 intensity scale
pub const DEFAULT_THRESHOLD: f32 = 15.0;

/// Activity detection configuration
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    /// Speech threshold on the 0-100 intensity scale (default: 15.0)
    pub threshold: f32,
    /// Sample rate of the analyzed audio (default: 16000 Hz)
    pub sample_rate: u32,
    /// FFT size, power of two (default: 1024)
    pub fft_size: usize,
    /// Mean power mapped to intensity 0 (default: -90 dB)
    pub floor_db: f32,
    /// Mean power mapped to intensity 100 (default: -10 dB)
    pub ceiling_db: f32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            sample_rate: 16000,
            fft_size: 1024,
            floor_db: -90.0,
            ceiling_db: -10.0,
        }
    }
}

impl ActivityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(ActivityError::invalid_config(format!(
                "Threshold must be in 0-100, got {}",
                self.threshold
            )));
        }
        if self.sample_rate == 0 {
            return Err(ActivityError::invalid_config("Sample rate cannot be zero"));
        }
        if self.fft_size < 2 || !self.fft_size.is_power_of_two() {
            return Err(ActivityError::invalid_config(format!(
                "FFT size must be a power of two >= 2, got {}",
                self.fft_size
            )));
        }
        if self.floor_db >= self.ceiling_db {
            return Err(ActivityError::invalid_config(
                "Floor dB must be below ceiling dB",
            ));
        }
        Ok(())
    }
}

/// One analysis result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivityLevel {
    /// Loudness estimate on a 0-100 scale
    pub intensity: f32,
    /// Whether the block classifies as speech
    pub speaking: bool,
}

impl ActivityLevel {
    /// Classify an intensity against a threshold
    ///
    /// Strictly greater: `intensity == threshold` is not speech.
    pub fn classify(intensity: f32, threshold: f32) -> bool {
        intensity > threshold
    }
}

/// Frequency-domain voice activity detector
pub struct ActivityDetector {
    config: ActivityConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl ActivityDetector {
    pub fn new(config: ActivityConfig) -> Result<Self> {
        config.validate()?;

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let window = spectrum::hann_window(config.fft_size);

        Ok(Self {
            config,
            fft,
            window,
        })
    }

    /// Analyze a block of mono samples
    ///
    /// Uses the most recent `fft_size` samples; shorter blocks are
    /// zero-padded at the front. An empty block is silence.
    pub fn analyze(&self, samples: &[f32]) -> ActivityLevel {
        let intensity = self.intensity(samples);
        ActivityLevel {
            intensity,
            speaking: ActivityLevel::classify(intensity, self.config.threshold),
        }
    }

    /// Intensity of a block on the 0-100 scale
    pub fn intensity(&self, samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let n = self.config.fft_size;
        let mut frame = vec![0.0f32; n];
        if samples.len() >= n {
            frame.copy_from_slice(&samples[samples.len() - n..]);
        } else {
            frame[n - samples.len()..].copy_from_slice(samples);
        }

        let power = spectrum::mean_power(&self.fft, &self.window, &frame);
        if power <= 0.0 {
            return 0.0;
        }

        let db = 10.0 * power.log10();
        let span = self.config.ceiling_db - self.config.floor_db;
        (((db - self.config.floor_db) / span) * 100.0).clamp(0.0, 100.0)
    }

    /// Configured speech threshold
    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }
}
