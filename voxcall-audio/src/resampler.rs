//! Audio resampling with rubato
//!
//! Converts device-rate audio to the pipeline rate before windowing.

use rubato::{
    Resampler as RubatoResampler, SincFixedIn, SincInterpolationParameters,
    SincInterpolationType, WindowFunction,
};

use crate::error::{AudioError, Result};

/// Resampler for converting audio to the pipeline sample rate
pub struct Resampler {
    source_rate: u32,
    target_rate: u32,
    channels: u16,
    resampler: Option<SincFixedIn<f32>>,
}

impl Resampler {
    /// Create new resampler
    ///
    /// Identity when `source_rate == target_rate`.
    pub fn new(source_rate: u32, target_rate: u32, channels: u16) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(AudioError::invalid_config("Sample rate cannot be zero"));
        }

        if channels == 0 {
            return Err(AudioError::invalid_config("Channel count cannot be zero"));
        }

        let resampler = if source_rate != target_rate {
            Some(Self::create_resampler(source_rate, target_rate, channels)?)
        } else {
            None
        };

        Ok(Self {
            source_rate,
            target_rate,
            channels,
            resampler,
        })
    }

    fn create_resampler(
        source_rate: u32,
        target_rate: u32,
        channels: u16,
    ) -> Result<SincFixedIn<f32>> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        // Process 100ms at a time
        let chunk_size = (source_rate as f32 * 0.1) as usize;

        let resampler = SincFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0, // max_resample_ratio_relative
            params,
            chunk_size,
            channels as usize,
        )
        .map_err(|e| AudioError::ResampleError(format!("Failed to create resampler: {:?}", e)))?;

        Ok(resampler)
    }

    /// Number of input samples consumed per `process()` call
    pub fn chunk_size(&self) -> usize {
        (self.source_rate as f32 * 0.1) as usize
    }

    /// Resample interleaved audio data
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        if self.resampler.is_none() {
            return Ok(input.to_vec());
        }

        if input.is_empty() {
            return Ok(Vec::new());
        }

        let resampler = match self.resampler.as_mut() {
            Some(r) => r,
            None => return Ok(input.to_vec()),
        };

        // rubato expects planar Vec<Vec<f32>>
        let frames = input.len() / self.channels as usize;
        let mut planar_input = vec![vec![0.0f32; frames]; self.channels as usize];

        for (frame_idx, frame) in input.chunks(self.channels as usize).enumerate() {
            for (ch_idx, &sample) in frame.iter().enumerate() {
                planar_input[ch_idx][frame_idx] = sample;
            }
        }

        let planar_output = resampler
            .process(&planar_input, None)
            .map_err(|e| AudioError::ResampleError(format!("Resampling failed: {:?}", e)))?;

        let output_frames = planar_output[0].len();
        let mut interleaved = Vec::with_capacity(output_frames * self.channels as usize);

        for frame_idx in 0..output_frames {
            for channel_data in planar_output.iter().take(self.channels as usize) {
                interleaved.push(channel_data[frame_idx]);
            }
        }

        Ok(interleaved)
    }

    /// Expected output length for a given input length
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        if self.resampler.is_none() {
            return input_len;
        }

        let frames = input_len / self.channels as usize;
        let output_frames =
            (frames as f64 * self.target_rate as f64 / self.source_rate as f64) as usize;
        output_frames * self.channels as usize
    }
}
