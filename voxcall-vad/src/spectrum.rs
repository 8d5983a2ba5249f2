//! Power-spectrum estimation helpers

use rustfft::{num_complex::Complex, Fft};
use std::f32::consts::PI;
use std::sync::Arc;

/// Create Hann window for spectral analysis
pub fn hann_window(window_length: usize) -> Vec<f32> {
    (0..window_length)
        .map(|n| {
            let factor = 2.0 * PI * n as f32 / (window_length - 1) as f32;
            0.5 * (1.0 - factor.cos())
        })
        .collect()
}

/// Mean normalized power over the one-sided spectrum of a windowed frame
///
/// `frame` must be exactly `fft.len()` samples. Power is normalized by the
/// squared FFT length so the result is independent of `fft_size`.
pub fn mean_power(fft: &Arc<dyn Fft<f32>>, window: &[f32], frame: &[f32]) -> f32 {
    let n = fft.len();
    debug_assert_eq!(frame.len(), n);
    debug_assert_eq!(window.len(), n);

    let mut buffer: Vec<Complex<f32>> = frame
        .iter()
        .zip(window.iter())
        .map(|(&s, &w)| Complex::new(s * w, 0.0))
        .collect();

    fft.process(&mut buffer);

    let norm = (n * n) as f32;
    let bins = n / 2 + 1;
    let total: f32 = buffer
        .iter()
        .take(bins)
        .map(|c| (c.re * c.re + c.im * c.im) / norm)
        .sum();

    total / bins as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rustfft::FftPlanner;

    #[test]
    fn test_hann_window_shape() {
        let window = hann_window(512);
        assert_eq!(window.len(), 512);
        assert_relative_eq!(window[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(window[256], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_silence_has_no_power() {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(1024);
        let window = hann_window(1024);
        let frame = vec![0.0f32; 1024];

        assert_eq!(mean_power(&fft, &window, &frame), 0.0);
    }

    #[test]
    fn test_tone_power_scales_with_amplitude() {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(1024);
        let window = hann_window(1024);

        let tone = |amp: f32| -> Vec<f32> {
            (0..1024)
                .map(|i| (i as f32 * 440.0 * 2.0 * PI / 16000.0).sin() * amp)
                .collect()
        };

        let quiet = mean_power(&fft, &window, &tone(0.01));
        let loud = mean_power(&fft, &window, &tone(0.5));
        assert!(loud > quiet * 100.0);
    }
}
