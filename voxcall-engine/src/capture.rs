//! Capture device seam
//!
//! The state machine drives capture through this trait so the call flow is
//! testable without audio hardware. The production implementation is
//! `voxcall_audio::AudioCapture`.

use voxcall_audio::{AudioCapture, Result as AudioResult};

/// Microphone lifecycle as seen by the call state machine
pub trait CaptureDevice {
    /// Open the device; fails with a permission error when unavailable
    fn acquire(&mut self) -> AudioResult<()>;
    /// Start the live stream so activity detection sees audio
    fn arm(&mut self) -> AudioResult<()>;
    /// Enable bounded recording windows (idempotent)
    fn start_windows(&mut self) -> AudioResult<()>;
    /// Give the device back; idempotent, callable from any state
    fn release(&mut self);
    fn is_released(&self) -> bool;
}

impl CaptureDevice for AudioCapture {
    fn acquire(&mut self) -> AudioResult<()> {
        AudioCapture::acquire(self)
    }

    fn arm(&mut self) -> AudioResult<()> {
        AudioCapture::arm(self)
    }

    fn start_windows(&mut self) -> AudioResult<()> {
        AudioCapture::start_windows(self)
    }

    fn release(&mut self) {
        AudioCapture::release(self)
    }

    fn is_released(&self) -> bool {
        AudioCapture::is_released(self)
    }
}
