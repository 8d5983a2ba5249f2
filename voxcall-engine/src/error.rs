//! Error types for the call engine

use thiserror::Error;
use voxcall_audio::AudioError;
use voxcall_transcode::TranscodeError;
use voxcall_transport::TransportError;
use voxcall_vad::ActivityError;

pub type Result<T> = std::result::Result<T, CallError>;

#[derive(Error, Debug)]
pub enum CallError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Playback error: {0}")]
    Playback(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid call state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Transcode(#[from] TranscodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AudioError> for CallError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::PermissionDenied(msg) => Self::PermissionDenied(msg),
            other => Self::Capture(other.to_string()),
        }
    }
}

impl From<ActivityError> for CallError {
    fn from(e: ActivityError) -> Self {
        Self::Config(e.to_string())
    }
}
