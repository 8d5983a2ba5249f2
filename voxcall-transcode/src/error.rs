//! Error types for transcoding

use thiserror::Error;

use crate::DecodeStrategyKind;

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// One failed decode attempt
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: DecodeStrategyKind,
    pub message: String,
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.message)
    }
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("All decode strategies exhausted: {}", summarize(.failures))]
    Exhausted { failures: Vec<StrategyFailure> },

    #[error("WAV encode error: {0}")]
    Encode(String),
}

impl TranscodeError {
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::Encode(msg.into())
    }
}

fn summarize(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
