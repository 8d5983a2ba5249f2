//! Voxcall Format Transcoding
//!
//! Recorded segments arrive in whatever container the capture layer (or a
//! future platform recorder) produced. The backend expects canonical 16-bit
//! PCM WAV. Transcoding walks an ordered strategy list:
//!
//! 1. `Declared` - decode trusting the segment's container type
//! 2. `Probed`   - permissive decode, sniffing the bytes with no hint
//! 3. pass-through - wrap the raw bytes unmodified (optional last resort)
//!
//! Every strategy failure is recorded; the transcoder only errors when all
//! strategies fail and pass-through is disabled.

pub mod decode;
pub mod error;
pub mod wav;

pub use error::{Result, StrategyFailure, TranscodeError};

use tracing::{debug, warn};
use voxcall_audio::AudioSegment;

use decode::DecodedPcm;

/// Which decode strategy produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategyKind {
    Declared,
    Probed,
}

impl std::fmt::Display for DecodeStrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declared => write!(f, "declared"),
            Self::Probed => write!(f, "probed"),
        }
    }
}

/// How the output bytes were produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    /// Decoded via a strategy, then re-encoded canonically
    Decoded(DecodeStrategyKind),
    /// Raw bytes forwarded unmodified after every strategy failed
    Passthrough,
}

/// Canonical transcoder output
///
/// `data` is a complete WAV buffer (header + PCM) on the decoded path. On
/// the pass-through path it is the original bytes, with header fields
/// recovered leniently when the bytes happen to be canonical WAV and zeroed
/// otherwise.
#[derive(Debug, Clone)]
pub struct TranscodedAudio {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Frames per channel
    pub sample_count: u32,
    pub path: DecodePath,
}

impl TranscodedAudio {
    fn from_pcm(pcm: DecodedPcm, strategy: DecodeStrategyKind) -> Self {
        let frames = pcm.samples.len() / pcm.channels.max(1) as usize;
        let data = wav::encode_wav(&pcm.samples, pcm.sample_rate, pcm.channels);

        Self {
            data,
            sample_rate: pcm.sample_rate,
            channel_count: pcm.channels,
            sample_count: frames as u32,
            path: DecodePath::Decoded(strategy),
        }
    }

    fn passthrough(bytes: &[u8]) -> Self {
        let (sample_rate, channel_count, sample_count) = match wav::parse_header(bytes) {
            Some(header) if header.channel_count > 0 => (
                header.sample_rate,
                header.channel_count,
                header.data_len / (header.channel_count as u32 * 2),
            ),
            _ => (0, 0, 0),
        };

        Self {
            data: bytes.to_vec(),
            sample_rate,
            channel_count,
            sample_count,
            path: DecodePath::Passthrough,
        }
    }

    /// PCM payload length in bytes (excludes the canonical header)
    pub fn pcm_byte_len(&self) -> usize {
        self.data.len().saturating_sub(wav::HEADER_LEN)
    }
}

/// Ordered-fallback audio transcoder
#[derive(Debug, Clone)]
pub struct Transcoder {
    permissive: bool,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self { permissive: true }
    }
}

impl Transcoder {
    /// `permissive` enables the raw pass-through last resort
    pub fn new(permissive: bool) -> Self {
        Self { permissive }
    }

    /// Transcode a segment to canonical WAV
    pub fn transcode(&self, segment: &AudioSegment) -> Result<TranscodedAudio> {
        let mut failures = Vec::new();

        match decode::decode_declared(segment.data(), segment.mime()) {
            Ok(pcm) => {
                return Ok(TranscodedAudio::from_pcm(pcm, DecodeStrategyKind::Declared));
            }
            Err(e) => {
                debug!("Declared decode ({}) failed: {}", segment.mime(), e);
                failures.push(StrategyFailure {
                    strategy: DecodeStrategyKind::Declared,
                    message: e.to_string(),
                });
            }
        }

        match decode::decode_probed(segment.data()) {
            Ok(pcm) => {
                return Ok(TranscodedAudio::from_pcm(pcm, DecodeStrategyKind::Probed));
            }
            Err(e) => {
                debug!("Probed decode failed: {}", e);
                failures.push(StrategyFailure {
                    strategy: DecodeStrategyKind::Probed,
                    message: e.to_string(),
                });
            }
        }

        if self.permissive {
            warn!(
                "All decode strategies failed for {} segment ({} bytes), passing bytes through",
                segment.mime(),
                segment.data().len()
            );
            return Ok(TranscodedAudio::passthrough(segment.data()));
        }

        Err(TranscodeError::Exhausted { failures })
    }
}
