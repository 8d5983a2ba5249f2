//! Canonical WAV encoding
//!
//! The backend expects 16-bit PCM in a plain 44-byte-header RIFF container,
//! regardless of what the capture layer produced. The header layout is
//! fixed: no extension chunks, `fmt ` immediately after `WAVE`, `data`
//! immediately after `fmt `.

/// Canonical header length
pub const HEADER_LEN: usize = 44;

/// Parsed canonical WAV header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub chunk_size: u32,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_len: u32,
}

/// Encode interleaved f32 samples as canonical 16-bit PCM WAV
///
/// Samples are clamped to [-1, 1] then scaled asymmetrically: negatives by
/// 0x8000, positives by 0x7FFF, so both rails map onto valid i16 values.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let byte_rate = sample_rate * channels as u32 * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);

    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes()); // fmt chunk size
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = if clamped < 0.0 {
            (clamped * 0x8000 as f32) as i16
        } else {
            (clamped * 0x7FFF as f32) as i16
        };
        out.extend_from_slice(&scaled.to_le_bytes());
    }

    out
}

/// Parse a canonical 44-byte header
///
/// Returns None for anything that is not the exact canonical layout.
pub fn parse_header(bytes: &[u8]) -> Option<WavHeader> {
    if bytes.len() < HEADER_LEN {
        return None;
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }
    if &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return None;
    }

    let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

    Some(WavHeader {
        chunk_size: u32_at(4),
        channel_count: u16_at(22),
        sample_rate: u32_at(24),
        byte_rate: u32_at(28),
        block_align: u16_at(32),
        bits_per_sample: u16_at(34),
        data_len: u32_at(40),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_invariants() {
        let samples = vec![0.1f32; 320]; // 160 stereo frames
        let bytes = encode_wav(&samples, 44100, 2);
        let header = parse_header(&bytes).unwrap();

        assert_eq!(header.data_len as usize, bytes.len() - HEADER_LEN);
        assert_eq!(header.chunk_size, 36 + header.data_len);
        assert_eq!(header.data_len, 160 * 2 * 2); // frames * channels * 2
        assert_eq!(header.byte_rate, 44100 * 2 * 2);
        assert_eq!(header.block_align, 4);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channel_count, 2);
    }

    #[test]
    fn test_asymmetric_clamping() {
        let bytes = encode_wav(&[2.0, -2.0, 1.0, -1.0], 16000, 1);
        let sample = |i: usize| {
            i16::from_le_bytes([bytes[HEADER_LEN + i * 2], bytes[HEADER_LEN + i * 2 + 1]])
        };

        assert_eq!(sample(0), 0x7FFF);
        assert_eq!(sample(1), -0x8000);
        assert_eq!(sample(2), 0x7FFF);
        assert_eq!(sample(3), -0x8000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_header(b"not a wav").is_none());
        assert!(parse_header(&[0u8; 44]).is_none());

        let mut bytes = encode_wav(&[0.0; 16], 16000, 1);
        bytes[9] = b'X'; // corrupt WAVE tag
        assert!(parse_header(&bytes).is_none());
    }
}
