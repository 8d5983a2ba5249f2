//! Decode strategies
//!
//! Each strategy turns segment bytes into interleaved f32 PCM. `Declared`
//! trusts the segment's container type; `Probed` lets symphonia sniff the
//! bytes with no hint.

use std::io::Cursor;

use hound::WavReader;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, TranscodeError};

/// Interleaved PCM produced by a decode strategy
#[derive(Debug, Clone)]
pub struct DecodedPcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Decode trusting the declared container type
pub fn decode_declared(data: &[u8], mime: &str) -> Result<DecodedPcm> {
    if mime.starts_with("audio/wav") || mime.starts_with("audio/x-wav") {
        decode_wav(data)
    } else {
        let mut hint = Hint::new();
        if let Some(ext) = extension_for_mime(mime) {
            hint.with_extension(ext);
        }
        decode_with_symphonia(data, hint)
    }
}

/// Decode with format sniffing, ignoring the declared type
pub fn decode_probed(data: &[u8]) -> Result<DecodedPcm> {
    decode_with_symphonia(data, Hint::new())
}

/// Map a declared mime onto a container extension hint
fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let subtype = mime.strip_prefix("audio/")?;
    let subtype = subtype.split(';').next()?.trim();

    match subtype {
        "webm" => Some("webm"),
        "ogg" | "vorbis" => Some("ogg"),
        "mpeg" | "mp3" => Some("mp3"),
        "flac" => Some("flac"),
        "aac" | "mp4" => Some("m4a"),
        _ => None,
    }
}

fn decode_wav(data: &[u8]) -> Result<DecodedPcm> {
    let mut reader = WavReader::new(Cursor::new(data))
        .map_err(|e| TranscodeError::decode(format!("Failed to open WAV: {}", e)))?;

    let spec = reader.spec();

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|sample| sample as f32 / 32768.0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TranscodeError::decode(format!("Failed to read samples: {}", e)))?,
        (hound::SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|sample| sample as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TranscodeError::decode(format!("Failed to read samples: {}", e)))?,
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TranscodeError::decode(format!("Failed to read samples: {}", e)))?,
        (_, bits) => {
            return Err(TranscodeError::decode(format!(
                "Unsupported bit depth: {}",
                bits
            )))
        }
    };

    Ok(DecodedPcm {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

fn decode_with_symphonia(data: &[u8], hint: Hint) -> Result<DecodedPcm> {
    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let format_opts = FormatOptions::default();
    let metadata_opts = MetadataOptions::default();
    let decoder_opts = DecoderOptions::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| TranscodeError::decode(format!("Failed to probe format: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| TranscodeError::decode("No audio tracks found"))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| TranscodeError::decode("Could not determine sample rate"))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &decoder_opts)
        .map_err(|e| TranscodeError::decode(format!("Failed to create decoder: {}", e)))?;

    let mut samples = Vec::new();
    let mut sample_buf = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(TranscodeError::decode(format!(
                    "Failed to read packet: {}",
                    e
                )))
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder
            .decode(&packet)
            .map_err(|e| TranscodeError::decode(format!("Failed to decode: {}", e)))?;

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err(TranscodeError::decode("Decoded no samples"));
    }

    Ok(DecodedPcm {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::encode_wav;

    #[test]
    fn test_decode_wav_round_trip() {
        let original = vec![0.5f32, -0.5, 0.25, -0.25];
        let bytes = encode_wav(&original, 16000, 1);

        let pcm = decode_declared(&bytes, "audio/wav").unwrap();
        assert_eq!(pcm.sample_rate, 16000);
        assert_eq!(pcm.channels, 1);
        assert_eq!(pcm.samples.len(), 4);
        for (a, b) in pcm.samples.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_decode_garbage_fails() {
        let garbage = vec![0xDEu8, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02, 0x03];
        assert!(decode_declared(&garbage, "audio/webm;codecs=opus").is_err());
        assert!(decode_probed(&garbage).is_err());
    }

    #[test]
    fn test_mime_extension_mapping() {
        assert_eq!(extension_for_mime("audio/webm;codecs=opus"), Some("webm"));
        assert_eq!(extension_for_mime("audio/mpeg"), Some("mp3"));
        assert_eq!(extension_for_mime("audio/ogg"), Some("ogg"));
        assert_eq!(extension_for_mime("application/octet-stream"), None);
        assert_eq!(extension_for_mime("audio/unknown-thing"), None);
    }
}
