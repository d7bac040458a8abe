//! # PCM Codec
//!
//! Converts between normalized floating-point samples and the text-framed
//! 16-bit PCM chunks the live speech service exchanges.
//!
//! ## Wire Format:
//! - **Samples**: 16-bit signed integers, little-endian
//! - **Framing**: standard base64 (with padding) so chunks can travel in JSON
//! - **Format tag**: MIME string `audio/pcm;rate=<sample rate>`
//!
//! ## Key Rust Concepts:
//! - **byteorder**: `WriteBytesExt`/`ReadBytesExt` give explicit endianness
//! - **Cursor**: Reads a byte slice as if it were a stream
//! - **`as` casts**: float → int casts saturate in Rust, but we clamp first so
//!   the policy is explicit

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::error::{RadioError, RadioResult};

/// Full-scale value used to map between [-1, 1] floats and 16-bit integers.
const PCM_SCALE: f32 = 32768.0;

/// One encoded, transmittable unit of audio.
///
/// Owned by whoever produced it until it is handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedChunk {
    /// Base64 text of little-endian 16-bit samples
    pub data: String,
    /// Format tag, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl EncodedChunk {
    pub fn pcm_mime_type(sample_rate: u32) -> String {
        format!("audio/pcm;rate={}", sample_rate)
    }
}

/// A decoded, playable buffer: one sample vector per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    /// Build a buffer from per-channel data. All channels must be equally long.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> RadioResult<Self> {
        if sample_rate == 0 {
            return Err(RadioError::Decode("sample rate must be greater than 0".into()));
        }
        if channels.is_empty() {
            return Err(RadioError::Decode("buffer needs at least one channel".into()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(RadioError::Decode("channel lengths differ".into()));
        }
        Ok(Self { sample_rate, channels })
    }

    /// Single-channel buffer.
    pub fn mono(sample_rate: u32, samples: Vec<f32>) -> RadioResult<Self> {
        Self::new(sample_rate, vec![samples])
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn number_of_channels(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Average of all channels, for mono sinks.
    pub fn mixdown(&self) -> Vec<f32> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let scale = 1.0 / self.channels.len() as f32;
        (0..self.frames())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
            .collect()
    }
}

/// Encode one captured frame into a wire chunk.
///
/// Each sample is scaled by 32768 and truncated toward zero. Inputs outside
/// [-1, 1] are clamped to the 16-bit range instead of wrapping.
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> EncodedChunk {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // NaN becomes silence
        let scaled = if sample.is_nan() { 0.0 } else { sample * PCM_SCALE };
        let value = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        // Writing into a Vec cannot fail
        let _ = bytes.write_i16::<LittleEndian>(value);
    }

    EncodedChunk {
        data: STANDARD.encode(&bytes),
        mime_type: EncodedChunk::pcm_mime_type(sample_rate),
    }
}

/// Inverse of the text framing: base64 text → raw bytes.
pub fn decode_chunk(chunk: &str) -> RadioResult<Vec<u8>> {
    Ok(STANDARD.decode(chunk.trim())?)
}

/// Reinterpret raw bytes as interleaved 16-bit PCM and build a playable buffer.
///
/// ## De-interleaving:
/// For `channel_count` channels, sample `i` belongs to channel `i % channel_count`.
/// A trailing partial frame (fewer samples than channels) is dropped.
pub fn decode_to_audio_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: usize,
) -> RadioResult<AudioBuffer> {
    if channel_count == 0 {
        return Err(RadioError::Decode("channel count must be greater than 0".into()));
    }
    if bytes.len() % 2 != 0 {
        return Err(RadioError::Decode(format!(
            "PCM byte length {} is not a multiple of 2",
            bytes.len()
        )));
    }

    let frame_count = bytes.len() / 2 / channel_count;
    let mut channels = vec![Vec::with_capacity(frame_count); channel_count];
    let mut cursor = Cursor::new(bytes);

    for _ in 0..frame_count {
        for channel in channels.iter_mut() {
            let sample = cursor
                .read_i16::<LittleEndian>()
                .map_err(|e| RadioError::Decode(e.to_string()))?;
            channel.push(sample as f32 / PCM_SCALE);
        }
    }

    AudioBuffer::new(sample_rate, channels)
}

/// Convenience: base64 text straight to a playable buffer.
pub fn decode_payload(
    chunk: &str,
    sample_rate: u32,
    channel_count: usize,
) -> RadioResult<AudioBuffer> {
    let bytes = decode_chunk(chunk)?;
    decode_to_audio_buffer(&bytes, sample_rate, channel_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_frame_roundtrip() {
        let frame = vec![0.0f32; 4096];
        let chunk = encode_frame(&frame, 16000);
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");

        let buffer = decode_payload(&chunk.data, 16000, 1).unwrap();
        assert_eq!(buffer.frames(), 4096);
        assert!(buffer.channel(0).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_roundtrip_within_quantization_error() {
        let frame: Vec<f32> = (0..512)
            .map(|i| ((i as f32) * 0.037).sin() * 0.9)
            .chain([1.0, -1.0, 0.5, -0.5, 1.0 / 32768.0])
            .collect();
        let chunk = encode_frame(&frame, 16000);
        let buffer = decode_payload(&chunk.data, 16000, 1).unwrap();

        for (input, decoded) in frame.iter().zip(buffer.channel(0).unwrap()) {
            let err = (input - decoded).abs();
            assert!(err <= 1.0 / 32768.0, "{} vs {} (err {})", input, decoded, err);
        }
    }

    #[test]
    fn test_out_of_range_samples_are_clamped() {
        let chunk = encode_frame(&[2.0, -3.0, f32::NAN], 16000);
        let bytes = decode_chunk(&chunk.data).unwrap();
        let mut cursor = Cursor::new(bytes.as_slice());
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), i16::MAX);
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), i16::MIN);
        assert_eq!(cursor.read_i16::<LittleEndian>().unwrap(), 0);
    }

    #[test]
    fn test_little_endian_layout() {
        // 0.5 * 32768 = 16384 = 0x4000
        let chunk = encode_frame(&[0.5], 16000);
        assert_eq!(decode_chunk(&chunk.data).unwrap(), vec![0x00, 0x40]);
    }

    #[test]
    fn test_malformed_text_is_decode_error() {
        assert!(matches!(decode_chunk("@@@@"), Err(RadioError::Decode(_))));
        assert!(matches!(decode_chunk("abc"), Err(RadioError::Decode(_))));
    }

    #[test]
    fn test_odd_byte_count_is_decode_error() {
        let err = decode_to_audio_buffer(&[0, 1, 2], 24000, 1).unwrap_err();
        assert!(matches!(err, RadioError::Decode(_)));
    }

    #[test]
    fn test_stereo_deinterleave() {
        let samples: [i16; 6] = [100, -100, 200, -200, 300, -300];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let buffer = decode_to_audio_buffer(&bytes, 24000, 2).unwrap();

        assert_eq!(buffer.number_of_channels(), 2);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(0).unwrap()[2], 300.0 / 32768.0);
        assert_eq!(buffer.channel(1).unwrap()[0], -100.0 / 32768.0);
        assert!(buffer.mixdown().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::mono(24000, vec![0.0; 12000]).unwrap();
        assert!((buffer.duration() - 0.5).abs() < 1e-9);
    }
}
