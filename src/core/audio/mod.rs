//! PCM sample conversion for the audio relay path.
//!
//! Downstream clients deliver raw little-endian f32 sample buffers straight
//! from the capture pipeline (already resampled on the client side); the
//! upstream service wants signed 16-bit little-endian PCM. This module only
//! converts formats, it never resamples.

use bytes::{BufMut, Bytes, BytesMut};

/// Convert float samples in `[-1, 1]` to signed 16-bit little-endian PCM.
///
/// Samples are clamped, scaled asymmetrically (negative toward -32768,
/// positive toward 32767), and rounded to nearest. Output is always exactly
/// `2 * samples.len()` bytes.
pub fn pcm_encode(samples: &[f32]) -> Bytes {
    let mut out = BytesMut::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let scaled = if clamped < 0.0 {
            clamped * 32768.0
        } else {
            clamped * 32767.0
        };
        out.put_i16_le(scaled.round() as i16);
    }
    out.freeze()
}

/// Reinterpret a raw chunk as little-endian f32 samples.
///
/// Trailing bytes that do not form a whole sample are dropped; a capture
/// pipeline only produces whole samples, so a ragged tail means the chunk
/// boundary fell mid-sample and the remainder is unusable anyway.
pub fn samples_from_f32_le(chunk: &[u8]) -> Vec<f32> {
    chunk
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence() {
        assert_eq!(pcm_encode(&[0.0]).as_ref(), &[0x00, 0x00]);
    }

    #[test]
    fn test_full_scale_positive() {
        assert_eq!(pcm_encode(&[1.0]).as_ref(), &[0xFF, 0x7F]);
    }

    #[test]
    fn test_full_scale_negative() {
        assert_eq!(pcm_encode(&[-1.0]).as_ref(), &[0x00, 0x80]);
    }

    #[test]
    fn test_out_of_range_clamped() {
        assert_eq!(pcm_encode(&[2.5]).as_ref(), &[0xFF, 0x7F]);
        assert_eq!(pcm_encode(&[-7.0]).as_ref(), &[0x00, 0x80]);
    }

    #[test]
    fn test_output_length_is_twice_input() {
        for n in [0usize, 1, 2, 7, 128, 4096] {
            let samples = vec![0.25f32; n];
            assert_eq!(pcm_encode(&samples).len(), 2 * n);
        }
    }

    #[test]
    fn test_half_scale_rounding() {
        // 0.5 * 32767 = 16383.5, rounds away from zero to 16384.
        assert_eq!(pcm_encode(&[0.5]).as_ref(), &16384i16.to_le_bytes());
    }

    #[test]
    fn test_samples_round_trip_through_bytes() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.0];
        let mut raw = Vec::new();
        for s in samples {
            raw.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(samples_from_f32_le(&raw), samples);
    }

    #[test]
    fn test_ragged_tail_dropped() {
        let mut raw = 0.75f32.to_le_bytes().to_vec();
        raw.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(samples_from_f32_le(&raw), vec![0.75]);
    }
}
