//! Raw PCM decoding
//!
//! Converts raw little-endian signed 16-bit sample bytes into normalized
//! f32 samples. This is the only wire format the streamer accepts; codec
//! decoding and sample-rate conversion happen upstream.

/// Decode a chunk of raw little-endian int16 bytes into f32 samples.
///
/// Output length is `bytes.len() / 2`; a trailing odd byte is ignored
/// (only complete pairs are decoded). Each sample is normalized to
/// `v / 32768.0`, giving the range [-1.0, 1.0).
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}
