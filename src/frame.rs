//! Frames and frame assembly
//!
//! A `Frame` is the fixed-size unit of scheduling: a block of decoded f32
//! samples whose ownership moves from the assembler through the playback
//! queue to the scheduler, which converts it into a device submission and
//! discards it.
//!
//! The `FrameAssembler` accumulates decoded samples across chunk arrivals
//! and slices off full frames once enough samples are buffered. Every
//! decoded sample is either in the assembler's remainder buffer or in
//! exactly one frame; nothing is dropped or duplicated.

/// A fixed-length block of decoded samples, immutable once created.
///
/// Frames are normally `frame_samples` long; the one exception is the final
/// frame flushed by stream completion, which may be shorter.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    samples: Vec<f32>,
}

impl Frame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of this frame at the given sample rate, in seconds
    pub fn duration(&self, sample_rate: u32) -> f64 {
        self.samples.len() as f64 / sample_rate as f64
    }
}

/// Accumulates decoded samples and slices off fixed-size frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_samples: usize,

    /// Decoded samples not yet assigned to a frame. Invariant: shorter than
    /// `frame_samples` after every `ingest` call.
    remainder: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_samples: usize) -> Self {
        Self {
            frame_samples,
            remainder: Vec::new(),
        }
    }

    /// Append decoded samples and return every full frame now available.
    pub fn ingest(&mut self, samples: &[f32]) -> Vec<Frame> {
        self.remainder.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.remainder.len() >= self.frame_samples {
            let rest = self.remainder.split_off(self.frame_samples);
            let frame = std::mem::replace(&mut self.remainder, rest);
            frames.push(Frame::new(frame));
        }
        frames
    }

    /// Flush buffered partial samples as one final (possibly short) frame.
    ///
    /// Used on stream completion so trailing audio shorter than a full
    /// frame is still played. Returns `None` if nothing is buffered.
    pub fn flush(&mut self) -> Option<Frame> {
        if self.remainder.is_empty() {
            return None;
        }
        Some(Frame::new(std::mem::take(&mut self.remainder)))
    }

    /// Discard all buffered samples (stop path).
    pub fn clear(&mut self) {
        self.remainder.clear();
    }

    pub fn remainder_len(&self) -> usize {
        self.remainder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remainder.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_frame_yields_one_frame() {
        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.ingest(&[0.1, 0.2, 0.3, 0.4]);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples(), &[0.1, 0.2, 0.3, 0.4]);
        assert!(assembler.is_empty());
    }

    #[test]
    fn test_partial_chunk_buffers_remainder() {
        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.ingest(&[0.1, 0.2, 0.3]);

        assert!(frames.is_empty());
        assert_eq!(assembler.remainder_len(), 3);
    }

    #[test]
    fn test_frame_plus_k_splits() {
        // frame_samples + k samples yields one frame and a k-long remainder
        let mut assembler = FrameAssembler::new(4);
        let frames = assembler.ingest(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);

        assert_eq!(frames.len(), 1);
        assert_eq!(assembler.remainder_len(), 2);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut assembler = FrameAssembler::new(2);
        let frames = assembler.ingest(&[0.1, 0.2, 0.3, 0.4, 0.5]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].samples(), &[0.1, 0.2]);
        assert_eq!(frames[1].samples(), &[0.3, 0.4]);
        assert_eq!(assembler.remainder_len(), 1);
    }

    #[test]
    fn test_sample_conservation_across_chunks() {
        let mut assembler = FrameAssembler::new(7);
        let mut framed = 0usize;
        let mut fed = 0usize;

        for chunk_len in [1, 5, 13, 2, 7, 30, 4] {
            let chunk = vec![0.25f32; chunk_len];
            fed += chunk_len;
            for frame in assembler.ingest(&chunk) {
                framed += frame.len();
            }
        }

        assert_eq!(fed, framed + assembler.remainder_len());
    }

    #[test]
    fn test_flush_emits_short_frame_once() {
        let mut assembler = FrameAssembler::new(4);
        assembler.ingest(&[0.1, 0.2]);

        let frame = assembler.flush().unwrap();
        assert_eq!(frame.len(), 2);
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_clear_discards_remainder() {
        let mut assembler = FrameAssembler::new(4);
        assembler.ingest(&[0.1, 0.2, 0.3]);
        assembler.clear();

        assert!(assembler.is_empty());
        assert!(assembler.flush().is_none());
    }

    #[test]
    fn test_frame_duration() {
        let frame = Frame::new(vec![0.0; 7_680]);
        assert!((frame.duration(24_000) - 0.32).abs() < 1e-9);
    }
}
