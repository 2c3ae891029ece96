//! Captured frames.
//!
//! A `Frame` is produced by a `FrameSource`, lent to the detector for exactly one
//! inference call, and dropped before the next capture. It is deliberately not
//! `Clone`: the loop never holds more than one live frame.

use std::time::{Duration, Instant, SystemTime};

/// One RGB24 image (`width * height * 3` bytes, row-major).
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic per-source frame counter, starting at 1.
    pub sequence: u64,
    captured_at: SystemTime,
    capture_instant: Instant,
}

// Explicitly NOT implementing Clone.

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            sequence,
            captured_at: SystemTime::now(),
            capture_instant: Instant::now(),
        }
    }

    /// Pixel bytes for the duration of a borrow.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Wall-clock capture time.
    pub fn timestamp(&self) -> SystemTime {
        self.captured_at
    }

    pub fn age(&self) -> Duration {
        self.capture_instant.elapsed()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Byte length an RGB24 frame of these dimensions must have.
    pub fn expected_len(width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
    }

    /// True when the buffer length matches the declared geometry.
    pub fn is_well_formed(&self) -> bool {
        Self::expected_len(self.width, self.height) == Some(self.data.len())
    }

    /// Mean of all channel bytes, 0.0 for an empty frame.
    pub fn mean_intensity(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.data.iter().map(|&b| b as u64).sum();
        sum as f32 / self.data.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_reports_geometry() {
        let frame = Frame::new(vec![10u8; 4 * 2 * 3], 4, 2, 1);
        assert!(frame.is_well_formed());
        assert_eq!(frame.byte_len(), 24);
        assert_eq!(frame.mean_intensity(), 10.0);

        let short = Frame::new(vec![0u8; 5], 4, 2, 2);
        assert!(!short.is_well_formed());
    }

    #[test]
    fn empty_frame_has_zero_intensity() {
        let frame = Frame::new(Vec::new(), 0, 0, 1);
        assert_eq!(frame.mean_intensity(), 0.0);
    }
}
