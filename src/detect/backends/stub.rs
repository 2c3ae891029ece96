use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// Stub backend for dry runs and tests.
///
/// Reports a single whole-frame detection of its label whose confidence is the
/// frame's mean brightness (0.0 black, 1.0 white). Deterministic for identical
/// pixels.
pub struct StubBackend {
    labels: Vec<String>,
}

impl StubBackend {
    pub fn new(label: &str) -> Self {
        Self {
            labels: vec![label.trim().to_lowercase()],
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        if pixels.is_empty() {
            return Ok(Vec::new());
        }
        let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
        let confidence = sum as f32 / (pixels.len() as f32 * 255.0);
        Ok(vec![Detection::new(
            self.labels[0].clone(),
            confidence,
            BoundingBox::full_frame(width, height),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_confidence_tracks_brightness() -> Result<()> {
        let mut backend = StubBackend::new("Bottle");
        let dark = backend.detect(&[0u8; 12], 2, 2)?;
        let bright = backend.detect(&[255u8; 12], 2, 2)?;
        assert_eq!(dark[0].label, "bottle");
        assert_eq!(dark[0].confidence, 0.0);
        assert_eq!(bright[0].confidence, 1.0);
        assert_eq!(bright[0].bbox, BoundingBox::full_frame(2, 2));
        Ok(())
    }

    #[test]
    fn stub_is_deterministic() -> Result<()> {
        let mut backend = StubBackend::new("bottle");
        let pixels = [10u8, 20, 30, 40, 50, 60];
        assert_eq!(backend.detect(&pixels, 2, 1)?, backend.detect(&pixels, 2, 1)?);
        assert!(backend.detect(&[], 0, 0)?.is_empty());
        Ok(())
    }
}
