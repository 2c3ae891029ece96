use anyhow::Result;

use super::result::Detection;

/// Model backend trait.
///
/// A backend runs one forward pass per call and reports every object it
/// recognizes, whatever its label. Label filtering and the halt threshold are
/// applied above it, so a threshold change never needs a model reload.
///
/// Implementations must treat the pixel slice as read-only and must not keep it
/// beyond the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Labels this model can emit. Empty when the backend does not know.
    fn labels(&self) -> &[String] {
        &[]
    }

    /// Run detection on an RGB24 frame.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once at load with the camera geometry.
    fn warm_up(&mut self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }
}
