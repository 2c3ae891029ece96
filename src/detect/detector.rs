use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;
use super::result::Detection;
use crate::config::{CameraSettings, DetectionSettings};
use crate::error::{classify, HaltError};
use crate::frame::Frame;

const STUB_SCHEME: &str = "stub://";

/// Model plus the target-class filter. Owned by the control loop.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
    targets: Vec<String>,
}

impl Detector {
    /// Load the backend named by `settings.model_path` and warm it up at the
    /// camera geometry.
    ///
    /// Every failure is reported as `HaltError::ModelLoad`.
    pub fn load(settings: &DetectionSettings, camera: &CameraSettings) -> Result<Self> {
        let mut backend =
            build_backend(settings).map_err(|e| classify(e, HaltError::ModelLoad))?;
        backend
            .warm_up(camera.width, camera.height)
            .map_err(|e| classify(e, HaltError::ModelLoad))?;
        let detector = Self::with_backend(backend, settings.target_classes.clone());
        log::info!(
            "detector loaded backend={} model={} targets={:?}",
            detector.backend_name(),
            settings.model_path.display(),
            detector.targets()
        );
        Ok(detector)
    }

    /// Wrap an already-built backend.
    pub fn with_backend(backend: Box<dyn DetectorBackend>, targets: Vec<String>) -> Self {
        let targets: Vec<String> = targets.iter().map(|t| t.trim().to_lowercase()).collect();
        let known = backend.labels();
        if !known.is_empty() {
            for target in &targets {
                if !known.iter().any(|label| label.eq_ignore_ascii_case(target)) {
                    log::warn!(
                        "target class not in model labels class={} backend={}",
                        target,
                        backend.name()
                    );
                }
            }
        }
        Self { backend, targets }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// One forward pass. Returns target-class detections only; the confidence
    /// threshold is not applied here.
    pub fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        if !frame.is_well_formed() {
            return Err(anyhow!(
                "frame {} has {} bytes for {}x{}",
                frame.sequence,
                frame.byte_len(),
                frame.width,
                frame.height
            ));
        }
        let raw = self
            .backend
            .detect(frame.pixels(), frame.width, frame.height)?;
        Ok(raw
            .into_iter()
            .filter(|d| !d.confidence.is_nan())
            .filter(|d| self.is_target(&d.label))
            .map(|mut d| {
                d.confidence = d.confidence.clamp(0.0, 1.0);
                d
            })
            .collect())
    }

    fn is_target(&self, label: &str) -> bool {
        let label = label.trim();
        self.targets.iter().any(|t| t.eq_ignore_ascii_case(label))
    }
}

fn build_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let path = settings.model_path.to_string_lossy();
    if let Some(label) = path.strip_prefix(STUB_SCHEME) {
        let label = if label.trim().is_empty() {
            settings
                .target_classes
                .first()
                .map(String::as_str)
                .ok_or_else(|| anyhow!("stub model needs a label or a target class"))?
        } else {
            label
        };
        return Ok(Box::new(StubBackend::new(label)));
    }
    build_model_backend(settings)
}

#[cfg(feature = "backend-tract")]
fn build_model_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    use super::backends::TractBackend;
    use super::labels::load_labels;

    if !settings.model_path.is_file() {
        return Err(anyhow!(
            "model file {} not found",
            settings.model_path.display()
        ));
    }
    let labels = load_labels(settings.labels_path.as_deref())?;
    Ok(Box::new(TractBackend::new(
        &settings.model_path,
        settings.input_size,
        labels,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn build_model_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "model {} needs the backend-tract feature (use model_path = \"stub://<label>\" for dry runs)",
        settings.model_path.display()
    ))
}
