//! Object detection.
//!
//! A [`Detector`] owns one [`DetectorBackend`] and narrows its output to the
//! configured target classes. Backends are picked from `model_path`:
//! `stub://<label>` for the brightness stub, anything else for a YOLOv8 ONNX
//! export run through tract.

mod backend;
mod backends;
mod detector;
pub mod labels;
mod result;
pub mod yolo;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use detector::Detector;
pub use result::{BoundingBox, Detection};
