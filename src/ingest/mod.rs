//! Frame sources.
//!
//! This module provides the camera side of the loop:
//! - Synthetic frames for `stub://` devices (tests, dry runs)
//! - V4L2 devices, Pi camera or USB (feature: ingest-v4l2)
//! - Discovery of connected cameras, resolving `index = "auto"`
//!
//! A source only reports what happened on each read. It never retries: a
//! transient miss comes back as `Capture::Missed` and a lost device as `Err`.
//! Retry policy lives in the control loop.

pub mod discovery;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::fmt;

pub use discovery::{list_cameras, resolve_camera_index, CameraInfo};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

use crate::config::CameraSettings;
use crate::error::{classify, HaltError};
use crate::frame::Frame;

/// Which physical camera flavor a device index refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraKind {
    /// CSI ribbon camera, native RGB output.
    PiCamera,
    /// UVC webcam, usually YUYV or MJPEG.
    Usb,
}

impl CameraKind {
    /// Index 0 is the Pi camera on the reference rig; everything else is USB.
    pub fn for_index(index: u32) -> Self {
        if index == 0 {
            CameraKind::PiCamera
        } else {
            CameraKind::Usb
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pi" | "picamera" | "csi" => Ok(CameraKind::PiCamera),
            "usb" | "uvc" => Ok(CameraKind::Usb),
            other => Err(anyhow!("unknown camera kind '{}' (use pi|usb)", other)),
        }
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraKind::PiCamera => f.write_str("pi"),
            CameraKind::Usb => f.write_str("usb"),
        }
    }
}

/// A single read that produced no usable frame. Not an error: the device is
/// still there.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureFailure {
    pub reason: String,
}

impl CaptureFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

/// Outcome of one `capture` call that did not hit a hard device error.
pub enum Capture {
    Frame(Frame),
    Missed(CaptureFailure),
}

/// Camera boundary used by the control loop.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &'static str;

    /// Acquire the device. Called once before the first `capture`.
    fn open(&mut self) -> Result<()>;

    /// Block for the next frame.
    ///
    /// `Err` means the device itself failed (unplugged, I/O error on the node)
    /// and the run cannot continue.
    fn capture(&mut self) -> Result<Capture>;

    /// Release the device. Safe to call any number of times.
    fn close(&mut self);

    /// Frames delivered so far.
    fn frames_captured(&self) -> u64;
}

/// Build and open the source for `settings` at an already-resolved `index`.
///
/// Any failure is reported as `HaltError::CameraUnavailable`.
pub fn open_camera(settings: &CameraSettings, index: u32) -> Result<Box<dyn FrameSource>> {
    let mut source = build_source(settings, index)
        .map_err(|e| classify(e, HaltError::CameraUnavailable))?;
    source
        .open()
        .map_err(|e| classify(e, HaltError::CameraUnavailable))?;
    Ok(source)
}

fn build_source(settings: &CameraSettings, index: u32) -> Result<Box<dyn FrameSource>> {
    if let Some(device) = settings.device.as_deref() {
        if device.starts_with("stub://") {
            return Ok(Box::new(SyntheticCamera::new(
                device,
                settings.width,
                settings.height,
            )));
        }
    }
    build_device_source(settings, index)
}

#[cfg(feature = "ingest-v4l2")]
fn build_device_source(settings: &CameraSettings, index: u32) -> Result<Box<dyn FrameSource>> {
    let device = settings
        .device
        .clone()
        .unwrap_or_else(|| discovery::device_path(index));
    let kind = settings.kind.unwrap_or_else(|| CameraKind::for_index(index));
    Ok(Box::new(V4l2Camera::new(
        device,
        kind,
        settings.width,
        settings.height,
    )))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn build_device_source(_settings: &CameraSettings, index: u32) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera {} needs the ingest-v4l2 feature (use device = \"stub://...\" for dry runs)",
        discovery::device_path(index)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CameraIndex;

    fn stub_settings() -> CameraSettings {
        CameraSettings {
            index: CameraIndex::Auto,
            width: 32,
            height: 24,
            device: Some("stub://bench".to_string()),
            kind: None,
        }
    }

    #[test]
    fn kind_follows_index_rule() {
        assert_eq!(CameraKind::for_index(0), CameraKind::PiCamera);
        assert_eq!(CameraKind::for_index(1), CameraKind::Usb);
        assert_eq!(CameraKind::parse("USB").unwrap(), CameraKind::Usb);
        assert!(CameraKind::parse("thermal").is_err());
    }

    #[test]
    fn stub_device_opens_synthetic_source() -> Result<()> {
        let mut source = open_camera(&stub_settings(), 0)?;
        assert_eq!(source.name(), "synthetic");
        match source.capture()? {
            Capture::Frame(frame) => {
                assert_eq!((frame.width, frame.height), (32, 24));
                assert!(frame.is_well_formed());
            }
            Capture::Missed(miss) => panic!("unexpected miss: {}", miss),
        }
        source.close();
        source.close();
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_without_feature_is_camera_unavailable() {
        let mut settings = stub_settings();
        settings.device = None;
        let err = open_camera(&settings, 1).err().unwrap();
        assert_eq!(crate::error::exit_code_for(&err), 3);
    }
}
