//! Camera discovery.
//!
//! Resolves `camera.index = "auto"` to the first capture-capable device among
//! the first few indices, and lists devices for `camera_probe`. With the
//! `ingest-v4l2` feature each node is opened and its capabilities queried.
//! Without it, discovery can only see which `/dev/videoN` nodes exist.

use anyhow::{anyhow, Result};

use super::CameraKind;
use crate::config::{CameraIndex, CameraSettings};

/// Indices probed when resolving `auto`.
pub const AUTO_PROBE_INDICES: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    pub index: u32,
    pub path: String,
    /// Human-readable device name, when the driver reports one.
    pub card: Option<String>,
    pub driver: Option<String>,
    pub can_capture: bool,
    pub kind: CameraKind,
}

pub fn device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// Turn the configured index into a concrete one.
pub fn resolve_camera_index(settings: &CameraSettings) -> Result<u32> {
    match settings.index {
        CameraIndex::Index(index) => Ok(index),
        CameraIndex::Auto if settings.is_synthetic() || settings.device.is_some() => Ok(0),
        CameraIndex::Auto => {
            let found = list_cameras(AUTO_PROBE_INDICES)
                .into_iter()
                .find(|camera| camera.can_capture)
                .ok_or_else(|| {
                    anyhow!(
                        "no working camera found on /dev/video0..{}",
                        AUTO_PROBE_INDICES - 1
                    )
                })?;
            log::info!(
                "camera auto-detect found index={} path={} card={}",
                found.index,
                found.path,
                found.card.as_deref().unwrap_or("?")
            );
            Ok(found.index)
        }
    }
}

/// Probe `/dev/video0` through `/dev/video{count-1}`.
pub fn list_cameras(count: u32) -> Vec<CameraInfo> {
    (0..count).filter_map(probe).collect()
}

#[cfg(feature = "ingest-v4l2")]
fn probe(index: u32) -> Option<CameraInfo> {
    let path = device_path(index);
    let device = v4l::Device::with_path(&path).ok()?;
    let caps = match device.query_caps() {
        Ok(caps) => caps,
        Err(err) => {
            log::debug!("camera probe {}: query caps failed: {}", path, err);
            return None;
        }
    };
    let can_capture = caps
        .capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE);
    Some(CameraInfo {
        index,
        path,
        kind: kind_from_driver(&caps.driver, index),
        card: Some(caps.card),
        driver: Some(caps.driver),
        can_capture,
    })
}

/// Pi CSI cameras register under the Broadcom/RP1 drivers, USB ones under
/// uvcvideo. Anything else falls back to the index rule.
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
fn kind_from_driver(driver: &str, index: u32) -> CameraKind {
    let driver = driver.to_ascii_lowercase();
    if ["unicam", "bcm2835", "rp1-cfe", "mmal"]
        .iter()
        .any(|name| driver.contains(name))
    {
        CameraKind::PiCamera
    } else if driver.contains("uvc") {
        CameraKind::Usb
    } else {
        CameraKind::for_index(index)
    }
}

#[cfg(not(feature = "ingest-v4l2"))]
fn probe(index: u32) -> Option<CameraInfo> {
    let path = device_path(index);
    if !std::path::Path::new(&path).exists() {
        return None;
    }
    Some(CameraInfo {
        index,
        path,
        card: None,
        driver: None,
        can_capture: true,
        kind: CameraKind::for_index(index),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(index: CameraIndex, device: Option<&str>) -> CameraSettings {
        CameraSettings {
            index,
            width: 640,
            height: 480,
            device: device.map(str::to_string),
            kind: None,
        }
    }

    #[test]
    fn explicit_index_passes_through() -> Result<()> {
        assert_eq!(resolve_camera_index(&settings(CameraIndex::Index(3), None))?, 3);
        Ok(())
    }

    #[test]
    fn auto_with_stub_device_resolves_to_zero() -> Result<()> {
        let s = settings(CameraIndex::Auto, Some("stub://bench"));
        assert_eq!(resolve_camera_index(&s)?, 0);
        Ok(())
    }

    #[test]
    fn kind_prefers_driver_name() {
        assert_eq!(kind_from_driver("uvcvideo", 0), CameraKind::Usb);
        assert_eq!(kind_from_driver("unicam", 3), CameraKind::PiCamera);
        assert_eq!(kind_from_driver("vivid", 0), CameraKind::PiCamera);
        assert_eq!(kind_from_driver("vivid", 2), CameraKind::Usb);
    }

    #[test]
    fn device_paths_follow_index() {
        assert_eq!(device_path(2), "/dev/video2");
    }
}
