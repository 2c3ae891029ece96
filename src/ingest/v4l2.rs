//! V4L2 frame source.
//!
//! This module provides `V4l2Camera` for reading frames from local V4L2 nodes
//! (e.g., /dev/video0). Both supported camera flavors go through the same
//! device path and differ only in the pixel formats they negotiate:
//! - Pi camera: native `RGB3`, falling back to `YUYV`
//! - USB camera: `YUYV`, then `MJPG`, then `RGB3`
//!
//! Every negotiated format is normalized to RGB24 before it leaves this module.
//!
//! Read errors are split in two. A poll timeout, a short buffer or an
//! undecodable frame is a `Capture::Missed`. An errno that means the node is
//! gone (ENODEV, ENXIO, EBADF) is returned as `Err`.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::io;
use std::time::Duration;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{CameraKind, Capture, CaptureFailure, FrameSource};
use crate::frame::Frame;

/// How long a single read may block before it counts as a miss.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);
const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    device: String,
    kind: CameraKind,
    width: u32,
    height: u32,
    state: Option<DeviceState>,
    format: PixelFormat,
    frame_count: u64,
}

#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(device: String, kind: CameraKind, width: u32, height: u32) -> Self {
        Self {
            device,
            kind,
            width,
            height,
            state: None,
            format: PixelFormat::Rgb24,
            frame_count: 0,
        }
    }

    fn preferred_formats(&self) -> &'static [PixelFormat] {
        match self.kind {
            CameraKind::PiCamera => &[PixelFormat::Rgb24, PixelFormat::Yuyv],
            CameraKind::Usb => &[PixelFormat::Yuyv, PixelFormat::Mjpeg, PixelFormat::Rgb24],
        }
    }

    /// Ask the driver for each preferred format in turn and keep the first one
    /// it actually grants.
    fn negotiate(&self, device: &mut v4l::Device) -> Result<(PixelFormat, u32, u32)> {
        use v4l::video::Capture as _;

        for &wanted in self.preferred_formats() {
            let mut format = device.format().context("read v4l2 format")?;
            format.width = self.width;
            format.height = self.height;
            format.fourcc = v4l::FourCC::new(wanted.fourcc());
            let granted = match device.set_format(&format) {
                Ok(granted) => granted,
                Err(err) => {
                    log::warn!(
                        "V4l2Camera: {} rejected {}: {}",
                        self.device,
                        String::from_utf8_lossy(wanted.fourcc()),
                        err
                    );
                    continue;
                }
            };
            if let Some(pixel_format) = PixelFormat::from_fourcc(&granted.fourcc.repr) {
                if pixel_format == wanted {
                    return Ok((pixel_format, granted.width, granted.height));
                }
            }
        }
        Err(anyhow!(
            "{} offers none of the supported pixel formats for a {} camera",
            self.device,
            self.kind
        ))
    }
}

impl FrameSource for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn open(&mut self) -> Result<()> {
        use v4l::buffer::Type;

        let mut device = v4l::Device::with_path(&self.device)
            .with_context(|| format!("open v4l2 device {}", self.device))?;
        let (format, width, height) = self.negotiate(&mut device)?;
        if (width, height) != (self.width, self.height) {
            log::warn!(
                "V4l2Camera: {} granted {}x{} instead of {}x{}",
                self.device,
                width,
                height,
                self.width,
                self.height
            );
        }
        self.format = format;
        self.width = width;
        self.height = height;

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                let mut stream =
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))?;
                stream.set_timeout(CAPTURE_TIMEOUT);
                Ok::<_, anyhow::Error>(stream)
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "V4l2Camera: connected to {} kind={} format={} ({}x{})",
            self.device,
            self.kind,
            String::from_utf8_lossy(self.format.fourcc()),
            self.width,
            self.height
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Capture> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.width, self.height, self.format);
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("v4l2 device {} not open", self.device))?;

        let converted = state.with_mut(|fields| match fields.stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                let used = if used == 0 { buf.len() } else { used };
                Ok(normalize_to_rgb(&buf[..used], width, height, format))
            }
            Err(err) => Err(err),
        });

        match converted {
            Ok(Ok(pixels)) => {
                self.frame_count += 1;
                Ok(Capture::Frame(Frame::new(
                    pixels,
                    width,
                    height,
                    self.frame_count,
                )))
            }
            Ok(Err(err)) => Ok(Capture::Missed(CaptureFailure::new(format!("{:#}", err)))),
            Err(err) if is_device_lost(&err) => {
                self.state = None;
                Err(anyhow::Error::new(err).context(format!("v4l2 device {} lost", self.device)))
            }
            Err(err) => Ok(Capture::Missed(CaptureFailure::new(format!(
                "read {}: {}",
                self.device, err
            )))),
        }
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Camera: released {}", self.device);
        }
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_device_lost(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(code) if code == libc::ENODEV || code == libc::ENXIO || code == libc::EBADF
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_device_errnos_are_hard_errors() {
        assert!(is_device_lost(&io::Error::from_raw_os_error(libc::ENODEV)));
        assert!(!is_device_lost(&io::Error::from_raw_os_error(libc::EAGAIN)));
        assert!(!is_device_lost(&io::Error::new(
            io::ErrorKind::TimedOut,
            "poll timeout"
        )));
    }

    #[test]
    fn pi_camera_prefers_native_rgb() {
        let pi = V4l2Camera::new("/dev/video0".into(), CameraKind::PiCamera, 640, 480);
        assert_eq!(pi.preferred_formats()[0], PixelFormat::Rgb24);
        let usb = V4l2Camera::new("/dev/video1".into(), CameraKind::Usb, 640, 480);
        assert_eq!(usb.preferred_formats()[0], PixelFormat::Yuyv);
    }

    #[test]
    fn missing_node_fails_to_open() {
        let mut camera = V4l2Camera::new(
            "/dev/video-does-not-exist".into(),
            CameraKind::Usb,
            640,
            480,
        );
        assert!(camera.open().is_err());
        assert!(camera.capture().is_err());
        camera.close();
    }
}
