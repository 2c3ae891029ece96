//! Synthetic camera for `stub://` devices.
//!
//! Produces deterministic RGB frames whose overall brightness ramps up with the
//! frame count, wrapping at 256. Paired with the stub detector this gives a dry
//! run that eventually "sees" its target. `stub://name?miss_every=N` makes every
//! Nth read a transient miss so the soft-failure path can be exercised without
//! hardware.

use anyhow::{anyhow, Result};

use super::{Capture, CaptureFailure, FrameSource};
use crate::frame::Frame;

/// Brightness added per frame.
const RAMP_STEP: u64 = 8;

pub struct SyntheticCamera {
    device: String,
    width: u32,
    height: u32,
    miss_every: Option<u64>,
    reads: u64,
    frame_count: u64,
    open: bool,
}

impl SyntheticCamera {
    pub fn new(device: &str, width: u32, height: u32) -> Self {
        Self {
            device: device.to_string(),
            width,
            height,
            miss_every: parse_miss_every(device),
            reads: 0,
            frame_count: 0,
            open: false,
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let len = Frame::expected_len(self.width, self.height).unwrap_or(0);
        let base = ((self.frame_count * RAMP_STEP) % 256) as u8;
        let mut pixels = vec![0u8; len];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            // Small fixed texture so frames are not flat.
            *pixel = base.saturating_add((i % 4) as u8);
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    /// Synthetic sources are always "connected".
    fn open(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!("synthetic camera needs a non-zero resolution"));
        }
        self.open = true;
        log::info!(
            "SyntheticCamera: connected to {} ({}x{})",
            self.device,
            self.width,
            self.height
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Capture> {
        if !self.open {
            return Err(anyhow!("synthetic camera {} is not open", self.device));
        }
        self.reads += 1;
        if let Some(every) = self.miss_every {
            if self.reads % every == 0 {
                return Ok(Capture::Missed(CaptureFailure::new(format!(
                    "synthetic drop on read {}",
                    self.reads
                ))));
            }
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Capture::Frame(Frame::new(
            pixels,
            self.width,
            self.height,
            self.frame_count,
        )))
    }

    fn close(&mut self) {
        if self.open {
            log::info!("SyntheticCamera: released {}", self.device);
        }
        self.open = false;
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

fn parse_miss_every(device: &str) -> Option<u64> {
    let (_, query) = device.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "miss_every")
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .filter(|every| *every > 0)
}
