//! YOLOv8 output decoding.
//!
//! The ONNX export emits one tensor of shape `[1, 4 + classes, anchors]`
//! (some exporters transpose it to `[1, anchors, 4 + classes]`). Each anchor
//! carries a center-format box in letterboxed input pixels followed by one
//! score per class.

#![cfg_attr(not(feature = "backend-tract"), allow(dead_code))]

use anyhow::{anyhow, Result};

use super::result::{BoundingBox, Detection};

/// Scores below this are noise, not low-confidence objects.
pub const SCORE_FLOOR: f32 = 0.001;
pub const NMS_IOU: f32 = 0.45;
pub const MAX_DETECTIONS: usize = 300;
/// Fill value for the letterbox border.
pub const PAD_VALUE: u8 = 114;

/// Placement of a frame inside the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, input_size: u32) -> Self {
        let scale = (input_size as f32 / width.max(1) as f32)
            .min(input_size as f32 / height.max(1) as f32);
        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, input_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, input_size);
        Self {
            scale,
            pad_x: (input_size - scaled_width) / 2,
            pad_y: (input_size - scaled_height) / 2,
            scaled_width,
            scaled_height,
        }
    }

    /// Map a center-format box in input pixels back onto the frame.
    pub fn to_frame(&self, cx: f32, cy: f32, w: f32, h: f32, width: u32, height: u32) -> BoundingBox {
        let unmap_x = |x: f32| ((x - self.pad_x as f32) / self.scale).clamp(0.0, width as f32);
        let unmap_y = |y: f32| ((y - self.pad_y as f32) / self.scale).clamp(0.0, height as f32);
        BoundingBox::new(
            unmap_x(cx - w / 2.0),
            unmap_y(cy - h / 2.0),
            unmap_x(cx + w / 2.0),
            unmap_y(cy + h / 2.0),
        )
    }
}

/// Turn a raw output tensor into per-anchor best-class detections.
pub fn decode(
    data: &[f32],
    shape: &[usize],
    labels: &[String],
    letterbox: &Letterbox,
    width: u32,
    height: u32,
) -> Result<Vec<Detection>> {
    let channels = 4 + labels.len();
    let (anchors, channel_major) = match shape {
        [1, c, n] if *c == channels => (*n, true),
        [1, n, c] if *c == channels => (*n, false),
        _ => {
            return Err(anyhow!(
                "model output shape {:?} does not match {} labels",
                shape,
                labels.len()
            ))
        }
    };
    if data.len() != anchors * channels {
        return Err(anyhow!(
            "model output has {} values, expected {}",
            data.len(),
            anchors * channels
        ));
    }

    let at = |channel: usize, anchor: usize| {
        if channel_major {
            data[channel * anchors + anchor]
        } else {
            data[anchor * channels + channel]
        }
    };

    let mut detections = Vec::new();
    for anchor in 0..anchors {
        let (class, score) = (0..labels.len())
            .map(|class| (class, at(4 + class, anchor)))
            .fold((0, f32::NEG_INFINITY), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });
        if !score.is_finite() || score < SCORE_FLOOR {
            continue;
        }
        let bbox = letterbox.to_frame(
            at(0, anchor),
            at(1, anchor),
            at(2, anchor),
            at(3, anchor),
            width,
            height,
        );
        detections.push(Detection::new(
            labels[class].clone(),
            score.min(1.0),
            bbox,
        ));
    }
    Ok(detections)
}

/// Greedy class-wise non-maximum suppression. Output is sorted by confidence,
/// highest first, and capped at `max`.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou: f32, max: usize) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.label == candidate.label && k.bbox.iou(&candidate.bbox) > iou);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["person".to_string(), "bottle".to_string()]
    }

    #[test]
    fn letterbox_centers_landscape_frame() {
        let lb = Letterbox::fit(640, 480, 640);
        assert_eq!(lb.scale, 1.0);
        assert_eq!((lb.scaled_width, lb.scaled_height), (640, 480));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 80));

        let bbox = lb.to_frame(320.0, 320.0, 100.0, 100.0, 640, 480);
        assert_eq!(bbox, BoundingBox::new(270.0, 190.0, 370.0, 290.0));
    }

    #[test]
    fn decode_channel_major_picks_best_class() -> Result<()> {
        // Two anchors; channels: cx, cy, w, h, person, bottle.
        let data = vec![
            100.0, 200.0, // cx
            100.0, 200.0, // cy
            20.0, 20.0, // w
            20.0, 20.0, // h
            0.10, 0.0005, // person
            0.70, 0.0002, // bottle
        ];
        let lb = Letterbox::fit(640, 640, 640);
        let detections = decode(&data, &[1, 6, 2], &labels(), &lb, 640, 640)?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label, "bottle");
        assert!((detections[0].confidence - 0.70).abs() < 1e-6);
        assert_eq!(detections[0].bbox, BoundingBox::new(90.0, 90.0, 110.0, 110.0));
        Ok(())
    }

    #[test]
    fn decode_accepts_transposed_layout() -> Result<()> {
        let data = vec![50.0, 50.0, 10.0, 10.0, 0.9, 0.1];
        let lb = Letterbox::fit(640, 640, 640);
        let detections = decode(&data, &[1, 1, 6], &labels(), &lb, 640, 640)?;
        assert_eq!(detections[0].label, "person");
        Ok(())
    }

    #[test]
    fn decode_rejects_label_mismatch() {
        let lb = Letterbox::fit(640, 640, 640);
        assert!(decode(&[0.0; 84], &[1, 84, 1], &labels(), &lb, 640, 640).is_err());
    }

    #[test]
    fn nms_suppresses_same_class_overlap_only() {
        let a = Detection::new("bottle", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = Detection::new("bottle", 0.8, BoundingBox::new(1.0, 1.0, 11.0, 11.0));
        let c = Detection::new("person", 0.7, BoundingBox::new(1.0, 1.0, 11.0, 11.0));
        let kept = non_max_suppression(vec![b, c, a], NMS_IOU, MAX_DETECTIONS);
        let labels: Vec<_> = kept.iter().map(|d| (d.label.as_str(), d.confidence)).collect();
        assert_eq!(labels, vec![("bottle", 0.9), ("person", 0.7)]);
    }

    #[test]
    fn nms_caps_output() {
        let many: Vec<_> = (0..10)
            .map(|i| {
                let x = i as f32 * 20.0;
                Detection::new("bottle", 0.5, BoundingBox::new(x, 0.0, x + 10.0, 10.0))
            })
            .collect();
        assert_eq!(non_max_suppression(many, NMS_IOU, 4).len(), 4);
    }
}
