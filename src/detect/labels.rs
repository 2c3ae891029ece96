use anyhow::{anyhow, Result};
use std::path::Path;

/// Class names of the COCO-trained YOLOv8 exports, in output order.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Labels from a newline-separated file, or the COCO set when `path` is `None`.
pub fn load_labels(path: Option<&Path>) -> Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(COCO_CLASSES.iter().map(|s| s.to_string()).collect());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read labels file {}: {}", path.display(), e))?;
    let labels: Vec<String> = raw
        .lines()
        .map(|line| line.trim().to_lowercase())
        .filter(|line| !line.is_empty())
        .collect();
    if labels.is_empty() {
        return Err(anyhow!("labels file {} is empty", path.display()));
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coco_defaults_include_bottle() -> Result<()> {
        let labels = load_labels(None)?;
        assert_eq!(labels.len(), 80);
        assert_eq!(labels[39], "bottle");
        Ok(())
    }

    #[test]
    fn labels_file_is_trimmed_and_lowercased() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "Can\n\n  Bottle  ")?;
        let labels = load_labels(Some(file.path()))?;
        assert_eq!(labels, vec!["can", "bottle"]);
        Ok(())
    }

    #[test]
    fn empty_labels_file_rejected() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        assert!(load_labels(Some(file.path())).is_err());
        Ok(())
    }
}
