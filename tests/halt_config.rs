use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use detect_halt::config::{CameraIndex, GpioDriver, HaltConfig, Overrides};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECT_HALT_CONFIG",
        "DETECT_HALT_MOTOR_SPEED",
        "DETECT_HALT_THRESHOLD",
        "DETECT_HALT_TARGET_CLASSES",
        "DETECT_HALT_INTERVAL_MS",
        "DETECT_HALT_MODEL_PATH",
        "DETECT_HALT_CAMERA_INDEX",
        "DETECT_HALT_CAMERA_DEVICE",
        "DETECT_HALT_GPIO_DRIVER",
    ] {
        std::env::remove_var(key);
    }
}

fn lock_env() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = lock_env();
    clear_env();

    let cfg = HaltConfig::load().expect("load defaults");

    assert_eq!(cfg.motor.pins.as_array(), [17, 18, 27]);
    assert_eq!(cfg.motor.speed, 50);
    assert_eq!(cfg.motor.pwm_frequency_hz, 1000.0);
    assert_eq!(cfg.motor.driver, GpioDriver::Rppal);
    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.detection.target_classes, vec!["bottle"]);
    assert_eq!(cfg.detection.interval, Duration::from_millis(100));
    assert_eq!(cfg.detection.model_path, PathBuf::from("models/yolov8n.onnx"));
    assert_eq!(cfg.camera.index, CameraIndex::Auto);
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
}

#[test]
fn loads_toml_file_with_env_overrides() {
    let _guard = lock_env();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[motor]
pin1 = 5
pin2 = 6
enable_pin = 13
speed = 70
driver = "simulated"

[detection]
confidence_threshold = 0.6
target_classes = ["Bottle", "cup"]
interval_ms = 250
model_path = "stub://bottle"

[camera]
index = 1
width = 320
height = 240
"#,
    );

    std::env::set_var("DETECT_HALT_CONFIG", file.path());
    std::env::set_var("DETECT_HALT_THRESHOLD", "0.8");
    std::env::set_var("DETECT_HALT_TARGET_CLASSES", "can, bottle");

    let cfg = HaltConfig::load().expect("load config");

    assert_eq!(cfg.motor.pins.as_array(), [5, 6, 13]);
    assert_eq!(cfg.motor.speed, 70);
    assert_eq!(cfg.motor.driver, GpioDriver::Simulated);
    assert_eq!(cfg.detection.confidence_threshold, 0.8);
    assert_eq!(cfg.detection.target_classes, vec!["can", "bottle"]);
    assert_eq!(cfg.detection.interval, Duration::from_millis(250));
    assert_eq!(cfg.camera.index, CameraIndex::Index(1));
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));

    clear_env();
}

#[test]
fn loads_json_file_by_extension() {
    let _guard = lock_env();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "motor": { "speed": 30 },
            "detection": { "target_classes": ["CUP", "cup"] },
            "camera": { "index": "auto", "device": "stub://bench" }
        }"#,
    );

    let cfg = HaltConfig::load_with(Some(file.path()), &Overrides::default()).expect("load json");

    assert_eq!(cfg.motor.speed, 30);
    assert_eq!(cfg.detection.target_classes, vec!["cup"]);
    assert_eq!(cfg.camera.index, CameraIndex::Auto);
    assert!(cfg.camera.is_synthetic());
}

#[test]
fn cli_overrides_beat_env_and_clamp() {
    let _guard = lock_env();
    clear_env();

    std::env::set_var("DETECT_HALT_MOTOR_SPEED", "40");
    std::env::set_var("DETECT_HALT_CAMERA_INDEX", "2");

    let overrides = Overrides {
        speed: Some(150),
        threshold: Some(-0.2),
        camera_index: Some("auto".to_string()),
        camera_device: Some(" stub://bench ".to_string()),
        model_path: Some(PathBuf::from("stub://cup")),
        driver: Some(GpioDriver::Simulated),
    };
    let cfg = HaltConfig::load_with(None, &overrides).expect("load overrides");

    assert_eq!(cfg.motor.speed, 100);
    assert_eq!(cfg.detection.confidence_threshold, 0.0);
    assert_eq!(cfg.camera.index, CameraIndex::Auto);
    assert_eq!(cfg.camera.device.as_deref(), Some("stub://bench"));
    assert!(cfg.camera.is_synthetic());
    assert_eq!(cfg.detection.model_path, PathBuf::from("stub://cup"));
    assert_eq!(cfg.motor.driver, GpioDriver::Simulated);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = lock_env();
    clear_env();

    std::env::set_var("DETECT_HALT_CAMERA_INDEX", "-1");
    assert!(HaltConfig::load().is_err());
    clear_env();

    std::env::set_var("DETECT_HALT_GPIO_DRIVER", "pigpio");
    assert!(HaltConfig::load().is_err());
    clear_env();

    let overlapping = write_config(".toml", "[motor]\npin1 = 17\npin2 = 17\n");
    assert!(HaltConfig::load_with(Some(overlapping.path()), &Overrides::default()).is_err());

    let empty_targets = write_config(".toml", "[detection]\ntarget_classes = [\" \"]\n");
    assert!(HaltConfig::load_with(Some(empty_targets.path()), &Overrides::default()).is_err());

    let missing = PathBuf::from("/nonexistent/detect_halt.toml");
    assert!(HaltConfig::load_with(Some(&missing), &Overrides::default()).is_err());
}
