use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::CameraKind;

const DEFAULT_MOTOR_PIN1: u8 = 17;
const DEFAULT_MOTOR_PIN2: u8 = 18;
const DEFAULT_ENABLE_PIN: u8 = 27;
const DEFAULT_MOTOR_SPEED: u8 = 50;
const DEFAULT_PWM_FREQUENCY_HZ: f64 = 1000.0;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_TARGET_CLASS: &str = "bottle";
const DEFAULT_INTERVAL_MS: u64 = 100;
const DEFAULT_MODEL_PATH: &str = "models/yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

/// Highest BCM GPIO number broken out on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

#[derive(Debug, Deserialize, Default)]
struct HaltConfigFile {
    motor: Option<MotorConfigFile>,
    detection: Option<DetectionConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MotorConfigFile {
    pin1: Option<u8>,
    pin2: Option<u8>,
    enable_pin: Option<u8>,
    speed: Option<i64>,
    pwm_frequency_hz: Option<f64>,
    driver: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f64>,
    target_classes: Option<Vec<String>>,
    interval_ms: Option<u64>,
    model_path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<CameraIndexFile>,
    width: Option<u32>,
    height: Option<u32>,
    device: Option<String>,
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CameraIndexFile {
    Index(i64),
    Named(String),
}

/// Immutable run configuration. Built once at startup.
#[derive(Debug, Clone)]
pub struct HaltConfig {
    pub motor: MotorSettings,
    pub detection: DetectionSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone)]
pub struct MotorSettings {
    pub pins: MotorPins,
    /// Duty cycle percent used for `start`, already clamped to 0..=100.
    pub speed: u8,
    pub pwm_frequency_hz: f64,
    pub driver: GpioDriver,
}

/// BCM numbers of the H-bridge inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorPins {
    pub pin1: u8,
    pub pin2: u8,
    pub enable: u8,
}

impl MotorPins {
    pub fn as_array(&self) -> [u8; 3] {
        [self.pin1, self.pin2, self.enable]
    }

    pub fn validate(&self) -> Result<()> {
        for pin in self.as_array() {
            if pin > MAX_BCM_PIN {
                return Err(anyhow!(
                    "GPIO {} is outside the header range 0..={}",
                    pin,
                    MAX_BCM_PIN
                ));
            }
        }
        if self.pin1 == self.pin2 || self.pin1 == self.enable || self.pin2 == self.enable {
            return Err(anyhow!(
                "motor pins must not overlap (pin1={}, pin2={}, enable={})",
                self.pin1,
                self.pin2,
                self.enable
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDriver {
    Rppal,
    Simulated,
}

impl GpioDriver {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rppal" | "gpio" => Ok(GpioDriver::Rppal),
            "simulated" | "sim" | "stub" => Ok(GpioDriver::Simulated),
            other => Err(anyhow!("unknown GPIO driver '{}' (use rppal|simulated)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    /// Already clamped to 0.0..=1.0.
    pub confidence_threshold: f32,
    /// Lowercased, trimmed, deduplicated. Never empty after validation.
    pub target_classes: Vec<String>,
    /// Minimum spacing between inference calls.
    pub interval: Duration,
    pub model_path: PathBuf,
    pub labels_path: Option<PathBuf>,
    /// Square model input edge in pixels.
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: CameraIndex,
    pub width: u32,
    pub height: u32,
    /// Explicit device override (`stub://...` or a device node path).
    pub device: Option<String>,
    pub kind: Option<CameraKind>,
}

impl CameraSettings {
    pub fn is_synthetic(&self) -> bool {
        self.device
            .as_deref()
            .is_some_and(|device| device.starts_with("stub://"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraIndex {
    /// Resolved by discovery before the camera is opened.
    Auto,
    Index(u32),
}

impl CameraIndex {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("auto") {
            return Ok(CameraIndex::Auto);
        }
        let index: i64 = value
            .parse()
            .map_err(|_| anyhow!("camera index must be a non-negative integer or \"auto\""))?;
        Self::from_signed(index)
    }

    fn from_signed(index: i64) -> Result<Self> {
        u32::try_from(index)
            .map(CameraIndex::Index)
            .map_err(|_| anyhow!("camera index {} must be non-negative", index))
    }
}

/// Values supplied on the command line. Applied after the file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub speed: Option<i64>,
    pub threshold: Option<f64>,
    pub camera_index: Option<String>,
    /// `stub://...` or a device node path.
    pub camera_device: Option<String>,
    pub model_path: Option<PathBuf>,
    pub driver: Option<GpioDriver>,
}

impl Default for HaltConfig {
    fn default() -> Self {
        Self {
            motor: MotorSettings {
                pins: MotorPins {
                    pin1: DEFAULT_MOTOR_PIN1,
                    pin2: DEFAULT_MOTOR_PIN2,
                    enable: DEFAULT_ENABLE_PIN,
                },
                speed: DEFAULT_MOTOR_SPEED,
                pwm_frequency_hz: DEFAULT_PWM_FREQUENCY_HZ,
                driver: GpioDriver::Rppal,
            },
            detection: DetectionSettings {
                confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
                target_classes: vec![DEFAULT_TARGET_CLASS.to_string()],
                interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
                model_path: PathBuf::from(DEFAULT_MODEL_PATH),
                labels_path: None,
                input_size: DEFAULT_INPUT_SIZE,
            },
            camera: CameraSettings {
                index: CameraIndex::Auto,
                width: DEFAULT_CAMERA_WIDTH,
                height: DEFAULT_CAMERA_HEIGHT,
                device: None,
                kind: None,
            },
        }
    }
}

impl HaltConfig {
    /// Load using `DETECT_HALT_CONFIG` (if set) and environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_with(None, &Overrides::default())
    }

    /// Load from `path` (falling back to `DETECT_HALT_CONFIG`), then apply
    /// environment variables, then `overrides`, then validate.
    pub fn load_with(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let env_path = std::env::var("DETECT_HALT_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let config_path = path.map(Path::to_path_buf).or(env_path);
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(path)?,
            None => HaltConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.apply_overrides(overrides)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: HaltConfigFile =
            toml::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: HaltConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let motor_file = file.motor.unwrap_or_default();
        let detection_file = file.detection.unwrap_or_default();
        let camera_file = file.camera.unwrap_or_default();

        let motor = MotorSettings {
            pins: MotorPins {
                pin1: motor_file.pin1.unwrap_or(defaults.motor.pins.pin1),
                pin2: motor_file.pin2.unwrap_or(defaults.motor.pins.pin2),
                enable: motor_file.enable_pin.unwrap_or(defaults.motor.pins.enable),
            },
            speed: match motor_file.speed {
                Some(speed) => clamp_speed(speed),
                None => defaults.motor.speed,
            },
            pwm_frequency_hz: motor_file
                .pwm_frequency_hz
                .unwrap_or(defaults.motor.pwm_frequency_hz),
            driver: match motor_file.driver.as_deref() {
                Some(driver) => GpioDriver::parse(driver)?,
                None => defaults.motor.driver,
            },
        };

        let detection = DetectionSettings {
            confidence_threshold: match detection_file.confidence_threshold {
                Some(threshold) => clamp_threshold(threshold)?,
                None => defaults.detection.confidence_threshold,
            },
            target_classes: detection_file
                .target_classes
                .unwrap_or(defaults.detection.target_classes),
            interval: detection_file
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.detection.interval),
            model_path: detection_file
                .model_path
                .unwrap_or(defaults.detection.model_path),
            labels_path: detection_file.labels_path,
            input_size: detection_file
                .input_size
                .unwrap_or(defaults.detection.input_size),
        };

        let camera = CameraSettings {
            index: match camera_file.index {
                Some(CameraIndexFile::Index(index)) => CameraIndex::from_signed(index)?,
                Some(CameraIndexFile::Named(name)) => CameraIndex::parse(&name)?,
                None => defaults.camera.index,
            },
            width: camera_file.width.unwrap_or(defaults.camera.width),
            height: camera_file.height.unwrap_or(defaults.camera.height),
            device: camera_file.device.filter(|d| !d.trim().is_empty()),
            kind: match camera_file.kind.as_deref() {
                Some(kind) => Some(CameraKind::parse(kind)?),
                None => None,
            },
        };

        Ok(Self {
            motor,
            detection,
            camera,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(speed) = env_value("DETECT_HALT_MOTOR_SPEED") {
            let speed: i64 = speed
                .parse()
                .map_err(|_| anyhow!("DETECT_HALT_MOTOR_SPEED must be an integer"))?;
            self.motor.speed = clamp_speed(speed);
        }
        if let Some(threshold) = env_value("DETECT_HALT_THRESHOLD") {
            let threshold: f64 = threshold
                .parse()
                .map_err(|_| anyhow!("DETECT_HALT_THRESHOLD must be a number"))?;
            self.detection.confidence_threshold = clamp_threshold(threshold)?;
        }
        if let Some(classes) = env_value("DETECT_HALT_TARGET_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.detection.target_classes = parsed;
            }
        }
        if let Some(interval) = env_value("DETECT_HALT_INTERVAL_MS") {
            let ms: u64 = interval.parse().map_err(|_| {
                anyhow!("DETECT_HALT_INTERVAL_MS must be a non-negative integer")
            })?;
            self.detection.interval = Duration::from_millis(ms);
        }
        if let Some(path) = env_value("DETECT_HALT_MODEL_PATH") {
            self.detection.model_path = PathBuf::from(path);
        }
        if let Some(index) = env_value("DETECT_HALT_CAMERA_INDEX") {
            self.camera.index = CameraIndex::parse(&index)?;
        }
        if let Some(device) = env_value("DETECT_HALT_CAMERA_DEVICE") {
            self.camera.device = Some(device);
        }
        if let Some(driver) = env_value("DETECT_HALT_GPIO_DRIVER") {
            self.motor.driver = GpioDriver::parse(&driver)?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(speed) = overrides.speed {
            self.motor.speed = clamp_speed(speed);
        }
        if let Some(threshold) = overrides.threshold {
            self.detection.confidence_threshold = clamp_threshold(threshold)?;
        }
        if let Some(index) = overrides.camera_index.as_deref() {
            self.camera.index = CameraIndex::parse(index)?;
        }
        if let Some(device) = overrides.camera_device.as_deref() {
            let device = device.trim();
            if !device.is_empty() {
                self.camera.device = Some(device.to_string());
            }
        }
        if let Some(path) = &overrides.model_path {
            self.detection.model_path = path.clone();
        }
        if let Some(driver) = overrides.driver {
            self.motor.driver = driver;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.motor.pins.validate()?;

        if !self.motor.pwm_frequency_hz.is_finite() || self.motor.pwm_frequency_hz <= 0.0 {
            return Err(anyhow!("pwm_frequency_hz must be a positive number"));
        }

        let mut classes: Vec<String> = Vec::new();
        for class in &self.detection.target_classes {
            let class = class.trim().to_lowercase();
            if !class.is_empty() && !classes.contains(&class) {
                classes.push(class);
            }
        }
        if classes.is_empty() {
            return Err(anyhow!("target_classes must name at least one label"));
        }
        self.detection.target_classes = classes;

        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution must be positive (got {}x{})",
                self.camera.width,
                self.camera.height
            ));
        }

        let input_size = self.detection.input_size;
        if input_size == 0 || input_size % 32 != 0 {
            return Err(anyhow!(
                "input_size must be a positive multiple of 32 (got {})",
                input_size
            ));
        }
        Ok(())
    }
}

fn clamp_speed(speed: i64) -> u8 {
    let clamped = speed.clamp(0, 100);
    if clamped != speed {
        log::warn!("motor speed {} out of range, clamped to {}", speed, clamped);
    }
    clamped as u8
}

fn clamp_threshold(threshold: f64) -> Result<f32> {
    if threshold.is_nan() {
        return Err(anyhow!("confidence_threshold must be a number"));
    }
    let clamped = threshold.clamp(0.0, 1.0);
    if clamped != threshold {
        log::warn!(
            "confidence threshold {} out of range, clamped to {}",
            threshold,
            clamped
        );
    }
    Ok(clamped as f32)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<HaltConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
