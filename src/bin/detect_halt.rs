//! detect_halt - run a motor until the camera sees a target object.
//!
//! 1. Loads configuration (file, environment, flags)
//! 2. Claims the motor pins, opens the camera, loads the detector
//! 3. Starts the motor and searches at the configured interval
//! 4. Halts on the first target detection at or above the threshold, or on
//!    Ctrl-C / SIGTERM
//!
//! Exit codes: 0 halted or interrupted, 2 GPIO, 3 camera, 4 model, 5 camera
//! lost mid-run, 1 anything else.
//!
//! Hardware-free run with the default build:
//!
//! ```text
//! detect_halt --dry-run --camera-device stub://bench --model stub://bottle
//! ```

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use detect_halt::actuator::MotorActuator;
use detect_halt::config::{CameraSettings, DetectionSettings, MotorSettings};
use detect_halt::detect::Detector;
use detect_halt::ingest::FrameSource;
use detect_halt::{
    exit_code_for, ConfiguredRig, ControlLoop, GpioDriver, HaltConfig, Overrides, Rig,
    StopReason, StopSignal,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run a DC motor until a camera detects a target object"
)]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "DETECT_HALT_CONFIG")]
    config: Option<PathBuf>,

    /// Motor duty cycle percent (clamped to 0..=100).
    #[arg(long, allow_hyphen_values = true)]
    speed: Option<i64>,

    /// Confidence needed to halt (clamped to 0.0..=1.0).
    #[arg(long, allow_hyphen_values = true)]
    threshold: Option<f64>,

    /// Camera index, or "auto".
    #[arg(long, value_name = "INDEX")]
    camera_index: Option<String>,

    /// Camera device node, or stub://<name> for the synthetic camera.
    #[arg(long, value_name = "DEVICE")]
    camera_device: Option<String>,

    /// Model path, or stub://<label> for the brightness stub.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Use the simulated GPIO driver instead of real pins.
    #[arg(long)]
    dry_run: bool,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

/// Wraps each startup step in a UI stage.
struct StagedRig {
    inner: ConfiguredRig,
    ui: ui::Ui,
}

impl StagedRig {
    fn staged<T>(
        &mut self,
        name: &str,
        step: impl FnOnce(&mut ConfiguredRig) -> Result<T>,
    ) -> Result<T> {
        let inner = &mut self.inner;
        self.ui.step(name, || step(inner))
    }
}

impl Rig for StagedRig {
    fn claim_actuator(&mut self, settings: &MotorSettings) -> Result<MotorActuator> {
        self.staged("Claim motor GPIO", |rig| rig.claim_actuator(settings))
    }

    fn open_camera(&mut self, settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
        self.staged("Open camera", |rig| rig.open_camera(settings))
    }

    fn load_detector(
        &mut self,
        detection: &DetectionSettings,
        camera: &CameraSettings,
    ) -> Result<Detector> {
        self.staged("Load detection model", |rig| {
            rig.load_detector(detection, camera)
        })
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("detect_halt failed: {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: Args) -> Result<()> {
    let ui = ui::Ui::from_flag(&args.ui, std::io::stderr().is_terminal());

    let overrides = Overrides {
        speed: args.speed,
        threshold: args.threshold,
        camera_index: args.camera_index.clone(),
        camera_device: args.camera_device.clone(),
        model_path: args.model.clone(),
        driver: args.dry_run.then_some(GpioDriver::Simulated),
    };
    let config = ui.step("Load configuration", || {
        HaltConfig::load_with(args.config.as_deref(), &overrides)
    })?;
    log::info!(
        "config loaded driver={:?} pins={:?} speed={}% threshold={} targets={:?} interval_ms={}",
        config.motor.driver,
        config.motor.pins.as_array(),
        config.motor.speed,
        config.detection.confidence_threshold,
        config.detection.target_classes,
        config.detection.interval.as_millis()
    );

    let stop = StopSignal::new();
    stop.install_ctrlc_handler()?;

    let mut rig = StagedRig {
        inner: ConfiguredRig,
        ui,
    };
    let outcome = ControlLoop::new(&config, stop).run(&mut rig)?;
    match &outcome.reason {
        StopReason::Detected(hit) => log::info!(
            "motor halted on {} (confidence {:.3}) after {} ticks",
            hit.label,
            hit.confidence,
            outcome.stats.ticks
        ),
        StopReason::Interrupted => log::info!(
            "motor halted by stop request after {} ticks",
            outcome.stats.ticks
        ),
    }
    Ok(())
}
