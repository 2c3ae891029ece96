//! The detect-and-halt loop.
//!
//! `ControlLoop` acquires the motor, the camera and the detector (in that
//! order), starts the motor, then captures and infers at a fixed minimum
//! interval until a target-class detection reaches the confidence threshold or
//! a stop is requested. The stop is one-shot: once halted the run is over.
//!
//! Whatever happens, the motor ends up stopped and its pins released exactly
//! once before `run` returns.

mod rate;
mod signal;

use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Result;

pub use rate::RateLimiter;
pub use signal::StopSignal;

use crate::actuator::MotorActuator;
use crate::config::{CameraSettings, DetectionSettings, HaltConfig, MotorSettings};
use crate::detect::{Detection, Detector};
use crate::error::{classify, HaltError};
use crate::ingest::{self, discovery, Capture, FrameSource};

/// Spacing of the periodic health line while searching.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    RunningSearching,
    StoppedTerminal,
    ErrorTerminal,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Starting => "starting",
            LoopState::RunningSearching => "running_searching",
            LoopState::StoppedTerminal => "stopped_terminal",
            LoopState::ErrorTerminal => "error_terminal",
        };
        f.write_str(name)
    }
}

/// Why a run ended without error.
#[derive(Clone, Debug, PartialEq)]
pub enum StopReason {
    /// A target detection met the threshold.
    Detected(Detection),
    Interrupted,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoopStats {
    pub ticks: u64,
    pub frames: u64,
    pub capture_misses: u64,
    pub inferences: u64,
    pub inference_failures: u64,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub reason: StopReason,
    pub stats: LoopStats,
}

impl Outcome {
    pub fn halted(&self) -> bool {
        matches!(self.reason, StopReason::Detected(_))
    }
}

/// Where the loop gets its resources from.
///
/// `ConfiguredRig` builds the real ones from the config; tests and the binary's
/// staged UI supply their own.
pub trait Rig {
    fn claim_actuator(&mut self, settings: &MotorSettings) -> Result<MotorActuator>;

    fn open_camera(&mut self, settings: &CameraSettings) -> Result<Box<dyn FrameSource>>;

    fn load_detector(
        &mut self,
        detection: &DetectionSettings,
        camera: &CameraSettings,
    ) -> Result<Detector>;
}

/// Resources built straight from the configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfiguredRig;

impl Rig for ConfiguredRig {
    fn claim_actuator(&mut self, settings: &MotorSettings) -> Result<MotorActuator> {
        MotorActuator::initialize(settings)
    }

    fn open_camera(&mut self, settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
        let index = discovery::resolve_camera_index(settings)
            .map_err(|e| classify(e, HaltError::CameraUnavailable))?;
        log::info!("camera selected index={}", index);
        ingest::open_camera(settings, index)
    }

    fn load_detector(
        &mut self,
        detection: &DetectionSettings,
        camera: &CameraSettings,
    ) -> Result<Detector> {
        Detector::load(detection, camera)
    }
}

/// First detection at or above `threshold`, in detector order.
pub fn first_qualifying(detections: &[Detection], threshold: f32) -> Option<&Detection> {
    detections.iter().find(|d| d.confidence >= threshold)
}

pub struct ControlLoop {
    config: HaltConfig,
    stop: StopSignal,
    state: LoopState,
}

impl ControlLoop {
    pub fn new(config: &HaltConfig, stop: StopSignal) -> Self {
        Self {
            config: config.clone(),
            stop,
            state: LoopState::Starting,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run to completion.
    ///
    /// `Ok` means the motor was halted by a detection or by a stop request.
    /// `Err` carries a `HaltError` for init failures and a lost camera.
    pub fn run<R: Rig + ?Sized>(&mut self, rig: &mut R) -> Result<Outcome> {
        let started = Instant::now();
        let mut stats = LoopStats::default();
        log::info!(
            "control loop starting targets={:?} threshold={} interval_ms={} speed={}%",
            self.config.detection.target_classes,
            self.config.detection.confidence_threshold,
            self.config.detection.interval.as_millis(),
            self.config.motor.speed
        );

        let mut actuator = match rig.claim_actuator(&self.config.motor) {
            Ok(actuator) => actuator,
            Err(err) => return Err(self.fail(classify(err, HaltError::HardwareInit))),
        };
        if self.stop.is_triggered() {
            return self.finish(StopReason::Interrupted, &mut actuator, None, stats, started);
        }

        let mut camera = match rig.open_camera(&self.config.camera) {
            Ok(camera) => camera,
            Err(err) => {
                release(&mut actuator, None);
                return Err(self.fail(classify(err, HaltError::CameraUnavailable)));
            }
        };
        if self.stop.is_triggered() {
            return self.finish(
                StopReason::Interrupted,
                &mut actuator,
                Some(camera.as_mut()),
                stats,
                started,
            );
        }

        let mut detector = match rig.load_detector(&self.config.detection, &self.config.camera) {
            Ok(detector) => detector,
            Err(err) => {
                release(&mut actuator, Some(camera.as_mut()));
                return Err(self.fail(classify(err, HaltError::ModelLoad)));
            }
        };
        if self.stop.is_triggered() {
            return self.finish(
                StopReason::Interrupted,
                &mut actuator,
                Some(camera.as_mut()),
                stats,
                started,
            );
        }

        if let Err(err) = actuator.start(self.config.motor.speed) {
            release(&mut actuator, Some(camera.as_mut()));
            return Err(self.fail(err));
        }
        self.transition(LoopState::RunningSearching);

        match self.search(camera.as_mut(), &mut detector, &mut stats) {
            Ok(reason) => self.finish(reason, &mut actuator, Some(camera.as_mut()), stats, started),
            Err(err) => {
                release(&mut actuator, Some(camera.as_mut()));
                stats.elapsed = started.elapsed();
                log_summary("error", &stats);
                Err(self.fail(err))
            }
        }
    }

    fn search(
        &mut self,
        camera: &mut dyn FrameSource,
        detector: &mut Detector,
        stats: &mut LoopStats,
    ) -> Result<StopReason> {
        let threshold = self.config.detection.confidence_threshold;
        // Capture starts and inference calls are each at least one interval apart.
        let mut capture_pace = RateLimiter::new(self.config.detection.interval);
        let mut inference_pace = RateLimiter::new(self.config.detection.interval);
        let mut next_health = Instant::now() + HEALTH_INTERVAL;

        loop {
            if self.wait_for(&capture_pace) {
                return Ok(StopReason::Interrupted);
            }
            if self.stop.is_triggered() {
                return Ok(StopReason::Interrupted);
            }

            let now = Instant::now();
            if now >= next_health {
                log::info!(
                    "health ticks={} frames={} misses={} inference_failures={} camera={}",
                    stats.ticks,
                    stats.frames,
                    stats.capture_misses,
                    stats.inference_failures,
                    camera.name()
                );
                next_health = now + HEALTH_INTERVAL;
            }

            capture_pace.mark(now);
            stats.ticks += 1;

            let frame = match camera.capture() {
                Ok(Capture::Frame(frame)) => frame,
                Ok(Capture::Missed(miss)) => {
                    stats.capture_misses += 1;
                    log::warn!("capture missed tick={} reason={}", stats.ticks, miss);
                    continue;
                }
                Err(err) => {
                    log::error!("camera lost tick={} error={:#}", stats.ticks, err);
                    return Err(classify(err, HaltError::DeviceLost));
                }
            };
            stats.frames += 1;

            if self.wait_for(&inference_pace) {
                return Ok(StopReason::Interrupted);
            }
            inference_pace.mark(Instant::now());
            let detections = match detector.infer(&frame) {
                Ok(detections) => detections,
                Err(err) => {
                    stats.inference_failures += 1;
                    log::warn!(
                        "inference failed tick={} frame={} error={:#}",
                        stats.ticks,
                        frame.sequence,
                        err
                    );
                    continue;
                }
            };
            stats.inferences += 1;
            log::debug!(
                "tick={} frame={} frame_age_ms={} detections={}",
                stats.ticks,
                frame.sequence,
                frame.age().as_millis(),
                detections.len()
            );

            if let Some(hit) = first_qualifying(&detections, threshold) {
                log::info!(
                    "target detected label={} confidence={:.3} threshold={} tick={}",
                    hit.label,
                    hit.confidence,
                    threshold,
                    stats.ticks
                );
                return Ok(StopReason::Detected(hit.clone()));
            }
        }
    }

    /// Block until `pace` allows the next step. Returns `true` if a stop
    /// arrived meanwhile.
    fn wait_for(&self, pace: &RateLimiter) -> bool {
        let wait = pace.remaining(Instant::now());
        !wait.is_zero() && self.stop.wait_timeout(wait)
    }

    fn finish(
        &mut self,
        reason: StopReason,
        actuator: &mut MotorActuator,
        camera: Option<&mut dyn FrameSource>,
        mut stats: LoopStats,
        started: Instant,
    ) -> Result<Outcome> {
        if reason == StopReason::Interrupted {
            log::info!("stop requested; halting motor");
        }
        let stopped = actuator.stop();
        let shut = actuator.shutdown();
        if let Some(camera) = camera {
            camera.close();
        }
        stats.elapsed = started.elapsed();

        if let Err(err) = stopped.and(shut.map(|_| ())) {
            log_summary("error", &stats);
            return Err(self.fail(err));
        }
        self.transition(LoopState::StoppedTerminal);
        let label = match &reason {
            StopReason::Detected(_) => "halted",
            StopReason::Interrupted => "interrupted",
        };
        log_summary(label, &stats);
        Ok(Outcome { reason, stats })
    }

    fn fail(&mut self, err: anyhow::Error) -> anyhow::Error {
        log::error!("control loop failed: {:#}", err);
        self.transition(LoopState::ErrorTerminal);
        err
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            log::info!("state from={} to={}", self.state, next);
            self.state = next;
        }
    }
}

/// Best-effort cleanup on an error path. The original error wins over any
/// cleanup failure.
fn release(actuator: &mut MotorActuator, camera: Option<&mut dyn FrameSource>) {
    if let Err(err) = actuator.stop() {
        log::error!("motor stop during cleanup failed: {:#}", err);
    }
    if let Err(err) = actuator.shutdown() {
        log::error!("motor shutdown during cleanup failed: {:#}", err);
    }
    if let Some(camera) = camera {
        camera.close();
    }
}

fn log_summary(outcome: &str, stats: &LoopStats) {
    log::info!(
        "run summary outcome={} ticks={} frames={} misses={} inferences={} inference_failures={} elapsed_ms={}",
        outcome,
        stats.ticks,
        stats.frames,
        stats.capture_misses,
        stats.inferences,
        stats.inference_failures,
        stats.elapsed.as_millis()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str, confidence: f32) -> Detection {
        Detection::new(label, confidence, BoundingBox::default())
    }

    #[test]
    fn qualifying_uses_inclusive_threshold() {
        let detections = vec![det("bottle", 0.3), det("bottle", 0.5), det("bottle", 0.9)];
        let hit = first_qualifying(&detections, 0.5).map(|d| d.confidence);
        assert_eq!(hit, Some(0.5));
        assert!(first_qualifying(&detections, 0.95).is_none());
        assert!(first_qualifying(&[], 0.0).is_none());
    }

    #[test]
    fn zero_threshold_accepts_any_detection() {
        assert!(first_qualifying(&[det("bottle", 0.0)], 0.0).is_some());
    }

    #[test]
    fn loop_state_names_are_snake_case() {
        assert_eq!(LoopState::RunningSearching.to_string(), "running_searching");
        assert_eq!(LoopState::ErrorTerminal.to_string(), "error_terminal");
    }
}
