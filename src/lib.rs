//! detect-halt
//!
//! Runs a DC motor through an H-bridge until a camera sees one of a set of
//! target objects, then stops the motor and releases its pins.
//!
//! # Module Structure
//!
//! - `actuator`: motor lifecycle over an `HBridge` driver (rppal or simulated)
//! - `ingest`: camera sources, discovery, pixel format normalization
//! - `detect`: detector backends (stub, tract YOLOv8) and target filtering
//! - `control`: the rate-limited detect-and-halt loop and its stop signal
//! - `config`: file, environment and command-line configuration
//! - `error`: the failures that pick an exit code

pub mod actuator;
pub mod config;
pub mod control;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;

pub use actuator::{HBridge, MotorActuator, MotorState, SimulatedGpio};
pub use config::{CameraIndex, GpioDriver, HaltConfig, Overrides};
pub use control::{
    ConfiguredRig, ControlLoop, LoopState, LoopStats, Outcome, Rig, StopReason, StopSignal,
};
pub use detect::{Detection, Detector, DetectorBackend};
pub use error::{exit_code_for, HaltError};
pub use frame::Frame;
pub use ingest::{Capture, CaptureFailure, FrameSource};
