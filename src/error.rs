//! Errors that decide process behavior.
//!
//! Everything else in the crate travels as `anyhow::Error`. The variants here are
//! the ones callers must tell apart: they pick the exit code and decide whether a
//! failure is fatal. They ride inside `anyhow::Error` and are recovered with
//! `downcast_ref`.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HaltError {
    /// GPIO lines could not be claimed (in use, invalid number, no permission).
    HardwareInit(String),
    /// The camera device could not be opened at startup.
    CameraUnavailable(String),
    /// The detection model is missing or incompatible.
    ModelLoad(String),
    /// The camera went away mid-run (not a single dropped frame).
    DeviceLost(String),
    /// `start`/`stop` called after the actuator reached `Shutdown`.
    ActuatorClosed,
}

impl HaltError {
    /// Stable identifier used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            HaltError::HardwareInit(_) => "HARDWARE_INIT",
            HaltError::CameraUnavailable(_) => "CAMERA_UNAVAILABLE",
            HaltError::ModelLoad(_) => "MODEL_LOAD",
            HaltError::DeviceLost(_) => "DEVICE_LOST",
            HaltError::ActuatorClosed => "ACTUATOR_CLOSED",
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            HaltError::HardwareInit(_) => 2,
            HaltError::CameraUnavailable(_) => 3,
            HaltError::ModelLoad(_) => 4,
            HaltError::DeviceLost(_) => 5,
            HaltError::ActuatorClosed => 1,
        }
    }
}

impl fmt::Display for HaltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltError::HardwareInit(msg) => write!(f, "{}: {}", self.code(), msg),
            HaltError::CameraUnavailable(msg) => write!(f, "{}: {}", self.code(), msg),
            HaltError::ModelLoad(msg) => write!(f, "{}: {}", self.code(), msg),
            HaltError::DeviceLost(msg) => write!(f, "{}: {}", self.code(), msg),
            HaltError::ActuatorClosed => {
                write!(f, "{}: actuator already shut down", self.code())
            }
        }
    }
}

impl std::error::Error for HaltError {}

/// Exit code for an error returned from a run.
///
/// Anything that is not a `HaltError` (bad config, unexpected I/O) exits with 1.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<HaltError>())
        .map(HaltError::exit_code)
        .unwrap_or(1)
}

/// Wrap `err` as `make(..)` unless it already carries a `HaltError`.
pub(crate) fn classify(err: anyhow::Error, make: fn(String) -> HaltError) -> anyhow::Error {
    if err.chain().any(|cause| cause.is::<HaltError>()) {
        return err;
    }
    anyhow::Error::new(make(format!("{:#}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn exit_codes_distinguish_fatal_classes() {
        assert_eq!(HaltError::HardwareInit("x".into()).exit_code(), 2);
        assert_eq!(HaltError::CameraUnavailable("x".into()).exit_code(), 3);
        assert_eq!(HaltError::ModelLoad("x".into()).exit_code(), 4);
        assert_eq!(HaltError::DeviceLost("x".into()).exit_code(), 5);
    }

    #[test]
    fn exit_code_found_through_context() {
        let err = Err::<(), _>(HaltError::ModelLoad("missing".into()))
            .context("loading detector")
            .unwrap_err();
        assert_eq!(exit_code_for(&err), 4);
        assert_eq!(exit_code_for(&anyhow!("bad config")), 1);
    }

    #[test]
    fn classify_keeps_existing_halt_error() {
        let original = anyhow::Error::new(HaltError::CameraUnavailable("busy".into()));
        let classified = classify(original, HaltError::HardwareInit);
        assert_eq!(exit_code_for(&classified), 3);

        let plain = classify(anyhow!("permission denied"), HaltError::HardwareInit);
        assert_eq!(
            plain.downcast_ref::<HaltError>(),
            Some(&HaltError::HardwareInit("permission denied".into()))
        );
    }
}
