//! Motor actuation.
//!
//! `MotorActuator` is the single owner of the motor GPIO lines. Its lifecycle is
//! `initialize` → (`start` | `stop`)* → `shutdown`, and it keeps the pins in a
//! safe state throughout:
//! - duty cycle is zero whenever the state is not `Running`
//! - `shutdown` releases the pins exactly once; later calls are no-ops
//! - dropping an actuator that was never shut down shuts it down
//!
//! Pin-level work is delegated to an `HBridge` driver chosen from the config.

mod bridge;
#[cfg(feature = "gpio-rppal")]
mod gpio;
mod simulated;

use anyhow::{anyhow, Result};
use std::fmt;

pub use bridge::{Direction, HBridge};
#[cfg(feature = "gpio-rppal")]
pub use gpio::RppalBridge;
pub use simulated::{BridgeProbe, PinLevels, SimulatedBridge, SimulatedGpio};

use crate::config::{GpioDriver, MotorSettings};
use crate::error::{classify, HaltError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorState {
    Uninitialized,
    Running,
    Stopped,
    Shutdown,
}

impl fmt::Display for MotorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MotorState::Uninitialized => "uninitialized",
            MotorState::Running => "running",
            MotorState::Stopped => "stopped",
            MotorState::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

pub struct MotorActuator {
    bridge: Box<dyn HBridge>,
    state: MotorState,
    duty_percent: u8,
}

impl MotorActuator {
    /// Claim the configured pins with the configured driver.
    ///
    /// Any failure is reported as `HaltError::HardwareInit`.
    pub fn initialize(settings: &MotorSettings) -> Result<Self> {
        let bridge: Box<dyn HBridge> = match settings.driver {
            GpioDriver::Simulated => Box::new(
                SimulatedGpio::new()
                    .claim(settings.pins)
                    .map_err(|e| classify(e, HaltError::HardwareInit))?,
            ),
            GpioDriver::Rppal => claim_rppal(settings)?,
        };
        Self::with_bridge(bridge)
    }

    /// Wrap an already-claimed bridge: direction forward, duty 0.
    pub fn with_bridge(mut bridge: Box<dyn HBridge>) -> Result<Self> {
        let prepared = bridge
            .set_direction(Direction::Forward)
            .and_then(|_| bridge.set_duty_cycle(0));
        if let Err(err) = prepared {
            if let Err(release_err) = bridge.release() {
                log::warn!("release after failed init: {:#}", release_err);
            }
            return Err(classify(err, HaltError::HardwareInit));
        }
        log::info!(
            "motor actuator initialized driver={} state={}",
            bridge.name(),
            MotorState::Uninitialized
        );
        Ok(Self {
            bridge,
            state: MotorState::Uninitialized,
            duty_percent: 0,
        })
    }

    pub fn state(&self) -> MotorState {
        self.state
    }

    pub fn duty_percent(&self) -> u8 {
        self.duty_percent
    }

    pub fn driver_name(&self) -> &'static str {
        self.bridge.name()
    }

    /// Run the motor forward at `speed` percent. Calling it again while running
    /// only updates the duty cycle.
    pub fn start(&mut self, speed: u8) -> Result<()> {
        self.ensure_open()?;
        if speed > 100 {
            return Err(anyhow!("motor speed {} exceeds 100%", speed));
        }
        if self.state == MotorState::Running && self.duty_percent == speed {
            return Ok(());
        }
        self.bridge.set_direction(Direction::Forward)?;
        self.bridge.set_duty_cycle(speed)?;
        self.duty_percent = speed;
        self.transition(MotorState::Running);
        log::info!("motor started speed={}%", speed);
        Ok(())
    }

    /// Drop duty to zero. Direction lines are left as they are.
    pub fn stop(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state == MotorState::Stopped {
            return Ok(());
        }
        self.bridge.set_duty_cycle(0)?;
        self.duty_percent = 0;
        self.transition(MotorState::Stopped);
        log::info!("motor stopped");
        Ok(())
    }

    /// Zero the duty cycle and release every pin. Terminal.
    ///
    /// Returns `Ok(false)` when the actuator was already shut down, `Ok(true)`
    /// when this call released the pins.
    pub fn shutdown(&mut self) -> Result<bool> {
        if self.state == MotorState::Shutdown {
            return Ok(false);
        }
        let zeroed = self.bridge.set_duty_cycle(0);
        self.duty_percent = 0;
        let released = self.bridge.release();
        self.transition(MotorState::Shutdown);
        if let Err(err) = &zeroed {
            log::error!("failed to zero duty cycle during shutdown: {:#}", err);
        }
        released?;
        log::info!("GPIO cleanup completed");
        Ok(true)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == MotorState::Shutdown {
            return Err(HaltError::ActuatorClosed.into());
        }
        Ok(())
    }

    fn transition(&mut self, next: MotorState) {
        if self.state != next {
            log::debug!("motor state from={} to={}", self.state, next);
            self.state = next;
        }
    }
}

impl Drop for MotorActuator {
    fn drop(&mut self) {
        if self.state != MotorState::Shutdown {
            log::warn!("motor actuator dropped in state {}; shutting down", self.state);
            if let Err(err) = self.shutdown() {
                log::error!("shutdown on drop failed: {:#}", err);
            }
        }
    }
}

#[cfg(feature = "gpio-rppal")]
fn claim_rppal(settings: &MotorSettings) -> Result<Box<dyn HBridge>> {
    let bridge = RppalBridge::claim(settings.pins, settings.pwm_frequency_hz)
        .map_err(|e| classify(e, HaltError::HardwareInit))?;
    Ok(Box::new(bridge))
}

#[cfg(not(feature = "gpio-rppal"))]
fn claim_rppal(_settings: &MotorSettings) -> Result<Box<dyn HBridge>> {
    Err(HaltError::HardwareInit(
        "the rppal GPIO driver requires the gpio-rppal feature (use driver = \"simulated\" for dry runs)"
            .to_string(),
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MotorPins;

    const PINS: MotorPins = MotorPins {
        pin1: 17,
        pin2: 18,
        enable: 27,
    };

    fn simulated() -> Result<(MotorActuator, BridgeProbe)> {
        let bridge = SimulatedGpio::new().claim(PINS)?;
        let probe = bridge.probe();
        Ok((MotorActuator::with_bridge(Box::new(bridge))?, probe))
    }

    #[test]
    fn initialize_sets_forward_at_zero_duty() -> Result<()> {
        let (actuator, probe) = simulated()?;
        assert_eq!(actuator.state(), MotorState::Uninitialized);
        assert_eq!(probe.direction(), Some(Direction::Forward));
        assert_eq!(probe.duty_percent(), 0);
        Ok(())
    }

    #[test]
    fn start_is_idempotent() -> Result<()> {
        let (mut actuator, probe) = simulated()?;
        actuator.start(50)?;
        let once = probe.snapshot();
        actuator.start(50)?;
        assert_eq!(probe.snapshot(), once);
        assert_eq!(actuator.state(), MotorState::Running);

        actuator.start(70)?;
        assert_eq!(probe.duty_percent(), 70);
        Ok(())
    }

    #[test]
    fn stop_zeroes_duty_and_keeps_direction() -> Result<()> {
        let (mut actuator, probe) = simulated()?;
        actuator.start(60)?;
        actuator.stop()?;
        actuator.stop()?;
        assert_eq!(actuator.state(), MotorState::Stopped);
        assert_eq!(probe.duty_percent(), 0);
        assert_eq!(probe.direction(), Some(Direction::Forward));
        Ok(())
    }

    #[test]
    fn shutdown_releases_once_and_closes() -> Result<()> {
        let (mut actuator, probe) = simulated()?;
        actuator.start(60)?;
        assert!(actuator.shutdown()?);
        assert!(!actuator.shutdown()?);
        assert_eq!(probe.releases(), 1);
        assert_eq!(probe.duty_percent(), 0);

        let err = actuator.start(10).unwrap_err();
        assert_eq!(
            err.downcast_ref::<HaltError>(),
            Some(&HaltError::ActuatorClosed)
        );
        assert!(actuator.stop().is_err());
        Ok(())
    }

    #[test]
    fn drop_shuts_down_running_motor() -> Result<()> {
        let (mut actuator, probe) = simulated()?;
        actuator.start(80)?;
        drop(actuator);
        assert_eq!(probe.releases(), 1);
        assert_eq!(probe.duty_percent(), 0);
        Ok(())
    }

    #[test]
    fn duty_is_zero_outside_running() -> Result<()> {
        let (mut actuator, probe) = simulated()?;
        for step in 0..4 {
            match step {
                0 => actuator.start(45)?,
                1 => actuator.stop()?,
                2 => actuator.start(45)?,
                _ => {
                    actuator.shutdown()?;
                }
            }
            if actuator.state() != MotorState::Running {
                assert_eq!(probe.duty_percent(), 0);
                assert_eq!(actuator.duty_percent(), 0);
            }
        }
        Ok(())
    }

    #[test]
    fn rejects_speed_above_full_scale() -> Result<()> {
        let (mut actuator, _probe) = simulated()?;
        assert!(actuator.start(101).is_err());
        assert_eq!(actuator.state(), MotorState::Uninitialized);
        Ok(())
    }

    #[test]
    fn simulated_driver_from_settings() -> Result<()> {
        let settings = MotorSettings {
            pins: PINS,
            speed: 50,
            pwm_frequency_hz: 1000.0,
            driver: GpioDriver::Simulated,
        };
        let mut actuator = MotorActuator::initialize(&settings)?;
        assert_eq!(actuator.driver_name(), "simulated");
        actuator.shutdown()?;
        Ok(())
    }

    #[cfg(not(feature = "gpio-rppal"))]
    #[test]
    fn rppal_driver_without_feature_is_hardware_init_error() {
        let settings = MotorSettings {
            pins: PINS,
            speed: 50,
            pwm_frequency_hz: 1000.0,
            driver: GpioDriver::Rppal,
        };
        let err = MotorActuator::initialize(&settings).err().unwrap();
        assert_eq!(crate::error::exit_code_for(&err), 2);
    }
}
