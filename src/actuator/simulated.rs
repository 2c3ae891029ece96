//! In-memory H-bridge.
//!
//! Used for dry runs, tests, and development hosts without GPIO. A
//! `SimulatedGpio` plays the role of the GPIO chip: it tracks which lines are
//! claimed so that a second claim of the same pin fails the way real hardware
//! does. `BridgeProbe` exposes what the bridge was told to do.

use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use super::bridge::{Direction, HBridge};
use crate::config::MotorPins;

#[derive(Debug, Default)]
struct ChipState {
    claimed: BTreeSet<u8>,
}

/// Simulated GPIO chip.
#[derive(Clone, Debug, Default)]
pub struct SimulatedGpio {
    chip: Arc<Mutex<ChipState>>,
}

impl SimulatedGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the bridge pins. Fails if any of them is already held.
    pub fn claim(&self, pins: MotorPins) -> Result<SimulatedBridge> {
        pins.validate()?;
        let mut chip = lock(&self.chip);
        if let Some(pin) = pins.as_array().into_iter().find(|p| chip.claimed.contains(p)) {
            return Err(anyhow!("GPIO {} is already in use", pin));
        }
        chip.claimed.extend(pins.as_array());
        drop(chip);

        Ok(SimulatedBridge {
            pins,
            chip: Arc::clone(&self.chip),
            probe: BridgeProbe::default(),
            released: false,
        })
    }

    pub fn is_claimed(&self, pin: u8) -> bool {
        lock(&self.chip).claimed.contains(&pin)
    }
}

/// Snapshot of the simulated lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PinLevels {
    pub in1: bool,
    pub in2: bool,
    pub duty_percent: u8,
    /// Every duty cycle written, in order.
    pub duty_history: Vec<u8>,
    pub releases: u32,
}

/// Shared view of a `SimulatedBridge`. Stays readable after the bridge is dropped.
#[derive(Clone, Debug, Default)]
pub struct BridgeProbe {
    levels: Arc<Mutex<PinLevels>>,
}

impl BridgeProbe {
    pub fn snapshot(&self) -> PinLevels {
        lock(&self.levels).clone()
    }

    pub fn duty_percent(&self) -> u8 {
        lock(&self.levels).duty_percent
    }

    pub fn direction(&self) -> Option<Direction> {
        let levels = lock(&self.levels);
        match (levels.in1, levels.in2) {
            (true, false) => Some(Direction::Forward),
            (false, true) => Some(Direction::Reverse),
            (false, false) => Some(Direction::Coast),
            (true, true) => None,
        }
    }

    pub fn releases(&self) -> u32 {
        lock(&self.levels).releases
    }
}

pub struct SimulatedBridge {
    pins: MotorPins,
    chip: Arc<Mutex<ChipState>>,
    probe: BridgeProbe,
    released: bool,
}

impl SimulatedBridge {
    pub fn probe(&self) -> BridgeProbe {
        self.probe.clone()
    }

    fn ensure_claimed(&self) -> Result<()> {
        if self.released {
            return Err(anyhow!("simulated bridge already released"));
        }
        Ok(())
    }
}

impl HBridge for SimulatedBridge {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.ensure_claimed()?;
        let (in1, in2) = direction.levels();
        let mut levels = lock(&self.probe.levels);
        levels.in1 = in1;
        levels.in2 = in2;
        Ok(())
    }

    fn set_duty_cycle(&mut self, percent: u8) -> Result<()> {
        self.ensure_claimed()?;
        let mut levels = lock(&self.probe.levels);
        levels.duty_percent = percent;
        levels.duty_history.push(percent);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.ensure_claimed()?;
        {
            let mut levels = lock(&self.probe.levels);
            levels.in1 = false;
            levels.in2 = false;
            levels.duty_percent = 0;
            levels.releases += 1;
        }
        let mut chip = lock(&self.chip);
        for pin in self.pins.as_array() {
            chip.claimed.remove(&pin);
        }
        self.released = true;
        log::debug!(
            "simulated bridge released pins {:?}",
            self.pins.as_array()
        );
        Ok(())
    }
}

impl Drop for SimulatedBridge {
    fn drop(&mut self) {
        if !self.released {
            let mut chip = lock(&self.chip);
            for pin in self.pins.as_array() {
                chip.claimed.remove(&pin);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINS: MotorPins = MotorPins {
        pin1: 17,
        pin2: 18,
        enable: 27,
    };

    #[test]
    fn double_claim_fails_until_release() -> Result<()> {
        let gpio = SimulatedGpio::new();
        let mut bridge = gpio.claim(PINS)?;
        assert!(gpio.is_claimed(27));
        assert!(gpio.claim(PINS).is_err());

        bridge.release()?;
        assert!(!gpio.is_claimed(27));
        let _again = gpio.claim(PINS)?;
        Ok(())
    }

    #[test]
    fn released_bridge_rejects_writes() -> Result<()> {
        let gpio = SimulatedGpio::new();
        let mut bridge = gpio.claim(PINS)?;
        bridge.release()?;
        assert!(bridge.set_duty_cycle(10).is_err());
        assert!(bridge.release().is_err());
        assert_eq!(bridge.probe().releases(), 1);
        Ok(())
    }

    #[test]
    fn probe_tracks_levels() -> Result<()> {
        let gpio = SimulatedGpio::new();
        let mut bridge = gpio.claim(PINS)?;
        let probe = bridge.probe();
        bridge.set_direction(Direction::Forward)?;
        bridge.set_duty_cycle(40)?;
        assert_eq!(probe.direction(), Some(Direction::Forward));
        assert_eq!(probe.duty_percent(), 40);
        assert_eq!(probe.snapshot().duty_history, vec![40]);
        Ok(())
    }
}
