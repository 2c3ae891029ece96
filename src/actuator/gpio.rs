#![cfg(feature = "gpio-rppal")]

//! Raspberry Pi GPIO bridge.
//!
//! Direction lines are plain outputs. The enable line carries software PWM, which
//! works on any header pin (the reference wiring puts enable on GPIO 27, which
//! has no hardware PWM channel).

use anyhow::{anyhow, Context, Result};
use rppal::gpio::{Gpio, OutputPin};

use super::bridge::{Direction, HBridge};
use crate::config::MotorPins;

struct ClaimedPins {
    in1: OutputPin,
    in2: OutputPin,
    enable: OutputPin,
}

pub struct RppalBridge {
    pins: MotorPins,
    frequency_hz: f64,
    lines: Option<ClaimedPins>,
}

impl RppalBridge {
    /// Claim the three lines as outputs, driven low.
    pub fn claim(pins: MotorPins, frequency_hz: f64) -> Result<Self> {
        pins.validate()?;
        let gpio = Gpio::new().context("open GPIO peripheral")?;
        let in1 = gpio
            .get(pins.pin1)
            .with_context(|| format!("claim GPIO {} (IN1)", pins.pin1))?
            .into_output_low();
        let in2 = gpio
            .get(pins.pin2)
            .with_context(|| format!("claim GPIO {} (IN2)", pins.pin2))?
            .into_output_low();
        let mut enable = gpio
            .get(pins.enable)
            .with_context(|| format!("claim GPIO {} (EN)", pins.enable))?
            .into_output_low();
        enable
            .set_pwm_frequency(frequency_hz, 0.0)
            .with_context(|| format!("start PWM on GPIO {}", pins.enable))?;

        log::info!(
            "RppalBridge: claimed IN1={} IN2={} EN={} pwm_hz={}",
            pins.pin1,
            pins.pin2,
            pins.enable,
            frequency_hz
        );

        Ok(Self {
            pins,
            frequency_hz,
            lines: Some(ClaimedPins { in1, in2, enable }),
        })
    }

    fn lines(&mut self) -> Result<&mut ClaimedPins> {
        self.lines
            .as_mut()
            .ok_or_else(|| anyhow!("GPIO lines already released"))
    }
}

impl HBridge for RppalBridge {
    fn name(&self) -> &'static str {
        "rppal"
    }

    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let lines = self.lines()?;
        let (in1, in2) = direction.levels();
        set_level(&mut lines.in1, in1);
        set_level(&mut lines.in2, in2);
        Ok(())
    }

    fn set_duty_cycle(&mut self, percent: u8) -> Result<()> {
        let frequency_hz = self.frequency_hz;
        let lines = self.lines()?;
        let duty = f64::from(percent.min(100)) / 100.0;
        lines
            .enable
            .set_pwm_frequency(frequency_hz, duty)
            .context("update PWM duty cycle")
    }

    fn release(&mut self) -> Result<()> {
        let mut lines = self
            .lines
            .take()
            .ok_or_else(|| anyhow!("GPIO lines already released"))?;
        let cleared = lines.enable.clear_pwm().context("stop PWM");
        lines.enable.set_low();
        lines.in1.set_low();
        lines.in2.set_low();
        // Dropping the pins resets them to their original mode.
        drop(lines);
        log::info!(
            "RppalBridge: released GPIO {:?}",
            self.pins.as_array()
        );
        cleared
    }
}

fn set_level(pin: &mut OutputPin, high: bool) {
    if high {
        pin.set_high();
    } else {
        pin.set_low();
    }
}
