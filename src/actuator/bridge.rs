use anyhow::Result;

/// Logic levels applied to the two H-bridge direction inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// IN1 high, IN2 low.
    Forward,
    /// IN1 low, IN2 high.
    Reverse,
    /// Both low: the bridge floats and the motor coasts.
    Coast,
}

impl Direction {
    pub fn levels(self) -> (bool, bool) {
        match self {
            Direction::Forward => (true, false),
            Direction::Reverse => (false, true),
            Direction::Coast => (false, false),
        }
    }
}

/// Pin-level driver for an H-bridge with a PWM enable line.
///
/// Implementations hold the claimed lines for their whole lifetime. Claiming
/// happens in the implementation's constructor; `release` hands the lines back
/// to the system and leaves them low. After `release` the bridge is never
/// driven again.
pub trait HBridge: Send {
    /// Driver identifier.
    fn name(&self) -> &'static str;

    fn set_direction(&mut self, direction: Direction) -> Result<()>;

    /// Set the enable-line duty cycle as a percentage (0..=100).
    fn set_duty_cycle(&mut self, percent: u8) -> Result<()>;

    /// Drive every line low and release the pins.
    fn release(&mut self) -> Result<()>;
}
