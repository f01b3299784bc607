/// Signal level of a digital pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(v: bool) -> Self {
        if v {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// A single digital output pin, used for track power enable and sleep
/// control lines.
pub trait Gpio {
    fn init(&mut self);
    fn set_level(&mut self, level: Level);
}
