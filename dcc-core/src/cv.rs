//! Named Configuration Variable numbers in common use across decoders.
//!
//! These are plain lookup constants, not behaviour: nothing in this crate
//! requires that a caller use them, they exist only so application code
//! need not hardcode magic CV numbers.

pub const PRIMARY_ADDRESS: u16 = 1;
pub const ACCELERATION_RATE: u16 = 3;
pub const DECELERATION_RATE: u16 = 4;
pub const MANUFACTURER_VERSION: u16 = 7;
pub const MANUFACTURER_ID: u16 = 8;
pub const EXTENDED_ADDRESS_HI: u16 = 17;
pub const EXTENDED_ADDRESS_LO: u16 = 18;
pub const CONFIGURATION: u16 = 29;
pub const INDEX_HIGH: u16 = 31;
pub const INDEX_LOW: u16 = 32;
