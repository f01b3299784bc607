#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! Orchestration layer for a DCC command station: the interrupt-driven
//! bitstream transmitter, track-current sensing, per-locomotive packet
//! rotation, and the Operations/Service mode controller that ties them
//! together.

pub mod bitstream;
pub mod controller;
pub mod current_sensor;
pub mod throttle;

pub use bitstream::{BitstreamTx, RailComEvent};
pub use controller::{CommandController, ControllerError};
pub use current_sensor::CurrentSensor;
pub use throttle::LocoSlot;
