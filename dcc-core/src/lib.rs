#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

#[macro_use]
pub mod macros;

pub mod cv;
pub mod decoder;
pub mod error;
pub mod function;
pub mod packet;
pub mod railcom;
pub mod spec;

pub use error::{Error, Result};
