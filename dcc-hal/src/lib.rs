#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_code)]

//! Hardware collaborator traits a board support package implements to back
//! [`dcc_station`]'s orchestration layer: a double-buffered PWM slice for
//! bitstream generation, GPIO for track power, a UART for RailCom, and an
//! ADC sampler for Service-mode ack detection.

pub mod adc;
pub mod gpio;
pub mod pwm;
pub mod uart;

pub use adc::AdcSampler;
pub use gpio::Gpio;
pub use pwm::PwmDoubleBuffered;
pub use uart::Uart;
