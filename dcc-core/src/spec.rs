//! Timing and protocol constants from the NMRA DCC standard (S-9.1/S-9.2).

/// Transmit timing, used when generating a bitstream.
pub mod tx {
    /// Minimum half-bit duration for a logical one, in microseconds.
    pub const T1_MIN_US: u32 = 55;
    /// Nominal half-bit duration for a logical one, in microseconds.
    pub const T1_NOM_US: u32 = 58;
    /// Maximum half-bit duration for a logical one, in microseconds.
    pub const T1_MAX_US: u32 = 61;
    /// Maximum allowed asymmetry between the two halves of a one-bit.
    pub const T1D_MAX_US: u32 = 3;

    /// Minimum half-bit duration for a logical zero, in microseconds.
    pub const T0_MIN_US: u32 = 95;
    /// Nominal half-bit duration for a logical zero, in microseconds.
    pub const T0_NOM_US: u32 = 100;
    /// Maximum half-bit duration for a logical zero, in microseconds.
    pub const T0_MAX_US: u32 = 9900;
}

/// Receive timing, used when classifying edges into half-bits.
pub mod rx {
    pub const TR1_MIN_US: u32 = 52;
    pub const TR1_NOM_US: u32 = 58;
    pub const TR1_MAX_US: u32 = 64;
    pub const TR1D_MAX_US: u32 = 6;

    pub const TR0_MIN_US: u32 = 90;
    pub const TR0_NOM_US: u32 = 100;
    pub const TR0_MAX_US: u32 = 10000;
}

/// DCC Spec 9.2, section A: the normal Operations-mode preamble.
pub const OPS_PREAMBLE_BITS: u32 = 14;

/// DCC Spec 9.2.3, section E: the longer Service-mode preamble.
pub const SVC_PREAMBLE_BITS: u32 = 20;

/// 10 complete one-bits required to start synchronisation = 20 half-bits.
pub const PREAMBLE_MIN_HALVES: u32 = 20;

/// RailCom cutout window, approximated as four bit-times after the packet's
/// final stop bit.
pub const RAILCOM_CUTOUT_BIT_TIMES: u32 = 4;

/// Loco address constraints.
pub const ADDRESS_MIN: u16 = 1;
pub const ADDRESS_SHORT_MAX: u16 = 127;
pub const ADDRESS_MAX: u16 = 10239;

/// Speed constraints (128-step mode, signed).
pub const SPEED_MIN: i32 = -127;
pub const SPEED_MAX: i32 = 127;

/// Function number constraints.
pub const FUNCTION_MIN: u32 = 0;
pub const FUNCTION_MAX: u32 = 68;

/// CV number constraints.
pub const CV_NUM_MIN: u16 = 1;
pub const CV_NUM_MAX: u16 = 1024;

/// Service-mode protocol packet counts.
pub const SVC_RESET1_COUNT: u32 = 20;
pub const SVC_COMMAND_COUNT: u32 = 5;
pub const SVC_RESET2_COUNT: u32 = 5;

/// Current increase, in milliamps, above the long-running average that is
/// taken as a decoder acknowledgement pulse.
pub const ACK_INC_MA: u16 = 60;
