/// Trace-level logging, one message per edge/bit. Compiled out entirely
/// unless the `defmt` feature is enabled.
#[macro_export]
macro_rules! dcc_trace {
    ($($arg:expr),*) => {
        #[cfg(feature = "defmt")]
        defmt::trace!($($arg),*);
    };
}

/// Debug-level logging, one message per byte/packet/protocol transition.
#[macro_export]
macro_rules! dcc_debug {
    ($($arg:expr),*) => {
        #[cfg(feature = "defmt")]
        defmt::debug!($($arg),*);
    };
}
