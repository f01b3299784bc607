/// A PWM channel index on a [`PwmDoubleBuffered`] slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    /// Drives the DCC signal pin.
    Signal,
    /// Drives track power enable.
    Enable,
}

/// A double-buffered PWM slice used to generate the DCC bitstream.
///
/// Values written by [`set_period`]/[`set_channel_duty`] take effect only
/// at the slice's next wrap, which is exactly the double-buffering the
/// bitstream transmitter's per-bit program depends on: the handler for bit
/// *k* programs the period/duty for bit *k+1* without ever disturbing the
/// bit currently on the wire.
///
/// [`set_period`]: PwmDoubleBuffered::set_period
/// [`set_channel_duty`]: PwmDoubleBuffered::set_channel_duty
pub trait PwmDoubleBuffered {
    /// Set the slice's wrap value, in PWM clock counts (1 MHz), so that a
    /// full period equals `period_us` microseconds.
    fn set_period(&mut self, period_us: u32);

    /// Set the given channel's duty, in microseconds of high time within
    /// the current period.
    fn set_channel_duty(&mut self, channel: Channel, high_us: u32);

    /// Enable or disable the slice's PWM output entirely.
    fn set_enabled(&mut self, enabled: bool);

    /// Mask or unmask the slice's wrap interrupt. Used by the producer side
    /// to bracket mutation of the shared packet buffers (see
    /// `dcc_station::bitstream`).
    ///
    /// Wiring the wrap interrupt's vector to `BitstreamTx::on_wrap` is a
    /// board-level concern outside this trait: the interrupt vector table
    /// is fixed at link time, not registered dynamically, so a board support
    /// package declares its own `#[interrupt]` handler that reaches the
    /// running `BitstreamTx` through whatever static storage its chip family
    /// uses (a `critical_section::Mutex<RefCell<Option<BitstreamTx<..>>>>`
    /// is the usual shape) and calls `on_wrap` from inside it. This trait
    /// only needs to let that handler mask itself out while the producer
    /// mutates shared state.
    fn set_irq_enabled(&mut self, enabled: bool);
}
