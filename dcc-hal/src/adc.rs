/// Hardware-timed current sampling used to detect a Service-mode
/// acknowledgement pulse.
///
/// Implementations sample track current at a fixed rate (10 kHz in the
/// reference design) into a small ring buffer that [`AdcSampler::poll`]
/// drains; the moving averages are computed by
/// `dcc_station::current_sensor::CurrentSensor`, not by this trait.
pub trait AdcSampler {
    /// Begin sampling.
    fn start(&mut self);

    /// Stop sampling.
    fn stop(&mut self);

    /// Drain any samples collected since the last call and hand each one
    /// to `f`, in milliamps.
    fn poll(&mut self, f: impl FnMut(u16));
}
