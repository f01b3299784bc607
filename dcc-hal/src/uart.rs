/// The RailCom feedback UART: 250,000 baud, 8 data bits, no parity, one
/// stop bit, inverted idle.
pub trait Uart {
    /// Initialise (or reinitialise) the UART at RailCom's fixed baud rate.
    fn init(&mut self);

    /// Tear the UART down, e.g. before handing the pin to another
    /// peripheral.
    fn deinit(&mut self);

    /// True if at least one received byte is waiting.
    fn readable(&self) -> bool;

    /// Read one byte. Only valid to call when [`readable`](Uart::readable)
    /// is true.
    fn read(&mut self) -> u8;
}
