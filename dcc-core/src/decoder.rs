//! Edge-driven bit decoder: resynchronises on preambles and assembles
//! complete packets from a stream of timestamped edges.

use crate::spec;
use crate::{dcc_debug, dcc_trace};

/// Maximum packet length the decoder will assemble, in octets.
const PKT_MAX: usize = 16;

/// The result of classifying an inter-edge interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HalfBit {
    Zero,
    One,
    Invalid,
}

/// Classify an inter-edge interval, in microseconds, into a half-bit.
pub fn to_half(interval_us: u32) -> HalfBit {
    if (spec::rx::TR0_MIN_US..=spec::rx::TR0_MAX_US).contains(&interval_us) {
        HalfBit::Zero
    } else if (spec::rx::TR1_MIN_US..=spec::rx::TR1_MAX_US).contains(&interval_us) {
        HalfBit::One
    } else {
        HalfBit::Invalid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BitState {
    /// Waiting for a half-one to start the preamble.
    Unsync,
    /// Waiting for a half-zero, counting half-ones in the preamble.
    Preamble,
    /// Saw the first half of a bit (0 or 1); waiting for its match.
    BitHalf,
    /// Got a complete bit; waiting for the next bit's first half.
    BitWhole,
}

/// A fully assembled packet handed to the installed callback.
pub struct Received<'a> {
    pub bytes: &'a [u8],
    /// Preamble length in whole one-bits.
    pub preamble_bits: u32,
    /// Count of invalid or mismatched half-bits seen since the previous
    /// delivered packet (or since init).
    pub bad_count: u32,
}

/// Edge-driven DCC bitstream decoder.
///
/// Receives edges (not periodic samples), synchronises to the preamble,
/// and assembles bytes MSB-first into packets. Never allocates; the packet
/// sink is invoked with a borrow into the decoder's own fixed buffer.
pub struct BitDecoder {
    state: BitState,
    /// Count of half-ones seen in the current preamble run.
    preamble: u32,
    /// The half-bit value (0 or 1) the state machine currently expects.
    expect: u8,
    bad_count: u32,

    byte: u8,
    bit_num: u32,

    pkt: [u8; PKT_MAX],
    pkt_len: usize,
}

impl BitDecoder {
    pub const fn new() -> Self {
        Self {
            state: BitState::Unsync,
            preamble: 0,
            expect: 0,
            bad_count: 0,
            byte: 0,
            bit_num: 0,
            pkt: [0u8; PKT_MAX],
            pkt_len: 0,
        }
    }

    /// Feed one classified half-bit to the state machine.
    ///
    /// `on_packet` is called synchronously with the assembled packet the
    /// instant a stop bit (a half-one following the last data byte) is
    /// recognised.
    pub fn half_bit(&mut self, half: HalfBit, on_packet: impl FnOnce(Received<'_>)) {
        let half = match half {
            HalfBit::Zero => 0u8,
            HalfBit::One => 1u8,
            HalfBit::Invalid => {
                dcc_trace!("dcc_bit: invalid interval, >UNSYNC");
                self.state = BitState::Unsync;
                self.bad_count += 1;
                return;
            }
        };

        match self.state {
            BitState::Unsync => {
                if half == 1 {
                    self.preamble = 1;
                    self.state = BitState::Preamble;
                }
            }
            BitState::Preamble => {
                if half == 0 {
                    if self.preamble >= spec::PREAMBLE_MIN_HALVES {
                        self.pkt_len = 0;
                        self.bit_num = 0;
                        self.expect = 0;
                        self.state = BitState::BitHalf;
                    } else {
                        self.state = BitState::Unsync;
                    }
                } else {
                    self.preamble += 1;
                }
            }
            BitState::BitHalf => {
                if half == self.expect {
                    if self.bit_rx(&mut on_packet_adapter(on_packet)) {
                        // The final stop-bit '1' counts toward the next preamble.
                        self.preamble = 2;
                        self.state = BitState::Preamble;
                    } else {
                        self.state = BitState::BitWhole;
                    }
                } else if half == 0 {
                    self.state = BitState::Unsync;
                } else {
                    self.preamble = 1;
                    self.state = BitState::Preamble;
                }
            }
            BitState::BitWhole => {
                self.expect = half;
                self.state = BitState::BitHalf;
            }
        }
    }

    /// Bit 0 is the start-of-byte delimiter; bits 1..8 shift a data byte in
    /// MSB first. Returns `true` when the packet is complete (a stop bit
    /// was seen) and `on_packet` has been invoked.
    fn bit_rx(&mut self, on_packet: &mut dyn FnMut(Received<'_>)) -> bool {
        if self.bit_num == 0 {
            if self.expect == 0 {
                self.bit_num += 1;
                false
            } else {
                dcc_debug!("dcc_bit: packet complete, len={}", self.pkt_len);
                on_packet(Received {
                    bytes: &self.pkt[..self.pkt_len],
                    preamble_bits: self.preamble / 2,
                    bad_count: self.bad_count,
                });
                self.bit_num = 0;
                self.bad_count = 0;
                true
            }
        } else if self.bit_num < 8 {
            self.byte = (self.byte << 1) | self.expect;
            self.bit_num += 1;
            false
        } else {
            self.byte = (self.byte << 1) | self.expect;
            if self.pkt_len < PKT_MAX {
                self.pkt[self.pkt_len] = self.byte;
                self.pkt_len += 1;
            }
            self.bit_num = 0;
            false
        }
    }
}

impl Default for BitDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts an `FnOnce` callback (the public API, ergonomic at call sites)
/// into the `FnMut` shape `bit_rx` needs, while only ever calling it once.
fn on_packet_adapter<F: FnOnce(Received<'_>)>(f: F) -> impl FnMut(Received<'_>) {
    let mut f = Some(f);
    move |r: Received<'_>| {
        if let Some(f) = f.take() {
            f(r);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet;

    fn feed_packet_halves(decoder: &mut BitDecoder, preamble_ones: u32, bytes: &[u8], got: &mut Option<heapless::Vec<u8, 16>>) {
        for _ in 0..preamble_ones {
            decoder.half_bit(HalfBit::One, |_| {});
            decoder.half_bit(HalfBit::One, |_| {});
        }
        for (i, &byte) in bytes.iter().enumerate() {
            // start-of-byte delimiter: half-zero twice
            decoder.half_bit(HalfBit::Zero, |_| {});
            decoder.half_bit(HalfBit::Zero, |_| {});
            for bit in (0..8).rev() {
                let half = if (byte >> bit) & 1 == 1 { HalfBit::One } else { HalfBit::Zero };
                decoder.half_bit(half, |_| {});
                decoder.half_bit(half, |_| {});
            }
            let is_last = i == bytes.len() - 1;
            let stop = if is_last { HalfBit::One } else { HalfBit::Zero };
            decoder.half_bit(stop, |r| {
                let mut v = heapless::Vec::new();
                v.extend_from_slice(r.bytes).ok();
                *got = Some(v);
            });
            decoder.half_bit(stop, |r| {
                let mut v = heapless::Vec::new();
                v.extend_from_slice(r.bytes).ok();
                *got = Some(v);
            });
        }
    }

    #[test]
    fn idle_round_trip_via_edges() {
        let p = packet::idle();
        let mut decoder = BitDecoder::new();
        let mut got = None;
        feed_packet_halves(&mut decoder, 14, p.as_bytes(), &mut got);
        assert_eq!(got.unwrap().as_slice(), p.as_bytes());
    }

    #[test]
    fn short_preamble_never_delivers() {
        let mut decoder = BitDecoder::new();
        for _ in 0..8 {
            decoder.half_bit(HalfBit::One, |_| panic!("should not deliver"));
            decoder.half_bit(HalfBit::One, |_| panic!("should not deliver"));
        }
        decoder.half_bit(HalfBit::Zero, |_| panic!("should not deliver"));
    }

    #[test]
    fn invalid_interval_resyncs_then_delivers_next_packet() {
        let p = packet::reset();
        let mut decoder = BitDecoder::new();
        for _ in 0..14 {
            decoder.half_bit(HalfBit::One, |_| {});
        }
        decoder.half_bit(HalfBit::Invalid, |_| panic!("should not deliver"));
        assert_eq!(decoder.bad_count, 1);

        let mut got = None;
        feed_packet_halves(&mut decoder, 14, p.as_bytes(), &mut got);
        assert_eq!(got.unwrap().as_slice(), p.as_bytes());
    }
}
