//! Per-locomotive packet rotation and on-main CV programming.

use dcc_core::packet::{self, CvOp, FunctionGroup, Packet};
use dcc_core::railcom::Message;
use dcc_core::{Error, Result};

/// All function groups in rotation order, lowest function number first.
const GROUPS: [FunctionGroup; 10] = [
    FunctionGroup::F0F4,
    FunctionGroup::F5F8,
    FunctionGroup::F9F12,
    FunctionGroup::F13F20,
    FunctionGroup::F21F28,
    FunctionGroup::F29F36,
    FunctionGroup::F37F44,
    FunctionGroup::F45F52,
    FunctionGroup::F53F60,
    FunctionGroup::F61F68,
];

/// How many times an on-main CV instruction is repeated before the
/// rotation resumes. Matches the Service-mode command phase width so the
/// same current-sensing ack window applies on main.
const ON_MAIN_SEND_COUNT: u8 = 5;

fn group_for_function(num: u32) -> Option<(usize, FunctionGroup)> {
    GROUPS
        .iter()
        .enumerate()
        .find(|(_, g)| num >= g.base() && num < g.base() + g.width())
        .map(|(i, g)| (i, *g))
}

/// One locomotive's outgoing-packet state: speed, function bitmaps for
/// every group it has enabled, and any pending on-main CV operation.
///
/// Changing the speed or a function rewinds the rotation so that the new
/// value goes out on the very next packet, matching how a real throttle's
/// knob turn should be felt immediately rather than queued behind stale
/// state.
pub struct LocoSlot {
    address: u16,
    speed: i32,
    func_bits: [u8; GROUPS.len()],
    enabled: heapless::Vec<usize, { GROUPS.len() }>,
    seq: usize,

    pending_write_cv: Option<(u16, u8)>,
    write_cv_cnt: u8,
    pending_write_bit: Option<(u16, u8, u8)>,
    write_bit_cnt: u8,
    pending_read_cv: Option<u16>,
    read_cv_cnt: u8,
}

impl LocoSlot {
    /// Create a slot for `address` with every function group enabled.
    pub fn new(address: u16) -> Result<Self> {
        if address == 0 {
            return Err(Error::InvalidArgument);
        }
        let enabled = (0..GROUPS.len()).collect();
        Ok(Self {
            address,
            speed: 0,
            func_bits: [0; GROUPS.len()],
            enabled,
            seq: 0,
            pending_write_cv: None,
            write_cv_cnt: 0,
            pending_write_bit: None,
            write_bit_cnt: 0,
            pending_read_cv: None,
            read_cv_cnt: 0,
        })
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    fn seq_max(&self) -> usize {
        2 * (1 + self.enabled.len())
    }

    pub fn set_speed(&mut self, speed: i32) {
        self.speed = speed;
        self.seq &= !1;
    }

    pub fn set_function(&mut self, num: u32, on: bool) -> Result<()> {
        let (group_idx, group) = group_for_function(num).ok_or(Error::InvalidArgument)?;
        let Some(pos) = self.enabled.iter().position(|&i| i == group_idx) else {
            return Err(Error::InvalidArgument);
        };
        let bit = num - group.base();
        if on {
            self.func_bits[group_idx] |= 1 << bit;
        } else {
            self.func_bits[group_idx] &= !(1 << bit);
        }
        self.seq = 2 * pos + 1;
        Ok(())
    }

    pub fn write_cv(&mut self, cv: u16, value: u8) {
        self.pending_write_cv = Some((cv, value));
        self.write_cv_cnt = ON_MAIN_SEND_COUNT;
    }

    pub fn write_bit(&mut self, cv: u16, bit: u8, value: u8) {
        self.pending_write_bit = Some((cv, bit, value));
        self.write_bit_cnt = ON_MAIN_SEND_COUNT;
    }

    /// Request a Programming-on-Main CV read. The decoder's RailCom reply,
    /// if any, arrives asynchronously through [`LocoSlot::railcom`]; this
    /// station does not itself correlate the reply to the request.
    pub fn read_cv(&mut self, cv: u16) {
        self.pending_read_cv = Some(cv);
        self.read_cv_cnt = ON_MAIN_SEND_COUNT;
    }

    /// Produce the next packet for this loco and advance rotation state.
    /// On-main CV operations pre-empt the speed/function rotation entirely.
    pub fn next_packet(&mut self) -> Packet {
        if self.write_cv_cnt > 0 {
            self.write_cv_cnt -= 1;
            let (cv, val) = self.pending_write_cv.expect("write_cv_cnt implies pending_write_cv");
            return packet::cv_access_long(self.address, CvOp::WriteByte, cv, val, None)
                .unwrap_or_else(|_| packet::idle());
        }
        if self.write_bit_cnt > 0 {
            self.write_bit_cnt -= 1;
            let (cv, bit, val) = self.pending_write_bit.expect("write_bit_cnt implies pending_write_bit");
            return packet::cv_access_long(self.address, CvOp::BitManipulation, cv, val, Some(bit))
                .unwrap_or_else(|_| packet::idle());
        }
        if self.read_cv_cnt > 0 {
            self.read_cv_cnt -= 1;
            let cv = self.pending_read_cv.expect("read_cv_cnt implies pending_read_cv");
            return packet::cv_access_long(self.address, CvOp::VerifyByte, cv, 0, None)
                .unwrap_or_else(|_| packet::idle());
        }

        let seq = self.seq;
        self.seq = (self.seq + 1) % self.seq_max();

        if seq % 2 == 0 {
            packet::speed128(self.address, self.speed).unwrap_or_else(|_| packet::idle())
        } else {
            let pos = seq / 2;
            let group_idx = self.enabled[pos.min(self.enabled.len() - 1)];
            let group = GROUPS[group_idx];
            packet::function_group(self.address, group, self.func_bits[group_idx])
                .unwrap_or_else(|_| packet::idle())
        }
    }

    /// Deliver RailCom channel-2 messages that a [`super::bitstream::BitstreamTx`]
    /// attributed to this slot's most recently transmitted packet.
    pub fn railcom(&mut self, _messages: &[Message]) {
        // No built-in consumer: the reference implementation never wired a
        // controller-level handler for on-main CV read replies (see
        // DESIGN.md). Applications that need the decoded value should
        // override this by driving the registry directly and inspecting
        // `messages` themselves; this default is a no-op.
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rotation_interleaves_speed_and_functions() {
        let mut slot = LocoSlot::new(3).unwrap();
        let p0 = slot.next_packet();
        assert_eq!(dcc_core::packet::decode_type(p0.as_bytes()), dcc_core::packet::PacketType::Speed128);
        let p1 = slot.next_packet();
        assert_eq!(
            dcc_core::packet::decode_type(p1.as_bytes()),
            dcc_core::packet::PacketType::FunctionGroup(FunctionGroup::F0F4)
        );
        let p2 = slot.next_packet();
        assert_eq!(dcc_core::packet::decode_type(p2.as_bytes()), dcc_core::packet::PacketType::Speed128);
    }

    #[test]
    fn setting_function_jumps_rotation_to_its_group() {
        let mut slot = LocoSlot::new(3).unwrap();
        slot.set_function(21, true).unwrap();
        let p = slot.next_packet();
        assert_eq!(
            dcc_core::packet::decode_type(p.as_bytes()),
            dcc_core::packet::PacketType::FunctionGroup(FunctionGroup::F21F28)
        );
    }

    #[test]
    fn write_cv_preempts_rotation() {
        let mut slot = LocoSlot::new(3).unwrap();
        slot.write_cv(29, 0x06);
        for _ in 0..5 {
            let p = slot.next_packet();
            assert_eq!(dcc_core::packet::decode_type(p.as_bytes()), dcc_core::packet::PacketType::CvAccessLong);
        }
        let p = slot.next_packet();
        assert_eq!(dcc_core::packet::decode_type(p.as_bytes()), dcc_core::packet::PacketType::Speed128);
    }
}
