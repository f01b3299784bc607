//! Packet construction, parsing, and the XOR-checked wire format.
//!
//! DCC packets are short and fixed-shape, so unlike this workspace's other
//! wire formats there is no separate zero-copy view type: [`Packet`] owns its
//! bytes directly, and free functions (`idle`, `reset`, `speed128`,
//! `function_group`, `cv_access_long`, `svc_direct`, and the `decode_*`
//! family) build and parse it.

use crate::error::{Error, Result};
use crate::spec;

mod field {
    pub type Single = usize;

    /// Leading byte of every packet: address (short) or Idle/Reset/Svc tag.
    pub const ADDR0: Single = 0;
}

/// Maximum packet length in octets, including the trailing XOR byte.
pub const PACKET_MAX: usize = 6;

/// A fixed-capacity DCC packet byte string, including its trailing XOR byte.
///
/// Value type with inline storage; never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    buf: [u8; PACKET_MAX],
    len: u8,
}

impl Packet {
    const fn empty() -> Self {
        Self { buf: [0u8; PACKET_MAX], len: 0 }
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= PACKET_MAX);
        let mut p = Self::empty();
        p.buf[..bytes.len()].copy_from_slice(bytes);
        p.len = bytes.len() as u8;
        p.set_xor();
        p
    }

    /// Construct a packet from a caller-supplied byte slice, verbatim
    /// (no XOR byte is appended or rewritten).
    pub fn new_checked(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > PACKET_MAX {
            return Err(Error::TruncatedPacket);
        }
        let mut p = Self::empty();
        p.buf[..bytes.len()].copy_from_slice(bytes);
        p.len = bytes.len() as u8;
        if !check_xor(p.as_bytes()) {
            return Err(Error::BadXor);
        }
        Ok(p)
    }

    /// Rewrite the final byte so that the XOR of all bytes is zero.
    fn set_xor(&mut self) {
        let n = self.len as usize;
        debug_assert!(n >= 1);
        let mut x = 0u8;
        for &b in &self.buf[..n - 1] {
            x ^= b;
        }
        self.buf[n - 1] = x;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Packet {
    /// The default packet is Idle: harmless to transmit, never need_packet.
    fn default() -> Self {
        idle()
    }
}

/// Check that the XOR of every byte (including the last) is zero.
pub fn check_xor(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    bytes.iter().fold(0u8, |acc, &b| acc ^ b) == 0
}

/// The classification of a packet's leading bytes and payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PacketType {
    Idle,
    Reset,
    Speed128,
    FunctionGroup(FunctionGroup),
    CvAccessLong,
    SvcDirect,
    Unimplemented,
}

/// The seven function-group instruction shapes, from the base three
/// three-nibble groups through the extended two-byte high groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FunctionGroup {
    F0F4,
    F5F8,
    F9F12,
    F13F20,
    F21F28,
    F29F36,
    F37F44,
    F45F52,
    F53F60,
    F61F68,
}

impl FunctionGroup {
    /// First function number in the group.
    pub const fn base(self) -> u32 {
        match self {
            FunctionGroup::F0F4 => 0,
            FunctionGroup::F5F8 => 5,
            FunctionGroup::F9F12 => 9,
            FunctionGroup::F13F20 => 13,
            FunctionGroup::F21F28 => 21,
            FunctionGroup::F29F36 => 29,
            FunctionGroup::F37F44 => 37,
            FunctionGroup::F45F52 => 45,
            FunctionGroup::F53F60 => 53,
            FunctionGroup::F61F68 => 61,
        }
    }

    /// Number of functions carried in the group (4 for the low three, 8 for
    /// the extended groups).
    pub const fn width(self) -> u32 {
        match self {
            FunctionGroup::F0F4 | FunctionGroup::F5F8 | FunctionGroup::F9F12 => 4,
            _ => 8,
        }
    }

    /// Two-byte-instruction opcode for the extended groups. `None` for the
    /// three base groups, which are single-byte instructions.
    const fn ext_opcode(self) -> Option<u8> {
        match self {
            FunctionGroup::F13F20 => Some(0xDE),
            FunctionGroup::F21F28 => Some(0xDF),
            FunctionGroup::F29F36 => Some(0xD8),
            FunctionGroup::F37F44 => Some(0xD9),
            FunctionGroup::F45F52 => Some(0xDA),
            FunctionGroup::F53F60 => Some(0xDB),
            FunctionGroup::F61F68 => Some(0xDC),
            _ => None,
        }
    }

    fn from_ext_opcode(op: u8) -> Option<Self> {
        match op {
            0xDE => Some(FunctionGroup::F13F20),
            0xDF => Some(FunctionGroup::F21F28),
            0xD8 => Some(FunctionGroup::F29F36),
            0xD9 => Some(FunctionGroup::F37F44),
            0xDA => Some(FunctionGroup::F45F52),
            0xDB => Some(FunctionGroup::F53F60),
            0xDC => Some(FunctionGroup::F61F68),
            _ => None,
        }
    }
}

/// CV Access Long Form sub-operation (DCC Spec 9.2.3, section D/E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CvOp {
    VerifyByte,
    WriteByte,
    BitManipulation,
}

impl CvOp {
    const fn cc_bits(self) -> u8 {
        match self {
            CvOp::VerifyByte => 0b01,
            CvOp::WriteByte => 0b11,
            CvOp::BitManipulation => 0b10,
        }
    }

    fn from_cc_bits(cc: u8) -> Option<Self> {
        match cc {
            0b01 => Some(CvOp::VerifyByte),
            0b11 => Some(CvOp::WriteByte),
            0b10 => Some(CvOp::BitManipulation),
            _ => None,
        }
    }
}

/// Address form: short (one byte, 1..127) or long (two bytes, 128..10239).
fn encode_address(address: u16, buf: &mut [u8], at: usize) -> Result<usize> {
    if address == 0 || address > spec::ADDRESS_MAX {
        return Err(Error::InvalidArgument);
    }
    if address <= spec::ADDRESS_SHORT_MAX {
        buf[at] = address as u8;
        Ok(1)
    } else {
        buf[at] = 0xC0 | ((address >> 8) as u8 & 0x3F);
        buf[at + 1] = (address & 0xFF) as u8;
        Ok(2)
    }
}

/// Number of address bytes at the front of `bytes` (1 or 2), inferred from
/// the leading byte's top bits.
pub fn address_size(bytes: &[u8]) -> usize {
    if bytes.is_empty() {
        return 0;
    }
    if bytes[field::ADDR0] & 0xC0 == 0xC0 {
        2
    } else {
        1
    }
}

/// Decode the locomotive address from the leading bytes of a packet.
///
/// Returns `None` for Idle (`0xFF`), broadcast (`0x00`), or Service-mode
/// direct packets, none of which carry a locomotive address.
pub fn get_address(bytes: &[u8]) -> Option<u16> {
    if bytes.is_empty() {
        return None;
    }
    if bytes[0] == 0xFF || bytes[0] == 0x00 {
        return None;
    }
    if bytes[0] & 0xF0 == 0x70 {
        return None; // Service-mode direct: no address byte at all.
    }
    if address_size(bytes) == 2 {
        if bytes.len() < 2 {
            return None;
        }
        Some((((bytes[0] & 0x3F) as u16) << 8) | bytes[1] as u16)
    } else {
        Some(bytes[0] as u16)
    }
}

/// True when `bytes` is a 4-byte Service-mode direct-mode instruction
/// packet (`0b0111_ccaa aaaaaaaa dddddddd <xor>`).
pub fn is_svc_direct(bytes: &[u8]) -> bool {
    bytes.len() == 4 && (bytes[0] & 0xF0) == 0x70
}

/// Classify a packet's type from its byte shape. Unknown shapes, including
/// anything this station never produces (broadcast/accessory/advanced
/// forms), classify as [`PacketType::Unimplemented`].
pub fn decode_type(bytes: &[u8]) -> PacketType {
    if bytes.len() < 3 {
        return PacketType::Unimplemented;
    }
    if bytes[0] == 0xFF && bytes[1] == 0x00 {
        return PacketType::Idle;
    }
    if bytes[0] == 0x00 && bytes[1] == 0x00 {
        return PacketType::Reset;
    }
    if is_svc_direct(bytes) {
        return PacketType::SvcDirect;
    }
    let asz = address_size(bytes);
    if bytes.len() <= asz {
        return PacketType::Unimplemented;
    }
    let inst = bytes[asz];
    if inst == 0x3F {
        return PacketType::Speed128;
    }
    if inst & 0xF0 == 0x80 {
        return PacketType::FunctionGroup(FunctionGroup::F0F4);
    }
    if inst & 0xF0 == 0xB0 {
        return PacketType::FunctionGroup(FunctionGroup::F5F8);
    }
    if inst & 0xF0 == 0xA0 {
        return PacketType::FunctionGroup(FunctionGroup::F9F12);
    }
    if let Some(group) = FunctionGroup::from_ext_opcode(inst) {
        return PacketType::FunctionGroup(group);
    }
    if inst & 0xF0 == 0xE0 {
        return PacketType::CvAccessLong;
    }
    PacketType::Unimplemented
}

/// The Idle packet: `0xFF 0x00 0xFF`. Safe to transmit at any time.
pub fn idle() -> Packet {
    Packet::from_bytes(&[0xFF, 0x00])
}

/// The Digital Decoder Reset packet: `0x00 0x00 0x00`.
pub fn reset() -> Packet {
    Packet::from_bytes(&[0x00, 0x00])
}

/// Map a signed speed in `-127..=127` to its 128-step DCC byte.
///
/// `0` is stop. Magnitude `1..=126` is a running speed step. Magnitude `127`
/// is emergency stop. Sign selects direction (non-negative is forward).
pub fn int_to_dcc(speed: i32) -> Result<u8> {
    if !(spec::SPEED_MIN..=spec::SPEED_MAX).contains(&speed) {
        return Err(Error::InvalidArgument);
    }
    let dir_bit = if speed >= 0 { 0x80 } else { 0x00 };
    let step = speed.unsigned_abs() as u8;
    Ok(dir_bit | step)
}

/// Inverse of [`int_to_dcc`].
pub fn dcc_to_int(dcc: u8) -> i32 {
    let dir = dcc & 0x80 != 0;
    let step = (dcc & 0x7F) as i32;
    if dir {
        step
    } else {
        -step
    }
}

/// Build a 128-step Speed packet for `address`.
pub fn speed128(address: u16, speed: i32) -> Result<Packet> {
    let mut buf = [0u8; PACKET_MAX];
    let asz = encode_address(address, &mut buf, 0)?;
    buf[asz] = 0x3F;
    buf[asz + 1] = int_to_dcc(speed)?;
    Ok(Packet::from_bytes(&buf[..asz + 2]))
}

/// Decode a Speed128 packet's signed speed. `None` if `bytes` is not a
/// Speed128 packet for the given address size.
pub fn decode_speed_128(bytes: &[u8]) -> Option<i32> {
    let asz = address_size(bytes);
    if bytes.len() < asz + 2 || bytes[asz] != 0x3F {
        return None;
    }
    Some(dcc_to_int(bytes[asz + 1]))
}

/// Build a function-group packet asserting `bits` (one bit per function,
/// LSB = lowest function number in the group) for `address`.
pub fn function_group(address: u16, group: FunctionGroup, bits: u8) -> Result<Packet> {
    let width = group.width();
    if width < 8 && bits >> width != 0 {
        return Err(Error::InvalidArgument);
    }
    let mut buf = [0u8; PACKET_MAX];
    let asz = encode_address(address, &mut buf, 0)?;
    match group.ext_opcode() {
        Some(opcode) => {
            buf[asz] = opcode;
            buf[asz + 1] = bits;
            Ok(Packet::from_bytes(&buf[..asz + 2]))
        }
        None => {
            let inst = match group {
                FunctionGroup::F0F4 => 0x80 | (bits & 0x1F),
                FunctionGroup::F5F8 => 0xB0 | (bits & 0x0F),
                FunctionGroup::F9F12 => 0xA0 | (bits & 0x0F),
                _ => unreachable!(),
            };
            buf[asz] = inst;
            Ok(Packet::from_bytes(&buf[..asz + 1]))
        }
    }
}

/// Decode the function bitmap from a function-group packet matching
/// `group`. `None` if `bytes` is not that group's packet for its address.
pub fn decode_func(bytes: &[u8], group: FunctionGroup) -> Option<u8> {
    let asz = address_size(bytes);
    if bytes.len() <= asz {
        return None;
    }
    let inst = bytes[asz];
    match group.ext_opcode() {
        Some(opcode) => {
            if inst != opcode || bytes.len() < asz + 2 {
                return None;
            }
            Some(bytes[asz + 1])
        }
        None => match group {
            FunctionGroup::F0F4 if inst & 0xF0 == 0x80 => Some(inst & 0x1F),
            FunctionGroup::F5F8 if inst & 0xF0 == 0xB0 => Some(inst & 0x0F),
            FunctionGroup::F9F12 if inst & 0xF0 == 0xA0 => Some(inst & 0x0F),
            _ => None,
        },
    }
}

/// Build a CV Access Long Form Operations-mode packet (on-main programming).
pub fn cv_access_long(address: u16, op: CvOp, cv: u16, value: u8, bit: Option<u8>) -> Result<Packet> {
    if !(spec::CV_NUM_MIN..=spec::CV_NUM_MAX).contains(&cv) {
        return Err(Error::InvalidArgument);
    }
    let cv0 = cv - 1;
    let mut buf = [0u8; PACKET_MAX];
    let asz = encode_address(address, &mut buf, 0)?;
    buf[asz] = 0xE0 | (op.cc_bits() << 2) | ((cv0 >> 8) as u8 & 0x03);
    buf[asz + 1] = (cv0 & 0xFF) as u8;
    buf[asz + 2] = match op {
        CvOp::BitManipulation => {
            let bit = bit.ok_or(Error::InvalidArgument)?;
            if bit > 7 || value > 1 {
                return Err(Error::InvalidArgument);
            }
            0b1110_0000 | ((value & 1) << 3) | bit
        }
        _ => value,
    };
    Ok(Packet::from_bytes(&buf[..asz + 3]))
}

/// Build a Service-mode direct-mode instruction packet (no address byte).
pub fn svc_direct(op: CvOp, cv: u16, value: u8, bit: Option<u8>) -> Result<Packet> {
    if !(spec::CV_NUM_MIN..=spec::CV_NUM_MAX).contains(&cv) {
        return Err(Error::InvalidArgument);
    }
    let cv0 = cv - 1;
    let mut buf = [0u8; PACKET_MAX];
    buf[0] = 0x70 | (op.cc_bits() << 2) | ((cv0 >> 8) as u8 & 0x03);
    buf[1] = (cv0 & 0xFF) as u8;
    buf[2] = match op {
        CvOp::BitManipulation => {
            let bit = bit.ok_or(Error::InvalidArgument)?;
            if bit > 7 || value > 1 {
                return Err(Error::InvalidArgument);
            }
            0b1110_0000 | ((value & 1) << 3) | bit
        }
        _ => value,
    };
    Ok(Packet::from_bytes(&buf[..3]))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idle_round_trip() {
        let p = idle();
        assert_eq!(p.as_bytes(), &[0xFF, 0x00, 0xFF]);
        assert!(check_xor(p.as_bytes()));
        assert_eq!(decode_type(p.as_bytes()), PacketType::Idle);
    }

    #[test]
    fn reset_round_trip() {
        let p = reset();
        assert_eq!(p.as_bytes(), &[0x00, 0x00, 0x00]);
        assert_eq!(decode_type(p.as_bytes()), PacketType::Reset);
    }

    #[test]
    fn speed128_short_address_forward() {
        let p = speed128(3, 50).unwrap();
        assert!(check_xor(p.as_bytes()));
        assert_eq!(get_address(p.as_bytes()), Some(3));
        assert_eq!(decode_type(p.as_bytes()), PacketType::Speed128);
        assert_eq!(decode_speed_128(p.as_bytes()), Some(50));
    }

    #[test]
    fn speed128_reverse_and_estop() {
        let p = speed128(3, -1).unwrap();
        assert_eq!(decode_speed_128(p.as_bytes()), Some(-1));
        let p = speed128(3, -127).unwrap();
        assert_eq!(decode_speed_128(p.as_bytes()), Some(-127));
    }

    #[test]
    fn long_address_function_group() {
        let p = function_group(200, FunctionGroup::F0F4, 0b0_0001).unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(get_address(p.as_bytes()), Some(200));
        assert_eq!(
            decode_type(p.as_bytes()),
            PacketType::FunctionGroup(FunctionGroup::F0F4)
        );
        assert_eq!(decode_func(p.as_bytes(), FunctionGroup::F0F4), Some(0b0_0001));
    }

    #[test]
    fn extended_function_group_two_byte() {
        let p = function_group(3, FunctionGroup::F61F68, 0xAA).unwrap();
        assert_eq!(
            decode_type(p.as_bytes()),
            PacketType::FunctionGroup(FunctionGroup::F61F68)
        );
        assert_eq!(decode_func(p.as_bytes(), FunctionGroup::F61F68), Some(0xAA));
    }

    #[test]
    fn cv_access_long_write_byte() {
        let p = cv_access_long(3, CvOp::WriteByte, 29, 0x06, None).unwrap();
        assert!(check_xor(p.as_bytes()));
        assert_eq!(decode_type(p.as_bytes()), PacketType::CvAccessLong);
    }

    #[test]
    fn svc_direct_is_recognised() {
        let p = svc_direct(CvOp::WriteByte, 1, 3, None).unwrap();
        assert!(is_svc_direct(p.as_bytes()));
        assert_eq!(get_address(p.as_bytes()), None);
        assert_eq!(decode_type(p.as_bytes()), PacketType::SvcDirect);
    }

    #[test]
    fn rejects_out_of_range_address() {
        assert_eq!(speed128(0, 0), Err(Error::InvalidArgument));
        assert_eq!(speed128(10240, 0), Err(Error::InvalidArgument));
    }

    #[test]
    fn rejects_out_of_range_cv() {
        assert_eq!(cv_access_long(3, CvOp::WriteByte, 0, 0, None), Err(Error::InvalidArgument));
        assert_eq!(cv_access_long(3, CvOp::WriteByte, 1025, 0, None), Err(Error::InvalidArgument));
    }
}
