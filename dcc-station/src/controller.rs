//! The top-level state machine: Operations mode packet rotation and the
//! Service-mode direct-mode CV write/read protocol.

use dcc_core::packet::{self, CvOp};
use dcc_core::spec;
use dcc_hal::{AdcSampler, PwmDoubleBuffered, Uart};

use crate::bitstream::{BitstreamTx, RailComEvent};
use crate::current_sensor::CurrentSensor;
use crate::throttle::LocoSlot;

/// Number of locomotives this station can track simultaneously. An ambient
/// bound: nothing in the wire protocol limits it, but a fixed-capacity
/// registry keeps the station free of heap allocation.
const MAX_LOCOS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerError {
    RegistryFull,
    /// A Service-mode request arrived while another was still in progress.
    Busy,
    Loco(dcc_core::Error),
}

impl From<dcc_core::Error> for ControllerError {
    fn from(e: dcc_core::Error) -> Self {
        ControllerError::Loco(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Off,
    Ops,
    SvcWriteCv,
    SvcReadCv,
}

/// Byte-verify sentinel for `verify_bit`: once bit-by-bit scanning of a CV
/// finds no mismatch, the controller verifies the whole assembled byte in
/// one shot before declaring success.
const BYTE_VERIFY: i32 = 8;

pub struct CommandController<P: PwmDoubleBuffered, U: Uart, A: AdcSampler> {
    bitstream: BitstreamTx<P, U>,
    adc: CurrentSensor<A>,
    mode: Mode,

    throttles: heapless::Vec<LocoSlot, MAX_LOCOS>,
    next_throttle: usize,

    svc_status: Option<bool>,
    ack_ma: u16,

    reset1_cnt: u32,
    reset2_cnt: u32,

    pkt_svc_write_cv: Option<dcc_core::packet::Packet>,
    write_cnt: u32,
    pkt_svc_write_bit: Option<dcc_core::packet::Packet>,
    write_bit_cnt: u32,

    cv_num: u16,
    cv_val: u8,
    read_bit: Option<u8>,
    verify_bit: i32,
    verify_bit_val: u8,
    verify_cnt: u32,
}

impl<P: PwmDoubleBuffered, U: Uart, A: AdcSampler> CommandController<P, U, A> {
    pub fn new(pwm: P, uart: U, adc: A) -> Self {
        Self {
            bitstream: BitstreamTx::new(pwm, uart),
            adc: CurrentSensor::new(adc),
            mode: Mode::Off,
            throttles: heapless::Vec::new(),
            next_throttle: 0,
            svc_status: None,
            ack_ma: 0,
            reset1_cnt: 0,
            reset2_cnt: 0,
            pkt_svc_write_cv: None,
            write_cnt: 0,
            pkt_svc_write_bit: None,
            write_bit_cnt: 0,
            cv_num: 0,
            cv_val: 0,
            read_bit: None,
            verify_bit: 0,
            verify_bit_val: 1,
            verify_cnt: 0,
        }
    }

    /// Access the bitstream transmitter, e.g. to hand its [`on_wrap`]
    /// handler to a board's PWM interrupt trampoline.
    ///
    /// [`on_wrap`]: BitstreamTx::on_wrap
    pub fn bitstream_mut(&mut self) -> &mut BitstreamTx<P, U> {
        &mut self.bitstream
    }

    pub fn mode_off(&mut self) {
        self.mode = Mode::Off;
        self.adc.stop();
        self.bitstream.stop();
    }

    pub fn mode_ops(&mut self) {
        self.mode = Mode::Ops;
        self.bitstream.start_ops();
    }

    fn reject_if_busy(&self) -> Result<(), ControllerError> {
        match self.mode {
            Mode::SvcWriteCv | Mode::SvcReadCv => Err(ControllerError::Busy),
            Mode::Off | Mode::Ops => Ok(()),
        }
    }

    pub fn mode_svc_write_cv(&mut self, cv: u16, value: u8) -> Result<(), ControllerError> {
        self.reject_if_busy()?;
        self.pkt_svc_write_cv = Some(packet::svc_direct(CvOp::WriteByte, cv, value, None)?);
        self.mode = Mode::SvcWriteCv;
        self.svc_status = None;
        self.reset1_cnt = spec::SVC_RESET1_COUNT;
        self.write_cnt = spec::SVC_COMMAND_COUNT;
        self.write_bit_cnt = 0;
        self.reset2_cnt = spec::SVC_RESET2_COUNT;
        self.adc.start();
        self.bitstream.start_svc();
        Ok(())
    }

    pub fn mode_svc_write_bit(&mut self, cv: u16, bit: u8, value: u8) -> Result<(), ControllerError> {
        self.reject_if_busy()?;
        self.pkt_svc_write_bit = Some(packet::svc_direct(CvOp::BitManipulation, cv, value, Some(bit))?);
        self.mode = Mode::SvcWriteCv;
        self.svc_status = None;
        self.reset1_cnt = spec::SVC_RESET1_COUNT;
        self.write_cnt = 0;
        self.write_bit_cnt = spec::SVC_COMMAND_COUNT;
        self.reset2_cnt = spec::SVC_RESET2_COUNT;
        self.adc.start();
        self.bitstream.start_svc();
        Ok(())
    }

    pub fn mode_svc_read_cv(&mut self, cv: u16) -> Result<(), ControllerError> {
        self.reject_if_busy()?;
        self.mode = Mode::SvcReadCv;
        self.svc_status = None;
        self.reset1_cnt = spec::SVC_RESET1_COUNT;
        self.cv_num = cv;
        self.cv_val = 0;
        self.read_bit = None;
        self.verify_bit_val = 1;
        self.adc.start();
        self.bitstream.start_svc();
        Ok(())
    }

    pub fn mode_svc_read_bit(&mut self, cv: u16, bit: u8) -> Result<(), ControllerError> {
        self.reject_if_busy()?;
        self.mode = Mode::SvcReadCv;
        self.svc_status = None;
        self.reset1_cnt = spec::SVC_RESET1_COUNT;
        self.cv_num = cv;
        self.read_bit = Some(bit);
        self.verify_bit_val = 0;
        self.adc.start();
        self.bitstream.start_svc();
        Ok(())
    }

    /// Whether the in-progress Service-mode operation has finished, and if
    /// so, whether the decoder acknowledged it.
    pub fn svc_done(&self) -> Option<bool> {
        self.svc_status
    }

    /// As [`CommandController::svc_done`], but for a read: also yields the
    /// verified CV value on success.
    pub fn svc_done_value(&self) -> Option<(bool, u8)> {
        self.svc_status.map(|ok| (ok, self.cv_val))
    }

    /// Allocate a registry slot for `address`, or return the existing one.
    pub fn create_loco(&mut self, address: u16) -> Result<usize, ControllerError> {
        if let Some(pos) = self.throttles.iter().position(|t| t.address() == address) {
            return Ok(pos);
        }
        let slot = LocoSlot::new(address)?;
        self.throttles.push(slot).map_err(|_| ControllerError::RegistryFull)?;
        Ok(self.throttles.len() - 1)
    }

    pub fn delete_loco(&mut self, address: u16) -> Result<(), ControllerError> {
        let pos = self
            .throttles
            .iter()
            .position(|t| t.address() == address)
            .ok_or(ControllerError::Loco(dcc_core::Error::InvalidArgument))?;
        self.throttles.swap_remove(pos);
        self.next_throttle = 0;
        Ok(())
    }

    pub fn find_loco(&mut self, address: u16) -> Option<&mut LocoSlot> {
        self.throttles.iter_mut().find(|t| t.address() == address)
    }

    /// Drive the state machine forward by one scheduler tick. Call this
    /// from the main loop, not from interrupt context.
    pub fn poll(&mut self) {
        match self.mode {
            Mode::Off => {}
            Mode::Ops => self.poll_ops(),
            Mode::SvcWriteCv => {
                self.adc.poll();
                self.poll_svc_write();
            }
            Mode::SvcReadCv => {
                self.adc.poll();
                self.poll_svc_read();
            }
        }
    }

    /// Feed a RailCom channel-2 event observed during an ISR's cutout
    /// window to the loco it was attributed to.
    pub fn deliver_railcom(&mut self, event: RailComEvent) {
        let Some(originator) = event.originator else { return };
        if let Some(slot) = self.throttles.get_mut(originator) {
            slot.railcom(&event.messages);
        }
    }

    fn poll_ops(&mut self) {
        if !self.bitstream.need_packet() || self.throttles.is_empty() {
            return;
        }
        let idx = self.next_throttle % self.throttles.len();
        let pkt = self.throttles[idx].next_packet();
        self.bitstream.send_packet(pkt, Some(idx));
        self.next_throttle = (idx + 1) % self.throttles.len();
    }

    fn poll_svc_write(&mut self) {
        if self.reset1_cnt > 0 {
            if self.bitstream.need_packet() {
                self.bitstream.send_packet(packet::reset(), None);
                self.reset1_cnt -= 1;
                if self.reset1_cnt == 0 {
                    self.ack_ma = self.adc.long_avg_ma() + spec::ACK_INC_MA;
                }
            }
            return;
        }

        let short_ma = self.adc.short_avg_ma();
        if short_ma >= self.ack_ma {
            #[cfg(not(feature = "adc-log"))]
            {
                self.write_cnt = 0;
                self.write_bit_cnt = 0;
                self.reset2_cnt = 0;
            }
            self.svc_status = Some(true);
        }

        if self.write_cnt > 0 {
            if self.bitstream.need_packet() {
                let pkt = self.pkt_svc_write_cv.expect("write_cnt implies pkt_svc_write_cv");
                self.bitstream.send_packet(pkt, None);
                self.write_cnt -= 1;
            }
        } else if self.write_bit_cnt > 0 {
            if self.bitstream.need_packet() {
                let pkt = self.pkt_svc_write_bit.expect("write_bit_cnt implies pkt_svc_write_bit");
                self.bitstream.send_packet(pkt, None);
                self.write_bit_cnt -= 1;
            }
        } else if self.reset2_cnt > 0 {
            if self.bitstream.need_packet() {
                self.bitstream.send_packet(packet::reset(), None);
                self.reset2_cnt -= 1;
            }
        } else {
            if self.svc_status.is_none() {
                self.svc_status = Some(false);
            }
            self.mode_off();
        }
    }

    fn poll_svc_read(&mut self) {
        if self.reset1_cnt > 0 {
            if self.bitstream.need_packet() {
                self.bitstream.send_packet(packet::reset(), None);
                self.reset1_cnt -= 1;
                if self.reset1_cnt == 0 {
                    self.ack_ma = self.adc.long_avg_ma() + spec::ACK_INC_MA;
                    self.verify_bit = match self.read_bit {
                        Some(b) if b < 8 => b as i32,
                        _ => 7,
                    };
                    self.verify_cnt = spec::SVC_COMMAND_COUNT;
                }
            }
            return;
        }

        let short_ma = self.adc.short_avg_ma();
        if short_ma >= self.ack_ma {
            if self.read_bit.is_some() {
                self.cv_val = self.verify_bit_val;
                self.svc_status = Some(true);
                #[cfg(not(feature = "adc-log"))]
                {
                    self.verify_cnt = 0;
                    self.reset2_cnt = 0;
                }
            } else if self.verify_bit == BYTE_VERIFY {
                self.svc_status = Some(true);
                #[cfg(not(feature = "adc-log"))]
                {
                    self.verify_cnt = 0;
                    self.reset2_cnt = 0;
                }
            } else {
                self.cv_val |= 1 << self.verify_bit;
            }
        }

        if self.verify_cnt > 0 {
            if self.bitstream.need_packet() {
                let pkt = self.verify_packet().expect("valid cv_num set on mode entry");
                self.bitstream.send_packet(pkt, None);
                self.verify_cnt -= 1;
                if self.verify_cnt == 0 {
                    self.reset2_cnt = spec::SVC_RESET2_COUNT;
                }
            }
        } else if self.reset2_cnt > 0 {
            if self.bitstream.need_packet() {
                self.bitstream.send_packet(packet::reset(), None);
                self.reset2_cnt -= 1;
            }
            if self.reset2_cnt == 0 {
                self.ack_ma = self.adc.long_avg_ma() + spec::ACK_INC_MA;
            }
        } else if self.read_bit.is_some() {
            if self.verify_bit_val == 0 {
                self.verify_bit_val = 1;
                self.verify_cnt = spec::SVC_COMMAND_COUNT;
            } else {
                if self.svc_status.is_none() {
                    self.svc_status = Some(false);
                }
                self.mode_off();
            }
        } else if self.verify_bit == BYTE_VERIFY {
            if self.svc_status.is_none() {
                self.svc_status = Some(false);
            }
            self.mode_off();
        } else if self.verify_bit > 0 {
            self.verify_bit -= 1;
            self.verify_bit_val = 1;
            self.verify_cnt = spec::SVC_COMMAND_COUNT;
        } else {
            self.verify_bit = BYTE_VERIFY;
            self.verify_cnt = spec::SVC_COMMAND_COUNT;
        }
    }

    fn verify_packet(&self) -> dcc_core::Result<dcc_core::packet::Packet> {
        if self.verify_bit == BYTE_VERIFY {
            packet::svc_direct(CvOp::VerifyByte, self.cv_num, self.cv_val, None)
        } else {
            packet::svc_direct(CvOp::BitManipulation, self.cv_num, self.verify_bit_val, Some(self.verify_bit as u8))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use dcc_hal::pwm::Channel;

    struct FakePwm;
    impl PwmDoubleBuffered for FakePwm {
        fn set_period(&mut self, _period_us: u32) {}
        fn set_channel_duty(&mut self, _channel: Channel, _high_us: u32) {}
        fn set_enabled(&mut self, _enabled: bool) {}
        fn set_irq_enabled(&mut self, _enabled: bool) {}
    }

    struct FakeUart;
    impl Uart for FakeUart {
        fn init(&mut self) {}
        fn deinit(&mut self) {}
        fn readable(&self) -> bool {
            false
        }
        fn read(&mut self) -> u8 {
            0
        }
    }

    struct FakeAdc {
        ma: u16,
    }
    impl AdcSampler for FakeAdc {
        fn start(&mut self) {}
        fn stop(&mut self) {}
        fn poll(&mut self, mut f: impl FnMut(u16)) {
            f(self.ma);
        }
    }

    fn fresh() -> CommandController<FakePwm, FakeUart, FakeAdc> {
        CommandController::new(FakePwm, FakeUart, FakeAdc { ma: 0 })
    }

    #[test]
    fn write_cv_times_out_without_ack() {
        let mut ctrl = fresh();
        ctrl.mode_svc_write_cv(29, 0x06).unwrap();
        for _ in 0..2000 {
            ctrl.poll();
            for _ in 0..80 {
                ctrl.bitstream_mut().on_wrap();
            }
            if ctrl.svc_done().is_some() {
                break;
            }
        }
        assert_eq!(ctrl.svc_done(), Some(false));
    }

    #[test]
    fn registry_reports_full_past_capacity() {
        let mut ctrl = fresh();
        for addr in 1..=(MAX_LOCOS as u16) {
            ctrl.create_loco(addr).unwrap();
        }
        assert_eq!(
            ctrl.create_loco(MAX_LOCOS as u16 + 1),
            Err(ControllerError::RegistryFull)
        );
    }
}
