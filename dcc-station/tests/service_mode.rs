//! Integration coverage for the Service-mode direct-mode CV protocol: write
//! with and without an acknowledgement, and an 8-bit read assembled from
//! per-bit acks.

use std::cell::Cell;
use std::rc::Rc;

use dcc_hal::pwm::Channel;
use dcc_hal::{AdcSampler, PwmDoubleBuffered, Uart};
use dcc_station::CommandController;

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

/// An ADC whose milliamp reading is externally steerable via a shared cell,
/// so a test can script exactly when a decoder "acks" by spiking current.
struct FakeAdc {
    ma: Rc<Cell<u16>>,
}

impl AdcSampler for FakeAdc {
    fn start(&mut self) {}
    fn stop(&mut self) {}
    fn poll(&mut self, mut f: impl FnMut(u16)) {
        f(self.ma.get());
    }
}

const BASELINE_MA: u16 = 0;
const ACK_MA: u16 = 300;

fn fresh() -> (CommandController<FakePwm, FakeUart, FakeAdc>, Rc<Cell<u16>>) {
    let ma = Rc::new(Cell::new(BASELINE_MA));
    let ctrl = CommandController::new(FakePwm, FakeUart, FakeAdc { ma: ma.clone() });
    (ctrl, ma)
}

/// Drive `ctrl` one scheduler tick at a time, scripting the current
/// reading via `ma_for_sent`, which is given the number of Service-mode
/// packets actually handed to the bitstream transmitter so far (keyed to
/// real packet emission, not wall-clock ticks, so it isn't thrown off by
/// ticks that only advance internal state without sending a packet).
/// Supplies enough PWM wraps per tick to let one full packet complete, and
/// stops as soon as `ctrl.svc_done()` reports a result or after `max_iters`.
fn drive(
    ctrl: &mut CommandController<FakePwm, FakeUart, FakeAdc>,
    ma: &Rc<Cell<u16>>,
    max_iters: usize,
    mut ma_for_sent: impl FnMut(usize) -> u16,
) {
    let mut sent = 0usize;
    for _ in 0..max_iters {
        ma.set(ma_for_sent(sent));
        let needed_before = ctrl.bitstream_mut().need_packet();
        ctrl.poll();
        if needed_before && !ctrl.bitstream_mut().need_packet() {
            sent += 1;
        }
        for _ in 0..60 {
            ctrl.bitstream_mut().on_wrap();
        }
        if ctrl.svc_done().is_some() {
            return;
        }
    }
}

#[test]
fn service_write_without_ack_times_out() {
    let (mut ctrl, ma) = fresh();
    ctrl.mode_svc_write_cv(29, 0x06).unwrap();
    drive(&mut ctrl, &ma, 60, |_| BASELINE_MA);
    assert_eq!(ctrl.svc_done(), Some(false));
}

#[test]
fn service_write_ack_during_command_phase_succeeds() {
    let (mut ctrl, ma) = fresh();
    ctrl.mode_svc_write_cv(29, 0x06).unwrap();
    // The first 20 packets are resets with no ack; the decoder acks as
    // soon as the command phase begins.
    drive(&mut ctrl, &ma, 60, |sent| if sent < 20 { BASELINE_MA } else { ACK_MA });
    assert_eq!(ctrl.svc_done(), Some(true));
}

#[test]
fn service_write_bit_ack_during_command_phase_succeeds() {
    let (mut ctrl, ma) = fresh();
    ctrl.mode_svc_write_bit(29, 3, 1).unwrap();
    drive(&mut ctrl, &ma, 60, |sent| if sent < 20 { BASELINE_MA } else { ACK_MA });
    assert_eq!(ctrl.svc_done(), Some(true));
}

/// Acks bits 7, 5, 2, and 0 of a verify-bit scan, plus the final byte
/// verify, which assembles to 0b1010_0101 == 0xA5.
#[test]
fn service_read_assembles_value_from_per_bit_acks() {
    let (mut ctrl, ma) = fresh();
    ctrl.mode_svc_read_cv(29).unwrap();

    // Packet budget: 20 resets, then 8 bits * (5 command + 5 reset) packets,
    // then 5 byte-verify + 5 reset. Generous margin included.
    drive(&mut ctrl, &ma, 160, |sent| {
        let acked_cohort = matches!(sent, 20..=29 | 40..=49 | 70..=79 | 90..=109);
        if acked_cohort {
            ACK_MA
        } else {
            BASELINE_MA
        }
    });

    assert_eq!(ctrl.svc_done_value(), Some((true, 0xA5)));
}

#[test]
fn service_read_with_no_acks_fails_with_zero_value() {
    let (mut ctrl, ma) = fresh();
    ctrl.mode_svc_read_cv(29).unwrap();
    drive(&mut ctrl, &ma, 160, |_| BASELINE_MA);
    assert_eq!(ctrl.svc_done_value(), Some((false, 0)));
}

#[test]
fn service_read_single_bit_true_when_acked() {
    let (mut ctrl, ma) = fresh();
    ctrl.mode_svc_read_bit(29, 5).unwrap();
    // Single-bit reads try value 0 first, then value 1; ack on the second
    // cohort reports the bit as set.
    drive(&mut ctrl, &ma, 60, |sent| if sent < 30 { BASELINE_MA } else { ACK_MA });
    assert_eq!(ctrl.svc_done_value(), Some((true, 1)));
}

#[test]
fn rejects_new_service_request_while_busy() {
    let (mut ctrl, _ma) = fresh();
    ctrl.mode_svc_write_cv(29, 0x06).unwrap();
    assert_eq!(
        ctrl.mode_svc_read_cv(30),
        Err(dcc_station::ControllerError::Busy)
    );
}
