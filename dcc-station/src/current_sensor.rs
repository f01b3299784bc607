//! Track-current sensing: short/long moving averages used to recognise a
//! Service-mode decoder acknowledgement pulse.

use dcc_hal::AdcSampler;

/// One full cycle of 60 Hz mains noise at a 10 kHz sample rate.
const AVG_MAX: usize = 166;
/// Width of the short moving average.
const SHORT_CNT: usize = 16;

/// Maximum samples retained for offline ack-threshold analysis, behind the
/// `adc-log` feature: one second at 10 kHz.
#[cfg(feature = "adc-log")]
const LOG_MAX: usize = 10_000;

/// Wraps a board's [`AdcSampler`] with the short/long moving-average
/// bookkeeping the Service-mode ack protocol depends on.
pub struct CurrentSensor<A: AdcSampler> {
    adc: A,
    samples: [u16; AVG_MAX],
    idx: usize,
    filled: usize,
    #[cfg(feature = "adc-log")]
    log: heapless::Vec<u16, LOG_MAX>,
}

impl<A: AdcSampler> CurrentSensor<A> {
    pub fn new(adc: A) -> Self {
        Self {
            adc,
            samples: [0; AVG_MAX],
            idx: 0,
            filled: 0,
            #[cfg(feature = "adc-log")]
            log: heapless::Vec::new(),
        }
    }

    pub fn start(&mut self) {
        self.idx = 0;
        self.filled = 0;
        #[cfg(feature = "adc-log")]
        self.log.clear();
        self.adc.start();
    }

    pub fn stop(&mut self) {
        self.adc.stop();
    }

    /// Drain newly available samples from the underlying ADC.
    pub fn poll(&mut self) {
        let samples = &mut self.samples;
        let idx = &mut self.idx;
        let filled = &mut self.filled;
        #[cfg(feature = "adc-log")]
        let log = &mut self.log;
        self.adc.poll(|ma| {
            samples[*idx] = ma;
            *idx = (*idx + 1) % AVG_MAX;
            if *filled < AVG_MAX {
                *filled += 1;
            }
            #[cfg(feature = "adc-log")]
            {
                let _ = log.push(ma);
            }
        });
    }

    /// Average of the most recent [`SHORT_CNT`] samples.
    pub fn short_avg_ma(&self) -> u16 {
        self.avg_of_last(SHORT_CNT.min(self.filled))
    }

    /// Average of up to one full 60 Hz cycle of samples.
    pub fn long_avg_ma(&self) -> u16 {
        self.avg_of_last(self.filled)
    }

    fn avg_of_last(&self, n: usize) -> u16 {
        if n == 0 {
            return 0;
        }
        let mut sum: u32 = 0;
        for i in 0..n {
            let at = (self.idx + AVG_MAX - 1 - i) % AVG_MAX;
            sum += self.samples[at] as u32;
        }
        (sum / n as u32) as u16
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct FakeAdc {
        queue: heapless::spsc::Queue<u16, 32>,
    }

    impl AdcSampler for FakeAdc {
        fn start(&mut self) {}
        fn stop(&mut self) {}
        fn poll(&mut self, mut f: impl FnMut(u16)) {
            while let Some(v) = self.queue.dequeue() {
                f(v);
            }
        }
    }

    #[test]
    fn averages_over_pushed_samples() {
        let mut queue = heapless::spsc::Queue::new();
        for _ in 0..20 {
            queue.enqueue(100).ok();
        }
        let mut sensor = CurrentSensor::new(FakeAdc { queue });
        sensor.poll();
        assert_eq!(sensor.short_avg_ma(), 100);
        assert_eq!(sensor.long_avg_ma(), 100);
    }
}
