//! Periodic ticker on simulated time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, trace};

use super::queue::EventQueue;
use super::simulator::Shared;
use super::tick::{emit, Emission};
use super::{Delivery, Tick, Ticker};

struct TickerState {
    period: Duration,
    delivery: Delivery,
    stopped: AtomicBool,
    tx: Sender<Tick>,
}

pub(crate) struct SimTicker {
    state: Arc<TickerState>,
    rx: Receiver<Tick>,
}

impl SimTicker {
    /// Arms the first tick one period after the current virtual now.
    ///
    /// # Panics
    ///
    /// Panics if `period` is zero.
    pub(crate) fn start(shared: &Shared, period: Duration, delivery: Delivery) -> Self {
        assert!(!period.is_zero(), "ticker period must be positive");
        let (tx, rx) = channel::bounded(0);
        let state = Arc::new(TickerState {
            period,
            delivery,
            stopped: AtomicBool::new(false),
            tx,
        });
        let now = shared.now.read();
        schedule(&shared.queue, Arc::clone(&state), *now + period);
        drop(now);
        Self { state, rx }
    }
}

fn schedule(queue: &EventQueue, state: Arc<TickerState>, at: SystemTime) {
    queue.push(at, move |queue, now| {
        if state.stopped.load(Ordering::Acquire) {
            return;
        }
        match emit(&state.tx, state.delivery, now) {
            Emission::Delivered => {}
            Emission::Dropped => trace!(?now, "ticker tick dropped"),
            Emission::Disconnected => {
                debug!(?now, "ticker receiver gone, not rearming");
                return;
            }
        }
        if !state.stopped.load(Ordering::Acquire) {
            let next = now + state.period;
            schedule(queue, state, next);
        }
    });
}

impl Ticker for SimTicker {
    fn receiver(&self) -> &Receiver<Tick> {
        &self.rx
    }

    fn stop(&self) -> bool {
        !self.state.stopped.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use crate::time::{Delivery, Simulator, TimeManager};
    use crossbeam::select;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    fn secs(n: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(n)
    }

    #[test]
    fn ticks_every_period() {
        let sim = Simulator::new(UNIX_EPOCH);
        let ticker = sim.new_ticker(Duration::from_secs(1), Delivery::Blocking);
        sim.start().unwrap();

        for i in 1..=10 {
            let tick = ticker.receiver().recv().unwrap();
            assert_eq!(tick.time(), secs(i));
            tick.done();
        }
        ticker.stop();
        sim.stop();
    }

    #[test]
    fn equal_period_tickers_stay_in_step() {
        let sim = Simulator::new(UNIX_EPOCH);
        let a = sim.new_ticker(Duration::from_secs(1), Delivery::Blocking);
        let b = sim.new_ticker(Duration::from_secs(1), Delivery::Blocking);
        sim.start().unwrap();

        let (mut count_a, mut count_b) = (0u32, 0u32);
        while count_a < 20 || count_b < 20 {
            select! {
                recv(a.receiver()) -> tick => {
                    let tick = tick.unwrap();
                    count_a += 1;
                    assert_eq!(tick.time(), secs(count_a.into()));
                    tick.done();
                }
                recv(b.receiver()) -> tick => {
                    let tick = tick.unwrap();
                    count_b += 1;
                    assert_eq!(tick.time(), secs(count_b.into()));
                    tick.done();
                }
            }
            assert!(count_a.abs_diff(count_b) <= 1, "skew {count_a} vs {count_b}");
        }
        a.stop();
        b.stop();
        sim.stop();
    }

    #[test]
    fn different_periods_interleave_by_time() {
        let sim = Simulator::new(UNIX_EPOCH);
        let three = sim.new_ticker(Duration::from_secs(3), Delivery::Blocking);
        let five = sim.new_ticker(Duration::from_secs(5), Delivery::Blocking);
        sim.start().unwrap();

        let mut seen = Vec::new();
        while seen.len() < 6 {
            select! {
                recv(three.receiver()) -> tick => {
                    let tick = tick.unwrap();
                    seen.push((3, tick.time()));
                    tick.done();
                }
                recv(five.receiver()) -> tick => {
                    let tick = tick.unwrap();
                    seen.push((5, tick.time()));
                    tick.done();
                }
            }
        }
        assert_eq!(
            seen,
            vec![
                (3, secs(3)),
                (5, secs(5)),
                (3, secs(6)),
                (3, secs(9)),
                (5, secs(10)),
                (3, secs(12)),
            ]
        );
        sim.stop();
    }

    #[test]
    fn stop_ends_ticks() {
        let sim = Simulator::new(UNIX_EPOCH);
        let ticker = sim.new_ticker(Duration::from_secs(1), Delivery::Blocking);
        sim.start().unwrap();

        let tick = ticker.receiver().recv().unwrap();
        assert!(ticker.stop());
        assert!(!ticker.stop());
        tick.done();

        assert!(sim.sleep(Duration::from_secs(5)) >= secs(6));
        assert!(ticker.receiver().try_recv().is_err());
        sim.stop();
    }

    #[test]
    fn non_blocking_ticker_keeps_period_while_unread() {
        let sim = Simulator::new(UNIX_EPOCH);
        let ticker = sim.new_ticker(Duration::from_secs(1), Delivery::NonBlocking);
        sim.start().unwrap();

        sim.sleep(Duration::from_millis(3_500));
        let tick = ticker.receiver().recv().unwrap();
        assert!(tick.time() >= secs(4));
        assert_eq!(tick.time().duration_since(UNIX_EPOCH).unwrap().subsec_nanos(), 0);
        tick.done();
        ticker.stop();
        sim.stop();
    }

    #[test]
    #[should_panic(expected = "ticker period must be positive")]
    fn zero_period_panics() {
        let sim = Simulator::new(UNIX_EPOCH);
        let _ticker = sim.new_ticker(Duration::ZERO, Delivery::Blocking);
    }
}
