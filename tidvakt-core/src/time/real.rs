//! Operating system clock.
//!
//! Each timer and ticker owns a relay thread that waits on a crossbeam
//! deadline channel and turns expiries into [`Tick`]s. Ticks from the real
//! clock are detached: nothing waits for their acknowledgment.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tracing::trace;

use super::tick::{offer, Emission};
use super::{Delivery, Tick, Ticker, TimeManager, Timer};

#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

impl TimeManager for RealClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> SystemTime {
        thread::sleep(duration);
        SystemTime::now()
    }

    fn new_timer(&self, duration: Duration, delivery: Delivery) -> Box<dyn Timer> {
        Box::new(RealTimer::spawn(duration, delivery))
    }

    fn new_ticker(&self, period: Duration, delivery: Delivery) -> Box<dyn Ticker> {
        Box::new(RealTicker::spawn(period, delivery))
    }

    fn freeze_now(&self) -> Tick {
        Tick::detached(SystemTime::now())
    }
}

struct RealTimer {
    deadline: Arc<Mutex<Option<Instant>>>,
    wake: Sender<()>,
    rx: Receiver<Tick>,
}

impl RealTimer {
    fn spawn(duration: Duration, delivery: Delivery) -> Self {
        let (tx, rx) = channel::bounded(0);
        let (wake, wake_rx) = channel::unbounded();
        let deadline = Arc::new(Mutex::new(Some(Instant::now() + duration)));
        let relay = Arc::clone(&deadline);
        thread::spawn(move || relay_timer(relay, wake_rx, tx, delivery));
        Self { deadline, wake, rx }
    }
}

fn relay_timer(
    deadline: Arc<Mutex<Option<Instant>>>,
    wake: Receiver<()>,
    tx: Sender<Tick>,
    delivery: Delivery,
) {
    let mut handle_alive = true;
    loop {
        let armed = *deadline.lock();
        let expiry = match armed {
            Some(at) => channel::at(at),
            None if handle_alive => channel::never(),
            // Nothing armed and nobody left to re-arm.
            None => return,
        };
        let control = if handle_alive {
            wake.clone()
        } else {
            channel::never()
        };

        select! {
            recv(control) -> msg => {
                if msg.is_err() {
                    handle_alive = false;
                }
            }
            recv(expiry) -> _ => {
                let fire = {
                    let mut current = deadline.lock();
                    let unchanged = *current == armed;
                    if unchanged {
                        *current = None;
                    }
                    unchanged
                };
                if fire {
                    let tick = Tick::detached(SystemTime::now());
                    match offer(&tx, delivery, tick) {
                        Emission::Disconnected => return,
                        Emission::Dropped => trace!("timer tick dropped"),
                        Emission::Delivered => {}
                    }
                }
            }
        }
    }
}

impl Timer for RealTimer {
    fn receiver(&self) -> &Receiver<Tick> {
        &self.rx
    }

    fn stop(&self) -> bool {
        let armed = self.deadline.lock().take().is_some();
        let _ = self.wake.send(());
        armed
    }

    fn reset(&self, duration: Duration) -> bool {
        let expires_at = Instant::now() + duration;
        let later = {
            let mut current = self.deadline.lock();
            let later = current.map_or(true, |previous| previous < expires_at);
            *current = Some(expires_at);
            later
        };
        let _ = self.wake.send(());
        later
    }
}

struct RealTicker {
    stop: Mutex<Option<Sender<()>>>,
    rx: Receiver<Tick>,
}

impl RealTicker {
    fn spawn(period: Duration, delivery: Delivery) -> Self {
        assert!(!period.is_zero(), "ticker period must be positive");
        let (tx, rx) = channel::bounded(0);
        let (stop_tx, stop_rx) = channel::bounded(0);
        thread::spawn(move || relay_ticker(period, delivery, tx, stop_rx));
        Self {
            stop: Mutex::new(Some(stop_tx)),
            rx,
        }
    }
}

fn relay_ticker(period: Duration, delivery: Delivery, tx: Sender<Tick>, stop: Receiver<()>) {
    let ticks = channel::tick(period);
    loop {
        select! {
            recv(stop) -> _ => return,
            recv(ticks) -> _ => {
                let tick = Tick::detached(SystemTime::now());
                let emission = match delivery {
                    Delivery::Blocking => select! {
                        send(tx, tick) -> res => match res {
                            Ok(()) => Emission::Delivered,
                            Err(_) => Emission::Disconnected,
                        },
                        recv(stop) -> _ => return,
                    },
                    Delivery::NonBlocking => offer(&tx, delivery, tick),
                };
                if emission == Emission::Disconnected {
                    return;
                }
            }
        }
    }
}

impl Ticker for RealTicker {
    fn receiver(&self) -> &Receiver<Tick> {
        &self.rx
    }

    fn stop(&self) -> bool {
        // Dropping the sender disconnects the relay's stop channel.
        self.stop.lock().take().is_some()
    }
}
