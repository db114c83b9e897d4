//! Fixed-delay filter.
//!
//! Every inbound chunk is stamped with `now + delay` and parked in a deadline
//! queue. A scheduling loop keeps one timer armed for the earliest deadline
//! and forwards chunks downstream once their deadline has passed.
//!
//! `on_inbound_chunk` freezes now for the whole hand-off, so under the
//! simulator the loop has re-armed its timer before time may move past the
//! new deadline.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tidvakt_config::DelayFilterConfig;
use tidvakt_core::time::{Delivery, TimeManager, Timer};
use tidvakt_telemetry::FilterMetrics;
use tracing::{debug, info, info_span, warn};
use validator::Validate;

use crate::chunk::{Chunk, Forward};
use crate::deadline_queue::DeadlineQueue;
use crate::error::FilterError;

pub struct DelayFilter<C: Chunk> {
    delay: Duration,
    idle_poll: Duration,
    queue: Mutex<DeadlineQueue<C>>,
    downstream: Arc<dyn Forward<C>>,
    time: Arc<dyn TimeManager>,
    /// Each push hands the loop a slot to acknowledge once it has rescheduled.
    push_tx: Sender<Sender<()>>,
    push_rx: Receiver<Sender<()>>,
    /// Dropped when the loop exits.
    halted_tx: Mutex<Option<Sender<()>>>,
    halted_rx: Receiver<()>,
    metrics: Option<FilterMetrics>,
}

impl<C: Chunk> DelayFilter<C> {
    pub fn new(
        config: &DelayFilterConfig,
        downstream: Arc<dyn Forward<C>>,
        time: Arc<dyn TimeManager>,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let (push_tx, push_rx) = channel::bounded(0);
        let (halted_tx, halted_rx) = channel::bounded(0);
        Ok(Self {
            delay: config.delay(),
            idle_poll: config.idle_poll(),
            queue: Mutex::new(DeadlineQueue::new()),
            downstream,
            time,
            push_tx,
            push_rx,
            halted_tx: Mutex::new(Some(halted_tx)),
            halted_rx,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: FilterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Chunks waiting for their deadline.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Queue `chunk` for release at `now + delay`.
    ///
    /// Blocks until the scheduling loop has accounted for the new deadline.
    /// If the loop is no longer running the chunk stays queued.
    pub fn on_inbound_chunk(&self, chunk: C) {
        let frozen = self.time.freeze_now();
        let deadline = frozen.time() + self.delay;
        let queued = {
            let mut queue = self.queue.lock();
            queue.push(chunk, deadline);
            queue.len()
        };
        if let Some(metrics) = &self.metrics {
            metrics.set_queued(queued);
        }

        let (ack_tx, ack_rx) = channel::bounded(1);
        select! {
            send(self.push_tx, ack_tx) -> res => {
                if res.is_ok() {
                    let _ = ack_rx.recv();
                }
            }
            recv(self.halted_rx) -> _ => {
                warn!(queued, "delay filter loop is not running, chunk left queued");
            }
        }
        frozen.done();
    }

    /// Scheduling loop. Returns when `cancel` fires or disconnects; chunks
    /// still queued at that point are not forwarded.
    pub fn run(&self, cancel: Receiver<()>) {
        let span = info_span!("delay_filter", delay_ms = self.delay.as_millis() as u64);
        let _enter = span.enter();
        info!("delay filter loop started");

        let timer = self.time.new_timer(self.idle_poll, Delivery::Blocking);
        loop {
            select! {
                recv(cancel) -> _ => break,
                recv(self.push_rx) -> ack => {
                    let Ok(ack) = ack else { break };
                    self.reschedule(timer.as_ref());
                    let _ = ack.send(());
                }
                recv(timer.receiver()) -> tick => {
                    let Ok(tick) = tick else { break };
                    let released = self.release_due(tick.time());
                    // An idle tick on an empty queue leaves the timer unarmed
                    // until the next push.
                    if released > 0 || !self.is_empty() {
                        self.reschedule(timer.as_ref());
                    }
                    tick.done();
                }
            }
        }

        timer.stop();
        self.halted_tx.lock().take();
        info!(queued = self.len(), "delay filter loop exited");
    }

    /// Run the scheduling loop on a dedicated thread.
    pub fn spawn(self: &Arc<Self>, cancel: Receiver<()>) -> io::Result<JoinHandle<()>> {
        let filter = Arc::clone(self);
        thread::Builder::new()
            .name("delay-filter".into())
            .spawn(move || filter.run(cancel))
    }

    fn reschedule(&self, timer: &dyn Timer) {
        let next = self.queue.lock().next_deadline();
        let wait = match next {
            Some(deadline) => self.time.until(deadline),
            None => self.idle_poll,
        };
        timer.reset(wait);
    }

    /// Forward every chunk due at `now`. Returns how many were forwarded.
    fn release_due(&self, now: SystemTime) -> usize {
        let mut released = 0;
        loop {
            // Not held while forwarding.
            let due = self.queue.lock().pop_due(now);
            let Some((chunk, deadline)) = due else {
                break;
            };
            let bytes = chunk.len();
            debug!(?deadline, bytes, "forwarding delayed chunk");
            if let Some(metrics) = &self.metrics {
                metrics.record_forwarded(bytes);
            }
            self.downstream.forward(chunk);
            released += 1;
        }
        if let Some(metrics) = &self.metrics {
            metrics.set_queued(self.len());
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Instant, UNIX_EPOCH};
    use tidvakt_config::TelemetryConfig;
    use tidvakt_core::time::{RealClock, Simulator};
    use tidvakt_telemetry::MetricsRecorder;

    struct Tagged(usize);

    impl Chunk for Tagged {
        fn len(&self) -> usize {
            100
        }

        fn user_data(&self) -> &[u8] {
            &[]
        }
    }

    type Log = Arc<Mutex<Vec<(usize, SystemTime)>>>;

    /// Downstream that records each chunk with the clock's now.
    fn recording(time: Arc<dyn TimeManager>) -> (Arc<dyn Forward<Tagged>>, Log) {
        let log: Log = Arc::default();
        let sink = {
            let log = Arc::clone(&log);
            move |chunk: Tagged| log.lock().push((chunk.0, time.now()))
        };
        (Arc::new(sink), log)
    }

    fn simulated() -> (Simulator, Arc<dyn TimeManager>) {
        let sim = Simulator::new(UNIX_EPOCH);
        sim.start().unwrap();
        let time: Arc<dyn TimeManager> = Arc::new(sim.clone());
        (sim, time)
    }

    #[test]
    fn rejects_invalid_config() {
        let config = DelayFilterConfig {
            idle_poll_ms: 0,
            ..DelayFilterConfig::default()
        };
        let sink: Arc<dyn Forward<Tagged>> = Arc::new(|_: Tagged| {});
        let result = DelayFilter::new(&config, sink, Arc::new(RealClock));
        assert!(matches!(result, Err(FilterError::InvalidConfig(_))));
    }

    #[test]
    fn forwards_each_chunk_after_delay_in_order() {
        let (sim, time) = simulated();
        let (sink, log) = recording(Arc::clone(&time));
        let config = DelayFilterConfig::with_delay(Duration::from_millis(10));
        let filter = Arc::new(DelayFilter::new(&config, sink, Arc::clone(&time)).unwrap());
        let (cancel_tx, cancel_rx) = channel::bounded(0);
        let worker = filter.spawn(cancel_rx).unwrap();

        // Inject from a 1 ms ticker so injections are exactly 1 ms apart.
        let ticker = time.new_ticker(Duration::from_millis(1), Delivery::Blocking);
        let mut injected = Vec::new();
        for idx in 0..100 {
            let tick = ticker.receiver().recv().unwrap();
            injected.push(tick.time());
            filter.on_inbound_chunk(Tagged(idx));
            if idx == 99 {
                ticker.stop();
            }
            tick.done();
        }
        sim.sleep(Duration::from_millis(20));

        for pair in injected.windows(2) {
            assert_eq!(pair[1].duration_since(pair[0]).unwrap(), Duration::from_millis(1));
        }
        let log = log.lock().clone();
        assert_eq!(log.len(), 100);
        for (position, &(idx, forwarded_at)) in log.iter().enumerate() {
            assert_eq!(idx, position, "forwarded out of order");
            assert_eq!(forwarded_at, injected[idx] + filter.delay());
        }
        assert!(filter.is_empty());

        drop(cancel_tx);
        worker.join().unwrap();
        sim.stop();
    }

    #[test]
    fn chunk_pushed_under_freeze_is_released_at_its_own_deadline() {
        let sim = Simulator::new(UNIX_EPOCH);
        let time: Arc<dyn TimeManager> = Arc::new(sim.clone());
        let (tx, rx) = channel::unbounded();
        let sink: Arc<dyn Forward<Tagged>> = {
            let time = Arc::clone(&time);
            Arc::new(move |chunk: Tagged| {
                let _ = tx.send((chunk.0, time.now()));
            })
        };
        let config = DelayFilterConfig::with_delay(Duration::from_millis(10));
        let filter = Arc::new(DelayFilter::new(&config, sink, Arc::clone(&time)).unwrap());
        let (cancel_tx, cancel_rx) = channel::bounded(0);
        let worker = filter.spawn(cancel_rx).unwrap();
        while sim.pending() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        // The event loop pulls the idle timer's event and waits on the freeze.
        let frozen = sim.freeze_now();
        sim.start().unwrap();
        while sim.pending() != 0 {
            thread::sleep(Duration::from_millis(1));
        }
        filter.on_inbound_chunk(Tagged(7));
        frozen.done();

        let (idx, forwarded_at) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(idx, 7);
        assert_eq!(forwarded_at, UNIX_EPOCH + filter.delay());
        assert!(filter.is_empty());

        drop(cancel_tx);
        worker.join().unwrap();
        sim.stop();
    }

    #[test]
    fn idle_filter_leaves_virtual_time_alone() {
        let (sim, time) = simulated();
        let (sink, _log) = recording(Arc::clone(&time));
        let config = DelayFilterConfig::with_delay(Duration::from_millis(10));
        let filter = Arc::new(DelayFilter::new(&config, sink, Arc::clone(&time)).unwrap());
        let (cancel_tx, cancel_rx) = channel::bounded(0);
        let worker = filter.spawn(cancel_rx).unwrap();

        let start = sim.now();
        let mut woke = vec![start];
        for _ in 0..100 {
            woke.push(sim.sleep(Duration::from_millis(1)));
        }

        // At most one step absorbs the single idle poll.
        let uneven = woke
            .windows(2)
            .filter(|pair| pair[1].duration_since(pair[0]).unwrap_or_default() != Duration::from_millis(1))
            .count();
        assert!(uneven <= 1, "{uneven} uneven steps");
        assert!(sim.since(start) <= config.idle_poll() + Duration::from_millis(100));

        drop(cancel_tx);
        worker.join().unwrap();
        sim.stop();
    }

    #[test]
    fn burst_of_chunks_keeps_fifo_order() {
        let (sim, time) = simulated();
        let (sink, log) = recording(Arc::clone(&time));
        let config = DelayFilterConfig::with_delay(Duration::from_millis(5));
        let filter = Arc::new(DelayFilter::new(&config, sink, Arc::clone(&time)).unwrap());
        let (cancel_tx, cancel_rx) = channel::bounded(0);
        let worker = filter.spawn(cancel_rx).unwrap();

        for idx in 0..10 {
            filter.on_inbound_chunk(Tagged(idx));
        }
        sim.sleep(Duration::from_millis(10));

        let order: Vec<_> = log.lock().iter().map(|&(idx, _)| idx).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());

        drop(cancel_tx);
        worker.join().unwrap();
        sim.stop();
    }

    #[test]
    fn cancelled_loop_leaves_chunks_queued() {
        let time: Arc<dyn TimeManager> = Arc::new(RealClock);
        let (sink, log) = recording(Arc::clone(&time));
        let config = DelayFilterConfig::with_delay(Duration::from_millis(1));
        let filter = Arc::new(DelayFilter::new(&config, sink, time).unwrap());
        let (cancel_tx, cancel_rx) = channel::bounded(0);
        let worker = filter.spawn(cancel_rx).unwrap();

        cancel_tx.send(()).unwrap();
        worker.join().unwrap();

        filter.on_inbound_chunk(Tagged(0));
        assert_eq!(filter.len(), 1);
        thread::sleep(Duration::from_millis(10));
        assert!(log.lock().is_empty());
    }

    #[test]
    fn real_clock_delays_delivery() {
        let delay = Duration::from_millis(20);
        let (tx, rx) = channel::unbounded();
        let sink: Arc<dyn Forward<Tagged>> = Arc::new(move |chunk: Tagged| {
            let _ = tx.send((chunk.0, Instant::now()));
        });
        let recorder = MetricsRecorder::new();
        let telemetry = TelemetryConfig {
            metrics_namespace: "test".into(),
            ..TelemetryConfig::default()
        };
        let metrics = FilterMetrics::from_config(&telemetry, "delay").unwrap();
        recorder.register(&metrics).unwrap();
        let filter = Arc::new(
            DelayFilter::new(&DelayFilterConfig::with_delay(delay), sink, Arc::new(RealClock))
                .unwrap()
                .with_metrics(metrics),
        );
        let (cancel_tx, cancel_rx) = channel::bounded(0);
        let worker = filter.spawn(cancel_rx).unwrap();

        let started = Instant::now();
        for idx in 0..5 {
            filter.on_inbound_chunk(Tagged(idx));
        }
        for expected in 0..5 {
            let (idx, at) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(idx, expected);
            assert!(at.duration_since(started) >= delay);
        }

        let text = recorder.gather_metrics().unwrap();
        assert!(text.contains("test_delay_forwarded_chunks_total 5"));
        assert!(text.contains("test_delay_forwarded_bytes_total 500"));

        drop(cancel_tx);
        worker.join().unwrap();
    }
}
