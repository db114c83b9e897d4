//! Token bucket filter.
//!
//! Tokens are bits. They accrue continuously at `rate` bits per second up to
//! `max_burst`. A chunk is forwarded once the bucket holds at least its size;
//! otherwise the caller waits on a timer for exactly the deficit to refill.
//! Callers are admitted one at a time, so chunks leave in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use parking_lot::Mutex;
use tidvakt_config::TokenBucketConfig;
use tidvakt_core::time::{Delivery, TimeManager};
use tidvakt_telemetry::FilterMetrics;
use tracing::{debug, info, trace};
use validator::Validate;

use crate::chunk::{Chunk, Forward};
use crate::error::FilterError;

pub use tidvakt_config::{KBIT, MBIT};

struct BucketState {
    tokens: f64,
    last_refill: SystemTime,
}

pub struct TokenBucketFilter<C: Chunk> {
    rate: u64,
    max_burst: u64,
    state: Mutex<BucketState>,
    /// Held by the caller being served, including while it waits.
    admission: Mutex<()>,
    downstream: Arc<dyn Forward<C>>,
    time: Arc<dyn TimeManager>,
    closed: AtomicBool,
    close_tx: Mutex<Option<Sender<()>>>,
    close_rx: Receiver<()>,
    metrics: Option<FilterMetrics>,
}

impl<C: Chunk> TokenBucketFilter<C> {
    pub fn new(
        config: &TokenBucketConfig,
        downstream: Arc<dyn Forward<C>>,
        time: Arc<dyn TimeManager>,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let tokens = if config.start_full {
            config.max_burst_bits as f64
        } else {
            0.0
        };
        let (close_tx, close_rx) = channel::bounded(0);
        Ok(Self {
            rate: config.rate_bps,
            max_burst: config.max_burst_bits,
            state: Mutex::new(BucketState {
                tokens,
                last_refill: time.now(),
            }),
            admission: Mutex::new(()),
            downstream,
            time,
            closed: AtomicBool::new(false),
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: FilterMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Capacity rate in bits per second.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Burst ceiling in bits.
    pub fn max_burst(&self) -> u64 {
        self.max_burst
    }

    /// Tokens available right now, in whole bits.
    pub fn tokens(&self) -> u64 {
        let mut state = self.state.lock();
        self.refill(&mut state, self.time.now());
        state.tokens as u64
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reject further chunks and release any caller waiting for tokens.
    /// Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let was_open = !self.closed.swap(true, Ordering::AcqRel);
        if was_open {
            self.close_tx.lock().take();
            info!("token bucket filter closed");
        }
        was_open
    }

    /// Forward `chunk` once the bucket holds enough tokens for it.
    ///
    /// Blocks while earlier callers are served and while tokens refill. A
    /// chunk larger than the burst ceiling drains the bucket to zero.
    pub fn on_inbound_chunk(&self, chunk: C) -> Result<(), FilterError> {
        let _admitted = self.admission.lock();
        if self.is_closed() {
            return Err(self.reject());
        }

        let bits = chunk.bits() as f64;
        let deficit = {
            let mut state = self.state.lock();
            self.refill(&mut state, self.time.now());
            if state.tokens >= bits {
                state.tokens -= bits;
                0.0
            } else {
                bits - state.tokens
            }
        };

        if deficit == 0.0 {
            self.forward(chunk);
            return Ok(());
        }

        let wait = Duration::from_nanos((deficit * 1e9 / self.rate as f64).ceil() as u64);
        trace!(?wait, deficit, "waiting for tokens");
        let timer = self.time.new_timer(wait, Delivery::Blocking);
        select! {
            recv(timer.receiver()) -> tick => {
                let Ok(tick) = tick else {
                    return Err(self.reject());
                };
                // Both arms may be ready at once; a close always wins.
                if self.is_closed() {
                    tick.done();
                    return Err(self.reject());
                }
                {
                    let mut state = self.state.lock();
                    self.refill(&mut state, tick.time());
                    state.tokens = (state.tokens - bits).max(0.0);
                }
                self.forward(chunk);
                tick.done();
                Ok(())
            }
            recv(self.close_rx) -> _ => {
                timer.stop();
                Err(self.reject())
            }
        }
    }

    fn refill(&self, state: &mut BucketState, now: SystemTime) {
        let elapsed = now.duration_since(state.last_refill).unwrap_or_default();
        let accrued = self.rate as f64 * elapsed.as_secs_f64();
        state.tokens = (state.tokens + accrued).min(self.max_burst as f64);
        state.last_refill = state.last_refill.max(now);
    }

    fn forward(&self, chunk: C) {
        let bytes = chunk.len();
        debug!(bytes, "forwarding chunk");
        if let Some(metrics) = &self.metrics {
            metrics.record_forwarded(bytes);
        }
        self.downstream.forward(chunk);
    }

    fn reject(&self) -> FilterError {
        debug!("chunk rejected, filter closed");
        if let Some(metrics) = &self.metrics {
            metrics.record_dropped();
        }
        FilterError::Closed
    }
}
