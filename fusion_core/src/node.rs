//! Threaded runtime around one [`FusionPipeline`].
//!
//! Range and detection producers run on their own threads and hand raw
//! inputs to cloneable intake handles. Every event lands in one bounded
//! queue drained by a single owner thread, which is the only code that
//! touches the pipeline. A ticker thread feeds publish ticks through the same
//! queue, so a `predict` for publishing never interleaves with an update.
//!
//! Submitting never blocks: a full queue drops the input and counts it.

use crate::{
    config::FusionConfig,
    error::{FusionError, Result},
    pipeline::{FusionPipeline, FusionStats},
    publisher::{EstimateSink, FusedEstimate},
    types::{PixelBox, RawInput, Timestamp},
};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

/// Upper bound on how long the worker threads go without checking for shutdown.
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Events serialized through the owner queue.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeEvent {
    Input(RawInput),
    Tick(Timestamp),
}

/// Monotonic node clock: seconds since the node started.
#[derive(Clone, Copy, Debug)]
pub struct NodeClock {
    origin: Instant,
}

impl NodeClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        self.at(Instant::now())
    }

    pub fn at(&self, instant: Instant) -> Timestamp {
        instant.saturating_duration_since(self.origin).as_secs_f64()
    }
}

#[derive(Debug, Default)]
struct Shared {
    shutdown: AtomicBool,
    dropped: AtomicU64,
}

impl Shared {
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[derive(Clone, Debug)]
struct Intake {
    tx: Sender<NodeEvent>,
    clock: NodeClock,
    shared: Arc<Shared>,
}

impl Intake {
    /// `Ok(false)` when the queue was full and the input was dropped.
    fn submit(&self, raw: RawInput) -> Result<bool> {
        if self.shared.is_shutdown_requested() {
            return Err(FusionError::Shutdown);
        }
        let source = raw.source();
        match self.tx.try_send(NodeEvent::Input(raw)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(%source, dropped, "intake queue full, dropping input");
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(FusionError::Shutdown),
        }
    }
}

/// Handle for the serial-bridge side.
#[derive(Clone, Debug)]
pub struct RangeIntake(Intake);

impl RangeIntake {
    pub fn submit(&self, distance: f64, stamp: Timestamp) -> Result<bool> {
        self.0.submit(RawInput::Range { distance, stamp })
    }

    /// Stamp with the node clock at arrival.
    pub fn submit_now(&self, distance: f64) -> Result<bool> {
        self.submit(distance, self.0.clock.now())
    }
}

/// Handle for the vision-detector side.
#[derive(Clone, Debug)]
pub struct DetectionIntake(Intake);

impl DetectionIntake {
    pub fn submit(&self, pixel_box: PixelBox, confidence: f64, stamp: Timestamp) -> Result<bool> {
        self.0.submit(RawInput::Detection {
            pixel_box,
            confidence,
            stamp,
        })
    }

    pub fn submit_now(&self, pixel_box: PixelBox, confidence: f64) -> Result<bool> {
        self.submit(pixel_box, confidence, self.0.clock.now())
    }

    /// The detector processed a frame and found nothing.
    pub fn no_detection(&self, stamp: Timestamp) -> Result<bool> {
        self.0.submit(RawInput::NoDetection { stamp })
    }

    pub fn no_detection_now(&self) -> Result<bool> {
        self.no_detection(self.0.clock.now())
    }
}

/// A running fusion node: owner thread + ticker thread.
pub struct FusionNode {
    intake: Intake,
    ticker: Option<JoinHandle<()>>,
    owner: Option<JoinHandle<FusionStats>>,
}

impl FusionNode {
    /// Validate `config`, then start the owner and ticker threads.
    pub fn spawn<S>(config: FusionConfig, sink: S) -> Result<Self>
    where
        S: EstimateSink + Send + 'static,
    {
        let pipeline = FusionPipeline::new(config.clone(), sink)?;
        let period = Duration::try_from_secs_f64(config.publisher.period())
            .map_err(|e| FusionError::InvalidConfig(format!("publisher.rate_hz: {e}")))?;
        let (tx, rx) = bounded(config.node.queue_capacity);
        let clock = NodeClock::start();
        let shared = Arc::new(Shared::default());

        let owner = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || run_owner(pipeline, rx, shared))
        };
        let ticker = {
            let tx = tx.clone();
            let shared = Arc::clone(&shared);
            thread::spawn(move || run_ticker(tx, clock, period, shared))
        };

        info!(
            rate_hz = config.publisher.rate_hz,
            queue_capacity = config.node.queue_capacity,
            "fusion node started"
        );
        Ok(Self {
            intake: Intake { tx, clock, shared },
            ticker: Some(ticker),
            owner: Some(owner),
        })
    }

    /// Start a node publishing into a bounded channel of
    /// `node.output_capacity` estimates. A slow consumer misses estimates
    /// instead of stalling the owner thread.
    pub fn spawn_with_output(config: FusionConfig) -> Result<(Self, Receiver<FusedEstimate>)> {
        let (tx, rx) = bounded(config.node.output_capacity);
        let node = Self::spawn(config, tx)?;
        Ok((node, rx))
    }

    pub fn range_intake(&self) -> RangeIntake {
        RangeIntake(self.intake.clone())
    }

    pub fn detection_intake(&self) -> DetectionIntake {
        DetectionIntake(self.intake.clone())
    }

    pub fn clock(&self) -> NodeClock {
        self.intake.clock
    }

    /// Inputs dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.intake.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop the ticker, let the owner drain what is queued, and return the
    /// final counters.
    pub fn shutdown(mut self) -> FusionStats {
        self.stop().unwrap_or_default()
    }

    fn stop(&mut self) -> Option<FusionStats> {
        self.intake.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.ticker.take() {
            let _ = handle.join();
        }
        let handle = self.owner.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(_) => {
                warn!("fusion owner thread panicked");
                None
            }
        }
    }
}

impl Drop for FusionNode {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_owner<S: EstimateSink>(
    mut pipeline: FusionPipeline<S>,
    rx: Receiver<NodeEvent>,
    shared: Arc<Shared>,
) -> FusionStats {
    loop {
        if shared.is_shutdown_requested() {
            break;
        }
        match rx.recv_timeout(RECV_TIMEOUT) {
            Ok(event) => apply(&mut pipeline, event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // Whatever was accepted before shutdown is still processed.
    for event in rx.try_iter() {
        apply(&mut pipeline, event);
    }
    pipeline.note_dropped(shared.dropped.load(Ordering::Relaxed));

    let stats = pipeline.stats().clone();
    info!(?stats, "fusion node stopped");
    stats
}

fn apply<S: EstimateSink>(pipeline: &mut FusionPipeline<S>, event: NodeEvent) {
    match event {
        NodeEvent::Input(raw) => {
            // Errors are counted and logged by the pipeline.
            let _ = pipeline.handle_input(raw);
        }
        NodeEvent::Tick(now) => {
            pipeline.tick(now);
        }
    }
}

fn run_ticker(tx: Sender<NodeEvent>, clock: NodeClock, period: Duration, shared: Arc<Shared>) {
    let ticks = crossbeam_channel::tick(period);
    loop {
        if shared.is_shutdown_requested() {
            break;
        }
        match ticks.recv_timeout(RECV_TIMEOUT) {
            Ok(at) => match tx.try_send(NodeEvent::Tick(clock.at(at))) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("owner busy, skipping publish tick"),
                Err(TrySendError::Disconnected(_)) => break,
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
