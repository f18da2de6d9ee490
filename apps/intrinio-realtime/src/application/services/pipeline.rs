//! Ingestion Pipeline
//!
//! Decouples socket I/O from user callbacks: the transport side pushes raw
//! frames into a bounded queue without blocking, and a fixed pool of worker
//! threads decodes them and invokes the callbacks.
//!
//! # Ordering
//!
//! Records within a frame are dispatched in wire order, and frames handled by
//! the same worker keep their enqueue order. There is no ordering across
//! workers.
//!
//! # Drops
//!
//! A full queue drops the new frame. `push` only counts the drop; the next
//! worker to come free reports the count to the error handler, so a slow
//! handler never runs on the task reading the socket.
//!
//! # Shutdown
//!
//! [`IngestionPipeline::shutdown`] raises the stop flag and waits a bounded
//! wall-clock time for each worker. Workers poll the queue with a short
//! timeout so they notice the flag; one stuck in a callback past the deadline
//! is detached.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{FrameCodec, RawFrame};
use crate::domain::streaming::DomainEvent;
use crate::infrastructure::metrics::{self, EventType};

use super::callbacks::{FeedError, Handlers, panic_message};

/// How long a worker waits on the queue before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often shutdown checks whether a worker has exited.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

// =============================================================================
// Settings
// =============================================================================

/// Worker pool and queue sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Frames the queue holds before new frames are dropped.
    pub queue_capacity: usize,
    /// How long shutdown waits for each worker.
    pub shutdown_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 10_000,
            shutdown_timeout: Duration::from_secs(7),
        }
    }
}

/// Pipeline start-up errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

// =============================================================================
// Pipeline
// =============================================================================

/// Bounded frame queue plus worker pool.
#[derive(Debug)]
pub struct IngestionPipeline {
    sender: Sender<RawFrame>,
    workers: Vec<JoinHandle<()>>,
    stop: CancellationToken,
    dropped: Arc<AtomicU64>,
    shutdown_timeout: Duration,
}

impl IngestionPipeline {
    /// Start the worker pool.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned; workers
    /// already started are stopped.
    pub fn start(
        settings: &PipelineSettings,
        codec: Arc<dyn FrameCodec>,
        handlers: Arc<Handlers>,
    ) -> Result<Self, PipelineError> {
        let (sender, receiver) = crossbeam_channel::bounded(settings.queue_capacity);
        let stop = CancellationToken::new();
        let dropped = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(settings.worker_count);

        for id in 0..settings.worker_count {
            let worker = Worker {
                id,
                receiver: receiver.clone(),
                codec: codec.clone(),
                handlers: handlers.clone(),
                stop: stop.clone(),
                dropped: dropped.clone(),
            };
            let spawned = std::thread::Builder::new()
                .name(format!("intrinio-worker-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    stop.cancel();
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            workers = settings.worker_count,
            queue_capacity = settings.queue_capacity,
            "Ingestion pipeline started"
        );

        Ok(Self {
            sender,
            workers,
            stop,
            dropped,
            shutdown_timeout: settings.shutdown_timeout,
        })
    }

    /// Enqueue a frame without blocking.
    ///
    /// Returns `false` if the frame was dropped because the queue is full or
    /// the pipeline is stopping. A drop is reported to the error handler
    /// later, from a worker thread.
    pub fn push(&self, frame: RawFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(frame)) => {
                tracing::warn!(bytes = frame.len(), "Ingestion queue full, dropping frame");
                metrics::record_frame_dropped();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Pipeline stopped, discarding frame");
                false
            }
        }
    }

    /// Frames waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.sender.len()
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop the workers, waiting up to the shutdown timeout for each.
    ///
    /// Returns the number of workers that had to be detached.
    pub async fn shutdown(self) -> usize {
        let Self {
            sender,
            workers,
            stop,
            shutdown_timeout,
            ..
        } = self;

        stop.cancel();
        drop(sender);

        let mut detached = 0;
        for (id, handle) in workers.into_iter().enumerate() {
            let deadline = Instant::now() + shutdown_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                tokio::time::sleep(JOIN_POLL_INTERVAL).await;
            }

            if !handle.is_finished() {
                detached += 1;
                tracing::warn!(
                    worker = id,
                    timeout_ms = shutdown_timeout.as_millis(),
                    "Worker did not stop in time, detaching"
                );
                continue;
            }

            match handle.join() {
                Ok(()) => tracing::debug!(worker = id, "Worker stopped"),
                Err(_) => tracing::warn!(worker = id, "Worker exited by panic"),
            }
        }

        tracing::info!(detached, "Ingestion pipeline stopped");
        detached
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    id: usize,
    receiver: Receiver<RawFrame>,
    codec: Arc<dyn FrameCodec>,
    handlers: Arc<Handlers>,
    stop: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl Worker {
    fn run(self) {
        tracing::debug!(worker = self.id, "Worker started");

        while !self.stop.is_cancelled() {
            match self.receiver.recv_timeout(POLL_INTERVAL) {
                Ok(frame) => self.process(&frame),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.report_drops();
        }

        tracing::debug!(worker = self.id, "Worker exiting");
    }

    fn report_drops(&self) {
        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            self.handlers.report(&FeedError::QueueFull { dropped });
        }
    }

    fn process(&self, frame: &RawFrame) {
        let started = Instant::now();

        let events = match self.codec.decode(frame.as_bytes()) {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(
                    worker = self.id,
                    error = %e,
                    bytes = frame.len(),
                    "Discarding undecodable frame"
                );
                metrics::record_decode_error();
                self.handlers.report(&FeedError::Decode(e));
                return;
            }
        };

        for event in events {
            self.dispatch(event);
        }

        metrics::record_processing_duration(started.elapsed());
    }

    fn dispatch(&self, event: DomainEvent) {
        match event {
            DomainEvent::Trade(trade) => {
                if let Some(callback) = self.handlers.trade() {
                    self.invoke(EventType::Trade, || callback(trade));
                }
            }
            DomainEvent::Quote(quote) => {
                if let Some(callback) = self.handlers.quote() {
                    self.invoke(EventType::Quote, || callback(quote));
                }
            }
            DomainEvent::ControlAck { topic, status } => {
                tracing::debug!(topic = %topic, status = %status, "Control acknowledged");
            }
            DomainEvent::Unknown { kind } => {
                tracing::trace!(kind = %kind, "Ignoring unknown event");
            }
        }
    }

    fn invoke(&self, event_type: EventType, call: impl FnOnce()) {
        metrics::record_event_dispatched(event_type);

        if let Err(payload) = catch_unwind(AssertUnwindSafe(call)) {
            let message = panic_message(payload.as_ref());
            let callback = match event_type {
                EventType::Trade => "trade",
                EventType::Quote => "quote",
            };
            tracing::error!(
                worker = self.id,
                callback,
                message = %message,
                "Callback panicked"
            );
            metrics::record_callback_panic(event_type);
            self.handlers
                .report(&FeedError::CallbackPanic { callback, message });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    use parking_lot::Mutex;

    use crate::application::ports::DecodeError;
    use crate::domain::streaming::Trade;

    /// Each byte becomes a trade with that size; `0xFF` fails the frame.
    #[derive(Debug)]
    struct ByteCodec;

    impl FrameCodec for ByteCodec {
        fn decode(&self, frame: &[u8]) -> Result<Vec<DomainEvent>, DecodeError> {
            if frame.contains(&0xFF) {
                return Err(DecodeError::EmptyFrame);
            }
            Ok(frame
                .iter()
                .map(|&b| {
                    DomainEvent::Trade(Trade {
                        symbol: "T".to_string(),
                        price: 1.0,
                        size: u32::from(b),
                        timestamp: 0,
                        total_volume: 0,
                        subprovider: None,
                        market_center: None,
                        condition: None,
                    })
                })
                .collect())
        }
    }

    fn settings(workers: usize, capacity: usize) -> PipelineSettings {
        PipelineSettings {
            worker_count: workers,
            queue_capacity: capacity,
            shutdown_timeout: Duration::from_secs(2),
        }
    }

    fn recv_sizes(rx: &mpsc::Receiver<u32>, n: usize) -> Vec<u32> {
        (0..n)
            .map(|_| rx.recv_timeout(Duration::from_secs(2)).unwrap())
            .collect()
    }

    #[test]
    fn default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.worker_count, 4);
        assert_eq!(settings.queue_capacity, 10_000);
        assert_eq!(settings.shutdown_timeout, Duration::from_secs(7));
    }

    #[tokio::test]
    async fn dispatches_records_in_order() {
        let handlers = Arc::new(Handlers::default());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        handlers.set_trade(Arc::new(move |trade| {
            tx.lock().send(trade.size).unwrap();
        }));

        let pipeline =
            IngestionPipeline::start(&settings(1, 16), Arc::new(ByteCodec), handlers).unwrap();
        assert!(pipeline.push(RawFrame::from(vec![1, 2, 3])));
        assert!(pipeline.push(RawFrame::from(vec![4])));

        assert_eq!(recv_sizes(&rx, 4), vec![1, 2, 3, 4]);
        assert_eq!(pipeline.shutdown().await, 0);
    }

    #[tokio::test]
    async fn panicking_callback_does_not_stop_next_event() {
        let handlers = Arc::new(Handlers::default());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        handlers.set_trade(Arc::new(move |trade| {
            assert!(trade.size != 2, "callback failure on event 2");
            tx.lock().send(trade.size).unwrap();
        }));

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        handlers.set_error(Arc::new(move |err| sink.lock().push(err.to_string())));

        let pipeline =
            IngestionPipeline::start(&settings(1, 16), Arc::new(ByteCodec), handlers).unwrap();
        pipeline.push(RawFrame::from(vec![1, 2, 3]));
        pipeline.push(RawFrame::from(vec![4]));

        assert_eq!(recv_sizes(&rx, 3), vec![1, 3, 4]);
        pipeline.shutdown().await;

        let reported = reported.lock();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].starts_with("trade callback panicked"));
    }

    #[tokio::test]
    async fn undecodable_frame_is_skipped() {
        let handlers = Arc::new(Handlers::default());
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        handlers.set_trade(Arc::new(move |trade| {
            tx.lock().send(trade.size).unwrap();
        }));
        let errors = Arc::new(Mutex::new(0usize));
        let count = errors.clone();
        handlers.set_error(Arc::new(move |err| {
            if matches!(err, FeedError::Decode(_)) {
                *count.lock() += 1;
            }
        }));

        let pipeline =
            IngestionPipeline::start(&settings(1, 16), Arc::new(ByteCodec), handlers).unwrap();
        pipeline.push(RawFrame::from(vec![1, 0xFF]));
        pipeline.push(RawFrame::from(vec![7]));

        assert_eq!(recv_sizes(&rx, 1), vec![7]);
        pipeline.shutdown().await;
        assert_eq!(*errors.lock(), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_new_frames() {
        let handlers = Arc::new(Handlers::default());
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let gate_rx = Mutex::new(gate_rx);
        handlers.set_trade(Arc::new(move |_| {
            started_tx.lock().send(()).unwrap();
            gate_rx.lock().recv().unwrap();
        }));

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        handlers.set_error(Arc::new(move |err| {
            let thread = std::thread::current().name().map(str::to_string);
            sink.lock().push((thread, err.to_string()));
        }));

        let pipeline =
            IngestionPipeline::start(&settings(1, 1), Arc::new(ByteCodec), handlers).unwrap();
        assert!(pipeline.push(RawFrame::from(vec![1])));
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        assert!(pipeline.push(RawFrame::from(vec![2])));
        assert!(!pipeline.push(RawFrame::from(vec![3])));
        assert!(!pipeline.push(RawFrame::from(vec![4])));
        assert_eq!(pipeline.queued(), 1);
        assert!(reported.lock().is_empty());

        gate_tx.send(()).unwrap();
        gate_tx.send(()).unwrap();
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(pipeline.shutdown().await, 0);

        assert_eq!(
            *reported.lock(),
            vec![(
                Some("intrinio-worker-0".to_string()),
                "2 frame(s) dropped: ingestion queue full".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn shutdown_detaches_stuck_worker() {
        let handlers = Arc::new(Handlers::default());
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Mutex::new(started_tx);
        handlers.set_trade(Arc::new(move |_| {
            started_tx.lock().send(()).unwrap();
            std::thread::sleep(Duration::from_secs(3));
        }));

        let settings = PipelineSettings {
            worker_count: 1,
            queue_capacity: 4,
            shutdown_timeout: Duration::from_millis(100),
        };
        let pipeline = IngestionPipeline::start(&settings, Arc::new(ByteCodec), handlers).unwrap();
        pipeline.push(RawFrame::from(vec![1]));
        started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

        let began = Instant::now();
        assert_eq!(pipeline.shutdown().await, 1);
        assert!(began.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn idle_workers_stop_promptly() {
        let pipeline = IngestionPipeline::start(
            &settings(4, 8),
            Arc::new(ByteCodec),
            Arc::new(Handlers::default()),
        )
        .unwrap();
        assert_eq!(pipeline.worker_count(), 4);

        let began = Instant::now();
        assert_eq!(pipeline.shutdown().await, 0);
        assert!(began.elapsed() < Duration::from_secs(1));
    }
}
