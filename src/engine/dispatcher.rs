// src/engine/dispatcher.rs
//
// Request dispatcher: validates submissions, picks the execution context and
// delivers exactly one result per accepted request.
//
// Requests are queued FIFO. In worker mode they run on the dispatcher's own
// single-threaded pool; in inline mode they run inside `submit` on the
// caller's thread. Either way a run gate keeps at most one request Running.

use crate::config::{DispatcherConfig, ExecutionMode};
use crate::engine::common::panic_message;
use crate::engine::guard::RequestGuard;
use crate::engine::pool::build_worker_pool;
use crate::engine::tasks::CompressTask;
use crate::error::CompressionError;
use crate::ops::CompressionRequest;
use crate::CompressionResult;
use parking_lot::Mutex;
use rayon::ThreadPool;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{sync_channel, Receiver, TryRecvError};
use std::sync::Arc;

/// Observable lifecycle of a dispatcher.
///
/// Completed and Failed are not stored: they are reported through the
/// delivered result and the dispatcher drops straight back to `Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherState {
    Idle,
    /// At least one accepted request is waiting for the worker
    Submitted,
    Running,
}

#[derive(Debug, Default)]
struct Lifecycle {
    queued: usize,
    running: bool,
}

#[derive(Debug, Default)]
struct Shared {
    /// Held for the whole pipeline run.
    gate: Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    fn state(&self) -> DispatcherState {
        let lc = self.lifecycle.lock();
        if lc.running {
            DispatcherState::Running
        } else if lc.queued > 0 {
            DispatcherState::Submitted
        } else {
            DispatcherState::Idle
        }
    }

    fn enqueue(&self) {
        self.lifecycle.lock().queued += 1;
    }

    fn begin_running(&self) {
        let mut lc = self.lifecycle.lock();
        lc.queued = lc.queued.saturating_sub(1);
        lc.running = true;
    }

    fn finish_running(&self) {
        self.lifecycle.lock().running = false;
    }

    /// Run one job under the gate. Panics become `WorkerCrashed`.
    fn execute<F>(&self, sequence: u64, mode: ExecutionMode, job: F) -> CompressionResult
    where
        F: FnOnce() -> CompressionResult,
    {
        let _gate = self.gate.lock();
        self.run_locked(sequence, mode, job)
    }

    /// Caller must hold `gate`.
    fn run_locked<F>(&self, sequence: u64, mode: ExecutionMode, job: F) -> CompressionResult
    where
        F: FnOnce() -> CompressionResult,
    {
        self.begin_running();
        let result = match catch_unwind(AssertUnwindSafe(job)) {
            Ok(result) => result,
            Err(payload) => Err(CompressionError::worker_crashed(panic_message(
                payload.as_ref(),
            ))),
        };
        self.finish_running();
        log_outcome(sequence, mode, &result);
        result
    }
}

fn log_outcome(sequence: u64, mode: ExecutionMode, result: &CompressionResult) {
    match result {
        Ok(image) => tracing::info!(
            sequence,
            mode = mode.as_str(),
            width = image.width,
            height = image.height,
            bytes_in = image.metrics.bytes_in,
            bytes_out = image.metrics.bytes_out,
            ratio = image.metrics.compression_ratio,
            total_ms = image.metrics.total_ms,
            "compression completed"
        ),
        Err(err) => tracing::warn!(
            sequence,
            mode = mode.as_str(),
            code = err.category().code(),
            reason = %err,
            "compression failed"
        ),
    }
}

/// Handle to one accepted request. Resolves exactly once.
#[derive(Debug)]
pub struct CompressionTicket {
    sequence: u64,
    receiver: Option<Receiver<CompressionResult>>,
}

impl CompressionTicket {
    /// Submission order, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Block until the result arrives.
    pub fn wait(mut self) -> CompressionResult {
        match self.receiver.take() {
            Some(rx) => rx.recv().unwrap_or_else(|_| Err(worker_gone())),
            None => Err(already_taken()),
        }
    }

    /// Poll without blocking. Returns `Some` once, then `None` forever.
    pub fn try_result(&mut self) -> Option<CompressionResult> {
        let rx = self.receiver.as_ref()?;
        let outcome = match rx.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(worker_gone()),
        };
        self.receiver = None;
        Some(outcome)
    }
}

fn worker_gone() -> CompressionError {
    CompressionError::worker_unavailable("worker exited without delivering a result")
}

fn already_taken() -> CompressionError {
    CompressionError::worker_unavailable("result was already taken from this ticket")
}

/// Owns the execution context for compression requests.
///
/// Construct one per owner and share it by `Arc`; the worker thread lives
/// exactly as long as the dispatcher.
pub struct Dispatcher {
    guard: RequestGuard,
    mode: ExecutionMode,
    pool: Option<Arc<ThreadPool>>,
    shared: Arc<Shared>,
    /// Last assigned sequence. Held while a request is queued so numbering
    /// and run order agree.
    next_sequence: Mutex<u64>,
}

impl Dispatcher {
    /// Build a dispatcher. A `Worker` config that cannot spawn its thread
    /// degrades to `Inline`; check [`mode`](Self::mode) for the result.
    pub fn new(config: DispatcherConfig) -> Self {
        let pool = match config.mode {
            ExecutionMode::Worker => match build_worker_pool(&config.thread_name) {
                Ok(pool) => Some(pool),
                Err(err) => {
                    tracing::warn!(reason = %err, "worker unavailable, running inline");
                    None
                }
            },
            ExecutionMode::Inline => None,
        };
        let mode = if pool.is_some() {
            ExecutionMode::Worker
        } else {
            ExecutionMode::Inline
        };
        tracing::debug!(
            mode = mode.as_str(),
            timeout_ms = config.timeout.map(|t| t.as_millis() as u64),
            max_input_bytes = config.max_input_bytes,
            "dispatcher created"
        );

        Self {
            guard: RequestGuard::from_config(&config),
            mode,
            pool,
            shared: Arc::new(Shared::default()),
            next_sequence: Mutex::new(0),
        }
    }

    /// Dispatcher configured from `PICTURE_PRESS_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(DispatcherConfig::from_env())
    }

    /// Execution context actually in effect.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn state(&self) -> DispatcherState {
        self.shared.state()
    }

    /// Validate and queue a request.
    ///
    /// Validation failures are returned here and nothing is queued. In
    /// inline mode the pipeline has already run when this returns.
    pub fn submit(
        &self,
        request: CompressionRequest,
    ) -> Result<CompressionTicket, CompressionError> {
        let (tx, rx) = sync_channel(1);
        let sequence = self.dispatch(request, move |result| {
            // receiver gone means the caller dropped the ticket
            let _ = tx.send(result);
        })?;
        Ok(CompressionTicket {
            sequence,
            receiver: Some(rx),
        })
    }

    /// Like [`submit`](Self::submit), delivering the result to `callback`
    /// instead of a ticket. The callback is not invoked for validation
    /// failures. Returns the request's sequence number.
    ///
    /// In worker mode the callback runs on the worker thread after the
    /// request finishes. In inline mode it runs on the calling thread
    /// before `submit_with` returns.
    pub fn submit_with<F>(
        &self,
        request: CompressionRequest,
        callback: F,
    ) -> Result<u64, CompressionError>
    where
        F: FnOnce(CompressionResult) + Send + 'static,
    {
        self.dispatch(request, callback)
    }

    fn dispatch<F>(&self, request: CompressionRequest, deliver: F) -> Result<u64, CompressionError>
    where
        F: FnOnce(CompressionResult) + Send + 'static,
    {
        if let Err(err) = self.guard.validate(&request) {
            tracing::warn!(code = err.category().code(), reason = %err, "request rejected");
            return Err(err);
        }

        let mode = self.mode;
        let guard = self.guard.clone();
        let make_task = |sequence: u64| {
            tracing::debug!(sequence, mode = mode.as_str(), "request submitted");
            self.shared.enqueue();
            CompressTask {
                request,
                guard,
                mode,
                sequence,
            }
        };

        match &self.pool {
            Some(pool) => {
                // numbering and spawn_fifo happen under one lock
                let mut last = self.next_sequence.lock();
                *last += 1;
                let sequence = *last;
                let task = make_task(sequence);
                let shared = Arc::clone(&self.shared);
                pool.spawn_fifo(move || {
                    let result = shared.execute(sequence, mode, || task.run());
                    deliver(result);
                });
                Ok(sequence)
            }
            None => {
                // the gate is not fair, so number the request only once it owns it
                let gate = self.shared.gate.lock();
                let sequence = {
                    let mut last = self.next_sequence.lock();
                    *last += 1;
                    *last
                };
                let task = make_task(sequence);
                let result = self.shared.run_locked(sequence, mode, || task.run());
                drop(gate);
                deliver(result);
                Ok(sequence)
            }
        }
    }

    #[cfg(test)]
    fn worker_pool(&self) -> Option<&Arc<ThreadPool>> {
        self.pool.as_ref()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.pool.take().is_some() {
            tracing::debug!(
                submitted = *self.next_sequence.lock(),
                "releasing compression worker"
            );
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("guard", &self.guard)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::sync::Mutex as StdMutex;
    use std::time::{Duration, Instant};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 77])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn wait_for_state(dispatcher: &Dispatcher, want: DispatcherState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while dispatcher.state() != want {
            assert!(Instant::now() < deadline, "state never reached {want:?}");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn worker_mode_completes_request() {
        let dispatcher = Dispatcher::new(DispatcherConfig::worker());
        assert_eq!(dispatcher.mode(), ExecutionMode::Worker);
        let ticket = dispatcher
            .submit(CompressionRequest::new(png_bytes(1600, 1200), "image/png"))
            .unwrap();
        assert_eq!(ticket.sequence(), 1);
        let out = ticket.wait().unwrap();
        assert_eq!((out.width, out.height), (800, 600));
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(out.metrics.mode, ExecutionMode::Worker);
        wait_for_state(&dispatcher, DispatcherState::Idle);
    }

    #[test]
    fn inline_mode_runs_inside_submit() {
        let dispatcher = Dispatcher::new(DispatcherConfig::inline());
        assert_eq!(dispatcher.mode(), ExecutionMode::Inline);
        let mut ticket = dispatcher
            .submit(CompressionRequest::new(png_bytes(400, 300), "image/png"))
            .unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Idle);
        let out = ticket.try_result().expect("inline result is ready").unwrap();
        assert_eq!((out.width, out.height), (400, 300));
        assert_eq!(out.metrics.mode, ExecutionMode::Inline);
        assert!(ticket.try_result().is_none());
    }

    #[test]
    fn validation_failure_never_enters_running() {
        let dispatcher = Dispatcher::new(DispatcherConfig::inline());
        let err = dispatcher
            .submit(CompressionRequest::new(png_bytes(8, 8), "image/png").with_quality(0.0))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ValidationError);
        assert_eq!(dispatcher.state(), DispatcherState::Idle);

        // the rejected request did not consume a sequence number
        let ticket = dispatcher
            .submit(CompressionRequest::new(png_bytes(8, 8), "image/png"))
            .unwrap();
        assert_eq!(ticket.sequence(), 1);
    }

    #[test]
    fn submit_with_skips_callback_on_validation_failure() {
        let dispatcher = Dispatcher::new(DispatcherConfig::inline());
        let called = Arc::new(StdMutex::new(false));
        let flag = Arc::clone(&called);
        let err = dispatcher
            .submit_with(CompressionRequest::new(Vec::new(), "image/png"), move |_| {
                *flag.lock().unwrap() = true;
            })
            .unwrap_err();
        assert_eq!(err, CompressionError::empty_input());
        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn corrupt_jpeg_fails_and_returns_to_idle() {
        let dispatcher = Dispatcher::new(DispatcherConfig::worker());
        let mut data = vec![0xFF, 0xD8, 0xFF, 0xE0];
        data.extend(std::iter::repeat(0x42).take(256));
        let err = dispatcher
            .submit(CompressionRequest::new(data, "image/jpeg"))
            .unwrap()
            .wait()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::DecodeError);
        wait_for_state(&dispatcher, DispatcherState::Idle);
    }

    #[test]
    fn requests_queue_behind_the_running_one() {
        let dispatcher = Dispatcher::new(DispatcherConfig::worker());

        // hold the gate so the first job parks before Running
        let held = dispatcher.shared.gate.lock();
        let first = dispatcher
            .submit(CompressionRequest::new(png_bytes(1200, 900), "image/png"))
            .unwrap();
        let second = dispatcher
            .submit(CompressionRequest::new(png_bytes(16, 16), "image/png"))
            .unwrap();
        assert_eq!(dispatcher.state(), DispatcherState::Submitted);
        drop(held);

        let a = first.wait().unwrap();
        let b = second.wait().unwrap();
        assert!(a.metrics.finished_at <= b.metrics.started_at);
        wait_for_state(&dispatcher, DispatcherState::Idle);
    }

    #[test]
    fn callbacks_fire_in_submission_order() {
        let dispatcher = Dispatcher::new(DispatcherConfig::worker());
        let order = Arc::new(StdMutex::new(Vec::new()));
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        for (i, side) in [900u32, 10, 400, 20].into_iter().enumerate() {
            let order = Arc::clone(&order);
            let done_tx = done_tx.clone();
            dispatcher
                .submit_with(
                    CompressionRequest::new(png_bytes(side, side), "image/png"),
                    move |result| {
                        assert!(result.is_ok());
                        order.lock().unwrap().push(i);
                        let _ = done_tx.send(());
                    },
                )
                .unwrap();
        }
        for _ in 0..4 {
            done_rx.recv_timeout(Duration::from_secs(30)).unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    fn assert_runs_follow_sequence(config: DispatcherConfig) {
        let dispatcher = Arc::new(Dispatcher::new(config));
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                std::thread::spawn(move || {
                    let ticket = dispatcher
                        .submit(CompressionRequest::new(png_bytes(40 + i, 40), "image/png"))
                        .unwrap();
                    let sequence = ticket.sequence();
                    (sequence, ticket.wait().unwrap().metrics.started_at)
                })
            })
            .collect();
        let mut runs: Vec<(u64, Instant)> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        runs.sort_by_key(|(sequence, _)| *sequence);
        assert_eq!(
            runs.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
            (1..=6).collect::<Vec<u64>>()
        );
        for pair in runs.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "sequence {} ran late", pair[0].0);
        }
    }

    #[test]
    fn concurrent_inline_submitters_run_in_sequence_order() {
        assert_runs_follow_sequence(DispatcherConfig::inline());
    }

    #[test]
    fn concurrent_worker_submitters_run_in_sequence_order() {
        assert_runs_follow_sequence(DispatcherConfig::worker());
    }

    #[test]
    fn inline_callback_runs_before_submit_with_returns() {
        let dispatcher = Dispatcher::new(DispatcherConfig::inline());
        let delivered = Arc::new(StdMutex::new(None));
        let slot = Arc::clone(&delivered);
        let sequence = dispatcher
            .submit_with(CompressionRequest::new(png_bytes(8, 8), "image/png"), move |r| {
                *slot.lock().unwrap() = Some(r.is_ok());
            })
            .unwrap();
        assert_eq!(sequence, 1);
        assert_eq!(*delivered.lock().unwrap(), Some(true));
    }

    #[test]
    fn zero_timeout_is_worker_error() {
        let config = DispatcherConfig::worker().with_timeout(Some(Duration::ZERO));
        let dispatcher = Dispatcher::new(config);
        let err = dispatcher
            .submit(CompressionRequest::new(png_bytes(64, 64), "image/png"))
            .unwrap()
            .wait()
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::WorkerError);
        assert!(matches!(err, CompressionError::Timeout { stage: "decode", .. }));
    }

    #[test]
    fn oversized_input_is_rejected_at_submit() {
        let config = DispatcherConfig::inline().with_max_input_bytes(Some(16));
        let dispatcher = Dispatcher::new(config);
        let err = dispatcher
            .submit(CompressionRequest::new(png_bytes(32, 32), "image/png"))
            .unwrap_err();
        assert!(matches!(err, CompressionError::InputTooLarge { limit: 16, .. }));
    }

    #[test]
    fn panicking_job_is_worker_crash() {
        let shared = Shared::default();
        let err = shared
            .execute(7, ExecutionMode::Inline, || panic!("boom"))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::WorkerError);
        assert!(err.to_string().contains("boom"));
        assert_eq!(shared.state(), DispatcherState::Idle);
    }

    #[test]
    fn dropping_dispatcher_releases_worker() {
        let dispatcher = Dispatcher::new(DispatcherConfig::worker());
        let weak = Arc::downgrade(dispatcher.worker_pool().expect("worker pool"));
        let ticket = dispatcher
            .submit(CompressionRequest::new(png_bytes(32, 32), "image/png"))
            .unwrap();
        assert!(ticket.wait().is_ok());
        drop(dispatcher);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn dropped_ticket_does_not_block_worker() {
        let dispatcher = Dispatcher::new(DispatcherConfig::worker());
        drop(
            dispatcher
                .submit(CompressionRequest::new(png_bytes(32, 32), "image/png"))
                .unwrap(),
        );
        let out = dispatcher
            .submit(CompressionRequest::new(png_bytes(32, 32), "image/png"))
            .unwrap()
            .wait();
        assert!(out.is_ok());
    }
}
