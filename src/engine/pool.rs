// src/engine/pool.rs
//
// Worker thread construction for the dispatcher.
//
// Each dispatcher owns exactly one single-threaded rayon pool. The pool is
// built when the dispatcher is created and torn down when it is dropped, so
// creating or dropping a dispatcher never touches a process-wide pool.
//
// Thread count is fixed at one: requests must complete in submission order.
// fast_image_resize's rayon path therefore runs on this same single thread.

use crate::error::CompressionError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;

/// Number of threads in a dispatcher pool. Ordering depends on this being 1.
pub const WORKER_THREADS: usize = 1;

/// Build the dispatcher's private worker pool.
///
/// Returns `WorkerUnavailable` when the OS refuses to spawn the thread; the
/// caller decides whether to fall back to inline execution.
pub fn build_worker_pool(thread_name: &str) -> Result<Arc<ThreadPool>, CompressionError> {
    let name = thread_name.to_string();
    ThreadPoolBuilder::new()
        .num_threads(WORKER_THREADS)
        .thread_name(move |idx| format!("{name}-{idx}"))
        .panic_handler(|payload| {
            let message = crate::engine::common::panic_message(payload.as_ref());
            tracing::error!(%message, "panic escaped a compression job");
        })
        .build()
        .map(Arc::new)
        .map_err(|e| CompressionError::worker_unavailable(format!("failed to spawn worker: {e}")))
}
