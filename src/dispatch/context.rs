//! Call-context classification.
//!
//! Every dispatched call picks its convention from the calling thread, not
//! from any flag passed by the caller: a thread already executing inside a
//! cooperative scheduler must get a suspendable handle back, everything else
//! blocks for the final value.

use tokio::runtime::Handle;

/// Returns `true` when the calling thread is already executing inside a
/// cooperative scheduler (a tokio runtime context).
///
/// The runtime installs a thread-local context marker for the duration of
/// `block_on`/task polling; that marker is exactly the signal we need. The
/// check is evaluated freshly for every call: the same instance may be
/// called from different threads, and the same thread may move in and out of
/// a runtime between calls.
pub fn inside_scheduler() -> bool {
    Handle::try_current().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_thread_is_not_inside_scheduler() {
        assert!(!inside_scheduler());
    }

    #[tokio::test]
    async fn runtime_task_is_inside_scheduler() {
        assert!(inside_scheduler());
    }

    #[tokio::test]
    async fn classification_is_per_thread_not_per_instance() {
        assert!(inside_scheduler());

        let outside = std::thread::spawn(inside_scheduler).join().unwrap();
        assert!(!outside);
    }
}
