//! The scheduler thread.
//!
//! One worker per active instance: a named OS thread driving a
//! current-thread tokio runtime. Dispatched operations arrive as [`Job`]s on
//! an unbounded FIFO queue and execute strictly one at a time, in submission
//! order; each job fulfills a oneshot completion primitive that the waiting
//! side (blocking or suspended) is released by.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::core::{AgentError, Result, Value};

/// Type-erased unit of work: builds the operation future on the scheduler
/// thread, where it will be polled.
pub(crate) type JobWork = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// Initialization hook, run on the scheduler thread before any job.
pub(crate) type InitFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

pub(crate) struct Job {
    pub(crate) id: Uuid,
    pub(crate) op: String,
    pub(crate) work: JobWork,
    pub(crate) reply: oneshot::Sender<Result<Value>>,
}

/// Handle to a live scheduler thread. Owned exclusively by one instance's
/// lifecycle controller while active; never shared across instances.
#[derive(Debug)]
pub(crate) struct Worker {
    jobs: mpsc::UnboundedSender<Job>,
    cancel: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    /// Spawn the scheduler thread and run `init` as its first unit of work.
    ///
    /// Returns once the hook has completed, so the caller observes a fully
    /// initialized instance. The handshake rides a std channel: waiting on
    /// it is legal from any calling convention, including a constructor
    /// invoked inside somebody else's runtime. An init failure tears the
    /// thread back down and surfaces as the activation error.
    pub(crate) fn spawn(
        thread_name: String,
        init: InitFn,
        start_timeout: Duration,
    ) -> Result<Worker> {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_flag = Arc::clone(&cancel);

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || run(jobs_rx, init, &ready_tx, &cancel_flag))
            .map_err(|e| AgentError::Scheduler(format!("failed to spawn scheduler thread: {e}")))?;

        match ready_rx.recv_timeout(start_timeout) {
            Ok(Ok(())) => Ok(Worker {
                jobs: jobs_tx,
                cancel,
                thread,
            }),
            Ok(Err(err)) => {
                drop(jobs_tx);
                let _ = thread.join();
                Err(err)
            }
            Err(_) => {
                // The hook is hung or slow; the queue sender drops here, so
                // the thread winds down on its own once the hook returns.
                Err(AgentError::StartTimeout(start_timeout))
            }
        }
    }

    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<Job> {
        self.jobs.clone()
    }

    /// Signal the thread to refuse anything still queued, close the queue,
    /// and join. The in-flight operation (if any) finishes first; nothing
    /// queued behind it begins.
    pub(crate) fn stop(self) {
        self.cancel.store(true, Ordering::Release);
        drop(self.jobs);
        if self.thread.join().is_err() {
            warn!("scheduler thread terminated abnormally");
        }
    }
}

fn run(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    init: InitFn,
    ready: &std_mpsc::Sender<Result<()>>,
    cancel: &AtomicBool,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(AgentError::Scheduler(format!(
                "failed to build scheduler runtime: {e}"
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        match AssertUnwindSafe(init()).catch_unwind().await {
            Ok(Ok(())) => {
                if ready.send(Ok(())).is_err() {
                    // Activation was abandoned (timeout); nothing can be
                    // queued anymore, so just wind down.
                    return;
                }
            }
            Ok(Err(err)) => {
                let _ = ready.send(Err(AgentError::InitFailed(err)));
                return;
            }
            Err(payload) => {
                let _ = ready.send(Err(AgentError::Panicked(panic_message(&payload))));
                return;
            }
        }

        while let Some(job) = jobs.recv().await {
            if cancel.load(Ordering::Acquire) {
                debug!("refusing queued call {} ('{}'): stop accepted", job.id, job.op);
                let _ = job.reply.send(Err(AgentError::Stopped));
                continue;
            }

            let outcome = AssertUnwindSafe((job.work)()).catch_unwind().await;
            let result = match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(AgentError::Operation(err)),
                Err(payload) => {
                    warn!("operation '{}' (call {}) panicked", job.op, job.id);
                    Err(AgentError::Panicked(panic_message(&payload)))
                }
            };
            let _ = job.reply.send(result);
        }
    });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
