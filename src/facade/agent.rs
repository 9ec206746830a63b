use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{Mutex, oneshot};
use uuid::Uuid;

use super::config::AgentConfig;
use crate::core::{AgentError, Args, LifecycleState, Result};
use crate::dispatch::{Bindings, OpFuture, OpTable, Reply, inside_scheduler};
use crate::scheduler::{InitFn, Job, JobWork, Lifecycle, Worker};

/// Contract for a type whose operations are served by an [`Agent`].
///
/// Declaring an operation in [`Routines::declared`] is what marks it as
/// suspendable: declared operations are dispatched onto the instance's
/// scheduler thread and follow the caller's convention. Everything else on
/// the type (ordinary methods, fields) is untouched by the dispatch layer.
///
/// # Examples
///
/// ```
/// use dualcall::{OpTable, Routines, Value};
///
/// struct Greeter;
///
/// impl Routines for Greeter {
///     fn declared() -> OpTable<Self> {
///         let mut table = OpTable::new();
///         table.op("hello", |_greeter, _args| {
///             Box::pin(async { Ok(Value::from("hello")) })
///         });
///         table
///     }
/// }
/// ```
#[async_trait]
pub trait Routines: Send + Sized + 'static {
    /// The declared suspendable operation set.
    fn declared() -> OpTable<Self>;

    /// Initialization hook, run on the scheduler thread once per
    /// activation, before any operation is dispatched.
    ///
    /// Construction (and every later [`Agent::start`]) waits for this hook
    /// and fails with [`AgentError::InitFailed`] if it errors, leaving the
    /// instance stopped rather than half-initialized.
    async fn init(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An object serving its suspendable operations under both calling
/// conventions.
///
/// Each `Agent` privately owns one scheduler thread while active. Dispatched
/// operations execute there one at a time in submission order; callers
/// outside any scheduler block for the final value, callers already inside a
/// scheduler get a pending [`Reply`] to await. The convention is picked per
/// call from the calling thread alone; no flag is passed.
///
/// # Examples
///
/// ```
/// use dualcall::{Agent, OpTable, Routines, Value};
///
/// struct Greeter;
///
/// impl Routines for Greeter {
///     fn declared() -> OpTable<Self> {
///         let mut table = OpTable::new();
///         table.op("hello", |_greeter, _args| {
///             Box::pin(async { Ok(Value::from("hello")) })
///         });
///         table
///     }
/// }
///
/// # fn main() -> dualcall::Result<()> {
/// // Blocking convention: no scheduler on this thread, the call returns
/// // the final value.
/// let agent = Agent::new(Greeter)?;
/// assert_eq!(agent.call("hello", vec![]).wait()?, Value::from("hello"));
/// agent.stop()?;
///
/// // Non-blocking convention: inside a runtime the same call hands back a
/// // pending reply instead.
/// # tokio_test::block_on(async {
/// let agent = Agent::new(Greeter).unwrap();
/// assert_eq!(agent.call("hello", vec![]).await.unwrap(), Value::from("hello"));
/// agent.stop().unwrap();
/// # });
/// # Ok(())
/// # }
/// ```
pub struct Agent<R: Routines> {
    routines: Arc<Mutex<R>>,
    bindings: Bindings<R>,
    lifecycle: Lifecycle,
    config: AgentConfig,
}

impl<R: Routines> Agent<R> {
    /// Construct and activate an instance.
    ///
    /// Returns only after the scheduler thread is running and the
    /// initialization hook (if any) has completed, so the instance is fully
    /// usable, from either calling convention, the moment this returns.
    pub fn new(routines: R) -> Result<Self> {
        Self::with_config(routines, AgentConfig::default())
    }

    /// Construct with a custom [`AgentConfig`].
    pub fn with_config(routines: R, config: AgentConfig) -> Result<Self> {
        Self::with_table(routines, R::declared(), config)
    }

    /// Construct from an explicit operation table instead of
    /// [`Routines::declared`].
    ///
    /// This is the seam for substituting a declared operation before
    /// construction: hand in a table with the entry replaced, and every
    /// dispatch resolves against it.
    pub fn with_table(routines: R, table: OpTable<R>, config: AgentConfig) -> Result<Self> {
        let agent = Self {
            routines: Arc::new(Mutex::new(routines)),
            bindings: Bindings::new(table),
            lifecycle: Lifecycle::new(),
            config,
        };
        agent.start()?;
        Ok(agent)
    }

    /// Activate a stopped instance: spawn a fresh scheduler thread and
    /// re-run the initialization hook. No-op when already active.
    pub fn start(&self) -> Result<()> {
        let routines = Arc::clone(&self.routines);
        let thread_name = self.config.thread_name.clone();
        let start_timeout = self.config.start_timeout;

        self.lifecycle.start(move || {
            let init: InitFn = Box::new(move || {
                Box::pin(async move {
                    let mut routines = routines.lock().await;
                    routines.init().await
                })
            });
            Worker::spawn(thread_name, init, start_timeout)
        })
    }

    /// Deactivate: refuse anything still queued, join the scheduler thread,
    /// release it. Safe to call repeatedly; dispatches made afterwards fail
    /// with [`AgentError::Stopped`] until [`Agent::start`] is called again.
    ///
    /// Must not be called from inside one of this instance's own operations:
    /// the join would wait on the thread executing it.
    pub fn stop(&self) -> Result<()> {
        self.lifecycle.stop()
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle.state().is_active()
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Dispatch a declared operation under the caller's convention.
    ///
    /// In order: the lifecycle gate (a stopped instance refuses the call
    /// without touching any scheduler), resolution of the implementation
    /// currently bound to `op` (overrides included, snapshot taken for this
    /// call only), then the hand-off. A caller outside any scheduler blocks
    /// here and receives a resolved [`Reply`]; a caller inside one receives
    /// a pending [`Reply`] immediately and must await it.
    pub fn call(&self, op: &str, args: Args) -> Reply {
        let want_handle = inside_scheduler();
        match self.dispatch(op, args, want_handle) {
            Ok(reply) => reply,
            Err(err) => Reply::ready(Err(err)),
        }
    }

    /// Dispatch without waiting, regardless of context.
    ///
    /// The operation is queued in submission order like any other call; the
    /// returned pending [`Reply`] can be awaited or [`Reply::wait`]ed later.
    pub fn submit(&self, op: &str, args: Args) -> Reply {
        match self.dispatch(op, args, true) {
            Ok(reply) => reply,
            Err(err) => Reply::ready(Err(err)),
        }
    }

    fn dispatch(&self, op: &str, args: Args, want_handle: bool) -> Result<Reply> {
        let jobs = self.lifecycle.sender()?;

        let implementation = self
            .bindings
            .resolve(op)?
            .ok_or_else(|| AgentError::UnknownOperation(op.to_string()))?;

        let id = Uuid::new_v4();
        debug!("dispatching '{op}' (call {id})");

        let routines = Arc::clone(&self.routines);
        let work: JobWork = Box::new(move || {
            Box::pin(async move {
                let mut routines = routines.lock().await;
                (implementation.as_ref())(&mut *routines, args).await
            })
        });

        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            id,
            op: op.to_string(),
            work,
            reply: reply_tx,
        };
        jobs.send(job).map_err(|_| AgentError::Stopped)?;

        if want_handle {
            Ok(Reply::pending(reply_rx))
        } else {
            match reply_rx.blocking_recv() {
                Ok(result) => Ok(Reply::ready(result)),
                Err(_) => Err(AgentError::Scheduler(
                    "scheduler thread dropped the call".into(),
                )),
            }
        }
    }

    /// Substitute the implementation bound to `op` for this instance.
    ///
    /// Honored by every subsequent dispatch, in both conventions, until
    /// [`Agent::clear_override`] reverts it. The operation name does not
    /// have to be declared (an override may add a binding), but reverting
    /// an undeclared name leaves nothing behind.
    pub fn override_op<F>(&self, op: &str, f: F) -> Result<()>
    where
        F: for<'a> Fn(&'a mut R, Args) -> OpFuture<'a> + Send + Sync + 'static,
    {
        self.bindings.install(op, f)
    }

    /// Revert an instance-scope substitution, restoring the declared
    /// behavior exactly. Returns whether an override was present.
    pub fn clear_override(&self, op: &str) -> Result<bool> {
        self.bindings.revert(op)
    }

    /// Names of the declared operations (overrides that add new names are
    /// not listed).
    pub fn operations(&self) -> Vec<&'static str> {
        self.bindings.declared_names()
    }

    /// Shared handle to the routines object, for ordinary methods.
    ///
    /// Ordinary methods involve no dispatch, no thread hand-off, and work
    /// whether the instance is active or stopped. Use
    /// `routines().blocking_lock()` from plain threads and
    /// `routines().lock().await` from async code.
    pub fn routines(&self) -> &Arc<Mutex<R>> {
        &self.routines
    }
}

impl<R: Routines> Drop for Agent<R> {
    fn drop(&mut self) {
        if let Err(err) = self.lifecycle.stop() {
            warn!("agent dropped without clean stop: {err}");
        }
    }
}

impl<R: Routines> std::fmt::Debug for Agent<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("state", &self.lifecycle.state())
            .field("operations", &self.bindings.declared_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use serde_json::json;

    struct Example {
        init_runs: u64,
    }

    impl Example {
        fn new() -> Self {
            Self { init_runs: 0 }
        }

        fn sync_hello(&self) -> &'static str {
            "hello"
        }
    }

    #[async_trait]
    impl Routines for Example {
        fn declared() -> OpTable<Self> {
            let mut table: OpTable<Self> = OpTable::new();
            table.op("hello", |_example, _args| {
                Box::pin(async { Ok(Value::from("hello")) })
            });
            table.op("echo", |_example, mut args| {
                Box::pin(async move {
                    if args.is_empty() {
                        anyhow::bail!("echo needs an argument");
                    }
                    Ok(args.remove(0))
                })
            });
            table.op("init_runs", |example, _args| {
                Box::pin(async move { Ok(Value::from(example.init_runs)) })
            });
            table
        }

        async fn init(&mut self) -> anyhow::Result<()> {
            self.init_runs += 1;
            Ok(())
        }
    }

    #[test]
    fn blocking_call_returns_final_value() {
        let agent = Agent::new(Example::new()).unwrap();
        let reply = agent.call("hello", vec![]);
        assert!(reply.is_resolved());
        assert_eq!(reply.wait().unwrap(), Value::from("hello"));
        agent.stop().unwrap();
    }

    #[tokio::test]
    async fn scheduler_caller_gets_pending_reply() {
        let agent = Agent::new(Example::new()).unwrap();
        let reply = agent.call("hello", vec![]);
        assert!(!reply.is_resolved());
        assert_eq!(reply.await.unwrap(), Value::from("hello"));
        agent.stop().unwrap();
    }

    #[test]
    fn arguments_reach_the_operation() {
        let agent = Agent::new(Example::new()).unwrap();
        let value = agent.call("echo", vec![json!({"n": 3})]).wait().unwrap();
        assert_eq!(value, json!({"n": 3}));
        agent.stop().unwrap();
    }

    #[test]
    fn operation_error_propagates_unchanged() {
        let agent = Agent::new(Example::new()).unwrap();
        let err = agent.call("echo", vec![]).wait().unwrap_err();
        assert!(matches!(&err, AgentError::Operation(_)));
        assert_eq!(err.to_string(), "echo needs an argument");

        // the instance keeps serving
        assert_eq!(agent.call("hello", vec![]).wait().unwrap(), Value::from("hello"));
        agent.stop().unwrap();
    }

    #[test]
    fn unknown_operation_is_refused() {
        let agent = Agent::new(Example::new()).unwrap();
        let err = agent.call("nope", vec![]).wait().unwrap_err();
        assert!(matches!(err, AgentError::UnknownOperation(name) if name == "nope"));
        agent.stop().unwrap();
    }

    #[test]
    fn submit_hands_back_a_pending_reply() {
        let agent = Agent::new(Example::new()).unwrap();
        let reply = agent.submit("hello", vec![]);
        assert!(!reply.is_resolved());
        assert_eq!(reply.wait().unwrap(), Value::from("hello"));
        agent.stop().unwrap();
    }

    #[test]
    fn init_runs_once_per_activation() {
        let agent = Agent::new(Example::new()).unwrap();
        assert_eq!(agent.call("init_runs", vec![]).wait().unwrap(), json!(1));

        agent.stop().unwrap();
        agent.start().unwrap();
        assert_eq!(agent.call("init_runs", vec![]).wait().unwrap(), json!(2));

        // idempotent start does not re-run the hook
        agent.start().unwrap();
        assert_eq!(agent.call("init_runs", vec![]).wait().unwrap(), json!(2));
        agent.stop().unwrap();
    }

    #[test]
    fn ordinary_methods_bypass_dispatch() {
        let agent = Agent::new(Example::new()).unwrap();
        assert_eq!(agent.routines().blocking_lock().sync_hello(), "hello");

        agent.stop().unwrap();
        // still callable while stopped
        assert_eq!(agent.routines().blocking_lock().sync_hello(), "hello");
    }

    #[test]
    fn debug_shows_state_and_operations() {
        let agent = Agent::new(Example::new()).unwrap();
        let rendered = format!("{agent:?}");
        assert!(rendered.contains("Active"));
        assert!(rendered.contains("hello"));
        agent.stop().unwrap();
    }

    #[test]
    fn drop_stops_the_scheduler_thread() {
        let agent = Agent::new(Example::new()).unwrap();
        let reply = agent.submit("hello", vec![]);
        drop(agent);
        // the queued call was either served or refused, never lost
        let _ = reply.wait();
    }

    struct FailingInit;

    #[async_trait]
    impl Routines for FailingInit {
        fn declared() -> OpTable<Self> {
            let mut table = OpTable::new();
            table.op("hello", |_state, _args| {
                Box::pin(async { Ok(Value::from("hello")) })
            });
            table
        }

        async fn init(&mut self) -> anyhow::Result<()> {
            anyhow::bail!("refusing to initialize")
        }
    }

    #[test]
    fn init_failure_aborts_construction() {
        let err = Agent::new(FailingInit).unwrap_err();
        assert!(matches!(err, AgentError::InitFailed(_)));
    }
}
