// ============================================================================
// Dualcall Library
// ============================================================================

//! Dual-convention dispatch for suspendable operations.
//!
//! An [`Agent`] lets an object define its operations once, as suspendable
//! routines, and serve two calling conventions transparently:
//!
//! - a caller outside any cooperative scheduler gets blocking semantics:
//!   the call returns the final value;
//! - a caller already running inside a cooperative scheduler gets a pending
//!   [`Reply`] it must await.
//!
//! Each instance privately owns one scheduler thread while active.
//! Operations execute there one at a time, in submission order; the instance
//! can be stopped and resumed ([`Agent::stop`] / [`Agent::start`]), and
//! implementations can be substituted and reverted at any point; dispatch
//! resolves the live binding for every call.
//!
//! # Examples
//!
//! ```
//! use dualcall::{Agent, OpTable, Routines, Value};
//!
//! struct Greeter;
//!
//! impl Routines for Greeter {
//!     fn declared() -> OpTable<Self> {
//!         let mut table = OpTable::new();
//!         table.op("hello", |_greeter, _args| {
//!             Box::pin(async { Ok(Value::from("hello")) })
//!         });
//!         table
//!     }
//! }
//!
//! # fn main() -> dualcall::Result<()> {
//! let agent = Agent::new(Greeter)?;
//!
//! // No scheduler on this thread: the call blocks and returns the value.
//! assert_eq!(agent.call("hello", vec![]).wait()?, Value::from("hello"));
//!
//! agent.stop()?;
//! assert!(agent.call("hello", vec![]).wait().is_err());
//!
//! agent.start()?;
//! assert_eq!(agent.call("hello", vec![]).wait()?, Value::from("hello"));
//! agent.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod dispatch;
pub mod facade;
mod scheduler;

// Re-export main types for convenience
pub use crate::core::{AgentError, Args, LifecycleState, Result, Value};
pub use dispatch::{OpFn, OpFuture, OpTable, Reply, inside_scheduler};
pub use facade::{Agent, AgentConfig, Routines};
