//! The suspendable call handle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use tokio::sync::oneshot;

use crate::core::{AgentError, Result, Value};

/// Outcome handle for one dispatched call.
///
/// Which face of the handle matters depends on the calling convention the
/// dispatcher picked:
///
/// - **Blocking mode** (caller outside any scheduler): the dispatcher has
///   already waited for the scheduler thread, and the reply is resolved.
///   [`Reply::wait`] returns the value without blocking again.
/// - **Non-blocking mode** (caller inside a scheduler): the reply is pending
///   and must be awaited; the caller's scheduler is never blocked while the
///   instance's thread does the work.
///
/// A `Reply` is a `Future` in both cases, so `reply.await` is always valid
/// from async code; a resolved reply completes on first poll.
#[must_use = "a Reply carries the call's outcome; await it or call wait()"]
pub struct Reply {
    inner: Inner,
}

enum Inner {
    Ready(Option<Result<Value>>),
    Pending(oneshot::Receiver<Result<Value>>),
}

impl Reply {
    pub(crate) fn ready(result: Result<Value>) -> Self {
        Self {
            inner: Inner::Ready(Some(result)),
        }
    }

    pub(crate) fn pending(rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self {
            inner: Inner::Pending(rx),
        }
    }

    /// Whether the outcome is already resolved (always true in blocking
    /// mode).
    pub fn is_resolved(&self) -> bool {
        matches!(self.inner, Inner::Ready(_))
    }

    /// Extract the outcome, blocking the calling thread if it is still
    /// pending.
    ///
    /// Intended for callers outside any scheduler. Do not use from async
    /// code, `.await` the reply instead; blocking on a pending reply inside
    /// a runtime context panics by tokio's own rules.
    pub fn wait(self) -> Result<Value> {
        match self.inner {
            Inner::Ready(result) => result.expect("reply already consumed"),
            Inner::Pending(rx) => match rx.blocking_recv() {
                Ok(result) => result,
                Err(_) => Err(AgentError::Scheduler(
                    "scheduler thread dropped the call".into(),
                )),
            },
        }
    }

    /// [`Reply::wait`], then deserialize the value into `T`.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let greeting: String = agent.call("hello", vec![]).wait_as()?;
    /// ```
    pub fn wait_as<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.wait()?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Future for Reply {
    type Output = Result<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            Inner::Ready(result) => {
                Poll::Ready(result.take().expect("reply polled after completion"))
            }
            Inner::Pending(rx) => Pin::new(rx).poll(cx).map(|recv| match recv {
                Ok(result) => result,
                Err(_) => Err(AgentError::Scheduler(
                    "scheduler thread dropped the call".into(),
                )),
            }),
        }
    }
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            Inner::Ready(_) => write!(f, "Reply::Resolved"),
            Inner::Pending(_) => write!(f, "Reply::Pending"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_reply_returns_without_blocking() {
        let reply = Reply::ready(Ok(Value::from("hello")));
        assert!(reply.is_resolved());
        assert_eq!(reply.wait().unwrap(), Value::from("hello"));
    }

    #[tokio::test]
    async fn resolved_reply_completes_on_first_poll() {
        let reply = Reply::ready(Ok(Value::from(7)));
        assert_eq!(reply.await.unwrap(), Value::from(7));
    }

    #[tokio::test]
    async fn pending_reply_resolves_when_fulfilled() {
        let (tx, rx) = oneshot::channel();
        let reply = Reply::pending(rx);
        assert!(!reply.is_resolved());

        tx.send(Ok(Value::from("later"))).unwrap();
        assert_eq!(reply.await.unwrap(), Value::from("later"));
    }

    #[tokio::test]
    async fn dropped_sender_surfaces_scheduler_error() {
        let (tx, rx) = oneshot::channel::<Result<Value>>();
        drop(tx);

        let err = Reply::pending(rx).await.unwrap_err();
        assert!(matches!(err, AgentError::Scheduler(_)));
    }

    #[test]
    fn wait_as_deserializes() {
        let reply = Reply::ready(Ok(Value::from("hello")));
        let greeting: String = reply.wait_as().unwrap();
        assert_eq!(greeting, "hello");
    }

    #[test]
    fn wait_as_reports_decode_failure() {
        let reply = Reply::ready(Ok(Value::from("not a number")));
        let err = reply.wait_as::<u64>().unwrap_err();
        assert!(matches!(err, AgentError::Decode(_)));
    }
}
