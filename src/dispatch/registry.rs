//! Declared operations and live bindings.
//!
//! An operation becomes suspendable by being registered in an [`OpTable`];
//! registration is the explicit marker. Ordinary methods on the state type
//! are never routed through the dispatcher. The table built at construction
//! is the class-scope binding set; [`Bindings`] layers instance-scope
//! overrides on top and resolves the live implementation for every call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use futures::future::BoxFuture;

use crate::core::{Args, Result, Value};

/// Future returned by an operation body, borrowing the instance state for
/// the duration of the call.
pub type OpFuture<'a> = BoxFuture<'a, anyhow::Result<Value>>;

/// A registered operation implementation.
///
/// Operations receive exclusive access to the state (`&mut R`) because the
/// scheduler thread runs them one at a time, and positional [`Args`]. Their
/// failures propagate to the caller unchanged.
pub type OpFn<R> = dyn for<'a> Fn(&'a mut R, Args) -> OpFuture<'a> + Send + Sync;

/// The declared set of suspendable operations for a state type.
///
/// # Examples
///
/// ```
/// use dualcall::{OpTable, Value};
///
/// struct Greeter;
///
/// let mut table: OpTable<Greeter> = OpTable::new();
/// table.op("hello", |_greeter, _args| {
///     Box::pin(async { Ok(Value::from("hello")) })
/// });
/// assert!(table.contains("hello"));
/// ```
pub struct OpTable<R> {
    ops: HashMap<&'static str, Arc<OpFn<R>>>,
}

impl<R> OpTable<R> {
    pub fn new() -> Self {
        Self {
            ops: HashMap::new(),
        }
    }

    /// Declare (or replace) an operation under `name`.
    ///
    /// Replacing an entry before the table is handed to the instance is how
    /// a substitution is installed at class scope.
    pub fn op<F>(&mut self, name: &'static str, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut R, Args) -> OpFuture<'a> + Send + Sync + 'static,
    {
        self.ops.insert(name, Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ops.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<OpFn<R>>> {
        self.ops.get(name).cloned()
    }

    /// Names of all declared operations.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.ops.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl<R> Default for OpTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for OpTable<R> {
    fn clone(&self) -> Self {
        Self {
            ops: self.ops.clone(),
        }
    }
}

impl<R> std::fmt::Debug for OpTable<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpTable").field("ops", &self.names()).finish()
    }
}

/// Live bindings for one instance: the declared table plus instance-scope
/// overrides.
///
/// Resolution happens per call, never at wrap time, so a substitution
/// installed after construction is honored for exactly as long as it stays
/// installed, and reverting it restores the declared behavior.
pub(crate) struct Bindings<R> {
    declared: OpTable<R>,
    overrides: RwLock<HashMap<String, Arc<OpFn<R>>>>,
}

impl<R> Bindings<R> {
    pub(crate) fn new(declared: OpTable<R>) -> Self {
        Self {
            declared,
            overrides: RwLock::new(HashMap::new()),
        }
    }

    /// Snapshot of the implementation currently bound to `name`: the
    /// instance override if one is installed, otherwise the declared
    /// binding. Safe under concurrent callers; the `Arc` clone taken under
    /// the read lock is the read-consistent snapshot for this dispatch.
    pub(crate) fn resolve(&self, name: &str) -> Result<Option<Arc<OpFn<R>>>> {
        let overrides = self.overrides.read()?;
        if let Some(op) = overrides.get(name) {
            return Ok(Some(Arc::clone(op)));
        }
        Ok(self.declared.get(name))
    }

    pub(crate) fn install<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: for<'a> Fn(&'a mut R, Args) -> OpFuture<'a> + Send + Sync + 'static,
    {
        let mut overrides = self.overrides.write()?;
        overrides.insert(name.to_string(), Arc::new(f));
        Ok(())
    }

    pub(crate) fn revert(&self, name: &str) -> Result<bool> {
        let mut overrides = self.overrides.write()?;
        Ok(overrides.remove(name).is_some())
    }

    pub(crate) fn declared_names(&self) -> Vec<&'static str> {
        self.declared.names()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        count: u64,
    }

    fn table() -> OpTable<Counter> {
        let mut table: OpTable<Counter> = OpTable::new();
        table.op("bump", |counter, _args| {
            Box::pin(async move {
                counter.count += 1;
                Ok(Value::from(counter.count))
            })
        });
        table
    }

    #[tokio::test]
    async fn declared_op_runs_against_state() {
        let mut counter = Counter { count: 0 };
        let op = table().get("bump").unwrap();

        let value = op.as_ref()(&mut counter, vec![]).await.unwrap();
        assert_eq!(value, Value::from(1));
        assert_eq!(counter.count, 1);
    }

    #[tokio::test]
    async fn override_shadows_and_revert_restores() {
        let bindings = Bindings::new(table());
        let mut counter = Counter { count: 0 };

        bindings
            .install("bump", |_counter, _args| {
                Box::pin(async { Ok(Value::from("shadowed")) })
            })
            .unwrap();

        let op = bindings.resolve("bump").unwrap().unwrap();
        assert_eq!(
            op.as_ref()(&mut counter, vec![]).await.unwrap(),
            Value::from("shadowed")
        );
        assert_eq!(counter.count, 0);

        assert!(bindings.revert("bump").unwrap());
        let op = bindings.resolve("bump").unwrap().unwrap();
        assert_eq!(op.as_ref()(&mut counter, vec![]).await.unwrap(), Value::from(1));
    }

    #[test]
    fn unknown_name_resolves_to_none() {
        let bindings = Bindings::new(table());
        assert!(bindings.resolve("missing").unwrap().is_none());
    }

    #[test]
    fn names_are_sorted() {
        let mut table = table();
        table.op("another", |_counter, _args| Box::pin(async { Ok(Value::Null) }));
        assert_eq!(table.names(), vec!["another", "bump"]);
    }
}
