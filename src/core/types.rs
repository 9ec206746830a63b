pub use serde_json::Value;

/// Positional arguments handed to a dispatched operation.
pub type Args = Vec<Value>;

/// Lifecycle of one instance.
///
/// Transitions are guarded by the lifecycle controller: `Active -> Stopped`
/// via `stop()`, `Stopped -> Active` via `start()`. At most one live
/// scheduler thread exists per instance at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Stopped,
}

impl LifecycleState {
    pub fn is_active(self) -> bool {
        self == LifecycleState::Active
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Active => write!(f, "active"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}
