use std::time::Duration;

/// Instance configuration
///
/// Controls the scheduler thread owned by one [`Agent`](super::Agent).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Name given to the scheduler thread (visible in debuggers and panics)
    pub thread_name: String,

    /// How long activation may take, including the initialization hook
    pub start_timeout: Duration,
}

impl AgentConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            thread_name: "dualcall-scheduler".to_string(),
            start_timeout: Duration::from_secs(30),
        }
    }

    /// Set the scheduler thread name
    pub fn thread_name(mut self, name: &str) -> Self {
        self.thread_name = name.to_string();
        self
    }

    /// Set the activation timeout
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new()
    }
}
