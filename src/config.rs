// src/config.rs
//
// Dispatcher configuration: execution mode, deadline and input limits.

use std::borrow::Cow;
use std::time::Duration;

/// Input cap applied at submission (same as the upload form limit).
pub const DEFAULT_MAX_INPUT_BYTES: u64 = 10 * 1024 * 1024;

/// Name given to the dispatcher's worker thread.
pub const DEFAULT_THREAD_NAME: &str = "picture-press-worker";

pub const ENV_MODE: &str = "PICTURE_PRESS_MODE";
pub const ENV_TIMEOUT_MS: &str = "PICTURE_PRESS_TIMEOUT_MS";
pub const ENV_MAX_INPUT_BYTES: &str = "PICTURE_PRESS_MAX_INPUT_BYTES";

/// Where the pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Dedicated worker thread owned by the dispatcher
    Worker,
    /// Synchronously on the submitting thread
    Inline,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Worker => "worker",
            ExecutionMode::Inline => "inline",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "worker" => Some(ExecutionMode::Worker),
            "inline" => Some(ExecutionMode::Inline),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    /// Preferred execution mode. `Worker` degrades to `Inline` when no thread can be spawned.
    pub mode: ExecutionMode,
    /// Per-request deadline, checked between stages. `None` never times out.
    pub timeout: Option<Duration>,
    /// Maximum accepted input size. `None` disables the check.
    pub max_input_bytes: Option<u64>,
    pub thread_name: Cow<'static, str>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Worker,
            timeout: None,
            max_input_bytes: Some(DEFAULT_MAX_INPUT_BYTES),
            thread_name: Cow::Borrowed(DEFAULT_THREAD_NAME),
        }
    }
}

impl DispatcherConfig {
    pub fn worker() -> Self {
        Self::default()
    }

    pub fn inline() -> Self {
        Self {
            mode: ExecutionMode::Inline,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_input_bytes(mut self, limit: Option<u64>) -> Self {
        self.max_input_bytes = limit;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Defaults overridden by `PICTURE_PRESS_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    /// Unparseable values are ignored and logged.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MODE) {
            match ExecutionMode::parse(&raw) {
                Some(mode) => config.mode = mode,
                None => tracing::warn!(key = ENV_MODE, value = %raw, "ignoring invalid execution mode"),
            }
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => config.timeout = Some(Duration::from_millis(ms)),
                Err(_) => tracing::warn!(key = ENV_TIMEOUT_MS, value = %raw, "ignoring invalid timeout"),
            }
        }

        if let Some(raw) = lookup(ENV_MAX_INPUT_BYTES) {
            match raw.trim().parse::<u64>() {
                Ok(limit) => config.max_input_bytes = Some(limit),
                Err(_) => tracing::warn!(
                    key = ENV_MAX_INPUT_BYTES,
                    value = %raw,
                    "ignoring invalid input limit"
                ),
            }
        }

        config
    }
}
