//! Runtime-configurable parameters for the ragged all-to-all engine.
//!
//! All values have sensible defaults. Override via environment variables
//! (prefixed `RAGGED_A2A_`) or by constructing a custom `EngineConfig`.

use std::time::Duration;

/// Tuning and safety switches for the engine and the host backend.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Check every computed send/recv slice against its buffer extent before
    /// handing it to the backend.
    pub bounds_check: bool,

    /// Register payload buffers with backends that ask for it.
    pub register_buffers: bool,

    /// Receive timeout used by the in-process host backend.
    pub host_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bounds_check: true,
            register_buffers: true,
            host_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `RAGGED_A2A_BOUNDS_CHECK` (`0`/`1`/`true`/`false`)
    /// - `RAGGED_A2A_REGISTER_BUFFERS` (`0`/`1`/`true`/`false`)
    /// - `RAGGED_A2A_HOST_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("RAGGED_A2A_BOUNDS_CHECK") {
            if let Some(b) = parse_flag(&v) {
                cfg.bounds_check = b;
            }
        }
        if let Ok(v) = std::env::var("RAGGED_A2A_REGISTER_BUFFERS") {
            if let Some(b) = parse_flag(&v) {
                cfg.register_buffers = b;
            }
        }
        if let Ok(v) = std::env::var("RAGGED_A2A_HOST_TIMEOUT_SECS") {
            if let Ok(s) = v.parse::<u64>() {
                cfg.host_timeout = Duration::from_secs(s);
            }
        }

        cfg
    }
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
