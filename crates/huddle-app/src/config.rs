//! Runtime configuration.

use std::time::Duration;

use huddle_client::TYPING_IDLE_TIMEOUT;
use huddle_core::{ConnectionConfig, ReconnectPolicy};

/// How often the runtime ticks timers (heartbeat, typing, reconnect).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the [`Runtime`](crate::Runtime) needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Backend address handed to [`Driver::connect`](crate::Driver::connect)
    pub server_addr: String,
    /// Timer resolution
    pub tick_interval: Duration,
    /// Link timeouts and heartbeat
    pub connection: ConnectionConfig,
    /// Automatic reconnect behaviour
    pub reconnect: ReconnectPolicy,
    /// Idle time before the debouncer signals "stopped typing"
    pub typing_idle: Duration,
}

impl RuntimeConfig {
    /// Defaults for `server_addr`.
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self { server_addr: server_addr.into(), ..Self::default() }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:4433".to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            connection: ConnectionConfig::default(),
            reconnect: ReconnectPolicy::default(),
            typing_idle: TYPING_IDLE_TIMEOUT,
        }
    }
}
