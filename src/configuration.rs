//! Config for the server behaviors
//!
//! This module provides configuration options for the listener, the worker pool, the computer
//! opponents and the wire limits.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! The following environment variables can be used to override configuration values. All
//! values are optional. Unparsable values are ignored with a warning.
//!
//! - `C4_BIND_ADDR`: Address to listen on (default: `127.0.0.1:4444`)
//! - `C4_LOG`: Log to a timestamped file instead of stdout, `"true"` to enable (default: `false`)
//! - `C4_CONTROL_WORKERS`: Threads handling join/leave/rematch messages (default: CPU count, 2 to 8)
//! - `C4_MINIMAX_DEPTH`: Search depth of the unpruned minimax opponent (default: `4`)
//! - `C4_ALPHA_BETA_DEPTH`: Search depth of the alpha-beta opponent (default: `6`)
//! - `C4_MAX_FRAME_LEN`: Largest accepted frame in bytes (default: `65536`)
//! - `C4_ACCEPT_POLL_MS`: Listener polling interval in milliseconds (default: `10`)
//! - `C4_REMATCH_TIMEOUT_SECS`: How long a finished game waits for rematch answers (default: `120`)
//! - `C4_WRITE_TIMEOUT_MS`: How long a write to a client may block before the client is dropped (default: `5000`)
//! - `C4_CHAT_QUEUE_LEN`: Chat messages buffered toward one player before new ones are dropped (default: `64`)

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;

use anyhow::bail;
use tracing::warn;

/// Configuration for server behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) log: bool,
    pub(crate) control_workers: usize,
    pub(crate) minimax_depth: usize,
    pub(crate) alpha_beta_depth: usize,
    pub(crate) max_frame_len: usize,
    pub(crate) accept_poll_interval: Duration,
    pub(crate) rematch_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) chat_queue_len: usize,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - The server listens on `127.0.0.1:4444`.
    /// - Logs go to stdout.
    /// - One control worker per CPU, at least 2 and at most 8.
    /// - Minimax searches 4 plies, alpha-beta 6.
    /// - Frames are limited to 64 KiB.
    /// - A finished game waits two minutes for rematch answers.
    /// - A client that does not read for 5 seconds while the server writes to it is dropped.
    /// - At most 64 chat messages wait for delivery to one player.
    pub fn new() -> Self {
        Self {
            bind_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 4444)),
            log: false,
            control_workers: num_cpus::get().clamp(2, 8),
            minimax_depth: 4,
            alpha_beta_depth: 6,
            max_frame_len: 64 * 1024,
            accept_poll_interval: Duration::from_millis(10),
            rematch_timeout: Duration::from_secs(120),
            write_timeout: Duration::from_secs(5),
            chat_queue_len: 64,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the recognized variables. Any unset variable keeps
    /// its default value.
    pub fn from_env() -> Self {
        fn parse_env<T: FromStr>(var: &str) -> Option<T> {
            let raw = std::env::var(var).ok()?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("ignoring {var}={raw:?}: not a valid value");
                    None
                }
            }
        }

        fn get_env_flag(var: &str, default: bool) -> bool {
            match std::env::var(var) {
                Ok(val) => val.eq_ignore_ascii_case("true"),
                Err(_) => default,
            }
        }

        let default = Self::new();
        Self {
            bind_addr: parse_env("C4_BIND_ADDR").unwrap_or(default.bind_addr),
            log: get_env_flag("C4_LOG", default.log),
            control_workers: parse_env("C4_CONTROL_WORKERS").unwrap_or(default.control_workers),
            minimax_depth: parse_env("C4_MINIMAX_DEPTH").unwrap_or(default.minimax_depth),
            alpha_beta_depth: parse_env("C4_ALPHA_BETA_DEPTH").unwrap_or(default.alpha_beta_depth),
            max_frame_len: parse_env("C4_MAX_FRAME_LEN").unwrap_or(default.max_frame_len),
            accept_poll_interval: parse_env("C4_ACCEPT_POLL_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.accept_poll_interval),
            rematch_timeout: parse_env("C4_REMATCH_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.rematch_timeout),
            write_timeout: parse_env("C4_WRITE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.write_timeout),
            chat_queue_len: parse_env("C4_CHAT_QUEUE_LEN").unwrap_or(default.chat_queue_len),
        }
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.control_workers == 0 {
            bail!("control_workers must be > 0");
        }
        if self.minimax_depth == 0 {
            bail!("minimax_depth must be > 0");
        }
        if self.alpha_beta_depth == 0 {
            bail!("alpha_beta_depth must be > 0");
        }
        if self.max_frame_len == 0 {
            bail!("max_frame_len must be > 0");
        }
        if self.accept_poll_interval.is_zero() {
            bail!("accept_poll_interval must be > 0");
        }
        if self.write_timeout.is_zero() {
            bail!("write_timeout must be > 0");
        }
        if self.chat_queue_len == 0 {
            bail!("chat_queue_len must be > 0");
        }
        Ok(())
    }

    /// Address the listener binds to. Port `0` picks a free port.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Number of threads dispatching control messages.
    pub fn with_control_workers(mut self, workers: usize) -> Self {
        self.control_workers = workers;
        self
    }

    /// Search depth of the unpruned minimax opponent.
    pub fn with_minimax_depth(mut self, depth: usize) -> Self {
        self.minimax_depth = depth;
        self
    }

    /// Search depth of the alpha-beta opponent.
    pub fn with_alpha_beta_depth(mut self, depth: usize) -> Self {
        self.alpha_beta_depth = depth;
        self
    }

    /// Largest frame accepted or sent, in bytes.
    pub fn with_max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    /// How often the listener checks for new clients and for a stop request.
    pub fn with_accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// How long a finished game waits for every player to ask for a rematch.
    pub fn with_rematch_timeout(mut self, timeout: Duration) -> Self {
        self.rematch_timeout = timeout;
        self
    }

    /// Longest a single write to a client may block. A client that stays behind longer is
    /// treated as disconnected.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Chat messages buffered toward one player. Further messages are dropped until the
    /// player catches up.
    pub fn with_chat_queue_len(mut self, len: usize) -> Self {
        self.chat_queue_len = len;
        self
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    pub fn log(&self) -> bool {
        self.log
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Configuration::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.minimax_depth, 4);
        assert_eq!(config.alpha_beta_depth, 6);
        assert!((2..=8).contains(&config.control_workers));
    }

    #[test]
    fn test_builder_overrides() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = Configuration::new()
            .with_bind_addr(addr)
            .with_control_workers(3)
            .with_rematch_timeout(Duration::from_secs(5));
        assert_eq!(config.bind_addr(), addr);
        assert_eq!(config.control_workers, 3);
        assert_eq!(config.rematch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_depth_is_rejected() {
        let err = Configuration::new().with_minimax_depth(0).validate().unwrap_err();
        assert_eq!(err.to_string(), "minimax_depth must be > 0");
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        assert!(Configuration::new()
            .with_control_workers(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_zero_write_timeout_is_rejected() {
        let err = Configuration::new()
            .with_write_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "write_timeout must be > 0");
    }
}
