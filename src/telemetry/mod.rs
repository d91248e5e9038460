//! Telemetry module for logging and metrics.
//!
//! Provides:
//! - Logging configuration and initialization
//! - Counters for relay decisions and per-port traffic

mod logging;
mod metrics;

pub use logging::{init_logging, is_valid_level, parse_level, LogConfig, LogFormat};
pub use metrics::{Counter, Gauge, PortStats, ProxyStats};
