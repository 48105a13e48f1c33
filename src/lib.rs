//! Momentum scalper: an autonomous short-horizon trading engine.
//!
//! Each cycle scans every tradable pair concurrently, ranks the scored
//! opportunities, passes the best through a fee- and regime-aware risk
//! gate, and runs one independent monitoring task per opened position
//! until take-profit, stop-loss, trailing stop, timeout, or the error
//! ceiling closes it. Settlements feed rolling performance metrics,
//! per-pair history, and a SQLite strategy store that suggests overrides
//! for future trades.

pub mod config;
pub mod engine;
pub mod exchange;
pub mod learning;
pub mod stats;
pub mod utils;

pub use config::Config;
