//! Trade statistics: aggregate performance and per-pair history.

mod pair_history;
mod performance;

pub use pair_history::{PairHistoryStore, PairStats};
pub use performance::{PerformanceSnapshot, PerformanceTracker};
