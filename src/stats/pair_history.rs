//! Per-pair trade history: win rates, loss streaks, and blacklisting.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::config::HistoryConfig;

/// Mutable history for one instrument. Created lazily on first settlement,
/// never deleted, only flagged.
#[derive(Debug, Clone, Default)]
pub struct PairStats {
    pub trade_count: u32,
    /// Incremental average: wr_n = wr_{n-1} * (n-1)/n + outcome/n.
    pub win_rate: Decimal,
    pub loss_streak: u32,
    pub blacklisted: bool,
    pub total_pnl: Decimal,
}

/// Synchronized repository over the per-pair stats map.
///
/// Scanners consume a `snapshot()` taken at cycle start and never hold the
/// lock; settlement is the only writer. A scan acting on a stale snapshot
/// costs at most one extra low-confidence scan, which is accepted.
pub struct PairHistoryStore {
    config: HistoryConfig,
    /// Win rate below `0.5 * min_pair_winrate` triggers blacklisting.
    min_pair_winrate: Decimal,
    inner: Mutex<HashMap<String, PairStats>>,
}

impl PairHistoryStore {
    pub fn new(config: HistoryConfig, min_pair_winrate: Decimal) -> Self {
        Self {
            config,
            min_pair_winrate,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Clone the current stats map for lock-free reads during a scan cycle.
    pub fn snapshot(&self) -> HashMap<String, PairStats> {
        self.inner.lock().expect("pair history lock poisoned").clone()
    }

    /// Record one settled trade outcome for a pair.
    pub fn record(&self, pair: &str, is_win: bool, net_pnl: Decimal) {
        let mut map = self.inner.lock().expect("pair history lock poisoned");
        let stats = map.entry(pair.to_string()).or_default();

        stats.trade_count += 1;
        let n = Decimal::from(stats.trade_count);
        let outcome = if is_win { Decimal::ONE } else { Decimal::ZERO };
        stats.win_rate = stats.win_rate * (n - Decimal::ONE) / n + outcome / n;

        if is_win {
            stats.loss_streak = 0;
        } else {
            stats.loss_streak += 1;
        }
        stats.total_pnl += net_pnl;

        let threshold = self.min_pair_winrate * Decimal::new(5, 1);
        let should_blacklist =
            stats.trade_count >= self.config.blacklist_floor_trades && stats.win_rate < threshold;

        if should_blacklist && !stats.blacklisted {
            warn!(
                %pair,
                trades = stats.trade_count,
                win_rate = %stats.win_rate,
                "Pair blacklisted for persistent losses"
            );
        }
        stats.blacklisted = should_blacklist;

        info!(
            %pair,
            trades = stats.trade_count,
            win_rate = %stats.win_rate,
            loss_streak = stats.loss_streak,
            total_pnl = %stats.total_pnl,
            "Pair history updated"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store() -> PairHistoryStore {
        PairHistoryStore::new(
            HistoryConfig {
                blacklist_floor_trades: 4,
            },
            dec!(0.40),
        )
    }

    #[test]
    fn test_win_rate_incremental_average() {
        let store = store();
        store.record("BTCUSDT", true, dec!(1));
        store.record("BTCUSDT", false, dec!(-1));
        store.record("BTCUSDT", true, dec!(1));

        let snap = store.snapshot();
        let stats = &snap["BTCUSDT"];
        assert_eq!(stats.trade_count, 3);
        // 2 wins out of 3
        assert!((stats.win_rate - dec!(0.6667)).abs() < dec!(0.001));
        assert_eq!(stats.total_pnl, dec!(1));
    }

    #[test]
    fn test_win_rate_stays_in_unit_interval() {
        let store = store();
        for _ in 0..20 {
            store.record("X", true, dec!(1));
        }
        let wr = store.snapshot()["X"].win_rate;
        assert!(wr >= Decimal::ZERO && wr <= Decimal::ONE);

        for _ in 0..40 {
            store.record("X", false, dec!(-1));
        }
        let wr = store.snapshot()["X"].win_rate;
        assert!(wr >= Decimal::ZERO && wr <= Decimal::ONE);
    }

    #[test]
    fn test_blacklist_flips_exactly_at_floor_and_threshold() {
        let store = store();
        // Threshold is 0.5 * 0.40 = 0.20. Three straight losses: wr = 0,
        // but trade_count < 4, so no blacklist yet.
        store.record("DOGE", false, dec!(-1));
        store.record("DOGE", false, dec!(-1));
        store.record("DOGE", false, dec!(-1));
        assert!(!store.snapshot()["DOGE"].blacklisted);

        // Fourth loss reaches the floor with wr 0 < 0.20.
        store.record("DOGE", false, dec!(-1));
        assert!(store.snapshot()["DOGE"].blacklisted);
    }

    #[test]
    fn test_winning_pair_never_blacklisted() {
        let store = store();
        for _ in 0..10 {
            store.record("ETH", true, dec!(2));
        }
        let stats = &store.snapshot()["ETH"];
        assert!(!stats.blacklisted);
        assert_eq!(stats.loss_streak, 0);
    }

    #[test]
    fn test_loss_streak_resets_on_win() {
        let store = store();
        store.record("SOL", false, dec!(-1));
        store.record("SOL", false, dec!(-1));
        assert_eq!(store.snapshot()["SOL"].loss_streak, 2);
        store.record("SOL", true, dec!(3));
        assert_eq!(store.snapshot()["SOL"].loss_streak, 0);
    }
}
