//! Configuration management for the momentum scalper.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Exchange API credentials
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// Scan filter thresholds
    #[serde(default)]
    pub scanner: ScannerConfig,
    /// Signal score weights
    #[serde(default)]
    pub signal: SignalConfig,
    /// Trade execution and cycle cadence
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Round-trip fee model
    #[serde(default)]
    pub fees: FeeConfig,
    /// Kelly-driven position sizing bounds
    #[serde(default)]
    pub sizing: SizingConfig,
    /// Per-pair history and blacklisting
    #[serde(default)]
    pub history: HistoryConfig,
    /// Adaptive strategy store
    #[serde(default)]
    pub learning: LearningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub secret_key: String,
    /// Use testnet instead of production
    #[serde(default)]
    pub testnet: bool,
    /// Quote currency the universe is filtered to
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Minimum 24h volatility in percent
    #[serde(default = "default_min_volatility_pct")]
    pub min_volatility_pct: Decimal,
    /// Maximum 24h volatility in percent
    #[serde(default = "default_max_volatility_pct")]
    pub max_volatility_pct: Decimal,
    /// Maximum bid-ask spread in percent of last price
    #[serde(default = "default_max_spread_pct")]
    pub max_spread_pct: Decimal,
    /// Minimum 24h volume in USD
    #[serde(default = "default_min_volume_usd")]
    pub min_volume_usd: Decimal,
    /// Minimum absolute 24h momentum in percent
    #[serde(default = "default_min_momentum_pct")]
    pub min_momentum_pct: Decimal,
    /// Trades needed before the win-rate floor applies to a pair
    #[serde(default = "default_min_pair_trades_for_stats")]
    pub min_pair_trades_for_stats: u32,
    /// Minimum historical win rate once enough trades exist
    #[serde(default = "default_min_pair_winrate")]
    pub min_pair_winrate: Decimal,
    /// Volume level that maps to a full volume sub-score
    #[serde(default = "default_volume_norm_usd")]
    pub volume_norm_usd: Decimal,
    /// Candle interval used for trend confirmation
    #[serde(default = "default_trend_interval_minutes")]
    pub trend_interval_minutes: u32,
    /// Number of candles inspected for trend confirmation
    #[serde(default = "default_trend_candles")]
    pub trend_candles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_weight_momentum")]
    pub weight_momentum: Decimal,
    #[serde(default = "default_weight_volume")]
    pub weight_volume: Decimal,
    #[serde(default = "default_weight_spread")]
    pub weight_spread: Decimal,
    #[serde(default = "default_weight_volatility")]
    pub weight_volatility: Decimal,
    #[serde(default = "default_weight_history")]
    pub weight_history: Decimal,
    /// Composite score floor for a scan to qualify
    #[serde(default = "default_min_signal_strength")]
    pub min_signal_strength: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Base position size in USD when no better estimate exists
    #[serde(default = "default_base_position_usd")]
    pub base_position_usd: Decimal,
    /// Maximum positions dispatched per cycle
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,
    /// Hold-time clamp lower bound in seconds
    #[serde(default = "default_min_hold_seconds")]
    pub min_hold_seconds: u64,
    /// Hold time when neither scan nor override suggests one
    #[serde(default = "default_default_hold_seconds")]
    pub default_hold_seconds: u64,
    /// Hold-time clamp upper bound in seconds
    #[serde(default = "default_max_hold_seconds")]
    pub max_hold_seconds: u64,
    /// Monitoring poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Favorable move (percent) that activates the trailing stop
    #[serde(default = "default_trailing_start_pct")]
    pub trailing_start_pct: Decimal,
    /// Trailing stop offset from the best price, in percent
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: Decimal,
    /// Consecutive failed polls before a forced error exit
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Target cycle cadence in seconds
    #[serde(default = "default_cycle_seconds")]
    pub cycle_seconds: u64,
    /// Floor on the inter-cycle sleep in seconds
    #[serde(default = "default_min_cycle_sleep_secs")]
    pub min_cycle_sleep_secs: u64,
    /// Cooldown after a failed round in seconds
    #[serde(default = "default_round_cooldown_secs")]
    pub round_cooldown_secs: u64,
    /// Starting balance for paper trading
    #[serde(default = "default_paper_starting_balance")]
    pub paper_starting_balance: Decimal,
    /// TP floor in percent for calm markets where the volatility-scaled
    /// target would be too small to clear fees
    #[serde(default = "default_default_tp_pct")]
    pub default_tp_pct: Decimal,
    /// SL floor in percent for calm markets
    #[serde(default = "default_default_sl_pct")]
    pub default_sl_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Round-trip fee rate as a fraction of position size (0.004 = 0.4%).
    /// Kept in config because this number has historically moved.
    #[serde(default = "default_round_trip_rate")]
    pub round_trip_rate: Decimal,
    /// Safety buffer (percent) added on top of fees for the minimum TP
    #[serde(default = "default_fee_buffer_pct")]
    pub buffer_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Minimum position size in USD
    #[serde(default = "default_min_position_usd")]
    pub min_position_usd: Decimal,
    /// Maximum position size in USD
    #[serde(default = "default_max_position_usd")]
    pub max_position_usd: Decimal,
    /// Fractional-Kelly multiplier
    #[serde(default = "default_kelly_multiplier")]
    pub kelly_multiplier: Decimal,
    /// Hard cap on the final Kelly fraction
    #[serde(default = "default_kelly_cap")]
    pub kelly_cap: Decimal,
    /// Trades required before Kelly sizing engages
    #[serde(default = "default_min_trades_for_kelly")]
    pub min_trades_for_kelly: u64,
    /// Conservative fraction used before enough history exists
    #[serde(default = "default_default_kelly")]
    pub default_kelly: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Trades required before a pair can be blacklisted
    #[serde(default = "default_blacklist_floor_trades")]
    pub blacklist_floor_trades: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// SQLite database path for the strategy store
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Backup the store every N recorded trades
    #[serde(default = "default_backup_every")]
    pub backup_every: u64,
    /// Trades required before a pair override validates
    #[serde(default = "default_min_trades_for_override")]
    pub min_trades_for_override: u32,
    /// Win rate required before a pair override validates
    #[serde(default = "default_min_winrate_for_override")]
    pub min_winrate_for_override: Decimal,
}

// Default value functions

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_min_volatility_pct() -> Decimal {
    Decimal::new(10, 1) // 1.0%
}

fn default_max_volatility_pct() -> Decimal {
    Decimal::new(150, 1) // 15.0%
}

fn default_max_spread_pct() -> Decimal {
    Decimal::new(3, 1) // 0.3%
}

fn default_min_volume_usd() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_min_momentum_pct() -> Decimal {
    Decimal::new(5, 1) // 0.5%
}

fn default_min_pair_trades_for_stats() -> u32 {
    5
}

fn default_min_pair_winrate() -> Decimal {
    Decimal::new(40, 2) // 0.40
}

fn default_volume_norm_usd() -> Decimal {
    Decimal::new(200_000, 0)
}

fn default_trend_interval_minutes() -> u32 {
    15
}

fn default_trend_candles() -> u32 {
    4
}

fn default_weight_momentum() -> Decimal {
    Decimal::new(40, 2) // 0.40
}

fn default_weight_volume() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_weight_spread() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_weight_volatility() -> Decimal {
    Decimal::new(10, 2) // 0.10
}

fn default_weight_history() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_min_signal_strength() -> Decimal {
    Decimal::new(55, 2) // 0.55
}

fn default_base_position_usd() -> Decimal {
    Decimal::new(100, 0)
}

fn default_max_concurrent_trades() -> usize {
    3
}

fn default_min_hold_seconds() -> u64 {
    120
}

fn default_default_hold_seconds() -> u64 {
    300
}

fn default_max_hold_seconds() -> u64 {
    900
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_trailing_start_pct() -> Decimal {
    Decimal::new(8, 1) // 0.8%
}

fn default_trailing_stop_pct() -> Decimal {
    Decimal::new(4, 1) // 0.4%
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_cycle_seconds() -> u64 {
    60
}

fn default_min_cycle_sleep_secs() -> u64 {
    5
}

fn default_round_cooldown_secs() -> u64 {
    30
}

fn default_paper_starting_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_default_tp_pct() -> Decimal {
    Decimal::new(15, 1) // 1.5%
}

fn default_default_sl_pct() -> Decimal {
    Decimal::new(6, 1) // 0.6%
}

fn default_round_trip_rate() -> Decimal {
    Decimal::new(4, 3) // 0.4% round trip
}

fn default_fee_buffer_pct() -> Decimal {
    Decimal::new(2, 1) // 0.2%
}

fn default_min_position_usd() -> Decimal {
    Decimal::new(25, 0)
}

fn default_max_position_usd() -> Decimal {
    Decimal::new(500, 0)
}

fn default_kelly_multiplier() -> Decimal {
    Decimal::new(25, 2) // quarter-Kelly
}

fn default_kelly_cap() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

fn default_min_trades_for_kelly() -> u64 {
    10
}

fn default_default_kelly() -> Decimal {
    Decimal::new(25, 2) // 0.25
}

fn default_blacklist_floor_trades() -> u32 {
    8
}

fn default_db_path() -> String {
    "data/strategy.db".to_string()
}

fn default_backup_every() -> u64 {
    50
}

fn default_min_trades_for_override() -> u32 {
    5
}

fn default_min_winrate_for_override() -> Decimal {
    Decimal::new(55, 2) // 0.55
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .prefix("SCALPER"),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.scanner.min_volatility_pct < self.scanner.max_volatility_pct,
            "min_volatility_pct must be below max_volatility_pct"
        );

        anyhow::ensure!(
            self.scanner.max_spread_pct > Decimal::ZERO,
            "max_spread_pct must be positive"
        );

        anyhow::ensure!(
            self.execution.min_hold_seconds <= self.execution.max_hold_seconds,
            "min_hold_seconds must not exceed max_hold_seconds"
        );

        anyhow::ensure!(
            self.fees.round_trip_rate > Decimal::ZERO
                && self.fees.round_trip_rate <= Decimal::new(5, 2),
            "round_trip_rate must be in (0, 0.05]"
        );

        anyhow::ensure!(
            self.sizing.min_position_usd <= self.sizing.max_position_usd,
            "min_position_usd must not exceed max_position_usd"
        );

        anyhow::ensure!(
            self.execution.max_concurrent_trades >= 1,
            "max_concurrent_trades must be at least 1"
        );

        Ok(())
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            testnet: false,
            quote_asset: default_quote_asset(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            min_volatility_pct: default_min_volatility_pct(),
            max_volatility_pct: default_max_volatility_pct(),
            max_spread_pct: default_max_spread_pct(),
            min_volume_usd: default_min_volume_usd(),
            min_momentum_pct: default_min_momentum_pct(),
            min_pair_trades_for_stats: default_min_pair_trades_for_stats(),
            min_pair_winrate: default_min_pair_winrate(),
            volume_norm_usd: default_volume_norm_usd(),
            trend_interval_minutes: default_trend_interval_minutes(),
            trend_candles: default_trend_candles(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            weight_momentum: default_weight_momentum(),
            weight_volume: default_weight_volume(),
            weight_spread: default_weight_spread(),
            weight_volatility: default_weight_volatility(),
            weight_history: default_weight_history(),
            min_signal_strength: default_min_signal_strength(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            base_position_usd: default_base_position_usd(),
            max_concurrent_trades: default_max_concurrent_trades(),
            min_hold_seconds: default_min_hold_seconds(),
            default_hold_seconds: default_default_hold_seconds(),
            max_hold_seconds: default_max_hold_seconds(),
            poll_interval_secs: default_poll_interval_secs(),
            trailing_start_pct: default_trailing_start_pct(),
            trailing_stop_pct: default_trailing_stop_pct(),
            max_consecutive_errors: default_max_consecutive_errors(),
            cycle_seconds: default_cycle_seconds(),
            min_cycle_sleep_secs: default_min_cycle_sleep_secs(),
            round_cooldown_secs: default_round_cooldown_secs(),
            paper_starting_balance: default_paper_starting_balance(),
            default_tp_pct: default_default_tp_pct(),
            default_sl_pct: default_default_sl_pct(),
        }
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            round_trip_rate: default_round_trip_rate(),
            buffer_pct: default_fee_buffer_pct(),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            min_position_usd: default_min_position_usd(),
            max_position_usd: default_max_position_usd(),
            kelly_multiplier: default_kelly_multiplier(),
            kelly_cap: default_kelly_cap(),
            min_trades_for_kelly: default_min_trades_for_kelly(),
            default_kelly: default_default_kelly(),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            blacklist_floor_trades: default_blacklist_floor_trades(),
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            backup_every: default_backup_every(),
            min_trades_for_override: default_min_trades_for_override(),
            min_winrate_for_override: default_min_winrate_for_override(),
        }
    }
}
