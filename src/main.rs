//! Momentum Scalper - Main Entry Point
//!
//! Paper trading by default; live trading behind an explicit flag.

use anyhow::{bail, Result};
use clap::Parser;
use momentum_scalper::config::Config;
use momentum_scalper::engine::Engine;
use momentum_scalper::exchange::{BinanceClient, ExchangeClient, PaperExchange};
use momentum_scalper::learning::StrategyStore;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Momentum Scalper CLI
#[derive(Parser)]
#[command(name = "momentum-scalper")]
#[command(version, about = "Short-horizon momentum scalping on Binance spot")]
struct Cli {
    /// Trade with real funds instead of the paper wrapper
    #[arg(long)]
    live: bool,

    /// Base position size in quote currency
    #[arg(long)]
    position_usd: Option<Decimal>,

    /// Take-profit floor in percent
    #[arg(long)]
    tp: Option<Decimal>,

    /// Stop-loss floor in percent
    #[arg(long)]
    sl: Option<Decimal>,

    /// Minimum hold time in seconds
    #[arg(long)]
    min_hold: Option<u64>,

    /// Maximum hold time in seconds
    #[arg(long)]
    max_hold: Option<u64>,

    /// Maximum positions held concurrently per cycle
    #[arg(long)]
    max_concurrent: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging()?;

    let mut config = Config::load()?;
    apply_overrides(&mut config, &cli);
    config.validate()?;

    info!("╔══════════════════════════════════════════════╗");
    info!(
        "║        Momentum Scalper v{}                ║",
        env!("CARGO_PKG_VERSION")
    );
    info!("╚══════════════════════════════════════════════╝");
    log_config(&config);

    // Live trading without credentials must die here, not in the loop.
    if cli.live && (config.exchange.api_key.is_empty() || config.exchange.secret_key.is_empty()) {
        bail!("live mode requires SCALPER__EXCHANGE__API_KEY and SCALPER__EXCHANGE__SECRET_KEY");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Shutdown signal received, finishing the current round");
        shutdown_flag.store(true, Ordering::SeqCst);
    });

    let learning = Arc::new(StrategyStore::open(config.learning.clone())?);
    let binance = BinanceClient::new(&config.exchange)?;

    if cli.live {
        warn!("⚠️  LIVE TRADING MODE - real funds at risk");
        run_engine(Arc::new(binance), config, learning, shutdown).await
    } else {
        info!(
            balance = %config.execution.paper_starting_balance,
            "📝 Paper trading mode"
        );
        let fee_per_side = config.fees.round_trip_rate / Decimal::TWO;
        let paper = PaperExchange::new(
            binance,
            config.execution.paper_starting_balance,
            fee_per_side,
        );
        run_engine(Arc::new(paper), config, learning, shutdown).await
    }
}

async fn run_engine<C: ExchangeClient + 'static>(
    client: Arc<C>,
    config: Config,
    learning: Arc<StrategyStore>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let engine = Engine::new(client, config, learning, shutdown);
    engine.run().await
}

fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(size) = cli.position_usd {
        config.execution.base_position_usd = size;
    }
    if let Some(tp) = cli.tp {
        config.execution.default_tp_pct = tp;
    }
    if let Some(sl) = cli.sl {
        config.execution.default_sl_pct = sl;
    }
    if let Some(min_hold) = cli.min_hold {
        config.execution.min_hold_seconds = min_hold;
    }
    if let Some(max_hold) = cli.max_hold {
        config.execution.max_hold_seconds = max_hold;
    }
    if let Some(max_concurrent) = cli.max_concurrent {
        config.execution.max_concurrent_trades = max_concurrent;
    }
}

/// Stdout plus hourly rolling file logs.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;
    let file_appender = tracing_appender::rolling::hourly("logs", "momentum-scalper.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer guard alive for the life of the process.
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("momentum_scalper=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

fn log_config(config: &Config) {
    info!("📋 Configuration:");
    info!(
        "   Quote asset: {}  Max concurrent: {}  Cycle: {}s",
        config.exchange.quote_asset,
        config.execution.max_concurrent_trades,
        config.execution.cycle_seconds
    );
    info!(
        "   Volatility band: {}%-{}%  Min volume: ${}  Min signal: {}",
        config.scanner.min_volatility_pct,
        config.scanner.max_volatility_pct,
        config.scanner.min_volume_usd,
        config.signal.min_signal_strength
    );
    info!(
        "   Base size: ${}  Hold: {}s-{}s  Round-trip fee: {}%",
        config.execution.base_position_usd,
        config.execution.min_hold_seconds,
        config.execution.max_hold_seconds,
        config.fees.round_trip_rate * Decimal::ONE_HUNDRED
    );
}
