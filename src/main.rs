//! Token Scout - Main Entry Point
//!
//! Paper trading only. Live execution is rejected at startup.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use token_scout::aggregator::SharedAggregator;
use token_scout::config::Config;
use token_scout::engine::Engine;
use token_scout::persistence::TradeStore;
use token_scout::source::normalize::normalize_record;
use token_scout::source::SourceId;
use token_scout::strategy::{Scorer, SelectionGate};
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Token Scout CLI
#[derive(Parser)]
#[command(name = "token-scout")]
#[command(version, about = "Multi-source new-token discovery and paper trading")]
struct Cli {
    /// Config file name (extension optional)
    #[arg(short, long, global = true, default_value = "config")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run discovery and paper trading until interrupted (default)
    Run {
        /// Seconds between status lines
        #[arg(long, default_value = "60")]
        status_interval: u64,
    },

    /// Show closed trades from the persisted database
    Status {
        /// Path to SQLite database (default: storage.db_path from config)
        #[arg(short, long)]
        db: Option<String>,

        /// Number of recent trades to list
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Score raw records from a JSON file without trading
    Score {
        /// JSON file holding one record or an array of records
        file: PathBuf,

        /// Source the records came from
        #[arg(short, long, default_value = "dexscreener")]
        source: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load_from(&cli.config)?;

    match cli.command {
        Some(Commands::Status { db, limit }) => {
            let db = db.unwrap_or_else(|| config.storage.db_path.clone());
            show_status(&db, limit)
        }
        Some(Commands::Score { file, source }) => score_file(&config, &file, &source),
        Some(Commands::Run { status_interval }) => run(config, status_interval).await,
        None => run(config, 60).await,
    }
}

async fn run(config: Config, status_interval: u64) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.trading.mode,
        "Token Scout starting"
    );

    config.validate()?;
    log_config(&config);

    let handle = Engine::from_config(&config)?.spawn();
    let aggregator = handle.aggregator().clone();

    let mut status_tick = tokio::time::interval(Duration::from_secs(status_interval.max(1)));
    status_tick.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = status_tick.tick() => log_status(&aggregator),
        }
    }

    let summary = handle.stop().await?;
    info!(
        candidates = summary.candidates,
        open_positions = summary.open_positions,
        trades_closed = summary.trades_closed,
        available = %summary.ledger.available_capital,
        committed = %summary.ledger.committed_capital,
        realized_pnl = %summary.ledger.realized_pnl,
        daily_pnl = %summary.ledger.daily_pnl,
        "Final summary"
    );
    Ok(())
}

fn log_status(aggregator: &SharedAggregator) {
    let now = Utc::now();
    info!(candidates = aggregator.len(), "Workspace status");

    for ranked in aggregator.ranked(5, now) {
        let c = &ranked.candidate;
        info!(
            symbol = %c.symbol,
            address = %c.address,
            source = %c.source,
            overall = %ranked.score.overall_score,
            risk = %ranked.score.risk_score,
            multi_source = c.multi_source,
            "Top ranked"
        );
    }

    for c in aggregator.top_movers(3) {
        info!(
            symbol = %c.symbol,
            change_pct = %c.price_change_24h,
            "Top mover"
        );
    }
}

fn show_status(db: &str, limit: usize) -> Result<()> {
    let store = TradeStore::new(db)?;

    println!("Database: {}", db);
    println!("Accepted tokens: {}", store.accepted_count()?);
    println!("Closed trades:   {}", store.trade_count()?);
    println!("Realized PnL:    ${:.2}", store.realized_pnl()?);

    let trades = store.recent_trades(limit)?;
    if trades.is_empty() {
        return Ok(());
    }

    println!();
    println!(
        "{:<20} {:<10} {:>14} {:>14} {:>12}  {}",
        "CLOSED", "SYMBOL", "ENTRY", "EXIT", "PNL", "REASON"
    );
    for t in trades {
        println!(
            "{:<20} {:<10} {:>14} {:>14} {:>12.2}  {}",
            t.closed_at.format("%Y-%m-%d %H:%M:%S"),
            t.symbol,
            t.entry_price,
            t.price,
            t.profit_loss,
            t.exit_reason
        );
    }
    Ok(())
}

fn score_file(config: &Config, file: &Path, source: &str) -> Result<()> {
    let source: SourceId = source.parse().map_err(anyhow::Error::msg)?;
    let priority = config
        .sources
        .iter()
        .find(|(id, _)| *id == source)
        .map(|(_, s)| s.priority)
        .unwrap_or(1);

    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let records = match serde_json::from_str::<Value>(&contents)? {
        Value::Array(items) => items,
        single => vec![single],
    };

    let scorer = Scorer::new(config.scoring.weights);
    let gate = SelectionGate::new(config.selection.clone());
    let now = Utc::now();

    for raw in &records {
        let candidate = match normalize_record(source, priority, raw, now) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Skipping record");
                continue;
            }
        };
        let score = scorer.score(&candidate, now);
        let decision = gate.evaluate(&candidate, &score);
        println!("{}", serde_json::json!({
            "address": candidate.address,
            "symbol": candidate.symbol,
            "score": score,
            "decision": decision.to_string(),
        }));
    }
    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    for (id, source) in config.sources.iter() {
        info!(
            source = %id,
            enabled = source.enabled,
            priority = source.priority,
            interval_secs = source.interval_secs,
            "Source"
        );
    }
    info!(
        capital = %config.trading.initial_capital,
        max_position = %config.trading.max_position_size,
        max_positions = config.trading.max_positions,
        max_daily_loss = %config.trading.max_daily_loss,
        cooldown_minutes = config.trading.reentry_cooldown_minutes,
        "Trading limits"
    );
    info!(
        min_liquidity = %config.selection.min_liquidity,
        capacity = config.aggregator.capacity,
        window_secs = config.aggregator.confirmation_window_secs,
        "Selection"
    );
}

/// Initialize logging to stdout and an hourly rolling file.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "token-scout.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("token_scout=debug".parse()?)
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
