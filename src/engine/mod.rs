//! Task runtime wiring feeds, the aggregator and the position manager.
//!
//! Each feed runs in its own task and writes into the shared aggregator. The
//! position manager runs its entry cycle and monitoring tick in one task so
//! the ledger has a single owner. [`EngineHandle::stop`] signals every task
//! over a watch channel and returns only after all of them have exited.

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, SharedAggregator};
use crate::config::{Config, TradingMode};
use crate::error::{ConfigError, SourceError, TradeError};
use crate::persistence::TradeStore;
use crate::risk::LedgerSnapshot;
use crate::source::{
    build_feeds, build_rate_limiter, Candidate, Feed, PollFeed, PushFeed, RateLimiter,
};
use crate::strategy::{
    DexScreenerPriceOracle, OracleChain, PaperExecutor, PositionManager, PriceOracle, ScoreResult,
    Scorer, SelectionGate, TradeExecutor, WorkspacePriceOracle,
};

/// Candidates considered per entry cycle, best ranked first.
const ENTRY_CANDIDATES: usize = 50;

/// Final state reported by the position-manager task.
#[derive(Debug, Clone, Serialize)]
pub struct EngineSummary {
    pub ledger: LedgerSnapshot,
    pub open_positions: usize,
    pub trades_closed: usize,
    pub candidates: usize,
}

/// Everything needed to start the runtime.
pub struct Engine {
    aggregator: SharedAggregator,
    limiter: Arc<RateLimiter>,
    feeds: Vec<Feed>,
    manager: PositionManager,
    store: Option<TradeStore>,
    entry_interval: Duration,
    monitor_interval: Duration,
}

impl Engine {
    pub fn new(aggregator: SharedAggregator, manager: PositionManager) -> Self {
        Self {
            aggregator,
            limiter: Arc::new(RateLimiter::new()),
            feeds: Vec::new(),
            manager,
            store: None,
            entry_interval: Duration::from_secs(15),
            monitor_interval: Duration::from_secs(10),
        }
    }

    pub fn with_feeds(mut self, feeds: Vec<Feed>) -> Self {
        self.feeds = feeds;
        self
    }

    /// Share `limiter` with the feeds. Pass the same one to any oracle
    /// calling a rate-limited source.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_store(mut self, store: TradeStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_intervals(mut self, entry: Duration, monitor: Duration) -> Self {
        self.entry_interval = entry;
        self.monitor_interval = monitor;
        self
    }

    /// Build the full runtime from configuration.
    ///
    /// Live mode needs an external signer and is rejected here.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.trading.mode == TradingMode::Live {
            return Err(ConfigError::InvalidValue {
                field: "trading.mode",
                reason: "live execution requires an external signer".to_string(),
            }
            .into());
        }

        let scorer = Scorer::new(config.scoring.weights);
        let aggregator = Aggregator::shared(&config.aggregator, scorer);
        let feeds = build_feeds(config)?;
        let limiter = Arc::new(build_rate_limiter(config));

        let dexscreener = &config.sources.dexscreener;
        let oracle: Arc<dyn PriceOracle> = Arc::new(OracleChain::new(vec![
            Arc::new(
                DexScreenerPriceOracle::new(
                    dexscreener.base_url.clone(),
                    Duration::from_secs(dexscreener.timeout_secs),
                )?
                .with_rate_limiter(Arc::clone(&limiter)),
            ),
            Arc::new(WorkspacePriceOracle::new(Arc::clone(&aggregator))),
        ]));
        let executor: Arc<dyn TradeExecutor> = Arc::new(PaperExecutor::from_config(&config.trading));

        let manager = PositionManager::new(
            &config.trading,
            scorer,
            SelectionGate::new(config.selection.clone()),
            executor,
            oracle,
            Utc::now(),
        );

        let mut engine = Self::new(aggregator, manager)
            .with_feeds(feeds)
            .with_rate_limiter(limiter)
            .with_intervals(
                Duration::from_secs(config.trading.entry_interval_secs),
                Duration::from_secs(config.trading.monitor_interval_secs),
            );

        if config.storage.enabled {
            engine = engine.with_store(TradeStore::new(&config.storage.db_path)?);
        }
        Ok(engine)
    }

    /// Spawn every task and return the handle controlling them.
    pub fn spawn(self) -> EngineHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut feed_tasks = Vec::with_capacity(self.feeds.len());

        for feed in self.feeds {
            let aggregator = Arc::clone(&self.aggregator);
            let limiter = Arc::clone(&self.limiter);
            let shutdown = shutdown_rx.clone();

            let task = match feed {
                Feed::Poll(f) => tokio::spawn(run_poll_feed(f, aggregator, limiter, shutdown)),
                Feed::Push(f) => tokio::spawn(run_push_feed(f, aggregator, limiter, shutdown)),
            };
            feed_tasks.push(task);
        }

        let manager_task = tokio::spawn(run_manager(
            self.manager,
            Arc::clone(&self.aggregator),
            self.store,
            self.entry_interval,
            self.monitor_interval,
            shutdown_rx,
        ));

        info!(feeds = feed_tasks.len(), "Engine started");

        EngineHandle {
            shutdown: shutdown_tx,
            feed_tasks,
            manager_task,
            aggregator: self.aggregator,
        }
    }
}

/// Controls a running engine.
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    feed_tasks: Vec<JoinHandle<()>>,
    manager_task: JoinHandle<EngineSummary>,
    aggregator: SharedAggregator,
}

impl EngineHandle {
    pub fn aggregator(&self) -> &SharedAggregator {
        &self.aggregator
    }

    /// Stop every task. No state changes once this returns.
    pub async fn stop(self) -> Result<EngineSummary> {
        info!("Stopping engine");
        let _ = self.shutdown.send(true);

        for task in self.feed_tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Feed task ended abnormally");
            }
        }

        let summary = self
            .manager_task
            .await
            .context("Position manager task failed")?;

        info!(
            open_positions = summary.open_positions,
            trades_closed = summary.trades_closed,
            realized_pnl = %summary.ledger.realized_pnl,
            "Engine stopped"
        );
        Ok(summary)
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn run_poll_feed(
    feed: Arc<dyn PollFeed>,
    aggregator: SharedAggregator,
    limiter: Arc<RateLimiter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = feed.descriptor().id;
    let mut ticker = tokio::time::interval(feed.descriptor().interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            _ = ticker.tick() => {}
        }

        if !limiter.check_and_consume(id) {
            debug!(error = %SourceError::RateLimited(id), "Skipping cycle");
            continue;
        }

        let batch = tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            batch = feed.poll() => batch,
        };

        // A stop may have landed while the fetch completed
        if *shutdown.borrow() {
            break;
        }
        aggregator.ingest_batch(batch);
    }

    debug!(source = %id, "Poll feed stopped");
}

async fn run_push_feed(
    feed: Arc<dyn PushFeed>,
    aggregator: SharedAggregator,
    limiter: Arc<RateLimiter>,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = feed.descriptor().id;
    let reconnect_delay = feed.descriptor().interval;

    'outer: loop {
        if *shutdown.borrow() {
            break;
        }

        if limiter.check_and_consume(id) {
            let connected = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                result = feed.connect() => result,
            };

            match connected {
                Ok(mut stream) => {
                    info!(source = %id, "Push feed connected");
                    loop {
                        let item = tokio::select! {
                            biased;
                            _ = stopped(&mut shutdown) => break 'outer,
                            item = stream.next() => item,
                        };

                        match item {
                            Some(Ok(raw)) => match feed.normalize(&raw) {
                                Ok(candidate) => {
                                    aggregator.ingest(candidate);
                                }
                                Err(e) => debug!(error = %e, "Dropped record"),
                            },
                            Some(Err(e @ SourceError::Malformed { .. })) => {
                                debug!(error = %e, "Dropped record");
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "Push feed failed, reconnecting");
                                break;
                            }
                            None => {
                                info!(source = %id, "Push feed closed, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Push feed connect failed"),
            }
        } else {
            debug!(error = %SourceError::RateLimited(id), "Skipping reconnect");
        }

        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            _ = tokio::time::sleep(reconnect_delay) => {}
        }
    }

    debug!(source = %id, "Push feed stopped");
}

async fn run_manager(
    mut manager: PositionManager,
    aggregator: SharedAggregator,
    store: Option<TradeStore>,
    entry_interval: Duration,
    monitor_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> EngineSummary {
    let mut entry_tick = tokio::time::interval(entry_interval);
    entry_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut monitor_tick = tokio::time::interval(monitor_interval);
    monitor_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut trades_closed = 0;

    loop {
        tokio::select! {
            biased;
            _ = stopped(&mut shutdown) => break,
            _ = monitor_tick.tick() => {
                for trade in manager.monitor().await {
                    trades_closed += 1;
                    if let Some(store) = &store {
                        if let Err(e) = store.record_trade(&trade) {
                            error!(error = %e, trade_id = %trade.id, "Failed to persist trade");
                        }
                    }
                }
            }
            _ = entry_tick.tick() => {
                let accepted = run_entry_cycle(&mut manager, &aggregator).await;
                if let Some(store) = &store {
                    let now = Utc::now();
                    for (candidate, score) in &accepted {
                        if let Err(e) = store.record_accepted(candidate, score, now) {
                            error!(error = %e, address = %candidate.address, "Failed to persist accepted token");
                        }
                    }
                }
            }
        }
    }

    EngineSummary {
        ledger: manager.ledger().snapshot(),
        open_positions: manager.open_count(),
        trades_closed,
        candidates: aggregator.len(),
    }
}

/// Try the best ranked candidates. Returns every candidate the gate accepted.
async fn run_entry_cycle(
    manager: &mut PositionManager,
    aggregator: &Aggregator,
) -> Vec<(Candidate, ScoreResult)> {
    let now = Utc::now();
    let mut accepted = Vec::new();

    for ranked in aggregator.ranked(ENTRY_CANDIDATES, now) {
        let candidate = ranked.candidate;
        let evaluation = manager.evaluate(&candidate, now);
        if !evaluation.decision.is_accept() {
            continue;
        }

        let entry = manager.enter_evaluated(&candidate, &evaluation, now).await;
        let address = candidate.address.clone();
        accepted.push((candidate, evaluation.score));

        match entry {
            Ok(_) => {}
            Err(TradeError::AlreadyOpen(_)) | Err(TradeError::CoolingDown(_)) => {}
            Err(
                e @ (TradeError::PositionLimit { .. }
                | TradeError::DailyLossLimit { .. }
                | TradeError::InsufficientCapital { .. }),
            ) => {
                debug!(error = %e, "Entry cycle halted");
                break;
            }
            Err(e) => warn!(error = %e, address = %address, "Entry aborted"),
        }
    }
    accepted
}
