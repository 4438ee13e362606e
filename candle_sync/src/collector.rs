//! Background sync loop: seed recent history once, then reconcile the latest
//! one-minute candle into the store at a fixed cadence.
//!
//! Closing prices are attributed to the *previous* minute: the close carried by
//! the candle stamped `T + 1` finalizes minute `T`. Seeding and the steady-state
//! cycle both follow that rule, so either path leaves the same closes behind.
//!
//! All writes go through one [`SqliteConnection`] behind a mutex and run on the
//! blocking pool; each seed or cycle is a single `BEGIN IMMEDIATE` transaction.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use arc_swap::ArcSwap;
use candle_source::{CandleSource, CandleTick, CandlesRequest, Period, SourceError};
use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bucket,
    store::{MinuteStore, SqliteMinuteStore, StoreError, StoreResult, UpsertOutcome},
    symbol::Symbol,
};

/// Largest seed the exchange serves in one request.
pub const DEFAULT_SEED_LIMIT: u32 = candle_source::models::request_params::MAX_CANDLES_LIMIT;

pub const DEFAULT_REFRESH: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("candle source: {0}")]
    Source(#[from] SourceError),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("blocking task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub symbol: Symbol,
    /// Delay between cycles.
    pub refresh: Duration,
    /// Candles requested when seeding.
    pub seed_limit: u32,
    /// Cycle budget; `None` runs until cancelled.
    pub cycles: Option<u64>,
}

impl CollectorConfig {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            refresh: DEFAULT_REFRESH,
            seed_limit: DEFAULT_SEED_LIMIT,
            cycles: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    #[default]
    Uninitialized,
    Seeding,
    Running,
    Stopped,
    Failed,
}

/// Point-in-time view of the loop, published after every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub seeded: bool,
    pub cycles: u64,
    pub empty_cycles: u64,
    pub skipped_cycles: u64,
    pub last_minute: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Lock-free reader side of the loop's status.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<ArcSwap<SyncStatus>>);

impl StatusHandle {
    pub fn snapshot(&self) -> Arc<SyncStatus> {
        self.0.load_full()
    }

    // Single writer, so load-modify-store cannot lose updates.
    fn publish(&self, f: impl FnOnce(&mut SyncStatus)) {
        let mut next = SyncStatus::clone(&self.0.load());
        f(&mut next);
        self.0.store(Arc::new(next));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Seeded { inserted: usize, merged: usize },
    /// The exchange had nothing; nothing was written.
    NoData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The exchange had nothing this cycle.
    Empty,
    Inserted { minute: DateTime<Utc> },
    Merged { minute: DateTime<Utc> },
}

/// Write a seed batch: upsert every candle, then attribute each close to the
/// minute before it. One immediate transaction.
pub fn apply_seed<S: MinuteStore + ?Sized>(
    conn: &mut SqliteConnection,
    store: &S,
    ticks: &[CandleTick],
) -> StoreResult<(usize, usize)> {
    conn.immediate_transaction(|conn| {
        let (mut inserted, mut merged) = (0, 0);
        for tick in ticks {
            match store.upsert(conn, tick.timestamp, tick.min, tick.max, None)? {
                UpsertOutcome::Inserted { .. } => inserted += 1,
                UpsertOutcome::Merged => merged += 1,
            }
        }
        for tick in ticks {
            store.set_closing_price(conn, bucket::previous_minute(tick.timestamp), tick.close)?;
        }
        Ok((inserted, merged))
    })
}

/// Reconcile one latest candle: its close finalizes the previous minute, its
/// min/max widen its own minute. One immediate transaction.
pub fn apply_latest<S: MinuteStore + ?Sized>(
    conn: &mut SqliteConnection,
    store: &S,
    tick: &CandleTick,
) -> StoreResult<UpsertOutcome> {
    conn.immediate_transaction(|conn| {
        store.set_closing_price(conn, bucket::previous_minute(tick.timestamp), tick.close)?;
        store.upsert(conn, tick.timestamp, tick.min, tick.max, None)
    })
}

pub struct Collector {
    source: Arc<dyn CandleSource>,
    store: SqliteMinuteStore,
    conn: Arc<Mutex<SqliteConnection>>,
    config: CollectorConfig,
    status: StatusHandle,
}

impl Collector {
    /// Bind a collector to an open, migrated connection. Registers the symbol.
    pub fn new(
        source: Arc<dyn CandleSource>,
        mut conn: SqliteConnection,
        config: CollectorConfig,
    ) -> StoreResult<Self> {
        let store = SqliteMinuteStore::open(&mut conn, &config.symbol)?;
        Ok(Self {
            source,
            store,
            conn: Arc::new(Mutex::new(conn)),
            config,
            status: StatusHandle::default(),
        })
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    pub fn store(&self) -> &SqliteMinuteStore {
        &self.store
    }

    /// Run `f` against the shared connection on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection, &SqliteMinuteStore) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let store = self.store.clone();
        let res = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard, &store)
        })
        .await
        .map_err(|e| SyncError::Task(e.to_string()))?;
        Ok(res?)
    }

    /// Seed up to `seed_limit` recent one-minute candles.
    pub async fn initialize_candles(&self) -> Result<SeedOutcome, SyncError> {
        let symbol = self.config.symbol.as_str();
        let req = CandlesRequest::new(symbol, self.config.seed_limit, Period::M1);

        let ticks = match self.source.get_candles(&req).await {
            Ok(ticks) if ticks.is_empty() => return Ok(SeedOutcome::NoData),
            Ok(ticks) => ticks,
            Err(e) if e.is_no_data() => {
                info!(%symbol, "no candles to seed from");
                return Ok(SeedOutcome::NoData);
            }
            Err(e) => return Err(e.into()),
        };

        let fetched = ticks.len();
        let (inserted, merged) = self
            .with_store(move |conn, store| apply_seed(conn, store, &ticks))
            .await?;
        info!(%symbol, fetched, inserted, merged, "seeded minute history");
        Ok(SeedOutcome::Seeded { inserted, merged })
    }

    /// Pull the latest one-minute candle and reconcile it.
    pub async fn sync_candles(&self) -> Result<CycleOutcome, SyncError> {
        let symbol = self.config.symbol.as_str();
        let req = CandlesRequest::latest_minute(symbol);

        let tick = match self.source.get_candles(&req).await {
            Ok(mut ticks) => match ticks.pop() {
                Some(tick) => tick,
                None => return Ok(CycleOutcome::Empty),
            },
            Err(e) if e.is_no_data() => {
                debug!(%symbol, "no candle this cycle");
                return Ok(CycleOutcome::Empty);
            }
            Err(e) => return Err(e.into()),
        };

        let minute = bucket::truncate_to_minute(tick.timestamp);
        let outcome = self
            .with_store(move |conn, store| apply_latest(conn, store, &tick))
            .await?;

        Ok(match outcome {
            UpsertOutcome::Inserted { .. } => {
                info!(%symbol, %minute, "new minute");
                CycleOutcome::Inserted { minute }
            }
            UpsertOutcome::Merged => {
                debug!(%symbol, %minute, "merged minute");
                CycleOutcome::Merged { minute }
            }
        })
    }

    /// Drive the loop until the cycle budget is spent or `cancel` fires.
    ///
    /// Source errors skip the cycle (and a failed seed is retried next cycle);
    /// store errors stop the loop and are returned.
    pub async fn run(&self, cancel: CancellationToken) -> Result<SyncStatus, SyncError> {
        let budget = self.config.cycles;
        let mut seeded = false;
        let mut done: u64 = 0;

        self.status.publish(|s| s.phase = SyncPhase::Seeding);

        loop {
            if cancel.is_cancelled() || budget.is_some_and(|b| done >= b) {
                break;
            }

            if !seeded {
                match self.initialize_candles().await {
                    Ok(_) => {
                        seeded = true;
                        self.status.publish(|s| {
                            s.seeded = true;
                            s.phase = SyncPhase::Running;
                        });
                    }
                    Err(SyncError::Source(e)) => {
                        warn!(error = %e, "seeding failed; retrying next cycle");
                        done += 1;
                        self.status.publish(|s| {
                            s.cycles = done;
                            s.skipped_cycles += 1;
                            s.last_error = Some(e.to_string());
                        });
                        if !self.pause(&cancel, budget, done).await {
                            break;
                        }
                        continue;
                    }
                    Err(e) => return Err(self.fail(e)),
                }
            }

            match self.sync_candles().await {
                Ok(CycleOutcome::Empty) => self.status.publish(|s| s.empty_cycles += 1),
                Ok(CycleOutcome::Inserted { minute } | CycleOutcome::Merged { minute }) => {
                    self.status.publish(|s| s.last_minute = Some(minute))
                }
                Err(SyncError::Source(e)) => {
                    warn!(error = %e, "cycle skipped");
                    self.status.publish(|s| {
                        s.skipped_cycles += 1;
                        s.last_error = Some(e.to_string());
                    });
                }
                Err(e) => return Err(self.fail(e)),
            }

            done += 1;
            self.status.publish(|s| s.cycles = done);

            if !self.pause(&cancel, budget, done).await {
                break;
            }
        }

        self.status.publish(|s| s.phase = SyncPhase::Stopped);
        info!(cycles = done, "collector stopped");
        Ok(SyncStatus::clone(&self.status.snapshot()))
    }

    /// Spawn [`Collector::run`] on the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<SyncStatus, SyncError>> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    /// Sleep until the next cycle. Returns false when the loop should stop.
    async fn pause(&self, cancel: &CancellationToken, budget: Option<u64>, done: u64) -> bool {
        if cancel.is_cancelled() || budget.is_some_and(|b| done >= b) {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.refresh) => true,
        }
    }

    fn fail(&self, e: SyncError) -> SyncError {
        error!(error = %e, "collector failed");
        let msg = e.to_string();
        self.status.publish(|s| {
            s.phase = SyncPhase::Failed;
            s.last_error = Some(msg);
        });
        e
    }
}
