//! Per-minute time-series store (SQLite).
//!
//! The portable surface is [`MinuteStore`]; the SQLite implementation lives in
//! `repo.rs`. Every method takes the caller's connection so several calls can
//! share one transaction.
use chrono::{DateTime, Utc};
use diesel::{SqliteConnection, prelude::*};
use thiserror::Error;

use crate::{
    db::migrate,
    models::MinuteRecord,
    schema::tracked_symbol,
    symbol::{Symbol, SymbolHandle},
};

mod repo;

pub use repo::SqliteMinuteStore;

/// Errors raised by the store. All of them are fatal to the sync loop.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Diesel(#[from] diesel::result::Error),

    #[error("could not open database: {0}")]
    Connection(#[from] diesel::ConnectionError),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("invalid range: not_after {not_after} is before not_before {not_before}")]
    InvalidRange {
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
    },

    #[error("invalid record at {timestamp}: min={min} max={max}")]
    InvalidRecord {
        timestamp: DateTime<Utc>,
        min: f64,
        max: f64,
    },

    #[error("invalid closing price at {timestamp}: {price}")]
    InvalidPrice { timestamp: DateTime<Utc>, price: f64 },

    #[error("corrupt timestamp in store: {0}")]
    CorruptTimestamp(String),

    #[error("minute bucket id does not fit in 32 bits")]
    BucketOverflow,

    #[error("store connection lock poisoned")]
    Poisoned,
}

/// Result type used throughout the store.
pub type StoreResult<T> = Result<T, StoreError>;

/// What [`MinuteStore::upsert`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was created. `deferred_close_applied` is true when a
    /// pending closing price was moved onto it.
    Inserted { deferred_close_applied: bool },
    /// An existing record was widened in place.
    Merged,
}

/// What [`MinuteStore::set_closing_price`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAttribution {
    Applied,
    /// The minute has no record yet; the price waits in `pending_close`.
    Deferred,
}

pub trait MinuteStore {
    /// The symbol this store is bound to.
    fn handle(&self) -> &SymbolHandle;

    /// Insert the minute containing `ts`, or merge into the existing record:
    /// min/max widen, a provided closing price overwrites.
    fn upsert(
        &self,
        conn: &mut SqliteConnection,
        ts: DateTime<Utc>,
        min: f64,
        max: f64,
        closing_price: Option<f64>,
    ) -> StoreResult<UpsertOutcome>;

    /// Set the closing price of an existing minute, or defer it until that minute appears.
    fn set_closing_price(
        &self,
        conn: &mut SqliteConnection,
        ts: DateTime<Utc>,
        price: f64,
    ) -> StoreResult<CloseAttribution>;

    fn exists(&self, conn: &mut SqliteConnection, ts: DateTime<Utc>) -> StoreResult<bool>;

    fn get(
        &self,
        conn: &mut SqliteConnection,
        ts: DateTime<Utc>,
    ) -> StoreResult<Option<MinuteRecord>>;

    /// Most recent record, if any.
    fn latest(&self, conn: &mut SqliteConnection) -> StoreResult<Option<MinuteRecord>>;

    /// Records in `[not_before, not_after]`, ascending. `None` means no upper bound.
    fn range_query(
        &self,
        conn: &mut SqliteConnection,
        not_before: DateTime<Utc>,
        not_after: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<MinuteRecord>>;

    /// Up to `limit` known closing prices from `not_before` on, ascending.
    fn closing_prices(
        &self,
        conn: &mut SqliteConnection,
        not_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<(DateTime<Utc>, f64)>>;

    /// Minute ranges in `[from, to)` with no record, as `(start, end_exclusive)` runs.
    fn coverage_gaps(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<(DateTime<Utc>, DateTime<Utc>)>>;
}

/// Bring the schema up to date and register `symbol`. Idempotent.
pub fn ensure_schema(conn: &mut SqliteConnection, symbol: &Symbol) -> StoreResult<SymbolHandle> {
    migrate::run_pending(conn)?;

    diesel::insert_into(tracked_symbol::table)
        .values(tracked_symbol::code.eq(symbol.as_str()))
        .on_conflict(tracked_symbol::code)
        .do_nothing()
        .execute(conn)?;

    let id: i32 = tracked_symbol::table
        .filter(tracked_symbol::code.eq(symbol.as_str()))
        .select(tracked_symbol::id)
        .first(conn)?;

    Ok(SymbolHandle {
        id,
        symbol: symbol.clone(),
    })
}
