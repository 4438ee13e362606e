#![allow(dead_code)]

use std::{collections::VecDeque, path::PathBuf, sync::Mutex};

use async_trait::async_trait;
use candle_source::{CandleSource, CandleTick, CandlesRequest, SourceError, Ticker};
use candle_sync::{
    db::{connection, migrate},
    store::SqliteMinuteStore,
    symbol::Symbol,
};
use chrono::{DateTime, TimeZone, Utc};
use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

/// Migrated database plus a store bound to `BTCUSD`.
pub fn setup_store() -> (TestDb, SqliteConnection, SqliteMinuteStore) {
    let (db, mut conn) = setup_db();
    let store = SqliteMinuteStore::open(&mut conn, &symbol("BTCUSD")).expect("open store");
    (db, conn, store)
}

pub fn symbol(s: &str) -> Symbol {
    s.parse().expect("symbol")
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal"); // WAL is persistent per DB file

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

/// 2024-05-01 at `h:m` UTC.
pub fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
}

pub fn tick(ts: DateTime<Utc>, min: f64, max: f64, close: f64) -> CandleTick {
    CandleTick {
        timestamp: ts,
        open: min,
        min,
        max,
        close,
        volume: None,
    }
}

/// Replays queued responses in order, then reports no data forever.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<CandleTick>, SourceError>>>,
    pub requests: Mutex<Vec<CandlesRequest>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<Vec<CandleTick>, SourceError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn no_data() -> SourceError {
    SourceError::NoData {
        symbol: "BTCUSD".into(),
    }
}

#[async_trait]
impl CandleSource for ScriptedSource {
    async fn get_candles(&self, req: &CandlesRequest) -> Result<Vec<CandleTick>, SourceError> {
        self.requests.lock().unwrap().push(req.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(no_data()))
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, SourceError> {
        Err(SourceError::NoData {
            symbol: symbol.to_string(),
        })
    }
}
