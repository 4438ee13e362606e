use chrono::{DateTime, Utc};
use diesel::{SqliteConnection, prelude::*};
use roaring::RoaringBitmap;
use tracing::debug;

use crate::{
    bucket::{self, end_minute_exclusive, minute_id, minute_start_utc},
    models::{MinuteRecord, MinuteRow, NewMinuteRow, NewPendingClose},
    store::{CloseAttribution, MinuteStore, StoreError, StoreResult, UpsertOutcome, ensure_schema},
    symbol::{Symbol, SymbolHandle},
    tz,
};

use crate::schema::minute_record::dsl as mr;
use crate::schema::pending_close::dsl as pc;

/// SQLite-backed [`MinuteStore`] bound to one registered symbol.
#[derive(Debug, Clone)]
pub struct SqliteMinuteStore {
    handle: SymbolHandle,
}

impl SqliteMinuteStore {
    /// Wrap an already registered symbol.
    pub fn new(handle: SymbolHandle) -> Self {
        Self { handle }
    }

    /// Run migrations, register `symbol` and bind a store to it.
    pub fn open(conn: &mut SqliteConnection, symbol: &Symbol) -> StoreResult<Self> {
        Ok(Self::new(ensure_schema(conn, symbol)?))
    }
}

fn check_record(ts: DateTime<Utc>, min: f64, max: f64) -> StoreResult<()> {
    if !min.is_finite() || !max.is_finite() || min > max {
        return Err(StoreError::InvalidRecord {
            timestamp: ts,
            min,
            max,
        });
    }
    Ok(())
}

fn check_price(ts: DateTime<Utc>, price: f64) -> StoreResult<()> {
    if !price.is_finite() {
        return Err(StoreError::InvalidPrice {
            timestamp: ts,
            price,
        });
    }
    Ok(())
}

fn parse_date(date: String) -> StoreResult<DateTime<Utc>> {
    tz::parse_ts_to_utc(&date).map_err(|_| StoreError::CorruptTimestamp(date))
}

/// Minute key as stored: truncated, RFC-3339 millis.
fn minute_key(ts: DateTime<Utc>) -> String {
    tz::to_rfc3339_millis(bucket::truncate_to_minute(ts))
}

impl MinuteStore for SqliteMinuteStore {
    fn handle(&self) -> &SymbolHandle {
        &self.handle
    }

    fn upsert(
        &self,
        conn: &mut SqliteConnection,
        ts: DateTime<Utc>,
        min: f64,
        max: f64,
        closing_price: Option<f64>,
    ) -> StoreResult<UpsertOutcome> {
        check_record(ts, min, max)?;
        if let Some(p) = closing_price {
            check_price(ts, p)?;
        }
        let sid = self.handle.id;
        let key = minute_key(ts);

        conn.transaction::<_, StoreError, _>(|conn| {
            let existing = mr::minute_record
                .filter(mr::symbol_id.eq(sid))
                .filter(mr::date.eq(key.as_str()))
                .select(MinuteRow::as_select())
                .first(conn)
                .optional()?;

            if let Some(row) = existing {
                let merged = MinuteRecord::try_from(row)?.merge(min, max, closing_price);
                diesel::update(
                    mr::minute_record
                        .filter(mr::symbol_id.eq(sid))
                        .filter(mr::date.eq(key.as_str())),
                )
                .set((
                    mr::min.eq(merged.min),
                    mr::max.eq(merged.max),
                    mr::closing_price.eq(merged.closing_price),
                ))
                .execute(conn)?;
                debug!(symbol = %self.handle.symbol, date = %key, min = merged.min, max = merged.max, "merged minute");
                return Ok(UpsertOutcome::Merged);
            }

            // A close that arrived before its minute is moved onto the new row.
            let pending: Option<f64> = pc::pending_close
                .filter(pc::symbol_id.eq(sid))
                .filter(pc::date.eq(key.as_str()))
                .select(pc::price)
                .first(conn)
                .optional()?;
            if pending.is_some() {
                diesel::delete(
                    pc::pending_close
                        .filter(pc::symbol_id.eq(sid))
                        .filter(pc::date.eq(key.as_str())),
                )
                .execute(conn)?;
            }

            let row = NewMinuteRow {
                symbol_id: sid,
                date: &key,
                min,
                max,
                closing_price: closing_price.or(pending),
            };
            diesel::insert_into(mr::minute_record)
                .values(&row)
                .execute(conn)?;

            let deferred_close_applied = closing_price.is_none() && pending.is_some();
            debug!(symbol = %self.handle.symbol, date = %key, deferred_close_applied, "inserted minute");
            Ok(UpsertOutcome::Inserted {
                deferred_close_applied,
            })
        })
    }

    fn set_closing_price(
        &self,
        conn: &mut SqliteConnection,
        ts: DateTime<Utc>,
        price: f64,
    ) -> StoreResult<CloseAttribution> {
        check_price(ts, price)?;
        let sid = self.handle.id;
        let key = minute_key(ts);

        conn.transaction::<_, StoreError, _>(|conn| {
            let updated = diesel::update(
                mr::minute_record
                    .filter(mr::symbol_id.eq(sid))
                    .filter(mr::date.eq(key.as_str())),
            )
            .set(mr::closing_price.eq(Some(price)))
            .execute(conn)?;

            if updated > 0 {
                return Ok(CloseAttribution::Applied);
            }

            let row = NewPendingClose {
                symbol_id: sid,
                date: &key,
                price,
            };
            diesel::insert_into(pc::pending_close)
                .values(&row)
                .on_conflict((pc::symbol_id, pc::date))
                .do_update()
                .set(pc::price.eq(price))
                .execute(conn)?;
            debug!(symbol = %self.handle.symbol, date = %key, price, "deferred closing price");
            Ok(CloseAttribution::Deferred)
        })
    }

    fn exists(&self, conn: &mut SqliteConnection, ts: DateTime<Utc>) -> StoreResult<bool> {
        let key = minute_key(ts);
        let found = diesel::select(diesel::dsl::exists(
            mr::minute_record
                .filter(mr::symbol_id.eq(self.handle.id))
                .filter(mr::date.eq(key.as_str())),
        ))
        .get_result::<bool>(conn)?;
        Ok(found)
    }

    fn get(
        &self,
        conn: &mut SqliteConnection,
        ts: DateTime<Utc>,
    ) -> StoreResult<Option<MinuteRecord>> {
        let key = minute_key(ts);
        mr::minute_record
            .filter(mr::symbol_id.eq(self.handle.id))
            .filter(mr::date.eq(key.as_str()))
            .select(MinuteRow::as_select())
            .first(conn)
            .optional()?
            .map(MinuteRecord::try_from)
            .transpose()
    }

    fn latest(&self, conn: &mut SqliteConnection) -> StoreResult<Option<MinuteRecord>> {
        mr::minute_record
            .filter(mr::symbol_id.eq(self.handle.id))
            .order(mr::date.desc())
            .select(MinuteRow::as_select())
            .first(conn)
            .optional()?
            .map(MinuteRecord::try_from)
            .transpose()
    }

    fn range_query(
        &self,
        conn: &mut SqliteConnection,
        not_before: DateTime<Utc>,
        not_after: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<MinuteRecord>> {
        if let Some(not_after) = not_after {
            if not_after < not_before {
                return Err(StoreError::InvalidRange {
                    not_before,
                    not_after,
                });
            }
        }

        let lo = tz::to_rfc3339_millis(not_before);
        let base = mr::minute_record
            .filter(mr::symbol_id.eq(self.handle.id))
            .filter(mr::date.ge(lo));

        let rows: Vec<MinuteRow> = match not_after {
            Some(not_after) => base
                .filter(mr::date.le(tz::to_rfc3339_millis(not_after)))
                .order(mr::date.asc())
                .select(MinuteRow::as_select())
                .load(conn)?,
            None => base
                .order(mr::date.asc())
                .select(MinuteRow::as_select())
                .load(conn)?,
        };

        rows.into_iter().map(MinuteRecord::try_from).collect()
    }

    fn closing_prices(
        &self,
        conn: &mut SqliteConnection,
        not_before: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<(DateTime<Utc>, f64)>> {
        let rows: Vec<(String, Option<f64>)> = mr::minute_record
            .filter(mr::symbol_id.eq(self.handle.id))
            .filter(mr::date.ge(tz::to_rfc3339_millis(not_before)))
            .filter(mr::closing_price.is_not_null())
            .order(mr::date.asc())
            .limit(limit)
            .select((mr::date, mr::closing_price))
            .load(conn)?;

        rows.into_iter()
            .filter_map(|(date, close)| close.map(|c| (date, c)))
            .map(|(date, close)| Ok((parse_date(date)?, close)))
            .collect()
    }

    fn coverage_gaps(
        &self,
        conn: &mut SqliteConnection,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        if to <= from {
            return Ok(vec![]);
        }

        // Roaring is u32; minute ids since the Unix epoch fit for the next few millennia.
        let start_id = u32::try_from(minute_id(from)).map_err(|_| StoreError::BucketOverflow)?;
        let end_id =
            u32::try_from(end_minute_exclusive(to)).map_err(|_| StoreError::BucketOverflow)?;
        if end_id <= start_id {
            return Ok(vec![]);
        }

        let mut window = RoaringBitmap::new();
        window.insert_range(start_id..end_id);

        let dates: Vec<String> = mr::minute_record
            .filter(mr::symbol_id.eq(self.handle.id))
            .filter(mr::date.ge(tz::to_rfc3339_millis(minute_start_utc(start_id as u64))))
            .filter(mr::date.lt(tz::to_rfc3339_millis(minute_start_utc(end_id as u64))))
            .select(mr::date)
            .load(conn)?;

        let mut present = RoaringBitmap::new();
        for date in dates {
            let id = u32::try_from(minute_id(parse_date(date)?))
                .map_err(|_| StoreError::BucketOverflow)?;
            present.insert(id);
        }

        let missing = &window - &present;
        Ok(coalesce_runs_to_utc_ranges(&missing))
    }
}

fn coalesce_runs_to_utc_ranges(rb: &RoaringBitmap) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut out = Vec::new();
    let mut it = rb.iter();
    if let Some(mut run_start) = it.next() {
        let mut prev = run_start;
        for x in it {
            if x == prev + 1 {
                prev = x;
                continue;
            }
            // close [run_start, prev] -> [start_utc, end_utc_exclusive]
            out.push((
                minute_start_utc(run_start as u64),
                minute_start_utc((prev as u64) + 1),
            ));
            run_start = x;
            prev = x;
        }
        out.push((
            minute_start_utc(run_start as u64),
            minute_start_utc((prev as u64) + 1),
        ));
    }
    out
}
