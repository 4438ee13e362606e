use candle_sync::aggregate::{AggregateError, Aggregator};
use candle_sync::indicators::{IchimokuLines, IchimokuPeriods};
use candle_sync::store::MinuteStore;
use chrono::Duration;

mod common;

use common::at;

/// Minutes 09:00..09:09, min/max [100,101], [99,103], ... each ingested twice.
fn ingest_morning(
    conn: &mut diesel::SqliteConnection,
    store: &candle_sync::store::SqliteMinuteStore,
) -> Vec<(f64, f64)> {
    let mut merged = Vec::new();
    for m in 0..10u32 {
        let lo = 100.0 - m as f64;
        let hi = 101.0 + 2.0 * m as f64;
        store.upsert(conn, at(9, m), lo + 0.5, hi - 0.5, None).unwrap();
        store.upsert(conn, at(9, m), lo, hi, None).unwrap();
        merged.push((lo, hi));
    }
    merged
}

#[test]
fn minmax_over_ten_minutes_end_to_end() {
    let (_db, mut conn, store) = common::setup_store();
    let merged = ingest_morning(&mut conn, &store);
    let agg = Aggregator::new(&store);
    let as_of = at(9, 9) + Duration::seconds(30);

    let got = agg.get_minmax_over_time_at(&mut conn, 10, as_of).unwrap();
    assert_eq!(got.len(), 10);
    for (i, rec) in got.iter().enumerate() {
        assert_eq!(rec.timestamp, at(9, i as u32));
        assert_eq!((rec.min, rec.max), merged[i]);
    }

    let err = agg.get_minmax_over_time_at(&mut conn, 11, as_of).unwrap_err();
    assert!(matches!(
        err,
        AggregateError::InsufficientHistory {
            required: 11,
            available: 10
        }
    ));
}

#[test]
fn minmax_on_empty_store_is_no_data() {
    let (_db, mut conn, store) = common::setup_store();
    let err = Aggregator::new(&store)
        .get_minmax_over_time_at(&mut conn, 5, at(9, 9))
        .unwrap_err();
    assert!(matches!(err, AggregateError::NoData));
}

#[test]
fn highlow_boundaries_against_stored_series() {
    let (_db, mut conn, store) = common::setup_store();
    let merged = ingest_morning(&mut conn, &store);
    let agg = Aggregator::new(&store);
    let as_of = at(9, 9);

    // 10 records, window 4: 7 windows need exactly 10.
    let windows = agg.get_highlow_over_time_at(&mut conn, 4, 7, as_of).unwrap();
    assert_eq!(windows.len(), 7);
    for (s, w) in windows.iter().enumerate() {
        let slice = &merged[s..s + 4];
        assert_eq!(w.min, slice.iter().map(|p| p.0).fold(f64::INFINITY, f64::min));
        assert_eq!(w.max, slice.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max));
        assert_eq!(w.anchor_date, at(9, (s + 3) as u32));
    }

    // One more window needs 11.
    let err = agg.get_highlow_over_time_at(&mut conn, 4, 8, as_of).unwrap_err();
    assert!(matches!(
        err,
        AggregateError::InsufficientHistory {
            required: 11,
            available: 10
        }
    ));

    assert!(matches!(
        agg.get_highlow_over_time_at(&mut conn, 0, 3, as_of),
        Err(AggregateError::InvalidWindow { .. })
    ));
}

#[test]
fn closing_series_is_anchored_in_the_past() {
    let (_db, mut conn, store) = common::setup_store();
    for m in 0..10u32 {
        store
            .upsert(&mut conn, at(9, m), 1.0, 2.0, Some(m as f64))
            .unwrap();
    }
    let agg = Aggregator::new(&store);

    // not_before = 09:10 - (3 + 2) = 09:05
    let closes = agg
        .get_closing_prices_over_time_at(&mut conn, 3, 2, at(9, 10))
        .unwrap();
    assert_eq!(
        closes,
        vec![(at(9, 5), 5.0), (at(9, 6), 6.0), (at(9, 7), 7.0)]
    );

    // not_before = 09:10 - 12 = 08:58; only 09:00.. exist but that is still 10 rows.
    let err = agg
        .get_closing_prices_over_time_at(&mut conn, 12, 0, at(9, 10))
        .unwrap_err();
    assert!(matches!(
        err,
        AggregateError::InsufficientHistory {
            required: 12,
            available: 10
        }
    ));
}

#[test]
fn ichimoku_lines_share_length() {
    let (_db, mut conn, store) = common::setup_store();
    for m in 0..40u32 {
        let ts = at(9, 0) + Duration::minutes(m as i64);
        store
            .upsert(&mut conn, ts, 100.0 + m as f64, 110.0 + m as f64, None)
            .unwrap();
    }
    let periods = IchimokuPeriods {
        conversion: 5,
        base: 10,
        span_b: 20,
    };
    let as_of = at(9, 0) + Duration::minutes(39);
    let lines = IchimokuLines::compute(&store, &mut conn, periods, 15, as_of).unwrap();

    assert_eq!(lines.conversion.len(), 15);
    assert_eq!(lines.base.len(), 15);
    assert_eq!(lines.span_a.len(), 15);
    assert_eq!(lines.span_b.len(), 15);
    for i in 0..15 {
        let want = (lines.conversion[i].value + lines.base[i].value) / 2.0;
        assert_eq!(lines.span_a[i].value, want);
    }

    // Default span B needs 120 + 15 - 1 minutes.
    let err = IchimokuLines::compute(&store, &mut conn, IchimokuPeriods::default(), 15, as_of)
        .unwrap_err();
    assert!(matches!(err, AggregateError::InsufficientHistory { .. }));
}

#[test]
fn oversized_windows_are_rejected_without_panicking() {
    let (_db, mut conn, store) = common::setup_store();
    ingest_morning(&mut conn, &store);
    let agg = Aggregator::new(&store);
    let as_of = at(9, 0);

    assert!(matches!(
        agg.get_highlow_over_time_at(&mut conn, 1_000_000_000_000, 1, as_of),
        Err(AggregateError::InvalidWindow { .. })
    ));
    assert!(matches!(
        agg.get_highlow_over_time_at(&mut conn, usize::MAX, usize::MAX, as_of),
        Err(AggregateError::InvalidWindow { .. })
    ));
    assert!(matches!(
        agg.get_minmax_over_time_at(&mut conn, usize::MAX, as_of),
        Err(AggregateError::InvalidWindow { .. })
    ));
    assert!(matches!(
        agg.get_closing_prices_over_time_at(&mut conn, 5, usize::MAX, as_of),
        Err(AggregateError::InvalidWindow { .. })
    ));
    assert!(matches!(
        IchimokuLines::compute(
            &store,
            &mut conn,
            IchimokuPeriods {
                conversion: usize::MAX,
                base: 30,
                span_b: 120,
            },
            5,
            as_of,
        ),
        Err(AggregateError::InvalidWindow { .. })
    ));
}
