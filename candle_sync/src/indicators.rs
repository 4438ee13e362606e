//! Ichimoku-style bands built from high/low windows.

use chrono::{DateTime, Utc};
use diesel::SqliteConnection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{AggregateResult, AggregateWindow, Aggregator},
    store::MinuteStore,
};

/// Window lengths, in minutes, for each line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IchimokuPeriods {
    pub conversion: usize,
    pub base: usize,
    pub span_b: usize,
}

impl Default for IchimokuPeriods {
    fn default() -> Self {
        Self {
            conversion: 10,
            base: 30,
            span_b: 120,
        }
    }
}

/// One value of a line, stamped with the newest minute it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinePoint {
    pub anchor_date: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IchimokuLines {
    pub conversion: Vec<LinePoint>,
    pub base: Vec<LinePoint>,
    pub span_a: Vec<LinePoint>,
    pub span_b: Vec<LinePoint>,
}

fn midpoints(windows: &[AggregateWindow]) -> Vec<LinePoint> {
    windows
        .iter()
        .map(|w| LinePoint {
            anchor_date: w.anchor_date,
            value: w.midpoint(),
        })
        .collect()
}

impl IchimokuLines {
    /// Compute `points` values of every line as of `as_of`.
    ///
    /// Span A is the pointwise mean of conversion and base and takes the
    /// conversion line's anchors.
    pub fn compute<S: MinuteStore + ?Sized>(
        store: &S,
        conn: &mut SqliteConnection,
        periods: IchimokuPeriods,
        points: usize,
        as_of: DateTime<Utc>,
    ) -> AggregateResult<Self> {
        let agg = Aggregator::new(store);
        let conversion = midpoints(&agg.get_highlow_over_time_at(conn, periods.conversion, points, as_of)?);
        let base = midpoints(&agg.get_highlow_over_time_at(conn, periods.base, points, as_of)?);
        let span_b = midpoints(&agg.get_highlow_over_time_at(conn, periods.span_b, points, as_of)?);

        let span_a = conversion
            .iter()
            .zip(&base)
            .map(|(c, b)| LinePoint {
                anchor_date: c.anchor_date,
                value: (c.value + b.value) / 2.0,
            })
            .collect();

        Ok(Self {
            conversion,
            base,
            span_a,
            span_b,
        })
    }

    /// Bare values per line, in a stable order, for plotting or JSON output.
    pub fn to_series_map(&self) -> IndexMap<&'static str, Vec<f64>> {
        let values = |line: &[LinePoint]| line.iter().map(|p| p.value).collect::<Vec<_>>();
        let mut map = IndexMap::with_capacity(4);
        map.insert("conversion", values(&self.conversion));
        map.insert("base", values(&self.base));
        map.insert("span_a", values(&self.span_a));
        map.insert("span_b", values(&self.span_b));
        map
    }
}
