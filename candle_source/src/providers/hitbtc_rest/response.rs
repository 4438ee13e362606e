//! Wire types for the HitBTC v2 public endpoints and their conversion into
//! [`CandleTick`] / [`Ticker`].
//!
//! The exchange encodes every number as a decimal string, so parsing failures
//! surface as [`SourceError::Malformed`] rather than as transport errors.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    models::{
        candle::{CandleTick, normalize_series},
        ticker::Ticker,
    },
    providers::SourceError,
};

#[derive(Deserialize, Debug)]
pub struct HitBtcCandle {
    pub timestamp: DateTime<Utc>,
    pub open: String,
    pub close: String,
    pub min: String,
    pub max: String,
    pub volume: Option<String>,
    #[serde(rename = "volumeQuote")]
    pub volume_quote: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct HitBtcTicker {
    pub symbol: String,
    pub ask: Option<String>,
    pub bid: Option<String>,
    pub last: Option<String>,
    pub low: Option<String>,
    pub high: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize, Debug)]
pub struct HitBtcErrorDetail {
    pub code: i64,
    pub message: String,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct HitBtcErrorBody {
    pub error: HitBtcErrorDetail,
}

fn parse_price(field: &str, raw: &str) -> Result<f64, SourceError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| SourceError::Malformed(format!("{field}: not a number: {raw:?}")))
}

fn parse_opt_price(field: &str, raw: Option<&str>) -> Result<Option<f64>, SourceError> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_price(field, s).map(Some),
    }
}

impl TryFrom<HitBtcCandle> for CandleTick {
    type Error = SourceError;

    fn try_from(c: HitBtcCandle) -> Result<Self, Self::Error> {
        Ok(CandleTick {
            timestamp: c.timestamp,
            open: parse_price("open", &c.open)?,
            min: parse_price("min", &c.min)?,
            max: parse_price("max", &c.max)?,
            close: parse_price("close", &c.close)?,
            volume: parse_opt_price("volume", c.volume.as_deref())?,
        })
    }
}

/// Error message carried by a non-2xx response, falling back to the raw body.
pub fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<HitBtcErrorBody>(body) {
        Ok(b) => match b.error.description {
            Some(d) if !d.is_empty() => format!("{} ({}): {d}", b.error.message, b.error.code),
            _ => format!("{} ({})", b.error.message, b.error.code),
        },
        Err(_) if body.trim().is_empty() => "Unknown API error".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Decodes a successful candles body into validated ticks, ascending.
pub fn decode_candles(symbol: &str, body: &str) -> Result<Vec<CandleTick>, SourceError> {
    if body.trim().is_empty() {
        return Err(SourceError::NoData {
            symbol: symbol.to_string(),
        });
    }
    let raw: Vec<HitBtcCandle> = serde_json::from_str(body)
        .map_err(|e| SourceError::Malformed(format!("candles payload: {e}")))?;
    if raw.is_empty() {
        return Err(SourceError::NoData {
            symbol: symbol.to_string(),
        });
    }
    let ticks = raw
        .into_iter()
        .map(CandleTick::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    normalize_series(ticks)
}

/// Decodes a successful ticker body.
pub fn decode_ticker(symbol: &str, body: &str) -> Result<Ticker, SourceError> {
    let trimmed = body.trim();
    if trimmed.is_empty() || trimmed == "{}" || trimmed == "null" {
        return Err(SourceError::NoData {
            symbol: symbol.to_string(),
        });
    }
    let t: HitBtcTicker = serde_json::from_str(trimmed)
        .map_err(|e| SourceError::Malformed(format!("ticker payload: {e}")))?;
    let last = parse_opt_price("last", t.last.as_deref())?.ok_or_else(|| {
        SourceError::NoData {
            symbol: symbol.to_string(),
        }
    })?;
    Ok(Ticker {
        symbol: t.symbol,
        last,
        bid: parse_opt_price("bid", t.bid.as_deref())?,
        ask: parse_opt_price("ask", t.ask.as_deref())?,
        low: parse_opt_price("low", t.low.as_deref())?.unwrap_or(last),
        high: parse_opt_price("high", t.high.as_deref())?.unwrap_or(last),
        timestamp: t.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CANDLES_DESC: &str = r#"[
        {"timestamp":"2017-10-20T20:02:00.000Z","open":"0.050459","close":"0.050087","min":"0.050000","max":"0.050511","volume":"1326.628","volumeQuote":"66.555987736"},
        {"timestamp":"2017-10-20T20:01:00.000Z","open":"0.050300","close":"0.050459","min":"0.050250","max":"0.050500","volume":"10.0","volumeQuote":"0.5"}
    ]"#;

    #[test]
    fn candles_come_back_ascending() {
        let ticks = decode_candles("ETHBTC", CANDLES_DESC).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(
            ticks[0].timestamp,
            Utc.with_ymd_and_hms(2017, 10, 20, 20, 1, 0).unwrap()
        );
        assert_eq!(ticks[1].close, 0.050087);
        assert_eq!(ticks[1].min, 0.05);
        assert_eq!(ticks[1].volume, Some(1326.628));
    }

    #[test]
    fn empty_array_is_no_data() {
        assert!(decode_candles("ETHBTC", "[]").unwrap_err().is_no_data());
        assert!(decode_candles("ETHBTC", "").unwrap_err().is_no_data());
    }

    #[test]
    fn garbage_price_is_malformed() {
        let body = r#"[{"timestamp":"2017-10-20T20:02:00.000Z","open":"x","close":"1","min":"1","max":"1"}]"#;
        let err = decode_candles("ETHBTC", body).unwrap_err();
        assert!(matches!(err, SourceError::Malformed(_)));
    }

    #[test]
    fn inverted_candle_is_malformed() {
        let body = r#"[{"timestamp":"2017-10-20T20:02:00.000Z","open":"1","close":"1","min":"2","max":"1"}]"#;
        assert!(matches!(
            decode_candles("ETHBTC", body).unwrap_err(),
            SourceError::Malformed(_)
        ));
    }

    #[test]
    fn ticker_decodes_optional_book() {
        let body = r#"{"ask":"0.050043","bid":null,"last":"0.050042","open":"0.047800","low":"0.047052","high":"0.051679","volume":"36456.720","volumeQuote":"1782.625000","timestamp":"2017-05-12T14:57:19.999Z","symbol":"ETHBTC"}"#;
        let t = decode_ticker("ETHBTC", body).unwrap();
        assert_eq!(t.symbol, "ETHBTC");
        assert_eq!(t.last, 0.050042);
        assert_eq!(t.bid, None);
        assert_eq!(t.ask, Some(0.050043));
    }

    #[test]
    fn ticker_without_last_is_no_data() {
        let body = r#"{"ask":null,"bid":null,"last":null,"low":null,"high":null,"timestamp":"2017-05-12T14:57:19.999Z","symbol":"ETHBTC"}"#;
        assert!(decode_ticker("ETHBTC", body).unwrap_err().is_no_data());
    }

    #[test]
    fn error_body_is_summarized() {
        let body = r#"{"error":{"code":2001,"message":"Symbol not found","description":"Try get /api/2/public/symbol, to get list of all available symbols."}}"#;
        let msg = api_error_message(body);
        assert!(msg.starts_with("Symbol not found (2001)"));
        assert_eq!(api_error_message(""), "Unknown API error");
    }
}
