//! Field-name normalization across heterogeneous feed payloads.
//!
//! Feeds disagree on naming (`mint` vs `address` vs `baseToken.address`),
//! on numeric encoding (numbers vs strings, scientific notation) and on
//! timestamp units (seconds, milliseconds, RFC 3339). Every lookup here takes
//! an ordered list of dotted paths and returns the first usable value.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use super::types::{Candidate, SourceId};
use crate::error::{SourceError, SourceResult};

/// Values above this are treated as millisecond epochs.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub const ADDRESS_FIELDS: &[&str] = &[
    "address",
    "mint",
    "tokenAddress",
    "token_address",
    "baseToken.address",
    "ca",
];
pub const SYMBOL_FIELDS: &[&str] = &["symbol", "baseToken.symbol", "ticker"];
pub const NAME_FIELDS: &[&str] = &["name", "baseToken.name", "tokenName"];
pub const PRICE_FIELDS: &[&str] = &["priceUsd", "price_usd", "price", "priceUSD"];
pub const LIQUIDITY_FIELDS: &[&str] = &["liquidity.usd", "liquidityUsd", "liquidity"];
pub const VOLUME_FIELDS: &[&str] = &[
    "volume.h24",
    "volume24h",
    "volume_24h",
    "v24hUSD",
    "volume24hUSD",
];
pub const PRICE_CHANGE_FIELDS: &[&str] = &[
    "priceChange.h24",
    "priceChange24h",
    "price_change_24h",
    "v24hChangePercent",
];
pub const MARKET_CAP_FIELDS: &[&str] = &["marketCap", "market_cap", "mc", "fdv", "usdMarketCap"];
pub const CREATED_AT_FIELDS: &[&str] = &[
    "pairCreatedAt",
    "createdAt",
    "created_at",
    "liquidityAddedAt",
    "created_timestamp",
    "timestamp",
];

/// Resolve a dotted path (`"liquidity.usd"`) inside a JSON value.
pub fn lookup<'a>(raw: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(raw, |node, key| node.get(key))
        .filter(|v| !v.is_null())
}

/// First non-empty string among the candidate paths.
pub fn first_str(raw: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(raw, path)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// First decimal among the candidate paths, accepting numbers or numeric strings.
pub fn first_decimal(raw: &Value, paths: &[&str]) -> Option<Decimal> {
    paths
        .iter()
        .find_map(|path| lookup(raw, path).and_then(value_to_decimal))
}

/// First timestamp among the candidate paths.
pub fn first_timestamp(raw: &Value, paths: &[&str]) -> Option<DateTime<Utc>> {
    paths
        .iter()
        .find_map(|path| lookup(raw, path).and_then(value_to_timestamp))
}

/// Parse a JSON number or string as a decimal.
pub fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .or_else(|| n.as_f64().and_then(Decimal::from_f64))
        }
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Parse an epoch (seconds or milliseconds) or an RFC 3339 string.
pub fn value_to_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(epoch_to_datetime),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(epoch) = s.parse::<i64>() {
                return epoch_to_datetime(epoch);
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        }
        _ => None,
    }
}

fn epoch_to_datetime(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch <= 0 {
        return None;
    }
    if epoch >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(epoch).single()
    } else {
        Utc.timestamp_opt(epoch, 0).single()
    }
}

/// Normalize one raw record into a candidate using the shared field variants.
///
/// Only a missing address rejects the record; every other field degrades to
/// its zero value. A creation time in the future is clamped to `now`.
pub fn normalize_record(
    source: SourceId,
    priority: u8,
    raw: &Value,
    now: DateTime<Utc>,
) -> SourceResult<Candidate> {
    let address = first_str(raw, ADDRESS_FIELDS)
        .ok_or_else(|| SourceError::malformed(source, "record has no address"))?;

    let created_at = first_timestamp(raw, CREATED_AT_FIELDS)
        .map(|ts| ts.min(now))
        .unwrap_or(now);

    let candidate = Candidate::new(address, source, priority)
        .discovered(now)
        .with_created_at(created_at)
        .with_symbol(first_str(raw, SYMBOL_FIELDS).unwrap_or_default())
        .with_name(first_str(raw, NAME_FIELDS).unwrap_or_default())
        .with_price(non_negative(first_decimal(raw, PRICE_FIELDS)))
        .with_liquidity(non_negative(first_decimal(raw, LIQUIDITY_FIELDS)))
        .with_volume_24h(non_negative(first_decimal(raw, VOLUME_FIELDS)))
        .with_price_change_24h(first_decimal(raw, PRICE_CHANGE_FIELDS).unwrap_or_default())
        .with_market_cap(non_negative(first_decimal(raw, MARKET_CAP_FIELDS)))
        .with_raw(raw.clone());

    Ok(candidate)
}

fn non_negative(value: Option<Decimal>) -> Decimal {
    value.unwrap_or_default().max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_path() {
        let raw = json!({"liquidity": {"usd": 1234.5}});
        assert_eq!(first_decimal(&raw, LIQUIDITY_FIELDS), Some(dec!(1234.5)));
    }

    #[test]
    fn test_decimal_from_string_and_scientific() {
        assert_eq!(value_to_decimal(&json!("0.00042")), Some(dec!(0.00042)));
        assert_eq!(value_to_decimal(&json!(" 12 ")), Some(dec!(12)));
        assert_eq!(value_to_decimal(&json!("1e-4")), Some(dec!(0.0001)));
        assert_eq!(value_to_decimal(&json!("n/a")), None);
        assert_eq!(value_to_decimal(&json!(true)), None);
    }

    #[test]
    fn test_timestamp_units() {
        let secs = value_to_timestamp(&json!(1_700_000_000)).unwrap();
        let millis = value_to_timestamp(&json!(1_700_000_000_000i64)).unwrap();
        let rfc = value_to_timestamp(&json!("2023-11-14T22:13:20Z")).unwrap();
        assert_eq!(secs, millis);
        assert_eq!(secs, rfc);
        assert!(value_to_timestamp(&json!(0)).is_none());
    }

    #[test]
    fn test_normalize_dexscreener_shape() {
        let now = Utc::now();
        let raw = json!({
            "baseToken": {"address": "So1Mint", "symbol": "CAT", "name": "Cat Coin"},
            "priceUsd": "0.0021",
            "liquidity": {"usd": 42000},
            "volume": {"h24": 99000.5},
            "priceChange": {"h24": -12.5},
            "fdv": 210000
        });

        let c = normalize_record(SourceId::DexScreener, 2, &raw, now).unwrap();
        assert_eq!(c.address, "So1Mint");
        assert_eq!(c.symbol, "CAT");
        assert_eq!(c.price, dec!(0.0021));
        assert_eq!(c.liquidity, dec!(42000));
        assert_eq!(c.volume_24h, dec!(99000.5));
        assert_eq!(c.price_change_24h, dec!(-12.5));
        assert_eq!(c.market_cap, dec!(210000));
        assert_eq!(c.created_at, now);
        assert!(c.raw_metadata.contains_key(&SourceId::DexScreener));
    }

    #[test]
    fn test_missing_address_is_malformed() {
        let raw = json!({"symbol": "NOPE", "price": 1});
        let err = normalize_record(SourceId::Birdeye, 3, &raw, Utc::now()).unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));

        let blank = json!({"address": "   "});
        assert!(normalize_record(SourceId::Birdeye, 3, &blank, Utc::now()).is_err());
    }

    #[test]
    fn test_future_created_at_is_clamped() {
        let now = Utc::now();
        let future = (now + chrono::Duration::hours(2)).timestamp();
        let raw = json!({"mint": "M1", "createdAt": future});
        let c = normalize_record(SourceId::PumpPortal, 1, &raw, now).unwrap();
        assert_eq!(c.created_at, now);
    }
}
