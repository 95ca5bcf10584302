//! Value generators: the seven leaf-value producers recognized by the
//! template compiler, plus the permissive option coercion they share. Each
//! generator is a nullary producer — `GeneratorFn::call` takes no state but
//! `&self`, matching the plug's notion of a "bound generator".

use std::cell::Cell;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rand::RngCore;
use serde_json::{Map, Value as Json};

use crate::objectid::ObjectId;
use crate::value::{Binary, Value};

const RANDOM_STRING_DEFAULT_LEN: usize = 12;
const RANDOM_BINARY_DEFAULT_LEN: usize = 12;

/// A bound generator, already holding whatever options its `generator_func`
/// spec supplied. Immutable except `Sequence`, whose `Cell` is mutated by
/// the single producer thread that owns the plug.
#[derive(Debug)]
pub enum GeneratorFn {
    RandomInt { min: i64, max: i64 },
    RandomString { len: usize },
    RandomBinary { len: usize },
    ObjectId,
    CurrentTimestamp,
    RandomTimestamp {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Sequence { state: Cell<f64>, step: f64 },
}

impl GeneratorFn {
    pub fn call(&self) -> Value {
        match self {
            GeneratorFn::RandomInt { min, max } => Value::Int64(random_int(*min, *max)),
            GeneratorFn::RandomString { len } => Value::String(random_string(*len)),
            GeneratorFn::RandomBinary { len } => Value::Binary(Binary::new(random_bytes(*len))),
            GeneratorFn::ObjectId => Value::ObjectId(ObjectId::generate()),
            GeneratorFn::CurrentTimestamp => Value::Timestamp(current_timestamp()),
            GeneratorFn::RandomTimestamp { start, end } => {
                Value::Timestamp(random_timestamp(*start, *end))
            }
            GeneratorFn::Sequence { state, step } => {
                let current = state.get();
                state.set(current + step);
                Value::Float64(current)
            }
        }
    }
}

fn random_int(min: i64, max: i64) -> i64 {
    if min == 0 && max == 0 {
        let mut buf = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut buf);
        return i64::from_le_bytes(buf);
    }
    if min >= max {
        // No valid half-open range was supplied; degrade to a constant
        // rather than panicking on an empty range.
        return min;
    }
    let span = (max as i128 - min as i128) as u128;
    let mut buf = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    let raw = u128::from_le_bytes(buf);
    (min as i128 + (raw % span) as i128) as i64
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

fn random_string(len: usize) -> String {
    if len == 0 {
        return String::new();
    }
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
    let encoded = URL_SAFE_NO_PAD.encode(random_bytes(len));
    encoded.chars().take(len).collect()
}

fn current_timestamp() -> DateTime<Utc> {
    // `wire_size`/the BSON encoder truncate to millisecond precision on the
    // wire; the in-memory value keeps chrono's native precision until then.
    Utc::now()
}

fn random_timestamp(start: DateTime<Utc>, end: DateTime<Utc>) -> DateTime<Utc> {
    let span_ms = (end - start).num_milliseconds().max(1) as u64;
    let mut buf = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    let offset_ms = u64::from_le_bytes(buf) % span_ms;
    start + chrono::Duration::milliseconds(offset_ms as i64)
}

/// Parses one of the ISO-8601 forms accepted by `RandomTimestamp`. Returns
/// `None` when the string matches none of them.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M") {
        return Some(Utc.from_utc_datetime(&ndt));
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&nd.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Coerces a numeric option that may have arrived as either a JSON integer
/// or float token. Logs and falls back to `None` (caller applies the
/// default) for anything else, including a present but mistyped key.
pub fn coerce_i64(map: &Map<String, Json>, key: &str) -> Option<i64> {
    match map.get(key) {
        None => None,
        Some(v) => match v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)) {
            Some(n) => Some(n),
            None => {
                log::warn!("option '{}' is not numeric, using default", key);
                None
            }
        },
    }
}

pub fn coerce_u64(map: &Map<String, Json>, key: &str) -> Option<u64> {
    match map.get(key) {
        None => None,
        Some(v) => match v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)) {
            Some(n) => Some(n),
            None => {
                log::warn!("option '{}' is not numeric, using default", key);
                None
            }
        },
    }
}

pub fn coerce_f64(map: &Map<String, Json>, key: &str) -> Option<f64> {
    match map.get(key) {
        None => None,
        Some(v) => match v.as_f64().or_else(|| v.as_i64().map(|i| i as f64)) {
            Some(n) => Some(n),
            None => {
                log::warn!("option '{}' is not numeric, using default", key);
                None
            }
        },
    }
}

pub fn coerce_str<'a>(map: &'a Map<String, Json>, key: &str) -> Option<&'a str> {
    match map.get(key) {
        None => None,
        Some(Json::String(s)) => Some(s.as_str()),
        Some(_) => {
            log::warn!("option '{}' is not a string, using default", key);
            None
        }
    }
}

/// Builds a generator from a `generator_func` spec's name and sibling
/// options. Returns `None` for an unrecognized name (compiler falls back to
/// treating the object as literal data) and `Some(None)` when the name is
/// recognized but the options make it unbuildable (currently only
/// `RandomTimestamp`).
pub fn build(name: &str, options: &Map<String, Json>) -> Option<Option<GeneratorFn>> {
    match name {
        "RandomInt" => {
            let min = coerce_i64(options, "min").unwrap_or(i64::MIN);
            let max = coerce_i64(options, "max").unwrap_or(i64::MAX);
            if !(min == 0 && max == 0) && min >= max {
                log::warn!(
                    "RandomInt min ({}) >= max ({}); this field will always stamp to {}",
                    min,
                    max,
                    min
                );
            }
            Some(Some(GeneratorFn::RandomInt { min, max }))
        }
        "RandomString" => {
            let len = coerce_u64(options, "len").unwrap_or(RANDOM_STRING_DEFAULT_LEN as u64);
            Some(Some(GeneratorFn::RandomString { len: len as usize }))
        }
        "RandomBinary" => {
            let len = coerce_u64(options, "len").unwrap_or(RANDOM_BINARY_DEFAULT_LEN as u64);
            Some(Some(GeneratorFn::RandomBinary { len: len as usize }))
        }
        "ObjectId" => Some(Some(GeneratorFn::ObjectId)),
        "CurrentTimestamp" => Some(Some(GeneratorFn::CurrentTimestamp)),
        "RandomTimestamp" => {
            let start = coerce_str(options, "start_ts").and_then(parse_iso8601);
            let end = coerce_str(options, "end_ts").and_then(parse_iso8601);
            match (start, end) {
                (Some(start), Some(end)) if end > start => {
                    Some(Some(GeneratorFn::RandomTimestamp { start, end }))
                }
                _ => {
                    log::warn!(
                        "RandomTimestamp range is unparsable or empty (start_ts={:?}, end_ts={:?}); falling back to literal",
                        options.get("start_ts"),
                        options.get("end_ts"),
                    );
                    Some(None)
                }
            }
        }
        "Sequence" => {
            let start = coerce_f64(options, "start").unwrap_or(0.0);
            let step = coerce_f64(options, "step").unwrap_or(1.0);
            Some(Some(GeneratorFn::Sequence {
                state: Cell::new(start),
                step,
            }))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_int_respects_half_open_range() {
        for _ in 0..200 {
            let v = random_int(5, 10);
            assert!((5..10).contains(&v));
        }
    }

    #[test]
    fn random_int_full_range_sentinel() {
        // Just exercises both branches; full i64 range can't be asserted
        // directly without statistical testing.
        let _ = random_int(0, 0);
    }

    #[test]
    fn random_int_degenerate_range_returns_min() {
        assert_eq!(random_int(10, 10), 10);
        assert_eq!(random_int(10, 5), 10);
    }

    #[test]
    fn random_string_exact_length() {
        for len in [0, 1, 5, 12, 64] {
            assert_eq!(random_string(len).chars().count(), len);
        }
    }

    #[test]
    fn sequence_increments_from_start() {
        let gen = GeneratorFn::Sequence {
            state: Cell::new(0.0),
            step: 2.0,
        };
        let values: Vec<f64> = (0..4)
            .map(|_| match gen.call() {
                Value::Float64(f) => f,
                _ => panic!("expected float"),
            })
            .collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn parse_iso8601_accepts_all_documented_forms() {
        assert!(parse_iso8601("2021-01-01").is_some());
        assert!(parse_iso8601("2021-01-01T10:30").is_some());
        assert!(parse_iso8601("2021-01-01T10:30:00").is_some());
        assert!(parse_iso8601("2021-01-01T10:30:00Z").is_some());
        assert!(parse_iso8601("not a date").is_none());
    }

    #[test]
    fn build_unrecognized_name_returns_none() {
        let options = Map::new();
        assert!(build("NoSuchFunc", &options).is_none());
    }

    #[test]
    fn build_random_timestamp_falls_back_when_end_before_start() {
        let mut options = Map::new();
        options.insert("start_ts".into(), Json::String("2021-01-02".into()));
        options.insert("end_ts".into(), Json::String("2021-01-01".into()));
        assert_eq!(build("RandomTimestamp", &options).map(|g| g.is_none()), Some(true));
    }
}
