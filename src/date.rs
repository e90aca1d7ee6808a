//! Date normalization for schema-less documents.
//!
//! Course and activity documents come from a store that never enforced a
//! schema, so a single field such as `createdAt` may hold a timestamp object
//! (`{"seconds": ..}`), a unix number in seconds or milliseconds, an ISO
//! string, or nothing at all. [`DateValue`] records which shape was seen once,
//! at deserialization time, and [`DateValue::normalize`] turns every shape
//! into one comparable instant.
//!
//! Normalization is total: anything unrecognized resolves to the unix epoch so
//! that undated records sort as the oldest.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Numbers with a magnitude above this are read as milliseconds.
///
/// Second-precision unix times stay below this bound until the year 2286.
pub const MILLIS_THRESHOLD: f64 = 10_000_000_000.0;

/// Naive date-time layouts tried after RFC 3339 and RFC 2822.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// A date as it was found in a document.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DateValue {
    /// Null, absent, or an unrecognized shape.
    #[default]
    Missing,

    /// Unix time in seconds (timestamp objects and small numbers).
    EpochSeconds(i64),

    /// Unix time in milliseconds.
    EpochMillis(i64),

    /// Text to be parsed on normalization.
    IsoString(String),

    /// Already a native instant.
    Preparsed(DateTime<Utc>),
}

impl DateValue {
    /// Classify a bare unix number by magnitude.
    pub fn from_number(n: f64) -> Self {
        if !n.is_finite() {
            return DateValue::Missing;
        }

        if n.abs() > MILLIS_THRESHOLD {
            DateValue::EpochMillis(n as i64)
        } else {
            DateValue::EpochSeconds(n as i64)
        }
    }

    /// Classify an arbitrary JSON value.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map_or(DateValue::Missing, Self::from_number),
            Value::String(s) => DateValue::IsoString(s.clone()),
            Value::Object(map) => map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_f64)
                .filter(|s| s.is_finite())
                .map_or(DateValue::Missing, |s| DateValue::EpochSeconds(s as i64)),
            _ => DateValue::Missing,
        }
    }

    /// Resolve to a single instant. Never fails; falls back to the epoch.
    pub fn normalize(&self) -> DateTime<Utc> {
        match self {
            DateValue::Missing => epoch(),
            DateValue::EpochSeconds(secs) => secs
                .checked_mul(1000)
                .and_then(DateTime::from_timestamp_millis)
                .unwrap_or_else(epoch),
            DateValue::EpochMillis(ms) => {
                DateTime::from_timestamp_millis(*ms).unwrap_or_else(epoch)
            }
            DateValue::IsoString(raw) => parse_date_string(raw).unwrap_or_else(epoch),
            DateValue::Preparsed(dt) => *dt,
        }
    }

    /// Milliseconds since the epoch of the normalized instant.
    pub fn timestamp_millis(&self) -> i64 {
        self.normalize().timestamp_millis()
    }
}

impl From<DateTime<Utc>> for DateValue {
    fn from(dt: DateTime<Utc>) -> Self {
        DateValue::Preparsed(dt)
    }
}

impl<'de> Deserialize<'de> for DateValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(DateValue::from_json(&value))
    }
}

impl Serialize for DateValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            DateValue::Missing => serializer.serialize_none(),
            other => serializer.serialize_str(&other.normalize().to_rfc3339()),
        }
    }
}

/// The unix epoch, used as the sentinel for unusable dates.
pub fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Best-effort parse of a date string.
///
/// Accepts RFC 3339, RFC 2822, naive date-times (read as UTC) and bare
/// `YYYY-MM-DD` dates (UTC midnight).
pub fn parse_date_string(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Doc {
        #[serde(default)]
        created_at: DateValue,
    }

    #[test]
    fn test_seconds_and_millis_agree() {
        let secs = DateValue::from_number(1_700_000_000.0);
        let millis = DateValue::from_number(1_700_000_000_000.0);

        assert_eq!(secs, DateValue::EpochSeconds(1_700_000_000));
        assert_eq!(millis, DateValue::EpochMillis(1_700_000_000_000));
        assert_eq!(secs.normalize(), millis.normalize());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(
            DateValue::from_number(10_000_000_000.0),
            DateValue::EpochSeconds(10_000_000_000)
        );
        assert_eq!(
            DateValue::from_number(10_000_000_001.0),
            DateValue::EpochMillis(10_000_000_001)
        );
    }

    #[test]
    fn test_timestamp_object() {
        let doc: Doc = serde_json::from_value(json!({
            "created_at": {"seconds": 1_700_000_000, "nanoseconds": 0}
        }))
        .unwrap();
        assert_eq!(doc.created_at, DateValue::EpochSeconds(1_700_000_000));

        let doc: Doc =
            serde_json::from_value(json!({"created_at": {"_seconds": 1_700_000_000}})).unwrap();
        assert_eq!(
            doc.created_at.normalize(),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap()
        );
    }

    #[test]
    fn test_iso_strings() {
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();

        for raw in [
            "2024-03-01T12:30:00Z",
            "2024-03-01T14:30:00+02:00",
            "2024-03-01T12:30:00.000",
            "2024-03-01 12:30:00",
            "Fri, 01 Mar 2024 12:30:00 +0000",
        ] {
            assert_eq!(
                DateValue::IsoString(raw.to_string()).normalize(),
                expected,
                "{raw}"
            );
        }

        assert_eq!(
            DateValue::IsoString("2024-03-01".to_string()).normalize(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unusable_inputs_fall_back_to_epoch() {
        assert_eq!(DateValue::IsoString("not a date".into()).normalize(), epoch());
        assert_eq!(DateValue::Missing.normalize(), epoch());
        assert_eq!(DateValue::EpochSeconds(i64::MAX).normalize(), epoch());

        for raw in [json!(null), json!(true), json!([1, 2]), json!({"nanos": 5})] {
            let doc: Doc = serde_json::from_value(json!({ "created_at": raw })).unwrap();
            assert_eq!(doc.created_at, DateValue::Missing);
        }

        let doc: Doc = serde_json::from_value(json!({})).unwrap();
        assert_eq!(doc.created_at.normalize(), epoch());
    }

    #[test]
    fn test_preparsed_passes_through() {
        let now = Utc::now();
        assert_eq!(DateValue::from(now).normalize(), now);
    }

    #[test]
    fn test_serializes_normalized_instant() {
        assert_eq!(serde_json::to_value(DateValue::Missing).unwrap(), json!(null));
        assert_eq!(
            serde_json::to_value(DateValue::EpochSeconds(0)).unwrap(),
            json!("1970-01-01T00:00:00+00:00")
        );
    }
}
