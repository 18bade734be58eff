use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// a leaf value inside a structured reading (e.g. one gps field)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

/// the value of one measurement
/// examples:
/// - 21.5
/// - "calibrating"
/// - {"latitude": 41.15, "longitude": -8.61, "fix_type": "3D"}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Number(f64),
    Text(String),
    Fields(BTreeMap<String, Scalar>),
}

/// one named measurement produced by a sensor or the gps
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub name: String,
    pub value: ReadingValue,
}

impl Reading {
    pub fn new(name: impl Into<String>, value: impl Into<ReadingValue>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    /// structured reading built from (field, value) pairs
    pub fn fields<K, V, I>(name: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        let map = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self { name: name.into(), value: ReadingValue::Fields(map) }
    }
}

/// one cycle's merged snapshot: every reading keyed by name plus `timestamp`
///
/// serializes as a flat json object, which is the shape the trip api expects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, ReadingValue>,
}

impl Record {
    pub const TIMESTAMP: &'static str = "timestamp";

    /// fold readings into a record in the order given, then stamp it.
    ///
    /// a name seen twice keeps the later value and logs a warning. the
    /// timestamp is written last so it can never be shadowed by a reading.
    pub fn merge<I>(readings: I, at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = Reading>,
    {
        let mut fields = BTreeMap::new();
        for reading in readings {
            if fields.insert(reading.name.clone(), reading.value).is_some() {
                tracing::warn!("[MERGE] Reading '{}' reported twice this cycle, keeping the last one", reading.name);
            }
        }
        if fields.contains_key(Self::TIMESTAMP) {
            tracing::warn!("[MERGE] A reading named 'timestamp' was overwritten by the record timestamp");
        }
        fields.insert(Self::TIMESTAMP.to_string(), ReadingValue::Text(iso_timestamp(at)));
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&ReadingValue> {
        self.fields.get(key)
    }

    pub fn timestamp(&self) -> Option<&str> {
        match self.fields.get(Self::TIMESTAMP) {
            Some(ReadingValue::Text(ts)) => Some(ts),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// ISO-8601, UTC, second precision, `Z` suffix
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(v)
    }
}

impl From<u32> for Scalar {
    fn from(v: u32) -> Self {
        Scalar::Number(v as f64)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

impl From<f64> for ReadingValue {
    fn from(v: f64) -> Self {
        ReadingValue::Number(v)
    }
}

impl From<f32> for ReadingValue {
    fn from(v: f32) -> Self {
        ReadingValue::Number(v as f64)
    }
}

impl From<&str> for ReadingValue {
    fn from(v: &str) -> Self {
        ReadingValue::Text(v.to_string())
    }
}

impl From<String> for ReadingValue {
    fn from(v: String) -> Self {
        ReadingValue::Text(v)
    }
}

impl From<BTreeMap<String, Scalar>> for ReadingValue {
    fn from(v: BTreeMap<String, Scalar>) -> Self {
        ReadingValue::Fields(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(iso_timestamp(at()), "2024-05-17T09:30:05Z");
    }

    #[test]
    fn test_merge_keys_readings_by_name() {
        let gps = Reading::fields("gps", [("lat", 0.0), ("lon", 0.0)]);
        let record = Record::merge(
            vec![gps, Reading::new("temp", 20.0), Reading::new("humidity", 55.0)],
            at(),
        );

        let keys: Vec<&str> = record.keys().collect();
        assert_eq!(keys, vec!["gps", "humidity", "temp", "timestamp"]);
        assert_eq!(record.get("temp"), Some(&ReadingValue::Number(20.0)));
        assert_eq!(record.timestamp(), Some("2024-05-17T09:30:05Z"));
    }

    #[test]
    fn test_merge_last_write_wins() {
        let record = Record::merge(
            vec![Reading::new("noise", 40.0), Reading::new("noise", 42.0)],
            at(),
        );
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("noise"), Some(&ReadingValue::Number(42.0)));
    }

    #[test]
    fn test_timestamp_cannot_be_shadowed() {
        let record = Record::merge(vec![Reading::new("timestamp", "bogus")], at());
        assert_eq!(record.timestamp(), Some("2024-05-17T09:30:05Z"));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let readings = || vec![Reading::new("temp", 20.0), Reading::new("light", "dark")];
        assert_eq!(Record::merge(readings(), at()), Record::merge(readings(), at()));
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = Record::merge(
            vec![Reading::fields("gps", [("fix_type", "3D")]), Reading::new("temp", 20.5)],
            at(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "gps": {"fix_type": "3D"},
                "temp": 20.5,
                "timestamp": "2024-05-17T09:30:05Z"
            })
        );
    }
}
