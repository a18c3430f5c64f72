//! Data models for the vitals pipeline.
//!
//! Inbound payloads are deserialized by the HTTP layer and resolved into a
//! [`Sample`], the one shape the aggregator understands. [`AggregateRow`] is
//! the durable per-(device, day) record.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

// ---

/// Composite key of the aggregate table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RecordKey {
    // ---
    pub device_id: String,
    pub day: String,
}

impl RecordKey {
    pub fn new(device_id: impl Into<String>, day: impl Into<String>) -> Self {
        RecordKey {
            device_id: device_id.into(),
            day: day.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.day)
    }
}

/// Current UTC calendar day, used when a payload omits `day`.
pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// One validated observation from a device.
///
/// Every measurement is optional: `None` means "not reported in this sample",
/// which is different from a reported zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Sample {
    // ---
    pub device_id: String,
    pub day: String,

    // Band (wearable) family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oxygen: Option<f64>,

    // Room (ambient) family
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co2: Option<i64>,

    // Latest-value-wins
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency: Option<bool>,
}

impl Sample {
    // ---
    pub fn new(device_id: impl Into<String>, day: impl Into<String>) -> Self {
        Sample {
            device_id: device_id.into(),
            day: day.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.device_id.clone(), self.day.clone())
    }

    pub fn has_band(&self) -> bool {
        self.steps.is_some() || self.heartrate.is_some() || self.oxygen.is_some()
    }

    pub fn has_room(&self) -> bool {
        self.humidity.is_some() || self.temperature.is_some() || self.co2.is_some()
    }

    /// Check the key and every supplied channel.
    pub fn validate(&self) -> Result<()> {
        // ---
        if self.device_id.trim().is_empty() {
            return Err(Error::validation("device_id must not be empty"));
        }
        if self.day.trim().is_empty() {
            return Err(Error::validation("day must not be empty"));
        }

        if let Some(steps) = self.steps {
            if steps < 0 {
                return Err(Error::validation(format!("steps must be >= 0, got {steps}")));
            }
        }
        if let Some(co2) = self.co2 {
            if co2 < 0 {
                return Err(Error::validation(format!("co2 must be >= 0, got {co2}")));
            }
        }

        for (name, value) in [
            ("heartrate", self.heartrate),
            ("oxygen", self.oxygen),
            ("humidity", self.humidity),
            ("temperature", self.temperature),
            ("lat", self.lat),
            ("lon", self.lon),
        ] {
            if let Some(v) = value {
                if !v.is_finite() {
                    return Err(Error::validation(format!("{name} is not a number")));
                }
            }
        }

        if let Some(lat) = self.lat {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(Error::validation(format!("lat out of range: {lat}")));
            }
        }
        if let Some(lon) = self.lon {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(Error::validation(format!("lon out of range: {lon}")));
            }
        }

        Ok(())
    }
}

fn resolve_day(day: Option<String>) -> String {
    day.unwrap_or_else(today)
}

/// Accept `true`/`false` as well as the integer encoding (0 / non-zero).
fn deserialize_flag<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    // ---
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(Option::<Flag>::deserialize(deserializer)?.map(|flag| match flag {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    }))
}

/// Body of `POST /user_location`.
#[derive(Debug, Deserialize)]
pub struct LocationPayload {
    // ---
    pub device_id: String,
    pub day: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl LocationPayload {
    pub fn into_sample(self) -> Result<Sample> {
        // ---
        let sample = Sample {
            lat: Some(self.lat),
            lon: Some(self.lon),
            ..Sample::new(self.device_id, resolve_day(self.day))
        };
        sample.validate()?;
        Ok(sample)
    }
}

/// Body of `POST /user_wrist`: the band family only.
#[derive(Debug, Deserialize)]
pub struct WristPayload {
    // ---
    pub device_id: String,
    pub day: Option<String>,
    pub steps: Option<i64>,
    pub heartrate: Option<f64>,
    pub oxygen: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub emergency: Option<bool>,
}

impl WristPayload {
    pub fn into_sample(self) -> Result<Sample> {
        // ---
        let sample = Sample {
            steps: self.steps,
            heartrate: self.heartrate,
            oxygen: self.oxygen,
            emergency: self.emergency,
            ..Sample::new(self.device_id, resolve_day(self.day))
        };
        if !sample.has_band() && sample.emergency.is_none() {
            return Err(Error::validation(
                "wrist sample must carry steps, heartrate, oxygen or emergency",
            ));
        }
        sample.validate()?;
        Ok(sample)
    }
}

/// Body of `POST /user_data`: any band and/or room channel.
#[derive(Debug, Deserialize)]
pub struct DataPayload {
    // ---
    pub device_id: String,
    pub day: Option<String>,
    pub steps: Option<i64>,
    pub heartrate: Option<f64>,
    pub oxygen: Option<f64>,
    pub humidity: Option<f64>,
    pub temperature: Option<f64>,
    pub co2: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub emergency: Option<bool>,
}

impl DataPayload {
    pub fn into_sample(self) -> Result<Sample> {
        // ---
        let sample = Sample {
            steps: self.steps,
            heartrate: self.heartrate,
            oxygen: self.oxygen,
            humidity: self.humidity,
            temperature: self.temperature,
            co2: self.co2,
            emergency: self.emergency,
            ..Sample::new(self.device_id, resolve_day(self.day))
        };
        if !sample.has_band() && !sample.has_room() && sample.emergency.is_none() {
            return Err(Error::validation("sample carries no measurements"));
        }
        sample.validate()?;
        Ok(sample)
    }
}

/// Running statistics for one device on one day.
///
/// Each averaged channel keeps its latest raw value, its running mean and the
/// number of samples that supplied it. The per-channel counts are the
/// averaging denominators; the family counters are what clients see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct AggregateRow {
    // ---
    pub device_id: String,
    pub day: String,

    pub steps: Option<i64>,
    pub avg_steps: Option<f64>,
    #[serde(skip_serializing)]
    pub steps_count: i64,

    pub heartrate: Option<f64>,
    pub avg_heartrate: Option<f64>,
    pub peak_heartrate: Option<f64>,
    #[serde(skip_serializing)]
    pub heartrate_count: i64,

    pub oxygen: Option<f64>,
    pub avg_oxygen: Option<f64>,
    #[serde(skip_serializing)]
    pub oxygen_count: i64,

    pub humidity: Option<f64>,
    pub avg_humidity: Option<f64>,
    #[serde(skip_serializing)]
    pub humidity_count: i64,

    pub temperature: Option<f64>,
    pub avg_temperature: Option<f64>,
    #[serde(skip_serializing)]
    pub temperature_count: i64,

    pub co2: Option<i64>,
    pub avg_co2: Option<f64>,
    #[serde(skip_serializing)]
    pub co2_count: i64,

    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub emergency: Option<bool>,

    pub band_records_inserted: i64,
    pub room_records_inserted: i64,
}

impl AggregateRow {
    /// Zero-initialized row for a key seen for the first time.
    pub fn empty(key: &RecordKey) -> Self {
        AggregateRow {
            device_id: key.device_id.clone(),
            day: key.day.clone(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.device_id.clone(), self.day.clone())
    }
}

/// Position projection served by `GET /locations`.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LocationRow {
    // ---
    pub device_id: String,
    pub day: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Query parameters for the read endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    // ---
    pub device_id: Option<String>,
    pub day: Option<String>,
    pub limit: Option<u32>,
}

impl RecordsQuery {
    pub const DEFAULT_LIMIT: u32 = 1000;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_day_defaults_to_today() {
        // ---
        let payload: LocationPayload =
            serde_json::from_str(r#"{"device_id":"A","lat":51.5,"lon":-0.12}"#).unwrap();
        let sample = payload.into_sample().unwrap();

        assert_eq!(sample.day, today());
        assert_eq!(sample.lat, Some(51.5));
        assert!(!sample.has_band());
        assert!(!sample.has_room());
    }

    #[test]
    fn test_explicit_day_is_kept() {
        // ---
        let payload: WristPayload =
            serde_json::from_str(r#"{"device_id":"A","day":"2025-03-26","heartrate":72}"#)
                .unwrap();
        let sample = payload.into_sample().unwrap();

        assert_eq!(sample.key(), RecordKey::new("A", "2025-03-26"));
        assert_eq!(sample.heartrate, Some(72.0));
    }

    #[test]
    fn test_emergency_accepts_int_and_bool() {
        // ---
        let as_int: WristPayload =
            serde_json::from_str(r#"{"device_id":"A","emergency":1}"#).unwrap();
        assert_eq!(as_int.emergency, Some(true));

        let as_zero: WristPayload =
            serde_json::from_str(r#"{"device_id":"A","emergency":0}"#).unwrap();
        assert_eq!(as_zero.emergency, Some(false));

        let as_bool: DataPayload =
            serde_json::from_str(r#"{"device_id":"A","emergency":true}"#).unwrap();
        assert_eq!(as_bool.emergency, Some(true));

        let absent: DataPayload =
            serde_json::from_str(r#"{"device_id":"A","co2":400}"#).unwrap();
        assert_eq!(absent.emergency, None);
    }

    #[test]
    fn test_zero_is_a_present_value() {
        // ---
        let payload: WristPayload =
            serde_json::from_str(r#"{"device_id":"A","day":"D1","steps":0}"#).unwrap();
        let sample = payload.into_sample().unwrap();

        assert_eq!(sample.steps, Some(0));
        assert!(sample.has_band());
    }

    #[test]
    fn test_empty_samples_are_rejected() {
        // ---
        let wrist: WristPayload = serde_json::from_str(r#"{"device_id":"A"}"#).unwrap();
        assert!(matches!(wrist.into_sample(), Err(Error::Validation(_))));

        let data: DataPayload = serde_json::from_str(r#"{"device_id":"A"}"#).unwrap();
        assert!(matches!(data.into_sample(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_validation_rules() {
        // ---
        let mut sample = Sample::new("A", "D1");
        assert!(sample.validate().is_ok());

        sample.steps = Some(-1);
        assert!(sample.validate().is_err());
        sample.steps = Some(10);

        sample.heartrate = Some(f64::NAN);
        assert!(sample.validate().is_err());
        sample.heartrate = Some(60.0);

        sample.lat = Some(91.0);
        assert!(sample.validate().is_err());
        sample.lat = Some(45.0);

        sample.lon = Some(-181.0);
        assert!(sample.validate().is_err());
        sample.lon = Some(-120.0);

        sample.co2 = Some(-5);
        assert!(sample.validate().is_err());
        sample.co2 = Some(415);

        assert!(sample.validate().is_ok());

        assert!(Sample::new("  ", "D1").validate().is_err());
        assert!(Sample::new("A", "").validate().is_err());
    }

    #[test]
    fn test_sample_echo_skips_absent_channels() {
        // ---
        let mut sample = Sample::new("A", "D1");
        sample.heartrate = Some(60.0);

        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["heartrate"], 60.0);
        assert!(json.get("oxygen").is_none());
        assert!(json.get("lat").is_none());
    }

    #[test]
    fn test_records_query_limit_default() {
        // ---
        assert_eq!(RecordsQuery::default().limit(), 1000);

        let q = RecordsQuery {
            limit: Some(5),
            ..Default::default()
        };
        assert_eq!(q.limit(), 5);
    }
}
