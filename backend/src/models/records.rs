//! Raw record shapes as returned by the remote Nightscout service.
//!
//! Records are modelled as a closed tagged union with explicit optional fields.
//! Numeric fields are parsed leniently: a number or a numeric string is
//! accepted, anything else becomes `None`, so one malformed row never fails a
//! whole batch.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// One raw record from the event feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum RawRecord {
    /// Glucose entry (`entries.json`)
    Entry(RawEntry),
    /// Treatment (`treatments.json`)
    Treatment(RawTreatment),
}

/// Glucose entry record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Epoch milliseconds
    #[serde(default, deserialize_with = "lenient_i64")]
    pub date: Option<i64>,
    #[serde(default, rename = "dateString", deserialize_with = "lenient_string")]
    pub date_string: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sgv: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub mbg: Option<f64>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub entry_type: Option<String>,
}

/// Treatment record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTreatment {
    #[serde(default, deserialize_with = "lenient_string")]
    pub created_at: Option<String>,
    /// Alternate timestamp field some uploaders use (RFC 3339 or epoch ms).
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
    #[serde(default, rename = "eventType", deserialize_with = "lenient_string")]
    pub event_type: Option<String>,
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub treatment_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub insulin: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbs: Option<f64>,
    /// Minutes
    #[serde(default, deserialize_with = "lenient_f64")]
    pub duration: Option<f64>,
    /// Absolute temp basal rate, units/hour
    #[serde(default, deserialize_with = "lenient_f64")]
    pub absolute: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub notes: Option<String>,
    #[serde(default, rename = "enteredBy", deserialize_with = "lenient_string")]
    pub entered_by: Option<String>,
    #[serde(default, rename = "entered by", deserialize_with = "lenient_string")]
    pub entered_by_alt: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub automatic: Option<bool>,
}

/// Profile document (`profile.json`). Only the default store is used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProfile {
    #[serde(default, rename = "_id", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    #[serde(default, rename = "defaultProfile", deserialize_with = "lenient_string")]
    pub default_profile: Option<String>,
    #[serde(default, rename = "startDate", deserialize_with = "lenient_string")]
    pub start_date: Option<String>,
    #[serde(default)]
    pub store: HashMap<String, RawProfileStore>,
}

/// Named store inside a profile document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawProfileStore {
    #[serde(default)]
    pub basal: Vec<RawBasalSegment>,
}

/// One basal segment of a profile store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBasalSegment {
    /// `HH:MM`
    #[serde(default, deserialize_with = "lenient_string")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub value: Option<f64>,
    #[serde(default, rename = "timeAsSeconds", deserialize_with = "lenient_f64")]
    pub time_as_seconds: Option<f64>,
}

fn value_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64).map(|v| v as i64))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Bool(b)) => Some(b),
        Some(serde_json::Value::String(s)) => s.trim().parse::<bool>().ok(),
        _ => None,
    })
}

/// Parse an `entries.json` payload.
///
/// The payload must be a JSON array; individual rows never fail.
pub fn parse_entries(json: &str) -> serde_json::Result<Vec<RawRecord>> {
    let rows: Vec<RawEntry> = serde_json::from_str(json)?;
    Ok(rows.into_iter().map(RawRecord::Entry).collect())
}

/// Parse a `treatments.json` payload.
pub fn parse_treatments(json: &str) -> serde_json::Result<Vec<RawRecord>> {
    let rows: Vec<RawTreatment> = serde_json::from_str(json)?;
    Ok(rows.into_iter().map(RawRecord::Treatment).collect())
}

/// Parse a `profile.json` payload.
pub fn parse_profiles(json: &str) -> serde_json::Result<Vec<RawProfile>> {
    serde_json::from_str(json)
}
