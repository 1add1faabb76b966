//! Data Transfer Objects for the HTTP API.
//!
//! Analysis results are serialized as-is; these types wrap them with the
//! request context (session, dates, how the cache was satisfied).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::cache::FetchOutcome;
use crate::models::{DateRange, Event};
use crate::services::distribution::GlucoseDistribution;
use crate::services::lows::{LowReport, LowThresholds};
use crate::services::session_tracker::SessionInfo;
use crate::services::site_change::SiteChangeImpact;
use crate::services::BasalSummary;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Number of live sessions
    pub sessions: usize,
}

/// Request body for opening a session. Missing fields fall back to the
/// server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub total: usize,
}

/// `?start=YYYY-MM-DD&end=YYYY-MM-DD`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasalQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub include_scheduled_only: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LowsQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub low: Option<f64>,
    pub recovered: Option<f64>,
    pub count: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteChangeQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub bin_hours: Option<u32>,
    /// `over_site` or `by_time_of_day`
    pub view: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub session_id: String,
    pub dates: DateRange,
    pub outcome: FetchOutcome,
    pub total: usize,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasalResponse {
    pub session_id: String,
    pub dates: DateRange,
    pub include_scheduled_only: bool,
    #[serde(flatten)]
    pub summary: BasalSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowsResponse {
    pub session_id: String,
    pub dates: DateRange,
    pub thresholds: LowThresholds,
    pub total: usize,
    #[serde(flatten)]
    pub report: LowReport,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionResponse {
    pub session_id: String,
    pub dates: DateRange,
    /// e.g. "288 readings over 1 days"
    pub summary: String,
    pub distribution: GlucoseDistribution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteChangeResponse {
    pub session_id: String,
    pub dates: DateRange,
    #[serde(flatten)]
    pub impact: SiteChangeImpact,
}
