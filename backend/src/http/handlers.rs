//! HTTP handlers for the REST API.
//!
//! Each handler resolves its session, brings the session cache up to date for
//! the requested dates and delegates to the service layer.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;

use super::dto::{
    BasalQuery, BasalResponse, CreateSessionRequest, DistributionResponse, EventsResponse,
    HealthResponse, LowsQuery, LowsResponse, RangeQuery, SessionListResponse, SiteChangeQuery,
    SiteChangeResponse,
};
use super::error::AppError;
use super::state::AppState;
use crate::cache::{CacheKey, RangeView};
use crate::config::AnalysisConfig;
use crate::models::{parse_timezone, AnalysisWindow, DateRange};
use crate::services::session_tracker::SessionInfo;
use crate::services::{
    detect_lows, glucose_distribution, reconstruct_basal, site_change_impact, LowThresholds,
    SiteChangeView,
};
use crate::source::SourceIdentity;

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Fill in whichever ends of the range the request left out.
///
/// A missing end is today in the session zone; a missing start is
/// `default_days` before the end.
pub(crate) fn resolve_dates(
    config: &AnalysisConfig,
    timezone: &Tz,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<DateRange, AppError> {
    let end = end.unwrap_or_else(|| Utc::now().with_timezone(timezone).date_naive());
    let start = start.unwrap_or(config.default_range(end).start);
    Ok(DateRange::new(start, end)?)
}

/// Look up the session and make sure its cache covers the requested dates.
async fn load_range(
    state: &AppState,
    session_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<(DateRange, Tz, RangeView), AppError> {
    let session = state
        .sessions
        .get(session_id)
        .ok_or_else(|| AppError::NotFound(format!("Session {} not found", session_id)))?;
    let timezone = session.key.timezone;
    let dates = resolve_dates(&state.config, &timezone, start, end)?;

    let mut cache = session.cache().lock().await;
    let view = cache
        .ensure(state.source.as_ref(), &session.key, dates)
        .await?;
    Ok((dates, timezone, view))
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        sessions: state.sessions.len(),
    }))
}

// =============================================================================
// Sessions
// =============================================================================

/// GET /v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> HandlerResult<SessionListResponse> {
    let sessions = state.sessions.list();
    let total = sessions.len();
    Ok(Json(SessionListResponse { sessions, total }))
}

/// POST /v1/sessions
///
/// Open a session for a source and time zone. Fields left out of the body
/// come from the server configuration.
pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionInfo>), AppError> {
    let url = request
        .source_url
        .or_else(|| state.config.source.url.clone())
        .ok_or_else(|| {
            AppError::BadRequest(
                "No source_url given and no default source configured".to_string(),
            )
        })?;
    let source = SourceIdentity::parse(&url)?;
    let timezone = parse_timezone(
        request
            .timezone
            .as_deref()
            .unwrap_or(&state.config.analysis.timezone),
    )?;

    let session_id = state
        .sessions
        .create_session(CacheKey::new(source, timezone));
    let info = state
        .sessions
        .get(&session_id)
        .map(|session| session.info())
        .ok_or_else(|| AppError::Internal("Session vanished after creation".to_string()))?;

    Ok((StatusCode::CREATED, Json(info)))
}

/// DELETE /v1/sessions/{session_id}
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.sessions.remove(&session_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session {} not found", session_id)))
    }
}

// =============================================================================
// Analysis Endpoints
// =============================================================================

/// GET /v1/sessions/{session_id}/events
///
/// Normalized events for the range, fetching only dates not yet cached.
pub async fn get_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<EventsResponse> {
    let (dates, _, view) = load_range(&state, &session_id, query.start, query.end).await?;
    Ok(Json(EventsResponse {
        session_id,
        dates,
        outcome: view.outcome,
        total: view.events.len(),
        events: view.events,
    }))
}

/// GET /v1/sessions/{session_id}/basal
pub async fn get_basal(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<BasalQuery>,
) -> HandlerResult<BasalResponse> {
    let include_scheduled_only = query
        .include_scheduled_only
        .unwrap_or(state.config.analysis.include_scheduled_only);
    let (dates, timezone, view) = load_range(&state, &session_id, query.start, query.end).await?;

    let window = AnalysisWindow::new(dates, timezone);
    let summary = tokio::task::spawn_blocking(move || {
        reconstruct_basal(&view.events, &view.schedules, &window, include_scheduled_only)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))??;

    Ok(Json(BasalResponse {
        session_id,
        dates,
        include_scheduled_only,
        summary,
    }))
}

/// GET /v1/sessions/{session_id}/lows
pub async fn get_lows(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<LowsQuery>,
) -> HandlerResult<LowsResponse> {
    let defaults = state.config.lows;
    let thresholds = LowThresholds {
        low_threshold: query.low.unwrap_or(defaults.low_threshold),
        recovered_threshold: query.recovered.unwrap_or(defaults.recovered_threshold),
        recovery_count: query.count.unwrap_or(defaults.recovery_count),
    };
    // Fail before touching the source.
    thresholds.validate()?;

    let (dates, _, view) = load_range(&state, &session_id, query.start, query.end).await?;
    let report = detect_lows(&view.events, &thresholds)?;

    Ok(Json(LowsResponse {
        session_id,
        dates,
        thresholds,
        total: report.total(),
        report,
    }))
}

/// GET /v1/sessions/{session_id}/distribution
pub async fn get_distribution(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<RangeQuery>,
) -> HandlerResult<DistributionResponse> {
    let (dates, _, view) = load_range(&state, &session_id, query.start, query.end).await?;
    let distribution = glucose_distribution(&view.events, &state.config.glucose_ranges());

    Ok(Json(DistributionResponse {
        session_id,
        dates,
        summary: distribution.summary_text(),
        distribution,
    }))
}

/// GET /v1/sessions/{session_id}/site-changes
pub async fn get_site_changes(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<SiteChangeQuery>,
) -> HandlerResult<SiteChangeResponse> {
    let view_kind = match query.view.as_deref() {
        Some(raw) => raw.parse::<SiteChangeView>()?,
        None => SiteChangeView::default(),
    };
    let bin_hours = query.bin_hours.unwrap_or(state.config.site_change.bin_hours);

    let (dates, _, view) = load_range(&state, &session_id, query.start, query.end).await?;
    let impact = site_change_impact(&view.events, bin_hours, view_kind)?;

    Ok(Json(SiteChangeResponse {
        session_id,
        dates,
        impact,
    }))
}
