//! Public API surface.
//!
//! Re-exports the types and operations most callers need, so that
//! `use nightscout_dash::api::*` is enough to run an analysis.

pub use crate::cache::{CacheKey, CacheSnapshot, FetchOutcome, RangeCache, RangeView};
pub use crate::config::AnalysisConfig;
pub use crate::error::{AnalysisError, AnalysisResult, ErrorContext};
pub use crate::models::{
    parse_timezone, AnalysisWindow, CalendarFields, DateRange, Event, EventKind, RawProfile,
    RawRecord, Schedule, ScheduleId, ScheduleSet, Segment,
};
pub use crate::services::basal::{
    change_point_timeline, reconstruct_basal, BasalSummary, HourlyBasal, TypicalDayBasal,
};
pub use crate::services::distribution::{glucose_distribution, GlucoseDistribution, GlucoseRange};
pub use crate::services::lows::{detect_lows, DailyLowCount, LowFlag, LowReport, LowThresholds};
pub use crate::services::normalizer::{normalize_profiles, normalize_records, NormalizeReport};
pub use crate::services::schedule_resolver::{rate_at, Unresolvable};
pub use crate::services::site_change::{site_change_impact, SiteChangeImpact, SiteChangeView};
pub use crate::source::{EventSource, LocalSource, SourceError, SourceIdentity};
