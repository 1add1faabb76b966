//! Analysis services.
//!
//! Pure computations over normalized events and schedules, plus the session
//! registry used by the HTTP layer.

pub mod basal;
pub mod distribution;
pub mod lows;
pub mod normalizer;
pub mod schedule_resolver;
pub mod site_change;
pub mod stats;

#[cfg(feature = "http-server")]
pub mod session_tracker;

pub use basal::{
    change_point_timeline, minute_samples, reconstruct_basal, BasalSample, BasalSummary,
    ChangePoint, HourlyBasal, TypicalDayBasal,
};
pub use distribution::{glucose_distribution, GlucoseDistribution, GlucoseRange};
pub use lows::{detect_lows, LowReport, LowThresholds};
pub use normalizer::{normalize_profiles, normalize_records, NormalizeReport};
pub use schedule_resolver::{change_instants, rate_at, Unresolvable};
pub use site_change::{site_change_impact, SiteChangeImpact, SiteChangeView};
