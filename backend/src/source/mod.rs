//! Event source seam.
//!
//! The [`EventSource`] trait is the boundary to whatever retrieves raw records
//! from a Nightscout site. Retry and timeout policy belong to the
//! implementation; callers only see records or a [`SourceError`].

pub mod error;
pub mod identity;
pub mod local;

pub use error::{SourceError, SourceResult};
pub use identity::SourceIdentity;
pub use local::{FetchCall, LocalSource};

use async_trait::async_trait;
use chrono_tz::Tz;

use crate::models::{DateRange, RawProfile, RawRecord};

/// Retrieves raw glucose, treatment and profile records.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Raw entries and treatments whose local date (in `timezone`) falls in
    /// `dates`, entries first.
    async fn fetch_events(
        &self,
        source: &SourceIdentity,
        dates: DateRange,
        timezone: &Tz,
    ) -> SourceResult<Vec<RawRecord>>;

    /// Every profile document known for `source`, in retrieval order.
    async fn fetch_schedules(
        &self,
        source: &SourceIdentity,
        timezone: &Tz,
    ) -> SourceResult<Vec<RawProfile>>;
}
