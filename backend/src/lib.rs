//! # Nightscout Dash
//!
//! Analysis engine for Nightscout continuous-glucose and insulin-pump data.
//!
//! The crate keeps a per-session cache of normalized events, reconstructs the
//! basal insulin actually delivered from pump schedules and temporary
//! overrides, and counts distinct hypoglycemic episodes. An axum REST API
//! (feature `http-server`) serves the results to the dashboard front end.
//!
//! ## Architecture
//!
//! - [`models`]: events, schedules, raw record shapes and time-zone helpers
//! - [`source`]: the [`source::EventSource`] retrieval seam and a local implementation
//! - [`cache`]: incremental range cache and its snapshot form
//! - [`services`]: normalizer, schedule resolver, basal reconstruction, low
//!   detection, glucose distribution and site-change impact
//! - [`config`]: TOML and environment configuration
//! - [`http`]: Axum-based HTTP server and request handlers
//!
//! ## Example
//!
//! ```no_run
//! use nightscout_dash::api::*;
//!
//! # async fn run() -> AnalysisResult<()> {
//! let identity = SourceIdentity::parse("my.nightscout.example")?;
//! let source = LocalSource::from_export_dir(identity.clone(), "export")?;
//! let key = CacheKey::new(identity, parse_timezone("Europe/Madrid")?);
//! let dates = DateRange::new(
//!     chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
//!     chrono::NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
//! )?;
//!
//! let mut cache = RangeCache::new();
//! let view = cache.ensure(&source, &key, dates).await?;
//! let lows = detect_lows(&view.events, &LowThresholds::default())?;
//! println!("{} distinct lows", lows.total());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod source;

#[cfg(feature = "http-server")]
pub mod http;
