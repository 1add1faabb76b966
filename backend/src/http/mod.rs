//! HTTP server module.
//!
//! Exposes the analysis services as a REST API for the dashboard front end.
//! Every client works through a session that owns its own range cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  HTTP Layer (axum handlers)                               │
//! │  - Query parsing and defaults from AnalysisConfig         │
//! │  - JSON serialization, CORS, compression, error mapping   │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Sessions (SessionTracker)                                │
//! │  - One RangeCache per session behind an async mutex       │
//! └───────────────────┬──────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼──────────────────────────────────────┐
//! │  Services + EventSource                                   │
//! │  - Basal reconstruction, lows, distribution, site change  │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
