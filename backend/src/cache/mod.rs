//! Range cache: incremental synchronisation of a per-session working set.

pub mod range_cache;
pub mod runs;
pub mod snapshot;

pub use range_cache::{CacheKey, FetchOutcome, RangeCache, RangeView};
pub use runs::contiguous_runs;
pub use snapshot::CacheSnapshot;
