//! Source identity: the normalized base URL of a Nightscout site.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult, ErrorContext};

/// Normalized `scheme://host[:port]` of a remote site.
///
/// Two URLs that differ only by path, query, fragment, case of the host or a
/// trailing slash map to the same identity, so such edits never invalidate a
/// cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceIdentity(String);

impl SourceIdentity {
    /// Normalize a user-supplied URL.
    ///
    /// A missing scheme defaults to `https`.
    pub fn parse(url: &str) -> AnalysisResult<Self> {
        let invalid = |msg: &str| {
            AnalysisError::configuration_with_context(
                msg.to_string(),
                ErrorContext::new("parse_source")
                    .with_entity("source_url")
                    .with_entity_id(url),
            )
        };

        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(invalid("source URL is empty"));
        }
        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("https".to_string(), trimmed),
        };
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+') {
            return Err(invalid("source URL has an invalid scheme"));
        }

        let authority = rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default();
        // Drop credentials if present.
        let host = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host)
            .to_ascii_lowercase();
        if host.is_empty() || host.starts_with(':') {
            return Err(invalid("source URL has no host"));
        }

        Ok(Self(format!("{}://{}", scheme, host)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL of an API path such as `api/v1/entries.json`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SourceIdentity {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceIdentity::parse(s)
    }
}
