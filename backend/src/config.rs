//! Analysis configuration.
//!
//! Settings are read from a TOML file (every field has a default) and can be
//! overridden from the environment.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, AnalysisResult, ErrorContext};
use crate::models::{parse_timezone, DateRange};
use crate::services::distribution::{GlucoseRange, DEFAULT_BOUNDARIES};
use crate::services::lows::LowThresholds;
use crate::source::SourceIdentity;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub source: SourceSettings,
    pub analysis: AnalysisSettings,
    pub lows: LowThresholds,
    pub distribution: DistributionSettings,
    pub site_change: SiteChangeSettings,
    pub server: ServerSettings,
}

/// Where data comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Base URL of the Nightscout site.
    #[serde(default)]
    pub url: Option<String>,
    /// Directory holding `entries.json`, `treatments.json` and `profile.json`.
    #[serde(default)]
    pub export_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Days before today covered when no range is requested.
    #[serde(default = "default_days")]
    pub default_days: u32,
    #[serde(default = "default_include_scheduled_only")]
    pub include_scheduled_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSettings {
    #[serde(default = "default_boundaries")]
    pub boundaries: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteChangeSettings {
    #[serde(default = "default_bin_hours")]
    pub bin_hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_days() -> u32 {
    7
}

fn default_include_scheduled_only() -> bool {
    true
}

fn default_boundaries() -> Vec<f64> {
    DEFAULT_BOUNDARIES.to_vec()
}

fn default_bin_hours() -> u32 {
    6
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            default_days: default_days(),
            include_scheduled_only: default_include_scheduled_only(),
        }
    }
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            boundaries: default_boundaries(),
        }
    }
}

impl Default for SiteChangeSettings {
    fn default() -> Self {
        Self {
            bin_hours: default_bin_hours(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn config_error(message: String, entity: &str) -> AnalysisError {
    AnalysisError::configuration_with_context(
        message,
        ErrorContext::new("load_config").with_entity(entity),
    )
}

impl AnalysisConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            config_error(
                format!("Failed to read config file {}: {}", path.display(), e),
                "file",
            )
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AnalysisResult<Self> {
        toml::from_str(content)
            .map_err(|e| config_error(format!("Failed to parse config file: {}", e), "file"))
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `nightscout.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> AnalysisResult<Self> {
        let search_paths = [
            PathBuf::from("nightscout.toml"),
            PathBuf::from("backend/nightscout.toml"),
            PathBuf::from("../nightscout.toml"),
        ];

        for path in &search_paths {
            if path.exists() {
                log::info!("Loading configuration from {}", path.display());
                return Self::from_file(path);
            }
        }

        Err(config_error(
            "No nightscout.toml found in standard locations".to_string(),
            "file",
        ))
    }

    /// Apply environment overrides.
    ///
    /// # Environment Variables
    /// - `NIGHTSCOUT_URL`: source URL
    /// - `NIGHTSCOUT_EXPORT_DIR`: export directory
    /// - `LOCALZONE_NAME`: analysis time zone
    /// - `HOST`, `PORT`: server bind address
    pub fn apply_env(&mut self) -> AnalysisResult<()> {
        if let Some(url) = non_empty_var("NIGHTSCOUT_URL") {
            self.source.url = Some(url);
        }
        if let Some(dir) = non_empty_var("NIGHTSCOUT_EXPORT_DIR") {
            self.source.export_dir = Some(PathBuf::from(dir));
        }
        if let Some(zone) = non_empty_var("LOCALZONE_NAME") {
            self.analysis.timezone = zone;
        }
        if let Some(host) = non_empty_var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty_var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| config_error(format!("PORT must be a valid port number, got '{}'", port), "server"))?;
        }
        Ok(())
    }

    /// Fail fast on settings that cannot produce a meaningful analysis.
    pub fn validate(&self) -> AnalysisResult<()> {
        parse_timezone(&self.analysis.timezone)?;
        if let Some(url) = &self.source.url {
            SourceIdentity::parse(url)?;
        }
        self.lows.validate()?;

        let boundaries = &self.distribution.boundaries;
        if boundaries.iter().any(|b| !b.is_finite()) {
            return Err(config_error(
                "distribution boundaries must be finite".to_string(),
                "distribution",
            ));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(config_error(
                format!("distribution boundaries must be strictly increasing, got {:?}", boundaries),
                "distribution",
            ));
        }

        if !(1..=24).contains(&self.site_change.bin_hours) {
            return Err(config_error(
                format!("site_change.bin_hours must be between 1 and 24, got {}", self.site_change.bin_hours),
                "site_change",
            ));
        }
        Ok(())
    }

    pub fn timezone(&self) -> AnalysisResult<Tz> {
        parse_timezone(&self.analysis.timezone)
    }

    /// Configured source identity, if a URL is set.
    pub fn source_identity(&self) -> AnalysisResult<Option<SourceIdentity>> {
        self.source.url.as_deref().map(SourceIdentity::parse).transpose()
    }

    pub fn glucose_ranges(&self) -> Vec<GlucoseRange> {
        GlucoseRange::from_boundaries(&self.distribution.boundaries)
    }

    /// The range used when a request names no dates: `default_days` before
    /// `today` through `today`.
    pub fn default_range(&self, today: NaiveDate) -> DateRange {
        let start = today - Duration::days(i64::from(self.analysis.default_days));
        DateRange {
            start,
            end: today,
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
