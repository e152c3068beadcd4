use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

// Internal modules
mod batch;
mod error;
mod orchestrator;
mod rate_limit;
mod stats;

// Public modules
pub mod providers;
pub mod similarity;
pub mod table;

// Re-export public types
pub use batch::{BatchReport, BatchRunner, ProgressCallback};
pub use error::Error;
pub use orchestrator::{FallbackStep, Geocoder, RetryPolicy, NEUTRAL_CONFIDENCE};
pub use providers::{AddressCandidate, FetchFailure, ProviderSettings, ReverseGeocoder};
pub use rate_limit::RateLimiter;
pub use stats::{RunCounters, RunStatistics};

/// Provider name reported for rows nothing could resolve
pub const NO_PROVIDER: &str = "none";

/// Upper bound on concurrent workers; public geocoders throttle hard above it
pub const MAX_WORKERS: usize = 5;

/// Configuration for a geocoding run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Number of rows resolved concurrently (1 is safest for Nominatim)
    pub workers: usize,
    /// Preferred language for returned names (`accept-language`)
    pub language: String,
    /// Score results against expected kelurahan/kecamatan when present
    pub validate: bool,
    /// Check the primary provider is reachable before starting
    pub probe: bool,
    /// Fall back to Photon when Nominatim has nothing
    pub use_secondary: bool,
    /// Nominatim zoom for the first attempt (18 = building)
    pub primary_zoom: u8,
    /// Coarser Nominatim zoom tried before the secondary provider (14 = suburb)
    pub fallback_zoom: u8,
    #[serde(default = "default_nominatim", deserialize_with = "nominatim_settings")]
    pub nominatim: ProviderSettings,
    #[serde(default = "default_photon", deserialize_with = "photon_settings")]
    pub photon: ProviderSettings,
    /// Timeout for the connectivity probe in milliseconds
    pub probe_timeout_ms: u64,
    /// Extra attempts for timeouts and HTTP 429
    pub max_retries: u32,
    pub timeout_backoff_ms: u64,
    pub rate_limit_backoff_ms: u64,
    /// Identifying User-Agent, required by the Nominatim usage policy
    pub user_agent: String,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            language: "id".to_string(),
            validate: true,
            probe: true,
            use_secondary: true,
            primary_zoom: 18,
            fallback_zoom: 14,
            nominatim: default_nominatim(),
            photon: default_photon(),
            probe_timeout_ms: 10_000,
            max_retries: 2,
            timeout_backoff_ms: 2_000,
            rate_limit_backoff_ms: 3_000,
            user_agent: format!(
                "Alamat/{} ({})",
                env!("CARGO_PKG_VERSION"),
                env!("CARGO_PKG_REPOSITORY")
            ),
        }
    }
}

fn default_nominatim() -> ProviderSettings {
    ProviderSettings {
        endpoint: "https://nominatim.openstreetmap.org".to_string(),
        min_interval_ms: 1200,
        timeout_ms: 15_000,
    }
}

fn default_photon() -> ProviderSettings {
    ProviderSettings {
        endpoint: "https://photon.komoot.io".to_string(),
        min_interval_ms: 1000,
        timeout_ms: 15_000,
    }
}

/// Provider section from a config file, missing fields taken from `defaults`
fn provider_section<'de, D>(
    deserializer: D,
    defaults: ProviderSettings,
) -> Result<ProviderSettings, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let section = serde_json::Map::deserialize(deserializer)?;
    let mut merged = match serde_json::to_value(defaults).map_err(serde::de::Error::custom)? {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    merged.extend(section);
    serde_json::from_value(serde_json::Value::Object(merged)).map_err(serde::de::Error::custom)
}

fn nominatim_settings<'de, D>(deserializer: D) -> Result<ProviderSettings, D::Error>
where
    D: serde::Deserializer<'de>,
{
    provider_section(deserializer, default_nominatim())
}

fn photon_settings<'de, D>(deserializer: D) -> Result<ProviderSettings, D::Error>
where
    D: serde::Deserializer<'de>,
{
    provider_section(deserializer, default_photon())
}

impl GeocodeConfig {
    /// Load a JSON config file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: GeocodeConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.normalized())
    }

    /// Clamp the worker count and restore endpoints left blank
    pub fn normalized(mut self) -> Self {
        self.workers = self.workers.clamp(1, MAX_WORKERS);
        if self.nominatim.endpoint.trim().is_empty() {
            self.nominatim.endpoint = default_nominatim().endpoint;
        }
        if self.photon.endpoint.trim().is_empty() {
            self.photon.endpoint = default_photon().endpoint;
        }
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            timeout_backoff: Duration::from_millis(self.timeout_backoff_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
        }
    }
}

/// One input row to geocode
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinate {
    /// Position of the row in the input table
    pub row_index: usize,
    pub latitude: f64,
    pub longitude: f64,
    /// Kelurahan the user expects at this point
    pub expected_locality: Option<String>,
    /// Kecamatan the user expects at this point
    pub expected_subdistrict: Option<String>,
}

impl Coordinate {
    pub fn new(row_index: usize, latitude: f64, longitude: f64) -> Self {
        Self {
            row_index,
            latitude,
            longitude,
            expected_locality: None,
            expected_subdistrict: None,
        }
    }

    /// Attach expected names; blank values count as absent
    pub fn with_expected(mut self, locality: Option<&str>, subdistrict: Option<&str>) -> Self {
        self.expected_locality = non_blank(locality);
        self.expected_subdistrict = non_blank(subdistrict);
        self
    }

    /// True when there is anything to validate the result against
    pub fn has_expectations(&self) -> bool {
        self.expected_locality.is_some() || self.expected_subdistrict.is_some()
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180]
    pub fn is_in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Outcome tag of a geocoded row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GeocodeStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOT_FOUND")]
    NotFound,
}

impl GeocodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeStatus::Ok => "OK",
            GeocodeStatus::NotFound => "NOT_FOUND",
        }
    }
}

impl fmt::Display for GeocodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result for a single input row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    /// Position of the source row in the input table
    pub row_index: usize,
    pub latitude: f64,
    pub longitude: f64,
    pub road: Option<String>,
    pub locality: Option<String>,
    pub sub_district: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub display_name: Option<String>,
    /// Agreement with the expected names, 0.5 when nothing was checked
    pub confidence: f64,
    pub status: GeocodeStatus,
    /// Provider that produced the address, or "none"
    pub provider: String,
    pub expected_locality: Option<String>,
    pub expected_subdistrict: Option<String>,
    /// Last provider failure for NOT_FOUND rows
    pub failure: Option<String>,
}

impl GeocodeResult {
    pub fn found(coordinate: &Coordinate, candidate: AddressCandidate, confidence: f64) -> Self {
        Self {
            row_index: coordinate.row_index,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            road: candidate.road,
            locality: candidate.locality,
            sub_district: candidate.sub_district,
            city: candidate.city,
            province: candidate.province,
            display_name: candidate.display_name,
            confidence: confidence.clamp(0.0, 1.0),
            status: GeocodeStatus::Ok,
            provider: candidate.provider,
            expected_locality: coordinate.expected_locality.clone(),
            expected_subdistrict: coordinate.expected_subdistrict.clone(),
            failure: None,
        }
    }

    pub fn not_found(coordinate: &Coordinate, failure: Option<&FetchFailure>) -> Self {
        Self {
            row_index: coordinate.row_index,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            road: None,
            locality: None,
            sub_district: None,
            city: None,
            province: None,
            display_name: None,
            confidence: 0.0,
            status: GeocodeStatus::NotFound,
            provider: NO_PROVIDER.to_string(),
            expected_locality: coordinate.expected_locality.clone(),
            expected_subdistrict: coordinate.expected_subdistrict.clone(),
            failure: Some(
                failure
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == GeocodeStatus::Ok
    }
}
