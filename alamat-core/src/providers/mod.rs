//! Reverse geocoding providers
//!
//! Every provider speaks its own JSON dialect. The adapters in this module
//! translate those payloads into a single [`AddressCandidate`] so nothing
//! provider-specific leaks into the orchestrator.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod nominatim;
pub mod photon;

#[cfg(test)]
pub(crate) mod stub;

pub use nominatim::NominatimClient;
pub use photon::PhotonClient;

/// Longest failure description carried into results
const MAX_REASON_CHARS: usize = 50;

/// Reference point used for connectivity probes (Jakarta, Monas area)
pub const PROBE_POINT: (f64, f64) = (-6.2088, 106.8456);

/// Address produced by a single provider call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressCandidate {
    /// Street name
    pub road: Option<String>,
    /// Suburb / village level area (kelurahan)
    pub locality: Option<String>,
    /// District level area (kecamatan)
    pub sub_district: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    /// Full formatted address as returned (or assembled) for the provider
    pub display_name: Option<String>,
    /// Name of the provider that produced this address
    pub provider: String,
}

impl AddressCandidate {
    /// Candidate with every address field absent
    pub fn empty(provider: &str) -> Self {
        Self {
            road: None,
            locality: None,
            sub_district: None,
            city: None,
            province: None,
            display_name: None,
            provider: provider.to_string(),
        }
    }

    /// True when the provider gave us nothing we could put in a row
    pub fn is_empty(&self) -> bool {
        self.road.is_none()
            && self.locality.is_none()
            && self.sub_district.is_none()
            && self.city.is_none()
            && self.province.is_none()
            && self.display_name.is_none()
    }
}

/// Why a single provider call did not produce an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The provider answered but has no address for the coordinates
    NoResult,
    /// HTTP 429
    RateLimited,
    /// Request exceeded its deadline
    Timeout,
    /// Any other non-200 status
    Status(u16),
    /// Connection, TLS or decoding error (message truncated)
    Transport(String),
}

impl FetchFailure {
    /// Failures worth retrying the same call for
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchFailure::Timeout | FetchFailure::RateLimited)
    }

    /// Failures that point at a provider or network problem rather than data
    pub fn is_unexpected(&self) -> bool {
        matches!(self, FetchFailure::Status(_) | FetchFailure::Transport(_))
    }

    pub(crate) fn transport(message: impl fmt::Display) -> Self {
        FetchFailure::Transport(truncate_reason(&message.to_string()))
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchFailure::Timeout
        } else {
            FetchFailure::transport(err)
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::NoResult => write!(f, "no_result"),
            FetchFailure::RateLimited => write!(f, "rate_limit"),
            FetchFailure::Timeout => write!(f, "timeout"),
            FetchFailure::Status(code) => write!(f, "http_{}", code),
            FetchFailure::Transport(message) => write!(f, "{}", message),
        }
    }
}

/// A reverse geocoding service
pub trait ReverseGeocoder: Send + Sync {
    /// Short provider name used in results ("nominatim", "photon")
    fn name(&self) -> &str;

    /// Resolve one coordinate. `zoom` is a detail level hint; providers
    /// without such a parameter ignore it.
    fn reverse(&self, lat: f64, lon: f64, zoom: Option<u8>) -> Result<AddressCandidate, FetchFailure>;

    /// One lightweight request to check the service is reachable
    fn probe(&self) -> Result<(), FetchFailure>;
}

/// Endpoint and politeness settings for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL without trailing path, e.g. `https://nominatim.openstreetmap.org`
    pub endpoint: String,
    /// Minimum spacing between requests in milliseconds
    pub min_interval_ms: u64,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            min_interval_ms: 1200,
            timeout_ms: 15_000,
        }
    }
}

impl ProviderSettings {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Join the endpoint with a path, tolerating a trailing slash
    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint.trim_end_matches('/'), path)
    }
}

/// Build the blocking HTTP client shared by all requests to one provider
pub(crate) fn build_client(settings: &ProviderSettings, user_agent: &str) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(settings.timeout())
        .build()
}

/// Send a GET request and return the body of a 200 response
pub(crate) fn fetch_body(
    client: &Client,
    url: &str,
    query: &[(&str, String)],
    timeout: Duration,
) -> Result<String, FetchFailure> {
    let response = client
        .get(url)
        .query(query)
        .timeout(timeout)
        .send()
        .map_err(FetchFailure::from_reqwest)?;

    match response.status() {
        StatusCode::OK => response.text().map_err(FetchFailure::from_reqwest),
        StatusCode::TOO_MANY_REQUESTS => Err(FetchFailure::RateLimited),
        status => Err(FetchFailure::Status(status.as_u16())),
    }
}

/// First non-blank value in priority order
pub(crate) fn first_present(fields: &[Option<&String>]) -> Option<String> {
    fields
        .iter()
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(String::from)
}

fn truncate_reason(message: &str) -> String {
    message.chars().take(MAX_REASON_CHARS).collect()
}
