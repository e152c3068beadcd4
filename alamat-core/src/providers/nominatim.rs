use super::{
    build_client, fetch_body, first_present, AddressCandidate, FetchFailure, ProviderSettings,
    ReverseGeocoder, PROBE_POINT,
};
use crate::rate_limit::RateLimiter;
use crate::GeocodeConfig;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

pub const PROVIDER_NAME: &str = "nominatim";

/// Nominatim reverse response
#[derive(Debug, Deserialize)]
struct NominatimResponse {
    /// Present (as a string or object) when Nominatim could not geocode
    error: Option<serde_json::Value>,
    display_name: Option<String>,
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    road: Option<String>,
    pedestrian: Option<String>,
    suburb: Option<String>,
    village: Option<String>,
    neighbourhood: Option<String>,
    hamlet: Option<String>,
    city_district: Option<String>,
    district: Option<String>,
    municipality: Option<String>,
    city: Option<String>,
    town: Option<String>,
    county: Option<String>,
    state: Option<String>,
}

/// Client for the OpenStreetMap Nominatim reverse endpoint
pub struct NominatimClient {
    client: Client,
    settings: ProviderSettings,
    limiter: RateLimiter,
    language: String,
    probe_timeout: Duration,
}

impl NominatimClient {
    pub fn from_config(config: &GeocodeConfig) -> reqwest::Result<Self> {
        let settings = config.nominatim.clone();
        Ok(Self {
            client: build_client(&settings, &config.user_agent)?,
            limiter: RateLimiter::new(settings.min_interval()),
            settings,
            language: config.language.clone(),
            probe_timeout: config.probe_timeout(),
        })
    }

    fn reverse_url(&self) -> String {
        self.settings.url("reverse")
    }
}

impl ReverseGeocoder for NominatimClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn reverse(&self, lat: f64, lon: f64, zoom: Option<u8>) -> Result<AddressCandidate, FetchFailure> {
        let mut query = vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("format", "json".to_string()),
            ("addressdetails", "1".to_string()),
            ("accept-language", self.language.clone()),
        ];
        if let Some(zoom) = zoom {
            query.push(("zoom", zoom.to_string()));
        }

        self.limiter.wait();
        log::debug!("Geocoding {},{} via Nominatim (zoom {:?})", lat, lon, zoom);

        let body = fetch_body(&self.client, &self.reverse_url(), &query, self.settings.timeout())?;
        parse_reverse(&body)
    }

    fn probe(&self) -> Result<(), FetchFailure> {
        let (lat, lon) = PROBE_POINT;
        let query = [
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("format", "json".to_string()),
        ];

        self.limiter.wait();
        fetch_body(&self.client, &self.reverse_url(), &query, self.probe_timeout).map(|_| ())
    }
}

/// Map a Nominatim reverse payload onto an address candidate
fn parse_reverse(body: &str) -> Result<AddressCandidate, FetchFailure> {
    let data: NominatimResponse = serde_json::from_str(body)
        .map_err(|e| FetchFailure::transport(format!("invalid nominatim response: {}", e)))?;

    if data.error.is_some() {
        return Err(FetchFailure::NoResult);
    }
    let address = data.address.ok_or(FetchFailure::NoResult)?;

    let candidate = AddressCandidate {
        road: first_present(&[address.road.as_ref(), address.pedestrian.as_ref()]),
        locality: first_present(&[
            address.suburb.as_ref(),
            address.village.as_ref(),
            address.neighbourhood.as_ref(),
            address.hamlet.as_ref(),
        ]),
        sub_district: first_present(&[
            address.city_district.as_ref(),
            address.district.as_ref(),
            address.municipality.as_ref(),
        ]),
        city: first_present(&[
            address.city.as_ref(),
            address.town.as_ref(),
            address.county.as_ref(),
        ]),
        province: first_present(&[address.state.as_ref()]),
        display_name: first_present(&[data.display_name.as_ref()]),
        provider: PROVIDER_NAME.to_string(),
    };

    if candidate.is_empty() {
        return Err(FetchFailure::NoResult);
    }
    Ok(candidate)
}
