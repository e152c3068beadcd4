use super::{
    build_client, fetch_body, first_present, AddressCandidate, FetchFailure, ProviderSettings,
    ReverseGeocoder, PROBE_POINT,
};
use crate::rate_limit::RateLimiter;
use crate::GeocodeConfig;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;

pub const PROVIDER_NAME: &str = "photon";

/// Languages Photon accepts in the `lang` parameter
const SUPPORTED_LANGUAGES: &[&str] = &["default", "en", "de", "fr"];

/// Photon answers with a GeoJSON FeatureCollection
#[derive(Debug, Deserialize)]
struct PhotonResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    name: Option<String>,
    street: Option<String>,
    housenumber: Option<String>,
    locality: Option<String>,
    district: Option<String>,
    city: Option<String>,
    county: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
    country: Option<String>,
    /// Photon's feature classification (house, street, locality, district, city, ...)
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl Properties {
    /// Feature name, but only when the feature itself is of the given kind
    fn name_if(&self, kind: &str) -> Option<&String> {
        match self.kind.as_deref() {
            Some(k) if k == kind => self.name.as_ref(),
            _ => None,
        }
    }
}

/// Client for the komoot Photon reverse endpoint
pub struct PhotonClient {
    client: Client,
    settings: ProviderSettings,
    limiter: RateLimiter,
    language: Option<String>,
    probe_timeout: Duration,
}

impl PhotonClient {
    pub fn from_config(config: &GeocodeConfig) -> reqwest::Result<Self> {
        let settings = config.photon.clone();
        let language = supported_language(&config.language);
        if language.is_none() {
            log::debug!(
                "Photon does not support language '{}', using its default",
                config.language
            );
        }

        Ok(Self {
            client: build_client(&settings, &config.user_agent)?,
            limiter: RateLimiter::new(settings.min_interval()),
            settings,
            language,
            probe_timeout: config.probe_timeout(),
        })
    }

    fn query(&self, lat: f64, lon: f64) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("lat", lat.to_string()),
            ("lon", lon.to_string()),
            ("limit", "1".to_string()),
        ];
        if let Some(lang) = &self.language {
            query.push(("lang", lang.clone()));
        }
        query
    }
}

impl ReverseGeocoder for PhotonClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn reverse(&self, lat: f64, lon: f64, _zoom: Option<u8>) -> Result<AddressCandidate, FetchFailure> {
        let query = self.query(lat, lon);

        self.limiter.wait();
        log::debug!("Geocoding {},{} via Photon", lat, lon);

        let body = fetch_body(
            &self.client,
            &self.settings.url("reverse"),
            &query,
            self.settings.timeout(),
        )?;
        parse_reverse(&body)
    }

    fn probe(&self) -> Result<(), FetchFailure> {
        let (lat, lon) = PROBE_POINT;
        let query = self.query(lat, lon);

        self.limiter.wait();
        fetch_body(&self.client, &self.settings.url("reverse"), &query, self.probe_timeout).map(|_| ())
    }
}

fn supported_language(language: &str) -> Option<String> {
    let language = language.trim().to_lowercase();
    if SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        Some(language)
    } else {
        None
    }
}

/// Map the first Photon feature onto an address candidate
fn parse_reverse(body: &str) -> Result<AddressCandidate, FetchFailure> {
    let data: PhotonResponse = serde_json::from_str(body)
        .map_err(|e| FetchFailure::transport(format!("invalid photon response: {}", e)))?;

    let props = data
        .features
        .into_iter()
        .next()
        .map(|feature| feature.properties)
        .ok_or(FetchFailure::NoResult)?;

    let candidate = AddressCandidate {
        road: first_present(&[props.street.as_ref(), props.name_if("street")]),
        locality: first_present(&[props.locality.as_ref(), props.name_if("locality")]),
        sub_district: first_present(&[props.district.as_ref(), props.name_if("district")]),
        city: first_present(&[
            props.city.as_ref(),
            props.name_if("city"),
            props.county.as_ref(),
        ]),
        province: first_present(&[props.state.as_ref()]),
        display_name: display_name(&props),
        provider: PROVIDER_NAME.to_string(),
    };

    if candidate.is_empty() {
        return Err(FetchFailure::NoResult);
    }
    Ok(candidate)
}

/// Photon has no formatted address, so assemble one from the components
fn display_name(props: &Properties) -> Option<String> {
    let street = match (&props.street, &props.housenumber) {
        (Some(street), Some(number)) => Some(format!("{} {}", street, number)),
        (Some(street), None) => Some(street.clone()),
        _ => None,
    };

    let mut parts: Vec<String> = Vec::new();
    for part in [
        props.name.clone(),
        street,
        props.locality.clone(),
        props.district.clone(),
        props.city.clone(),
        props.county.clone(),
        props.state.clone(),
        props.postcode.clone(),
        props.country.clone(),
    ]
    .into_iter()
    .flatten()
    {
        let part = part.trim().to_string();
        if !part.is_empty() && !parts.contains(&part) {
            parts.push(part);
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::stub::{serve, Reply};

    const GAMBIR: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [106.865, -6.1751]},
            "properties": {
                "osm_id": 42,
                "name": "Stasiun Gambir",
                "street": "Jalan Medan Merdeka Timur",
                "housenumber": "1",
                "locality": "Gambir",
                "district": "Gambir",
                "city": "Jakarta Pusat",
                "state": "Daerah Khusus Ibukota Jakarta",
                "postcode": "10110",
                "country": "Indonesia",
                "type": "house"
            }
        }]
    }"#;

    #[test]
    fn test_parse_feature() {
        let candidate = parse_reverse(GAMBIR).unwrap();
        assert_eq!(candidate.road.as_deref(), Some("Jalan Medan Merdeka Timur"));
        assert_eq!(candidate.locality.as_deref(), Some("Gambir"));
        assert_eq!(candidate.sub_district.as_deref(), Some("Gambir"));
        assert_eq!(candidate.city.as_deref(), Some("Jakarta Pusat"));
        assert_eq!(candidate.provider, "photon");
        assert_eq!(
            candidate.display_name.as_deref(),
            Some("Stasiun Gambir, Jalan Medan Merdeka Timur 1, Gambir, Jakarta Pusat, Daerah Khusus Ibukota Jakarta, 10110, Indonesia")
        );
    }

    #[test]
    fn test_parse_uses_name_for_matching_kind() {
        let body = r#"{"features": [{"properties": {"name": "Petojo Utara", "type": "locality", "county": "Jakarta Pusat"}}]}"#;
        let candidate = parse_reverse(body).unwrap();
        assert_eq!(candidate.locality.as_deref(), Some("Petojo Utara"));
        assert_eq!(candidate.road, None);
        assert_eq!(candidate.city.as_deref(), Some("Jakarta Pusat"));
    }

    #[test]
    fn test_parse_empty_collection_is_no_result() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;
        assert_eq!(parse_reverse(body), Err(FetchFailure::NoResult));
        assert_eq!(parse_reverse("{}"), Err(FetchFailure::NoResult));
    }

    #[test]
    fn test_supported_language() {
        assert_eq!(supported_language("EN"), Some("en".to_string()));
        assert_eq!(supported_language("id"), None);
    }

    #[test]
    fn test_reverse_over_http_omits_unsupported_language() {
        let (endpoint, server) = serve(vec![Reply::json(200, GAMBIR)]);
        let mut config = GeocodeConfig::default();
        config.photon.endpoint = endpoint;
        config.photon.min_interval_ms = 0;
        let client = PhotonClient::from_config(&config).unwrap();

        let candidate = client.reverse(-6.1751, 106.865, Some(18)).unwrap();
        assert_eq!(candidate.locality.as_deref(), Some("Gambir"));

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("GET /reverse?"));
        assert!(requests[0].contains("limit=1"));
        assert!(!requests[0].contains("lang="));
    }

    #[test]
    fn test_sequential_requests_are_spaced() {
        let (endpoint, server) = serve(vec![Reply::json(200, GAMBIR), Reply::json(200, GAMBIR)]);
        let mut config = GeocodeConfig::default();
        config.photon.endpoint = endpoint;
        config.photon.min_interval_ms = 200;
        let client = PhotonClient::from_config(&config).unwrap();

        let start = std::time::Instant::now();
        assert!(client.reverse(-6.1751, 106.865, None).is_ok());
        assert!(client.reverse(-6.1751, 106.865, None).is_ok());

        assert!(start.elapsed() >= Duration::from_millis(200), "took {:?}", start.elapsed());
        server.join().unwrap();
    }
}
