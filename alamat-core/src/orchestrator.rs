use crate::error::Error;
use crate::providers::{
    AddressCandidate, FetchFailure, NominatimClient, PhotonClient, ReverseGeocoder,
};
use crate::similarity;
use crate::stats::RunCounters;
use crate::{Coordinate, GeocodeConfig, GeocodeResult};
use std::sync::Arc;
use std::time::Duration;

/// Confidence reported when no expected names are checked
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// One entry of the fallback chain: a provider and the detail level to ask for
#[derive(Clone)]
pub struct FallbackStep {
    pub provider: Arc<dyn ReverseGeocoder>,
    pub zoom: Option<u8>,
}

impl FallbackStep {
    pub fn new(provider: Arc<dyn ReverseGeocoder>, zoom: Option<u8>) -> Self {
        Self { provider, zoom }
    }
}

/// How often and how long to wait before repeating a transient failure
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub timeout_backoff: Duration,
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            timeout_backoff: Duration::from_secs(2),
            rate_limit_backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Fixed backoff for a retryable failure, `None` for everything else
    fn backoff_for(&self, failure: &FetchFailure) -> Option<Duration> {
        match failure {
            FetchFailure::Timeout => Some(self.timeout_backoff),
            FetchFailure::RateLimited => Some(self.rate_limit_backoff),
            _ => None,
        }
    }
}

/// Resolves single coordinates by walking the fallback chain
///
/// The first step that yields a candidate wins; later steps are never asked
/// to compete with it.
pub struct Geocoder {
    steps: Vec<FallbackStep>,
    retry: RetryPolicy,
    validate: bool,
}

impl Geocoder {
    pub fn new(steps: Vec<FallbackStep>, retry: RetryPolicy, validate: bool) -> Self {
        Self {
            steps,
            retry,
            validate,
        }
    }

    /// Nominatim at the detailed zoom, Nominatim at the coarse zoom, then Photon
    pub fn from_config(config: &GeocodeConfig) -> Result<Self, Error> {
        let nominatim: Arc<dyn ReverseGeocoder> = Arc::new(NominatimClient::from_config(config)?);

        let mut steps = vec![FallbackStep::new(Arc::clone(&nominatim), Some(config.primary_zoom))];
        if config.fallback_zoom != config.primary_zoom {
            steps.push(FallbackStep::new(nominatim, Some(config.fallback_zoom)));
        }
        if config.use_secondary {
            steps.push(FallbackStep::new(Arc::new(PhotonClient::from_config(config)?), None));
        }

        Ok(Self::new(steps, config.retry_policy(), config.validate))
    }

    pub fn steps(&self) -> &[FallbackStep] {
        &self.steps
    }

    /// Provider of the first step; the one probed before a batch
    pub fn primary(&self) -> Option<&Arc<dyn ReverseGeocoder>> {
        self.steps.first().map(|step| &step.provider)
    }

    /// Resolve one coordinate. Never fails: every problem ends as NOT_FOUND.
    pub fn resolve(&self, coordinate: &Coordinate, counters: &RunCounters) -> GeocodeResult {
        let mut last_failure = None;

        for step in &self.steps {
            match self.attempt(step, coordinate, counters) {
                Ok(candidate) => {
                    let confidence = self.confidence(coordinate, &candidate);
                    counters.record_success();
                    return GeocodeResult::found(coordinate, candidate, confidence);
                }
                Err(failure) => {
                    log::debug!(
                        "Row {}: {} (zoom {:?}) gave {}",
                        coordinate.row_index,
                        step.provider.name(),
                        step.zoom,
                        failure
                    );
                    last_failure = Some(failure);
                }
            }
        }

        log::warn!(
            "Row {}: no address for {},{} ({})",
            coordinate.row_index,
            coordinate.latitude,
            coordinate.longitude,
            last_failure
                .as_ref()
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no providers".to_string())
        );
        counters.record_not_found();
        GeocodeResult::not_found(coordinate, last_failure.as_ref())
    }

    /// One step of the chain, with retries for transient failures
    fn attempt(
        &self,
        step: &FallbackStep,
        coordinate: &Coordinate,
        counters: &RunCounters,
    ) -> Result<AddressCandidate, FetchFailure> {
        let mut retries = 0;

        loop {
            let failure = match step
                .provider
                .reverse(coordinate.latitude, coordinate.longitude, step.zoom)
            {
                Ok(candidate) => return Ok(candidate),
                Err(failure) => failure,
            };

            match failure {
                FetchFailure::Timeout => counters.record_timeout(),
                FetchFailure::RateLimited => counters.record_rate_limited(),
                ref f if f.is_unexpected() => counters.record_error(),
                _ => {}
            }

            match self.retry.backoff_for(&failure) {
                Some(backoff) if retries < self.retry.max_retries => {
                    retries += 1;
                    log::debug!(
                        "Row {}: {} from {}, retry {}/{} in {:?}",
                        coordinate.row_index,
                        failure,
                        step.provider.name(),
                        retries,
                        self.retry.max_retries,
                        backoff
                    );
                    std::thread::sleep(backoff);
                }
                _ => return Err(failure),
            }
        }
    }

    fn confidence(&self, coordinate: &Coordinate, candidate: &AddressCandidate) -> f64 {
        if !self.validate || !coordinate.has_expectations() {
            return NEUTRAL_CONFIDENCE;
        }

        similarity::score(
            candidate,
            coordinate.expected_locality.as_deref(),
            coordinate.expected_subdistrict.as_deref(),
        )
    }
}
