use crate::error::Error;
use crate::orchestrator::Geocoder;
use crate::stats::{RunCounters, RunStatistics};
use crate::table;
use crate::{Coordinate, GeocodeConfig, GeocodeResult};
use std::io::Read;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

/// Progress callback: (rows completed, total rows)
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send>;

/// Everything a finished batch produced
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// One result per input row, in input order
    pub results: Vec<GeocodeResult>,
    pub stats: RunStatistics,
    pub elapsed: Duration,
}

impl BatchReport {
    /// Rows resolved per second of wall-clock time
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.results.len() as f64 / secs
        } else {
            0.0
        }
    }

    /// More than half the rows came back NOT_FOUND
    pub fn needs_attention(&self) -> bool {
        self.stats.mostly_not_found()
    }
}

/// Runs a geocoder over many coordinates on a bounded worker pool
pub struct BatchRunner {
    geocoder: Arc<Geocoder>,
    workers: usize,
    probe: bool,
}

impl BatchRunner {
    /// Create a runner; `workers` below 1 is raised to 1
    pub fn new(geocoder: Geocoder, workers: usize) -> Self {
        Self {
            geocoder: Arc::new(geocoder),
            workers: workers.max(1),
            probe: true,
        }
    }

    pub fn from_config(config: &GeocodeConfig) -> Result<Self, Error> {
        let geocoder = Geocoder::from_config(config)?;
        Ok(Self::new(geocoder, config.workers).with_probe(config.probe))
    }

    /// Enable or disable the connectivity check before each run
    pub fn with_probe(mut self, probe: bool) -> Self {
        self.probe = probe;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Send one lightweight request to the primary provider, returning its name
    pub fn check_connection(&self) -> Result<&str, Error> {
        let provider = self.geocoder.primary().ok_or_else(|| Error::Connectivity {
            provider: crate::NO_PROVIDER.to_string(),
            reason: "no providers configured".to_string(),
        })?;

        log::info!("Testing connection to {}", provider.name());
        provider.probe().map_err(|failure| Error::Connectivity {
            provider: provider.name().to_string(),
            reason: failure.to_string(),
        })?;
        Ok(provider.name())
    }

    /// Parse and validate a CSV table, then geocode every row
    ///
    /// Input problems are reported before any request is sent.
    pub fn process_table<R: Read>(
        &self,
        input: R,
        progress: Option<ProgressCallback>,
    ) -> Result<BatchReport, Error> {
        let table = table::read_table(input)?;
        self.run(&table.coordinates, progress)
    }

    /// Geocode all coordinates, returning results in input order
    pub fn run(
        &self,
        coordinates: &[Coordinate],
        progress: Option<ProgressCallback>,
    ) -> Result<BatchReport, Error> {
        let start = Instant::now();
        let total = coordinates.len();

        if total == 0 {
            return Ok(BatchReport {
                results: Vec::new(),
                stats: RunStatistics::default(),
                elapsed: start.elapsed(),
            });
        }

        if self.probe {
            self.check_connection()?;
        }

        log::info!(
            "Geocoding {} coordinates with {} worker(s)",
            total,
            self.workers
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("alamat-worker-{}", i))
            .build()?;

        let counters = Arc::new(RunCounters::new());
        let (tx, rx) = mpsc::channel();

        for (position, coordinate) in coordinates.iter().cloned().enumerate() {
            let tx = tx.clone();
            let geocoder = Arc::clone(&self.geocoder);
            let counters = Arc::clone(&counters);
            pool.spawn(move || {
                let result = geocoder.resolve(&coordinate, &counters);
                // Receiver outlives every worker; a failed send means the run was abandoned
                let _ = tx.send((position, result));
            });
        }
        drop(tx);

        // Completion order is arbitrary; slot each result back at its input position
        let mut slots: Vec<Option<GeocodeResult>> = vec![None; total];
        let mut completed = 0;
        for (position, result) in rx {
            slots[position] = Some(result);
            completed += 1;
            if let Some(callback) = &progress {
                callback(completed, total);
            }
        }

        let results: Vec<GeocodeResult> = slots.into_iter().flatten().collect();
        let stats = counters.snapshot();
        let elapsed = start.elapsed();

        log::info!(
            "Completed {} rows in {:.1}s: {} ok, {} not found",
            results.len(),
            elapsed.as_secs_f64(),
            stats.success,
            stats.not_found
        );
        if stats.mostly_not_found() {
            log::warn!(
                "{} of {} rows NOT_FOUND; the provider may be throttling this client",
                stats.not_found,
                results.len()
            );
        }

        Ok(BatchReport {
            results,
            stats,
            elapsed,
        })
    }
}
