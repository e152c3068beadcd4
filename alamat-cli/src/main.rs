use alamat_core::{table, BatchReport, BatchRunner, Error, GeocodeConfig, ProgressCallback};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

mod cli;

/// Seconds per row used for the duration estimate (rate limit plus request time)
const SECONDS_PER_ROW: f64 = 1.5;

/// Above this many rows, warn that a run will take a while
const LARGE_INPUT_ROWS: usize = 50;

fn main() -> Result<()> {
    let args = cli::parse_args();

    // Initialize logger with appropriate level based on verbose flag
    if std::env::var("RUST_LOG").is_err() {
        if args.verbose {
            std::env::set_var("RUST_LOG", "debug");
        } else {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    if let Some(path) = &args.template {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        table::write_template(BufWriter::new(file))?;
        println!("📥 Template written to {}", path.display());
        return Ok(());
    }

    let config = build_config(&args)?;
    let runner = BatchRunner::from_config(&config)?;

    if args.check_connection {
        match runner.check_connection() {
            Ok(provider) => println!("✅ {} is accessible!", provider),
            Err(e) => {
                eprintln!("❌ {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let input = args.input.as_ref().ok_or_else(|| {
        anyhow::anyhow!("Input file is required. Use --help for usage information.")
    })?;

    let file = File::open(input).with_context(|| format!("Failed to open {}", input.display()))?;
    let input_table = match table::read_table(BufReader::new(file)) {
        Ok(t) => t,
        Err(e) => fail(e),
    };
    let rows = input_table.coordinates.len();

    println!("✅ Loaded {} rows", rows);
    println!(
        "📍 Using: {}, {}",
        input_table.columns.latitude_name, input_table.columns.longitude_name
    );

    let estimate = rows as f64 * SECONDS_PER_ROW / runner.workers() as f64;
    println!(
        "⏱️  Estimated time: ~{:.1} minutes ({:.0} seconds)",
        estimate / 60.0,
        estimate
    );
    if rows > LARGE_INPUT_ROWS {
        println!(
            "⚠️  {} rows is a lot for the public geocoders. Consider testing with 10-20 rows first!",
            rows
        );
    }

    let progress: ProgressCallback = Box::new(|done, total| {
        let percent = done as f64 / total as f64 * 100.0;
        eprint!("\rProcessed: {}/{} ({:.1}%)", done, total, percent);
        if done == total {
            eprintln!();
        }
        std::io::stderr().flush().ok();
    });

    let report = match runner.run(&input_table.coordinates, Some(progress)) {
        Ok(report) => report,
        Err(e) => fail(e),
    };

    let output = args.output.clone().unwrap_or_else(default_output_path);
    let file = File::create(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    table::write_results(BufWriter::new(file), &report.results)?;

    print_summary(&report);
    println!("⬇️  Results written to {}", output.display());

    Ok(())
}

/// Config file (if any) with command-line overrides applied
fn build_config(args: &cli::Args) -> Result<GeocodeConfig> {
    let mut config = match &args.config {
        Some(path) => GeocodeConfig::load(path)?,
        None => GeocodeConfig::default(),
    };

    if let Some(workers) = args.workers {
        config.workers = workers as usize;
    }
    if let Some(language) = &args.language {
        config.language = language.clone();
    }
    if args.no_validate {
        config.validate = false;
    }
    if args.no_probe {
        config.probe = false;
    }
    if args.no_fallback {
        config.use_secondary = false;
    }

    Ok(config.normalized())
}

/// Report a batch-fatal error as a single message and exit
fn fail(error: Error) -> ! {
    match &error {
        Error::Connectivity { .. } => {
            eprintln!("❌ {}", error);
            eprintln!("Check your internet connection or try again later.");
        }
        Error::InputValidation(_) => eprintln!("❌ {}", error),
        _ => eprintln!("Error: {}", error),
    }
    std::process::exit(1);
}

fn default_output_path() -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    PathBuf::from(format!("hasil_{}.csv", timestamp))
}

fn print_summary(report: &BatchReport) {
    let stats = &report.stats;

    println!();
    println!(
        "✅ Completed in {:.1} minutes!",
        report.elapsed.as_secs_f64() / 60.0
    );
    println!("  Total:     {}", report.results.len());
    println!(
        "  Success:   {} ({:.1}%)",
        stats.success,
        stats.success_percent()
    );
    println!("  Not found: {}", stats.not_found);
    println!("  Speed:     {:.2} coord/sec", report.rows_per_second());

    log::debug!(
        "Timeouts: {}, rate limits: {}, errors: {}",
        stats.timeout,
        stats.rate_limited,
        stats.error
    );

    if report.needs_attention() {
        println!();
        println!("⚠️  More than 50% NOT_FOUND! Possible issues:");
        println!("  • Rate limiting: try with 1 worker only");
        println!("  • Network issues: check your connection");
        println!("  • Invalid coordinates: verify the data");
        println!("  • Provider down: try again later");
        println!(
            "  (timeouts: {}, rate limits: {}, errors: {})",
            stats.timeout, stats.rate_limited, stats.error
        );
    }
}
