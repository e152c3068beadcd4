use clap::Parser;
use std::path::PathBuf;

/// Annotate a table of coordinates with street addresses
#[derive(Parser, Debug)]
#[command(name = "alamat")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Reverse geocodes latitude/longitude rows via Nominatim and Photon", long_about = None)]
pub struct Args {
    /// CSV file with latitude and longitude columns
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Where to write the annotated CSV (default: hasil_<timestamp>.csv)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Rows resolved concurrently; keep at 1-2 for the public Nominatim server
    #[arg(short = 'w', long = "workers", value_parser = clap::value_parser!(u8).range(1..=5))]
    pub workers: Option<u8>,

    /// Preferred language for returned names
    #[arg(short = 'l', long = "language")]
    pub language: Option<String>,

    /// JSON configuration file (endpoints, intervals, retries)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Skip comparing results against expected kelurahan/kecamatan
    #[arg(long = "no-validate")]
    pub no_validate: bool,

    /// Skip the connectivity check before processing
    #[arg(long = "no-probe")]
    pub no_probe: bool,

    /// Do not fall back to Photon when Nominatim has no address
    #[arg(long = "no-fallback")]
    pub no_fallback: bool,

    /// Write a sample input file and exit
    #[arg(long = "template", value_name = "FILE")]
    pub template: Option<PathBuf>,

    /// Only test whether the primary provider is reachable
    #[arg(long = "check-connection")]
    pub check_connection: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Parses command-line arguments
pub fn parse_args() -> Args {
    Args::parse()
}
