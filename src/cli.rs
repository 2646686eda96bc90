//! Command-line interface for the intake binary
//!
//! Configuration comes from the environment (the deployment contract); the
//! CLI only offers the overrides that are useful when running the service
//! by hand.

use clap::Parser;

/// Instrumented HTTP ingestion service backed by PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "intake")]
#[command(version)]
#[command(about = "Instrumented HTTP ingestion service backed by PostgreSQL")]
pub struct Cli {
    /// Port to listen on (overrides the PORT environment variable)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level filter (overrides the LOG_LEVEL environment variable)
    #[arg(long)]
    pub log_level: Option<String>,
}
