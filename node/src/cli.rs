//! # CLI Interface
//!
//! Defines the command-line argument structure for `pointlock-node` using
//! `clap` derive. Supports four subcommands: `serve`, `keygen`, `commit`,
//! and `version`.

use clap::{Parser, Subcommand, ValueEnum};
use pointlock_protocol::config::{DEFAULT_API_PORT, DEFAULT_METRICS_PORT};
use std::path::PathBuf;

/// pointlock escrow node.
///
/// Hosts a scalar-revealing timelock escrow engine behind an HTTP API,
/// streams escrow events over WebSocket, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "pointlock-node",
    about = "pointlock scalar-revealing escrow node",
    version,
    propagate_version = true
)]
pub struct PointlockCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the pointlock node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API and metrics endpoint.
    Serve(ServeArgs),
    /// Generate a random secret scalar and print it with its commitment.
    Keygen,
    /// Print the commitment point `k * G` of a given secret scalar.
    Commit(CommitArgs),
    /// Print version information and exit.
    Version,
}

/// Where escrow records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Process memory. Everything is lost on exit.
    Memory,
    /// sled database under the data directory.
    Sled,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Directory holding the escrow database when `--store sled` is used.
    ///
    /// Created on first run if it does not exist.
    #[arg(
        long,
        short = 'd',
        env = "POINTLOCK_DATA_DIR",
        default_value = ".pointlock"
    )]
    pub data_dir: PathBuf,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "POINTLOCK_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "POINTLOCK_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Escrow record backend.
    #[arg(long, value_enum, env = "POINTLOCK_STORE", default_value_t = StoreBackend::Memory)]
    pub store: StoreBackend,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "POINTLOCK_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Arguments for the `commit` subcommand.
#[derive(Parser, Debug)]
pub struct CommitArgs {
    /// Secret scalar as hex (optional `0x`, up to 64 digits).
    #[arg(long)]
    pub secret: String,
}
