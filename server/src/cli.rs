//! # CLI Interface
//!
//! Defines the command-line argument structure for `arca-server` using
//! `clap` derive. Supports four subcommands: `run`, `init`, `status`,
//! and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use arca_core::config::DEFAULT_RPC_URL;

/// ARCA custodial wallet server.
///
/// Serves the wallet REST API: balance ledger, custodial card issuance,
/// on-chain balance reads, and signed on-chain transfers. Card private
/// keys are sealed under AES-256-GCM and never leave the process.
#[derive(Parser, Debug)]
#[command(
    name = "arca-server",
    about = "ARCA custodial wallet server",
    version,
    propagate_version = true
)]
pub struct ArcaServerCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the ARCA server binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the wallet server.
    Run(RunArgs),
    /// Initialize a new data directory.
    Init(InitArgs),
    /// Query the status of a running server via its API endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the data directory where the ledger and card store live.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "ARCA_DATA_DIR", default_value = "~/.arca")]
    pub data_dir: PathBuf,

    /// Port for the wallet REST API.
    #[arg(long, env = "ARCA_API_PORT", default_value_t = 8471)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ARCA_METRICS_PORT", default_value_t = 8472)]
    pub metrics_port: u16,

    /// JSON-RPC endpoint of the chain node.
    #[arg(long, env = "ARCA_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Default log level when RUST_LOG is not set.
    #[arg(long, env = "ARCA_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "ARCA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Clamp overdrafting ledger debits to zero instead of rejecting them.
    ///
    /// Applies to off-chain postings only. Mirror debits for confirmed
    /// on-chain sends always clamp.
    #[arg(long, env = "ARCA_CLAMP_OVERDRAFT")]
    pub clamp_overdraft: bool,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "ARCA_DATA_DIR", default_value = "~/.arca")]
    pub data_dir: PathBuf,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running server.
    #[arg(long, default_value = "http://127.0.0.1:8471")]
    pub api_url: String,
}
