//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Request-time API authorizer with a sample protected API
#[derive(Parser, Debug)]
#[command(name = "api-authorizer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "API_AUTHORIZER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "API_AUTHORIZER_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "API_AUTHORIZER_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "API_AUTHORIZER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "API_AUTHORIZER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Authorize one access token and print the resulting claims
    Verify {
        /// The access token, without the `Bearer ` prefix
        #[arg(required = true)]
        token: String,
    },
}
