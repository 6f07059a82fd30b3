//! API authorizer - bearer token in, composed claims out

use std::process::ExitCode;

use axum::http::{HeaderMap, HeaderValue, header};
use clap::Parser;
use tracing::{error, info};

use api_authorizer::{
    authorizer::{AuthDecision, Authorizer},
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&cli),
        Some(Command::Verify { ref token }) => run_verify(&cli, token).await,
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

fn run_check_config(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    println!("Configuration is valid");
    println!("  API:        {}", config.api.name);
    println!("  Issuer:     {}", config.oauth.issuer);
    println!("  Audiences:  {}", config.oauth.audiences.join(", "));
    println!("  JWKS:       {}", config.oauth.jwks_endpoint);
    println!("  User info:  {}", config.oauth.userinfo_endpoint);
    println!("  Cache:      {:?}", config.cache.backend);
    ExitCode::SUCCESS
}

async fn run_verify(cli: &Cli, token: &str) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    let authorizer = match Authorizer::from_config(&config).await {
        Ok(a) => a,
        Err(e) => {
            error!("Failed to create authorizer: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) else {
        eprintln!("Token contains characters not allowed in a header");
        return ExitCode::FAILURE;
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::AUTHORIZATION, value);

    let (body, code) = match authorizer.authorize(&headers).await {
        AuthDecision::Allow(claims) => (serde_json::to_string_pretty(&claims), ExitCode::SUCCESS),
        AuthDecision::Deny(e) => (serde_json::to_string_pretty(&e.to_body()), ExitCode::FAILURE),
    };

    match body {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Failed to serialize result: {e}");
            return ExitCode::FAILURE;
        }
    }
    code
}

async fn run_server(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        api = %config.api.name,
        cache = ?config.cache.backend,
        "Starting API authorizer"
    );

    let gateway = match Gateway::new(config).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Shutdown complete");
    ExitCode::SUCCESS
}
