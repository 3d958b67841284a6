use std::process::ExitCode;
use std::str::FromStr;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use api_gateway::config::LogLevel;
use api_gateway::config::schema::vars;
use api_gateway::{GatewayError, RawConfig, ServerLifecycle, utils};

#[tokio::main]
async fn main() -> ExitCode {
    let raw = RawConfig::from_env();

    // Initialize logging
    let default_level = raw
        .as_ref()
        .ok()
        .and_then(|raw| raw.get(vars::LOG_LEVEL))
        .and_then(|level| LogLevel::from_str(level).ok())
        .unwrap_or(LogLevel::Info);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter())),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!("Starting API Gateway v{}", env!("CARGO_PKG_VERSION"));

    match run(raw).await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(e) => {
            match &e {
                GatewayError::Configuration(violations) => violations.log(),
                other => error!("{other}"),
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Start the gateway and serve until SIGINT/SIGTERM.
async fn run(raw: Result<RawConfig, dotenvy::Error>) -> Result<(), GatewayError> {
    let server = ServerLifecycle::new(raw?).start().await?;
    server.serve(utils::shutdown_signal()).await
}
