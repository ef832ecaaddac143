use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

use crate::store::INSTANCE_TTL;
use crate::ServerConfig;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5174;
const DEFAULT_BASE_URL: &str = "http://localhost:5173";

#[derive(Parser, Debug)]
#[command(name = "nlui-mcp", bin_name = "nlui-mcp")]
#[command(about = "Stateless MCP endpoint that turns UI descriptions into renderable links", version)]
pub struct NluiMcpCli {
    #[arg(long, short = 'H', default_value = DEFAULT_HOST)]
    host: String,

    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Page that renders stored instances.
    #[arg(long = "base-url", env = "NLUI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long = "sweep-interval-secs", default_value_t = 3600)]
    sweep_interval_secs: u64,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[arg(long = "cors-allow-origin", short = 'O')]
    cors_allow_origin: Vec<String>,

    #[arg(long = "cors-allow-method", short = 'M')]
    cors_allow_method: Vec<String>,

    #[arg(long = "cors-allow-header", short = 'A')]
    cors_allow_header: Vec<String>,

    #[arg(long = "cors-allow-credentials", short = 'C')]
    cors_allow_credentials: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Logfmt,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid base url {0:?}: {1}")]
    InvalidBaseUrl(String, url::ParseError),
    #[error("sweep interval must be at least one second")]
    InvalidSweepInterval,
    #[error("sweep interval of {0}s must be shorter than the {1}s instance ttl")]
    SweepIntervalExceedsTtl(u64, u64),
    #[error("invalid cors origin: {0}")]
    InvalidCorsOrigin(String),
    #[error("invalid cors method: {0}")]
    InvalidCorsMethod(String),
    #[error("invalid cors header: {0}")]
    InvalidCorsHeader(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("server error: {0}")]
    Server(String),
}

pub fn run_nlui_mcp() -> Result<(), CliError> {
    let cli = NluiMcpCli::parse();
    init_logging(cli.log_format);
    run_server(&cli)
}

pub fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Logfmt => registry
            .with(
                tracing_logfmt::builder()
                    .layer()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

pub fn server_config(cli: &NluiMcpCli) -> Result<ServerConfig, CliError> {
    let base_url = Url::parse(&cli.base_url)
        .map_err(|err| CliError::InvalidBaseUrl(cli.base_url.clone(), err))?;
    if cli.sweep_interval_secs == 0 {
        return Err(CliError::InvalidSweepInterval);
    }
    let sweep_interval = Duration::from_secs(cli.sweep_interval_secs);
    if sweep_interval >= INSTANCE_TTL {
        return Err(CliError::SweepIntervalExceedsTtl(
            cli.sweep_interval_secs,
            INSTANCE_TTL.as_secs(),
        ));
    }
    let cors = if cli.cors_allow_origin.is_empty() {
        None
    } else {
        Some(build_cors_layer(cli)?)
    };
    Ok(ServerConfig {
        base_url,
        sweep_interval,
        cors,
    })
}

fn run_server(cli: &NluiMcpCli) -> Result<(), CliError> {
    let config = server_config(cli)?;
    let addr = format!("{}:{}", cli.host, cli.port);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::Server(err.to_string()))?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(
            addr = %addr,
            base_url = %config.base_url,
            sweep_interval_secs = config.sweep_interval.as_secs(),
            cors = config.cors.is_some(),
            "server listening"
        );
        crate::serve(listener, config, async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .map_err(|err| CliError::Server(err.to_string()))
    })
}

fn build_cors_layer(cli: &NluiMcpCli) -> Result<CorsLayer, CliError> {
    let mut origins = Vec::new();
    for origin in &cli.cors_allow_origin {
        let value = origin
            .parse()
            .map_err(|_| CliError::InvalidCorsOrigin(origin.clone()))?;
        origins.push(value);
    }
    let mut cors = CorsLayer::new().allow_origin(origins);

    if cli.cors_allow_method.is_empty() {
        cors = cors.allow_methods(Any);
    } else {
        let mut methods = Vec::new();
        for method in &cli.cors_allow_method {
            let parsed = method
                .parse()
                .map_err(|_| CliError::InvalidCorsMethod(method.clone()))?;
            methods.push(parsed);
        }
        cors = cors.allow_methods(methods);
    }

    if cli.cors_allow_header.is_empty() {
        cors = cors.allow_headers(Any);
    } else {
        let mut headers = Vec::new();
        for header in &cli.cors_allow_header {
            let parsed = header
                .parse()
                .map_err(|_| CliError::InvalidCorsHeader(header.clone()))?;
            headers.push(parsed);
        }
        cors = cors.allow_headers(headers);
    }

    if cli.cors_allow_credentials {
        cors = cors.allow_credentials(true);
    }

    Ok(cors)
}
