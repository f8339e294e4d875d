//! MockStack server binary

use clap::Parser;
use mockstack::{create_router, AppState, Config};
use mockstack_auth::ScopeDefaults;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mockstack")]
#[command(about = "Local AWS emulator for IAM, Lambda and CloudWatch Logs", long_about = None)]
struct Args {
    /// Configuration file (defaults to an optional ./mockstack.toml)
    #[arg(short, long, env = "MOCKSTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "MOCKSTACK_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MOCKSTACK_HOST")]
    host: Option<String>,

    /// Region for unsigned requests
    #[arg(long, env = "MOCKSTACK_REGION")]
    region: Option<String>,

    /// Account for requests without a numeric access key
    #[arg(long, env = "MOCKSTACK_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Python interpreter used to run Lambda handlers
    #[arg(long, env = "MOCKSTACK_LAMBDA_PYTHON")]
    lambda_python: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MOCKSTACK_LOG_LEVEL")]
    log_level: String,
}

impl Args {
    /// Command line values win over file and environment configuration
    fn apply(self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(region) = self.region {
            config.scope.region = region;
        }
        if let Some(account_id) = self.account_id {
            config.scope.account_id = account_id;
        }
        if let Some(python) = self.lambda_python {
            config.lambda.python = python;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                let level = &args.log_level;
                format!(
                    "mockstack={level},mockstack_iam={level},mockstack_logs={level},mockstack_lambda={level},tower_http=debug"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load(args.config.as_deref())?;
    let config = args.apply(config);

    info!("Starting MockStack...");
    info!("  IAM: {}", enabled(config.services.iam));
    info!("  Logs: {}", enabled(config.services.logs));
    info!(
        "  Lambda: {} (python: {})",
        enabled(config.services.lambda),
        config.lambda.python
    );

    let defaults = ScopeDefaults {
        account_id: config.scope.account_id.clone(),
        region: config.scope.region.clone(),
    };
    let app = create_router(AppState::new(&config), defaults);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("MockStack stopped");
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
