//! In-process test server

use aws_sdk_iam::config::{BehaviorVersion, Credentials, Region};
use mockstack::{create_router, AppState, Config};
use mockstack_lambda::Executor;
use mockstack_auth::ScopeDefaults;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Access key used by [`MockAws::sdk_config`]; maps to the default account
pub const TEST_ACCESS_KEY: &str = "testing";

#[derive(Debug, Error)]
pub enum TestError {
    #[error("Failed to bind test server: {0}")]
    Bind(#[from] std::io::Error),
}

/// A MockStack server running on a background task
///
/// Dropping the guard stops the server and discards all state.
pub struct MockAws {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockAws {
    /// Start a server with the default configuration
    pub async fn start() -> Result<Self, TestError> {
        Self::start_with(Config::default()).await
    }

    /// Start a server with the given configuration on a random local port
    pub async fn start_with(config: Config) -> Result<Self, TestError> {
        let state = AppState::new(&config);
        Self::serve(config, state).await
    }

    /// Start a server whose Lambda handlers run through `executor`
    pub async fn start_with_executor(
        config: Config,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, TestError> {
        let state = AppState::with_executor(&config, executor);
        Self::serve(config, state).await
    }

    async fn serve(config: Config, state: AppState) -> Result<Self, TestError> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let defaults = ScopeDefaults {
            account_id: config.scope.account_id.clone(),
            region: config.scope.region.clone(),
        };
        let app = create_router(state, defaults);
        let (shutdown, signal) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = signal.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "Test server failed");
            }
        });

        info!(%addr, "MockStack test server started");
        Ok(Self {
            addr,
            shutdown: Some(shutdown),
            handle,
        })
    }

    /// Base URL to use as the SDK endpoint
    pub fn endpoint_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// SDK configuration with static test credentials in `region`
    pub async fn sdk_config(&self, region: &str) -> aws_config::SdkConfig {
        aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(self.endpoint_url())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                TEST_ACCESS_KEY,
                "testing",
                None,
                None,
                "mockstack-test",
            ))
            .load()
            .await
    }
}

impl Drop for MockAws {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.handle.abort();
    }
}
