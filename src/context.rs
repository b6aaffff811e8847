//! Application context: configuration plus the connected runner.

use std::sync::Arc;

use crate::config::{Config, TransportKind};
use crate::error::AppError;
use crate::query_runner::{DispatchingRunner, QueryRunner};
use crate::transport::{BoltTransport, HttpTransport};

/// Root application context.
///
/// Holds the shared dependencies the CLI commands work with. Cheap to clone.
#[derive(Clone)]
pub struct Context {
    /// Session-scoped query runner over the configured transport.
    pub runner: Arc<dyn QueryRunner>,
    /// Application configuration.
    pub config: Arc<Config>,
}

impl Context {
    /// Creates a context with an existing runner.
    pub fn new(runner: Arc<dyn QueryRunner>, config: Config) -> Self {
        Self {
            runner,
            config: Arc::new(config),
        }
    }

    /// Connects the configured transport and builds a runner over it.
    pub async fn connect(config: Config) -> Result<Self, AppError> {
        let conn = &config.connection;
        tracing::info!(
            uri = conn.uri(),
            transport = ?conn.transport,
            "Connecting to server"
        );

        let runner: Arc<dyn QueryRunner> = match conn.transport {
            TransportKind::Bolt => {
                tracing::warn!(
                    "Bolt transport does not carry bookmarks; use transport = \"http\" for causal consistency"
                );
                let transport = BoltTransport::connect(
                    conn.uri(),
                    &conn.user,
                    conn.password.as_deref().unwrap_or(""),
                )
                .await?;
                Arc::new(
                    DispatchingRunner::new(transport)
                        .with_database(conn.database.clone())
                        .with_config(&config.runner),
                )
            }
            TransportKind::Http => {
                let transport =
                    HttpTransport::new(conn.uri(), &conn.user, conn.password.as_deref());
                Arc::new(
                    DispatchingRunner::new(transport)
                        .with_database(conn.database.clone())
                        .with_config(&config.runner),
                )
            }
        };

        Ok(Self::new(runner, config))
    }
}
