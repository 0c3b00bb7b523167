//! HTTP API server for the intake gateway

pub mod health;
pub mod webhooks;

use std::sync::Arc;

use axum::Router;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::Result;
use crate::db::DbPool;
use crate::engine::ConversationEngine;
use crate::session::Deduplicator;

/// Shared state for API handlers
pub struct ApiState {
    pub db: DbPool,
    pub engine: Arc<ConversationEngine>,
    /// Recently processed webhook message ids
    pub dedup: Mutex<Deduplicator>,
    /// Token Meta must echo during webhook verification
    pub verify_token: Option<SecretString>,
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    db: DbPool,
    engine: Arc<ConversationEngine>,
    port: u16,
    verify_token: Option<SecretString>,
    dedup_capacity: Option<usize>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub const fn new(db: DbPool, engine: Arc<ConversationEngine>, port: u16) -> Self {
        Self {
            db,
            engine,
            port,
            verify_token: None,
            dedup_capacity: None,
        }
    }

    /// Set the webhook verification token
    #[must_use]
    pub fn verify_token(mut self, token: Option<SecretString>) -> Self {
        self.verify_token = token;
        self
    }

    /// Set how many webhook message ids are remembered
    #[must_use]
    pub const fn dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = Some(capacity);
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let dedup = self
            .dedup_capacity
            .map_or_else(Deduplicator::default, Deduplicator::new);

        ApiServer {
            state: Arc::new(ApiState {
                db: self.db,
                engine: self.engine,
                dedup: Mutex::new(dedup),
                verify_token: self.verify_token,
            }),
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .nest("/api", webhooks::router(self.state.clone()))
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }
}
