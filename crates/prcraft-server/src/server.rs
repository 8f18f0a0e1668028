use axum::http::{header::HeaderValue, request::Parts};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use prcraft_config::Config;
use prcraft_github::{GitHostFactory, GitHubClientFactory};
use prcraft_storage::{Database, TaskRepository, TaskStore};

use crate::publish::PublishSettings;
use crate::routes;

/// Shared handles for every request. Tokens are never kept here; each
/// request connects its own host through `hosts`.
pub struct ServerState {
    pub store: Arc<dyn TaskStore>,
    pub hosts: Arc<dyn GitHostFactory>,
    pub settings: PublishSettings,
}

impl ServerState {
    pub fn new(
        store: Arc<dyn TaskStore>,
        hosts: Arc<dyn GitHostFactory>,
        settings: PublishSettings,
    ) -> Self {
        Self {
            store,
            hosts,
            settings,
        }
    }

    /// Opens the configured database and a GitHub client factory.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = Database::new(&config.database_path()).await?;
        let hosts = GitHubClientFactory::new(
            config.api_base(),
            config.user_agent(),
            Duration::from_secs(config.timeout_secs()),
        )?;
        Ok(Self::new(
            Arc::new(TaskRepository::new(db.pool().clone())),
            Arc::new(hosts),
            PublishSettings::from_config(config),
        ))
    }
}

fn is_allowed_origin(origin: &str, extra: &[String]) -> bool {
    origin.starts_with("http://localhost:")
        || origin.starts_with("http://127.0.0.1:")
        || extra.iter().any(|allowed| allowed == origin)
}

fn cors_layer(extra: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| is_allowed_origin(origin, &extra))
                    .unwrap_or(false)
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_app(state: Arc<ServerState>, cors_origins: Vec<String>) -> Router {
    routes::router()
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.hostname(), config.port()).parse()?;
    let state = Arc::new(ServerState::from_config(config).await?);
    run_server_with_state(addr, state, config.cors_origins()).await
}

pub async fn run_server_with_state(
    addr: SocketAddr,
    state: Arc<ServerState>,
    cors_origins: Vec<String>,
) -> anyhow::Result<()> {
    let app = build_app(state, cors_origins);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
