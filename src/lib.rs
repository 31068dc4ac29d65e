pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod routing;
pub mod testing;

use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Uri};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::TokenService;
use crate::config::{AppConfig, Environment};
use crate::database::connection::ConnectionSource;
use crate::database::manager::DatabaseManager;
use crate::handlers::{HttpRequest, JsonResponse};
use crate::routing::{Dispatcher, RouteTable, Router};

/// Everything a request needs, shared across the server
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<Router>,
    pub dispatcher: Arc<Dispatcher>,
    pub log_requests: bool,
}

impl AppState {
    pub fn new(routes: RouteTable, source: Arc<dyn ConnectionSource>, tokens: TokenService) -> Self {
        Self {
            router: Arc::new(Router::new(routes)),
            dispatcher: Arc::new(Dispatcher::new(handlers::registry(), source, Arc::new(tokens))),
            log_requests: false,
        }
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }
}

/// The HTTP application. Every path goes through the route table and the
/// dispatcher; axum only supplies the transport.
pub fn app(state: AppState, config: &AppConfig) -> axum::Router {
    axum::Router::new()
        .fallback(handle)
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

/// Serve on `port` until ctrl-c, then close the pool
pub async fn serve(config: &AppConfig, port: u16) -> anyhow::Result<()> {
    if config.environment == Environment::Production && config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set in production");
    }

    let manager = Arc::new(DatabaseManager::connect_lazy(&config.database)?);
    let routes = RouteTable::load(config.api.routes_file.as_deref())?;
    let state = AppState::new(routes, manager.clone(), TokenService::from_config(&config.security))
        .with_request_logging(config.api.enable_request_logging);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("Product page API listening on http://{}", bind_addr);

    axum::serve(listener, app(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn handle(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> JsonResponse {
    let target = state.router.check_routes(uri.path());
    debug!(%method, path = uri.path(), %target, "dispatching");

    let request = HttpRequest::from_parts(method, uri.query(), &headers, &body);
    let response = state.dispatcher.dispatch(&target, &request).await;

    if state.log_requests {
        info!(
            method = %request.method,
            path = uri.path(),
            %target,
            status = response.status.as_u16(),
            "request"
        );
    }
    response
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let security = &config.security;
    if !security.enable_cors {
        return CorsLayer::new();
    }

    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = security
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}
