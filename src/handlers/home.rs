// handlers/home.rs - service banner and health probe

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;

use crate::error::ApiError;
use crate::handlers::request::{HttpRequest, JsonResponse};
use crate::routing::{Action, Controller, RequestContext};

const ACTIONS: &[Action] = &[Action::new("index", 0), Action::new("health", 0)];

pub struct HomeController {
    ctx: Arc<RequestContext>,
}

impl HomeController {
    pub fn new(ctx: Arc<RequestContext>) -> Self {
        Self { ctx }
    }

    fn index(&self) -> JsonResponse {
        JsonResponse::ok(json!({
            "name": "Product Page API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "products": "/ (GET)",
                "add_product": "/add-product (GET, POST)",
                "edit_product": "/edit-product/{id} (GET, PUT; bearer token)",
                "mass_delete": "/product/massDelete (DELETE)",
                "sign_up": "/user/sign-up (POST)",
                "sign_in": "/user/sign-in (POST)",
                "logout": "/user/logout (POST)",
                "refresh": "/user/refresh/ (POST)",
                "health": "/home/health (GET)",
            },
        }))
    }

    async fn health(&self) -> JsonResponse {
        let now = chrono::Utc::now();

        match self.ctx.ping().await {
            Ok(()) => JsonResponse::ok(json!({
                "status": "ok",
                "timestamp": now,
                "database": "ok",
            })),
            Err(e) => {
                tracing::warn!("Health check failed: {}", e);
                JsonResponse::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({
                        "status": "degraded",
                        "timestamp": now,
                        "database": "unavailable",
                    }),
                )
            }
        }
    }
}

#[async_trait]
impl Controller for HomeController {
    fn actions(&self) -> &'static [Action] {
        ACTIONS
    }

    async fn invoke(
        &mut self,
        action: &'static str,
        _args: Vec<String>,
        _request: &HttpRequest,
    ) -> Result<JsonResponse, ApiError> {
        Ok(match action {
            "health" => self.health().await,
            _ => self.index(),
        })
    }
}
