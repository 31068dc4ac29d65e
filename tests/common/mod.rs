#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use product_page_api::auth::TokenService;
use product_page_api::config::AppConfig;
use product_page_api::database::connection::{Row, StatementOutcome};
use product_page_api::routing::RouteTable;
use product_page_api::testing::{ScriptedConnection, ScriptedSource};
use product_page_api::{app, AppState};

pub const SECRET: &str = "integration-secret";

/// The full HTTP stack over a scripted database
pub struct TestApp {
    pub router: axum::Router,
    pub db: Arc<ScriptedConnection>,
}

impl TestApp {
    pub fn new() -> Self {
        let db = ScriptedConnection::new();
        let state = AppState::new(
            RouteTable::bundled().expect("bundled routes parse"),
            Arc::new(ScriptedSource::new(db.clone())),
            TokenService::new(SECRET, 1),
        );
        Self {
            router: app(state, &AppConfig::development()),
            db,
        }
    }

    /// Queue a statement outcome for the scripted database
    pub fn returns(&self, outcome: StatementOutcome) -> &Self {
        self.db.push(outcome);
        self
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }

    pub async fn get(&self, uri: &str) -> Result<(StatusCode, Value)> {
        self.send(request(Method::GET, uri, None, None)).await
    }

    pub async fn json(&self, method: Method, uri: &str, body: Value) -> Result<(StatusCode, Value)> {
        self.send(request(method, uri, Some(body), None)).await
    }
}

pub fn request(method: Method, uri: &str, body: Option<Value>, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("valid request"),
        None => builder.body(Body::empty()).expect("valid request"),
    }
}

pub fn token_for(user_id: u64) -> String {
    TokenService::new(SECRET, 1)
        .create_jwt(user_id)
        .expect("token signs")
}

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row must be an object")
}
