// handlers/error.rs - fixed error responses
//
// The dispatcher answers through these when a path names no controller or
// no usable action. The same responses are reachable as `/error/<action>`.

use async_trait::async_trait;
use axum::http::StatusCode;

use crate::error::ApiError;
use crate::handlers::request::{HttpRequest, JsonResponse};
use crate::routing::{Action, Controller};

const ACTIONS: &[Action] = &[
    Action::new("index", 0),
    Action::new("pageNotFound", 0),
    Action::new("invalidParameters", 0),
    Action::new("invalidRequest", 0),
];

#[derive(Debug, Default)]
pub struct ErrorHandler;

impl ErrorHandler {
    pub fn page_not_found() -> JsonResponse {
        JsonResponse::message(StatusCode::NOT_FOUND, "Page not found.")
    }

    pub fn invalid_parameters() -> JsonResponse {
        JsonResponse::message(StatusCode::BAD_REQUEST, "Invalid parameters.")
    }

    pub fn invalid_request() -> JsonResponse {
        JsonResponse::message(StatusCode::BAD_REQUEST, "Invalid Request.")
    }
}

#[async_trait]
impl Controller for ErrorHandler {
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
            "invalidParameters" => Self::invalid_parameters(),
            "invalidRequest" => Self::invalid_request(),
            _ => Self::page_not_found(),
        })
    }
}
