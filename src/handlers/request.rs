use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Map, Value};

use crate::error::ApiError;

/// The parts of an HTTP request controllers read
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub query: Map<String, Value>,
    /// Parsed JSON or form body; `None` when absent or unparseable
    pub body: Option<Value>,
    pub authorization: Option<String>,
    /// A body was sent but is not JSON
    malformed_body: bool,
}

impl HttpRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            query: Map::new(),
            body: None,
            authorization: None,
            malformed_body: false,
        }
    }

    pub fn from_parts(method: Method, query: Option<&str>, headers: &HeaderMap, body: &[u8]) -> Self {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string());

        let is_form = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        let parsed = if body.is_empty() {
            None
        } else if is_form {
            Some(Value::Object(form_map(body)))
        } else {
            serde_json::from_slice(body).ok()
        };

        Self {
            method,
            query: query.map(|q| form_map(q.as_bytes())).unwrap_or_default(),
            malformed_body: !body.is_empty() && parsed.is_none(),
            body: parsed,
            authorization,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_bearer(mut self, token: &str) -> Self {
        self.authorization = Some(format!("Bearer {}", token));
        self
    }

    /// Request data by method: the query string for GET, the body object for
    /// POST (empty when absent), the body object for PUT and DELETE. A body
    /// that is unparseable or not an object is an invalid request.
    pub fn data(&self) -> Result<Map<String, Value>, ApiError> {
        let body_object = || match &self.body {
            Some(Value::Object(map)) => Some(map.clone()),
            _ => None,
        };

        let data = match self.method {
            Method::GET => Some(self.query.clone()),
            _ if self.malformed_body => None,
            Method::POST if self.body.is_none() => Some(Map::new()),
            Method::POST => body_object(),
            Method::PUT | Method::DELETE => body_object(),
            _ => None,
        };
        data.ok_or_else(|| ApiError::bad_request("Invalid Request."))
    }

    /// The method after honoring a `_method` override in the request data
    pub fn effective_method(&self, data: &Map<String, Value>) -> Method {
        data.get("_method")
            .and_then(Value::as_str)
            .and_then(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
            .unwrap_or_else(|| self.method.clone())
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.authorization.as_deref().and_then(crate::auth::bearer_token)
    }
}

fn form_map(raw: &[u8]) -> Map<String, Value> {
    url::form_urlencoded::parse(raw)
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// Trim surrounding whitespace and backslash escapes from every string value,
/// one level into arrays.
pub fn sanitize(data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| {
            let clean = match value {
                Value::String(s) => Value::String(clean_text(s)),
                Value::Array(items) => Value::Array(
                    items
                        .iter()
                        .map(|item| match item {
                            Value::String(s) => Value::String(clean_text(s)),
                            other => other.clone(),
                        })
                        .collect(),
                ),
                other => other.clone(),
            };
            (key.clone(), clean)
        })
        .collect()
}

fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// Status plus JSON body, the result of every controller action
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl JsonResponse {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn created(body: Value) -> Self {
        Self::new(StatusCode::CREATED, body)
    }

    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(status, serde_json::json!({ "message": message.into() }))
    }
}

impl From<ApiError> for JsonResponse {
    fn from(err: ApiError) -> Self {
        Self::new(err.status_code(), err.to_json())
    }
}

impl IntoResponse for JsonResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn data_follows_method() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer t0k".parse().unwrap());
        let get = HttpRequest::from_parts(Method::GET, Some("a=1&b=x%20y"), &headers, b"");
        assert_eq!(get.data().unwrap(), object(json!({"a": "1", "b": "x y"})));
        assert_eq!(get.bearer_token(), Some("t0k"));

        let post = HttpRequest::new(Method::POST);
        assert!(post.data().unwrap().is_empty());

        let put = HttpRequest::new(Method::PUT);
        assert!(put.data().is_err());

        let put = HttpRequest::new(Method::PUT).with_body(json!({"sku": "A"}));
        assert_eq!(put.data().unwrap()["sku"], json!("A"));

        assert!(HttpRequest::new(Method::PATCH).data().is_err());
    }

    #[test]
    fn form_bodies_are_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        let req = HttpRequest::from_parts(Method::POST, None, &headers, b"email=a%40b.co&password=x");
        assert_eq!(req.data().unwrap()["email"], json!("a@b.co"));
    }

    #[test]
    fn malformed_bodies_are_invalid_requests() {
        let headers = HeaderMap::new();
        let broken = HttpRequest::from_parts(Method::POST, None, &headers, b"{\"sku\": ");
        let err = broken.data().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Invalid Request.");

        let array = HttpRequest::from_parts(Method::POST, None, &headers, b"[1, 2]");
        assert!(array.data().is_err());

        let query_only = HttpRequest::from_parts(Method::GET, Some("a=1"), &headers, b"oops");
        assert_eq!(query_only.data().unwrap()["a"], json!("1"));
    }

    #[test]
    fn method_override() {
        let req = HttpRequest::new(Method::POST);
        assert_eq!(req.effective_method(&object(json!({"_method": "put"}))), Method::PUT);
        assert_eq!(req.effective_method(&Map::new()), Method::POST);
    }

    #[test]
    fn sanitize_trims_and_unescapes() {
        let clean = sanitize(&object(json!({
            "name": "  O\\'Reilly ",
            "product_ids": [" 1", 2],
            "price": 10
        })));
        assert_eq!(clean["name"], json!("O'Reilly"));
        assert_eq!(clean["product_ids"], json!(["1", 2]));
        assert_eq!(clean["price"], json!(10));
    }
}
