// handlers/user.rs - registration, login, logout check and token refresh
//
// Sessions are stateless: a login hands out an HS256 token carrying the user
// id, and every later check only validates that token.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde_json::json;
use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::database::dao::UserDao;
use crate::database::models::UserDto;
use crate::error::ApiError;
use crate::handlers::request::{sanitize, HttpRequest, JsonResponse};
use crate::handlers::validation::Validator;
use crate::routing::{Action, Controller, RequestContext};

const ACTIONS: &[Action] = &[
    Action::new("signUp", 0),
    Action::new("signIn", 0),
    Action::new("logoutValidate", 0),
    Action::new("refreshToken", 0),
];

const MIN_PASSWORD_LENGTH: usize = 8;

pub struct UserController {
    ctx: Arc<RequestContext>,
}

impl UserController {
    pub fn new(ctx: Arc<RequestContext>) -> Self {
        Self { ctx }
    }

    async fn users(&self) -> Result<UserDao, ApiError> {
        Ok(UserDao::new(self.ctx.connection().await?))
    }

    fn session(&self, message: &str, status: StatusCode, user_id: u64) -> Result<JsonResponse, ApiError> {
        let jwt = self.ctx.tokens().create_jwt(user_id)?;
        Ok(JsonResponse::new(
            status,
            json!({
                "message": message,
                "jwt": jwt,
                "userId": user_id,
            }),
        ))
    }

    async fn sign_up(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        if request.method != Method::POST {
            return Err(ApiError::method_not_allowed("Invalid method for signing up"));
        }

        let data = sanitize(&request.data()?);
        let mut v = Validator::new(&data);
        let name = v.required("name");
        let email = v.email("email");
        let password = v.min_length("password", MIN_PASSWORD_LENGTH);
        v.matches("password_confirmation", "password");

        let mut users = self.users().await?;
        if let Some(email) = &email {
            if users.find_by_email(email).await?.is_some() {
                v.unique("email");
            }
        }
        v.finish()?;

        let (Some(name), Some(email), Some(password)) = (name, email, password) else {
            return Err(ApiError::bad_request("Invalid parameters."));
        };

        let hash = hash_password(&password).map_err(|e| {
            warn!("Password hashing failed: {}", e);
            ApiError::internal_server_error("Error hashing password")
        })?;

        let user_id = users.create(&UserDto::new(name, email.as_str(), hash)).await?;
        if user_id == 0 {
            return Err(ApiError::internal_server_error("Error creating user"));
        }

        info!(user_id, email = %email, "User registered");
        self.session("User created successfully", StatusCode::CREATED, user_id)
    }

    async fn sign_in(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        if request.method != Method::POST {
            return Err(ApiError::method_not_allowed("Invalid method for signing in"));
        }

        let data = sanitize(&request.data()?);
        let mut v = Validator::new(&data);
        let email = v.required("email");
        let password = v.required("password");
        v.finish()?;

        let (Some(email), Some(password)) = (email, password) else {
            return Err(ApiError::bad_request("Invalid parameters."));
        };

        let user = self.users().await?.find_by_email(&email).await?;
        let user_id = user
            .filter(|user| verify_password(&password, &user.password))
            .and_then(|user| user.id);

        match user_id {
            Some(user_id) => {
                info!(user_id, "User logged in");
                self.session("User logged in successfully", StatusCode::CREATED, user_id)
            }
            None => Err(ApiError::unauthorized("Invalid email or password")),
        }
    }

    fn logout_validate(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        if request.method != Method::POST {
            return Err(ApiError::method_not_allowed("Invalid method for logging out"));
        }

        match self.ctx.tokens().user_id_from_jwt(request.bearer_token()) {
            Some(_) => Ok(JsonResponse::message(StatusCode::CREATED, "Logout successful")),
            None => Err(ApiError::bad_request("Error logging out. Please try again.")),
        }
    }

    fn refresh_token(&self, request: &HttpRequest) -> Result<JsonResponse, ApiError> {
        if request.method != Method::POST {
            return Err(ApiError::method_not_allowed("Invalid method for refreshing token"));
        }

        let Some(user_id) = self.ctx.tokens().user_id_from_jwt(request.bearer_token()) else {
            return Err(ApiError::unauthorized("Invalid token"));
        };
        let jwt = self.ctx.tokens().create_jwt(user_id)?;
        Ok(JsonResponse::ok(json!({ "jwt": jwt })))
    }
}

#[async_trait]
impl Controller for UserController {
    fn actions(&self) -> &'static [Action] {
        ACTIONS
    }

    async fn invoke(
        &mut self,
        action: &'static str,
        _args: Vec<String>,
        request: &HttpRequest,
    ) -> Result<JsonResponse, ApiError> {
        match action {
            "signUp" => self.sign_up(request).await,
            "signIn" => self.sign_in(request).await,
            "logoutValidate" => self.logout_validate(request),
            _ => self.refresh_token(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenService;
    use crate::database::connection::{Row, StatementOutcome};
    use crate::database::statement::BoundValue;
    use crate::testing::{ScriptedConnection, ScriptedSource};
    use serde_json::Value;

    const SECRET: &str = "user-secret";

    fn tokens() -> TokenService {
        TokenService::new(SECRET, 1)
    }

    async fn call(conn: &Arc<ScriptedConnection>, action: &'static str, request: HttpRequest) -> JsonResponse {
        let ctx = RequestContext::new(Arc::new(ScriptedSource::new(conn.clone())), Arc::new(tokens()));
        match UserController::new(Arc::new(ctx))
            .invoke(action, Vec::new(), &request)
            .await
        {
            Ok(response) => response,
            Err(err) => err.into(),
        }
    }

    fn user_row(id: u64, email: &str, password: &str) -> Row {
        json!({
            "id": id,
            "name": "Ada",
            "email": email,
            "password": hash_password(password).unwrap(),
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn sign_up_stores_a_hash_and_returns_a_session() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::default());
        conn.push(StatementOutcome::inserted(5));

        let request = HttpRequest::new(Method::POST).with_body(json!({
            "name": "Ada",
            "email": "ada@example.com",
            "password": "correct horse",
            "password_confirmation": "correct horse"
        }));
        let response = call(&conn, "signUp", request).await;

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.body["message"], json!("User created successfully"));
        assert_eq!(response.body["userId"], json!(5));
        let jwt = response.body["jwt"].as_str().unwrap();
        assert_eq!(tokens().user_id_from_jwt(Some(jwt)), Some(5));

        let insert = &conn.executed()[1];
        assert_eq!(insert.sql, "INSERT INTO users (email, password, name) VALUES (?, ?, ?)");
        match &insert.values[1] {
            BoundValue::Str(hash) => {
                assert!(hash.starts_with("$argon2"));
                assert!(verify_password("correct horse", hash));
            }
            other => panic!("unexpected password binding {:?}", other),
        }
    }

    #[tokio::test]
    async fn sign_up_validates_every_rule() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![user_row(1, "taken@example.com", "password1")]));

        let request = HttpRequest::new(Method::POST).with_body(json!({
            "email": "taken@example.com",
            "password": "short",
            "password_confirmation": "shorter"
        }));
        let response = call(&conn, "signUp", request).await;

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        let errors = &response.body["errors"];
        assert_eq!(errors["name"], json!(["name is required"]));
        assert_eq!(errors["email"], json!(["email already exists in the database"]));
        assert_eq!(errors["password"], json!(["password should be at least 8 characters"]));
        assert_eq!(
            errors["password_confirmation"],
            json!(["password_confirmation and password do not match"])
        );
        assert_eq!(conn.executed().len(), 1);
    }

    #[tokio::test]
    async fn sign_up_requires_post() {
        let conn = ScriptedConnection::new();
        let response = call(&conn, "signUp", HttpRequest::new(Method::GET)).await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn sign_in_checks_the_password() {
        let conn = ScriptedConnection::new();
        conn.push(StatementOutcome::rows(vec![user_row(9, "ada@example.com", "password1")]));
        conn.push(StatementOutcome::rows(vec![user_row(9, "ada@example.com", "password1")]));

        let ok = call(
            &conn,
            "signIn",
            HttpRequest::new(Method::POST)
                .with_body(json!({"email": "ada@example.com", "password": "password1"})),
        )
        .await;
        assert_eq!(ok.status, StatusCode::CREATED);
        assert_eq!(ok.body["message"], json!("User logged in successfully"));
        assert_eq!(ok.body["userId"], json!(9));

        let bad = call(
            &conn,
            "signIn",
            HttpRequest::new(Method::POST)
                .with_body(json!({"email": "ada@example.com", "password": "password2"})),
        )
        .await;
        assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
        assert_eq!(bad.body, json!({"message": "Invalid email or password"}));
    }

    #[tokio::test]
    async fn unknown_email_is_unauthorized() {
        let conn = ScriptedConnection::new();
        let response = call(
            &conn,
            "signIn",
            HttpRequest::new(Method::POST)
                .with_body(json!({"email": "nobody@example.com", "password": "password1"})),
        )
        .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_validates_the_bearer_token() {
        let conn = ScriptedConnection::new();
        let jwt = tokens().create_jwt(3).unwrap();

        let ok = call(&conn, "logoutValidate", HttpRequest::new(Method::POST).with_bearer(&jwt)).await;
        assert_eq!(ok.status, StatusCode::CREATED);
        assert_eq!(ok.body, json!({"message": "Logout successful"}));

        let bad = call(&conn, "logoutValidate", HttpRequest::new(Method::POST)).await;
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
        assert_eq!(bad.body["message"], json!("Error logging out. Please try again."));
    }

    #[tokio::test]
    async fn refresh_issues_a_new_token_for_the_same_user() {
        let conn = ScriptedConnection::new();
        let jwt = tokens().create_jwt(3).unwrap();

        let ok = call(&conn, "refreshToken", HttpRequest::new(Method::POST).with_bearer(&jwt)).await;
        assert_eq!(ok.status, StatusCode::OK);
        let fresh = ok.body["jwt"].as_str().map(str::to_string);
        assert_eq!(tokens().user_id_from_jwt(fresh.as_deref()), Some(3));

        let other = TokenService::new("another-secret", 1).create_jwt(3).unwrap();
        let bad = call(&conn, "refreshToken", HttpRequest::new(Method::POST).with_bearer(&other)).await;
        assert_eq!(bad.status, StatusCode::UNAUTHORIZED);
        assert_eq!(bad.body, json!({"message": "Invalid token"}));
        assert_eq!(ok.body.get("message"), None::<&Value>);
    }
}
