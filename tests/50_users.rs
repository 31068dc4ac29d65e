mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use product_page_api::auth::password::hash_password;
use product_page_api::database::connection::StatementOutcome;
use serde_json::json;

use common::{request, row, token_for, TestApp, SECRET};
use product_page_api::auth::TokenService;

#[tokio::test]
async fn sign_up_then_token_identifies_the_user() -> Result<()> {
    let app = TestApp::new();
    app.returns(StatementOutcome::default())
        .returns(StatementOutcome::inserted(12));

    let (status, body) = app
        .json(
            Method::POST,
            "/user/sign-up",
            json!({
                "name": "Grace Hopper",
                "email": "grace@example.com",
                "password": "cobol-1959",
                "password_confirmation": "cobol-1959"
            }),
        )
        .await?;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], json!("User created successfully"));
    assert_eq!(body["userId"], json!(12));

    let jwt = body["jwt"].as_str().map(str::to_string);
    assert_eq!(TokenService::new(SECRET, 1).user_id_from_jwt(jwt.as_deref()), Some(12));
    Ok(())
}

#[tokio::test]
async fn sign_in_rejects_a_wrong_password() -> Result<()> {
    let app = TestApp::new();
    let stored = row(json!({
        "id": 12,
        "name": "Grace Hopper",
        "email": "grace@example.com",
        "password": hash_password("cobol-1959")?,
    }));
    app.returns(StatementOutcome::rows(vec![stored.clone()]))
        .returns(StatementOutcome::rows(vec![stored]));

    let (status, body) = app
        .json(
            Method::POST,
            "/user/sign-in",
            json!({"email": "grace@example.com", "password": "fortran"}),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"message": "Invalid email or password"}));

    let (status, body) = app
        .json(
            Method::POST,
            "/user/sign-in",
            json!({"email": "grace@example.com", "password": "cobol-1959"}),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["userId"], json!(12));
    Ok(())
}

#[tokio::test]
async fn sign_in_requires_both_fields() -> Result<()> {
    let app = TestApp::new();
    let (status, body) = app
        .json(Method::POST, "/user/sign-in", json!({"email": "grace@example.com"}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["password"], json!(["password is required"]));
    assert!(app.db.executed().is_empty());
    Ok(())
}

#[tokio::test]
async fn refresh_and_logout_check_the_bearer_token() -> Result<()> {
    let app = TestApp::new();
    let token = token_for(4);

    let (status, body) = app
        .send(request(Method::POST, "/user/refresh/", None, Some(&token)))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["jwt"].is_string());

    let (status, _) = app
        .send(request(Method::POST, "/user/refresh/", None, Some("not-a-token")))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(request(Method::POST, "/user/logout", None, Some(&token)))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], json!("Logout successful"));
    Ok(())
}

#[tokio::test]
async fn user_actions_require_post() -> Result<()> {
    let app = TestApp::new();
    let (status, body) = app.get("/user/sign-up").await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["message"], json!("Invalid method for signing up"));
    Ok(())
}
