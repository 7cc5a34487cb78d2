use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use serde_json::json;
use tower::ServiceExt;

use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::test_support;

fn token_form(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/auth/token")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("username={username}&password={password}")))
        .expect("token form")
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn login_returns_token_usable_on_me() {
    let ctx = test_support::setup_test_context().await;
    test_support::insert_user(
        ctx.state.db(),
        "dr.quinn",
        "Michaela Quinn",
        "frontier-medicine",
        UserRole::Doctor,
    )
    .await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "dr.quinn", "password": "frontier-medicine"})),
        ))
        .await
        .expect("login");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["role"], "doctor");
    assert_eq!(body["user"]["username"], "dr.quinn");
    assert!(body["user"].get("hashed_password").is_none());
    let token = body["access_token"].as_str().expect("access token").to_string();

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/auth/me", Some(&token), None))
        .await
        .expect("me");
    assert_eq!(response.status(), StatusCode::OK);
    let me = test_support::read_json(response).await;
    assert_eq!(me["full_name"], "Michaela Quinn");

    let response = ctx
        .app
        .clone()
        .oneshot(token_form("dr.quinn", "frontier-medicine"))
        .await
        .expect("token form");
    assert_eq!(response.status(), StatusCode::OK);
    let body = test_support::read_json(response).await;
    assert!(body["access_token"].as_str().is_some_and(|token| !token.is_empty()));
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn bad_credentials_and_missing_tokens_are_unauthorized() {
    let ctx = test_support::setup_test_context().await;
    test_support::insert_user(
        ctx.state.db(),
        "student.ross",
        "Student Ross",
        "correct-horse",
        UserRole::Student,
    )
    .await;

    for (username, password) in [("student.ross", "wrong-horse"), ("nobody", "correct-horse")] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({"username": username, "password": password})),
            ))
            .await
            .expect("login");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{username}");
    }

    let response = ctx
        .app
        .clone()
        .oneshot(token_form("student.ross", "wrong-horse"))
        .await
        .expect("token form");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    for token in [None, Some("not-a-jwt")] {
        let response = ctx
            .app
            .clone()
            .oneshot(test_support::json_request(Method::GET, "/api/v1/auth/me", token, None))
            .await
            .expect("me");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
#[ignore = "requires postgres"]
async fn deactivated_or_promoted_users_must_sign_in_again() {
    let ctx = test_support::setup_test_context().await;
    let (user, token) =
        test_support::user_with_token(&ctx, "student.shaw", UserRole::Student).await;

    repositories::users::update(
        ctx.state.db(),
        &user.id,
        repositories::users::UpdateUser {
            full_name: None,
            role: Some(UserRole::Professor),
            is_active: None,
            hashed_password: None,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .expect("promote");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/auth/me", Some(&token), None))
        .await
        .expect("stale role");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    repositories::users::update(
        ctx.state.db(),
        &user.id,
        repositories::users::UpdateUser {
            full_name: None,
            role: None,
            is_active: Some(false),
            hashed_password: None,
            updated_at: primitive_now_utc(),
        },
    )
    .await
    .expect("deactivate");

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({"username": "student.shaw", "password": "test-password"})),
        ))
        .await
        .expect("inactive login");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
