use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use std::sync::Arc;

use authd::api::AppState;
use authd::config::Config;
use authd::db::NewUser;
use http_body_util::BodyExt;
use tower::ServiceExt;

const TEST_SECRET: &str = "integration-test-secret";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.auth.token_secret = TEST_SECRET.to_string();
    // Cheap hashing params keep the suite fast; production defaults apply
    // outside tests.
    config.security.argon2_memory_cost_kib = 1024;
    config.security.argon2_time_cost = 1;
    config
}

async fn spawn_app() -> (Router, Arc<AppState>) {
    let state = authd::api::create_app_state(test_config())
        .await
        .expect("Failed to create app state");
    (authd::api::router(state.clone()), state)
}

async fn post(app: &Router, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Response<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);

    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(value) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_string(&value).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

async fn read_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn register(app: &Router, email: &str, username: &str, password: &str) -> serde_json::Value {
    let response = post(
        app,
        "/api/register",
        None,
        Some(serde_json::json!({
            "email": email,
            "username": username,
            "password": password,
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    read_json(response).await
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let response = post(
        app,
        "/api/token",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    body["data"]["token"]
        .as_str()
        .expect("login did not return a token")
        .to_string()
}

#[tokio::test]
async fn test_register_and_duplicate_email() {
    let (app, _state) = spawn_app().await;

    let body = register(&app, "a@x.com", "a", "p1").await;
    assert_eq!(body["data"]["id"], 1);
    assert_eq!(body["data"]["email"], "a@x.com");
    assert_eq!(body["data"]["group"], "users");
    assert_eq!(body["data"]["is_superuser"], false);
    assert_eq!(body["data"]["is_active"], true);
    // The hash stays behind the store boundary.
    assert!(body["data"].get("password_hash").is_none());

    let response = post(
        &app,
        "/api/register",
        None,
        Some(serde_json::json!({
            "email": "a@x.com",
            "username": "someone-else",
            "password": "p2",
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_login_access_delete_self() {
    let (app, _state) = spawn_app().await;

    register(&app, "a@x.com", "a", "p1").await;
    register(&app, "b@x.com", "b", "p2").await;

    let token_a = login(&app, "a@x.com", "p1").await;

    let response = post(&app, "/api/access", Some(&token_a), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["access"], "success");

    // Self-delete with no explicit target.
    let response = post(&app, "/api/users/delete", Some(&token_a), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["status"], "ok");

    // The deleted user's outstanding token no longer verifies.
    let response = post(&app, "/api/access", Some(&token_a), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Another caller sees the account gone.
    let token_b = login(&app, "b@x.com", "p2").await;
    let response = post(&app, "/api/users/1", Some(&token_b), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _state) = spawn_app().await;

    for uri in ["/api/users", "/api/users/1", "/api/access", "/api/users/delete"] {
        let response = post(&app, uri, None, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "no token: {uri}");

        let response = post(&app, uri, Some("garbage.token.here"), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "bad token: {uri}");
    }
}

#[tokio::test]
async fn test_admin_create_requires_superuser() {
    let (app, state) = spawn_app().await;

    // Bootstrap a superuser directly through the store.
    state
        .store
        .create_user(
            &NewUser {
                email: "root@x.com".to_string(),
                username: "root".to_string(),
                group: "admins".to_string(),
                password: "rootpw".to_string(),
                is_superuser: true,
                is_active: true,
            },
            &state.config.security,
        )
        .await
        .unwrap()
        .unwrap();

    register(&app, "pleb@x.com", "pleb", "plebpw").await;
    let pleb_token = login(&app, "pleb@x.com", "plebpw").await;

    let new_admin = serde_json::json!({
        "email": "second@x.com",
        "username": "second",
        "password": "secondpw",
        "is_superuser": true,
    });

    let response = post(&app, "/api/users/create", Some(&pleb_token), Some(new_admin.clone())).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let root_token = login(&app, "root@x.com", "rootpw").await;
    let response = post(&app, "/api/users/create", Some(&root_token), Some(new_admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["is_superuser"], true);
    assert_eq!(body["data"]["email"], "second@x.com");
}

#[tokio::test]
async fn test_delete_other_requires_superuser() {
    let (app, state) = spawn_app().await;

    register(&app, "a@x.com", "a", "p1").await;
    register(&app, "b@x.com", "b", "p2").await;

    let token_a = login(&app, "a@x.com", "p1").await;

    // Ordinary users cannot delete anyone else.
    let response = post(&app, "/api/users/delete?user_id=2", Some(&token_a), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    state
        .store
        .create_user(
            &NewUser {
                email: "root@x.com".to_string(),
                username: "root".to_string(),
                group: "admins".to_string(),
                password: "rootpw".to_string(),
                is_superuser: true,
                is_active: true,
            },
            &state.config.security,
        )
        .await
        .unwrap()
        .unwrap();

    let root_token = login(&app, "root@x.com", "rootpw").await;
    let response = post(&app, "/api/users/delete?user_id=2", Some(&root_token), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post(&app, "/api/users/2", Some(&root_token), None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_pagination() {
    let (app, _state) = spawn_app().await;

    register(&app, "a@x.com", "a", "p1").await;
    register(&app, "b@x.com", "b", "p2").await;
    register(&app, "c@x.com", "c", "p3").await;

    let token = login(&app, "a@x.com", "p1").await;

    let response = post(&app, "/api/users", Some(&token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let response = post(&app, "/api/users?skip=1&limit=1", Some(&token), None).await;
    let body = read_json(response).await;
    let page = body["data"].as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["id"], 2);
}

#[tokio::test]
async fn test_login_unknown_email_and_wrong_password() {
    let (app, _state) = spawn_app().await;

    register(&app, "a@x.com", "a", "p1").await;

    // Unknown email is a 404 on the token endpoint.
    let response = post(
        &app,
        "/api/token",
        None,
        Some(serde_json::json!({ "email": "ghost@x.com", "password": "p1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // A wrong password is not an error: the caller gets the sentinel.
    let response = post(
        &app,
        "/api/token",
        None,
        Some(serde_json::json!({ "email": "a@x.com", "password": "wrong" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["access"], "reject");
    assert!(body["data"].get("token").is_none());
}

#[tokio::test]
async fn test_authenticate_denies_uniformly() {
    let (app, _state) = spawn_app().await;

    register(&app, "a@x.com", "a", "p1").await;

    let response = post(
        &app,
        "/api/auth",
        None,
        Some(serde_json::json!({ "email": "a@x.com", "password": "p1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["email"], "a@x.com");

    // Unknown email and wrong password are indistinguishable.
    let wrong_password = post(
        &app,
        "/api/auth",
        None,
        Some(serde_json::json!({ "email": "a@x.com", "password": "nope" })),
    )
    .await;
    let unknown_email = post(
        &app,
        "/api/auth",
        None,
        Some(serde_json::json!({ "email": "ghost@x.com", "password": "p1" })),
    )
    .await;

    assert_eq!(wrong_password.status(), StatusCode::FORBIDDEN);
    assert_eq!(unknown_email.status(), StatusCode::FORBIDDEN);

    let a = read_json(wrong_password).await;
    let b = read_json(unknown_email).await;
    assert_eq!(a["error"], b["error"]);
}

#[tokio::test]
async fn test_inactive_user_cannot_authenticate() {
    let (app, state) = spawn_app().await;

    state
        .store
        .create_user(
            &NewUser {
                email: "dormant@x.com".to_string(),
                username: "dormant".to_string(),
                group: "users".to_string(),
                password: "pw".to_string(),
                is_superuser: false,
                is_active: false,
            },
            &state.config.security,
        )
        .await
        .unwrap()
        .unwrap();

    let response = post(
        &app,
        "/api/token",
        None,
        Some(serde_json::json!({ "email": "dormant@x.com", "password": "pw" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["access"], "reject");

    let response = post(
        &app,
        "/api/auth",
        None,
        Some(serde_json::json!({ "email": "dormant@x.com", "password": "pw" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
