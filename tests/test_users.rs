mod common;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::id_of;

#[tokio::test]
async fn admin_manages_users() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let admin = env.admin_token(&server).await;

    let response = server
        .post("/api/v1/users")
        .authorization_bearer(&admin)
        .json(&json!({
            "name": "Sara Smith",
            "email": "sara@gmail.com",
            "password": "123456",
            "role": "publisher",
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created = response.json::<Value>()["data"].clone();
    assert_eq!(created["role"], "publisher");
    assert!(created.get("password").is_none());
    let id = id_of(&created);

    let fetched = server
        .get(&format!("/api/v1/users/{id}"))
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(fetched["data"]["email"], "sara@gmail.com");

    let updated = server
        .put(&format!("/api/v1/users/{id}"))
        .authorization_bearer(&admin)
        .json(&json!({ "name": "Sara Jones", "role": "user" }))
        .await
        .json::<Value>();
    assert_eq!(updated["data"]["name"], "Sara Jones");
    assert_eq!(updated["data"]["role"], "user");

    // The new account can still log in with its original password.
    server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "sara@gmail.com", "password": "123456" }))
        .await
        .assert_status_ok();

    let deleted = server
        .delete(&format!("/api/v1/users/{id}"))
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(deleted["success"], true);
    assert_eq!(deleted["data"], json!({}));

    let permissive = env.server_permissive();
    permissive
        .get(&format!("/api/v1/users/{id}"))
        .authorization_bearer(&admin)
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn user_list_hides_secrets() {
    let env = common::TestEnv::start().await;
    let server = env.server();
    let admin = env.admin_token(&server).await;
    env.register(&server, "John Doe", "john@gmail.com", "user").await;

    let body = server
        .get("/api/v1/users?sort=email")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();

    assert_eq!(body["count"], 2);
    for user in body["data"].as_array().unwrap() {
        assert!(user.get("password").is_none());
        assert!(user.get("resetPasswordToken").is_none());
    }
    assert_eq!(body["data"][0]["email"], "admin@devcamper.io");

    let filtered = server
        .get("/api/v1/users?role=user")
        .authorization_bearer(&admin)
        .await
        .json::<Value>();
    assert_eq!(filtered["count"], 1);
    assert_eq!(filtered["data"][0]["name"], "John Doe");
}

#[tokio::test]
async fn only_admins_reach_user_routes() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();
    let publisher = env
        .register(&server, "Pub", "pub@gmail.com", "publisher")
        .await;

    server
        .get("/api/v1/users")
        .authorization_bearer(&publisher)
        .await
        .assert_status_forbidden();
    server
        .post("/api/v1/users")
        .authorization_bearer(&publisher)
        .json(&json!({ "name": "X", "email": "x@gmail.com", "password": "123456" }))
        .await
        .assert_status_forbidden();
    server.get("/api/v1/users").await.assert_status_unauthorized();
}

#[tokio::test]
async fn admin_create_validates_and_rejects_duplicates() {
    let env = common::TestEnv::start().await;
    let server = env.server_permissive();
    let admin = env.admin_token(&server).await;

    let body = server
        .post("/api/v1/users")
        .authorization_bearer(&admin)
        .json(&json!({ "name": "Short", "email": "not-an-email", "password": "123" }))
        .await
        .json::<Value>();
    assert_eq!(body["success"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("Password must be at least 6 characters"), "{error}");

    server
        .post("/api/v1/users")
        .authorization_bearer(&admin)
        .json(&json!({
            "name": "Copy",
            "email": "admin@devcamper.io",
            "password": "123456",
        }))
        .await
        .assert_status_bad_request();
}
