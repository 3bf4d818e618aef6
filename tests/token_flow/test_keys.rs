//! Credential management: `/keys`.

use actix_web::http::StatusCode;
use actix_web::test;
use serde_json::{Value, json};
use uuid::Uuid;

use super::test_helpers::*;

fn admin_request(method: test::TestRequest, uri: &str) -> test::TestRequest {
    method
        .uri(uri)
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY))
}

fn bearer_request(method: test::TestRequest, uri: &str, token: &str) -> test::TestRequest {
    method
        .uri(uri)
        .insert_header(("Authorization", format!("Bearer {token}")))
}

#[actix_rt::test]
async fn test_admin_creates_usable_key() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let app = create_test_app(&services).await;

    let req = admin_request(test::TestRequest::post(), "/api/v1/keys")
        .set_json(json!({
            "name": "CI",
            "user_id": user.id,
            "scopes": ["read", "write"],
            "expires_in": "90d",
        }))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    let access_key = body["access_key"].as_str().unwrap();
    let secret_key = body["secret_key"].as_str().unwrap();
    assert!(access_key.starts_with("ak_"));
    assert!(secret_key.starts_with("sk_"));
    assert!(body.get("secret_key_hash").is_none());

    let (status, body) = exchange(&app, access_key, secret_key, json!({ "scope": "write" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[actix_rt::test]
async fn test_admin_must_name_user() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let req = admin_request(test::TestRequest::post(), "/api/v1/keys")
        .set_json(json!({ "name": "CI", "scopes": ["read"] }))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}

#[actix_rt::test]
async fn test_wrong_admin_key() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let app = create_test_app(&services).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/keys?user_id={}", user.id))
        .insert_header(("X-Admin-Key", "not-the-admin-key"))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[actix_rt::test]
async fn test_create_for_unknown_user() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let req = admin_request(test::TestRequest::post(), "/api/v1/keys")
        .set_json(json!({ "name": "CI", "user_id": Uuid::new_v4() }))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_rt::test]
async fn test_owner_needs_manage_scope() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    let req = bearer_request(test::TestRequest::get(), "/api/v1/keys", &access).to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "INSUFFICIENT_SCOPE");
    assert_eq!(scopes_of(&body["required_scopes"]), vec!["keys.manage"]);
}

#[actix_rt::test]
async fn test_owner_cannot_grant_more_than_held() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["keys.manage", "orders.*"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;

    let req = bearer_request(test::TestRequest::post(), "/api/v1/keys", &access)
        .set_json(json!({ "name": "narrow", "scopes": ["orders.read"] }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["user_id"], user.id.to_string());

    let req = bearer_request(test::TestRequest::post(), "/api/v1/keys", &access)
        .set_json(json!({ "name": "wide", "scopes": ["billing.read"] }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "INVALID_SCOPE");
}

#[actix_rt::test]
async fn test_owner_cannot_see_other_users_keys() {
    let services = test_services();
    let owner = seed_user(&services, &[]).await;
    let other = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, owner.id, &["keys.manage"], &[]).await;
    let (foreign, _) = seed_key(&services, other.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;

    let uri = format!("/api/v1/keys/{}", foreign.id);
    let req = bearer_request(test::TestRequest::get(), &uri, &access).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let req = bearer_request(test::TestRequest::delete(), &uri, &access).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/api/v1/keys?user_id={}", other.id);
    let req = bearer_request(test::TestRequest::get(), &uri, &access).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[actix_rt::test]
async fn test_list_keys_hides_secrets() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    seed_key(&services, user.id, &["read"], &[]).await;
    seed_key(&services, user.id, &["write"], &[]).await;
    let app = create_test_app(&services).await;

    let req = admin_request(
        test::TestRequest::get(),
        &format!("/api/v1/keys?user_id={}", user.id),
    )
    .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    let keys = body["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k: &Value| {
        k.get("secret_key").is_none() && k.get("secret_key_hash").is_none()
    }));
}

#[actix_rt::test]
async fn test_regenerate_keeps_access_key() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, old_secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let req = admin_request(
        test::TestRequest::post(),
        &format!("/api/v1/keys/{}/regenerate", key.id),
    )
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["access_key"], key.access_key);
    let new_secret = body["secret_key"].as_str().unwrap().to_string();
    assert_ne!(new_secret, old_secret);

    let (status, body) = exchange(&app, &key.access_key, &old_secret, json!({})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_API_SECRET");

    let (status, _) = exchange(&app, &key.access_key, &new_secret, json!({})).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_update_policy() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let req = admin_request(
        test::TestRequest::patch(),
        &format!("/api/v1/keys/{}", key.id),
    )
    .set_json(json!({
        "name": "renamed",
        "scopes": ["read", "write"],
        "allowed_ips": ["192.168.1.10"],
    }))
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["name"], "renamed");
    assert_eq!(scopes_of(&body["scopes"]), vec!["read", "write"]);

    let req = test::TestRequest::post()
        .uri("/api/v1/token")
        .peer_addr("10.1.1.1:50000".parse().unwrap())
        .insert_header(("X-API-Key", key.access_key.as_str()))
        .insert_header(("X-API-Secret", secret.as_str()))
        .set_json(json!({ "grant_type": "client_credentials" }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "IP_NOT_ALLOWED");
}

#[actix_rt::test]
async fn test_update_rejects_bad_ip() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, _) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let req = admin_request(
        test::TestRequest::patch(),
        &format!("/api/v1/keys/{}", key.id),
    )
    .set_json(json!({ "allowed_ips": ["not-an-ip"] }))
    .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}

#[actix_rt::test]
async fn test_deactivate_revokes_issued_tokens() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (first, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    let (second, _) = issue_pair(&app, &key.access_key, &secret, None).await;

    let req = admin_request(
        test::TestRequest::delete(),
        &format!("/api/v1/keys/{}", key.id),
    )
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["revoked_tokens"], 2);

    for token in [first, second] {
        let (status, body) = me_with_bearer(&app, &token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "TOKEN_REVOKED");
    }

    let (status, body) = exchange(&app, &key.access_key, &secret, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "API_KEY_INACTIVE");

    // Deactivation is a soft delete
    let stored = services.credentials.get(key.id).await.unwrap();
    assert!(stored.is_some_and(|k| !k.is_active));
}

#[actix_rt::test]
async fn test_patch_deactivation_revokes_issued_tokens() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let req = admin_request(
        test::TestRequest::patch(),
        &format!("/api/v1/keys/{}", key.id),
    )
    .set_json(json!({ "is_active": false }))
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["is_active"], false);

    let (status, body) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");

    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");
}

#[actix_rt::test]
async fn test_only_admin_reactivates_a_key() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (manager, manager_secret) = seed_key(&services, user.id, &["keys.manage"], &[]).await;
    let (target, target_secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let req = admin_request(
        test::TestRequest::delete(),
        &format!("/api/v1/keys/{}", target.id),
    )
    .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);

    let (token, _) = issue_pair(&app, &manager.access_key, &manager_secret, None).await;
    let req = bearer_request(
        test::TestRequest::patch(),
        &format!("/api/v1/keys/{}", target.id),
        &token,
    )
    .set_json(json!({ "is_active": true }))
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let (status, body) = exchange(&app, &target.access_key, &target_secret, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "API_KEY_INACTIVE");

    let req = admin_request(
        test::TestRequest::patch(),
        &format!("/api/v1/keys/{}", target.id),
    )
    .set_json(json!({ "is_active": true }))
    .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, _) = exchange(&app, &target.access_key, &target_secret, json!({})).await;
    assert_eq!(status, StatusCode::OK);
}
