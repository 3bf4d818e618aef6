//! Request authentication through the dispatcher: `GET /me`, `GET /tokens`.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::http::header::WWW_AUTHENTICATE;
use actix_web::test;
use chrono::{Duration, Utc};
use secrecy::SecretString;

use token_exchange_lib::config::TokenSettings;
use token_exchange_lib::services::TokenStore;
use token_exchange_lib::store::MemoryStore;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_missing_authentication() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let req = test::TestRequest::get().uri("/api/v1/me").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(WWW_AUTHENTICATE));
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "MISSING_AUTH");
}

#[actix_rt::test]
async fn test_malformed_bearer_token() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let (status, body) = me_with_bearer(&app, "not.a.jwt").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_TOKEN");
}

#[actix_rt::test]
async fn test_expired_store_backed_token() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, _) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let mut pair = services
        .tokens
        .mint_pair(key.id, user.id, vec!["read".to_string()], None)
        .unwrap();
    pair.record.expires_at = Utc::now() - Duration::minutes(5);
    services.tokens.persist(&pair.record).await.unwrap();

    let (status, body) = me_with_bearer(&app, &pair.response.access_token).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "TOKEN_EXPIRED");
    assert!(body["expires_at"].is_string());
}

#[actix_rt::test]
async fn test_token_of_deactivated_user() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    services.users.set_active(user.id, false).await.unwrap();

    let (status, body) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "USER_INACTIVE");
}

#[actix_rt::test]
async fn test_legacy_token_uses_principal_roles() {
    let services = test_services();
    let user = seed_user(&services, &["reports.read", "reports.write"]).await;
    let app = create_test_app(&services).await;

    let issued = services
        .tokens
        .issue_access_token(user.id, None, None, 600, Utc::now())
        .unwrap();
    let (status, body) = me_with_bearer(&app, &issued.token).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["auth_type"], "legacy");
    assert_eq!(
        scopes_of(&body["scopes"]),
        vec!["reports.read", "reports.write"]
    );
    assert!(body["token_id"].is_null());
}

#[actix_rt::test]
async fn test_legacy_token_with_explicit_scopes() {
    let services = test_services();
    let user = seed_user(&services, &["admin"]).await;
    let app = create_test_app(&services).await;

    let issued = services
        .tokens
        .issue_access_token(user.id, None, Some(vec!["read".to_string()]), 600, Utc::now())
        .unwrap();
    let (_, body) = me_with_bearer(&app, &issued.token).await;

    assert_eq!(scopes_of(&body["scopes"]), vec!["read"]);
}

#[actix_rt::test]
async fn test_expired_legacy_token() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let app = create_test_app(&services).await;

    let issued = services
        .tokens
        .issue_access_token(user.id, None, None, 600, Utc::now() - Duration::hours(2))
        .unwrap();
    let (status, body) = me_with_bearer(&app, &issued.token).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "TOKEN_EXPIRED");
}

#[actix_rt::test]
async fn test_legacy_token_signed_with_another_secret() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let app = create_test_app(&services).await;

    let foreign = TokenStore::new(
        Arc::new(MemoryStore::default()),
        TokenSettings {
            signing_secret: SecretString::from("some-other-signing-secret-entirely"),
            ..TokenSettings::default()
        },
    );
    let issued = foreign
        .issue_access_token(user.id, None, None, 600, Utc::now())
        .unwrap();
    let (status, body) = me_with_bearer(&app, &issued.token).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_TOKEN");
}

#[actix_rt::test]
async fn test_key_pair_in_headers() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read", "write"], &[]).await;
    let app = create_test_app(&services).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("X-API-Key", key.access_key.as_str()))
        .insert_header(("X-API-Secret", secret.as_str()))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["auth_type"], "api_key");
    assert_eq!(scopes_of(&body["scopes"]), vec!["read", "write"]);
    assert_eq!(body["api_key_id"], key.id.to_string());
}

#[actix_rt::test]
async fn test_key_pair_in_query() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let req = test::TestRequest::get()
        .uri(&format!(
            "/api/v1/me?api_key={}&api_secret={}",
            key.access_key, secret
        ))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["auth_type"], "api_key");
}

#[actix_rt::test]
async fn test_key_pair_takes_precedence_over_bearer() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("X-API-Key", key.access_key.as_str()))
        .insert_header(("X-API-Secret", secret.as_str()))
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auth_type"], "api_key");
}

#[actix_rt::test]
async fn test_lone_key_header_falls_back_to_bearer() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    let req = test::TestRequest::get()
        .uri("/api/v1/me")
        .insert_header(("X-API-Key", key.access_key.as_str()))
        .insert_header(("Authorization", format!("Bearer {access}")))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["auth_type"], "access_token");
}

#[actix_rt::test]
async fn test_list_tokens_requires_key_pair() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    issue_pair(&app, &key.access_key, &secret, None).await;
    issue_pair(&app, &key.access_key, &secret, None).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/tokens")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "MISSING_AUTH");

    let req = test::TestRequest::get()
        .uri("/api/v1/tokens?page=1&per_page=2")
        .insert_header(("X-API-Key", key.access_key.as_str()))
        .insert_header(("X-API-Secret", secret.as_str()))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["tokens"].as_array().unwrap().len(), 2);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["total_pages"], 2);
    let first = &body["tokens"][0];
    assert!(first.get("token_hash").is_none());
    assert!(first.get("access_token").is_none());
}
