//! Revocation and introspection: `POST /revoke`, `GET /token-info`.

use actix_web::http::StatusCode;
use actix_web::test;
use chrono::{Duration, Utc};
use serde_json::json;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_revoke_access_token_is_idempotent() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;

    for _ in 0..2 {
        let (status, body) = revoke(&app, json!({ "token": access })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    let (status, body) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");
}

#[actix_rt::test]
async fn test_revoke_unknown_token_looks_successful() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let (status, body) = revoke(&app, json!({ "token": "not-a-token" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "success": true }));
}

#[actix_rt::test]
async fn test_revoke_by_refresh_token_kills_the_pair() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let (status, _) = revoke(
        &app,
        json!({ "token": refresh_token, "token_type_hint": "refresh_token" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");

    let (status, _) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_rt::test]
async fn test_access_hint_does_not_match_refresh_token() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let (status, _) = revoke(
        &app,
        json!({ "token": refresh_token, "token_type_hint": "access_token" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_token_info_reports_state() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read", "write"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, Some("write")).await;
    let info_request = || {
        test::TestRequest::get()
            .uri("/api/v1/token-info")
            .insert_header(("Authorization", format!("Bearer {access}")))
            .to_request()
    };

    let (status, body) = send(&app, info_request()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["active"], true);
    assert_eq!(body["auth_type"], "access_token");
    assert_eq!(scopes_of(&body["scopes"]), vec!["write"]);
    assert!(body["expires_at"].is_string());

    revoke(&app, json!({ "token": access })).await;

    let (status, body) = send(&app, info_request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);
}

#[actix_rt::test]
async fn test_token_info_for_unknown_token() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let req = test::TestRequest::get()
        .uri("/api/v1/token-info")
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[actix_rt::test]
async fn test_revoke_with_form_body() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    let req = test::TestRequest::post()
        .uri("/api/v1/revoke")
        .set_form([("token", access.as_str()), ("token_type_hint", "access_token")])
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);

    let (status, body) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");
}

#[actix_rt::test]
async fn test_revoked_token_stays_rejected_after_purge() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (access, _) = issue_pair(&app, &key.access_key, &secret, None).await;
    revoke(&app, json!({ "token": access })).await;

    let removed = services
        .tokens
        .purge_expired(Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    let (status, body) = me_with_bearer(&app, &access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");

    let req = test::TestRequest::get()
        .uri("/api/v1/token-info")
        .insert_header(("Authorization", format!("Bearer {access}")))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);
}
