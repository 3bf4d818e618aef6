//! Refresh token rotation: `POST /refresh`.

use actix_web::http::StatusCode;
use chrono::{Duration, Utc};

use super::test_helpers::*;

#[actix_rt::test]
async fn test_refresh_rotates_the_pair() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read", "write"], &[]).await;
    let app = create_test_app(&services).await;

    let (old_access, old_refresh) = issue_pair(&app, &key.access_key, &secret, None).await;

    let (status, body) = refresh(&app, &old_refresh, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scope"], "read write");
    let new_access = body["access_token"].as_str().unwrap().to_string();
    let new_refresh = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_access, old_access);
    assert_ne!(new_refresh, old_refresh);

    // The presented pair is dead, including its unexpired access token
    let (status, body) = me_with_bearer(&app, &old_access).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");

    let (status, _) = me_with_bearer(&app, &new_access).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_rt::test]
async fn test_refresh_token_is_single_use() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (_, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let (status, _) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "TOKEN_REVOKED");
}

#[actix_rt::test]
async fn test_concurrent_refreshes_yield_one_winner() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (_, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let (first, second) = futures_util::join!(
        refresh(&app, &refresh_token, None),
        refresh(&app, &refresh_token, None)
    );
    let statuses = [first.0, second.0];

    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::OK).count(),
        1,
        "{statuses:?}"
    );
    assert!(statuses.contains(&StatusCode::FORBIDDEN));
}

#[actix_rt::test]
async fn test_refresh_can_narrow_but_never_widen() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read", "write"], &[]).await;
    let app = create_test_app(&services).await;

    let (_, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let (status, body) = refresh(&app, &refresh_token, Some("read")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scope"], "read");
    let narrowed = body["refresh_token"].as_str().unwrap().to_string();

    // `write` is still on the credential but was given up by the last refresh
    let (status, body) = refresh(&app, &narrowed, Some("read write")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "INVALID_SCOPE");
    assert_eq!(scopes_of(&body["allowed_scopes"]), vec!["read"]);
}

#[actix_rt::test]
async fn test_refresh_drops_scopes_removed_from_credential() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read", "write"], &[]).await;
    let app = create_test_app(&services).await;

    let (_, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let mut key = services.credentials.get(key.id).await.unwrap().unwrap();
    key.scopes = vec!["read".to_string()];
    services.credentials.update(key).await.unwrap();

    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scope"], "read");
}

#[actix_rt::test]
async fn test_refresh_with_unknown_token() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let (status, body) = refresh(&app, "rt_does-not-exist", None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "INVALID_REFRESH_TOKEN");
}

#[actix_rt::test]
async fn test_refresh_with_expired_refresh_token() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, _) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let mut pair = services
        .tokens
        .mint_pair(key.id, user.id, vec!["read".to_string()], None)
        .unwrap();
    pair.record.refresh_token_expires_at = Utc::now() - Duration::minutes(1);
    services.tokens.persist(&pair.record).await.unwrap();

    let (status, body) = refresh(&app, &pair.response.refresh_token, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "REFRESH_TOKEN_EXPIRED");
    assert!(body["expires_at"].is_string());
}

#[actix_rt::test]
async fn test_refresh_after_credential_deactivated() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (_, refresh_token) = issue_pair(&app, &key.access_key, &secret, None).await;

    let mut key = services.credentials.get(key.id).await.unwrap().unwrap();
    key.is_active = false;
    services.credentials.update(key).await.unwrap();

    let (status, body) = refresh(&app, &refresh_token, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "API_KEY_INACTIVE");
}

#[actix_rt::test]
async fn test_refresh_requires_token_field() {
    let services = test_services();
    let app = create_test_app(&services).await;

    let (status, body) = refresh(&app, "   ", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}
