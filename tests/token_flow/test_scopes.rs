//! Scope negotiation at exchange time.

use actix_web::http::StatusCode;
use serde_json::json;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_prefix_wildcard_covers_sub_scopes() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["marketplace.*"], &[]).await;
    let app = create_test_app(&services).await;

    let (status, body) = exchange(
        &app,
        &key.access_key,
        &secret,
        json!({ "scope": "marketplace.read,marketplace.orders.write" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["scope"], "marketplace.read marketplace.orders.write");

    let (status, body) = exchange(
        &app,
        &key.access_key,
        &secret,
        json!({ "scope": "billing.read" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "INVALID_SCOPE");
}

#[actix_rt::test]
async fn test_uncovered_scopes_are_dropped_from_partial_request() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (status, body) =
        exchange(&app, &key.access_key, &secret, json!({ "scope": "read write" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "read");
}

#[actix_rt::test]
async fn test_full_wildcard_grants_any_scope() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["*"], &[]).await;
    let app = create_test_app(&services).await;

    let (status, body) = exchange(
        &app,
        &key.access_key,
        &secret,
        json!({ "scope": "anything orders:write" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scope"], "anything orders:write");
}

#[actix_rt::test]
async fn test_malformed_scope_string() {
    let services = test_services();
    let user = seed_user(&services, &[]).await;
    let (key, secret) = seed_key(&services, user.id, &["read"], &[]).await;
    let app = create_test_app(&services).await;

    let (status, body) =
        exchange(&app, &key.access_key, &secret, json!({ "scope": "read$" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_REQUEST");
}
