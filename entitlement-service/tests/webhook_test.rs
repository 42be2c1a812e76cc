mod common;

use chrono::Duration;
use common::{
    checkout_completed_event, sign_header, subscription_deleted_event, subscription_updated_event,
    TestApp, PRICE_AGENCY_YEARLY, PRICE_PRO_MONTHLY,
};
use entitlement_service::models::{SubscriptionStatus, TierId};
use entitlement_service::services::{Clock, EntitlementStore};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn activate(app: &TestApp, account_id: &str, email: &str, subscription_id: &str, price: &str) {
    app.store.record_account(account_id, email).await.unwrap();
    app.register_provider_subscription(subscription_id, price);
    let event = checkout_completed_event(
        &format!("evt_{}", subscription_id),
        email,
        subscription_id,
        price,
        app.clock.now(),
    );
    let response = app.post_webhook(&event).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn checkout_completed_activates_subscription() {
    let app = TestApp::spawn().await;
    app.store.record_account("acct_1", "owner@example.com").await.unwrap();
    app.register_provider_subscription("sub_1", PRICE_PRO_MONTHLY);

    let event = checkout_completed_event(
        "evt_1",
        "owner@example.com",
        "sub_1",
        PRICE_PRO_MONTHLY,
        app.clock.now(),
    );
    let response = app.post_webhook(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["received"], true);
    assert_eq!(body["outcome"], "processed");

    let view = app.get_entitlements("acct_1").await;
    assert_eq!(view.usage.tier, Some(TierId::Pro));
    assert_eq!(view.usage.status, Some(SubscriptionStatus::Active));
    assert_eq!(view.usage.generations_limit, 100);
    assert_eq!(view.usage.clients_limit, 5);
    assert!(view.can_generate);
    assert!(view.can_add_client);
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let app = TestApp::spawn().await;
    activate(&app, "acct_1", "owner@example.com", "sub_1", PRICE_AGENCY_YEARLY).await;
    let first = app.store.get_subscription("acct_1").await.unwrap().unwrap();

    let event = checkout_completed_event(
        "evt_sub_1",
        "owner@example.com",
        "sub_1",
        PRICE_AGENCY_YEARLY,
        app.clock.now(),
    );
    let response = app.post_webhook(&event).await;
    assert_eq!(response.status(), StatusCode::OK);

    let second = app.store.get_subscription("acct_1").await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(second.tier, TierId::Agency);
}

#[tokio::test]
async fn unknown_email_is_acknowledged_without_change() {
    let app = TestApp::spawn().await;
    app.register_provider_subscription("sub_1", PRICE_PRO_MONTHLY);

    let event = checkout_completed_event(
        "evt_1",
        "stranger@example.com",
        "sub_1",
        PRICE_PRO_MONTHLY,
        app.clock.now(),
    );
    let response = app.post_webhook(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "not_found");
}

#[tokio::test]
async fn unmapped_price_falls_back_to_lowest_tier() {
    let app = TestApp::spawn().await;
    activate(&app, "acct_1", "owner@example.com", "sub_1", "price_from_elsewhere").await;

    let view = app.get_entitlements("acct_1").await;
    assert_eq!(view.usage.tier, Some(TierId::Starter));
    assert_eq!(view.usage.generations_limit, 30);
}

#[tokio::test]
async fn provider_lookup_failure_asks_for_redelivery() {
    let app = TestApp::spawn().await;
    app.store.record_account("acct_1", "owner@example.com").await.unwrap();
    app.billing.set_failing(true);

    let event = checkout_completed_event(
        "evt_1",
        "owner@example.com",
        "sub_1",
        PRICE_PRO_MONTHLY,
        app.clock.now(),
    );
    let response = app.post_webhook(&event).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(app.store.get_subscription("acct_1").await.unwrap().is_none());
}

#[tokio::test]
async fn subscription_updated_changes_status_and_period() {
    let app = TestApp::spawn().await;
    activate(&app, "acct_1", "owner@example.com", "sub_1", PRICE_PRO_MONTHLY).await;

    let start = (app.clock.now() + Duration::days(30)).timestamp();
    let end = start + 30 * 24 * 3600;
    let response = app
        .post_webhook(&subscription_updated_event("evt_2", "sub_1", "past_due", start, end))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let view = app.get_entitlements("acct_1").await;
    assert_eq!(view.usage.status, Some(SubscriptionStatus::PastDue));
    assert_eq!(view.usage.tier, Some(TierId::Pro));
    assert_eq!(view.usage.period_end.map(|e| e.timestamp()), Some(end));
    assert!(!view.can_generate);
    assert!(!view.can_add_client);
}

#[tokio::test]
async fn subscription_updated_for_unknown_subscription_is_a_no_op() {
    let app = TestApp::spawn().await;
    let now = app.clock.now().timestamp();

    let response = app
        .post_webhook(&subscription_updated_event("evt_1", "sub_missing", "active", now, now + 60))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "not_found");
}

#[tokio::test]
async fn subscription_deleted_cancels_access() {
    let app = TestApp::spawn().await;
    activate(&app, "acct_1", "owner@example.com", "sub_1", PRICE_PRO_MONTHLY).await;

    let response = app
        .post_webhook(&subscription_deleted_event("evt_3", "sub_1"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let view = app.get_entitlements("acct_1").await;
    assert_eq!(view.usage.status, Some(SubscriptionStatus::Canceled));
    assert!(!view.can_generate);

    let generation = app.generate("acct_1", "hello").await;
    assert_eq!(generation.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn late_checkout_redelivery_does_not_revive_canceled_subscription() {
    let app = TestApp::spawn().await;
    activate(&app, "acct_1", "owner@example.com", "sub_1", PRICE_PRO_MONTHLY).await;
    app.post_webhook(&subscription_deleted_event("evt_3", "sub_1")).await;

    let event = checkout_completed_event(
        "evt_sub_1",
        "owner@example.com",
        "sub_1",
        PRICE_PRO_MONTHLY,
        app.clock.now(),
    );
    let response = app.post_webhook(&event).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "ignored");
    let view = app.get_entitlements("acct_1").await;
    assert_eq!(view.usage.status, Some(SubscriptionStatus::Canceled));
    assert!(!view.can_generate);
}

#[tokio::test]
async fn unhandled_event_types_are_ignored() {
    let app = TestApp::spawn().await;

    let response = app
        .post_webhook(&json!({
            "id": "evt_9",
            "type": "invoice.paid",
            "data": { "object": { "id": "in_1" } }
        }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["outcome"], "ignored");
}

#[tokio::test]
async fn unsigned_or_tampered_deliveries_are_rejected() {
    let app = TestApp::spawn().await;
    let body = serde_json::to_vec(&subscription_deleted_event("evt_1", "sub_1")).unwrap();

    let missing = app.post_raw_webhook(body.clone(), None).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let header = sign_header(b"something else", app.clock.now().timestamp());
    let tampered = app.post_raw_webhook(body.clone(), Some(header)).await;
    assert_eq!(tampered.status(), StatusCode::UNAUTHORIZED);

    let stale = sign_header(&body, app.clock.now().timestamp() - 3600);
    let stale = app.post_raw_webhook(body, Some(stale)).await;
    assert_eq!(stale.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_payload_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let body = br#"{"id":"evt_1","type":"customer.subscription.updated","data":{"object":{"id":"sub_1","status":"exploded"}}}"#.to_vec();
    let header = sign_header(&body, app.clock.now().timestamp());

    let response = app.post_raw_webhook(body, Some(header)).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
