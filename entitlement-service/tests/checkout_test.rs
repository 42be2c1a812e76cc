mod common;

use common::{checkout_completed_event, TestApp, PRICE_PRO_MONTHLY};
use entitlement_service::models::{SubscriptionStatus, TierId};
use entitlement_service::services::{Clock, EntitlementStore};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn pro_monthly(email: &str) -> Value {
    json!({
        "tier": "pro",
        "billingCycle": "monthly",
        "customerEmail": email
    })
}

#[tokio::test]
async fn checkout_returns_hosted_url_and_records_account() {
    let app = TestApp::spawn().await;

    let response = app
        .start_checkout("acct_1", Some("owner@example.com"), &pro_monthly("owner@example.com"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert!(body["url"].as_str().unwrap().starts_with("https://checkout.mock/"));

    let requests = app.billing.checkout_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].price_id, PRICE_PRO_MONTHLY);
    assert_eq!(requests[0].account_id, "acct_1");
    assert_eq!(requests[0].success_url, "http://app.test/?subscription=success");
    assert_eq!(requests[0].cancel_url, "http://app.test/pricing?canceled=true");

    let account = app
        .store
        .find_account_by_email("owner@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.id, "acct_1");
}

#[tokio::test]
async fn checkout_for_unpriced_plan_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .start_checkout(
            "acct_1",
            Some("owner@example.com"),
            &json!({
                "tier": "pro",
                "billingCycle": "yearly",
                "customerEmail": "owner@example.com"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.billing.checkout_requests().is_empty());
}

#[tokio::test]
async fn checkout_rejects_invalid_email() {
    let app = TestApp::spawn().await;

    let response = app
        .start_checkout(
            "acct_1",
            Some("owner@example.com"),
            &json!({
                "tier": "starter",
                "billingCycle": "monthly",
                "customerEmail": "not-an-email"
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn checkout_requires_a_signed_in_email() {
    let app = TestApp::spawn().await;

    let response = app
        .start_checkout("acct_1", None, &pro_monthly("owner@example.com"))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.billing.checkout_requests().is_empty());
    assert!(app
        .store
        .find_account_by_email("owner@example.com")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn checkout_cannot_claim_another_accounts_email() {
    let app = TestApp::spawn().await;

    let hijack = app
        .start_checkout("acct_evil", Some("evil@example.com"), &pro_monthly("victim@example.com"))
        .await;
    assert_eq!(hijack.status(), StatusCode::FORBIDDEN);

    let genuine = app
        .start_checkout("acct_victim", Some("victim@example.com"), &pro_monthly("victim@example.com"))
        .await;
    assert_eq!(genuine.status(), StatusCode::OK);

    app.register_provider_subscription("sub_victim", PRICE_PRO_MONTHLY);
    let event = checkout_completed_event(
        "evt_victim",
        "victim@example.com",
        "sub_victim",
        PRICE_PRO_MONTHLY,
        app.clock.now(),
    );
    assert_eq!(app.post_webhook(&event).await.status(), StatusCode::OK);

    let victim = app.store.get_subscription("acct_victim").await.unwrap().unwrap();
    assert_eq!(victim.tier, TierId::Pro);
    assert_eq!(victim.status, SubscriptionStatus::Active);
    assert!(app.store.get_subscription("acct_evil").await.unwrap().is_none());
}

#[tokio::test]
async fn checkout_then_webhook_activates_the_same_account() {
    let app = TestApp::spawn().await;

    app.start_checkout("acct_1", Some("owner@example.com"), &pro_monthly("owner@example.com"))
        .await;

    app.register_provider_subscription("sub_1", PRICE_PRO_MONTHLY);
    let event = checkout_completed_event(
        "evt_1",
        "owner@example.com",
        "sub_1",
        PRICE_PRO_MONTHLY,
        app.clock.now(),
    );
    app.post_webhook(&event).await;

    let view = app.get_entitlements("acct_1").await;
    assert_eq!(view.usage.tier, Some(TierId::Pro));
    assert_eq!(view.usage.status, Some(SubscriptionStatus::Active));
}
