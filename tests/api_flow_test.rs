//! End-to-end flows through the relay router with a fake processor

use cardrelay::square::PaymentStatus;
use cardrelay::testing::{self, TestApp};
use serde_json::{Value, json};

async fn ensure_customer(app: &TestApp, user_id: &str) -> String {
    let body: Value = testing::post(app.router(), "/api/square/customers/ensure")
        .json_body(&json!({"user_id": user_id, "email": "a@b.com"}))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    body["square_customer_id"]
        .as_str()
        .expect("square_customer_id")
        .to_string()
}

async fn save_card(app: &TestApp, user_id: &str, customer_id: &str, nonce: &str) -> Value {
    testing::post(app.router(), "/api/cards/create")
        .json_body(&json!({
            "user_id": user_id,
            "customer_id": customer_id,
            "nonce": nonce,
        }))
        .execute()
        .await
        .assert_ok()
        .json()
        .await
}

#[tokio::test]
async fn test_ensure_customer_creates_and_links() {
    let app = TestApp::new();

    let customer_id = ensure_customer(&app, "u1").await;

    assert!(customer_id.starts_with("cust_test_"));
    assert_eq!(app.store().link_count().await, 1);
    let request = app.processor().last_customer_request().unwrap();
    assert_eq!(request.reference_id.as_deref(), Some("u1"));
    assert_eq!(request.email.as_deref(), Some("a@b.com"));
}

#[tokio::test]
async fn test_ensure_customer_twice_creates_one_customer() {
    let app = TestApp::new();

    let first = ensure_customer(&app, "u1").await;
    let second = ensure_customer(&app, "u1").await;

    assert_eq!(first, second);
    assert_eq!(app.processor().customers_created(), 1);
}

#[tokio::test]
async fn test_ensure_customer_requires_user_id() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/square/customers/ensure")
        .json_body(&json!({"email": "a@b.com"}))
        .execute()
        .await
        .assert_bad_request()
        .assert_error_code("MISSING_FIELD")
        .await;
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_ensure_customer_rejects_bad_email() {
    let app = TestApp::new();

    let body = testing::post(app.router(), "/api/square/customers/ensure")
        .json_body(&json!({"user_id": "u1", "email": "not-an-email"}))
        .execute()
        .await
        .assert_bad_request()
        .assert_error_code("MISSING_FIELD")
        .await;
    assert!(body["message"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn test_save_card_first_is_default() {
    let app = TestApp::new();
    let customer_id = ensure_customer(&app, "u1").await;

    let first = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;
    assert!(first["square_card_id"].as_str().unwrap().starts_with("ccof:"));
    assert_eq!(first["brand"], "VISA");
    assert_eq!(first["last4"], "1111");
    assert_eq!(first["exp_month"], 12);
    assert_eq!(first["exp_year"], 2030);
    assert_eq!(first["is_default"], true);

    let second = save_card(&app, "u1", &customer_id, "cnon:card-nonce-two").await;
    assert_eq!(second["is_default"], false);
    assert_ne!(first["square_card_id"], second["square_card_id"]);
}

#[tokio::test]
async fn test_save_card_replay_returns_same_card() {
    let app = TestApp::new();
    let customer_id = ensure_customer(&app, "u1").await;

    let first = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;
    let replay = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;

    assert_eq!(first, replay);
    assert_eq!(app.store().card_count().await, 1);
    let keys = app.processor().card_idempotency_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_save_card_blank_nonce() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/cards/create")
        .json_body(&json!({"user_id": "u1", "customer_id": "cust_1", "nonce": "  "}))
        .execute()
        .await
        .assert_unprocessable()
        .assert_error_code("MISSING_NONCE")
        .await;
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_save_card_for_foreign_customer_is_forbidden() {
    let app = TestApp::new();
    ensure_customer(&app, "u1").await;
    let other = ensure_customer(&app, "u2").await;
    let calls = app.processor().call_count();

    testing::post(app.router(), "/api/cards/create")
        .json_body(&json!({
            "user_id": "u1",
            "customer_id": other,
            "nonce": "cnon:card-nonce-ok",
        }))
        .execute()
        .await
        .assert_forbidden()
        .assert_error_code("FORBIDDEN")
        .await;
    assert_eq!(app.processor().call_count(), calls);
}

#[tokio::test]
async fn test_list_cards_newest_first() {
    let app = TestApp::new();
    let customer_id = ensure_customer(&app, "u1").await;
    let first = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;
    let second = save_card(&app, "u1", &customer_id, "cnon:card-nonce-two").await;

    let body: Value = testing::get(app.router(), "/api/cards?user_id=u1")
        .execute()
        .await
        .assert_ok()
        .json()
        .await;

    let cards = body["cards"].as_array().unwrap();
    assert_eq!(cards.len(), 2);
    assert_eq!(cards[0]["square_card_id"], second["square_card_id"]);
    assert_eq!(cards[1]["square_card_id"], first["square_card_id"]);
}

#[tokio::test]
async fn test_list_cards_empty_and_missing_user() {
    let app = TestApp::new();

    let body: Value = testing::get(app.router(), "/api/cards?user_id=nobody")
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert_eq!(body, json!({"cards": []}));

    testing::get(app.router(), "/api/cards")
        .execute()
        .await
        .assert_bad_request()
        .assert_error_code("MISSING_FIELD")
        .await;
}

#[tokio::test]
async fn test_delete_card() {
    let app = TestApp::new();
    let customer_id = ensure_customer(&app, "u1").await;
    let card = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;
    let card_id = card["square_card_id"].as_str().unwrap();

    // Another user's delete does not match
    testing::delete(app.router(), &format!("/api/cards/{card_id}?user_id=u2"))
        .execute()
        .await
        .assert_not_found()
        .assert_error_code("NOT_FOUND")
        .await;

    let body: Value = testing::delete(app.router(), &format!("/api/cards/{card_id}?user_id=u1"))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert!(body["message"].is_string());
    assert_eq!(app.store().card_count().await, 0);

    testing::delete(app.router(), &format!("/api/cards/{card_id}?user_id=u1"))
        .execute()
        .await
        .assert_not_found();

    // Disabling at Square is off by default
    assert!(app.processor().disabled_cards().is_empty());
}

#[tokio::test]
async fn test_charge_stored_card() {
    let app = TestApp::new();
    let customer_id = ensure_customer(&app, "u1").await;
    let card = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;

    let body: Value = testing::post(app.router(), "/api/payments/charge")
        .json_body(&json!({
            "user_id": "u1",
            "customer_id": customer_id,
            "square_card_id": card["square_card_id"],
            "amount": 1500,
            "note": "Order 42",
        }))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "COMPLETED");
    assert!(body["payment_id"].is_string());

    let charge = app.processor().last_stored_charge().unwrap();
    assert_eq!(charge.amount.amount, 1500);
    assert_eq!(charge.amount.currency, "USD");
    assert_eq!(charge.note.as_deref(), Some("Order 42"));
}

#[tokio::test]
async fn test_charge_card_not_owned_is_forbidden() {
    let app = TestApp::new();
    let owner_customer = ensure_customer(&app, "u2").await;
    let card = save_card(&app, "u2", &owner_customer, "cnon:card-nonce-ok").await;
    let customer_id = ensure_customer(&app, "u1").await;
    let payments_before = app.processor().payments_created();

    testing::post(app.router(), "/api/payments/charge")
        .json_body(&json!({
            "user_id": "u1",
            "customer_id": customer_id,
            "square_card_id": card["square_card_id"],
            "amount": 1000,
        }))
        .execute()
        .await
        .assert_forbidden()
        .assert_error_code("FORBIDDEN")
        .await;

    assert_eq!(app.processor().payments_created(), payments_before);
    assert!(app.processor().last_stored_charge().is_none());
}

#[tokio::test]
async fn test_token_charge_short_token() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/payments")
        .json_body(&json!({"amount_cents": 1000, "source_id": "short"}))
        .execute()
        .await
        .assert_unprocessable()
        .assert_error_code("MISSING_NONCE")
        .await;
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_blank_source_id_falls_back_to_nonce() {
    let app = TestApp::new();

    let body: Value = testing::post(app.router(), "/api/payments")
        .json_body(&json!({
            "amount_cents": 1000,
            "source_id": "",
            "nonce": "cnon:valid-token-123"
        }))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;

    assert_eq!(body["success"], true);
    let charge = app.processor().last_token_charge().unwrap();
    assert_eq!(charge.source_id, "cnon:valid-token-123");
}

#[tokio::test]
async fn test_token_charge_placeholder_token() {
    let app = TestApp::new();

    for token in ["undefined", "NULL", " cnon:placeholder ", "your_nonce_here"] {
        testing::post(app.router(), "/api/payments")
            .json_body(&json!({"amount_cents": 1000, "nonce": token}))
            .execute()
            .await
            .assert_unprocessable()
            .assert_error_code("MISSING_NONCE")
            .await;
    }
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_charge_without_source() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/payments")
        .json_body(&json!({"amount_cents": 1000}))
        .execute()
        .await
        .assert_unprocessable()
        .assert_error_code("MISSING_SOURCE")
        .await;
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_charge_bad_amounts() {
    let app = TestApp::new();

    for amount in [json!(0), json!(-5), json!("abc"), json!(10.5), Value::Null] {
        testing::post(app.router(), "/api/payments")
            .json_body(&json!({"amount_cents": amount, "source_id": "cnon:card-nonce-ok"}))
            .execute()
            .await
            .assert_unprocessable()
            .assert_error_code("BAD_AMOUNT")
            .await;
    }
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_charge_bad_currency() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/payments")
        .json_body(&json!({
            "amount_cents": 1000,
            "source_id": "cnon:card-nonce-ok",
            "currency": "DOLLARS",
        }))
        .execute()
        .await
        .assert_unprocessable()
        .assert_error_code("BAD_CURRENCY")
        .await;
}

#[tokio::test]
async fn test_token_charge_succeeds_with_string_amount() {
    let app = TestApp::new();

    let body: Value = testing::post(app.router(), "/api/payments")
        .json_body(&json!({
            "amount_cents": "2500",
            "source_id": "cnon:card-nonce-ok",
            "currency": "usd",
        }))
        .execute()
        .await
        .assert_ok()
        .json()
        .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["payment"]["status"], "COMPLETED");
    assert_eq!(body["payment"]["amount_money"]["amount"], 2500);
    assert_eq!(body["payment"]["amount_money"]["currency"], "USD");
}

#[tokio::test]
async fn test_token_charge_retry_reuses_payment() {
    let app = TestApp::new();
    let request = json!({"amount_cents": 1000, "source_id": "cnon:card-nonce-ok"});

    let first: Value = testing::post(app.router(), "/api/payments")
        .json_body(&request)
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    let retry: Value = testing::post(app.router(), "/api/payments")
        .json_body(&request)
        .execute()
        .await
        .assert_ok()
        .json()
        .await;

    assert_eq!(first["payment"]["id"], retry["payment"]["id"]);
    assert_eq!(app.processor().payments_created(), 1);
}

#[tokio::test]
async fn test_caller_idempotency_key_used_verbatim() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/payments")
        .json_body(&json!({
            "amount_cents": 1000,
            "source_id": "cnon:card-nonce-ok",
            "idempotency_key": "order-42-attempt-1",
        }))
        .execute()
        .await
        .assert_ok();

    let charge = app.processor().last_token_charge().unwrap();
    assert_eq!(charge.idempotency_key, "order-42-attempt-1");
}

#[tokio::test]
async fn test_caller_idempotency_key_too_long() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/payments")
        .json_body(&json!({
            "amount_cents": 1000,
            "source_id": "cnon:card-nonce-ok",
            "idempotency_key": "k".repeat(46),
        }))
        .execute()
        .await
        .assert_bad_request()
        .assert_error_code("BAD_IDEMPOTENCY_KEY")
        .await;
    assert_eq!(app.processor().call_count(), 0);
}

#[tokio::test]
async fn test_pending_payment_is_payment_required() {
    let app = TestApp::new();
    app.processor().set_payment_status(PaymentStatus::Pending);

    let body: Value = testing::post(app.router(), "/api/payments")
        .json_body(&json!({"amount_cents": 1000, "source_id": "cnon:card-nonce-ok"}))
        .execute()
        .await
        .assert_payment_required()
        .json()
        .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["payment"]["status"], "PENDING");
    assert!(body["payment"]["id"].is_string());
}

#[tokio::test]
async fn test_failed_stored_charge_is_payment_required() {
    let app = TestApp::new();
    let customer_id = ensure_customer(&app, "u1").await;
    let card = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;
    app.processor().set_payment_status(PaymentStatus::Failed);

    let body: Value = testing::post(app.router(), "/api/payments/charge")
        .json_body(&json!({
            "user_id": "u1",
            "customer_id": customer_id,
            "square_card_id": card["square_card_id"],
            "amount": 1000,
        }))
        .execute()
        .await
        .assert_payment_required()
        .json()
        .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["status"], "FAILED");
}

#[tokio::test]
async fn test_invalid_json_body() {
    let app = TestApp::new();

    testing::post(app.router(), "/api/payments")
        .raw_json("{not json")
        .execute()
        .await
        .assert_bad_request()
        .assert_error_code("INVALID_JSON")
        .await;
}

#[tokio::test]
async fn test_api_key_guards_writes() {
    let app = TestApp::new().with_api_key("internal-secret");

    testing::post(app.router(), "/api/square/customers/ensure")
        .json_body(&json!({"user_id": "u1"}))
        .execute()
        .await
        .assert_unauthorized()
        .assert_error_code("UNAUTHORIZED")
        .await;

    testing::post(app.router(), "/api/square/customers/ensure")
        .api_key("wrong-secret")
        .json_body(&json!({"user_id": "u1"}))
        .execute()
        .await
        .assert_unauthorized();

    testing::post(app.router(), "/api/square/customers/ensure")
        .api_key("internal-secret")
        .json_body(&json!({"user_id": "u1"}))
        .execute()
        .await
        .assert_ok();

    // Reads stay open
    testing::get(app.router(), "/api/cards?user_id=u1")
        .execute()
        .await
        .assert_ok();
    testing::get(app.router(), "/health").execute().await.assert_ok();

    assert_eq!(app.processor().customers_created(), 1);
}

#[tokio::test]
async fn test_health_and_banner() {
    let app = TestApp::new();

    let health: Value = testing::get(app.router(), "/health")
        .execute()
        .await
        .assert_ok()
        .assert_json()
        .assert_header_present("x-request-id")
        .json()
        .await;
    assert_eq!(health["ok"], true);
    assert_eq!(health["square_ready"], true);
    assert_eq!(health["supabase_ready"], true);
    assert_eq!(health["store"], "memory");
    assert!(health["timestamp"].is_string());

    let banner: Value = testing::get(app.router(), "/")
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert_eq!(banner["service"], "cardrelay");
    assert!(banner["endpoints"].as_array().unwrap().len() >= 7);
}

#[tokio::test]
async fn test_unknown_route() {
    let app = TestApp::new();

    testing::get(app.router(), "/api/nope")
        .execute()
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_delete_disables_card_when_enabled() {
    let config = cardrelay::ConfigBuilder::new()
        .with_disable_cards_on_delete(true)
        .build()
        .unwrap();
    let app = TestApp::new().with_config(config);
    let customer_id = ensure_customer(&app, "u1").await;
    let card = save_card(&app, "u1", &customer_id, "cnon:card-nonce-ok").await;
    let card_id = card["square_card_id"].as_str().unwrap();

    testing::delete(app.router(), &format!("/api/cards/{card_id}?user_id=u1"))
        .execute()
        .await
        .assert_ok();

    assert_eq!(app.processor().disabled_cards(), vec![card_id.to_string()]);
}
