use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use clap::Parser;
use reqwest::StatusCode;
use serde_json::json;

use storefront_api::app::{AppServices, build_app};
use storefront_api::auth::{JwtClaims, issue_token};
use storefront_api::config::ServerConfig;
use storefront_catalog::{Product, ProductId, Variation, VariationId};
use storefront_core::{AggregateId, CustomerId, Money, SessionId};
use storefront_infra::notify::RecordingNotifier;
use storefront_infra::workers::WorkerHandle;
use storefront_payments::WebhookVerifier;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const ADMIN_TOKEN: &str = "admin-test-token";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    notifier: Arc<RecordingNotifier>,
    handle: tokio::task::JoinHandle<()>,
    worker: Option<WorkerHandle>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let config = test_config(&base_url);
        let notifier = Arc::new(RecordingNotifier::new());
        let services = Arc::new(AppServices::with_notifier(&config, notifier.clone()).unwrap());
        let worker = services.spawn_notifications().unwrap();
        let app = build_app(services.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            notifier,
            handle,
            worker: Some(worker),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn seed(&self, name: &str, price: i64, variations: Vec<Variation>) -> Product {
        let product = Product {
            id: ProductId::new(AggregateId::new()),
            slug: name.to_lowercase().replace(' ', "-"),
            sku: format!("SKU-{}", name.to_uppercase()),
            name: name.to_string(),
            price: Money::from_minor(price),
            compare_at_price: None,
            stock: 10,
            is_active: true,
            variations,
        };
        self.services.catalog.upsert(product.clone());
        product
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
        if let Some(w) = self.worker.take() {
            w.shutdown();
        }
    }
}

fn test_config(base_url: &str) -> ServerConfig {
    ServerConfig::try_parse_from([
        "storefront-api",
        "--jwt-secret",
        JWT_SECRET,
        "--stripe-webhook-secret",
        WEBHOOK_SECRET,
        "--admin-token",
        ADMIN_TOKEN,
        "--public-base-url",
        base_url,
    ])
    .expect("test config")
}

fn mint_jwt(customer: CustomerId) -> String {
    let claims = JwtClaims::new(customer, Utc::now(), ChronoDuration::minutes(10));
    issue_token(JWT_SECRET.as_bytes(), &claims).expect("failed to encode jwt")
}

fn variation(value: &str, adjustment: i64, active: bool) -> Variation {
    Variation {
        id: VariationId::new(AggregateId::new()),
        name: "Color".to_string(),
        value: value.to_string(),
        price_adjustment: Money::from_minor(adjustment),
        stock: 5,
        sku: String::new(),
        is_active: active,
    }
}

fn checkout_form() -> serde_json::Value {
    json!({
        "email": "ada@example.com",
        "first_name": "Ada",
        "last_name": "Lovelace",
        "phone": "555-0100",
        "shipping": {
            "street": "1 Loom Lane",
            "city": "London",
            "state": "LDN",
            "postal_code": "N1",
        },
    })
}

fn signed_webhook(event: &serde_json::Value) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(event).unwrap();
    let header = WebhookVerifier::new(WEBHOOK_SECRET, 300).sign(&body, Utc::now().timestamp());
    (body, header)
}

fn session_completed(session_id: &str) -> serde_json::Value {
    json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "payment_intent": "pi_test_1",
            "payment_status": "paid",
        }}
    })
}

async fn add(client: &reqwest::Client, srv: &TestServer, session: SessionId, body: serde_json::Value) -> reqwest::Response {
    client
        .post(srv.url("/cart/add"))
        .header("x-session-id", session.to_string())
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn get_cart(client: &reqwest::Client, srv: &TestServer, session: SessionId) -> serde_json::Value {
    let res = client
        .get(srv.url("/cart"))
        .header("x-session-id", session.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

async fn start_checkout(client: &reqwest::Client, srv: &TestServer, token: &str) -> serde_json::Value {
    let res = client
        .post(srv.url("/checkout/session"))
        .bearer_auth(token)
        .json(&checkout_form())
        .send()
        .await
        .unwrap();
    let status = res.status();
    if status != StatusCode::CREATED {
        let body = res.text().await.unwrap_or_default();
        panic!("expected 201 from checkout, got {status} body={body}");
    }
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn cart_requires_some_identity() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/cart")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_session");

    let res = client
        .get(srv.url("/cart"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_cart_add_update_remove() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let blue = variation("Blue", 500, true);
    let sofa = srv.seed("Sofa", 20_000, vec![blue.clone()]);
    let session = SessionId::new();

    let res = add(
        &client,
        &srv,
        session,
        json!({ "product_id": sofa.id.to_string(), "quantity": 1, "variation_ids": [blue.id.to_string()] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let added: serde_json::Value = res.json().await.unwrap();
    let line_key = added["line_key"].as_str().unwrap().to_string();

    add(
        &client,
        &srv,
        session,
        json!({ "product_id": sofa.id.to_string(), "quantity": 2, "variation_ids": [blue.id.to_string()] }),
    )
    .await;

    let cart = get_cart(&client, &srv, session).await;
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(cart["item_count"], 3);
    assert_eq!(cart["total"], 3 * 20_500);

    let res = client
        .post(srv.url("/cart/update"))
        .header("x-session-id", session.to_string())
        .json(&json!({ "line_key": line_key, "quantity": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cart: serde_json::Value = res.json().await.unwrap();
    assert_eq!(cart["item_count"], 0);

    // Removing again is fine.
    let res = client
        .post(srv.url("/cart/remove"))
        .header("x-session-id", session.to_string())
        .json(&json!({ "line_key": line_key }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn add_rejects_bad_input() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let retired = variation("Red", 0, false);
    let chair = srv.seed("Chair", 5_000, vec![retired.clone()]);
    let session = SessionId::new();

    let res = add(&client, &srv, session, json!({ "product_id": chair.id.to_string(), "quantity": 0 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = add(
        &client,
        &srv,
        session,
        json!({ "product_id": chair.id.to_string(), "variation_ids": [retired.id.to_string()] }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = add(&client, &srv, session, json!({ "product_id": ProductId::new(AggregateId::new()).to_string() })).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let cart = get_cart(&client, &srv, session).await;
    assert_eq!(cart["item_count"], 0);
}

#[tokio::test]
async fn malformed_bodies_get_the_json_error_envelope() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let session = SessionId::new();

    let res = client
        .post(srv.url("/cart/add"))
        .header("x-session-id", session.to_string())
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_body");
    assert!(err["message"].is_string());

    let res = client
        .post(srv.url("/cart/update"))
        .header("x-session-id", session.to_string())
        .body("line_key=x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_body");

    let res = client.get(srv.url("/checkout/cancel")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_query");
}

#[tokio::test]
async fn login_merges_session_cart_into_customer_cart() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let lamp = srv.seed("Lamp", 3_000, vec![]);
    let session = SessionId::new();
    let customer = CustomerId::new();
    let token = mint_jwt(customer);

    // Customer already has one lamp from an earlier visit.
    client
        .post(srv.url("/cart/add"))
        .bearer_auth(&token)
        .json(&json!({ "product_id": lamp.id.to_string() }))
        .send()
        .await
        .unwrap();
    add(&client, &srv, session, json!({ "product_id": lamp.id.to_string(), "quantity": 2 })).await;

    let res = client
        .post(srv.url("/cart/merge"))
        .header("x-session-id", session.to_string())
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["combined"], 1);

    let res = client.get(srv.url("/cart")).bearer_auth(&token).send().await.unwrap();
    let cart: serde_json::Value = res.json().await.unwrap();
    assert_eq!(cart["lines"].as_array().unwrap().len(), 1);
    assert_eq!(cart["item_count"], 3);

    let anon = get_cart(&client, &srv, session).await;
    assert_eq!(anon["item_count"], 0);
}

#[tokio::test]
async fn checkout_webhook_replay_accepts_order_once() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let desk = srv.seed("Desk", 5_000, vec![]);
    let customer = CustomerId::new();
    let token = mint_jwt(customer);

    client
        .post(srv.url("/cart/add"))
        .bearer_auth(&token)
        .json(&json!({ "product_id": desk.id.to_string() }))
        .send()
        .await
        .unwrap();

    let preview: serde_json::Value = client
        .get(srv.url("/checkout/preview"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(preview["total"], 5_500);

    let started = start_checkout(&client, &srv, &token).await;
    let order_number = started["order_number"].as_str().unwrap().to_string();
    let txn = started["transaction_id"].as_str().unwrap().to_string();
    assert_eq!(started["total"], 5_500);

    let res = client.get(srv.url("/cart")).bearer_auth(&token).send().await.unwrap();
    let cart: serde_json::Value = res.json().await.unwrap();
    assert_eq!(cart["item_count"], 0);

    let (body, signature) = signed_webhook(&session_completed(&txn));
    for _ in 0..2 {
        let res = client
            .post(srv.url("/checkout/webhook"))
            .header("stripe-signature", &signature)
            .header("content-type", "application/json")
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = client
        .get(srv.url(&format!("/orders/{order_number}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let order: serde_json::Value = res.json().await.unwrap();
    assert_eq!(order["status"], "accepted");
    assert_eq!(order["payment_status"], "completed");
    assert_eq!(order["totals"]["tax"], 500);

    // The worker runs in the background; give it a moment.
    let mut receipts = 0;
    for _ in 0..50 {
        receipts = srv
            .notifier
            .sent()
            .iter()
            .filter(|e| e.subject == format!("Payment received - {order_number}"))
            .count();
        if receipts > 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(receipts, 1);
    assert_eq!(
        srv.notifier
            .sent()
            .iter()
            .filter(|e| e.subject.starts_with("Payment received"))
            .count(),
        1
    );

    let list: serde_json::Value = client
        .get(srv.url("/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let body = serde_json::to_vec(&session_completed("cs_whatever")).unwrap();
    let forged = WebhookVerifier::new("whsec_wrong", 300).sign(&body, Utc::now().timestamp());

    let res = client
        .post(srv.url("/checkout/webhook"))
        .header("stripe-signature", forged)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "webhook_rejected");

    let res = client.post(srv.url("/checkout/webhook")).body(body).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn return_from_gateway_confirms_payment() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let rug = srv.seed("Rug", 12_000, vec![]);
    let token = mint_jwt(CustomerId::new());
    client
        .post(srv.url("/cart/add"))
        .bearer_auth(&token)
        .json(&json!({ "product_id": rug.id.to_string() }))
        .send()
        .await
        .unwrap();
    let started = start_checkout(&client, &srv, &token).await;
    let order_number = started["order_number"].as_str().unwrap();

    // Forged return before paying: nothing changes.
    let res = client
        .get(srv.url(&format!(
            "/checkout/success?order={order_number}&session_id={}",
            started["transaction_id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();
    let early: serde_json::Value = res.json().await.unwrap();
    assert_eq!(early["paid"], false);
    assert_eq!(early["status"], "new");

    // The simulated hosted page pays and redirects back to the success URL.
    let res = client
        .get(started["redirect_url"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: serde_json::Value = res.json().await.unwrap();
    assert_eq!(page["paid"], true);
    assert_eq!(page["status"], "accepted");
}

#[tokio::test]
async fn gateway_outage_restores_cart() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let shelf = srv.seed("Shelf", 7_000, vec![]);
    let token = mint_jwt(CustomerId::new());
    client
        .post(srv.url("/cart/add"))
        .bearer_auth(&token)
        .json(&json!({ "product_id": shelf.id.to_string(), "quantity": 2 }))
        .send()
        .await
        .unwrap();
    srv.services
        .simulated_gateway
        .as_ref()
        .unwrap()
        .set_unavailable(true);

    let res = client
        .post(srv.url("/checkout/session"))
        .bearer_auth(&token)
        .json(&checkout_form())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "gateway_error");

    let cart: serde_json::Value = client
        .get(srv.url("/cart"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cart["item_count"], 2);

    let orders: serde_json::Value = client
        .get(srv.url("/orders"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(orders.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn empty_cart_and_bad_details_are_refused() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = mint_jwt(CustomerId::new());

    let res = client
        .post(srv.url("/checkout/session"))
        .bearer_auth(&token)
        .json(&checkout_form())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "cart_empty");

    let mut form = checkout_form();
    form["email"] = json!("no-at-sign");
    let res = client
        .post(srv.url("/checkout/session"))
        .bearer_auth(&token)
        .json(&form)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_are_private_to_their_customer() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let vase = srv.seed("Vase", 900, vec![]);
    let owner = mint_jwt(CustomerId::new());
    let stranger = mint_jwt(CustomerId::new());
    client
        .post(srv.url("/cart/add"))
        .bearer_auth(&owner)
        .json(&json!({ "product_id": vase.id.to_string() }))
        .send()
        .await
        .unwrap();
    let started = start_checkout(&client, &srv, &owner).await;
    let path = format!("/orders/{}", started["order_number"].as_str().unwrap());

    let res = client.get(srv.url(&path)).bearer_auth(&stranger).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client.get(srv.url(&path)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_refund_requires_token() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let bed = srv.seed("Bed", 40_000, vec![]);
    let token = mint_jwt(CustomerId::new());
    client
        .post(srv.url("/cart/add"))
        .bearer_auth(&token)
        .json(&json!({ "product_id": bed.id.to_string() }))
        .send()
        .await
        .unwrap();
    let started = start_checkout(&client, &srv, &token).await;
    let txn = started["transaction_id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/admin/payments/{txn}/refund")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url(&format!("/admin/payments/{txn}/refund")))
        .header("x-admin-token", ADMIN_TOKEN)
        .json(&json!({ "reason": "customer changed their mind" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let outcome: serde_json::Value = res.json().await.unwrap();
    assert_eq!(outcome["outcome"], "applied");
    assert_eq!(outcome["status"], "refunded");
}
