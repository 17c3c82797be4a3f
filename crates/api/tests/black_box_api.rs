//! Black-box tests over HTTP: the same router as production, bound to an
//! ephemeral port, driven with reqwest.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use dropmart_core::{ResellerId, SupplierId};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_app(dropmart_api::app::build_app()).await
    }

    async fn spawn_denying() -> Self {
        Self::spawn_app(dropmart_api::app::build_app_with_gate(Arc::new(
            dropmart_api::authz::DenyAll,
        )))
        .await
    }

    async fn spawn_app(app: axum::Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn supplier_headers(supplier_id: SupplierId) -> [(&'static str, String); 2] {
    [
        ("x-actor-role", "supplier".to_string()),
        ("x-actor-id", supplier_id.to_string()),
    ]
}

fn reseller_headers(reseller_id: ResellerId) -> [(&'static str, String); 2] {
    [
        ("x-actor-role", "reseller".to_string()),
        ("x-actor-id", reseller_id.to_string()),
    ]
}

fn with_headers(
    req: reqwest::RequestBuilder,
    headers: &[(&'static str, String)],
) -> reqwest::RequestBuilder {
    headers
        .iter()
        .fold(req, |req, (name, value)| req.header(*name, value.as_str()))
}

async fn transition(
    client: &reqwest::Client,
    base_url: &str,
    headers: &[(&'static str, String)],
    sub_order_id: &str,
    new_status: &str,
    expected_version: u64,
) -> serde_json::Value {
    let res = with_headers(
        client.post(format!("{base_url}/sub-orders/{sub_order_id}/transition")),
        headers,
    )
    .json(&json!({
        "new_status": new_status,
        "idempotency_key": uuid::Uuid::now_v7(),
        "expected_version": expected_version,
    }))
    .send()
    .await
    .unwrap();

    assert_eq!(res.status(), StatusCode::OK, "transition to {new_status}");
    res.json().await.unwrap()
}

#[tokio::test]
async fn health_endpoint_is_public() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/healthz", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn mutations_require_identity_headers() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/checkout", srv.base_url))
        .json(&json!({
            "client": {"name": "A", "phone": "1", "address": "X"},
            "lines": [],
            "delivery_fee": "10.00",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn gate_denial_is_forbidden() {
    let srv = TestServer::spawn_denying().await;
    let client = reqwest::Client::new();
    let supplier_id = SupplierId::new();

    let res = with_headers(
        client.post(format!("{}/products", srv.base_url)),
        &supplier_headers(supplier_id),
    )
    .json(&json!({"name": "Gadget", "wholesale_price": "40.00", "initial_stock": 5}))
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_suppliers_define_products() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = with_headers(
        client.post(format!("{}/products", srv.base_url)),
        &reseller_headers(ResellerId::new()),
    )
    .json(&json!({"name": "Gadget", "wholesale_price": "40.00", "initial_stock": 5}))
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn full_pipeline_over_http() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let supplier_id = SupplierId::new();
    let reseller_id = ResellerId::new();
    let supplier = supplier_headers(supplier_id);
    let reseller = reseller_headers(reseller_id);

    // Seed the catalog.
    let res = with_headers(client.post(format!("{}/products", srv.base_url)), &supplier)
        .json(&json!({
            "name": "Gadget",
            "wholesale_price": "40.00",
            "initial_stock": 10,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let product: serde_json::Value = res.json().await.unwrap();
    let product_id = product["product_id"].as_str().unwrap().to_string();
    assert_eq!(product["stock"], 10);

    // Reseller checks out one unit.
    let res = with_headers(client.post(format!("{}/checkout", srv.base_url)), &reseller)
        .json(&json!({
            "client": {
                "name": "Amine B.",
                "phone": "0550 12 34 56",
                "address": "12 rue Didouche Mourad, Alger",
            },
            "lines": [{
                "product_id": product_id.clone(),
                "quantity": 1,
                "unit_sale_price": "55.00",
            }],
            "delivery_fee": "10.00",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let order: serde_json::Value = res.json().await.unwrap();
    let order_id = order["id"].as_str().unwrap().to_string();
    let sub_order_id = order["sub_orders"][0]["sub_order_id"]
        .as_str()
        .unwrap()
        .to_string();

    // Stock reserved.
    let res = client
        .get(format!("{}/products/{}/stock", srv.base_url, product_id))
        .send()
        .await
        .unwrap();
    let levels: serde_json::Value = res.json().await.unwrap();
    assert_eq!(levels["stock"], 9);

    // Sub-order visible with its initial audit record.
    let res = client
        .get(format!("{}/sub-orders/{}", srv.base_url, sub_order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let model: serde_json::Value = res.json().await.unwrap();
    assert_eq!(model["status"], "non_confirmee");
    assert_eq!(model["tracking"].as_array().unwrap().len(), 1);
    let mut version = model["version"].as_u64().unwrap();

    // Drive the lifecycle to pret_pour_enlevement.
    for status in ["en_cours", "pret_pour_enlevement"] {
        let model = transition(&client, &srv.base_url, &supplier, &sub_order_id, status, version).await;
        version = model["version"].as_u64().unwrap();
    }

    // A stale version is rejected with 409.
    let res = with_headers(
        client.post(format!(
            "{}/sub-orders/{}/transition",
            srv.base_url, sub_order_id
        )),
        &supplier,
    )
    .json(&json!({
        "new_status": "livre",
        "idempotency_key": uuid::Uuid::now_v7(),
        "expected_version": 1,
    }))
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Batch the ready sub-order into a pickup.
    let res = with_headers(client.post(format!("{}/pickups", srv.base_url)), &supplier)
        .json(&json!({"sub_order_ids": [sub_order_id.clone()]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let pickup: serde_json::Value = res.json().await.unwrap();
    let pickup_id = pickup["pickup_id"].as_str().unwrap().to_string();
    assert_eq!(pickup["status"], "awaiting_courier");

    // Manifest totals the batch.
    let res = with_headers(
        client.get(format!("{}/pickups/{}/manifest", srv.base_url, pickup_id)),
        &supplier,
    )
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["manifest"]["grand_total"], "65.00");
    assert!(body["printable"].as_str().unwrap().contains("Amine B."));

    // Courier collects; the sub-order still moves through the state machine.
    let res = with_headers(
        client.post(format!("{}/pickups/{}/collected", srv.base_url, pickup_id)),
        &supplier,
    )
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    for status in ["livre", "livre_paye"] {
        let model = transition(&client, &srv.base_url, &supplier, &sub_order_id, status, version).await;
        version = model["version"].as_u64().unwrap();
    }

    // Financials for the default (today) window.
    let res = with_headers(
        client.get(format!(
            "{}/suppliers/{}/financials",
            srv.base_url, supplier_id
        )),
        &supplier,
    )
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["revenue"]["ca_reel"], "65.00");
    assert_eq!(report["counts"]["paid_delivered"], 1);
    assert_eq!(report["counts"]["pickups"], 1);
    assert_eq!(report["taux_retour"], "0");

    // The cart-level order is reassembled by the directory.
    let res = client
        .get(format!("{}/orders/{}", srv.base_url, order_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let assembled: serde_json::Value = res.json().await.unwrap();
    assert_eq!(assembled["sub_orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn insufficient_stock_names_the_offending_product() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let supplier_id = SupplierId::new();
    let supplier = supplier_headers(supplier_id);

    let res = with_headers(client.post(format!("{}/products", srv.base_url)), &supplier)
        .json(&json!({"name": "Lampe", "wholesale_price": "80.00", "initial_stock": 1}))
        .send()
        .await
        .unwrap();
    let product: serde_json::Value = res.json().await.unwrap();
    let product_id = product["product_id"].as_str().unwrap().to_string();

    let res = with_headers(
        client.post(format!("{}/checkout", srv.base_url)),
        &reseller_headers(ResellerId::new()),
    )
    .json(&json!({
        "client": {"name": "Sara K.", "phone": "0661 00 11 22", "address": "Oran"},
        "lines": [{
            "product_id": product_id.clone(),
            "quantity": 3,
            "unit_sale_price": "120.00",
        }],
        "delivery_fee": "10.00",
    }))
    .send()
    .await
    .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert!(body["message"].as_str().unwrap().contains(&product_id));

    // Nothing reserved.
    let res = client
        .get(format!("{}/products/{}/stock", srv.base_url, product_id))
        .send()
        .await
        .unwrap();
    let levels: serde_json::Value = res.json().await.unwrap();
    assert_eq!(levels["stock"], 1);
}
