use gavel_server::{AppConfig, AppState, build_app};
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let config = AppConfig::default();
    let state = AppState::from_config(&config).await.unwrap();
    let app = build_app(state, &config);

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

fn new_item(id: &str) -> Value {
    json!({
        "id": id,
        "name": "Item 1",
        "description": "Item 1 description",
        "endingAt": "2999-01-01T00:00:00Z",
        "price": 0
    })
}

#[tokio::test]
async fn health_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "Gavel Server");

    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn item_reads_are_cached_until_a_bid_lands() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/items"))
        .json(&new_item("666"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert_eq!(resp.headers()["cache-status"], "BYPASS");

    let resp = client.get(format!("{base}/items/666")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["cache-status"], "MISS");

    let resp = client.get(format!("{base}/items/666")).send().await.unwrap();
    assert_eq!(resp.headers()["cache-status"], "HIT");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["price"], 0.0);

    let buckets: Value = client
        .get(format!("{base}/bucket"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(buckets["buckets"], json!(["666", "items"]));

    let resp = client
        .post(format!("{base}/bids/spin-lock"))
        .json(&json!({"itemId": "666", "userId": "1", "price": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["bids"], 1);
    assert_eq!(body["highestBidUserId"], "1");

    // The bid dropped bucket "666", so the next read goes to the store.
    let resp = client.get(format!("{base}/items/666")).send().await.unwrap();
    assert_eq!(resp.headers()["cache-status"], "MISS");
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["price"], 10.0);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn bid_errors_map_to_status_codes() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/bids/quorum-lock"))
        .json(&json!({"itemId": "404", "userId": "1", "price": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["message"], "Item does not exist");

    client
        .post(format!("{base}/items"))
        .json(&new_item("1"))
        .send()
        .await
        .unwrap();
    let ok = client
        .post(format!("{base}/bids/no-lock"))
        .json(&json!({"itemId": "1", "userId": "1", "price": 14}))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);

    let resp = client
        .post(format!("{base}/bids/spin-lock"))
        .json(&json!({"itemId": "1", "userId": "2", "price": 10}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Bid = 10 too low (less than 14)");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn invalid_items_are_rejected() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let mut negative = new_item("8");
    negative["price"] = json!(-1);
    let resp = client
        .post(format!("{base}/items"))
        .json(&negative)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "bad_request");

    let mut unnamed = new_item("8");
    unnamed["name"] = json!("  ");
    let resp = client
        .post(format!("{base}/items"))
        .json(&unnamed)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client.get(format!("{base}/items/8")).send().await.unwrap();
    assert_eq!(resp.status(), 404);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn buckets_can_be_deleted() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/items"))
        .json(&new_item("7"))
        .send()
        .await
        .unwrap();
    let resp = client.get(format!("{base}/items/7")).send().await.unwrap();
    assert_eq!(resp.headers()["cache-status"], "MISS");

    let resp = client
        .delete(format!("{base}/bucket/7,items"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["buckets"], json!(["7", "items"]));
    // entry + two buckets
    assert_eq!(body["removed"], 3);

    let buckets: Value = client
        .get(format!("{base}/bucket"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(buckets["buckets"], json!([]));

    let resp = client.get(format!("{base}/items/7")).send().await.unwrap();
    assert_eq!(resp.headers()["cache-status"], "MISS");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn metrics_endpoint_without_recorder() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/metrics")).send().await.unwrap();
    // This test binary never installs a recorder.
    assert_eq!(resp.status(), 503);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
