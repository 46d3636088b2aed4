use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bill_splitter::domain::model::{Bill, Fees, LineItem, Money, Participant};
use bill_splitter::domain::ports::{BillParser, ParseRequest};
use bill_splitter::server::{build_router, AppState};
use bill_splitter::{ImageIntake, Result, SplitCalculator, SplitEngine};
use chrono::Duration;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

/// Returns a fixed pizza and salad bill where the salad has not been assigned.
struct FixedParser;

#[async_trait]
impl BillParser for FixedParser {
    async fn parse(&self, _request: &ParseRequest) -> Result<Bill> {
        Ok(Bill::new(
            vec![Participant::new("Alice"), Participant::new("Bob")],
            vec![
                LineItem::new("Pizza", Money::new(2000, 2)).shared_by(["Alice", "Bob"]),
                LineItem::new("Salad", Money::new(800, 2)),
            ],
        )
        .with_fees(Fees {
            tax: Money::new(280, 2),
            tip: Money::ZERO,
            delivery: Money::ZERO,
        }))
    }
}

fn state_with(intake: ImageIntake) -> AppState {
    let parser: Box<dyn BillParser> = Box::new(FixedParser);
    AppState::new(SplitEngine::new(intake, parser, SplitCalculator::default()))
}

fn app() -> Router {
    build_router(state_with(ImageIntake::default()))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}

fn upload() -> Value {
    upload_bytes(PNG)
}

fn upload_bytes(bytes: &[u8]) -> Value {
    json!({
        "images": [{"data": STANDARD.encode(bytes), "content_type": "image/png", "filename": "bill.png"}],
        "description": "Alice and Bob shared the pizza, Bob had the salad"
    })
}

/// A PNG signature followed by zero padding up to `size` bytes.
fn png_of_size(size: usize) -> Vec<u8> {
    let mut bytes = PNG.to_vec();
    bytes.resize(size, 0);
    bytes
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "bill-splitter");
}

#[tokio::test]
async fn test_review_flow() {
    let app = app();

    let (status, body) = send(&app, "POST", "/api/v1/bills/process", Some(upload())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["session_id"].as_str().unwrap().to_string();
    assert_eq!(body["state"], "editing");
    assert_eq!(body["outcome"]["issue"]["item"], 1);
    assert!(body["formatted_output"].as_str().unwrap().contains("--- SHARES ---"));

    // Confirming with an unassigned item fails and keeps the session editable.
    let (status, body) = send(&app, "POST", &format!("/api/v1/sessions/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "CALCULATION_ERROR");
    assert_eq!(body["error"]["item"], 1);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/edits", id),
        Some(json!({"op": "assign", "item": 1, "participants": ["Bob"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let shares = &body["outcome"]["split"]["shares"];
    assert_eq!(shares[0]["participant"], "Alice");
    assert_eq!(shares[0]["total"], "11.00");
    assert_eq!(shares[1]["total"], "19.80");

    let (status, body) = send(&app, "POST", &format!("/api/v1/sessions/{}/confirm", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "confirmed");

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/v1/sessions/{}/edits", id),
        Some(json!({"op": "set_price", "item": 0, "price": "25.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/v1/sessions/{}/export?format=csv", id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("Bob,18.00,1.80,0.00,0.00,19.80"));

    let (status, body) = send(&app, "POST", &format!("/api/v1/sessions/{}/reopen", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "editing");

    let (status, _) = send(&app, "DELETE", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, "GET", &format!("/api/v1/sessions/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_formatted_corrections_replace_the_bill() {
    let app = app();
    let (_, body) = send(&app, "POST", "/api/v1/bills/process", Some(upload())).await;
    let id = body["session_id"].as_str().unwrap().to_string();

    let corrected = body["formatted_output"]
        .as_str()
        .unwrap()
        .replace("Pizza: A, B", "Pizza: A, B\nSalad: A");
    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/v1/sessions/{}/formatted", id),
        Some(json!({"formatted_output": corrected})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["split"]["total"], "30.80");
}

#[tokio::test]
async fn test_process_rejects_non_images() {
    let (status, body) = send(
        &app(),
        "POST",
        "/api/v1/bills/process",
        Some(json!({
            "images": [{"data": STANDARD.encode(b"plain text, not a photo")}],
            "description": "whatever"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INTAKE_ERROR");
}

#[tokio::test]
async fn test_calculate_split_is_stateless() {
    let text = "--- PERSONS ---\nA: Alice\nB: Bob\n\n--- ITEMS ---\nPizza: 20.00\n\n--- FEES ---\nTax: 2.00\nDelivery Fee: 0.00\nTip: 3.00\nTotal: 25.00\n\n--- SHARES ---\nPizza: A, B";
    let (status, body) = send(
        &app(),
        "POST",
        "/api/v1/bills/calculate-split",
        Some(json!({"formatted_output": text})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["total_bill"], "25.00");
    assert_eq!(body["splits"][0]["total"], "12.50");
    assert_eq!(body["splits"][1]["total"], "12.50");

    let mismatched = text.replace("Total: 25.00", "Total: 30.00");
    let (status, body) = send(
        &app(),
        "POST",
        "/api/v1/bills/calculate-split",
        Some(json!({"formatted_output": mismatched})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("30.00"));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let (status, _) = send(&app(), "POST", "/api/v1/sessions/not-a-uuid/confirm", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_large_photo_within_intake_limit_is_accepted() {
    let image = png_of_size(3 * 1024 * 1024);
    let (status, body) = send(&app(), "POST", "/api/v1/bills/process", Some(upload_bytes(&image))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "editing");
}

#[tokio::test]
async fn test_body_limit_follows_intake_config() {
    let intake = ImageIntake {
        max_file_size: 1024,
        max_files: 1,
        ..ImageIntake::default()
    };
    let app = build_router(state_with(intake));

    let image = png_of_size(2 * 1024 * 1024);
    let (status, _) = send(&app, "POST", "/api/v1/bills/process", Some(upload_bytes(&image))).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_idle_sessions_are_evicted_on_upload() {
    let app = build_router(state_with(ImageIntake::default()).with_session_ttl(Duration::zero()));

    let (_, first) = send(&app, "POST", "/api/v1/bills/process", Some(upload())).await;
    let first_id = first["session_id"].as_str().unwrap().to_string();
    let (_, second) = send(&app, "POST", "/api/v1/bills/process", Some(upload())).await;
    let second_id = second["session_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "GET", &format!("/api/v1/sessions/{}", first_id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &format!("/api/v1/sessions/{}", second_id), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_repeated_item_names_keep_their_own_shares() {
    let text = "--- PERSONS ---\nA: Alice\nB: Bob\n\n--- ITEMS ---\nSoda: 2.00\nSoda: 2.00\nFries: 3.00\nFries: 3.00\n\n--- FEES ---\nTax: 0.00\n\n--- SHARES ---\nSoda #1: A\nSoda #2: B\nFries #1: A";
    let (status, body) = send(
        &app(),
        "POST",
        "/api/v1/bills/calculate-split",
        Some(json!({"formatted_output": text})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["item"], 3);

    let assigned = format!("{}\nFries #2: B", text);
    let (status, body) = send(
        &app(),
        "POST",
        "/api/v1/bills/calculate-split",
        Some(json!({"formatted_output": assigned})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["splits"][0]["total"], "5.00");
    assert_eq!(body["splits"][1]["total"], "5.00");
}
