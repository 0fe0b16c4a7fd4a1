use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use delivery_dispatch::api::rest::router;
use delivery_dispatch::config::Config;
use delivery_dispatch::models::location::GeoPoint;
use delivery_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (Router, Arc<AppState>) {
    let mut config = Config::default();
    config.dispatch.pickup_location = Some(GeoPoint {
        lat: 24.8607,
        lng: 67.0011,
    });
    let state = Arc::new(AppState::new(&config));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn create_rider(app: &Router, name: &str) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/riders", json!({ "name": name })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

async fn create_order(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({ "customer_name": "Hina", "address": "Block 5, Clifton" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["riders"], 0);
    assert_eq!(body["orders"], 0);
    assert_eq!(body["locations"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("locations_ingested_total"));
}

#[tokio::test]
async fn create_rider_starts_idle() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/riders",
            json!({ "name": "Ali", "phone": "+923001234567" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["name"], "Ali");
    assert_eq!(body["status"], "IDLE");
    assert!(!body["id"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn create_rider_empty_name_returns_422() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/riders", json!({ "name": "  " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn unknown_order_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(get_request("/orders/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn assign_then_busy_rider_returns_422() {
    let (app, _state) = setup();
    let rider = create_rider(&app, "Ali").await;
    let first = create_order(&app).await;
    let second = create_order(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{first}/assign"),
            json!({ "rider_id": rider }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ASSIGNED");
    assert_eq!(body["assigned_rider_id"], rider);
    assert_eq!(body["rider"]["status"], "BUSY");

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{second}/assign"),
            json!({ "rider_id": rider }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["kind"], "rider_busy");

    let response = app
        .oneshot(get_request(&format!("/riders/{rider}/order")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], first);
}

#[tokio::test]
async fn rider_without_order_returns_204() {
    let (app, _state) = setup();
    let rider = create_rider(&app, "Ali").await;

    let response = app
        .oneshot(get_request(&format!("/riders/{rider}/order")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn status_flow_records_audit_trail() {
    let (app, _state) = setup();
    let rider = create_rider(&app, "Ali").await;
    let order = create_order(&app).await;

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order}/assign"),
            json!({ "rider_id": rider }),
        ))
        .await
        .unwrap();

    for status in ["PICKED_UP", "DELIVERED"] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/orders/{order}/status"),
                json!({ "status": status, "reason": "rider app" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(get_request(&format!("/riders/{rider}")))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["status"], "IDLE");

    let response = app
        .oneshot(get_request(&format!("/orders/{order}/events")))
        .await
        .unwrap();
    let events = body_json(response).await;
    let kinds: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["kind"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["created", "assigned", "status_changed", "status_changed"]
    );
    assert_eq!(events[3]["meta"]["reason"], "rider app");
}

#[tokio::test]
async fn unknown_status_is_rejected() {
    let (app, _state) = setup();
    let order = create_order(&app).await;

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/orders/{order}/status"),
            json!({ "status": "TELEPORTED" }),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn location_upload_updates_map() {
    let (app, state) = setup();
    let rider = create_rider(&app, "Ali").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/riders/{rider}/locations"),
            json!({
                "points": [
                    { "lat": 24.861, "lng": 67.002, "speed": 4.2 },
                    { "lat": 24.862, "lng": 67.003, "battery": 71 }
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["broadcast"], true);
    assert_eq!(state.store.location_count(), 2);

    let response = app.oneshot(get_request("/map/riders")).await.unwrap();
    let positions = body_json(response).await;
    assert_eq!(positions[0]["lat"], 24.862);
    assert_eq!(positions[0]["battery"], 71);
}

#[tokio::test]
async fn oversized_location_batch_returns_422() {
    let (app, state) = setup();
    let rider = create_rider(&app, "Ali").await;
    let points: Vec<Value> = (0..51)
        .map(|_| json!({ "lat": 24.86, "lng": 67.0 }))
        .collect();

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/riders/{rider}/locations"),
            json!({ "points": points }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(state.store.location_count(), 0);
}

#[tokio::test]
async fn pos_import_is_idempotent() {
    let (app, _state) = setup();
    let payload = json!({
        "pos_order_id": "POS-1001",
        "customer_name": "Hina",
        "customer_phone": "+923331112222",
        "delivery_address": "Block 5, Clifton",
        "latitude": 24.82,
        "longitude": 67.03,
        "items": [{ "name": "Karahi", "qty": 1 }],
        "total_amount": 1800
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/pos/orders", payload.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["code"], "POS-1001");
    assert_eq!(created["status"], "UNASSIGNED");
    assert!(created["notes"]
        .as_str()
        .unwrap()
        .contains("Total Amount: 1800.00"));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/pos/orders", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["id"], created["id"]);

    let response = app.oneshot(get_request("/orders")).await.unwrap();
    assert_eq!(body_json(response).await["total"], 1);
}

#[tokio::test]
async fn list_orders_filters_by_status() {
    let (app, _state) = setup();
    let rider = create_rider(&app, "Ali").await;
    let assigned = create_order(&app).await;
    create_order(&app).await;

    app.clone()
        .oneshot(json_request(
            "POST",
            &format!("/orders/{assigned}/assign"),
            json!({ "rider_id": rider }),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(get_request("/orders?status=ASSIGNED"))
        .await
        .unwrap();
    let page = body_json(response).await;
    let orders = page["data"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["id"], assigned);
}

#[tokio::test]
async fn list_orders_searches_and_pages() {
    let (app, _state) = setup();
    for (name, phone) in [("Hina", "+923331112222"), ("Bilal", "+923009998888")] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/orders",
                json!({ "customer_name": name, "customer_phone": phone }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }
    for _ in 0..3 {
        create_order(&app).await;
    }

    let response = app
        .clone()
        .oneshot(get_request("/orders?search=999888&date_filter=today"))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["customer_name"], "Bilal");

    let response = app
        .clone()
        .oneshot(get_request("/orders?search=hina"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["total"], 4);

    let response = app
        .oneshot(get_request("/orders?per_page=2&page=3"))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 5);
    assert_eq!(page["per_page"], 2);
    assert_eq!(page["last_page"], 3);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn branch_lifecycle() {
    let (app, _state) = setup();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/branches",
            json!({ "name": "Clifton", "code": "CLF" }),
        ))
        .await
        .unwrap();
    let branch = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/branches/{branch}"),
            json!({ "name": "Clifton Kitchen", "phone": "+922135550000" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], "Clifton Kitchen");
    assert_eq!(body["code"], "CLF");
    assert_eq!(body["is_open"], true);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/branches/{branch}/deactivate"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["is_open"], false);

    let response = app
        .clone()
        .oneshot(get_request("/branches?is_active=true"))
        .await
        .unwrap();
    assert!(body_json(response).await.as_array().unwrap().is_empty());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/orders",
            json!({ "branch_id": branch, "customer_name": "Hina" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri(format!("/branches/{branch}"))
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["kind"], "validation");

    let response = app
        .oneshot(json_request(
            "POST",
            &format!("/branches/{branch}/activate"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["is_active"], true);
}

#[tokio::test]
async fn unreferenced_branch_is_deleted() {
    let (app, _state) = setup();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/branches",
            json!({ "name": "Saddar", "code": "SDR" }),
        ))
        .await
        .unwrap();
    let branch = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/branches/{branch}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(get_request(&format!("/branches/{branch}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/index.html")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn duplicate_branch_code_returns_409() {
    let (app, _state) = setup();
    let branch = json!({
        "name": "Clifton",
        "code": "CLF",
        "opening_time": "10:00:00",
        "closing_time": "02:00:00"
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/branches", branch.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["is_open"].is_boolean());

    let response = app
        .oneshot(json_request("POST", "/branches", branch))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
