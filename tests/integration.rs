use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use ride_dispatch::api::rest::router;
use ride_dispatch::config::DispatchConfig;
use ride_dispatch::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn setup() -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(&DispatchConfig::default()));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, caller: Uuid, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-account-id", caller.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, caller: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(caller) = caller {
        builder = builder.header("x-account-id", caller.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

fn post_empty(uri: &str, caller: Uuid) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("x-account-id", caller.to_string())
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

async fn register(app: &axum::Router, path: &str, account: Uuid, name: &str, gender: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            path,
            account,
            json!({ "name": name, "phone_number": "+915550177", "gender": gender }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bookings"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["passengers"], 0);
    assert_eq!(body["tracked_drivers"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics", None)).await.unwrap();

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
    assert!(body.contains("notifications_sent_total"));
    assert!(body.contains("tracked_drivers"));
}

#[tokio::test]
async fn missing_or_malformed_caller_returns_401() {
    let (app, _state) = setup();
    let response = app
        .clone()
        .oneshot(get_request("/driver/bookings/pending", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/driver/bookings/pending")
                .header("x-account-id", "not-a-uuid")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn duplicate_profile_returns_409() {
    let (app, _state) = setup();
    let account = Uuid::new_v4();
    register(&app, "/passengers", account, "Asha", "FEMALE").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/passengers",
            account,
            json!({ "name": "Asha", "phone_number": "+915550177" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn empty_profile_name_returns_400() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/drivers",
            Uuid::new_v4(),
            json!({ "name": "  ", "phone_number": "+915550177" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn booking_without_passenger_profile_returns_404() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request(
            "POST",
            "/bookings",
            Uuid::new_v4(),
            json!({
                "pickup": { "lat": 12.9, "lng": 77.6 },
                "dropoff": { "lat": 12.95, "lng": 77.65 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn out_of_range_driver_location_returns_400() {
    let (app, _state) = setup();
    let driver = Uuid::new_v4();
    register(&app, "/drivers", driver, "Kiran", "FEMALE").await;

    let response = app
        .oneshot(json_request(
            "PUT",
            "/driver/location",
            driver,
            json!({ "lat": 95.0, "lng": 77.6 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn huge_page_number_returns_empty_page() {
    let (app, _state) = setup();
    let driver = Uuid::new_v4();
    register(&app, "/drivers", driver, "Kiran", "FEMALE").await;

    let response = app
        .oneshot(get_request(
            &format!("/driver/bookings/pending?page={}&limit=100", u64::MAX),
            Some(driver),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn scheduled_booking_is_not_offered() {
    let (app, state) = setup();
    let passenger = Uuid::new_v4();
    register(&app, "/passengers", passenger, "Asha", "FEMALE").await;
    let scheduled_for = chrono::Utc::now() + chrono::Duration::hours(3);

    let response = app
        .oneshot(json_request(
            "POST",
            "/bookings",
            passenger,
            json!({
                "pickup": { "lat": 12.9, "lng": 77.6 },
                "dropoff": { "lat": 12.95, "lng": 77.65 },
                "scheduled_for": scheduled_for
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["booking"]["status"], "SCHEDULED");
    assert_eq!(body["dispatched"], false);
    assert_eq!(state.bus.depth("DRIVER_MATCHING"), 0);
}

#[tokio::test]
async fn full_ride_flow() {
    let (app, state) = setup();
    let tasks = state.start_background_tasks();

    let passenger = Uuid::new_v4();
    let driver = Uuid::new_v4();
    let far_driver = Uuid::new_v4();
    register(&app, "/passengers", passenger, "Asha", "FEMALE").await;
    let driver_profile = register(&app, "/drivers", driver, "Kiran", "FEMALE").await;
    register(&app, "/drivers", far_driver, "Dev", "OTHER").await;
    let driver_id = driver_profile["id"].as_str().unwrap().to_string();

    for (account, lat, lng) in [(driver, 12.91, 77.61), (far_driver, 13.2, 77.9)] {
        let res = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/driver/location",
                account,
                json!({ "lat": lat, "lng": lng }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/bookings",
            passenger,
            json!({
                "pickup": { "lat": 12.9, "lng": 77.6 },
                "dropoff": { "lat": 12.95, "lng": 77.65 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created = body_json(res).await;
    assert_eq!(created["booking"]["status"], "REQUESTED");
    assert_eq!(created["dispatched"], true);
    let booking_id = created["booking"]["id"].as_str().unwrap().to_string();
    let code = created["ride_start_code"].as_str().unwrap().to_string();

    let mut pending = Value::Null;
    for _ in 0..50 {
        let res = app
            .clone()
            .oneshot(get_request("/driver/bookings/pending", Some(driver)))
            .await
            .unwrap();
        pending = body_json(res).await;
        if !pending.as_array().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    let offers = pending.as_array().unwrap();
    assert_eq!(offers.len(), 1);
    assert_eq!(offers[0]["id"], booking_id);
    assert_eq!(offers[0]["notified_drivers"], json!([driver_id]));

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/driver/bookings/{booking_id}/accept"), far_driver))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/driver/bookings/{booking_id}/accept"), driver))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "ACCEPTED");

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/driver/bookings/{booking_id}/start"),
            driver,
            json!({ "code": code }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "STARTED");

    let res = app
        .clone()
        .oneshot(post_empty(&format!("/driver/bookings/{booking_id}/end"), driver))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ended = body_json(res).await;
    assert_eq!(ended["booking"]["status"], "COMPLETED");
    assert_eq!(ended["booking"]["driver_id"], driver_id);
    assert!(ended["receipt"]["amount"].as_f64().unwrap() > 5.0);

    let res = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/bookings/{booking_id}/rate"),
            passenger,
            json!({ "rating": 5, "note": "great ride" }),
        ))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let summary = body_json(res).await;
    assert_eq!(summary["rating_count"], 1);
    assert_eq!(summary["average_rating"], 5.0);

    let res = app
        .clone()
        .oneshot(get_request(&format!("/bookings/{booking_id}"), Some(passenger)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let booking = body_json(res).await;
    assert_eq!(booking["status"], "COMPLETED");
    assert!(booking["review_by_passenger"].is_string());

    let res = app
        .oneshot(get_request(&format!("/bookings/{booking_id}"), Some(far_driver)))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    tasks.shutdown().await;
}
