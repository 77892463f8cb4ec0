use std::sync::Arc;

use axum::body::Body;
use axum::http::{request, Request, StatusCode};
use axum::Router;
use courier_backend::api::rest::router;
use courier_backend::config::Config;
use courier_backend::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Clone, Copy)]
struct Caller {
    id: Uuid,
    role: &'static str,
}

impl Caller {
    fn admin() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: "admin",
        }
    }
}

fn setup() -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(&Config::default()));
    (router(state.clone()), state)
}

fn builder(method: &str, uri: &str, caller: Option<Caller>) -> request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match caller {
        Some(caller) => builder
            .header("x-user-id", caller.id.to_string())
            .header("x-user-role", caller.role),
        None => builder,
    }
}

fn json_request(method: &str, uri: &str, caller: Option<Caller>, body: Value) -> Request<Body> {
    builder(method, uri, caller)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str, caller: Option<Caller>) -> Request<Body> {
    builder("GET", uri, caller).body(Body::empty()).unwrap()
}

fn patch_request(uri: &str, caller: Caller, body: Value) -> Request<Body> {
    json_request("PATCH", uri, Some(caller), body)
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

async fn create_user(app: &Router, admin: Caller, n: u32, role: &'static str) -> Caller {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users",
            Some(admin),
            json!({
                "name": format!("User {n}"),
                "email": format!("user{n}@example.com"),
                "phone": format!("+49151{n:07}"),
                "role": role,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    Caller {
        id: body["id"].as_str().unwrap().parse().unwrap(),
        role,
    }
}

async fn create_agent(app: &Router, admin: Caller, user: Caller) -> Uuid {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/agents",
            Some(admin),
            json!({
                "userId": user.id,
                "vehicleType": "bike",
                "vehicleNumber": "B-CR 42",
                "licenseNumber": "LIC-42",
                "serviceAreas": ["Mitte"],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

fn parcel_body(recipient: &str) -> Value {
    json!({
        "recipientName": recipient,
        "recipientPhone": "+4915199999999",
        "pickupAddress": "1 Warehouse Way",
        "deliveryAddress": "22 Elm Street",
        "parcelSize": "small",
        "parcelType": "document",
        "weight": 1.2,
        "paymentType": "cod",
        "codAmount": 25.0,
        "deliveryFee": 4.5,
    })
}

async fn create_parcel(app: &Router, customer: Caller, recipient: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/parcels",
            Some(customer),
            parcel_body(recipient),
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
    assert_eq!(body["parcels"], 0);
    assert_eq!(body["users"], 0);
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
    assert!(content_type.starts_with("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("parcels_created_total"));
    assert!(body.contains("agent_assignments_total"));
}

#[tokio::test]
async fn protected_routes_need_identity() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(get_request("/users", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_json(response).await["error"].is_string());

    let bad_role = Caller {
        id: Uuid::new_v4(),
        role: "courier",
    };
    let response = app
        .clone()
        .oneshot(get_request("/users", Some(bad_role)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_role_is_forbidden() {
    let (app, _state) = setup();
    let customer = Caller {
        id: Uuid::new_v4(),
        role: "customer",
    };

    let response = app
        .clone()
        .oneshot(get_request("/parcels/stats", Some(customer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(json_request(
            "POST",
            "/parcels",
            Some(Caller::admin()),
            parcel_body("Alice"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    create_user(&app, admin, 1, "customer").await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/users",
            Some(admin),
            json!({
                "name": "Copycat",
                "email": "USER1@example.com",
                "phone": "+4915100000099",
                "role": "customer",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_nonexistent_parcel_returns_404() {
    let (app, _state) = setup();
    let uri = format!("/parcels/{}", Uuid::new_v4());
    let response = app
        .oneshot(get_request(&uri, Some(Caller::admin())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_parcel_returns_pending_with_history() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;

    let body = create_parcel(&app, customer, "Alice").await;

    assert_eq!(body["status"], "pending");
    assert_eq!(body["statusHistory"].as_array().unwrap().len(), 1);
    assert_eq!(body["statusHistory"][0]["notes"], "Parcel booking created");
    assert_eq!(body["customer"]["email"], "user1@example.com");
    assert!(body["agent"].is_null());
    assert!(body["trackingId"].as_str().unwrap().starts_with("TRK"));
    assert!(body["qrCode"]
        .as_str()
        .unwrap()
        .starts_with("data:text/plain;base64,"));
    assert_eq!(body["barcode"].as_str().unwrap().len(), 12);
}

#[tokio::test]
async fn full_delivery_flow() {
    let (app, state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let rider = create_user(&app, admin, 2, "agent").await;
    let agent_id = create_agent(&app, admin, rider).await;

    let parcel = create_parcel(&app, customer, "Alice").await;
    let id = parcel["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/assign-agent"),
            admin,
            json!({ "agentId": agent_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "assigned");
    assert_eq!(body["agent"]["id"], rider.id.to_string());
    assert_eq!(body["statusHistory"][1]["updatedBy"], rider.id.to_string());
    assert_eq!(body["statusHistory"][1]["location"], "1 Warehouse Way");

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            rider,
            json!({ "status": "picked_up" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "picked_up");
    assert!(body["pickedUpAt"].is_string());
    assert!(body["currentLocation"].is_null());
    assert_eq!(body["statusHistory"][2]["location"], "1 Warehouse Way");

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            rider,
            json!({
                "status": "delivered",
                "location": "22 Elm Street",
                "latitude": 52.52,
                "longitude": 13.405,
                "expectedVersion": 3,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "delivered");
    assert!(body["deliveredAt"].is_string());
    assert_eq!(body["currentLocation"]["address"], "22 Elm Street");
    assert_eq!(body["deliveryAttempts"], 1);

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            rider,
            json!({ "status": "in_transit" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let agent = state.agents.get(&agent_id).unwrap().clone();
    assert_eq!(agent.successful_deliveries, 1);

    let response = app
        .clone()
        .oneshot(get_request("/notifications/unread-count", Some(customer)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["count"], 3);
}

#[tokio::test]
async fn agents_cannot_touch_parcels_of_others() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let rider = create_user(&app, admin, 2, "agent").await;
    create_agent(&app, admin, rider).await;
    let parcel = create_parcel(&app, customer, "Alice").await;
    let id = parcel["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            rider,
            json!({ "status": "cancelled" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            admin,
            json!({ "status": "assigned" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_can_force_an_out_of_table_transition() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let parcel = create_parcel(&app, customer, "Alice").await;
    let id = parcel["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            admin,
            json!({ "status": "failed", "failureReason": "address not found" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            admin,
            json!({ "status": "failed", "failureReason": "address not found", "force": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["failureReason"], "address not found");
}

#[tokio::test]
async fn list_paginates_in_creation_order() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    for n in 1..=25 {
        create_parcel(&app, customer, &format!("Recipient {n}")).await;
    }

    let response = app
        .clone()
        .oneshot(get_request(
            "/parcels?page=2&limit=10&sortBy=createdAt&sortOrder=asc",
            Some(admin),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 25);
    assert_eq!(body["totalPages"], 3);
    assert_eq!(body["page"], 2);
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|parcel| parcel["recipientName"].as_str().unwrap())
        .collect();
    let expected: Vec<String> = (11..=20).map(|n| format!("Recipient {n}")).collect();
    assert_eq!(names, expected);

    let response = app
        .clone()
        .oneshot(get_request("/parcels?limit=101", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(get_request("/parcels?sortBy=colour", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_is_case_insensitive_and_scoped_to_the_customer() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let alice = create_user(&app, admin, 1, "customer").await;
    let bob = create_user(&app, admin, 2, "customer").await;
    create_parcel(&app, alice, "Margaret Hamilton").await;
    create_parcel(&app, alice, "Grace Hopper").await;
    create_parcel(&app, bob, "Margot Robbie").await;

    let response = app
        .clone()
        .oneshot(get_request("/parcels?search=MARG", Some(admin)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["total"], 2);

    let response = app
        .oneshot(get_request("/parcels/my-parcels?search=marg", Some(alice)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["recipientName"], "Margaret Hamilton");
}

#[tokio::test]
async fn public_tracking_needs_no_identity() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let parcel = create_parcel(&app, customer, "Alice").await;
    let tracking_id = parcel["trackingId"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(get_request(&format!("/tracking/{tracking_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["parcelId"], parcel["id"]);
    assert_eq!(body["status"], "pending");
    assert!(body["agentLocation"].is_null());

    let response = app
        .clone()
        .oneshot(get_request(&format!("/parcels/track/{tracking_id}"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/tracking/TRK000000ZZZZZZ", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_are_seeded_and_typed() {
    let (app, _state) = setup();

    let response = app
        .clone()
        .oneshot(get_request("/settings/public", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body
        .as_array()
        .unwrap()
        .iter()
        .any(|setting| setting["key"] == "company_name"));

    let admin = Caller::admin();
    let response = app
        .clone()
        .oneshot(patch_request(
            "/settings/max_parcel_weight/value",
            admin,
            json!({ "value": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/settings/max_parcel_weight/value", Some(admin)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await, json!(2.0));

    let customer = create_user(&app, admin, 1, "customer").await;
    let mut heavy = parcel_body("Alice");
    heavy["weight"] = json!(3.0);
    let response = app
        .oneshot(json_request("POST", "/parcels", Some(customer), heavy))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn payment_confirm_and_refund() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let parcel = create_parcel(&app, customer, "Alice").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/payments",
            Some(customer),
            json!({ "parcelId": parcel["id"], "amount": 29.5, "paymentType": "online" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["trackingId"], parcel["trackingId"]);
    assert!(body["transactionId"].as_str().unwrap().starts_with("TXN"));
    let id = body["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(patch_request(&format!("/payments/{id}/confirm"), admin, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "completed");

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/payments/{id}/refund"),
            admin,
            json!({ "amount": 10.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["refundAmount"], 10.0);

    let response = app
        .oneshot(patch_request(&format!("/payments/{id}/confirm"), admin, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn notifications_are_private_to_their_owner() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let other = create_user(&app, admin, 2, "customer").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/notifications",
            Some(admin),
            json!({
                "userId": customer.id,
                "title": "Welcome",
                "message": "Thanks for signing up",
                "type": "email",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "sent");
    let id = body["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(patch_request(&format!("/notifications/{id}/read"), other, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(get_request("/notifications", Some(customer)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["total"], 1);

    let response = app
        .clone()
        .oneshot(patch_request("/notifications/mark-all-read", customer, json!({})))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["updated"], 1);

    let response = app
        .oneshot(get_request("/notifications/unread-count", Some(customer)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["count"], 0);
}

#[tokio::test]
async fn analytics_dashboard_counts_records() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    create_parcel(&app, customer, "Alice").await;
    create_parcel(&app, customer, "Bob").await;

    let response = app
        .clone()
        .oneshot(get_request("/analytics/dashboard", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["parcels"]["total"], 2);
    assert_eq!(body["parcels"]["today"], 2);
    assert_eq!(body["customers"], 1);

    let response = app
        .oneshot(get_request("/analytics/parcels?days=0", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_input_gets_a_json_error() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let parcel = create_parcel(&app, customer, "Alice").await;
    let id = parcel["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/parcels/{id}/status"),
            admin,
            json!({ "status": "teleported" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"]
        .as_str()
        .unwrap()
        .contains("teleported"));

    let response = app
        .clone()
        .oneshot(get_request("/parcels?page=abc", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    let response = app
        .clone()
        .oneshot(get_request("/parcels/not-a-uuid", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());

    let response = app
        .oneshot(
            builder("POST", "/parcels", Some(customer))
                .header("content-type", "application/json")
                .body(Body::from("{\"recipientName\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn malformed_refund_body_does_not_refund_in_full() {
    let (app, state) = setup();
    let admin = Caller::admin();
    let customer = create_user(&app, admin, 1, "customer").await;
    let parcel = create_parcel(&app, customer, "Alice").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/payments",
            Some(customer),
            json!({ "parcelId": parcel["id"], "amount": 20.0, "paymentType": "online" }),
        ))
        .await
        .unwrap();
    let id = body_json(response).await["id"].as_str().unwrap().to_string();
    app.clone()
        .oneshot(patch_request(&format!("/payments/{id}/confirm"), admin, json!({})))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(patch_request(
            &format!("/payments/{id}/refund"),
            admin,
            json!({ "amount": "everything" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payment_id: Uuid = id.parse().unwrap();
    assert!(state.payments.get(&payment_id).unwrap().refund_amount.is_none());

    let response = app
        .oneshot(
            builder("PATCH", &format!("/payments/{id}/refund"), Some(admin))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["refundAmount"], 20.0);
}

#[tokio::test]
async fn agent_search_covers_the_user_identity() {
    let (app, _state) = setup();
    let admin = Caller::admin();
    let rider = create_user(&app, admin, 92, "agent").await;
    let agent_id = create_agent(&app, admin, rider).await;
    let other = create_user(&app, admin, 93, "agent").await;
    create_agent(&app, admin, other).await;

    let response = app
        .clone()
        .oneshot(get_request("/agents?search=user%2092", Some(admin)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["id"], agent_id.to_string());

    let response = app
        .oneshot(get_request("/agents?search=user92%40example", Some(admin)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["total"], 1);
}
