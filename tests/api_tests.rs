//! API integration tests against the in-memory store

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, NaiveDate};
use serde_json::{json, Value};
use tower::ServiceExt;

use library_service::{
    api,
    clock::{Clock, ManualClock},
    config::AppConfig,
    models::{Claims, Principal},
    repository::Repository,
    services::Services,
    AppState,
};

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
}

impl TestApp {
    fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = SECRET.to_string();

        let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()));
        let state = AppState {
            config: Arc::new(config),
            services: Arc::new(Services::new(Repository::in_memory(), clock.clone())),
        };

        Self {
            router: api::create_router(state),
            clock,
        }
    }

    fn in_days(&self, days: i64) -> String {
        (self.clock.today() + Duration::days(days)).to_string()
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        principal: Option<Principal>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(format!("/api/v1{}", uri))
            .header("content-type", "application/json");
        if let Some(principal) = principal {
            builder = builder.header("authorization", format!("Bearer {}", token(principal)));
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_book(&self, inventory: i32, daily_fee: &str) -> i64 {
        let (status, body) = self
            .send(
                "POST",
                "/books",
                Some(Principal::staff(100)),
                Some(json!({
                    "title": "The Left Hand of Darkness",
                    "author": "Ursula K. Le Guin",
                    "cover": "SOFT",
                    "inventory": inventory,
                    "daily_fee": daily_fee,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_i64().unwrap()
    }

    async fn borrow(&self, principal: Principal, book_id: i64, days: i64) -> (StatusCode, Value) {
        let expected = self.in_days(days);
        self.send(
            "POST",
            "/borrowings",
            Some(principal),
            Some(json!({ "book_id": book_id, "expected_return_date": expected })),
        )
        .await
    }

    async fn inventory(&self, book_id: i64) -> i64 {
        let (_, body) = self.send("GET", &format!("/books/{}", book_id), None, None).await;
        body["inventory"].as_i64().unwrap()
    }
}

fn token(principal: Principal) -> String {
    let now = chrono::Utc::now().timestamp();
    Claims::new(principal, now, 3600).create_token(SECRET).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_anonymous_borrowing_access_is_rejected() {
    let app = TestApp::new();
    let (status, _) = app.send("GET", "/borrowings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(
            "POST",
            "/borrowings",
            None,
            Some(json!({ "book_id": 1, "expected_return_date": "2030-01-01" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_books_are_public_but_writes_are_staff_only() {
    let app = TestApp::new();
    app.create_book(10, "2.50").await;

    let (status, body) = app.send("GET", "/books", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["cover"], "SOFT");
    assert_eq!(body[0]["daily_fee"], "2.50");

    let (status, _) = app
        .send(
            "POST",
            "/books",
            Some(Principal::reader(1)),
            Some(json!({
                "title": "Book 1",
                "author": "Author 1",
                "inventory": 10,
                "daily_fee": "2.50",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_negative_daily_fee_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/books",
            Some(Principal::staff(1)),
            Some(json!({
                "title": "Book 1",
                "author": "Author 1",
                "inventory": 10,
                "daily_fee": "-4",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_daily_fee_beyond_ten_digits_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/books",
            Some(Principal::staff(1)),
            Some(json!({
                "title": "Book 1",
                "author": "Author 1",
                "inventory": 1,
                "daily_fee": "79228162514264337593543950335",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_last_copy_then_return_after_ten_days() {
    let app = TestApp::new();
    let book_id = app.create_book(1, "2.50").await;
    let alice = Principal::reader(1);
    let bob = Principal::reader(2);

    let (status, borrowing) = app.borrow(alice, book_id, 14).await;
    assert_eq!(status, StatusCode::CREATED, "{borrowing}");
    assert_eq!(borrowing["actual_return_date"], Value::Null);
    assert_eq!(borrowing["is_active"], true);
    assert_eq!(borrowing["book"]["inventory"], 0);
    assert_eq!(app.inventory(book_id).await, 0);

    let (status, body) = app.borrow(bob, book_id, 14).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "OutOfStock");
    assert_eq!(app.inventory(book_id).await, 0);

    app.clock.advance_days(10);
    let id = borrowing["id"].as_i64().unwrap();
    let (status, returned) = app
        .send("POST", &format!("/borrowings/{}/return", id), Some(alice), None)
        .await;
    assert_eq!(status, StatusCode::OK, "{returned}");
    assert_eq!(returned["fee_to_pay"], "25.00");
    assert_eq!(returned["actual_return_date"], app.in_days(0));
    assert_eq!(app.inventory(book_id).await, 1);

    let (status, body) = app
        .send("POST", &format!("/borrowings/{}/return", id), Some(alice), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AlreadyReturned");
    assert_eq!(app.inventory(book_id).await, 1);

    // Fee is frozen at the return date
    app.clock.advance_days(30);
    let (_, fetched) = app
        .send("GET", &format!("/borrowings/{}", id), Some(alice), None)
        .await;
    assert_eq!(fetched["fee_to_pay"], "25.00");
}

#[tokio::test]
async fn test_same_day_round_trip_is_free() {
    let app = TestApp::new();
    let book_id = app.create_book(3, "2.50").await;
    let reader = Principal::reader(7);

    let (_, borrowing) = app.borrow(reader, book_id, 5).await;
    assert_eq!(app.inventory(book_id).await, 2);

    let id = borrowing["id"].as_i64().unwrap();
    let (status, returned) = app
        .send("POST", &format!("/borrowings/{}/return", id), Some(reader), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["fee_to_pay"], "0.00");
    assert_eq!(app.inventory(book_id).await, 3);
}

#[tokio::test]
async fn test_expected_return_date_must_be_in_the_future() {
    let app = TestApp::new();
    let book_id = app.create_book(3, "1.00").await;

    let (status, _) = app.borrow(Principal::reader(1), book_id, 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.borrow(Principal::reader(1), book_id, -2).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.inventory(book_id).await, 3);
}

#[tokio::test]
async fn test_borrowing_unknown_book_is_not_found() {
    let app = TestApp::new();
    let (status, body) = app.borrow(Principal::reader(1), 999, 3).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchData");
}

#[tokio::test]
async fn test_other_users_borrowings_are_invisible() {
    let app = TestApp::new();
    let book_id = app.create_book(5, "2.00").await;
    let owner = Principal::reader(1);
    let stranger = Principal::reader(2);

    let (_, borrowing) = app.borrow(owner, book_id, 7).await;
    let id = borrowing["id"].as_i64().unwrap();

    let (status, _) = app
        .send("GET", &format!("/borrowings/{}", id), Some(stranger), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send("POST", &format!("/borrowings/{}/return", id), Some(stranger), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(app.inventory(book_id).await, 4);

    // Staff may return on the owner's behalf
    let (status, _) = app
        .send("POST", &format!("/borrowings/{}/return", id), Some(Principal::staff(50)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.inventory(book_id).await, 5);
}

#[tokio::test]
async fn test_list_filters() {
    let app = TestApp::new();
    let book_id = app.create_book(10, "1.50").await;
    let alice = Principal::reader(1);
    let bob = Principal::reader(2);
    let staff = Principal::staff(3);

    let (_, first) = app.borrow(alice, book_id, 7).await;
    app.borrow(bob, book_id, 7).await;
    app.borrow(alice, book_id, 7).await;
    let first_id = first["id"].as_i64().unwrap();
    app.send("POST", &format!("/borrowings/{}/return", first_id), Some(alice), None)
        .await;

    let ids = |body: &Value| -> Vec<i64> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|b| b["id"].as_i64().unwrap())
            .collect()
    };

    // A reader asking for someone else still only gets their own
    let (status, body) = app.send("GET", "/borrowings?user_id=2", Some(alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().iter().all(|b| b["user_id"] == 1));
    assert_eq!(ids(&body).len(), 2);

    let (_, body) = app.send("GET", "/borrowings", Some(staff), None).await;
    assert_eq!(ids(&body).len(), 3);

    let (_, body) = app.send("GET", "/borrowings?user_id=2", Some(staff), None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["user_id"], 2);

    let (status, body) = app.send("GET", "/borrowings?user_id=abc", Some(staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (_, body) = app
        .send("GET", "/borrowings?is_active=false", Some(staff), None)
        .await;
    assert_eq!(ids(&body), vec![first_id]);

    let (_, body) = app
        .send("GET", "/borrowings?user_id=1&is_active=true", Some(staff), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["is_active"], true);
}

#[tokio::test]
async fn test_malformed_list_filter_gets_an_error_body() {
    let app = TestApp::new();
    let (status, body) = app
        .send("GET", "/borrowings?is_active=maybe", Some(Principal::staff(1)), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
    assert_eq!(body["code"], 7);
}

#[tokio::test]
async fn test_deleting_a_book_removes_its_borrowings() {
    let app = TestApp::new();
    let book_id = app.create_book(2, "1.00").await;
    let reader = Principal::reader(1);
    app.borrow(reader, book_id, 3).await;

    let (status, _) = app
        .send("DELETE", &format!("/books/{}", book_id), Some(Principal::staff(9)), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, body) = app.send("GET", "/borrowings", Some(reader), None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_succeed_exactly_inventory_times() {
    let app = Arc::new(TestApp::new());
    let book_id = app.create_book(4, "2.50").await;

    let mut tasks = tokio::task::JoinSet::new();
    for user_id in 1..=12 {
        let app = app.clone();
        tasks.spawn(async move { app.borrow(Principal::reader(user_id), book_id, 7).await.0 });
    }

    let mut created = 0;
    let mut conflicts = 0;
    while let Some(status) = tasks.join_next().await {
        match status.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert_eq!(created, 4);
    assert_eq!(conflicts, 8);
    assert_eq!(app.inventory(book_id).await, 0);

    let (_, body) = app
        .send("GET", "/borrowings?is_active=true", Some(Principal::staff(1)), None)
        .await;
    assert_eq!(body.as_array().unwrap().len(), 4);
}
