//! End-to-end booking flows through the assembled app.
//!
//! Runs against the in-memory `MockApi`, which records every call it
//! receives — the assertions on call counts are what prove that locally
//! rejected commands never touch the network.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use booksphere_client::app::App;
use booksphere_client::mocks::{ApiCall, MemoryStorage, MockApi};
use booksphere_client::types::{Event, EventCategory, EventId, Role};
use booksphere_client::{RestApi, StoreFailure};
use booksphere_core::environment::Clock;
use booksphere_testing::mocks::test_clock;
use chrono::Duration as ChronoDuration;

const SETTLE: Duration = Duration::from_secs(5);

fn sample_event(id: &str, hours_from_now: i64) -> Event {
    Event {
        id: EventId::new(id),
        name: format!("Event {id}"),
        description: "An event".to_string(),
        date: test_clock().now() + ChronoDuration::hours(hours_from_now),
        venue: "Hall A".to_string(),
        price: 0.0,
        category: EventCategory::Cultural,
        image: None,
    }
}

/// App wired to a mock backend with one seeded user and one seeded event.
fn app_with(api: Arc<MockApi>) -> App {
    booksphere_testing::init_tracing();
    App::with_dependencies(
        api,
        Arc::new(MemoryStorage::new()),
        Arc::new(test_clock()),
        SETTLE,
    )
}

/// Wait until no effects are in flight on any store, so background work
/// (like the post-login booking fetch) cannot race with the next step.
async fn wait_idle(app: &App) {
    let deadline = tokio::time::Instant::now() + SETTLE;
    while app.session_store().pending_effects() > 0
        || app.events_store().pending_effects() > 0
        || app.bookings_store().pending_effects() > 0
    {
        assert!(tokio::time::Instant::now() < deadline, "stores never idled");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn booking_updates_has_booked_without_refetch() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));
    let app = app_with(Arc::clone(&api));

    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;
    assert!(!app.has_booked(&EventId::new("e1")).await);

    app.book(EventId::new("e1"), 1).await.unwrap();

    // Derived from the cache alone; no fetch in between.
    assert!(app.has_booked(&EventId::new("e1")).await);
}

#[tokio::test]
async fn duplicate_booking_is_rejected_without_network_call() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));
    let app = app_with(Arc::clone(&api));

    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;
    app.book(EventId::new("e1"), 1).await.unwrap();

    let calls_before = api.call_count();
    let err = app.book(EventId::new("e1"), 1).await.unwrap_err();

    assert_eq!(err, StoreFailure::DuplicateBooking);
    assert_eq!(api.call_count(), calls_before, "reject must not hit the API");
    assert_eq!(api.bookings().len(), 1);
}

#[tokio::test]
async fn zero_quantity_is_rejected_without_network_call() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));
    let app = app_with(Arc::clone(&api));

    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;
    let calls_before = api.call_count();

    let err = app.book(EventId::new("e1"), 0).await.unwrap_err();
    assert!(matches!(err, StoreFailure::Validation(_)));
    assert_eq!(api.call_count(), calls_before);
}

#[tokio::test]
async fn cancelling_someone_elses_booking_is_forbidden_locally() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    let eve = api.seed_user("eve", "eve@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));

    // Eve books through the backend directly.
    let eve_session = api.issue_session("eve");
    let eve_booking = api
        .create_booking(&eve_session.token, &EventId::new("e1"), 1)
        .await
        .unwrap();
    assert_eq!(eve_booking.user_id, eve.id);

    // Place Eve's booking in Ada's cache directly (as a stale admin-scoped
    // fetch would) to exercise the ownership guard.
    let app = app_with(Arc::clone(&api));
    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;
    app.bookings_store()
        .send(booksphere_client::bookings::BookingAction::BookingCreated {
            booking: eve_booking.clone(),
        })
        .await
        .unwrap();

    let calls_before = api.call_count();
    let err = app.cancel(eve_booking.id.clone()).await.unwrap_err();

    assert!(matches!(err, StoreFailure::Forbidden(_)));
    assert_eq!(api.call_count(), calls_before);
    assert_eq!(api.bookings().len(), 1, "server side unchanged");
}

#[tokio::test]
async fn full_booking_flow_books_and_cancels_a_free_event() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));
    let app = app_with(Arc::clone(&api));

    let issued_at = chrono::Utc::now();
    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;

    let events = app.fetch_events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].price, 0.0);

    let booking = app.book(events[0].id.clone(), 1).await.unwrap();
    assert_eq!(booking.quantity, 1);
    assert!(booking.booked_at >= issued_at);
    assert!(app.has_booked(&events[0].id).await);

    app.cancel(booking.id.clone()).await.unwrap();
    assert!(!app.has_booked(&events[0].id).await);
    assert!(app.my_bookings().await.is_empty());
    assert!(api.bookings().is_empty());
}

#[tokio::test]
async fn login_warms_the_booking_cache() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));
    let session = api.issue_session("ada");
    api.create_booking(&session.token, &EventId::new("e1"), 1)
        .await
        .unwrap();

    let app = app_with(Arc::clone(&api));
    app.login("ada", "secret").await.unwrap();

    // The post-login fetch runs in the background; wait for it to settle.
    wait_idle(&app).await;
    assert!(app.has_booked(&EventId::new("e1")).await);
    assert!(api.calls().contains(&ApiCall::ListBookings));
}

#[tokio::test]
async fn server_failure_surfaces_through_book() {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(sample_event("e1", 24));
    let app = app_with(Arc::clone(&api));

    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;
    api.fail_next(StoreFailure::Network("connection reset".to_string()));

    let err = app.book(EventId::new("e1"), 1).await.unwrap_err();
    assert!(matches!(err, StoreFailure::Network(_)));
    assert!(!app.has_booked(&EventId::new("e1")).await);
}
