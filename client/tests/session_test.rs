//! Session lifecycle: persistence across restarts, corrupt-file recovery,
//! and logout propagation into the other stores.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use booksphere_client::{RestApi, StoreFailure};
use booksphere_client::app::App;
use booksphere_client::mocks::{ApiCall, MemoryStorage, MockApi};
use booksphere_client::storage::{FileStorage, SessionStorage};
use booksphere_client::types::{Event, EventCategory, EventId, Role};
use booksphere_testing::mocks::test_clock;
use booksphere_core::environment::Clock;
use chrono::Duration as ChronoDuration;

const SETTLE: Duration = Duration::from_secs(5);

fn app_with(api: Arc<MockApi>, storage: Arc<dyn SessionStorage>) -> App {
    booksphere_testing::init_tracing();
    App::with_dependencies(api, storage, Arc::new(test_clock()), SETTLE)
}

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

fn seeded_api() -> Arc<MockApi> {
    let api = Arc::new(MockApi::new());
    api.seed_user("ada", "ada@example.com", "secret", Role::User);
    api.seed_event(Event {
        id: EventId::new("e1"),
        name: "RustFest".to_string(),
        description: String::new(),
        date: test_clock().now() + ChronoDuration::hours(24),
        venue: "Hall A".to_string(),
        price: 10.0,
        category: EventCategory::Professional,
        image: None,
    });
    api
}

#[tokio::test]
async fn session_survives_a_restart() {
    let api = seeded_api();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let session = {
        let app = app_with(Arc::clone(&api), Arc::new(FileStorage::new(&path)));
        let session = app.login("ada", "secret").await.unwrap();
        wait_idle(&app).await;
        session
    };

    // A second app over the same storage starts authenticated, no login.
    let app = app_with(Arc::clone(&api), Arc::new(FileStorage::new(&path)));
    let restored = app.current_session().await.expect("session restored");
    assert_eq!(restored, session);
}

#[tokio::test]
async fn restored_session_warms_the_booking_cache() {
    let api = seeded_api();
    let session = api.issue_session("ada");
    api.create_booking(&session.token, &EventId::new("e1"), 1)
        .await
        .unwrap();

    let storage = Arc::new(MemoryStorage::new());
    storage.save(&session).unwrap();
    let app = app_with(Arc::clone(&api), Arc::clone(&storage) as Arc<dyn SessionStorage>);

    // The restore-time fetch runs on a spawned task; poll until it lands.
    let deadline = tokio::time::Instant::now() + SETTLE;
    while !app.has_booked(&EventId::new("e1")).await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "restored session never warmed the booking cache"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(api.calls().contains(&ApiCall::ListBookings));
}

#[tokio::test]
async fn corrupt_session_file_starts_unauthenticated_and_is_purged() {
    let api = seeded_api();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, b"not json at all").unwrap();

    let app = app_with(Arc::clone(&api), Arc::new(FileStorage::new(&path)));

    assert!(app.current_session().await.is_none());
    assert!(!path.exists(), "corrupt entry must be purged");
}

#[tokio::test]
async fn logout_clears_persisted_session_and_derived_queries() {
    let api = seeded_api();
    let storage = Arc::new(MemoryStorage::new());
    let app = app_with(Arc::clone(&api), Arc::clone(&storage) as Arc<dyn SessionStorage>);

    app.login("ada", "secret").await.unwrap();
    wait_idle(&app).await;
    app.book(EventId::new("e1"), 1).await.unwrap();
    assert!(storage.saved().is_some());
    assert!(app.has_booked(&EventId::new("e1")).await);

    app.logout().await.unwrap();
    wait_idle(&app).await;

    assert!(app.current_session().await.is_none());
    assert!(storage.saved().is_none(), "persisted session must be cleared");

    // The cache may survive, but derived queries scope by the (now absent)
    // current user.
    assert!(!app.has_booked(&EventId::new("e1")).await);
    assert!(app.my_bookings().await.is_empty());
}

#[tokio::test]
async fn bad_credentials_surface_as_invalid_credentials() {
    let api = seeded_api();
    let app = app_with(api, Arc::new(MemoryStorage::new()));

    let err = app.login("ada", "wrong").await.unwrap_err();
    assert_eq!(err, StoreFailure::InvalidCredentials);
    assert!(app.current_session().await.is_none());
}

#[tokio::test]
async fn empty_credentials_fail_locally_without_network() {
    let api = seeded_api();
    let app = app_with(Arc::clone(&api), Arc::new(MemoryStorage::new()));

    let err = app.login("", "secret").await.unwrap_err();
    assert!(matches!(err, StoreFailure::Validation(_)));
    assert_eq!(api.call_count(), 0);
}

#[tokio::test]
async fn registration_with_token_logs_straight_in() {
    let api = Arc::new(MockApi::new());
    let storage = Arc::new(MemoryStorage::new());
    let app = app_with(Arc::clone(&api), Arc::clone(&storage) as Arc<dyn SessionStorage>);

    let session = app
        .register("grace", "grace@example.com", "hopper1", None)
        .await
        .unwrap()
        .expect("this backend issues tokens at registration");

    assert_eq!(session.user.role, Role::User);
    assert_eq!(app.current_session().await, Some(session));
    assert!(storage.saved().is_some());
}

#[tokio::test]
async fn registration_without_token_requires_follow_up_login() {
    let api = Arc::new(MockApi::without_register_tokens());
    let app = app_with(Arc::clone(&api), Arc::new(MemoryStorage::new()));

    let outcome = app
        .register("grace", "grace@example.com", "hopper1", None)
        .await
        .unwrap();

    assert!(outcome.is_none());
    assert!(app.current_session().await.is_none());

    let session = app.login("grace", "hopper1").await.unwrap();
    assert_eq!(session.user.username, "grace");
}

#[tokio::test]
async fn duplicate_registration_surfaces_conflict() {
    let api = seeded_api();
    let app = app_with(api, Arc::new(MemoryStorage::new()));

    let err = app
        .register("ada", "other@example.com", "secret1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreFailure::DuplicateIdentity(_)));
}
