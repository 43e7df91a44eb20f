//! In-memory fakes for tests: a behavioral [`MockApi`] standing in for the
//! whole REST backend, and [`MemoryStorage`] for session persistence.
//!
//! `MockApi` records every call it receives, so tests can assert not just on
//! resulting state but on the absence of network traffic for locally
//! rejected commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::api::{RegisterOutcome, RestApi};
use crate::error::StoreFailure;
use crate::storage::{SessionStorage, StorageError};
use crate::types::{
    Booking, BookingId, Event, EventId, EventPatch, NewEvent, Role, Session, Token, User, UserId,
};

/// One recorded API invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCall {
    /// `login`
    Login,
    /// `register_user`
    RegisterUser,
    /// `register_admin`
    RegisterAdmin,
    /// `list_events`
    ListEvents,
    /// `create_event`
    CreateEvent,
    /// `update_event`
    UpdateEvent,
    /// `delete_event`
    DeleteEvent,
    /// `list_bookings`
    ListBookings,
    /// `create_booking`
    CreateBooking,
    /// `cancel_booking`
    CancelBooking,
}

struct MockAccount {
    user: User,
    password: String,
}

#[derive(Default)]
struct Inner {
    accounts: Vec<MockAccount>,
    events: Vec<Event>,
    bookings: Vec<Booking>,
    tokens: HashMap<String, UserId>,
    calls: Vec<ApiCall>,
    fail_next: Option<StoreFailure>,
}

/// Behavioral in-memory REST backend.
pub struct MockApi {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    admin_secret: String,
    /// Whether registration answers with a token (logs the account in)
    token_on_register: bool,
}

impl Default for MockApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockApi {
    /// Empty backend; registration issues tokens.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
            admin_secret: "admin-secret".to_string(),
            token_on_register: true,
        }
    }

    /// Backend whose registration endpoint answers without a token, the way
    /// deployments that require a follow-up login do.
    #[must_use]
    pub fn without_register_tokens() -> Self {
        Self {
            token_on_register: false,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn fresh_token() -> Token {
        Token::new(format!("tok-{}", Uuid::new_v4()))
    }

    /// The privilege key `register_admin` accepts.
    #[must_use]
    pub fn admin_secret(&self) -> &str {
        &self.admin_secret
    }

    /// Register an account directly, bypassing the API surface.
    pub fn seed_user(&self, username: &str, email: &str, password: &str, role: Role) -> User {
        let user = User {
            id: UserId::new(self.fresh_id()),
            username: username.to_string(),
            email: email.to_string(),
            role,
        };
        self.lock().accounts.push(MockAccount {
            user: user.clone(),
            password: password.to_string(),
        });
        user
    }

    /// Insert a catalog entry directly.
    pub fn seed_event(&self, event: Event) {
        self.lock().events.push(event);
    }

    /// Insert a booking directly.
    pub fn seed_booking(&self, booking: Booking) {
        self.lock().bookings.push(booking);
    }

    /// Issue a valid session for a seeded user, bypassing `login`.
    ///
    /// # Panics
    ///
    /// Panics if no account with that username was seeded.
    #[must_use]
    #[allow(clippy::panic)]
    pub fn issue_session(&self, username: &str) -> Session {
        let token = Self::fresh_token();
        let mut inner = self.lock();
        let Some(account) = inner.accounts.iter().find(|a| a.user.username == username) else {
            panic!("no seeded account named {username}");
        };
        let user = account.user.clone();
        inner.tokens.insert(token.as_str().to_string(), user.id.clone());
        Session { token, user }
    }

    /// Make the next API call fail with the given failure.
    pub fn fail_next(&self, failure: StoreFailure) {
        self.lock().fail_next = Some(failure);
    }

    /// Every call received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// Number of calls received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Current server-side bookings.
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.lock().bookings.clone()
    }

    /// Current server-side catalog.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    fn begin(&self, call: ApiCall) -> Result<MutexGuard<'_, Inner>, StoreFailure> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if let Some(failure) = inner.fail_next.take() {
            return Err(failure);
        }
        Ok(inner)
    }

    fn register(
        &self,
        mut inner: MutexGuard<'_, Inner>,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<RegisterOutcome, StoreFailure> {
        let taken = inner
            .accounts
            .iter()
            .any(|a| a.user.username == username || a.user.email == email);
        if taken {
            return Err(StoreFailure::DuplicateIdentity(
                "username or email already registered".to_string(),
            ));
        }

        let user = User {
            id: UserId::new(self.fresh_id()),
            username: username.to_string(),
            email: email.to_string(),
            role,
        };
        inner.accounts.push(MockAccount {
            user: user.clone(),
            password: password.to_string(),
        });

        let token = if self.token_on_register {
            let token = Self::fresh_token();
            inner
                .tokens
                .insert(token.as_str().to_string(), user.id.clone());
            Some(token)
        } else {
            None
        };

        Ok(RegisterOutcome { token, user })
    }
}

fn authenticate(inner: &Inner, token: &Token) -> Result<User, StoreFailure> {
    let user_id = inner
        .tokens
        .get(token.as_str())
        .ok_or(StoreFailure::InvalidToken)?;
    inner
        .accounts
        .iter()
        .find(|a| &a.user.id == user_id)
        .map(|a| a.user.clone())
        .ok_or(StoreFailure::InvalidToken)
}

fn require_admin(user: &User) -> Result<(), StoreFailure> {
    if user.role.is_admin() {
        Ok(())
    } else {
        Err(StoreFailure::admin_required())
    }
}

#[async_trait]
impl RestApi for MockApi {
    async fn login(&self, username: &str, password: &str) -> Result<Session, StoreFailure> {
        let mut inner = self.begin(ApiCall::Login)?;
        let user = inner
            .accounts
            .iter()
            .find(|a| a.user.username == username && a.password == password)
            .map(|a| a.user.clone())
            .ok_or(StoreFailure::InvalidCredentials)?;

        let token = Self::fresh_token();
        inner
            .tokens
            .insert(token.as_str().to_string(), user.id.clone());
        Ok(Session { token, user })
    }

    async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, StoreFailure> {
        let inner = self.begin(ApiCall::RegisterUser)?;
        self.register(inner, username, email, password, Role::User)
    }

    async fn register_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
        secret_key: &str,
    ) -> Result<RegisterOutcome, StoreFailure> {
        let inner = self.begin(ApiCall::RegisterAdmin)?;
        if secret_key != self.admin_secret {
            return Err(StoreFailure::Forbidden(
                "invalid admin privilege key".to_string(),
            ));
        }
        self.register(inner, username, email, password, Role::Admin)
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreFailure> {
        let inner = self.begin(ApiCall::ListEvents)?;
        Ok(inner.events.clone())
    }

    async fn create_event(&self, token: &Token, event: &NewEvent) -> Result<Event, StoreFailure> {
        let mut inner = self.begin(ApiCall::CreateEvent)?;
        let user = authenticate(&inner, token)?;
        require_admin(&user)?;

        let created = Event {
            id: EventId::new(self.fresh_id()),
            name: event.name.clone(),
            description: event.description.clone(),
            date: event.date,
            venue: event.venue.clone(),
            price: event.price,
            category: event.category,
            image: event.image.clone(),
        };
        inner.events.push(created.clone());
        Ok(created)
    }

    async fn update_event(
        &self,
        token: &Token,
        id: &EventId,
        patch: &EventPatch,
    ) -> Result<Event, StoreFailure> {
        let mut inner = self.begin(ApiCall::UpdateEvent)?;
        let user = authenticate(&inner, token)?;
        require_admin(&user)?;

        let event = inner
            .events
            .iter_mut()
            .find(|e| &e.id == id)
            .ok_or_else(|| StoreFailure::NotFound(format!("event {id} not found")))?;
        patch.apply(event);
        Ok(event.clone())
    }

    async fn delete_event(&self, token: &Token, id: &EventId) -> Result<(), StoreFailure> {
        let mut inner = self.begin(ApiCall::DeleteEvent)?;
        let user = authenticate(&inner, token)?;
        require_admin(&user)?;

        let before = inner.events.len();
        inner.events.retain(|e| &e.id != id);
        if inner.events.len() == before {
            return Err(StoreFailure::NotFound(format!("event {id} not found")));
        }
        Ok(())
    }

    async fn list_bookings(&self, token: &Token) -> Result<Vec<Booking>, StoreFailure> {
        let inner = self.begin(ApiCall::ListBookings)?;
        let user = authenticate(&inner, token)?;

        // Admins see the whole collection, users only their own.
        let bookings = if user.role.is_admin() {
            inner.bookings.clone()
        } else {
            inner
                .bookings
                .iter()
                .filter(|b| b.user_id == user.id)
                .cloned()
                .collect()
        };
        Ok(bookings)
    }

    async fn create_booking(
        &self,
        token: &Token,
        event_id: &EventId,
        quantity: u32,
    ) -> Result<Booking, StoreFailure> {
        let mut inner = self.begin(ApiCall::CreateBooking)?;
        let user = authenticate(&inner, token)?;

        if !inner.events.iter().any(|e| &e.id == event_id) {
            return Err(StoreFailure::NotFound(format!("event {event_id} not found")));
        }
        let duplicate = inner
            .bookings
            .iter()
            .any(|b| b.user_id == user.id && &b.event_id == event_id);
        if duplicate {
            return Err(StoreFailure::DuplicateBooking);
        }

        let booking = Booking {
            id: BookingId::new(self.fresh_id()),
            user_id: user.id,
            event_id: event_id.clone(),
            quantity,
            booked_at: Utc::now(),
        };
        inner.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn cancel_booking(&self, token: &Token, id: &BookingId) -> Result<(), StoreFailure> {
        let mut inner = self.begin(ApiCall::CancelBooking)?;
        let user = authenticate(&inner, token)?;

        let booking = inner
            .bookings
            .iter()
            .find(|b| &b.id == id)
            .ok_or_else(|| StoreFailure::NotFound(format!("booking {id} not found")))?;
        if booking.user_id != user.id && !user.role.is_admin() {
            return Err(StoreFailure::Forbidden(
                "you can only cancel your own bookings".to_string(),
            ));
        }

        inner.bookings.retain(|b| &b.id != id);
        Ok(())
    }
}

/// In-memory [`SessionStorage`].
#[derive(Default)]
pub struct MemoryStorage {
    session: Mutex<Option<Session>>,
}

impl MemoryStorage {
    /// Empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently persisted session, if any.
    #[must_use]
    pub fn saved(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SessionStorage for MemoryStorage {
    fn load(&self) -> Option<Session> {
        self.saved()
    }

    fn save(&self, session: &Session) -> Result<(), StorageError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn login_round_trip() {
        let api = MockApi::new();
        api.seed_user("ada", "ada@example.com", "secret", Role::User);

        let session = api.login("ada", "secret").await.unwrap();
        assert_eq!(session.user.username, "ada");

        let err = api.login("ada", "wrong").await.unwrap_err();
        assert_eq!(err, StoreFailure::InvalidCredentials);
    }

    #[tokio::test]
    async fn register_admin_requires_secret() {
        let api = MockApi::new();
        let err = api
            .register_admin("root", "root@example.com", "secret", "not-the-key")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreFailure::Forbidden(_)));

        let outcome = api
            .register_admin("root", "root@example.com", "secret", api.admin_secret())
            .await
            .unwrap();
        assert_eq!(outcome.user.role, Role::Admin);
        assert!(outcome.token.is_some());
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let api = MockApi::new();
        api.seed_user("ada", "ada@example.com", "secret", Role::User);

        let err = api
            .register_user("ada", "other@example.com", "secret")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreFailure::DuplicateIdentity(_)));
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let api = MockApi::new();
        api.fail_next(StoreFailure::Network("connection reset".to_string()));

        assert!(api.list_events().await.is_err());
        assert!(api.list_events().await.is_ok());
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test]
    async fn booking_conflicts_are_server_checked() {
        let api = MockApi::new();
        api.seed_user("ada", "ada@example.com", "secret", Role::User);
        api.seed_event(Event {
            id: EventId::new("e1"),
            name: "RustFest".to_string(),
            description: String::new(),
            date: Utc::now(),
            venue: "Hall A".to_string(),
            price: 10.0,
            category: crate::types::EventCategory::Professional,
            image: None,
        });
        let session = api.issue_session("ada");

        api.create_booking(&session.token, &EventId::new("e1"), 1)
            .await
            .unwrap();
        let err = api
            .create_booking(&session.token, &EventId::new("e1"), 1)
            .await
            .unwrap_err();
        assert_eq!(err, StoreFailure::DuplicateBooking);
    }
}
