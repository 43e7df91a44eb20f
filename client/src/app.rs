//! Application wiring: the three domain stores behind one facade.
//!
//! `App` owns the session, event, and booking stores, mirrors session
//! transitions into the other two, and exposes request/response-shaped
//! methods that send a command and wait for its settlement. Callers that
//! want raw store access (custom observers, optimistic UIs) can reach the
//! stores directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use booksphere_core::environment::{Clock, SystemClock};
use booksphere_core::{DateTime, Utc};
use booksphere_runtime::{Store, StoreError};
use tokio::sync::broadcast;

use crate::api::{HttpApi, RestApi};
use crate::bookings::{BookingAction, BookingEnvironment, BookingReducer, BookingState};
use crate::config::ClientConfig;
use crate::error::StoreFailure;
use crate::events::{EventsAction, EventsEnvironment, EventsReducer, EventsState};
use crate::session::{SessionAction, SessionEnvironment, SessionReducer, SessionState};
use crate::storage::{FileStorage, SessionStorage};
use crate::types::{Booking, BookingId, Event, EventId, EventPatch, NewEvent, Session};

/// The session store, fully typed.
pub type SessionStore = Store<SessionState, SessionAction, SessionEnvironment, SessionReducer>;
/// The event store, fully typed.
pub type EventsStore = Store<EventsState, EventsAction, EventsEnvironment, EventsReducer>;
/// The booking store, fully typed.
pub type BookingStore = Store<BookingState, BookingAction, BookingEnvironment, BookingReducer>;

/// How much longer than a single request we wait for a settlement. Covers
/// reducer scheduling and the feedback hop on top of the network call.
const SETTLE_MARGIN: Duration = Duration::from_secs(5);

/// The assembled client.
pub struct App {
    session: SessionStore,
    events: EventsStore,
    bookings: BookingStore,
    clock: Arc<dyn Clock>,
    settle_timeout: Duration,
}

impl App {
    /// Build the production client from configuration.
    ///
    /// Restores any persisted session before the first command runs, so a
    /// previously logged-in user starts authenticated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFailure::Network`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, StoreFailure> {
        let api: Arc<dyn RestApi> = Arc::new(HttpApi::new(config)?);
        let storage: Arc<dyn SessionStorage> =
            Arc::new(FileStorage::new(config.session_file.clone()));
        Ok(Self::with_dependencies(
            api,
            storage,
            Arc::new(SystemClock),
            config.request_timeout.saturating_add(SETTLE_MARGIN),
        ))
    }

    /// Build the client from explicit dependencies. Tests inject `MockApi`,
    /// `MemoryStorage`, and a fixed clock here.
    ///
    /// Must run inside a Tokio runtime: restoring a persisted session
    /// schedules the initial booking fetch.
    #[must_use]
    pub fn with_dependencies(
        api: Arc<dyn RestApi>,
        storage: Arc<dyn SessionStorage>,
        clock: Arc<dyn Clock>,
        settle_timeout: Duration,
    ) -> Self {
        // Synchronous restore: a corrupt session file decodes to None and
        // is purged by the storage layer.
        let restored = storage.load();
        let restored_authenticated = restored.is_some();

        let session = Store::new(
            SessionState::restored(restored.clone()),
            SessionReducer::new(),
            SessionEnvironment::new(Arc::clone(&api), storage),
        );
        let events = Store::new(
            EventsState {
                session: restored.clone(),
                ..EventsState::new()
            },
            EventsReducer::new(),
            EventsEnvironment::new(Arc::clone(&api)),
        );
        let bookings = Store::new(
            BookingState {
                session: restored,
                ..BookingState::new()
            },
            BookingReducer::new(),
            BookingEnvironment::new(api),
        );

        // A restored session counts as a transition to authenticated, so it
        // warms the booking cache exactly like a fresh login does.
        if restored_authenticated {
            let bookings = bookings.clone();
            tokio::spawn(async move {
                if let Err(e) = bookings.send(BookingAction::FetchBookings).await {
                    tracing::warn!(error = %e, "booking store rejected fetch after session restore");
                }
            });
        }

        Self {
            session,
            events,
            bookings,
            clock,
            settle_timeout,
        }
    }

    // ========== Store access ==========

    /// The session store.
    #[must_use]
    pub fn session_store(&self) -> &SessionStore {
        &self.session
    }

    /// The event store.
    #[must_use]
    pub fn events_store(&self) -> &EventsStore {
        &self.events
    }

    /// The booking store.
    #[must_use]
    pub fn bookings_store(&self) -> &BookingStore {
        &self.bookings
    }

    // ========== Session ==========

    /// The current session, if authenticated.
    pub async fn current_session(&self) -> Option<Session> {
        self.session.state(|s| s.session.clone()).await
    }

    /// Log in and wait for the outcome.
    ///
    /// On success the session snapshot is mirrored into the event and
    /// booking stores and a booking fetch is kicked off in the background.
    ///
    /// # Errors
    ///
    /// [`StoreFailure::Validation`] for locally rejected credentials,
    /// [`StoreFailure::InvalidCredentials`] when the server rejects them,
    /// or any transport-level failure.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, StoreFailure> {
        let settled = self
            .settle_session(SessionAction::Login {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;

        match settled {
            SessionAction::LoginSucceeded { session } => {
                self.on_authenticated(session.clone()).await;
                Ok(session)
            },
            SessionAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Register an account and wait for the outcome.
    ///
    /// A `privilege_key` routes to admin registration. Returns the session
    /// when the server logs the account straight in, `None` when a
    /// follow-up [`App::login`] is expected.
    ///
    /// # Errors
    ///
    /// [`StoreFailure::Validation`] for locally rejected input,
    /// [`StoreFailure::DuplicateIdentity`] when the identity is taken, or
    /// any transport-level failure.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        privilege_key: Option<&str>,
    ) -> Result<Option<Session>, StoreFailure> {
        let settled = self
            .settle_session(SessionAction::Register {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                privilege_key: privilege_key.map(str::to_string),
            })
            .await?;

        match settled {
            SessionAction::RegisterSucceeded { session } => {
                if let Some(session) = session.clone() {
                    self.on_authenticated(session).await;
                }
                Ok(session)
            },
            SessionAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Log out. Local state drops immediately; the persisted session is
    /// cleared in the background.
    ///
    /// # Errors
    ///
    /// Fails only if a store rejects the command during shutdown.
    pub async fn logout(&self) -> Result<(), StoreFailure> {
        self.session
            .send(SessionAction::Logout)
            .await
            .map_err(runtime_failure)?;
        self.propagate_session(None).await;
        Ok(())
    }

    // ========== Events ==========

    /// Reload the catalog and return it.
    ///
    /// # Errors
    ///
    /// Any transport-level failure from the fetch.
    pub async fn fetch_events(&self) -> Result<Vec<Event>, StoreFailure> {
        let settled = self
            .settle_events(EventsAction::FetchEvents, |a| {
                matches!(
                    a,
                    EventsAction::EventsLoaded { .. } | EventsAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            EventsAction::EventsLoaded { events } => Ok(events),
            EventsAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Look up a cached event. Never fetches.
    pub async fn event_by_id(&self, id: &EventId) -> Option<Event> {
        self.events.state(|s| s.get_by_id(id).cloned()).await
    }

    /// Create an event (admin-only) and return the server-assigned entity.
    ///
    /// # Errors
    ///
    /// [`StoreFailure::Forbidden`] when not an admin (rejected before any
    /// network call), [`StoreFailure::Validation`] for bad input, or any
    /// transport-level failure.
    pub async fn create_event(&self, event: NewEvent) -> Result<Event, StoreFailure> {
        let settled = self
            .settle_events(EventsAction::CreateEvent { event }, |a| {
                matches!(
                    a,
                    EventsAction::EventCreated { .. } | EventsAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            EventsAction::EventCreated { event } => Ok(event),
            EventsAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Update an event (admin-only) and return the authoritative entity.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`App::create_event`], plus
    /// [`StoreFailure::NotFound`] for an unknown id.
    pub async fn update_event(
        &self,
        id: EventId,
        patch: EventPatch,
    ) -> Result<Event, StoreFailure> {
        let settled = self
            .settle_events(EventsAction::UpdateEvent { id, patch }, |a| {
                matches!(
                    a,
                    EventsAction::EventUpdated { .. } | EventsAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            EventsAction::EventUpdated { event } => Ok(event),
            EventsAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Delete an event (admin-only).
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`App::update_event`].
    pub async fn delete_event(&self, id: EventId) -> Result<(), StoreFailure> {
        let settled = self
            .settle_events(EventsAction::DeleteEvent { id }, |a| {
                matches!(
                    a,
                    EventsAction::EventDeleted { .. } | EventsAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            EventsAction::EventDeleted { .. } => Ok(()),
            EventsAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    // ========== Bookings ==========

    /// Reload the caller's bookings and return them.
    ///
    /// # Errors
    ///
    /// [`StoreFailure::Unauthenticated`] without a session, or any
    /// transport-level failure.
    pub async fn fetch_bookings(&self) -> Result<Vec<Booking>, StoreFailure> {
        let settled = self
            .settle_bookings(BookingAction::FetchBookings, |a| {
                matches!(
                    a,
                    BookingAction::BookingsLoaded { .. } | BookingAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            BookingAction::BookingsLoaded { bookings } => Ok(bookings),
            BookingAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Book an event for the current user.
    ///
    /// # Errors
    ///
    /// [`StoreFailure::Unauthenticated`], [`StoreFailure::Validation`] for
    /// a zero quantity, [`StoreFailure::DuplicateBooking`] (locally when
    /// cached, otherwise from the server), or any transport-level failure.
    pub async fn book(&self, event_id: EventId, quantity: u32) -> Result<Booking, StoreFailure> {
        let settled = self
            .settle_bookings(BookingAction::CreateBooking { event_id, quantity }, |a| {
                matches!(
                    a,
                    BookingAction::BookingCreated { .. } | BookingAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            BookingAction::BookingCreated { booking } => Ok(booking),
            BookingAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Cancel a booking (owner or admin).
    ///
    /// # Errors
    ///
    /// [`StoreFailure::NotFound`] for an unknown booking,
    /// [`StoreFailure::Forbidden`] when neither owner nor admin, or any
    /// transport-level failure.
    pub async fn cancel(&self, booking_id: BookingId) -> Result<(), StoreFailure> {
        let settled = self
            .settle_bookings(BookingAction::CancelBooking { booking_id }, |a| {
                matches!(
                    a,
                    BookingAction::BookingCancelled { .. } | BookingAction::RequestFailed { .. }
                )
            })
            .await?;

        match settled {
            BookingAction::BookingCancelled { .. } => Ok(()),
            BookingAction::RequestFailed { failure } => Err(failure),
            _ => Err(unexpected_settlement()),
        }
    }

    /// Whether the current user has booked the given event (cache only).
    pub async fn has_booked(&self, event_id: &EventId) -> bool {
        self.bookings.state(|s| s.has_booked(event_id)).await
    }

    /// The current user's bookings (cache only).
    pub async fn my_bookings(&self) -> Vec<Booking> {
        self.bookings
            .state(|s| s.list_mine().into_iter().cloned().collect())
            .await
    }

    /// The current user's bookings split into upcoming and past, resolving
    /// event dates against the event store's cache. A booking whose event is
    /// not cached appears in neither half.
    pub async fn upcoming_and_past(&self) -> (Vec<Booking>, Vec<Booking>) {
        let dates: HashMap<EventId, DateTime<Utc>> = self
            .events
            .state(|s| {
                s.events
                    .iter()
                    .map(|e| (e.id.clone(), e.date))
                    .collect()
            })
            .await;

        let now = self.clock.now();
        self.bookings
            .state(|s| {
                let (upcoming, past) = s.partition(now, |id| dates.get(id).copied());
                (
                    upcoming.into_iter().cloned().collect(),
                    past.into_iter().cloned().collect(),
                )
            })
            .await
    }

    // ========== Lifecycle ==========

    /// Gracefully shut down all three stores, draining in-flight effects.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError::ShutdownTimeout`] encountered.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        self.session.shutdown(timeout).await?;
        self.events.shutdown(timeout).await?;
        self.bookings.shutdown(timeout).await?;
        Ok(())
    }

    // ========== Wiring internals ==========

    /// Mirror a session transition into the event and booking stores.
    async fn propagate_session(&self, session: Option<Session>) {
        if let Err(e) = self
            .events
            .send(EventsAction::SessionChanged {
                session: session.clone(),
            })
            .await
        {
            tracing::warn!(error = %e, "event store rejected session update");
        }
        if let Err(e) = self
            .bookings
            .send(BookingAction::SessionChanged { session })
            .await
        {
            tracing::warn!(error = %e, "booking store rejected session update");
        }
    }

    async fn on_authenticated(&self, session: Session) {
        self.propagate_session(Some(session)).await;
        // Warm the booking cache in the background; failures surface through
        // the booking store's error slot.
        if let Err(e) = self.bookings.send(BookingAction::FetchBookings).await {
            tracing::warn!(error = %e, "booking store rejected fetch after login");
        }
    }

    async fn settle_session(&self, action: SessionAction) -> Result<SessionAction, StoreFailure> {
        let mut rx = self.session.subscribe_actions();
        self.session.send(action).await.map_err(runtime_failure)?;

        // A local guard rejection applies synchronously, issues no effect,
        // and therefore never settles.
        let rejected = self
            .session
            .state(|s| if s.loading { None } else { s.error.clone() })
            .await;
        if let Some(failure) = rejected {
            return Err(failure);
        }

        await_settlement(&mut rx, self.settle_timeout, |a| {
            matches!(
                a,
                SessionAction::LoginSucceeded { .. }
                    | SessionAction::RegisterSucceeded { .. }
                    | SessionAction::RequestFailed { .. }
            )
        })
        .await
    }

    async fn settle_events<P>(
        &self,
        action: EventsAction,
        is_settlement: P,
    ) -> Result<EventsAction, StoreFailure>
    where
        P: Fn(&EventsAction) -> bool,
    {
        let mut rx = self.events.subscribe_actions();
        self.events.send(action).await.map_err(runtime_failure)?;

        let rejected = self
            .events
            .state(|s| if s.loading { None } else { s.error.clone() })
            .await;
        if let Some(failure) = rejected {
            return Err(failure);
        }

        await_settlement(&mut rx, self.settle_timeout, is_settlement).await
    }

    async fn settle_bookings<P>(
        &self,
        action: BookingAction,
        is_settlement: P,
    ) -> Result<BookingAction, StoreFailure>
    where
        P: Fn(&BookingAction) -> bool,
    {
        let mut rx = self.bookings.subscribe_actions();
        self.bookings.send(action).await.map_err(runtime_failure)?;

        let rejected = self
            .bookings
            .state(|s| if s.loading { None } else { s.error.clone() })
            .await;
        if let Some(failure) = rejected {
            return Err(failure);
        }

        await_settlement(&mut rx, self.settle_timeout, is_settlement).await
    }
}

/// Wait on an already-subscribed receiver for the first matching settlement.
///
/// Subscribing happens before the command is sent, so a settlement that
/// lands quickly is never missed.
async fn await_settlement<A, P>(
    rx: &mut broadcast::Receiver<A>,
    timeout: Duration,
    matches: P,
) -> Result<A, StoreFailure>
where
    A: Clone,
    P: Fn(&A) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(action) if matches(&action) => return Ok(action),
                Ok(_) => {},
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "settlement observer lagged");
                },
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(StoreFailure::Internal(
                        "store action channel closed".to_string(),
                    ));
                },
            }
        }
    })
    .await
    .map_err(|_| StoreFailure::Internal("timed out waiting for settlement".to_string()))?
}

fn runtime_failure(error: StoreError) -> StoreFailure {
    StoreFailure::Internal(error.to_string())
}

fn unexpected_settlement() -> StoreFailure {
    StoreFailure::Internal("unexpected settlement action".to_string())
}
