//! Booking store: the caller's bookings and derived queries.
//!
//! Commands that would obviously fail (no session, duplicate booking,
//! cancelling someone else's booking) are rejected locally with no network
//! call. Everything else settles through the API; the server remains the
//! source of truth for conflicts the cache cannot see.

use std::sync::Arc;

use booksphere_core::{DateTime, SmallVec, Utc};
use booksphere_core::effect::Effect;
use booksphere_core::reducer::{Effects, Reducer};

use crate::api::RestApi;
use crate::error::StoreFailure;
use crate::types::{Booking, BookingId, EventId, Session, Token, UserId};

/// Booking state.
///
/// The cache holds what the server returned for the current caller — the
/// caller's own bookings for a regular user, every booking for an admin.
/// Derived queries always scope to the current user, so a stale cache left
/// over from a previous login yields empty results rather than wrong ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookingState {
    /// Cached bookings as last fetched
    pub bookings: Vec<Booking>,
    /// Whether a request is in flight
    pub loading: bool,
    /// The most recent failure, cleared on the next command
    pub error: Option<StoreFailure>,
    /// Snapshot of the authentication state, forwarded by the app wiring
    pub session: Option<Session>,
}

impl BookingState {
    /// Empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_user(&self) -> Option<&UserId> {
        self.session.as_ref().map(|s| &s.user.id)
    }

    /// Whether the current user has booked the given event.
    ///
    /// Always `false` when unauthenticated.
    #[must_use]
    pub fn has_booked(&self, event_id: &EventId) -> bool {
        let Some(user_id) = self.current_user() else {
            return false;
        };
        self.bookings
            .iter()
            .any(|b| &b.user_id == user_id && &b.event_id == event_id)
    }

    /// Bookings owned by the current user.
    ///
    /// Empty when unauthenticated. For an admin this filters the full
    /// collection down to their own bookings.
    #[must_use]
    pub fn list_mine(&self) -> Vec<&Booking> {
        let Some(user_id) = self.current_user() else {
            return Vec::new();
        };
        self.bookings
            .iter()
            .filter(|b| &b.user_id == user_id)
            .collect()
    }

    /// Split the current user's bookings into upcoming and past by the
    /// referenced event's date. `date >= now` counts as upcoming.
    ///
    /// `resolve` maps an event id to its date (usually a lookup into the
    /// event store's cache). A booking whose event cannot be resolved
    /// appears in neither half.
    #[must_use]
    pub fn partition<F>(&self, now: DateTime<Utc>, resolve: F) -> (Vec<&Booking>, Vec<&Booking>)
    where
        F: Fn(&EventId) -> Option<DateTime<Utc>>,
    {
        let mut upcoming = Vec::new();
        let mut past = Vec::new();
        for booking in self.list_mine() {
            match resolve(&booking.event_id) {
                Some(date) if date >= now => upcoming.push(booking),
                Some(_) => past.push(booking),
                None => {},
            }
        }
        (upcoming, past)
    }
}

/// Commands and settlements for the booking store.
#[derive(Clone, Debug)]
pub enum BookingAction {
    // ========== Commands ==========
    /// Reload bookings from the API (server scopes by caller)
    FetchBookings,

    /// Book an event for the current user
    CreateBooking {
        /// The event to book
        event_id: EventId,
        /// Number of tickets, must be at least 1
        quantity: u32,
    },

    /// Cancel a booking (owner or admin)
    CancelBooking {
        /// The booking to cancel
        booking_id: BookingId,
    },

    /// The session store's state changed; refresh the local snapshot
    SessionChanged {
        /// The new session, `None` on logout
        session: Option<Session>,
    },

    // ========== Settlements ==========
    /// Fetch settled; replaces the cache wholesale
    BookingsLoaded {
        /// The caller-scoped collection
        bookings: Vec<Booking>,
    },

    /// Creation settled; the server-assigned booking
    BookingCreated {
        /// The created booking
        booking: Booking,
    },

    /// Cancellation settled
    BookingCancelled {
        /// The removed booking's id
        id: BookingId,
    },

    /// A round-trip failed
    RequestFailed {
        /// What went wrong
        failure: StoreFailure,
    },
}

/// Injected dependencies for the booking reducer.
#[derive(Clone)]
pub struct BookingEnvironment {
    /// The external REST API
    pub api: Arc<dyn RestApi>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(api: Arc<dyn RestApi>) -> Self {
        Self { api }
    }
}

/// Reducer for the booking store
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_cancel(state: &BookingState, booking_id: &BookingId) -> Result<Token, StoreFailure> {
        let Some(session) = &state.session else {
            return Err(StoreFailure::Unauthenticated);
        };
        let Some(booking) = state.bookings.iter().find(|b| &b.id == booking_id) else {
            return Err(StoreFailure::NotFound(format!(
                "booking {booking_id} not found"
            )));
        };
        if booking.user_id != session.user.id && !session.is_admin() {
            return Err(StoreFailure::Forbidden(
                "you can only cancel your own bookings".to_string(),
            ));
        }
        Ok(session.token.clone())
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            // ========== Commands ==========
            BookingAction::FetchBookings => {
                let Some(session) = &state.session else {
                    state.error = Some(StoreFailure::Unauthenticated);
                    return SmallVec::new();
                };

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                let token = session.token.clone();
                smallvec::smallvec![Effect::future(async move {
                    match api.list_bookings(&token).await {
                        Ok(bookings) => Some(BookingAction::BookingsLoaded { bookings }),
                        Err(failure) => Some(BookingAction::RequestFailed { failure }),
                    }
                })]
            },

            BookingAction::CreateBooking { event_id, quantity } => {
                let Some(session) = &state.session else {
                    state.error = Some(StoreFailure::Unauthenticated);
                    return SmallVec::new();
                };
                if quantity == 0 {
                    state.error = Some(StoreFailure::Validation(
                        "quantity must be at least 1".to_string(),
                    ));
                    return SmallVec::new();
                }
                if state.has_booked(&event_id) {
                    state.error = Some(StoreFailure::DuplicateBooking);
                    return SmallVec::new();
                }

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                let token = session.token.clone();
                smallvec::smallvec![Effect::future(async move {
                    match api.create_booking(&token, &event_id, quantity).await {
                        Ok(booking) => Some(BookingAction::BookingCreated { booking }),
                        Err(failure) => Some(BookingAction::RequestFailed { failure }),
                    }
                })]
            },

            BookingAction::CancelBooking { booking_id } => {
                let token = match Self::validate_cancel(state, &booking_id) {
                    Ok(token) => token,
                    Err(failure) => {
                        state.error = Some(failure);
                        return SmallVec::new();
                    },
                };

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                smallvec::smallvec![Effect::future(async move {
                    match api.cancel_booking(&token, &booking_id).await {
                        Ok(()) => Some(BookingAction::BookingCancelled { id: booking_id }),
                        Err(failure) => Some(BookingAction::RequestFailed { failure }),
                    }
                })]
            },

            BookingAction::SessionChanged { session } => {
                // The cache survives a logout: derived queries scope by the
                // current user, so a missing session already yields nothing.
                state.session = session;
                SmallVec::new()
            },

            // ========== Settlements ==========
            BookingAction::BookingsLoaded { bookings } => {
                state.bookings = bookings;
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            BookingAction::BookingCreated { booking } => {
                state.bookings.push(booking);
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            BookingAction::BookingCancelled { id } => {
                state.bookings.retain(|b| b.id != id);
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            BookingAction::RequestFailed { failure } => {
                state.loading = false;
                state.error = Some(failure);
                SmallVec::new()
            },
        }
    }
}
