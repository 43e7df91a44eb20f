//! Event store: the catalog cache and admin mutations.
//!
//! Reads are open to everyone; create/update/delete are admin-only and
//! guarded locally before any network call. The local guard is a UX
//! shortcut, not security: the server re-checks the token on every
//! mutation.

use std::sync::Arc;

use booksphere_core::SmallVec;
use booksphere_core::effect::Effect;
use booksphere_core::reducer::{Effects, Reducer};

use crate::api::RestApi;
use crate::error::StoreFailure;
use crate::types::{Event, EventId, EventPatch, NewEvent, Session, Token};

/// Catalog state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventsState {
    /// Cached catalog, replaced wholesale by each fetch
    pub events: Vec<Event>,
    /// Whether a request is in flight
    pub loading: bool,
    /// The most recent failure, cleared on the next command
    pub error: Option<StoreFailure>,
    /// Snapshot of the authentication state, forwarded by the app wiring
    pub session: Option<Session>,
}

impl EventsState {
    /// Empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure cache lookup; never fetches.
    #[must_use]
    pub fn get_by_id(&self, id: &EventId) -> Option<&Event> {
        self.events.iter().find(|event| &event.id == id)
    }
}

/// Commands and settlements for the event store.
#[derive(Clone, Debug)]
pub enum EventsAction {
    // ========== Commands ==========
    /// Reload the whole catalog from the API
    FetchEvents,

    /// Create an event (admin-only)
    CreateEvent {
        /// The event to create
        event: NewEvent,
    },

    /// Update an event (admin-only)
    UpdateEvent {
        /// Which event to update
        id: EventId,
        /// Fields to change
        patch: EventPatch,
    },

    /// Delete an event (admin-only)
    DeleteEvent {
        /// Which event to delete
        id: EventId,
    },

    /// The session store's state changed; refresh the local snapshot
    SessionChanged {
        /// The new session, `None` on logout
        session: Option<Session>,
    },

    // ========== Settlements ==========
    /// Catalog fetched; replaces the cache wholesale
    EventsLoaded {
        /// The full catalog as the server returned it
        events: Vec<Event>,
    },

    /// Creation settled; the server-assigned entity
    EventCreated {
        /// The created event, id included
        event: Event,
    },

    /// Update settled; the authoritative post-update entity
    EventUpdated {
        /// The updated event
        event: Event,
    },

    /// Deletion settled
    EventDeleted {
        /// The removed event's id
        id: EventId,
    },

    /// A round-trip failed
    RequestFailed {
        /// What went wrong
        failure: StoreFailure,
    },
}

/// Injected dependencies for the event reducer.
#[derive(Clone)]
pub struct EventsEnvironment {
    /// The external REST API
    pub api: Arc<dyn RestApi>,
}

impl EventsEnvironment {
    /// Creates a new `EventsEnvironment`
    #[must_use]
    pub fn new(api: Arc<dyn RestApi>) -> Self {
        Self { api }
    }
}

/// Reducer for the event store
#[derive(Clone, Debug, Default)]
pub struct EventsReducer;

impl EventsReducer {
    /// Creates a new `EventsReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Admin guard for mutations. Returns the bearer token to use.
    fn require_admin(state: &EventsState) -> Result<Token, StoreFailure> {
        match &state.session {
            Some(session) if session.is_admin() => Ok(session.token.clone()),
            _ => Err(StoreFailure::admin_required()),
        }
    }
}

impl Reducer for EventsReducer {
    type State = EventsState;
    type Action = EventsAction;
    type Environment = EventsEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            // ========== Commands ==========
            EventsAction::FetchEvents => {
                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                smallvec::smallvec![Effect::future(async move {
                    match api.list_events().await {
                        Ok(events) => Some(EventsAction::EventsLoaded { events }),
                        Err(failure) => Some(EventsAction::RequestFailed { failure }),
                    }
                })]
            },

            EventsAction::CreateEvent { event } => {
                let token = match Self::require_admin(state) {
                    Ok(token) => token,
                    Err(failure) => {
                        state.error = Some(failure);
                        return SmallVec::new();
                    },
                };
                if let Err(failure) = event.validate() {
                    state.error = Some(failure);
                    return SmallVec::new();
                }

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                smallvec::smallvec![Effect::future(async move {
                    match api.create_event(&token, &event).await {
                        Ok(event) => Some(EventsAction::EventCreated { event }),
                        Err(failure) => Some(EventsAction::RequestFailed { failure }),
                    }
                })]
            },

            EventsAction::UpdateEvent { id, patch } => {
                let token = match Self::require_admin(state) {
                    Ok(token) => token,
                    Err(failure) => {
                        state.error = Some(failure);
                        return SmallVec::new();
                    },
                };
                if let Err(failure) = patch.validate() {
                    state.error = Some(failure);
                    return SmallVec::new();
                }

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                smallvec::smallvec![Effect::future(async move {
                    match api.update_event(&token, &id, &patch).await {
                        Ok(event) => Some(EventsAction::EventUpdated { event }),
                        Err(failure) => Some(EventsAction::RequestFailed { failure }),
                    }
                })]
            },

            EventsAction::DeleteEvent { id } => {
                let token = match Self::require_admin(state) {
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
                    match api.delete_event(&token, &id).await {
                        Ok(()) => Some(EventsAction::EventDeleted { id }),
                        Err(failure) => Some(EventsAction::RequestFailed { failure }),
                    }
                })]
            },

            EventsAction::SessionChanged { session } => {
                state.session = session;
                SmallVec::new()
            },

            // ========== Settlements ==========
            EventsAction::EventsLoaded { events } => {
                // Full replace, never a merge: the server owns the catalog.
                state.events = events;
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            EventsAction::EventCreated { event } => {
                state.events.push(event);
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            EventsAction::EventUpdated { event } => {
                // The cache may be stale; if the entity is unknown, adopt it.
                match state.events.iter_mut().find(|e| e.id == event.id) {
                    Some(slot) => *slot = event,
                    None => state.events.push(event),
                }
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            EventsAction::EventDeleted { id } => {
                state.events.retain(|event| event.id != id);
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            EventsAction::RequestFailed { failure } => {
                state.loading = false;
                state.error = Some(failure);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockApi;
    use crate::types::{EventCategory, Role, User, UserId};
    use booksphere_core::Utc;
    use booksphere_testing::{ReducerTest, assertions};

    fn test_env() -> EventsEnvironment {
        EventsEnvironment::new(Arc::new(MockApi::new()))
    }

    fn session_with_role(role: Role) -> Session {
        Session {
            token: Token::new("tok-1"),
            user: User {
                id: UserId::new("1"),
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                role,
            },
        }
    }

    fn sample_event(id: &str) -> Event {
        Event {
            id: EventId::new(id),
            name: format!("Event {id}"),
            description: String::new(),
            date: Utc::now(),
            venue: "Hall A".to_string(),
            price: 25.0,
            category: EventCategory::Cultural,
            image: None,
        }
    }

    fn new_event() -> NewEvent {
        NewEvent {
            name: "RustFest".to_string(),
            description: "A conference".to_string(),
            date: Utc::now(),
            venue: "Hall B".to_string(),
            price: 50.0,
            category: EventCategory::Professional,
            image: None,
        }
    }

    #[test]
    fn fetch_marks_loading_and_issues_request() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState::new())
            .when_action(EventsAction::FetchEvents)
            .then_state(|state| {
                assert!(state.loading);
                assert!(state.error.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn loaded_settlement_replaces_cache_wholesale() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                events: vec![sample_event("stale")],
                loading: true,
                error: None,
                session: None,
            })
            .when_action(EventsAction::EventsLoaded {
                events: vec![sample_event("a"), sample_event("b")],
            })
            .then_state(|state| {
                assert_eq!(state.events.len(), 2);
                assert!(state.get_by_id(&EventId::new("stale")).is_none());
                assert!(state.get_by_id(&EventId::new("a")).is_some());
                assert!(!state.loading);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn create_without_session_is_rejected_locally() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState::new())
            .when_action(EventsAction::CreateEvent { event: new_event() })
            .then_state(|state| {
                assert!(matches!(state.error, Some(StoreFailure::Forbidden(_))));
                assert!(!state.loading);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn create_as_regular_user_is_rejected_locally() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                session: Some(session_with_role(Role::User)),
                ..EventsState::new()
            })
            .when_action(EventsAction::CreateEvent { event: new_event() })
            .then_state(|state| {
                assert!(matches!(state.error, Some(StoreFailure::Forbidden(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn create_as_admin_issues_request() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                session: Some(session_with_role(Role::Admin)),
                ..EventsState::new()
            })
            .when_action(EventsAction::CreateEvent { event: new_event() })
            .then_state(|state| {
                assert!(state.loading);
                assert!(state.error.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn create_rejects_invalid_payload_before_network() {
        let mut event = new_event();
        event.name = "   ".to_string();

        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                session: Some(session_with_role(Role::Admin)),
                ..EventsState::new()
            })
            .when_action(EventsAction::CreateEvent { event })
            .then_state(|state| {
                assert!(matches!(state.error, Some(StoreFailure::Validation(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn delete_as_admin_issues_request() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                events: vec![sample_event("a")],
                session: Some(session_with_role(Role::Admin)),
                ..EventsState::new()
            })
            .when_action(EventsAction::DeleteEvent {
                id: EventId::new("a"),
            })
            .then_state(|state| assert!(state.loading))
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn deleted_settlement_removes_from_cache() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                events: vec![sample_event("a"), sample_event("b")],
                loading: true,
                error: None,
                session: Some(session_with_role(Role::Admin)),
            })
            .when_action(EventsAction::EventDeleted {
                id: EventId::new("a"),
            })
            .then_state(|state| {
                assert_eq!(state.events.len(), 1);
                assert!(state.get_by_id(&EventId::new("a")).is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn updated_settlement_replaces_matching_entity() {
        let mut updated = sample_event("a");
        updated.name = "Renamed".to_string();

        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                events: vec![sample_event("a")],
                loading: true,
                error: None,
                session: Some(session_with_role(Role::Admin)),
            })
            .when_action(EventsAction::EventUpdated { event: updated })
            .then_state(|state| {
                assert_eq!(state.events.len(), 1);
                assert_eq!(state.events[0].name, "Renamed");
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn session_changed_updates_snapshot_only() {
        ReducerTest::new(EventsReducer::new())
            .with_env(test_env())
            .given_state(EventsState {
                events: vec![sample_event("a")],
                ..EventsState::new()
            })
            .when_action(EventsAction::SessionChanged {
                session: Some(session_with_role(Role::Admin)),
            })
            .then_state(|state| {
                assert!(state.session.is_some());
                assert_eq!(state.events.len(), 1);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }
}
