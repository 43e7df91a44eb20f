//! Session store: authentication state and its transitions.
//!
//! The reducer validates commands locally (cheap guards that need no
//! network), then issues API effects. The effect's outcome comes back as a
//! settlement action (`LoginSucceeded`, `RegisterSucceeded`,
//! `RequestFailed`) which is the only way asynchronous results reach state.

use std::fmt;
use std::sync::Arc;

use booksphere_core::SmallVec;
use booksphere_core::effect::Effect;
use booksphere_core::reducer::{Effects, Reducer};

use crate::api::RestApi;
use crate::error::StoreFailure;
use crate::storage::SessionStorage;
use crate::types::Session;

/// Authentication state for the whole client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    /// The active session, `None` when logged out
    pub session: Option<Session>,
    /// Whether a login or registration request is in flight
    pub loading: bool,
    /// The most recent failure, cleared on the next command
    pub error: Option<StoreFailure>,
}

impl SessionState {
    /// Fresh, logged-out state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// State seeded from persisted storage at startup.
    #[must_use]
    pub fn restored(session: Option<Session>) -> Self {
        Self {
            session,
            loading: false,
            error: None,
        }
    }

    /// Whether a user is currently authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the current user is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_admin)
    }
}

/// Commands and settlements for the session store.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionAction {
    // ========== Commands ==========
    /// Authenticate with the API
    Login {
        /// Account username
        username: String,
        /// Account password
        password: String,
    },

    /// Create an account. A privilege key routes the request to the admin
    /// registration endpoint; the key itself is validated server-side.
    Register {
        /// Desired username
        username: String,
        /// Contact email
        email: String,
        /// Account password
        password: String,
        /// Admin privilege key, `None` for a regular account
        privilege_key: Option<String>,
    },

    /// Drop the session locally and purge persisted credentials
    Logout,

    // ========== Settlements ==========
    /// Login round-trip succeeded
    LoginSucceeded {
        /// The authenticated session
        session: Session,
    },

    /// Registration round-trip succeeded. `session` is `Some` when the
    /// server issued a token at registration, `None` when it expects a
    /// follow-up login.
    RegisterSucceeded {
        /// Session, when the server logs the account straight in
        session: Option<Session>,
    },

    /// Login or registration round-trip failed
    RequestFailed {
        /// What went wrong
        failure: StoreFailure,
    },
}

// Passwords and privilege keys must never reach logs.
impl fmt::Debug for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Self::Register {
                username,
                email,
                privilege_key,
                ..
            } => f
                .debug_struct("Register")
                .field("username", username)
                .field("email", email)
                .field("password", &"***")
                .field("privilege_key", &privilege_key.as_ref().map(|_| "***"))
                .finish(),
            Self::Logout => write!(f, "Logout"),
            Self::LoginSucceeded { session } => f
                .debug_struct("LoginSucceeded")
                .field("session", session)
                .finish(),
            Self::RegisterSucceeded { session } => f
                .debug_struct("RegisterSucceeded")
                .field("session", session)
                .finish(),
            Self::RequestFailed { failure } => f
                .debug_struct("RequestFailed")
                .field("failure", failure)
                .finish(),
        }
    }
}

/// Injected dependencies for the session reducer.
#[derive(Clone)]
pub struct SessionEnvironment {
    /// The external REST API
    pub api: Arc<dyn RestApi>,
    /// Durable session storage
    pub storage: Arc<dyn SessionStorage>,
}

impl SessionEnvironment {
    /// Creates a new `SessionEnvironment`
    #[must_use]
    pub fn new(api: Arc<dyn RestApi>, storage: Arc<dyn SessionStorage>) -> Self {
        Self { api, storage }
    }
}

/// Reducer for the session store
#[derive(Clone, Debug, Default)]
pub struct SessionReducer;

impl SessionReducer {
    /// Creates a new `SessionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_login(username: &str, password: &str) -> Result<(), StoreFailure> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(StoreFailure::Validation(
                "username and password are required".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_register(username: &str, email: &str, password: &str) -> Result<(), StoreFailure> {
        if username.trim().is_empty() {
            return Err(StoreFailure::Validation("username is required".to_string()));
        }
        if !email.contains('@') {
            return Err(StoreFailure::Validation(
                "a valid email address is required".to_string(),
            ));
        }
        if password.chars().count() < 6 {
            return Err(StoreFailure::Validation(
                "password must be at least 6 characters".to_string(),
            ));
        }
        Ok(())
    }

    fn persist(storage: &Arc<dyn SessionStorage>, session: &Session) {
        // A failed save degrades to an in-memory session; the login itself
        // still succeeded.
        if let Err(e) = storage.save(session) {
            tracing::warn!(error = %e, "failed to persist session");
        }
    }
}

impl Reducer for SessionReducer {
    type State = SessionState;
    type Action = SessionAction;
    type Environment = SessionEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Effects<Self::Action> {
        match action {
            // ========== Commands ==========
            SessionAction::Login { username, password } => {
                if let Err(failure) = Self::validate_login(&username, &password) {
                    state.error = Some(failure);
                    return SmallVec::new();
                }

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                let storage = Arc::clone(&env.storage);
                smallvec::smallvec![Effect::future(async move {
                    match api.login(&username, &password).await {
                        Ok(session) => {
                            Self::persist(&storage, &session);
                            Some(SessionAction::LoginSucceeded { session })
                        },
                        Err(failure) => Some(SessionAction::RequestFailed { failure }),
                    }
                })]
            },

            SessionAction::Register {
                username,
                email,
                password,
                privilege_key,
            } => {
                if let Err(failure) = Self::validate_register(&username, &email, &password) {
                    state.error = Some(failure);
                    return SmallVec::new();
                }

                state.loading = true;
                state.error = None;

                let api = Arc::clone(&env.api);
                let storage = Arc::clone(&env.storage);
                smallvec::smallvec![Effect::future(async move {
                    let outcome = match privilege_key {
                        Some(key) => {
                            api.register_admin(&username, &email, &password, &key).await
                        },
                        None => api.register_user(&username, &email, &password).await,
                    };

                    match outcome {
                        Ok(outcome) => {
                            let session = outcome.token.map(|token| Session {
                                token,
                                user: outcome.user,
                            });
                            if let Some(session) = &session {
                                Self::persist(&storage, session);
                            }
                            Some(SessionAction::RegisterSucceeded { session })
                        },
                        Err(failure) => Some(SessionAction::RequestFailed { failure }),
                    }
                })]
            },

            SessionAction::Logout => {
                // Local state drops immediately; storage cleanup is
                // fire-and-forget.
                state.session = None;
                state.loading = false;
                state.error = None;

                let storage = Arc::clone(&env.storage);
                smallvec::smallvec![Effect::future(async move {
                    if let Err(e) = storage.clear() {
                        tracing::warn!(error = %e, "failed to clear persisted session");
                    }
                    None
                })]
            },

            // ========== Settlements ==========
            SessionAction::LoginSucceeded { session } => {
                state.session = Some(session);
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            SessionAction::RegisterSucceeded { session } => {
                state.session = session;
                state.loading = false;
                state.error = None;
                SmallVec::new()
            },

            SessionAction::RequestFailed { failure } => {
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
    use crate::mocks::{MemoryStorage, MockApi};
    use crate::types::{Role, Token, User, UserId};
    use booksphere_testing::{ReducerTest, assertions};

    fn test_env() -> SessionEnvironment {
        SessionEnvironment::new(Arc::new(MockApi::new()), Arc::new(MemoryStorage::new()))
    }

    fn session() -> Session {
        Session {
            token: Token::new("tok-1"),
            user: User {
                id: UserId::new("1"),
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                role: Role::User,
            },
        }
    }

    #[test]
    fn login_with_empty_credentials_fails_locally() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState::new())
            .when_action(SessionAction::Login {
                username: String::new(),
                password: "secret".to_string(),
            })
            .then_state(|state| {
                assert!(!state.loading);
                assert!(matches!(state.error, Some(StoreFailure::Validation(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn login_marks_loading_and_issues_request() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState::new())
            .when_action(SessionAction::Login {
                username: "ada".to_string(),
                password: "secret".to_string(),
            })
            .then_state(|state| {
                assert!(state.loading);
                assert!(state.error.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn register_rejects_short_password() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState::new())
            .when_action(SessionAction::Register {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
                password: "12345".to_string(),
                privilege_key: None,
            })
            .then_state(|state| {
                assert!(matches!(state.error, Some(StoreFailure::Validation(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn register_rejects_email_without_at_sign() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState::new())
            .when_action(SessionAction::Register {
                username: "ada".to_string(),
                email: "not-an-email".to_string(),
                password: "secret".to_string(),
                privilege_key: None,
            })
            .then_state(|state| {
                assert!(matches!(state.error, Some(StoreFailure::Validation(_))));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn logout_drops_session_synchronously() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState::restored(Some(session())))
            .when_action(SessionAction::Logout)
            .then_state(|state| {
                assert!(state.session.is_none());
                assert!(state.error.is_none());
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn login_settlement_installs_session() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState {
                session: None,
                loading: true,
                error: None,
            })
            .when_action(SessionAction::LoginSucceeded { session: session() })
            .then_state(|state| {
                assert!(state.is_authenticated());
                assert!(!state.loading);
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn register_settlement_without_token_stays_logged_out() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState {
                session: None,
                loading: true,
                error: None,
            })
            .when_action(SessionAction::RegisterSucceeded { session: None })
            .then_state(|state| {
                assert!(!state.is_authenticated());
                assert!(!state.loading);
                assert!(state.error.is_none());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn failure_settlement_records_error() {
        ReducerTest::new(SessionReducer::new())
            .with_env(test_env())
            .given_state(SessionState {
                session: None,
                loading: true,
                error: None,
            })
            .when_action(SessionAction::RequestFailed {
                failure: StoreFailure::InvalidCredentials,
            })
            .then_state(|state| {
                assert!(!state.loading);
                assert_eq!(state.error, Some(StoreFailure::InvalidCredentials));
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn action_debug_redacts_password() {
        let action = SessionAction::Login {
            username: "ada".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{action:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
