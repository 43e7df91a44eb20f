//! # BookSphere Core
//!
//! Core traits and types for the BookSphere client architecture.
//!
//! The client keeps all domain state (session, event catalog, bookings) in
//! reducer-driven stores. This crate provides the abstractions those stores
//! are built from:
//!
//! - **State**: owned, `Clone`-able domain state for one store
//! - **Action**: a tagged union of commands (user intent) and settlements
//!   (what the external API answered)
//! - **Reducer**: pure function `(State, Action, Environment) → Effects`
//! - **Effect**: a description of a side effect, executed by the runtime
//! - **Environment**: injected dependencies (API surface, clock, storage)
//!
//! Reducers never perform I/O. They validate, mutate state in place, and
//! return effect descriptions; the `Store` in `booksphere-runtime` executes
//! those effects and feeds any produced actions back through the reducer.

// Re-export commonly used types so domain crates pull them from one place.
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
pub use smallvec::{SmallVec, smallvec};

/// The reducer abstraction: all state transitions for a store go through one
/// pure function.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Number of inline effect slots; reducers rarely return more than one
    /// or two effects, so the vector almost never spills to the heap.
    pub const INLINE_EFFECTS: usize = 4;

    /// Effects returned from a single reducer invocation.
    pub type Effects<A> = SmallVec<[Effect<A>; INLINE_EFFECTS]>;

    /// The Reducer trait - core abstraction for store business logic.
    ///
    /// A reducer is the single mutation point for its state: it validates the
    /// incoming action, updates state in place, and returns descriptions of
    /// any side effects to run. It must not block or perform I/O itself.
    ///
    /// # Example
    ///
    /// ```ignore
    /// impl Reducer for CatalogReducer {
    ///     type State = CatalogState;
    ///     type Action = CatalogAction;
    ///     type Environment = CatalogEnvironment;
    ///
    ///     fn reduce(
    ///         &self,
    ///         state: &mut CatalogState,
    ///         action: CatalogAction,
    ///         env: &CatalogEnvironment,
    ///     ) -> Effects<CatalogAction> {
    ///         match action {
    ///             CatalogAction::Fetch => {
    ///                 state.loading = true;
    ///                 smallvec![Effect::Future(/* GET /events */)]
    ///             }
    ///             // ...
    ///         }
    ///     }
    /// }
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects.
        ///
        /// - `state`: mutable reference to the current state
        /// - `action`: the action to process
        /// - `env`: injected dependencies
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action>;
    }
}

/// Side effect descriptions.
///
/// Effects are values, not execution: a reducer returns them and the store
/// runtime interprets them. An async effect resolves to an optional action
/// that is fed back into the reducer - this is how a network call's
/// settlement (success or failure) becomes the next state transition.
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Boxed future an effect resolves to.
    pub type EffectFuture<Action> = Pin<Box<dyn Future<Output = Option<Action>> + Send>>;

    /// A side effect to be executed by the store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects concurrently
        Parallel(Vec<Effect<Action>>),

        /// Arbitrary async computation.
        ///
        /// Resolves to `Option<Action>`; if `Some`, the action is sent back
        /// through the store. Every API call in the client is one of these.
        Future(EffectFuture<Action>),
    }

    // Manual Debug implementation since the boxed future has none.
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run concurrently
        #[must_use]
        pub fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Wrap an async computation as an effect
        pub fn future<F>(fut: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Future(Box::pin(fut))
        }
    }
}

/// Dependency injection traits shared by every store.
///
/// All external collaborators are abstracted behind traits and injected via
/// each store's Environment type, so reducers stay deterministic under test.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts wall-clock time.
    ///
    /// The booking store partitions bookings into upcoming/past by comparing
    /// event dates against `now()`; tests inject a fixed clock to make that
    /// classification deterministic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
