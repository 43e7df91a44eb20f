//! # BookSphere Runtime
//!
//! The `Store` runtime that coordinates reducer execution and effect handling
//! for the BookSphere client stores.
//!
//! ## Core components
//!
//! - **Store**: owns one store's state, serializes reducer runs, and executes
//!   the effects a reducer returns
//! - **Action feedback loop**: an `Effect::Future` that resolves to an action
//!   sends that action back through the store, so an API settlement becomes
//!   the next state transition
//! - **Action broadcast**: every effect-produced action is also broadcast to
//!   observers, which is how callers wait for a settlement and how the app
//!   layer mirrors session transitions into the other stores
//!
//! ## Concurrency model
//!
//! The reducer runs while holding a write lock, so state transitions are
//! serialized; effects run in spawned tasks and are never queued or
//! cancelled. Overlapping operations on one store race, and the last
//! settlement to resolve wins in updating state (last-write-wins, not
//! last-issued-wins).
//!
//! ## Example
//!
//! ```ignore
//! use booksphere_runtime::Store;
//!
//! let store = Store::new(initial_state, reducer, environment);
//!
//! store.send(Action::Fetch).await?;
//! let count = store.state(|s| s.items.len()).await;
//! ```

use booksphere_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations.
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete.
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action.
        ///
        /// Returned by `send_and_wait_for` when the timeout expires before
        /// an action matching the predicate is broadcast.
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed, typically during shutdown.
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Decrements a shared counter on drop.
///
/// Moved into every spawned effect task so the pending-effect count stays
/// accurate even when the task's future panics or is dropped early.
struct CounterGuard(Arc<AtomicUsize>);

impl Drop for CounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The store runtime: state + reducer + environment + effect execution.
///
/// One `Store` is constructed per domain store (session, events, bookings)
/// at application start and shared by reference from there on; there is no
/// ambient global lookup.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: R,
    environment: E,
    shutdown: Arc<AtomicBool>,
    pending_effects: Arc<AtomicUsize>,
    /// Broadcast of actions produced by effects.
    ///
    /// Settlement actions (the results of API calls) all arrive through
    /// effects, so subscribing here observes every asynchronous transition.
    action_broadcast: broadcast::Sender<A>,
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: self.reducer.clone(),
            environment: self.environment.clone(),
            shutdown: Arc::clone(&self.shutdown),
            pending_effects: Arc::clone(&self.pending_effects),
            action_broadcast: self.action_broadcast.clone(),
        }
    }
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + Clone + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a new store with initial state, reducer, and environment.
    ///
    /// The action broadcast channel buffers 16 actions; use
    /// [`Store::with_broadcast_capacity`] if observers may lag.
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
    }

    /// Create a new store with a custom action broadcast capacity.
    #[must_use]
    pub fn with_broadcast_capacity(
        initial_state: S,
        reducer: R,
        environment: E,
        capacity: usize,
    ) -> Self {
        let (action_broadcast, _) = broadcast::channel(capacity);

        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer,
            environment,
            shutdown: Arc::new(AtomicBool::new(false)),
            pending_effects: Arc::new(AtomicUsize::new(0)),
            action_broadcast,
        }
    }

    /// Send an action to the store.
    ///
    /// 1. Acquires the write lock on state
    /// 2. Runs the reducer with (state, action, environment)
    /// 3. Spawns execution of the returned effects
    ///
    /// Returns once effect execution has *started*, not completed. Multiple
    /// concurrent `send` calls serialize at the reducer, but their effects
    /// may settle in any order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting
    /// down.
    #[tracing::instrument(skip(self, action), name = "store_send")]
    pub async fn send(&self, action: A) -> Result<(), StoreError> {
        if self.shutdown.load(Ordering::Acquire) {
            tracing::warn!("rejected action: store is shutting down");
            return Err(StoreError::ShutdownInProgress);
        }

        let effects = {
            let mut state = self.state.write().await;
            let effects = self.reducer.reduce(&mut state, action, &self.environment);
            tracing::trace!(count = effects.len(), "reducer returned effects");
            effects
        };

        for effect in effects {
            self.execute_effect(effect);
        }

        Ok(())
    }

    /// Send an action and wait for a matching settlement action.
    ///
    /// Subscribes to the action broadcast *before* sending (avoiding the
    /// race where the settlement lands first), then returns the first
    /// effect-produced action matching the predicate.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`] if no matching action arrives in time
    /// - [`StoreError::ChannelClosed`] if the broadcast channel closes
    /// - [`StoreError::ShutdownInProgress`] if the store is shutting down
    pub async fn send_and_wait_for<F>(
        &self,
        action: A,
        predicate: F,
        timeout: Duration,
    ) -> Result<A, StoreError>
    where
        F: Fn(&A) -> bool,
    {
        let mut rx = self.action_broadcast.subscribe();

        self.send(action).await?;

        tokio::time::timeout(timeout, async {
            loop {
                match rx.recv().await {
                    Ok(action) if predicate(&action) => return Ok(action),
                    Ok(_) => {},
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Slow observer; if the settlement was among the
                        // dropped actions the timeout catches it.
                        tracing::warn!(skipped, "action observer lagged");
                    },
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)?
    }

    /// Read current state via a closure so the read lock is released
    /// promptly.
    ///
    /// ```ignore
    /// let event_count = store.state(|s| s.events.len()).await;
    /// ```
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&state)
    }

    /// Subscribe to all actions produced by this store's effects.
    #[must_use]
    pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
        self.action_broadcast.subscribe()
    }

    /// Number of effects currently in flight.
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.pending_effects.load(Ordering::Acquire)
    }

    /// Initiate graceful shutdown.
    ///
    /// Sets the shutdown flag (rejecting new actions), then waits for
    /// in-flight effects to drain.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
    /// when the timeout elapses.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
        tracing::info!("initiating graceful shutdown");
        self.shutdown.store(true, Ordering::Release);

        let start = std::time::Instant::now();
        let poll_interval = Duration::from_millis(50);

        loop {
            let pending = self.pending_effects.load(Ordering::Acquire);

            if pending == 0 {
                tracing::info!("all effects completed, shutdown successful");
                return Ok(());
            }

            if start.elapsed() >= timeout {
                tracing::error!(pending, "shutdown timed out");
                return Err(StoreError::ShutdownTimeout(pending));
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Execute a single effect, spawning async work onto the runtime.
    fn execute_effect(&self, effect: Effect<A>) {
        match effect {
            Effect::None => {
                tracing::trace!("executing Effect::None (no-op)");
            },
            Effect::Parallel(effects) => {
                tracing::trace!(count = effects.len(), "executing Effect::Parallel");
                for effect in effects {
                    self.execute_effect(effect);
                }
            },
            Effect::Future(fut) => {
                tracing::trace!("executing Effect::Future");
                self.pending_effects.fetch_add(1, Ordering::SeqCst);
                let pending_guard = CounterGuard(Arc::clone(&self.pending_effects));

                let store = self.clone();
                tokio::spawn(async move {
                    let _pending_guard = pending_guard;

                    if let Some(action) = fut.await {
                        tracing::trace!("effect produced an action, feeding back");

                        // Apply the settlement before broadcasting it, so an
                        // observer woken by the broadcast reads post-settlement
                        // state.
                        let _ = store.send(action.clone()).await;
                        let _ = store.action_broadcast.send(action);
                    } else {
                        tracing::trace!("effect completed with no action");
                    }
                });
            },
        }
    }
}
