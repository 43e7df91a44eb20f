//! # BookSphere Testing
//!
//! Testing utilities for the BookSphere client stores:
//!
//! - [`ReducerTest`]: a Given/When/Then harness for exercising reducers as
//!   pure functions, without a runtime
//! - [`reducer_test::assertions`]: helpers for asserting on returned effects
//! - [`mocks::FixedClock`]: deterministic time for partition tests
//!
//! Domain-specific mocks (the in-memory API and session storage) live in the
//! client crate next to the types they fake.


pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

/// Install a test-friendly `tracing` subscriber, honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Mock implementations of the core environment traits.
pub mod mocks {
    use booksphere_core::environment::Clock;
    use chrono::{DateTime, Utc};

    /// Fixed clock for deterministic tests: always returns the same time.
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock pinned to the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Default fixed clock for tests (2025-06-01 12:00:00 UTC).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}
