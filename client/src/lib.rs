//! # BookSphere Client
//!
//! Reducer-driven client-side state for the BookSphere event discovery and
//! booking product. The client holds no business data of record: every
//! durable fact lives behind the REST API, and this crate manages the local
//! view of it — who is logged in, the event catalog, and the caller's
//! bookings.
//!
//! ## Architecture
//!
//! Three stores, one per domain, each a `Store` from `booksphere-runtime`
//! driving a pure reducer:
//!
//! - [`session::SessionReducer`] — authentication, registration, logout,
//!   and durable session persistence
//! - [`events::EventsReducer`] — the catalog cache plus admin-only
//!   mutations
//! - [`bookings::BookingReducer`] — the caller's bookings with derived
//!   queries (`has_booked`, upcoming/past partition)
//!
//! Commands that would obviously fail are rejected locally with no network
//! call; everything else settles asynchronously through [`api::RestApi`]
//! effects. [`app::App`] assembles the stores, mirrors session transitions
//! between them, and exposes request/response-shaped methods.
//!
//! ## Quick start
//!
//! ```ignore
//! use booksphere_client::{app::App, config::ClientConfig};
//!
//! let app = App::new(&ClientConfig::from_env())?;
//! app.login("ada", "secret").await?;
//! let events = app.fetch_events().await?;
//! app.book(events[0].id.clone(), 2).await?;
//! ```

pub mod api;
pub mod app;
pub mod bookings;
pub mod config;
pub mod error;
pub mod events;
pub mod mocks;
pub mod session;
pub mod storage;
pub mod types;

pub use api::{HttpApi, RestApi};
pub use app::App;
pub use config::ClientConfig;
pub use error::StoreFailure;
pub use storage::{FileStorage, SessionStorage};
pub use types::{
    Booking, BookingId, Event, EventCategory, EventId, EventPatch, NewEvent, Role, Session, Token,
    User, UserId,
};
