//! Domain types shared by the client stores.
//!
//! The canonical schema is the lowercase/enumerated variant; the legacy
//! capitalized field names and free-text categories that older API
//! deployments emit are accepted on decode as aliases and never produced on
//! encode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::StoreFailure;

// ─── Identifiers ───────────────────────────────────────────────────────────

macro_rules! server_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        ///
        /// Assigned by the server; the client never fabricates one for a
        /// persisted entity.
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Wrap a server-assigned identifier
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

server_id! {
    /// Unique identifier for a user
    UserId
}
server_id! {
    /// Unique identifier for an event
    EventId
}
server_id! {
    /// Unique identifier for a booking
    BookingId
}

/// Opaque bearer token carried on every authenticated request.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token(String);

impl Token {
    /// Wrap a server-issued token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token for the Authorization header
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of logs.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Token(***)")
    }
}

// ─── Users and sessions ────────────────────────────────────────────────────

/// Role issued by the server at registration.
///
/// Immutable after issuance; the client never elevates a role locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular attendee
    User,
    /// Can manage the event catalog and see all bookings
    Admin,
}

impl Role {
    /// Whether this role may manage events and others' bookings
    #[must_use]
    pub const fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

/// An authenticated user record as returned by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Server-assigned identifier
    pub id: UserId,
    /// Display name
    #[serde(alias = "name")]
    pub username: String,
    /// Contact email
    pub email: String,
    /// Issued role
    pub role: Role,
}

/// The authenticated identity and bearer credential held by the client.
///
/// Serialized as one document to durable storage; a stored entry missing
/// either half fails decode and is treated as absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token for authenticated requests
    pub token: Token,
    /// The logged-in user
    pub user: User,
}

impl Session {
    /// Whether the session holds the admin role
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.user.role.is_admin()
    }
}

// ─── Events ────────────────────────────────────────────────────────────────

/// Event category (canonical enumerated form).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    /// Parties, reunions, weddings
    Social,
    /// Conferences, workshops
    Professional,
    /// Concerts, art exhibitions
    Cultural,
    /// Marathons, tournaments
    Sports,
}

impl EventCategory {
    /// Map a wire value onto a canonical category.
    ///
    /// Accepts the canonical names case-insensitively plus the free-text
    /// labels the legacy variant used.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "social" | "food" => Some(Self::Social),
            "professional" | "technology" | "business" => Some(Self::Professional),
            "cultural" | "music" | "art" => Some(Self::Cultural),
            "sports" => Some(Self::Sports),
            _ => None,
        }
    }

    /// Human-readable label for category pickers
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Social => "Social Events (Parties, reunions, weddings)",
            Self::Professional => "Professional Events (Conferences, workshops)",
            Self::Cultural => "Cultural Events (Concerts, art exhibitions)",
            Self::Sports => "Sports Events (Marathons, tournaments)",
        }
    }

    /// Fallback image for events without one of their own
    #[must_use]
    pub const fn default_image(self) -> &'static str {
        match self {
            Self::Social => "https://images.pexels.com/photos/2774556/pexels-photo-2774556.jpeg",
            Self::Professional => {
                "https://images.pexels.com/photos/2582937/pexels-photo-2582937.jpeg"
            },
            Self::Cultural => "https://images.pexels.com/photos/1190297/pexels-photo-1190297.jpeg",
            Self::Sports => {
                "https://images.pexels.com/photos/46798/the-ball-stadion-football-the-pitch-46798.jpeg"
            },
        }
    }

    /// Canonical wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Social => "social",
            Self::Professional => "professional",
            Self::Cultural => "cultural",
            Self::Sports => "sports",
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// Lenient decode: an unknown free-text category must not poison the whole
// collection fetch, so it falls back to `social`.
impl<'de> Deserialize<'de> for EventCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&raw).unwrap_or_else(|| {
            tracing::debug!(category = %raw, "unknown event category, defaulting to social");
            Self::Social
        }))
    }
}

/// Accepts both RFC 3339 timestamps and the zone-less form the legacy API
/// emits (`2025-05-15T09:00:00`, interpreted as UTC).
pub(crate) mod datetime_compat {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// A catalog event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Server-assigned identifier
    pub id: EventId,
    /// Event name
    #[serde(alias = "Name")]
    pub name: String,
    /// Long description
    #[serde(alias = "Description")]
    pub description: String,
    /// Canonical category
    pub category: EventCategory,
    /// When the event takes place
    #[serde(alias = "Date", deserialize_with = "datetime_compat::deserialize")]
    pub date: DateTime<Utc>,
    /// Where the event takes place
    #[serde(alias = "Venue")]
    pub venue: String,
    /// Ticket price; zero means free
    #[serde(alias = "Price")]
    pub price: f64,
    /// Image URL; `None` falls back to [`EventCategory::default_image`]
    #[serde(alias = "Image", default)]
    pub image: Option<String>,
}

/// Fields for creating an event (the server assigns the id).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event name
    pub name: String,
    /// Long description
    pub description: String,
    /// Canonical category
    pub category: EventCategory,
    /// When the event takes place
    #[serde(deserialize_with = "datetime_compat::deserialize")]
    pub date: DateTime<Utc>,
    /// Where the event takes place
    pub venue: String,
    /// Ticket price; zero means free
    pub price: f64,
    /// Image URL; `None` falls back to the category default
    #[serde(default)]
    pub image: Option<String>,
}

impl NewEvent {
    /// Local pre-submit validation (the server re-validates).
    ///
    /// # Errors
    ///
    /// Returns [`StoreFailure::Validation`] when a required field is missing
    /// or the price is negative.
    pub fn validate(&self) -> Result<(), StoreFailure> {
        if self.name.trim().is_empty() {
            return Err(StoreFailure::Validation(
                "event name is required".to_string(),
            ));
        }
        if self.venue.trim().is_empty() {
            return Err(StoreFailure::Validation(
                "event venue is required".to_string(),
            ));
        }
        if self.price < 0.0 {
            return Err(StoreFailure::Validation(
                "event price cannot be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial event update; absent fields are left untouched by the server.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    /// New name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<EventCategory>,
    /// New date
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// New venue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    /// New price
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// New image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl EventPatch {
    /// Local pre-submit validation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFailure::Validation`] when a supplied field is invalid.
    pub fn validate(&self) -> Result<(), StoreFailure> {
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(StoreFailure::Validation(
                "event name cannot be empty".to_string(),
            ));
        }
        if self.price.is_some_and(|p| p < 0.0) {
            return Err(StoreFailure::Validation(
                "event price cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply the patch to an event in place (mirrors the server's merge;
    /// used by the in-memory mock API).
    pub fn apply(&self, event: &mut Event) {
        if let Some(name) = &self.name {
            event.name = name.clone();
        }
        if let Some(description) = &self.description {
            event.description = description.clone();
        }
        if let Some(category) = self.category {
            event.category = category;
        }
        if let Some(date) = self.date {
            event.date = date;
        }
        if let Some(venue) = &self.venue {
            event.venue = venue.clone();
        }
        if let Some(price) = self.price {
            event.price = price;
        }
        if let Some(image) = &self.image {
            event.image = Some(image.clone());
        }
    }
}

// ─── Bookings ──────────────────────────────────────────────────────────────

/// A ticket booking, referencing its event by key only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    /// Server-assigned identifier
    pub id: BookingId,
    /// Owning user
    pub user_id: UserId,
    /// Referenced event
    pub event_id: EventId,
    /// When the booking was made
    #[serde(
        rename = "bookingDate",
        deserialize_with = "datetime_compat::deserialize"
    )]
    pub booked_at: DateTime<Utc>,
    /// Number of tickets; always at least one
    pub quantity: u32,
}
