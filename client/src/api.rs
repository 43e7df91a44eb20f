//! REST API surface.
//!
//! All persistence, authentication, and business rules live behind an
//! external REST API. [`RestApi`] is the consumed contract; [`HttpApi`] is
//! the production transport and the in-memory mock in [`crate::mocks`]
//! implements the same trait for tests.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::StoreFailure;
use crate::types::{
    Booking, BookingId, Event, EventId, EventPatch, NewEvent, Session, Token, User,
};

/// Result of a registration call.
///
/// Some deployments answer `{token, user}` and log the account straight in;
/// others answer `{user}` only and expect a follow-up login.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RegisterOutcome {
    /// Bearer token, when the server issues one at registration
    #[serde(default)]
    pub token: Option<Token>,
    /// The created account
    pub user: User,
}

/// The external REST API as consumed by the stores.
///
/// Object-safe so store environments can hold `Arc<dyn RestApi>`.
#[async_trait]
pub trait RestApi: Send + Sync {
    /// `POST /login`
    async fn login(&self, username: &str, password: &str) -> Result<Session, StoreFailure>;

    /// `POST /register/user`
    async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, StoreFailure>;

    /// `POST /register/admin` — the privilege key is validated server-side;
    /// the client only chooses the endpoint.
    async fn register_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
        secret_key: &str,
    ) -> Result<RegisterOutcome, StoreFailure>;

    /// `GET /events`
    async fn list_events(&self) -> Result<Vec<Event>, StoreFailure>;

    /// `POST /events`
    async fn create_event(&self, token: &Token, event: &NewEvent) -> Result<Event, StoreFailure>;

    /// `PUT /events/{id}`
    async fn update_event(
        &self,
        token: &Token,
        id: &EventId,
        patch: &EventPatch,
    ) -> Result<Event, StoreFailure>;

    /// `DELETE /events/{id}`
    async fn delete_event(&self, token: &Token, id: &EventId) -> Result<(), StoreFailure>;

    /// `GET /bookings` — the server scopes the collection by caller.
    async fn list_bookings(&self, token: &Token) -> Result<Vec<Booking>, StoreFailure>;

    /// `POST /bookings`
    async fn create_booking(
        &self,
        token: &Token,
        event_id: &EventId,
        quantity: u32,
    ) -> Result<Booking, StoreFailure>;

    /// `DELETE /bookings/{id}`
    async fn cancel_booking(&self, token: &Token, id: &BookingId) -> Result<(), StoreFailure>;
}

// ─── Wire payloads ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret_key: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBookingRequest<'a> {
    event_id: &'a EventId,
    quantity: u32,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: Token,
    user: User,
}

// ─── HTTP transport ────────────────────────────────────────────────────────

/// Production [`RestApi`] implementation over reqwest.
#[derive(Clone)]
pub struct HttpApi {
    client: Client,
    base_url: String,
}

impl HttpApi {
    /// Build the transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFailure::Network`] if the HTTP client cannot be
    /// constructed.
    pub fn new(config: &ClientConfig) -> Result<Self, StoreFailure> {
        Self::with_timeout(&config.api_url, config.request_timeout)
    }

    /// Build the transport with an explicit base URL and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFailure::Network`] if the HTTP client cannot be
    /// constructed.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, StoreFailure> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreFailure::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StoreFailure> {
        response
            .json::<T>()
            .await
            .map_err(|e| StoreFailure::Network(format!("malformed response body: {e}")))
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Tries the common JSON envelope keys (`detail` from DRF, `error`,
/// `message`), falling back to the raw body.
async fn error_detail(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|value| {
            ["detail", "error", "message"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or(text)
}

/// Default mapping from an error status to the store failure taxonomy.
async fn unexpected_failure(response: reqwest::Response) -> StoreFailure {
    let status = response.status();
    let message = error_detail(response).await;
    match status {
        StatusCode::UNAUTHORIZED => StoreFailure::InvalidToken,
        StatusCode::FORBIDDEN => {
            if message.is_empty() {
                StoreFailure::Forbidden("you are not allowed to perform this action".to_string())
            } else {
                StoreFailure::Forbidden(message)
            }
        },
        StatusCode::NOT_FOUND => {
            if message.is_empty() {
                StoreFailure::NotFound("resource not found".to_string())
            } else {
                StoreFailure::NotFound(message)
            }
        },
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            StoreFailure::Validation(message)
        },
        _ => StoreFailure::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn transport_failure(error: &reqwest::Error) -> StoreFailure {
    StoreFailure::Network(error.to_string())
}

#[async_trait]
impl RestApi for HttpApi {
    async fn login(&self, username: &str, password: &str) -> Result<Session, StoreFailure> {
        tracing::debug!(username, "POST /login");
        let response = self
            .client
            .post(self.url("/login"))
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        match response.status() {
            status if status.is_success() => {
                let body: LoginResponse = Self::decode(response).await?;
                Ok(Session {
                    token: body.token,
                    user: body.user,
                })
            },
            // Bad credentials come back as either 400 or 401 depending on
            // the deployment.
            StatusCode::UNAUTHORIZED | StatusCode::BAD_REQUEST => {
                Err(StoreFailure::InvalidCredentials)
            },
            _ => Err(unexpected_failure(response).await),
        }
    }

    async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<RegisterOutcome, StoreFailure> {
        tracing::debug!(username, "POST /register/user");
        let response = self
            .client
            .post(self.url("/register/user"))
            .json(&RegisterRequest {
                username,
                email,
                password,
                secret_key: None,
            })
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        register_response(response).await
    }

    async fn register_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
        secret_key: &str,
    ) -> Result<RegisterOutcome, StoreFailure> {
        tracing::debug!(username, "POST /register/admin");
        let response = self
            .client
            .post(self.url("/register/admin"))
            .json(&RegisterRequest {
                username,
                email,
                password,
                secret_key: Some(secret_key),
            })
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        register_response(response).await
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreFailure> {
        tracing::debug!("GET /events");
        let response = self
            .client
            .get(self.url("/events"))
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        if response.status().is_success() {
            Self::decode(response).await
        } else {
            Err(unexpected_failure(response).await)
        }
    }

    async fn create_event(&self, token: &Token, event: &NewEvent) -> Result<Event, StoreFailure> {
        tracing::debug!(name = %event.name, "POST /events");
        let response = self
            .client
            .post(self.url("/events"))
            .bearer_auth(token.as_str())
            .json(event)
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        if response.status().is_success() {
            Self::decode(response).await
        } else {
            Err(unexpected_failure(response).await)
        }
    }

    async fn update_event(
        &self,
        token: &Token,
        id: &EventId,
        patch: &EventPatch,
    ) -> Result<Event, StoreFailure> {
        tracing::debug!(%id, "PUT /events/{{id}}");
        let response = self
            .client
            .put(self.url(&format!("/events/{id}")))
            .bearer_auth(token.as_str())
            .json(patch)
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        if response.status().is_success() {
            Self::decode(response).await
        } else {
            Err(unexpected_failure(response).await)
        }
    }

    async fn delete_event(&self, token: &Token, id: &EventId) -> Result<(), StoreFailure> {
        tracing::debug!(%id, "DELETE /events/{{id}}");
        let response = self
            .client
            .delete(self.url(&format!("/events/{id}")))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_failure(response).await)
        }
    }

    async fn list_bookings(&self, token: &Token) -> Result<Vec<Booking>, StoreFailure> {
        tracing::debug!("GET /bookings");
        let response = self
            .client
            .get(self.url("/bookings"))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        if response.status().is_success() {
            Self::decode(response).await
        } else {
            Err(unexpected_failure(response).await)
        }
    }

    async fn create_booking(
        &self,
        token: &Token,
        event_id: &EventId,
        quantity: u32,
    ) -> Result<Booking, StoreFailure> {
        tracing::debug!(%event_id, quantity, "POST /bookings");
        let response = self
            .client
            .post(self.url("/bookings"))
            .bearer_auth(token.as_str())
            .json(&CreateBookingRequest { event_id, quantity })
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        match response.status() {
            status if status.is_success() => Self::decode(response).await,
            // The server is the source of truth for booking conflicts; the
            // client guard only catches what is already in cache.
            StatusCode::CONFLICT => Err(StoreFailure::DuplicateBooking),
            _ => Err(unexpected_failure(response).await),
        }
    }

    async fn cancel_booking(&self, token: &Token, id: &BookingId) -> Result<(), StoreFailure> {
        tracing::debug!(%id, "DELETE /bookings/{{id}}");
        let response = self
            .client
            .delete(self.url(&format!("/bookings/{id}")))
            .bearer_auth(token.as_str())
            .send()
            .await
            .map_err(|e| transport_failure(&e))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(unexpected_failure(response).await)
        }
    }
}

async fn register_response(response: reqwest::Response) -> Result<RegisterOutcome, StoreFailure> {
    match response.status() {
        status if status.is_success() => HttpApi::decode(response).await,
        StatusCode::CONFLICT => {
            let message = error_detail(response).await;
            Err(StoreFailure::DuplicateIdentity(if message.is_empty() {
                "username or email already registered".to_string()
            } else {
                message
            }))
        },
        _ => Err(unexpected_failure(response).await),
    }
}
