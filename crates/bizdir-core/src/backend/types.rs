//! Wire types for the auth and row APIs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Authenticated user as returned by the auth API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Free-form sign-up metadata (`full_name`, `phone`, ...)
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub user_metadata: Value,
}

impl Identity {
    /// Reads a string field from the sign-up metadata.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata.get(key).and_then(Value::as_str)
    }
}

/// A `profiles` row. Only `id` is interpreted; the rest is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Token grant response (`/auth/v1/token`, and `/signup` when auto-confirmed).
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub user: Option<Identity>,
}

/// Result of a sign-up call.
#[derive(Debug, Clone)]
pub struct SignUp {
    pub identity: Identity,
    /// False when the project requires email confirmation before login
    pub session_started: bool,
}

/// What a callback link contributed to the local session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectCompletion {
    /// PKCE code exchanged for a session
    Exchanged,
    /// Implicit-flow tokens stored as the session
    TokensStored,
    /// Provider reported an error (user cancelled, denied, ...)
    ProviderError(String),
    /// Link carried nothing usable
    Nothing,
}
