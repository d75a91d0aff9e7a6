//! REST client for a Supabase-compatible backend.
//!
//! - auth: `/auth/v1/*`
//! - rows: `/rest/v1/<table>`
//! - object storage: `/storage/v1/object/<bucket>/<key>`
//!
//! Every request carries the project's anon key as `apikey`. User-scoped
//! requests send the session access token as the bearer; otherwise the anon
//! key is used.

use std::sync::Arc;

use anyhow::Result;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{RedirectCompletion, SignUp, TokenResponse};
use super::{Backend, BackendError, Identity, ProfileRow};
use crate::config::Config;
use crate::oauth::{self, OAuthProvider};
use crate::profile::{Category, ProfileDraft, ProfileSummary};
use crate::redirect::CallbackParams;
use crate::session::{PendingLogin, Session, SessionStore, now_millis_u64};

/// Standard User-Agent header for bizdir API requests.
pub const USER_AGENT: &str = concat!("bizdir/", env!("CARGO_PKG_VERSION"));

const PROFILES_TABLE: &str = "profiles";
const CATEGORIES_TABLE: &str = "user_categories";
const SUMMARY_COLUMNS: &str = "profile_id,full_name,profession,profile_picture_url";

/// Connection settings for the REST backend.
#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub anon_key: String,
    pub storage_bucket: String,
}

impl RestConfig {
    /// Resolves connection settings from config and environment.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or no anon key is available.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            base_url: config.backend_url()?,
            anon_key: config.anon_key()?,
            storage_bucket: config.backend.storage_bucket.clone(),
        })
    }
}

/// Backend client. Build once and share by `Arc`.
pub struct RestBackend {
    config: RestConfig,
    http: reqwest::Client,
    sessions: Arc<SessionStore>,
}

impl RestBackend {
    pub fn new(config: RestConfig, sessions: Arc<SessionStore>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            sessions,
        }
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// Registers an email/password user with sign-up metadata.
    ///
    /// When the project auto-confirms, the returned session is stored.
    ///
    /// # Errors
    /// Returns the backend error (e.g. user already registered).
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &Value,
    ) -> Result<SignUp, BackendError> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "data": metadata,
        });
        let response: Value = self
            .send_json(self.request(Method::POST, "/auth/v1/signup").json(&body))
            .await?;

        if response.get("access_token").is_some() {
            let grant: TokenResponse = serde_json::from_value(response)
                .map_err(|e| BackendError::parse(format!("Invalid sign-up response: {e}")))?;
            let identity = self.store_grant(grant)?;
            return Ok(SignUp {
                identity,
                session_started: true,
            });
        }

        let identity = response
            .get("user")
            .cloned()
            .map_or_else(|| serde_json::from_value(response), serde_json::from_value)
            .map_err(|e| BackendError::parse(format!("Invalid sign-up response: {e}")))?;
        Ok(SignUp {
            identity,
            session_started: false,
        })
    }

    /// Signs in with email and password and stores the session.
    ///
    /// # Errors
    /// Returns the backend error (e.g. invalid login credentials).
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Identity, BackendError> {
        let body = serde_json::json!({ "email": email, "password": password });
        self.token_grant("password", &body).await
    }

    /// Signs in with a provider-issued id token (Google sign-in on device).
    ///
    /// # Errors
    /// Returns the backend error if the token is rejected.
    pub async fn sign_in_with_id_token(
        &self,
        provider: OAuthProvider,
        id_token: &str,
    ) -> Result<Identity, BackendError> {
        let body = serde_json::json!({ "provider": provider.as_str(), "id_token": id_token });
        self.token_grant("id_token", &body).await
    }

    /// Starts a browser login: stores a PKCE verifier and returns the
    /// authorize URL to open.
    ///
    /// # Errors
    /// Returns an error if the pending login cannot be stored.
    pub fn start_oauth(&self, provider: OAuthProvider, redirect_to: &str) -> Result<String> {
        let pkce = oauth::generate_pkce();
        self.sessions.set_pending(PendingLogin {
            provider: provider.as_str().to_string(),
            verifier: pkce.verifier.clone(),
            created_at: now_millis_u64(),
        })?;
        Ok(oauth::build_authorize_url(
            &self.config.base_url,
            provider,
            redirect_to,
            &pkce,
        ))
    }

    /// Completes the handshake carried by a callback link, if it carries one.
    ///
    /// PKCE codes are exchanged using the stored verifier; implicit-flow
    /// tokens are stored as-is. Provider errors are reported, not raised.
    ///
    /// # Errors
    /// Returns the backend error if the code exchange fails.
    pub async fn complete_redirect(&self, url: &str) -> Result<RedirectCompletion, BackendError> {
        let params = CallbackParams::parse(url);

        if let Some(summary) = params.error_summary() {
            // Abandoned browser flow; the verifier is useless now.
            if let Err(err) = self.sessions.take_pending() {
                warn!(error = %err, "Could not clear pending login");
            }
            return Ok(RedirectCompletion::ProviderError(summary));
        }

        if let Some(code) = params.code {
            let pending = self
                .sessions
                .take_pending()
                .map_err(|e| BackendError::parse(format!("{e:#}")))?;
            let Some(pending) = pending else {
                warn!("Callback carried a code but no login is pending");
                return Ok(RedirectCompletion::Nothing);
            };
            let body = serde_json::json!({
                "auth_code": code,
                "code_verifier": pending.verifier,
            });
            self.token_grant("pkce", &body).await?;
            return Ok(RedirectCompletion::Exchanged);
        }

        if let (Some(access), Some(refresh)) = (params.access_token, params.refresh_token) {
            let session = Session::from_grant(access, refresh, params.expires_in.unwrap_or(3600), None);
            self.save_session(&session)?;
            return Ok(RedirectCompletion::TokensStored);
        }

        Ok(RedirectCompletion::Nothing)
    }

    /// Signs out. The local session is cleared even if the server call fails.
    ///
    /// Returns true if a session was present.
    ///
    /// # Errors
    /// Returns an error only if the local session file cannot be updated.
    pub async fn sign_out(&self) -> Result<bool> {
        let session = self.sessions.load()?;
        if let Some(session) = &session {
            let request = self
                .request(Method::POST, "/auth/v1/logout")
                .bearer_auth(&session.access_token);
            match request.send().await {
                Ok(resp) if resp.status().is_success() => debug!("Server session revoked"),
                Ok(resp) => warn!(status = %resp.status(), "Server sign-out rejected"),
                Err(e) => warn!(error = %e, "Server sign-out failed"),
            }
        }
        self.sessions.clear()?;
        Ok(session.is_some())
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Lists every profile's summary columns.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn list_profiles(&self) -> Result<Vec<ProfileSummary>, BackendError> {
        let path = format!("/rest/v1/{PROFILES_TABLE}?select={SUMMARY_COLUMNS}");
        let request = self.authed(Method::GET, &path).await?;
        self.send_json(request).await
    }

    /// Inserts the current user's profile row and returns it.
    ///
    /// # Errors
    /// Returns `Unauthenticated` without a session, or the backend error.
    pub async fn insert_profile(&self, draft: &ProfileDraft) -> Result<ProfileRow, BackendError> {
        let identity = self.current_user().await?;
        let row = draft.to_row(&identity.id);
        let path = format!("/rest/v1/{PROFILES_TABLE}");
        let request = self
            .authed(Method::POST, &path)
            .await?
            .header("Prefer", "return=representation")
            .json(&row);
        let mut rows: Vec<ProfileRow> = self.send_json(request).await?;
        rows.pop()
            .ok_or_else(|| BackendError::parse("Insert returned no row"))
    }

    /// Updates a single column of the current user's profile.
    ///
    /// # Errors
    /// Returns `Unauthenticated` without a session, or the backend error.
    pub async fn update_profile_field(
        &self,
        column: &str,
        value: &str,
    ) -> Result<(), BackendError> {
        let identity = self.current_user().await?;
        let path = format!("/rest/v1/{PROFILES_TABLE}?id=eq.{}", encode(&identity.id));
        let request = self
            .authed(Method::PATCH, &path)
            .await?
            .json(&serde_json::json!({ column: value }));
        self.send_empty(request).await
    }

    /// Lists the directory categories.
    ///
    /// # Errors
    /// Returns the backend error.
    pub async fn list_categories(&self) -> Result<Vec<Category>, BackendError> {
        let path = format!("/rest/v1/{CATEGORIES_TABLE}?select=category_id,name");
        let request = self.authed(Method::GET, &path).await?;
        self.send_json(request).await
    }

    // ========================================================================
    // Object storage
    // ========================================================================

    /// Uploads bytes under `key` in the configured bucket and returns the
    /// public URL.
    ///
    /// # Errors
    /// Returns `Unauthenticated` without a session, or the backend error.
    pub async fn upload_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<String, BackendError> {
        let bucket = &self.config.storage_bucket;
        let session = self
            .current_session()
            .await?
            .ok_or_else(|| BackendError::unauthenticated("Not logged in"))?;
        let request = self
            .request(Method::POST, &format!("/storage/v1/object/{bucket}/{key}"))
            .bearer_auth(&session.access_token)
            .header("Content-Type", mime)
            .header("x-upsert", "true")
            .body(bytes);
        self.send_empty(request).await?;
        Ok(self.public_url(key))
    }

    pub fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{key}",
            self.config.base_url, self.config.storage_bucket
        )
    }

    // ========================================================================
    // Plumbing
    // ========================================================================

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.config.base_url))
            .header("apikey", &self.config.anon_key)
            .header("User-Agent", USER_AGENT)
    }

    /// Request with the session bearer, or the anon key when logged out.
    async fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let bearer = match self.current_session().await? {
            Some(session) => session.access_token,
            None => self.config.anon_key.clone(),
        };
        Ok(self.request(method, path).bearer_auth(bearer))
    }

    async fn token_grant(&self, grant_type: &str, body: &Value) -> Result<Identity, BackendError> {
        let path = format!("/auth/v1/token?grant_type={grant_type}");
        let request = self
            .request(Method::POST, &path)
            .bearer_auth(&self.config.anon_key)
            .json(body);
        let grant: TokenResponse = self.send_json(request).await?;
        self.store_grant(grant)
    }

    fn store_grant(&self, grant: TokenResponse) -> Result<Identity, BackendError> {
        let identity = grant
            .user
            .ok_or_else(|| BackendError::parse("Token response has no user"))?;
        let session = Session::from_grant(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            Some(identity.id.clone()),
        );
        self.save_session(&session)?;
        Ok(identity)
    }

    fn save_session(&self, session: &Session) -> Result<(), BackendError> {
        self.sessions
            .save(session)
            .map_err(|e| BackendError::parse(format!("Failed to store session: {e:#}")))
    }

    async fn refresh(&self, session: &Session) -> Result<Session, BackendError> {
        let body = serde_json::json!({ "refresh_token": session.refresh_token });
        let path = "/auth/v1/token?grant_type=refresh_token";
        let request = self
            .request(Method::POST, path)
            .bearer_auth(&self.config.anon_key)
            .json(&body);
        let grant: TokenResponse = self.send_json(request).await?;
        let user_id = grant
            .user
            .as_ref()
            .map(|u| u.id.clone())
            .or_else(|| session.user_id.clone());
        let refreshed =
            Session::from_grant(grant.access_token, grant.refresh_token, grant.expires_in, user_id);
        self.save_session(&refreshed)?;
        Ok(refreshed)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, BackendError> {
        let response = request.send().await.map_err(|e| BackendError::transport(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::http_status(status.as_u16(), &body));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = self.send(request).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::parse(format!("Failed to parse response: {e}")))
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), BackendError> {
        self.send(request).await.map(|_| ())
    }
}

impl Backend for RestBackend {
    /// Loads the stored session, refreshing it once if expired.
    ///
    /// A refresh the backend rejects ends the session locally.
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let stored = self
            .sessions
            .load()
            .map_err(|e| BackendError::parse(format!("{e:#}")))?;
        let Some(session) = stored else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        debug!("Session expired, refreshing");
        match self.refresh(&session).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(err) if err.is_credential_rejection() => {
                warn!(error = %err, "Refresh rejected, ending session");
                if let Err(err) = self.sessions.clear() {
                    warn!(error = %err, "Could not remove stored session");
                }
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn current_user(&self) -> Result<Identity, BackendError> {
        let session = self
            .current_session()
            .await?
            .ok_or_else(|| BackendError::unauthenticated("Not logged in"))?;
        let request = self
            .request(Method::GET, "/auth/v1/user")
            .bearer_auth(&session.access_token);
        self.send_json(request).await
    }

    async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, BackendError> {
        let path = format!(
            "/rest/v1/{PROFILES_TABLE}?id=eq.{}&select=*&limit=1",
            encode(user_id)
        );
        let request = self.authed(Method::GET, &path).await?;
        let mut rows: Vec<ProfileRow> = self.send_json(request).await?;
        Ok(rows.pop())
    }
}

/// Percent-encodes a filter value for a query string.
fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
