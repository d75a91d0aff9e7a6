//! Backend-as-a-service collaborator.
//!
//! The completion handler only needs the three calls in [`Backend`]. The
//! REST implementation in [`rest`] covers the rest of the app's backend use
//! (sign-up, sign-in, rows, object storage).

mod error;
pub mod rest;
pub mod types;

use std::future::Future;

pub use error::{BackendError, BackendErrorKind};
pub use rest::{RestBackend, RestConfig};
pub use types::{Identity, ProfileRow};

use crate::session::Session;

/// Request/response contract consumed by the OAuth completion handler.
///
/// Implementations are constructed once and shared by `Arc`.
pub trait Backend: Send + Sync {
    /// Returns the established session, if any.
    fn current_session(&self)
    -> impl Future<Output = Result<Option<Session>, BackendError>> + Send;

    /// Returns the authenticated identity.
    fn current_user(&self) -> impl Future<Output = Result<Identity, BackendError>> + Send;

    /// Finds the profile row keyed by `user_id`.
    fn find_profile(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<ProfileRow>, BackendError>> + Send;
}
