//! OAuth redirect completion.
//!
//! A matching callback link runs three backend calls in order: session
//! check, identity fetch, profile lookup. The first failure stops the chain.
//! Each call is a single attempt with no timeout of its own.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendError, Identity, ProfileRow};
use crate::navigation::{NavCommand, Screen};
use crate::redirect::CallbackPattern;

/// How a callback invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// URL did not match the callback pattern
    Ignored,
    /// No session after the round trip (abandoned login)
    NoSession,
    /// Identity could not be fetched
    IdentityFailed,
    /// Profile lookup errored
    LookupFailed { user_id: String },
    /// Signed in, no profile yet
    ProfileMissing { user_id: String },
    /// Signed in with an existing profile
    ProfileFound { user_id: String },
}

impl Outcome {
    /// Navigation to apply for this outcome.
    pub fn command(&self) -> NavCommand {
        match self {
            Outcome::ProfileFound { .. } => NavCommand::Replace(Screen::Home),
            _ => NavCommand::Stay,
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Outcome::LookupFailed { user_id }
            | Outcome::ProfileMissing { user_id }
            | Outcome::ProfileFound { user_id } => Some(user_id),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Ignored => write!(f, "ignored"),
            Outcome::NoSession => write!(f, "no session"),
            Outcome::IdentityFailed => write!(f, "identity fetch failed"),
            Outcome::LookupFailed { .. } => write!(f, "profile lookup failed"),
            Outcome::ProfileMissing { .. } => write!(f, "no profile"),
            Outcome::ProfileFound { .. } => write!(f, "profile found"),
        }
    }
}

/// Folds the three step results into an outcome.
///
/// `identity` and `profile` are only consulted once the previous step
/// succeeded, so `None` means "not reached".
pub fn decide(
    session_present: bool,
    identity: Option<&Result<Identity, BackendError>>,
    profile: Option<&Result<Option<ProfileRow>, BackendError>>,
) -> Outcome {
    if !session_present {
        return Outcome::NoSession;
    }
    let Some(Ok(identity)) = identity else {
        return Outcome::IdentityFailed;
    };
    let user_id = identity.id.clone();
    match profile {
        Some(Ok(Some(_))) => Outcome::ProfileFound { user_id },
        Some(Ok(None)) => Outcome::ProfileMissing { user_id },
        Some(Err(_)) | None => Outcome::LookupFailed { user_id },
    }
}

/// Runs the completion chain for callback links.
pub struct CallbackHandler<B> {
    backend: Arc<B>,
    pattern: CallbackPattern,
}

impl<B> Clone for CallbackHandler<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            pattern: self.pattern.clone(),
        }
    }
}

impl<B: Backend> CallbackHandler<B> {
    pub fn new(backend: Arc<B>, pattern: CallbackPattern) -> Self {
        Self { backend, pattern }
    }

    /// Handles one inbound link. Never fails; every ending is an [`Outcome`].
    pub async fn handle(&self, url: &str) -> Outcome {
        if !self.pattern.matches(url) {
            debug!("Ignoring non-callback link");
            return Outcome::Ignored;
        }

        let session_present = match self.backend.current_session().await {
            Ok(session) => session.is_some(),
            Err(err) => {
                warn!(error = %err, "Session check failed");
                false
            }
        };
        if !session_present {
            warn!("Callback arrived without a session; login abandoned");
            return decide(false, None, None);
        }

        let identity = self.backend.current_user().await;
        let user_id = match &identity {
            Ok(identity) => identity.id.clone(),
            Err(err) => {
                warn!(error = %err, "Identity fetch failed");
                return decide(true, Some(&identity), None);
            }
        };
        debug!(%user_id, "Identity confirmed");

        let profile = self.backend.find_profile(&user_id).await;
        let outcome = decide(true, Some(&identity), Some(&profile));
        match (&outcome, &profile) {
            (Outcome::LookupFailed { .. }, Err(err)) => {
                error!(%user_id, error = %err, "Profile lookup failed");
            }
            (Outcome::ProfileMissing { .. }, _) => info!(%user_id, "Signed in, no profile yet"),
            (Outcome::ProfileFound { .. }, _) => info!(%user_id, "Signed in, profile found"),
            _ => {}
        }
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::backend::BackendErrorKind;
    use crate::session::Session;

    /// Scripted backend that counts calls.
    pub(crate) struct MockBackend {
        pub session: bool,
        pub identity: Result<Identity, BackendError>,
        pub profile: Result<Option<ProfileRow>, BackendError>,
        pub delay: Duration,
        pub session_calls: AtomicUsize,
        pub user_calls: AtomicUsize,
        pub lookup_calls: AtomicUsize,
        pub looked_up: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub(crate) fn signed_in(user_id: &str, has_profile: bool) -> Self {
            let profile = has_profile.then(|| ProfileRow {
                id: user_id.to_string(),
                fields: serde_json::Map::new(),
            });
            Self {
                session: true,
                identity: Ok(Identity {
                    id: user_id.to_string(),
                    email: None,
                    user_metadata: serde_json::Value::Null,
                }),
                profile: Ok(profile),
                delay: Duration::ZERO,
                session_calls: AtomicUsize::new(0),
                user_calls: AtomicUsize::new(0),
                lookup_calls: AtomicUsize::new(0),
                looked_up: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> (usize, usize, usize) {
            (
                self.session_calls.load(Ordering::SeqCst),
                self.user_calls.load(Ordering::SeqCst),
                self.lookup_calls.load(Ordering::SeqCst),
            )
        }
    }

    impl Backend for MockBackend {
        async fn current_session(&self) -> Result<Option<Session>, BackendError> {
            self.session_calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self
                .session
                .then(|| Session::from_grant("at".into(), "rt".into(), 3600, None)))
        }

        async fn current_user(&self) -> Result<Identity, BackendError> {
            self.user_calls.fetch_add(1, Ordering::SeqCst);
            self.identity.clone()
        }

        async fn find_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, BackendError> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            self.looked_up
                .lock()
                .unwrap()
                .push(user_id.to_string());
            self.profile.clone()
        }
    }

    fn handler(backend: MockBackend) -> (CallbackHandler<MockBackend>, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        (
            CallbackHandler::new(Arc::clone(&backend), CallbackPattern::default()),
            backend,
        )
    }

    #[tokio::test]
    async fn test_non_matching_url_makes_no_calls() {
        let (handler, backend) = handler(MockBackend::signed_in("u1", true));

        for url in [
            "https://example.com/auth",
            "com.bizdectory://other",
            "com.bizdectory://authx/callback",
            "not a url",
        ] {
            assert_eq!(handler.handle(url).await, Outcome::Ignored);
        }
        assert_eq!(backend.calls(), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_no_session_stops_after_session_check() {
        let mut mock = MockBackend::signed_in("u1", true);
        mock.session = false;
        let (handler, backend) = handler(mock);

        let outcome = handler.handle("com.bizdectory://auth").await;

        assert_eq!(outcome, Outcome::NoSession);
        assert_eq!(outcome.command(), NavCommand::Stay);
        assert_eq!(backend.calls(), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_identity_error_stops_before_lookup() {
        let mut mock = MockBackend::signed_in("u1", true);
        mock.identity = Err(BackendError::http_status(500, ""));
        let (handler, backend) = handler(mock);

        let outcome = handler.handle("com.bizdectory://auth#access_token=x").await;

        assert_eq!(outcome, Outcome::IdentityFailed);
        assert_eq!(outcome.command(), NavCommand::Stay);
        assert_eq!(backend.calls(), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_existing_profile_routes_home() {
        let (handler, backend) = handler(MockBackend::signed_in("user-7", true));

        let outcome = handler.handle("com.bizdectory://auth?code=abc").await;

        assert_eq!(
            outcome,
            Outcome::ProfileFound {
                user_id: "user-7".into()
            }
        );
        assert_eq!(outcome.command(), NavCommand::Replace(Screen::Home));
        assert_eq!(backend.calls(), (1, 1, 1));
        assert_eq!(*backend.looked_up.lock().unwrap(), vec!["user-7".to_string()]);
    }

    #[tokio::test]
    async fn test_callback_sub_path_runs_chain() {
        let (handler, backend) = handler(MockBackend::signed_in("user-7", true));

        let outcome = handler.handle("com.bizdectory://auth/callback?code=x").await;

        assert_eq!(
            outcome,
            Outcome::ProfileFound {
                user_id: "user-7".into()
            }
        );
        assert_eq!(outcome.user_id(), Some("user-7"));
        assert_eq!(backend.calls(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_missing_profile_stays() {
        let (handler, backend) = handler(MockBackend::signed_in("user-7", false));

        let outcome = handler.handle("com.bizdectory://auth").await;

        assert_eq!(
            outcome,
            Outcome::ProfileMissing {
                user_id: "user-7".into()
            }
        );
        assert_eq!(outcome.command(), NavCommand::Stay);
        assert_eq!(backend.calls(), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_lookup_error_differs_from_missing() {
        let mut mock = MockBackend::signed_in("user-7", true);
        mock.profile = Err(BackendError::new(BackendErrorKind::Transport, "down"));
        let (handler, _backend) = handler(mock);

        let outcome = handler.handle("com.bizdectory://auth").await;

        assert_eq!(
            outcome,
            Outcome::LookupFailed {
                user_id: "user-7".into()
            }
        );
        assert_ne!(
            outcome,
            Outcome::ProfileMissing {
                user_id: "user-7".into()
            }
        );
        assert_eq!(outcome.command(), NavCommand::Stay);
    }

    #[test]
    fn test_decide_short_circuits() {
        let ok_identity = Ok(Identity {
            id: "u".into(),
            email: None,
            user_metadata: serde_json::Value::Null,
        });
        let err_identity: Result<Identity, BackendError> = Err(BackendError::parse("bad"));

        assert_eq!(decide(false, Some(&ok_identity), None), Outcome::NoSession);
        assert_eq!(decide(true, Some(&err_identity), None), Outcome::IdentityFailed);
        assert_eq!(decide(true, None, None), Outcome::IdentityFailed);
        assert_eq!(
            decide(true, Some(&ok_identity), Some(&Ok(None))),
            Outcome::ProfileMissing { user_id: "u".into() }
        );
    }

    #[test]
    fn test_only_profile_found_navigates() {
        let outcomes = [
            Outcome::Ignored,
            Outcome::NoSession,
            Outcome::IdentityFailed,
            Outcome::LookupFailed { user_id: "u".into() },
            Outcome::ProfileMissing { user_id: "u".into() },
        ];
        for outcome in outcomes {
            assert_eq!(outcome.command(), NavCommand::Stay, "{outcome}");
        }
    }
}
