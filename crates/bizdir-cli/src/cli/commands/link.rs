//! Inbound link delivery.
//!
//! Runs the link through the same listener the app mounts at startup, with
//! the link as the cold-start URL.

use std::sync::Arc;

use anyhow::Result;
use bizdir_core::backend::RestBackend;
use bizdir_core::backend::types::RedirectCompletion;
use bizdir_core::callback::{CallbackHandler, Outcome};
use bizdir_core::links::{LinkBus, LinkListener};
use bizdir_core::navigation::{Dispatcher, NavStack};
use bizdir_core::redirect::CallbackPattern;
use tracing::warn;

pub async fn deliver(backend: Arc<RestBackend>, pattern: CallbackPattern, url: &str) -> Result<()> {
    if pattern.matches(url) {
        match backend.complete_redirect(url).await {
            Ok(RedirectCompletion::ProviderError(reason)) => {
                eprintln!("Login was not completed: {reason}");
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "Redirect exchange failed"),
        }
    }

    let dispatcher = Dispatcher::spawn(NavStack::default());
    let bus = LinkBus::new(Some(url.to_string()));
    let handler = CallbackHandler::new(backend, pattern);
    let mut mounted = LinkListener::mount(&bus, handler, dispatcher.clone());

    let outcome = mounted.next_outcome().await;
    // Queued behind the outcome's command, so it sees it applied.
    let screen = dispatcher.snapshot().await.current();
    mounted.unmount();

    match &outcome {
        Some(Outcome::Ignored) | None => println!("Not an auth callback link; ignored."),
        Some(Outcome::NoSession) => println!("No session: the login was abandoned."),
        Some(Outcome::IdentityFailed) => println!("Could not fetch your account. Try logging in again."),
        Some(Outcome::LookupFailed { .. }) => {
            println!("Logged in, but the profile lookup failed. Try again later.");
        }
        Some(Outcome::ProfileMissing { .. }) => {
            println!("Logged in. No profile yet.");
            println!("Create one with `bizdir profiles create --full-name <NAME>`.");
        }
        Some(Outcome::ProfileFound { .. }) => println!("Logged in. Welcome back."),
    }
    if let Some(user_id) = outcome.as_ref().and_then(Outcome::user_id) {
        println!("User: {user_id}");
    }
    println!("Screen: {screen}");
    Ok(())
}
