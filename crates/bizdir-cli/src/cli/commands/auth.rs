//! Sign-up, login and logout handlers.

use anyhow::{Context, Result};
use bizdir_core::backend::{Backend, Identity, RestBackend};
use bizdir_core::oauth::OAuthProvider;
use bizdir_core::profile::SignUpForm;
use bizdir_core::redirect::CallbackPattern;
use tracing::debug;

/// Set to `1` to print the authorize URL without opening a browser.
const NO_BROWSER_ENV: &str = "BIZDIR_NO_BROWSER";

pub async fn signup(backend: &RestBackend, form: &SignUpForm) -> Result<()> {
    let result = backend
        .sign_up(form.email.trim(), &form.password, &form.metadata())
        .await
        .context("sign up")?;

    if result.session_started {
        println!("Signed up and logged in as {}", display_name(&result.identity));
        println!("Next: pick a category with `bizdir categories`.");
    } else {
        println!("Signed up as {}.", form.email.trim());
        println!("Check your email to confirm the account, then log in.");
    }
    Ok(())
}

pub async fn login_password(backend: &RestBackend, email: &str, password: &str) -> Result<()> {
    let identity = backend
        .sign_in_with_password(email.trim(), password)
        .await
        .context("log in")?;
    println!("Logged in as {}", display_name(&identity));
    Ok(())
}

pub async fn login_google(backend: &RestBackend, id_token: &str) -> Result<()> {
    let identity = backend
        .sign_in_with_id_token(OAuthProvider::Google, id_token.trim())
        .await
        .context("log in with Google")?;
    println!("Logged in as {}", display_name(&identity));
    Ok(())
}

/// Starts the Facebook browser flow. The redirect comes back through
/// `bizdir link`.
pub async fn login_facebook(backend: &RestBackend, pattern: &CallbackPattern) -> Result<()> {
    // Drop any current session so the user can switch accounts.
    backend.sign_out().await.context("sign out before login")?;

    let url = backend
        .start_oauth(OAuthProvider::Facebook, &pattern.redirect_uri())
        .context("start Facebook login")?;

    println!("Open this URL to log in with Facebook:");
    println!("{url}");
    if std::env::var(NO_BROWSER_ENV).is_ok_and(|v| v.trim() == "1") {
        debug!("Browser opening disabled");
    } else {
        let _ = open::that(&url);
    }
    println!();
    println!("When the browser redirects to {}, run:", pattern.redirect_uri());
    println!("  bizdir link '<redirect url>'");
    Ok(())
}

pub async fn logout(backend: &RestBackend) -> Result<()> {
    if backend.sign_out().await.context("log out")? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

pub async fn whoami(backend: &RestBackend) -> Result<()> {
    if backend.current_session().await?.is_none() {
        println!("Not logged in.");
        return Ok(());
    }
    let identity = backend.current_user().await.context("fetch user")?;
    println!("id: {}", identity.id);
    if let Some(email) = &identity.email {
        println!("email: {email}");
    }
    if let Some(name) = identity.metadata_str("full_name") {
        println!("name: {name}");
    }
    if let Some(phone) = identity.metadata_str("phone") {
        println!("phone: {phone}");
    }
    Ok(())
}

fn display_name(identity: &Identity) -> &str {
    identity
        .email
        .as_deref()
        .or_else(|| identity.metadata_str("full_name"))
        .unwrap_or(&identity.id)
}
