//! Browser OAuth helpers (PKCE + authorize URL).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Browser-based OAuth providers enabled for the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Facebook,
    Google,
}

impl OAuthProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            OAuthProvider::Facebook => "facebook",
            OAuthProvider::Google => "google",
        }
    }
}

/// PKCE code verifier and challenge
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

/// Generate PKCE code verifier and challenge
pub fn generate_pkce() -> Pkce {
    // Use two UUIDs (16 bytes each) to get 32 random bytes
    let uuid1 = uuid::Uuid::new_v4();
    let uuid2 = uuid::Uuid::new_v4();
    let mut verifier_bytes = [0u8; 32];
    verifier_bytes[..16].copy_from_slice(uuid1.as_bytes());
    verifier_bytes[16..].copy_from_slice(uuid2.as_bytes());
    let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

    Pkce {
        challenge: challenge_for(&verifier),
        verifier,
    }
}

fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Build the authorize URL that starts a browser login.
///
/// The provider redirects back to `redirect_to` with `?code=...`.
pub fn build_authorize_url(
    base_url: &str,
    provider: OAuthProvider,
    redirect_to: &str,
    pkce: &Pkce,
) -> String {
    let params = [
        ("provider", provider.as_str()),
        ("redirect_to", redirect_to),
        ("code_challenge", pkce.challenge.as_str()),
        ("code_challenge_method", "s256"),
    ];

    let query: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();

    format!("{base_url}/auth/v1/authorize?{query}")
}
