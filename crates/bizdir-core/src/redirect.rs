//! Inbound OAuth redirect links.
//!
//! The browser OAuth round trip ends with the provider redirecting to
//! `com.bizdectory://auth`, optionally carrying a PKCE `code` in the query,
//! implicit-flow tokens in the fragment, or an `error` in either.

use url::Url;

/// Registered inbound-link pattern for authentication callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPattern {
    scheme: String,
    host: String,
}

impl CallbackPattern {
    pub const DEFAULT_SCHEME: &str = "com.bizdectory";
    pub const DEFAULT_HOST: &str = "auth";

    pub fn new(scheme: &str, host: &str) -> Self {
        Self {
            scheme: scheme.trim().to_ascii_lowercase(),
            host: host.trim().to_string(),
        }
    }

    /// Returns true if `url` is an auth callback: same scheme, same host,
    /// any path below it. Query and fragment are ignored.
    pub fn matches(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        let path = parsed.path();
        parsed.scheme() == self.scheme
            && parsed.host_str() == Some(self.host.as_str())
            && (path.is_empty() || path.starts_with('/'))
    }

    /// Renders the redirect target handed to the OAuth provider.
    pub fn redirect_uri(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

impl Default for CallbackPattern {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SCHEME, Self::DEFAULT_HOST)
    }
}

/// Parameters carried by a callback link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code (PKCE flow)
    pub code: Option<String>,
    /// Access token (implicit flow)
    pub access_token: Option<String>,
    /// Refresh token (implicit flow)
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds (implicit flow)
    pub expires_in: Option<u64>,
    /// Provider error code
    pub error: Option<String>,
    /// Provider error description
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extracts callback parameters from both query and fragment.
    ///
    /// Returns defaults for unparseable input.
    pub fn parse(url: &str) -> Self {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return Self::default();
        };

        let mut params = Self::default();
        let query = parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned()));
        let fragment = parsed
            .fragment()
            .map(|f| {
                url::form_urlencoded::parse(f.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        for (key, value) in query.chain(fragment) {
            if value.is_empty() {
                continue;
            }
            match key.as_str() {
                "code" => params.code = Some(value),
                "access_token" => params.access_token = Some(value),
                "refresh_token" => params.refresh_token = Some(value),
                "expires_in" => params.expires_in = value.parse().ok(),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }

        params
    }

    /// Returns a one-line error summary, if any.
    pub fn error_summary(&self) -> Option<String> {
        match (&self.error, &self.error_description) {
            (Some(code), Some(desc)) => Some(format!("{code}: {desc}")),
            (Some(code), None) => Some(code.clone()),
            (None, Some(desc)) => Some(desc.clone()),
            (None, None) => None,
        }
    }
}
