//! Session storage and retrieval.
//!
//! Stores the backend session in `<base>/session.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Margin subtracted from the token lifetime so refresh happens before expiry.
const EXPIRY_MARGIN_MS: u64 = 60 * 1000;

pub(crate) fn now_millis_u64() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u64::try_from(d.as_millis()).ok())
        .unwrap_or(u64::MAX)
}

/// Server-tracked proof of authentication, held opaquely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry timestamp in milliseconds since epoch
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Session {
    /// Builds a session from a token grant, expiring a minute early.
    pub fn from_grant(
        access_token: String,
        refresh_token: String,
        expires_in_secs: u64,
        user_id: Option<String>,
    ) -> Self {
        let lifetime = expires_in_secs.saturating_mul(1000);
        Self {
            access_token,
            refresh_token,
            expires_at: now_millis_u64()
                .saturating_add(lifetime)
                .saturating_sub(EXPIRY_MARGIN_MS),
            user_id,
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired(&self) -> bool {
        now_millis_u64() >= self.expires_at
    }
}

/// PKCE verifier kept between opening the browser and receiving the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    pub provider: String,
    pub verifier: String,
    pub created_at: u64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<Session>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pending: Option<PendingLogin>,
}

/// File-backed session cache.
///
/// Read-modify-write cycles are serialized within the process.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored session, if any.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<Session>> {
        let _guard = self.guard();
        Ok(self.read()?.session)
    }

    /// Replaces the stored session. Any pending login is consumed.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, session: &Session) -> Result<()> {
        let _guard = self.guard();
        let mut file = self.read()?;
        file.session = Some(session.clone());
        file.pending = None;
        self.write(&file)
    }

    /// Removes the stored session. Returns true if one was present.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or written.
    pub fn clear(&self) -> Result<bool> {
        let _guard = self.guard();
        let mut file = self.read()?;
        let had = file.session.take().is_some();
        self.write(&file)?;
        Ok(had)
    }

    /// Records the PKCE verifier of a browser login in progress.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or written.
    pub fn set_pending(&self, pending: PendingLogin) -> Result<()> {
        let _guard = self.guard();
        let mut file = self.read()?;
        file.pending = Some(pending);
        self.write(&file)
    }

    /// Removes and returns the pending login, if any.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or written.
    pub fn take_pending(&self) -> Result<Option<PendingLogin>> {
        let _guard = self.guard();
        let mut file = self.read()?;
        let pending = file.pending.take();
        if pending.is_some() {
            self.write(&file)?;
        }
        Ok(pending)
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn read(&self) -> Result<SessionFile> {
        if !self.path.exists() {
            return Ok(SessionFile::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {}", self.path.display()))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session from {}", self.path.display()))
    }

    /// Writes the session file with restricted permissions (0600).
    fn write(&self, file: &SessionFile) -> Result<()> {
        let path = &self.path;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(file).context("Failed to serialize session")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut handle = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open {} for writing", path.display()))?;
            handle
                .write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(path, contents)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }

        Ok(())
    }
}
