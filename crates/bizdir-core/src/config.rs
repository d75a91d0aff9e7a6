//! Configuration management for bizdir.
//!
//! Loads configuration from ${BIZDIR_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::redirect::CallbackPattern;

/// Environment variable overriding the backend base URL.
pub const BACKEND_URL_ENV: &str = "BIZDIR_BACKEND_URL";
/// Environment variable overriding the backend anon key.
pub const ANON_KEY_ENV: &str = "BIZDIR_ANON_KEY";

/// Returns the default config template with comments.
///
/// This is embedded from default_config.toml at compile time.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Merges user config values into the default template.
///
/// New comments/sections from the template are always present,
/// while the user's customized values are preserved.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;

    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Recursively merges items from source table into target table.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for bizdir configuration and data files.
    //!
    //! BIZDIR_HOME resolution order:
    //! 1. BIZDIR_HOME environment variable (if set)
    //! 2. ~/.config/bizdir (default)

    use std::path::PathBuf;

    /// Returns the bizdir home directory.
    ///
    /// Falls back to the current directory when no home directory can be found.
    pub fn bizdir_home() -> PathBuf {
        if let Ok(home) = std::env::var("BIZDIR_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir()
            .map_or_else(|| PathBuf::from(".bizdir"), |h| h.join(".config").join("bizdir"))
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        bizdir_home().join("config.toml")
    }

    /// Returns the path to the persisted session file.
    pub fn session_path() -> PathBuf {
        bizdir_home().join("session.json")
    }

    /// Returns the path to the per-user category selections.
    pub fn selected_category_path() -> PathBuf {
        bizdir_home().join("selected_category.json")
    }

    /// Returns the directory for log files.
    pub fn logs_dir() -> PathBuf {
        bizdir_home().join("logs")
    }
}

/// Backend (auth, rows, object storage) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    /// Public anon key sent as `apikey` on every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anon_key: Option<String>,
    /// Object storage bucket for profile and cover images
    pub storage_bucket: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: Config::DEFAULT_BACKEND_URL.to_string(),
            anon_key: None,
            storage_bucket: Config::DEFAULT_STORAGE_BUCKET.to_string(),
        }
    }
}

/// Inbound deep-link settings for the OAuth callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepLinkConfig {
    pub scheme: String,
    pub host: String,
}

impl Default for DeepLinkConfig {
    fn default() -> Self {
        Self {
            scheme: CallbackPattern::DEFAULT_SCHEME.to_string(),
            host: CallbackPattern::DEFAULT_HOST.to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing` filter directive (overridden by `BIZDIR_LOG`)
    pub filter: String,
    /// Write logs to `<home>/logs/bizdir.log` instead of stderr
    pub file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            file: false,
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub deep_link: DeepLinkConfig,
    pub log: LogConfig,
}

impl Config {
    const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
    const DEFAULT_STORAGE_BUCKET: &str = "profile-images";

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Creates a config file with the default template.
    ///
    /// # Errors
    /// Fails if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Saves only the backend url / anon key to a specific config file path.
    ///
    /// Creates the file with default template if it doesn't exist.
    /// If file exists, merges user values into the latest template.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the file cannot be written.
    pub fn save_backend_to(path: &Path, url: Option<&str>, anon_key: Option<&str>) -> Result<()> {
        use toml_edit::{DocumentMut, Item, Table, value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        if !doc.contains_table("backend") {
            doc["backend"] = Item::Table(Table::new());
        }
        if let Some(url) = url {
            validate_url(url)?;
            doc["backend"]["url"] = value(url.trim());
        }
        if let Some(key) = anon_key {
            doc["backend"]["anon_key"] = value(key.trim());
        }

        Self::write_config(path, &doc.to_string())
    }

    /// Returns the backend base URL with precedence: env > config.
    ///
    /// # Errors
    /// Returns an error if the resolved URL is malformed.
    pub fn backend_url(&self) -> Result<String> {
        if let Ok(env_url) = std::env::var(BACKEND_URL_ENV) {
            let trimmed = env_url.trim();
            if !trimmed.is_empty() {
                validate_url(trimmed)?;
                return Ok(trimmed.trim_end_matches('/').to_string());
            }
        }

        let trimmed = self.backend.url.trim();
        validate_url(trimmed)?;
        Ok(trimmed.trim_end_matches('/').to_string())
    }

    /// Returns the anon key with precedence: env > config.
    ///
    /// # Errors
    /// Returns an error if neither source provides a key.
    pub fn anon_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var(ANON_KEY_ENV) {
            let trimmed = key.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }

        match self.backend.anon_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => anyhow::bail!("No anon key available. Set {ANON_KEY_ENV} or anon_key in [backend]."),
        }
    }

    /// Returns the inbound callback pattern configured for OAuth redirects.
    pub fn callback_pattern(&self) -> CallbackPattern {
        CallbackPattern::new(&self.deep_link.scheme, &self.deep_link.host)
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

fn validate_url(url: &str) -> Result<()> {
    url::Url::parse(url).with_context(|| format!("Invalid backend URL: {url}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.backend.url, "http://localhost:54321");
        assert_eq!(config.backend.anon_key, None);
        assert_eq!(config.deep_link.scheme, "com.bizdectory");
        assert_eq!(config.deep_link.host, "auth");
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(
            &config_path,
            "[backend]\nurl = \"https://demo.supabase.co\"\nanon_key = \"anon\"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.backend.url, "https://demo.supabase.co");
        assert_eq!(config.backend.anon_key.as_deref(), Some("anon"));
        assert_eq!(config.backend.storage_bucket, "profile-images");
        assert_eq!(config.log.filter, "warn");
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        assert!(config_path.exists());
        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("[backend]"));
        assert!(contents.contains("# anon_key ="));

        // The template itself must parse into the defaults.
        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.deep_link.scheme, "com.bizdectory");
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, "").unwrap();

        assert!(Config::init(&config_path).is_err());
    }

    #[test]
    fn test_save_backend_preserves_other_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[log]\nfilter = \"debug\"\n").unwrap();

        Config::save_backend_to(&config_path, Some("https://x.supabase.co"), Some("k")).unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.backend.url, "https://x.supabase.co");
        assert_eq!(config.backend.anon_key.as_deref(), Some("k"));
        assert_eq!(config.log.filter, "debug");
    }

    #[test]
    fn test_save_backend_rejects_invalid_url() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        let result = Config::save_backend_to(&config_path, Some("not a url"), None);
        assert!(result.is_err());
        assert!(!config_path.exists());
    }

    #[test]
    fn test_anon_key_missing_is_error() {
        let config = Config::default();
        // Only meaningful when the env override is absent.
        if std::env::var(ANON_KEY_ENV).is_err() {
            let err = config.anon_key().unwrap_err();
            assert!(err.to_string().contains("No anon key available"));
        }
    }

    #[test]
    fn test_callback_pattern_from_config() {
        let config = Config {
            deep_link: DeepLinkConfig {
                scheme: "myapp".to_string(),
                host: "login-callback".to_string(),
            },
            ..Default::default()
        };
        let pattern = config.callback_pattern();
        assert!(pattern.matches("myapp://login-callback?code=1"));
        assert!(!pattern.matches("com.bizdectory://auth"));
    }
}
