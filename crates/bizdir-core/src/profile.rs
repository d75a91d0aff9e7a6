//! Directory listing models: categories, profiles, sign-up form.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Row ids arrive as uuids or integers depending on the table.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// A `user_categories` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    #[serde(deserialize_with = "id_string")]
    pub category_id: String,
    pub name: String,
}

/// The list-view projection of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfileSummary {
    #[serde(deserialize_with = "id_string")]
    pub profile_id: String,
    pub full_name: String,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
}

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}

impl Coordinates {
    /// Parses and range-checks a coordinate pair.
    ///
    /// # Errors
    /// Returns an error for non-numeric or out-of-range values.
    pub fn parse(lat: &str, long: &str) -> Result<Self> {
        let lat: f64 = lat
            .trim()
            .parse()
            .with_context(|| format!("Invalid latitude: {lat}"))?;
        let long: f64 = long
            .trim()
            .parse()
            .with_context(|| format!("Invalid longitude: {long}"))?;

        if !(-90.0..=90.0).contains(&lat) {
            anyhow::bail!("Latitude out of range: {lat}");
        }
        if !(-180.0..=180.0).contains(&long) {
            anyhow::bail!("Longitude out of range: {long}");
        }

        Ok(Self { lat, long })
    }
}

/// Fields of the create-profile form.
#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub full_name: String,
    pub bio: Option<String>,
    pub profession: Option<String>,
    pub website_url: Option<String>,
    pub profile_picture_url: Option<String>,
    pub cover_img_url: Option<String>,
    pub phn_no: Option<String>,
    pub whatsapp_no: Option<String>,
    pub email: Option<String>,
    pub facebook_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub instagram_url: Option<String>,
    pub location: Option<Coordinates>,
    pub category_id: Option<String>,
}

impl ProfileDraft {
    /// Checks required fields and link formats.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            anyhow::bail!("Full name is required");
        }

        if let Some(email) = non_empty(self.email.as_deref())
            && !is_plausible_email(email)
        {
            anyhow::bail!("Invalid email: {email}");
        }

        let links = [
            ("website_url", &self.website_url),
            ("profile_picture_url", &self.profile_picture_url),
            ("cover_img_url", &self.cover_img_url),
            ("facebook_url", &self.facebook_url),
            ("linkedin_url", &self.linkedin_url),
            ("instagram_url", &self.instagram_url),
        ];
        for (field, value) in links {
            if let Some(link) = non_empty(value.as_deref()) {
                let parsed =
                    url::Url::parse(link).with_context(|| format!("Invalid {field}: {link}"))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    anyhow::bail!("{field} must be an http(s) link: {link}");
                }
            }
        }

        Ok(())
    }

    /// Builds the `profiles` row for `user_id`. Blank optional fields are omitted.
    pub fn to_row(&self, user_id: &str) -> Value {
        let mut row = Map::new();
        row.insert("id".into(), Value::String(user_id.to_string()));
        row.insert("full_name".into(), Value::String(self.full_name.trim().to_string()));

        let optional = [
            ("bio", &self.bio),
            ("profession", &self.profession),
            ("website_url", &self.website_url),
            ("profile_picture_url", &self.profile_picture_url),
            ("cover_img_url", &self.cover_img_url),
            ("phn_no", &self.phn_no),
            ("whatsapp_no", &self.whatsapp_no),
            ("email", &self.email),
            ("facebook_url", &self.facebook_url),
            ("linkedin_url", &self.linkedin_url),
            ("instagram_url", &self.instagram_url),
            ("category_id", &self.category_id),
        ];
        for (key, value) in optional {
            if let Some(v) = non_empty(value.as_deref()) {
                row.insert(key.into(), Value::String(v.to_string()));
            }
        }

        if let Some(coords) = self.location {
            row.insert("lat".into(), Value::from(coords.lat));
            row.insert("long".into(), Value::from(coords.long));
        }

        Value::Object(row)
    }
}

/// Email/password sign-up form with contact metadata.
#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub phone: String,
}

impl SignUpForm {
    /// All four fields are required.
    ///
    /// # Errors
    /// Returns an error naming the first problem.
    pub fn validate(&self) -> Result<()> {
        let fields = [&self.email, &self.password, &self.full_name, &self.phone];
        if fields.iter().any(|f| f.trim().is_empty()) {
            anyhow::bail!("Please fill in all fields");
        }
        if !is_plausible_email(self.email.trim()) {
            anyhow::bail!("Invalid email: {}", self.email.trim());
        }
        Ok(())
    }

    /// Metadata stored on the auth user.
    pub fn metadata(&self) -> Value {
        serde_json::json!({
            "full_name": self.full_name.trim(),
            "phone": self.phone.trim(),
        })
    }
}

/// Category chosen by each user on this device, keyed by user id.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CategorySelections {
    #[serde(flatten)]
    pub by_user: HashMap<String, Category>,
}

impl CategorySelections {
    /// Loads selections, returning an empty set if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Saves selections, creating parent directories.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let contents =
            serde_json::to_string_pretty(self).context("Failed to serialize selections")?;
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn get(&self, user_id: &str) -> Option<&Category> {
        self.by_user.get(user_id)
    }

    pub fn set(&mut self, user_id: &str, category: Category) {
        self.by_user.insert(user_id.to_string(), category);
    }

    /// Default file location under the bizdir home.
    pub fn default_path() -> PathBuf {
        crate::config::paths::selected_category_path()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}
