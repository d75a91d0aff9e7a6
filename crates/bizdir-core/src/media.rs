//! Image file helpers for profile and cover uploads.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Which profile image slot an upload fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Profile,
    Cover,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Profile => "profile",
            ImageKind::Cover => "cover",
        }
    }

    /// Profile row column that stores the public URL.
    pub fn column(self) -> &'static str {
        match self {
            ImageKind::Profile => "profile_picture_url",
            ImageKind::Cover => "cover_img_url",
        }
    }
}

/// Image bytes ready for upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub extension: &'static str,
}

/// Normalizes user-provided file paths.
///
/// Handles common drag-and-drop shell escaping (`\ `, `\(`, `\)`) and
/// expands `~/` to the HOME directory when available.
#[must_use]
pub fn normalize_input_path(path: &str) -> PathBuf {
    let unescaped = path
        .trim()
        .replace("\\ ", " ")
        .replace("\\(", "(")
        .replace("\\)", ")");

    let path = Path::new(&unescaped);
    if let Some(rest) = path.to_str().and_then(|s| s.strip_prefix("~/"))
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }

    path.to_path_buf()
}

/// Returns MIME type inferred from file extension for supported image formats.
#[must_use]
pub fn mime_type_for_extension(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension().and_then(|e| e.to_str())?;

    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Detects the image type from content, falling back to the extension.
///
/// Returns `(mime, extension)`.
///
/// # Errors
/// Returns an error for unsupported or unrecognized formats.
pub fn detect_image(bytes: &[u8], path_hint: &str) -> Result<(&'static str, &'static str)> {
    let mime = match infer::get(bytes) {
        Some(kind) => Some(kind.mime_type()),
        None => mime_type_for_extension(path_hint),
    };

    mime.and_then(|m| extension_for_mime(m).map(|ext| (m, ext)))
        .with_context(|| {
            format!("Unsupported image format: {path_hint} (expected png, jpeg, gif or webp)")
        })
}

/// Reads an image file from disk and detects its type.
///
/// # Errors
/// Returns an error if the file is missing, empty, or not a supported image.
pub fn load_image(path: &str) -> Result<ImageUpload> {
    let resolved = normalize_input_path(path);
    let bytes = std::fs::read(&resolved)
        .with_context(|| format!("Failed to read image {}", resolved.display()))?;
    if bytes.is_empty() {
        anyhow::bail!("Image file is empty: {}", resolved.display());
    }

    let (mime, extension) = detect_image(&bytes, &resolved.to_string_lossy())?;
    Ok(ImageUpload {
        bytes,
        mime,
        extension,
    })
}

/// Object key for an upload: `<user_id>/<kind>-<uuid>.<ext>`.
pub fn object_key(user_id: &str, kind: ImageKind, extension: &str) -> String {
    format!("{user_id}/{}-{}.{extension}", kind.as_str(), uuid::Uuid::new_v4())
}
