//! Source URL policy.
//!
//! Hosting allowlist, cloud-drive link resolution and file type guessing
//! for asset downloads.

use std::collections::HashSet;

use url::Url;

use crate::error::FetchError;

/// Hosts accepted when no allowlist is configured.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] = &[
    "drive.usercontent.google.com",
    "drive.google.com",
    "docs.google.com",
];

/// Extension used when neither the URL nor the response says otherwise.
pub const DEFAULT_EXTENSION: &str = "mp4";

/// Maximum accepted URL length.
const MAX_URL_LENGTH: usize = 2048;

/// Allowlist of hosting domains.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    allowed_hosts: HashSet<String>,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOSTS.iter().copied())
    }
}

impl SourcePolicy {
    /// Create a policy accepting exactly the given hosts.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn allows_host(&self, host: &str) -> bool {
        self.allowed_hosts.contains(&host.to_ascii_lowercase())
    }

    /// Parse `raw` and check it against the allowlist.
    pub fn check(&self, raw: &str) -> Result<Url, FetchError> {
        let trimmed = raw.trim();
        if trimmed.len() > MAX_URL_LENGTH {
            return Err(FetchError::source_rejected(raw, "URL is too long"));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| FetchError::source_rejected(raw, format!("invalid URL: {}", e)))?;

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(FetchError::source_rejected(
                    raw,
                    format!("unsupported scheme '{}'", scheme),
                ))
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| FetchError::source_rejected(raw, "URL has no host"))?;

        if !self.allows_host(host) {
            return Err(FetchError::source_rejected(
                raw,
                format!("host '{}' is not an accepted source", host),
            ));
        }

        Ok(url)
    }
}

/// Rewrite a Drive "view" link into its direct download form.
///
/// Links already in download form, and every other host, pass through.
pub fn resolve_download_url(url: &Url) -> Url {
    if url.host_str() != Some("drive.google.com") {
        return url.clone();
    }

    let file_id = url.path_segments().and_then(|mut segments| {
        match (segments.next(), segments.next(), segments.next()) {
            (Some("file"), Some("d"), Some(id)) if is_drive_file_id(id) => Some(id.to_string()),
            _ => None,
        }
    });

    match file_id {
        Some(id) => Url::parse(&format!(
            "https://drive.usercontent.google.com/download?id={}&export=download&authuser=0",
            id
        ))
        .unwrap_or_else(|_| url.clone()),
        None => url.clone(),
    }
}

fn is_drive_file_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Guess a file extension from the URL path.
///
/// Accepts a trailing `.ext` of one to four ASCII alphanumerics; anything
/// else falls back to [`DEFAULT_EXTENSION`].
pub fn guess_extension(url: &Url) -> String {
    let path = url.path();
    let last_segment = path.rsplit('/').next().unwrap_or("");

    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if (1..=4).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return ext.to_ascii_lowercase();
        }
    }

    DEFAULT_EXTENSION.to_string()
}

/// Map a declared content type to the extension used on disk.
pub fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let ext = match mime.as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        "video/avi" => "avi",
        "video/mov" | "video/quicktime" => "mov",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => return None,
    };
    Some(ext)
}
