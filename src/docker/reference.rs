//! Image references
//!
//! `alpine`, `alpine:3.18`, `grafana/grafana:latest` and
//! `alpine@sha256:...` are all accepted. Single-component names belong to
//! the registry's implicit `library/` namespace.

use std::fmt;
use std::str::FromStr;

use crate::core::error::{PullError, Result};

/// Namespace of unqualified official images
pub const DEFAULT_NAMESPACE: &str = "library";

/// A repository plus an optional tag or digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Normalized repository path, e.g. `library/alpine`
    pub repository: String,
    /// Tag or digest; `None` when the user gave neither
    pub tag: Option<String>,
}

impl ImageReference {
    pub fn new(repository: &str, tag: Option<&str>) -> Result<Self> {
        let repository = normalize_repository(repository)?;
        Ok(Self {
            repository,
            tag: tag.map(str::to_string),
        })
    }

    /// Same repository with `tag` filled in.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        Self {
            repository: self.repository.clone(),
            tag: Some(tag.into()),
        }
    }

    /// True if the reference pins a content digest rather than a tag.
    pub fn is_digest(&self) -> bool {
        self.tag.as_deref().is_some_and(|t| t.contains(':'))
    }

    /// File name of the assembled archive: slashes and colons become underscores.
    ///
    /// `library/alpine:3.18` becomes `library_alpine_3.18.tar`.
    pub fn archive_name(&self) -> String {
        let tag = self.tag.as_deref().unwrap_or("latest");
        format!(
            "{}_{}.tar",
            self.repository.replace('/', "_"),
            tag.replace([':', '/'], "_")
        )
    }
}

impl FromStr for ImageReference {
    type Err = PullError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PullError::InvalidInput("empty image name".to_string()));
        }

        if let Some((name, digest)) = s.split_once('@') {
            if !digest.contains(':') {
                return Err(PullError::InvalidReference(s.to_string()));
            }
            // The digest pins the content; a tag in front of it is dropped
            return ImageReference::new(strip_tag(name), Some(digest));
        }

        // A colon after the last slash separates the tag
        let last_slash = s.rfind('/').map(|i| i + 1).unwrap_or(0);
        match s[last_slash..].rfind(':') {
            Some(idx) => {
                let split = last_slash + idx;
                let tag = &s[split + 1..];
                if tag.is_empty() {
                    return Err(PullError::InvalidReference(s.to_string()));
                }
                ImageReference::new(&s[..split], Some(tag))
            }
            None => ImageReference::new(s, None),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) if self.is_digest() => write!(f, "{}@{}", self.repository, tag),
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

fn strip_tag(name: &str) -> &str {
    let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[last_slash..].rfind(':') {
        Some(idx) => &name[..last_slash + idx],
        None => name,
    }
}

fn normalize_repository(name: &str) -> Result<String> {
    let name = name.trim().trim_matches('/');
    let valid = !name.is_empty()
        && name.split('/').all(|part| !part.is_empty())
        && name.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '/' | '.' | '_' | '-')
        });
    if !valid {
        return Err(PullError::InvalidReference(name.to_string()));
    }
    if name.contains('/') {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", DEFAULT_NAMESPACE, name))
    }
}
