//! Top-level package identifiers
//!
//! Accepts `name`, `name@1.2.3`, `name@^1.2`, `name@next` and the scoped
//! forms `@scope/name@...`. A missing suffix means the `latest` dist-tag.

use std::fmt;

use crate::core::error::{PullError, Result};
use crate::version::{self, Range};

/// What the user asked for after the `@`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requested {
    /// An exact published version
    Exact(String),
    /// A semver range, resolved against the packument
    Range(String),
    /// A dist-tag such as `latest` or `next`
    Tag(String),
}

/// A parsed package identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    pub name: String,
    pub requested: Requested,
}

impl PackageSpec {
    /// Parse a package identifier. Blank input is rejected.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(PullError::InvalidInput("empty package name".to_string()));
        }

        // The version separator is the first '@' that is not a scope marker
        let search_from = usize::from(input.starts_with('@'));
        let (name, suffix) = match input[search_from..].find('@') {
            Some(idx) => {
                let at = search_from + idx;
                (&input[..at], Some(input[at + 1..].trim()))
            }
            None => (input, None),
        };

        validate_name(name)?;

        let requested = match suffix {
            None | Some("") => Requested::Tag("latest".to_string()),
            Some(s) => classify(s)?,
        };

        Ok(Self {
            name: name.to_string(),
            requested,
        })
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requested {
            Requested::Exact(v) | Requested::Range(v) | Requested::Tag(v) => {
                write!(f, "{}@{}", self.name, v)
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    let bare = name.strip_prefix('@').unwrap_or(name);
    if bare.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(PullError::InvalidInput(format!("invalid package name '{}'", name)));
    }
    if name.starts_with('@') {
        match bare.split_once('/') {
            Some((scope, pkg)) if !scope.is_empty() && !pkg.is_empty() => {}
            _ => {
                return Err(PullError::InvalidInput(format!(
                    "scoped package name must look like @scope/name: '{}'",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn classify(suffix: &str) -> Result<Requested> {
    if semver::Version::parse(suffix.strip_prefix('v').unwrap_or(suffix)).is_ok() {
        return Ok(Requested::Exact(suffix.to_string()));
    }
    if is_tag(suffix) {
        return Ok(Requested::Tag(suffix.to_string()));
    }
    Range::parse(suffix)?;
    Ok(Requested::Range(suffix.to_string()))
}

/// Dist-tags are identifiers starting with a letter (`latest`, `next`, `beta`).
fn is_tag(s: &str) -> bool {
    let mut chars = s.chars();
    let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    starts_alpha
        && !matches!(s, "x" | "X")
        && version::parse_version(s).is_none()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
