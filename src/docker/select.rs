//! Platform and tag selection
//!
//! The engine never guesses a platform. Whoever drives a pull supplies a
//! [`Selector`]: the CLI prompts, scripts pass a [`PlatformPreference`].

use super::manifest::PlatformEntry;
use super::reference::ImageReference;
use crate::core::error::{PullError, Result};

/// Makes the choices a pull cannot make on its own.
pub trait Selector {
    /// Pick one entry of a platform index by position; `None` aborts the pull.
    fn select_platform(&mut self, image: &ImageReference, entries: &[PlatformEntry]) -> Option<usize>;

    /// Pick a tag for a reference given without one; `None` aborts the pull.
    fn select_tag(&mut self, image: &ImageReference, tags: &[String]) -> Option<String>;
}

/// Fixed `os/architecture[/variant]` choice, plus `latest` for untagged references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformPreference {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl PlatformPreference {
    /// Parse `linux/amd64` or `linux/arm/v7`.
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        match parts.as_slice() {
            [os, arch] if !os.is_empty() && !arch.is_empty() => Ok(Self {
                os: os.to_string(),
                architecture: arch.to_string(),
                variant: None,
            }),
            [os, arch, variant] if !os.is_empty() && !arch.is_empty() && !variant.is_empty() => {
                Ok(Self {
                    os: os.to_string(),
                    architecture: arch.to_string(),
                    variant: Some(variant.to_string()),
                })
            }
            _ => Err(PullError::InvalidInput(format!(
                "platform must look like os/arch[/variant]: '{}'",
                s
            ))),
        }
    }

    fn matches(&self, entry: &PlatformEntry) -> bool {
        let p = &entry.platform;
        p.os == self.os
            && p.architecture == self.architecture
            && (self.variant.is_none() || p.variant == self.variant)
    }
}

impl Selector for PlatformPreference {
    fn select_platform(&mut self, _image: &ImageReference, entries: &[PlatformEntry]) -> Option<usize> {
        entries.iter().position(|entry| self.matches(entry))
    }

    fn select_tag(&mut self, _image: &ImageReference, tags: &[String]) -> Option<String> {
        tags.iter().find(|t| *t == "latest").cloned()
    }
}
