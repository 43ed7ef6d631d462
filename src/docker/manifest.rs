//! Image manifests and their resolution
//!
//! A registry answers a manifest request with either a platform index
//! (OCI image index / Docker manifest list) or a concrete manifest naming
//! the config and layer blobs. Resolution walks an explicit state machine:
//!
//! ```text
//! Unresolved ──fetch──▶ IndexFetched ──select──▶ PlatformSelected ──fetch──▶ ConcreteFetched
//!      └──────────────────────fetch (already concrete)─────────────────────────────▲
//! ```
//!
//! Any media type other than the four supported ones is fatal for the pull.

use serde::Deserialize;
use std::fmt;
use tracing::debug;

use super::reference::ImageReference;
use super::select::Selector;
use crate::core::error::{PullError, Result};

pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Accepted on the first request, in preference order.
pub const ACCEPT_ANY: &[&str] = &[OCI_INDEX, DOCKER_MANIFEST_LIST, OCI_MANIFEST, DOCKER_MANIFEST];

/// Accepted once a platform has been chosen.
pub const ACCEPT_CONCRETE: &[&str] = &[OCI_MANIFEST, DOCKER_MANIFEST];

/// A content-addressed blob reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Descriptor {
    #[serde(default, rename = "mediaType")]
    pub media_type: Option<String>,
    pub digest: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default)]
    pub variant: Option<String>,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// One child manifest of a platform index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEntry {
    pub digest: String,
    pub media_type: Option<String>,
    pub platform: Platform,
}

/// Config plus ordered layers of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteManifest {
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// A decoded manifest response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Manifest {
    Index { entries: Vec<PlatformEntry> },
    Concrete(ConcreteManifest),
}

#[derive(Deserialize)]
struct RawManifest {
    #[serde(default, rename = "mediaType")]
    media_type: Option<String>,
    #[serde(default)]
    manifests: Vec<RawIndexEntry>,
    #[serde(default)]
    config: Option<Descriptor>,
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Deserialize)]
struct RawIndexEntry {
    #[serde(default, rename = "mediaType")]
    media_type: Option<String>,
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

impl Manifest {
    /// Decode a manifest body. The media type comes from the body's
    /// `mediaType` field, falling back to the response `Content-Type`.
    pub fn parse(body: &str, content_type: Option<&str>) -> Result<Manifest> {
        let raw: RawManifest = serde_json::from_str(body).map_err(|e| PullError::Json {
            url: "manifest".to_string(),
            message: e.to_string(),
        })?;
        let media_type = raw
            .media_type
            .clone()
            .or_else(|| content_type.map(str::to_string))
            .unwrap_or_default();

        match media_type.as_str() {
            OCI_INDEX | DOCKER_MANIFEST_LIST => {
                let entries = raw
                    .manifests
                    .into_iter()
                    .filter_map(|entry| {
                        // Attestation manifests carry no platform or unknown/unknown
                        let platform = entry.platform.filter(|p| p.os != "unknown")?;
                        Some(PlatformEntry {
                            digest: entry.digest,
                            media_type: entry.media_type,
                            platform,
                        })
                    })
                    .collect();
                Ok(Manifest::Index { entries })
            }
            OCI_MANIFEST | DOCKER_MANIFEST => {
                let config = raw.config.ok_or_else(|| PullError::Json {
                    url: "manifest".to_string(),
                    message: "manifest has no config descriptor".to_string(),
                })?;
                Ok(Manifest::Concrete(ConcreteManifest {
                    media_type,
                    config,
                    layers: raw.layers,
                }))
            }
            "" => Err(PullError::UnsupportedMediaType("(none)".to_string())),
            other => Err(PullError::UnsupportedMediaType(other.to_string())),
        }
    }
}

/// Fetches manifests by tag or digest.
pub trait ManifestSource {
    fn fetch_manifest(&self, repository: &str, reference: &str, accept: &[&str]) -> Result<Manifest>;
}

/// Progress of resolving a reference to a concrete manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionState {
    Unresolved { reference: String },
    IndexFetched { entries: Vec<PlatformEntry> },
    PlatformSelected { entry: PlatformEntry },
    ConcreteFetched(ConcreteManifest),
}

impl ResolutionState {
    /// Perform one transition.
    pub fn advance<M: ManifestSource + ?Sized>(
        self,
        source: &M,
        image: &ImageReference,
        selector: &mut dyn Selector,
    ) -> Result<ResolutionState> {
        match self {
            ResolutionState::Unresolved { reference } => {
                match source.fetch_manifest(&image.repository, &reference, ACCEPT_ANY)? {
                    Manifest::Index { entries } => {
                        debug!(image = %image, platforms = entries.len(), "platform index");
                        Ok(ResolutionState::IndexFetched { entries })
                    }
                    Manifest::Concrete(manifest) => Ok(ResolutionState::ConcreteFetched(manifest)),
                }
            }
            ResolutionState::IndexFetched { entries } => {
                if entries.is_empty() {
                    return Err(PullError::NotFound(format!(
                        "{} lists no runnable platforms",
                        image
                    )));
                }
                let chosen = selector
                    .select_platform(image, &entries)
                    .and_then(|idx| entries.into_iter().nth(idx))
                    .ok_or_else(|| PullError::NoPlatformSelected(image.to_string()))?;
                debug!(image = %image, platform = %chosen.platform, "platform selected");
                Ok(ResolutionState::PlatformSelected { entry: chosen })
            }
            ResolutionState::PlatformSelected { entry } => {
                match source.fetch_manifest(&image.repository, &entry.digest, ACCEPT_CONCRETE)? {
                    Manifest::Concrete(manifest) => Ok(ResolutionState::ConcreteFetched(manifest)),
                    Manifest::Index { .. } => Err(PullError::UnsupportedMediaType(format!(
                        "nested index at {}",
                        entry.digest
                    ))),
                }
            }
            done @ ResolutionState::ConcreteFetched(_) => Ok(done),
        }
    }
}

/// Resolve `image` at `reference` down to a concrete manifest.
pub fn resolve_manifest<M: ManifestSource + ?Sized>(
    source: &M,
    image: &ImageReference,
    reference: &str,
    selector: &mut dyn Selector,
) -> Result<ConcreteManifest> {
    let mut state = ResolutionState::Unresolved {
        reference: reference.to_string(),
    };
    loop {
        state = match state {
            ResolutionState::ConcreteFetched(manifest) => return Ok(manifest),
            other => other.advance(source, image, selector)?,
        };
    }
}
