//! Package registry client
//!
//! `GET /{name}` returns the packument: every published version with its
//! dependencies and tarball URL. `GET /{name}/{version}` returns one version.

use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;

use crate::blob::BlobStreamer;
use crate::core::config::Config;
use crate::core::error::{PullError, Result};
use crate::core::http::HttpClient;
use crate::core::progress::ProgressObserver;

const ACCEPT_JSON: (&str, &str) = ("Accept", "application/json");

/// All published versions of a package.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: IndexMap<String, String>,
    #[serde(default)]
    pub versions: IndexMap<String, VersionManifest>,
}

/// Metadata of a single published version.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: IndexMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: IndexMap<String, String>,
    pub dist: Dist,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dist {
    pub tarball: String,
}

impl VersionManifest {
    /// Dependency edges in declaration order as (name, range, optional).
    ///
    /// Optional dependencies already listed under `dependencies` are not repeated.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, bool)> {
        let required = self
            .dependencies
            .iter()
            .map(|(name, range)| (name.as_str(), range.as_str(), false));
        let optional = self
            .optional_dependencies
            .iter()
            .filter(|(name, _)| !self.dependencies.contains_key(*name))
            .map(|(name, range)| (name.as_str(), range.as_str(), true));
        required.chain(optional)
    }
}

/// Where package metadata and tarballs come from.
pub trait PackageSource {
    /// Fetch every published version of `name`.
    fn packument(&self, name: &str) -> Result<Packument>;

    /// Fetch the metadata of one exact version.
    fn version_manifest(&self, name: &str, version: &str) -> Result<VersionManifest>;

    /// Download a tarball to `dest`, returning its size in bytes.
    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64>;
}

/// HTTP client for an npm-compatible registry.
pub struct NpmRegistry {
    base: String,
    http: HttpClient,
    streamer: BlobStreamer,
}

impl NpmRegistry {
    pub fn new(config: &Config) -> Self {
        let http = HttpClient::new(config);
        Self {
            base: config.npm_registry.trim_end_matches('/').to_string(),
            streamer: BlobStreamer::new(http.clone()),
            http,
        }
    }

    fn package_url(&self, name: &str) -> String {
        format!("{}/{}", self.base, encode_name(name))
    }
}

impl PackageSource for NpmRegistry {
    fn packument(&self, name: &str) -> Result<Packument> {
        self.http.get_json(&self.package_url(name), &[ACCEPT_JSON])
    }

    fn version_manifest(&self, name: &str, version: &str) -> Result<VersionManifest> {
        let url = format!("{}/{}", self.package_url(name), version);
        self.http.get_json(&url, &[ACCEPT_JSON])
    }

    fn download(
        &self,
        url: &str,
        dest: &Path,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        self.streamer.stream(url, &[], dest, progress)
    }
}

/// Encode a package name for use as a URL path segment.
///
/// Scoped names keep their `@` but the separating slash is escaped.
pub fn encode_name(name: &str) -> String {
    name.replace('/', "%2F")
}

/// File name of a tarball: the last path segment of its URL.
pub fn tarball_filename(url: &str) -> Result<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PullError::InvalidInput(format!("tarball URL has no file name: {}", url)))
}
