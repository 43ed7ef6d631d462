//! Runtime configuration
//!
//! Endpoints, download locations and timeouts. The CLI fills this from flags
//! and `PULL_*` environment variables; library callers use the builder methods.

use std::path::PathBuf;
use std::time::Duration;

/// Default request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default per-read timeout for blob streams in seconds
pub const DEFAULT_BLOB_READ_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org";
pub const DEFAULT_DOCKER_REGISTRY: &str = "https://registry-1.docker.io";
pub const DEFAULT_DOCKER_AUTH: &str = "https://auth.docker.io/token";
pub const DEFAULT_DOCKER_SERVICE: &str = "registry.docker.io";
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Configuration shared by both engines
#[derive(Debug, Clone)]
pub struct Config {
    /// npm registry base URL, without trailing slash
    pub npm_registry: String,
    /// Image registry base URL (Registry HTTP API v2)
    pub docker_registry: String,
    /// Token endpoint for anonymous pull tokens
    pub docker_auth: String,
    /// `service` parameter sent to the token endpoint
    pub docker_service: String,
    /// Root of the download tree
    pub download_dir: PathBuf,
    /// Timeout for metadata, manifest and token requests
    pub http_timeout: Duration,
    /// Per-read timeout while streaming blobs
    pub blob_read_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            npm_registry: DEFAULT_NPM_REGISTRY.to_string(),
            docker_registry: DEFAULT_DOCKER_REGISTRY.to_string(),
            docker_auth: DEFAULT_DOCKER_AUTH.to_string(),
            docker_service: DEFAULT_DOCKER_SERVICE.to_string(),
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            blob_read_timeout: Duration::from_secs(DEFAULT_BLOB_READ_TIMEOUT_SECS),
        }
    }
}

impl Config {
    pub fn with_npm_registry(mut self, url: impl Into<String>) -> Self {
        self.npm_registry = trim_base(url.into());
        self
    }

    pub fn with_docker_registry(mut self, url: impl Into<String>) -> Self {
        self.docker_registry = trim_base(url.into());
        self
    }

    pub fn with_docker_auth(mut self, url: impl Into<String>, service: impl Into<String>) -> Self {
        self.docker_auth = url.into();
        self.docker_service = service.into();
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the request timeout, clamped to 5-300 seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.http_timeout = Duration::from_secs(secs.clamp(5, 300));
        self
    }

    /// Set the per-read blob timeout, clamped to 5-3600 seconds.
    pub fn with_blob_read_timeout_secs(mut self, secs: u64) -> Self {
        self.blob_read_timeout = Duration::from_secs(secs.clamp(5, 3600));
        self
    }

    /// Directory holding package tarballs
    pub fn npm_dir(&self) -> PathBuf {
        self.download_dir.join("npm-packages")
    }

    /// Directory holding assembled image archives
    pub fn image_dir(&self) -> PathBuf {
        self.download_dir.join("docker-images")
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
