//! Image registry client (Registry HTTP API v2)
//!
//! Every request is authorized with a bearer token obtained anonymously
//! from the token endpoint, scoped to `repository:{name}:pull`. A
//! [`Session`] binds one repository to its token.

use indexmap::IndexSet;
use serde::Deserialize;
use std::io::Write;
use tracing::debug;

use super::manifest::{Manifest, ManifestSource};
use crate::blob::BlobStreamer;
use crate::core::config::Config;
use crate::core::error::{PullError, Result};
use crate::core::http::{bearer, HttpClient};
use crate::core::progress::ProgressObserver;

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Client for one registry and its token service.
pub struct RegistryClient {
    registry: String,
    auth_url: String,
    service: String,
    http: HttpClient,
    streamer: BlobStreamer,
}

impl RegistryClient {
    pub fn new(config: &Config) -> Self {
        let http = HttpClient::new(config);
        Self {
            registry: config.docker_registry.trim_end_matches('/').to_string(),
            auth_url: config.docker_auth.clone(),
            service: config.docker_service.clone(),
            streamer: BlobStreamer::new(http.clone()),
            http,
        }
    }

    /// Exchange an anonymous grant for a pull token on `repository`.
    pub fn token(&self, repository: &str) -> Result<String> {
        let url = format!(
            "{}?service={}&scope=repository:{}:pull",
            self.auth_url, self.service, repository
        );
        let response: TokenResponse = self.http.get_json(&url, &[])?;
        response
            .token
            .or(response.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PullError::Json {
                url,
                message: "token response carries no token".to_string(),
            })
    }

    /// Authenticate against `repository` and return a session for it.
    pub fn session(&self, repository: &str) -> Result<Session<'_>> {
        let token = self.token(repository)?;
        debug!(repository, "token acquired");
        Ok(Session {
            client: self,
            repository: repository.to_string(),
            authorization: bearer(&token),
        })
    }

    fn repo_url(&self, repository: &str, tail: &str) -> String {
        format!("{}/v2/{}/{}", self.registry, repository, tail)
    }
}

/// A repository together with its bearer token.
pub struct Session<'a> {
    client: &'a RegistryClient,
    repository: String,
    authorization: String,
}

impl Session<'_> {
    /// Tags of the repository in registry order, without duplicates.
    pub fn list_tags(&self) -> Result<Vec<String>> {
        let url = self.client.repo_url(&self.repository, "tags/list");
        let list: TagList = self
            .client
            .http
            .get_json(&url, &[("Authorization", self.authorization.as_str())])?;
        let unique: IndexSet<String> = list.tags.unwrap_or_default().into_iter().collect();
        Ok(unique.into_iter().collect())
    }

    /// Fetch the manifest at `reference` (tag or digest).
    pub fn manifest(&self, reference: &str, accept: &[&str]) -> Result<Manifest> {
        let url = self
            .client
            .repo_url(&self.repository, &format!("manifests/{}", reference));
        let accept = accept.join(", ");
        let document = self.client.http.get_document(
            &url,
            &[("Authorization", self.authorization.as_str()), ("Accept", accept.as_str())],
        )?;
        Manifest::parse(&document.body, document.content_type.as_deref()).map_err(|e| match e {
            PullError::Json { message, .. } => PullError::Json { url, message },
            other => other,
        })
    }

    /// URL of a blob in this repository.
    pub fn blob_url(&self, digest: &str) -> String {
        self.client
            .repo_url(&self.repository, &format!("blobs/{}", digest))
    }

    /// Stream a blob into `writer`, returning its size.
    pub fn stream_blob<W: Write>(
        &self,
        digest: &str,
        writer: W,
        label: &str,
        progress: &mut dyn ProgressObserver,
    ) -> Result<u64> {
        self.client.streamer.stream_to(
            &self.blob_url(digest),
            &[("Authorization", self.authorization.as_str())],
            writer,
            label,
            progress,
        )
    }
}

impl ManifestSource for Session<'_> {
    fn fetch_manifest(&self, repository: &str, reference: &str, accept: &[&str]) -> Result<Manifest> {
        debug_assert_eq!(repository, self.repository);
        self.manifest(reference, accept)
    }
}
