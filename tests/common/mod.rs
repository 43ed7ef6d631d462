//! Mock registries shared by the integration tests.

#![allow(dead_code)]

use levitate_pull::Config;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;
use tar::Archive;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";
pub const SERVICE: &str = "registry.test";

// ==================== npm ====================

pub fn npm_config(server: &MockServer, root: &Path) -> Config {
    Config::default()
        .with_npm_registry(server.uri())
        .with_download_dir(root)
}

/// Tarball URL the way the public registry lays it out.
pub fn tarball_url(server: &MockServer, name: &str, version: &str) -> String {
    format!("{}{}", server.uri(), tarball_path(name, version))
}

pub fn tarball_path(name: &str, version: &str) -> String {
    let base = name.rsplit('/').next().unwrap_or(name);
    format!("/{}/-/{}-{}.tgz", name, base, version)
}

pub fn tarball_body(name: &str, version: &str) -> Vec<u8> {
    format!("tarball {}@{}", name, version).into_bytes()
}

/// Metadata document of one version.
pub fn version_doc(server: &MockServer, name: &str, version: &str, deps: &[(&str, &str)]) -> Value {
    let dependencies: Map<String, Value> = deps
        .iter()
        .map(|(n, r)| (n.to_string(), json!(r)))
        .collect();
    json!({
        "name": name,
        "version": version,
        "dependencies": dependencies,
        "dist": { "tarball": tarball_url(server, name, version) }
    })
}

/// Packument listing `versions`; the last one is tagged `latest`.
pub fn packument(server: &MockServer, name: &str, versions: &[(&str, &[(&str, &str)])]) -> Value {
    let docs: Map<String, Value> = versions
        .iter()
        .map(|(v, deps)| (v.to_string(), version_doc(server, name, v, deps)))
        .collect();
    let latest = versions.last().map(|(v, _)| *v).unwrap_or("0.0.0");
    json!({
        "name": name,
        "dist-tags": { "latest": latest },
        "versions": docs
    })
}

pub fn encoded(name: &str) -> String {
    name.replace('/', "%2F")
}

pub fn packument_mock(server: &MockServer, name: &str, versions: &[(&str, &[(&str, &str)])]) -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/{}", encoded(name))))
        .respond_with(ResponseTemplate::new(200).set_body_json(packument(server, name, versions)))
}

pub fn version_mock(server: &MockServer, name: &str, version: &str, deps: &[(&str, &str)]) -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/{}/{}", encoded(name), version)))
        .respond_with(ResponseTemplate::new(200).set_body_json(version_doc(server, name, version, deps)))
}

pub fn tarball_mock(name: &str, version: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(tarball_path(name, version)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball_body(name, version)))
}

// ==================== images ====================

pub fn docker_config(server: &MockServer, root: &Path) -> Config {
    Config::default()
        .with_docker_registry(server.uri())
        .with_docker_auth(format!("{}/token", server.uri()), SERVICE)
        .with_download_dir(root)
}

pub async fn mount_token(server: &MockServer, repository: &str) {
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", SERVICE))
        .and(query_param("scope", format!("repository:{}:pull", repository)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": TOKEN })))
        .mount(server)
        .await;
}

pub fn index_body(entries: &[(&str, &str, &str)]) -> String {
    let manifests: Vec<Value> = entries
        .iter()
        .map(|(digest, os, arch)| {
            json!({
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": digest,
                "size": 500,
                "platform": { "os": os, "architecture": arch }
            })
        })
        .collect();
    json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.index.v1+json",
        "manifests": manifests
    })
    .to_string()
}

/// Concrete manifest without a `mediaType` field; callers choose the header.
pub fn concrete_body(config: &str, layers: &[&str]) -> String {
    let layers: Vec<Value> = layers
        .iter()
        .map(|digest| {
            json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": digest,
                "size": 32
            })
        })
        .collect();
    json!({
        "schemaVersion": 2,
        "config": {
            "mediaType": "application/vnd.oci.image.config.v1+json",
            "digest": config,
            "size": 2
        },
        "layers": layers
    })
    .to_string()
}

pub fn manifest_mock(repository: &str, reference: &str, body: String, media_type: &str) -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/manifests/{}", repository, reference)))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, media_type))
}

pub fn blob_mock(repository: &str, digest: &str, body: &[u8]) -> Mock {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{}/blobs/{}", repository, digest)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
}

/// Entries of a tar archive as (name, contents).
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
    use std::io::Read;

    let mut archive = Archive::new(fs::File::open(path).unwrap());
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (name, data)
        })
        .collect()
}
