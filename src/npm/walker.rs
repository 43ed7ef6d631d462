//! Dependency graph walker
//!
//! Walks a package's transitive dependencies and downloads every distinct
//! (name, version) exactly once. Traversal uses an explicit stack instead of
//! recursion, so deep chains cannot exhaust the call stack.
//!
//! An identity is recorded as seen *before* any I/O for it happens. That
//! makes cycles and diamonds terminate, and makes a repeated request a no-op.
//!
//! Failures are isolated per dependency edge: a range nothing satisfies, or
//! a metadata or download error below the root, becomes a [`WalkIssue`] and
//! the remaining edges are still processed. Only a failure of the root
//! package itself is returned as an error.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::registry::{tarball_filename, PackageSource, Packument, VersionManifest};
use super::spec::{PackageSpec, Requested};
use crate::core::error::{PullError, Result};
use crate::core::output;
use crate::core::progress::{ProgressObserver, Silent};
use crate::version;

/// Exact identity of one downloadable package artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// How an artifact ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStatus {
    /// Fetched during this walk
    Downloaded,
    /// The destination file already existed; no request was made
    AlreadyPresent,
}

/// A package tarball that is now on disk.
#[derive(Debug, Clone)]
pub struct ResolvedArtifact {
    pub id: PackageId,
    pub source_url: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub status: ArtifactStatus,
}

/// A non-fatal problem with one dependency edge.
#[derive(Debug, Clone)]
pub enum WalkIssue {
    /// No published version satisfies the range
    Unsatisfied {
        dependent: PackageId,
        target: String,
        range: String,
    },
    /// Metadata or tarball could not be fetched
    Failed {
        dependent: PackageId,
        target: String,
        message: String,
    },
}

impl fmt::Display for WalkIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WalkIssue::Unsatisfied {
                dependent,
                target,
                range,
            } => write!(
                f,
                "no version of {} satisfies '{}' (required by {})",
                target, range, dependent
            ),
            WalkIssue::Failed {
                dependent,
                target,
                message,
            } => write!(f, "{} (required by {}): {}", target, dependent, message),
        }
    }
}

/// Outcome of one top-level acquisition.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    pub artifacts: Vec<ResolvedArtifact>,
    pub issues: Vec<WalkIssue>,
}

impl WalkReport {
    pub fn downloaded(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::Downloaded)
    }

    pub fn already_present(&self) -> impl Iterator<Item = &ResolvedArtifact> {
        self.artifacts
            .iter()
            .filter(|a| a.status == ArtifactStatus::AlreadyPresent)
    }

    /// Number of edges whose range matched no published version
    pub fn unsatisfied_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, WalkIssue::Unsatisfied { .. }))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// A dependency edge waiting to be followed.
#[derive(Debug, Clone)]
struct Edge {
    dependent: PackageId,
    target: String,
    range: String,
    optional: bool,
}

/// Walks dependency graphs against a [`PackageSource`].
///
/// The seen-set belongs to the walker and lives as long as it does; reuse one
/// walker across a batch of top-level packages to share deduplication.
pub struct DependencyWalker<S: PackageSource> {
    source: S,
    dest_dir: PathBuf,
    seen: HashSet<PackageId>,
    progress: Box<dyn ProgressObserver>,
}

impl<S: PackageSource> DependencyWalker<S> {
    /// Create a walker that stores tarballs in `dest_dir`.
    pub fn new(source: S, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            dest_dir: dest_dir.into(),
            seen: HashSet::new(),
            progress: Box::new(Silent),
        }
    }

    /// Report transfer progress to `progress`.
    pub fn with_progress(mut self, progress: Box<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Identities handled so far, including ones that failed.
    pub fn seen(&self) -> &HashSet<PackageId> {
        &self.seen
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Acquire an exact version and everything it depends on.
    ///
    /// Returns immediately, without I/O, if the identity was already seen.
    pub fn acquire(&mut self, name: &str, version: &str) -> Result<WalkReport> {
        let id = PackageId::new(name, version);
        if !self.mark_seen(&id) {
            return Ok(WalkReport::default());
        }
        let manifest = self.source.version_manifest(name, version)?;
        self.walk_from(id, manifest)
    }

    /// Acquire whatever a parsed identifier designates.
    pub fn acquire_spec(&mut self, spec: &PackageSpec) -> Result<WalkReport> {
        match &spec.requested {
            Requested::Exact(version) => self.acquire(&spec.name, version),
            Requested::Range(_) | Requested::Tag(_) => {
                let packument = self.source.packument(&spec.name)?;
                let version = requested_version(spec, &packument)?;
                let id = PackageId::new(&spec.name, &version);
                if !self.mark_seen(&id) {
                    return Ok(WalkReport::default());
                }
                let manifest = take_version(packument, &id)?;
                self.walk_from(id, manifest)
            }
        }
    }

    /// Download the root, then follow its edges depth-first in declared order.
    fn walk_from(&mut self, root: PackageId, manifest: VersionManifest) -> Result<WalkReport> {
        let mut report = WalkReport::default();

        let artifact = self.materialize(&root, &manifest)?;
        report.artifacts.push(artifact);

        let mut stack: Vec<Edge> = Vec::new();
        push_edges(&mut stack, &root, &manifest);

        while let Some(edge) = stack.pop() {
            match self.follow(&edge) {
                Ok(Some((id, manifest, artifact))) => {
                    report.artifacts.push(artifact);
                    push_edges(&mut stack, &id, &manifest);
                }
                Ok(None) => {}
                Err(err) => {
                    let issue = if err.is_not_found() {
                        WalkIssue::Unsatisfied {
                            dependent: edge.dependent.clone(),
                            target: edge.target.clone(),
                            range: edge.range.clone(),
                        }
                    } else {
                        WalkIssue::Failed {
                            dependent: edge.dependent.clone(),
                            target: edge.target.clone(),
                            message: err.to_string(),
                        }
                    };
                    if edge.optional {
                        output::detail(&format!("skipping optional {}", issue));
                    } else {
                        output::warning(&issue.to_string());
                    }
                    report.issues.push(issue);
                }
            }
        }

        Ok(report)
    }

    /// Resolve one edge. `Ok(None)` means the resolved identity was already seen.
    fn follow(
        &mut self,
        edge: &Edge,
    ) -> Result<Option<(PackageId, VersionManifest, ResolvedArtifact)>> {
        let packument = self.source.packument(&edge.target)?;
        let version = pick_version(&edge.target, &packument, &edge.range)?;
        let id = PackageId::new(&edge.target, &version);
        if !self.mark_seen(&id) {
            debug!(%id, "already seen");
            return Ok(None);
        }
        let manifest = take_version(packument, &id)?;
        let artifact = self.materialize(&id, &manifest)?;
        Ok(Some((id, manifest, artifact)))
    }

    /// Put the tarball on disk unless it is already there.
    fn materialize(&mut self, id: &PackageId, manifest: &VersionManifest) -> Result<ResolvedArtifact> {
        let url = &manifest.dist.tarball;
        let filename = tarball_filename(url)?;
        let local_path = self.dest_dir.join(&filename);

        if local_path.exists() {
            let size_bytes = fs::metadata(&local_path)?.len();
            debug!(%id, path = %local_path.display(), "cache hit");
            output::skip(&format!("{} already present, skipping", filename));
            return Ok(ResolvedArtifact {
                id: id.clone(),
                source_url: url.clone(),
                local_path,
                size_bytes,
                status: ArtifactStatus::AlreadyPresent,
            });
        }

        output::detail(&format!("downloading {}", id));
        let size_bytes = self
            .source
            .download(url, &local_path, self.progress.as_mut())?;
        output::detail(&format!("downloaded {} ({} bytes)", filename, size_bytes));

        Ok(ResolvedArtifact {
            id: id.clone(),
            source_url: url.clone(),
            local_path,
            size_bytes,
            status: ArtifactStatus::Downloaded,
        })
    }

    /// Record `id`; false if it was already present.
    fn mark_seen(&mut self, id: &PackageId) -> bool {
        self.seen.insert(id.clone())
    }
}

/// Push a package's edges so that the first declared edge is popped first.
fn push_edges(stack: &mut Vec<Edge>, dependent: &PackageId, manifest: &VersionManifest) {
    let edges: Vec<Edge> = manifest
        .edges()
        .map(|(target, range, optional)| Edge {
            dependent: dependent.clone(),
            target: target.to_string(),
            range: range.to_string(),
            optional,
        })
        .collect();
    stack.extend(edges.into_iter().rev());
}

/// Version a top-level range or dist-tag designates.
fn requested_version(spec: &PackageSpec, packument: &Packument) -> Result<String> {
    match &spec.requested {
        Requested::Tag(tag) => packument.dist_tags.get(tag).cloned().ok_or_else(|| {
            PullError::NotFound(format!("{} has no dist-tag '{}'", spec.name, tag))
        }),
        Requested::Range(range) | Requested::Exact(range) => {
            pick_version(&spec.name, packument, range)
        }
    }
}

/// Choose a version for `range`, honoring dist-tags first.
fn pick_version(name: &str, packument: &Packument, range: &str) -> Result<String> {
    if let Some(tagged) = packument.dist_tags.get(range.trim()) {
        return Ok(tagged.clone());
    }
    version::resolve(name, packument.versions.keys(), range)
}

fn take_version(mut packument: Packument, id: &PackageId) -> Result<VersionManifest> {
    packument
        .versions
        .swap_remove(&id.version)
        .ok_or_else(|| PullError::NotFound(format!("{} is not published", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::npm::registry::Dist;
    use indexmap::IndexMap;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// In-memory registry that counts every call.
    #[derive(Default)]
    struct FakeRegistry {
        packages: HashMap<String, Packument>,
        failing_downloads: HashSet<String>,
        packument_calls: RefCell<Vec<String>>,
        manifest_calls: RefCell<Vec<String>>,
        downloads: RefCell<Vec<String>>,
    }

    impl FakeRegistry {
        fn publish(&mut self, name: &str, version: &str, deps: &[(&str, &str)]) {
            let manifest = VersionManifest {
                name: name.to_string(),
                version: version.to_string(),
                dependencies: deps
                    .iter()
                    .map(|(n, r)| (n.to_string(), r.to_string()))
                    .collect(),
                optional_dependencies: IndexMap::new(),
                dist: Dist {
                    tarball: format!("https://registry.test/{0}/-/{0}-{1}.tgz", name, version),
                },
            };
            let entry = self.packages.entry(name.to_string()).or_default();
            entry.name = name.to_string();
            entry.dist_tags.insert("latest".to_string(), version.to_string());
            entry.versions.insert(version.to_string(), manifest);
        }

        fn download_count(&self) -> usize {
            self.downloads.borrow().len()
        }
    }

    impl PackageSource for FakeRegistry {
        fn packument(&self, name: &str) -> Result<Packument> {
            self.packument_calls.borrow_mut().push(name.to_string());
            self.packages.get(name).cloned().ok_or(PullError::Status {
                url: format!("https://registry.test/{}", name),
                code: 404,
            })
        }

        fn version_manifest(&self, name: &str, version: &str) -> Result<VersionManifest> {
            self.manifest_calls
                .borrow_mut()
                .push(format!("{}@{}", name, version));
            self.packages
                .get(name)
                .and_then(|p| p.versions.get(version))
                .cloned()
                .ok_or(PullError::Status {
                    url: format!("https://registry.test/{}/{}", name, version),
                    code: 404,
                })
        }

        fn download(
            &self,
            url: &str,
            dest: &Path,
            progress: &mut dyn ProgressObserver,
        ) -> Result<u64> {
            self.downloads.borrow_mut().push(url.to_string());
            if self.failing_downloads.contains(url) {
                return Err(PullError::Transport {
                    url: url.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            progress.start(url, Some(4));
            fs::create_dir_all(dest.parent().unwrap())?;
            fs::write(dest, b"tgz!")?;
            progress.advance(4);
            progress.finish();
            Ok(4)
        }
    }

    fn walker(registry: FakeRegistry) -> (TempDir, DependencyWalker<FakeRegistry>) {
        let dir = TempDir::new().unwrap();
        let walker = DependencyWalker::new(registry, dir.path().join("npm-packages"));
        (dir, walker)
    }

    // ==================== Basic acquisition ====================

    #[test]
    fn test_single_package_without_dependencies() {
        let mut registry = FakeRegistry::default();
        registry.publish("leftpad", "1.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("leftpad", "1.0.0").unwrap();

        assert_eq!(walker.source().manifest_calls.borrow().len(), 1);
        assert_eq!(walker.source().download_count(), 1);
        assert_eq!(walker.seen().len(), 1);
        assert_eq!(report.artifacts.len(), 1);
        assert!(report.is_clean());
        assert!(walker.dest_dir().join("leftpad-1.0.0.tgz").exists());
    }

    #[test]
    fn test_transitive_dependencies_resolved_to_max() {
        let mut registry = FakeRegistry::default();
        registry.publish("app", "1.0.0", &[("lib", "^1.0.0")]);
        registry.publish("lib", "1.0.0", &[]);
        registry.publish("lib", "1.4.0", &[("util", "~0.2.0")]);
        registry.publish("lib", "2.0.0", &[]);
        registry.publish("util", "0.2.7", &[]);
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("app", "1.0.0").unwrap();

        let ids: Vec<String> = report.artifacts.iter().map(|a| a.id.to_string()).collect();
        assert_eq!(ids, vec!["app@1.0.0", "lib@1.4.0", "util@0.2.7"]);
    }

    #[test]
    fn test_depth_first_declared_order() {
        let mut registry = FakeRegistry::default();
        registry.publish("a", "1.0.0", &[("b", "1.0.0"), ("c", "1.0.0")]);
        registry.publish("b", "1.0.0", &[("d", "1.0.0")]);
        registry.publish("c", "1.0.0", &[]);
        registry.publish("d", "1.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("a", "1.0.0").unwrap();

        let names: Vec<&str> = report.artifacts.iter().map(|a| a.id.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "d", "c"]);
    }

    // ==================== Deduplication ====================

    #[test]
    fn test_second_acquire_is_noop() {
        let mut registry = FakeRegistry::default();
        registry.publish("leftpad", "1.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        walker.acquire("leftpad", "1.0.0").unwrap();
        let second = walker.acquire("leftpad", "1.0.0").unwrap();

        assert!(second.artifacts.is_empty());
        assert_eq!(walker.source().manifest_calls.borrow().len(), 1);
        assert_eq!(walker.source().download_count(), 1);
    }

    #[test]
    fn test_cycle_terminates() {
        let mut registry = FakeRegistry::default();
        registry.publish("a", "1.0.0", &[("b", "^1.0.0")]);
        registry.publish("b", "1.0.0", &[("a", "^1.0.0")]);
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("a", "1.0.0").unwrap();

        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(walker.source().download_count(), 2);
        assert_eq!(walker.seen().len(), 2);
    }

    #[test]
    fn test_diamond_downloads_shared_dependency_once() {
        let mut registry = FakeRegistry::default();
        registry.publish("top", "1.0.0", &[("left", "1.0.0"), ("right", "1.0.0")]);
        registry.publish("left", "1.0.0", &[("base", "^1.0.0")]);
        registry.publish("right", "1.0.0", &[("base", "~1.1.0")]);
        registry.publish("base", "1.1.3", &[]);
        let (_dir, mut walker) = walker(registry);

        walker.acquire("top", "1.0.0").unwrap();

        let downloads = walker.source().downloads.borrow();
        let base = downloads.iter().filter(|u| u.contains("base-1.1.3")).count();
        assert_eq!(base, 1);
        assert_eq!(downloads.len(), 4);
    }

    // ==================== Failure isolation ====================

    #[test]
    fn test_unsatisfied_edge_does_not_stop_siblings() {
        let mut registry = FakeRegistry::default();
        registry.publish("app", "1.0.0", &[("one", "^1.0.0"), ("two", "^9.0.0"), ("three", "*")]);
        registry.publish("one", "1.0.0", &[]);
        registry.publish("two", "1.0.0", &[]);
        registry.publish("three", "3.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("app", "1.0.0").unwrap();

        assert_eq!(report.unsatisfied_count(), 1);
        assert_eq!(report.issues.len(), 1);
        let names: Vec<&str> = report.artifacts.iter().map(|a| a.id.name.as_str()).collect();
        assert_eq!(names, vec!["app", "one", "three"]);
    }

    #[test]
    fn test_failed_download_is_isolated() {
        let mut registry = FakeRegistry::default();
        registry.publish("app", "1.0.0", &[("broken", "1.0.0"), ("fine", "1.0.0")]);
        registry.publish("broken", "1.0.0", &[]);
        registry.publish("fine", "1.0.0", &[]);
        registry
            .failing_downloads
            .insert("https://registry.test/broken/-/broken-1.0.0.tgz".to_string());
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("app", "1.0.0").unwrap();

        assert_eq!(report.artifacts.len(), 2);
        assert!(matches!(&report.issues[..], [WalkIssue::Failed { target, .. }] if target == "broken"));
    }

    #[test]
    fn test_missing_dependency_package_is_isolated() {
        let mut registry = FakeRegistry::default();
        registry.publish("app", "1.0.0", &[("ghost", "^1.0.0"), ("real", "1.0.0")]);
        registry.publish("real", "1.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let report = walker.acquire("app", "1.0.0").unwrap();

        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.unsatisfied_count(), 0);
    }

    #[test]
    fn test_root_failure_is_error() {
        let (_dir, mut walker) = walker(FakeRegistry::default());
        assert!(walker.acquire("ghost", "1.0.0").is_err());
    }

    // ==================== Cache short-circuit ====================

    #[test]
    fn test_existing_file_skips_download() {
        let mut registry = FakeRegistry::default();
        registry.publish("leftpad", "1.0.0", &[]);
        let (_dir, mut walker) = walker(registry);
        fs::create_dir_all(walker.dest_dir()).unwrap();
        fs::write(walker.dest_dir().join("leftpad-1.0.0.tgz"), b"cached bytes").unwrap();

        let report = walker.acquire("leftpad", "1.0.0").unwrap();

        assert_eq!(walker.source().download_count(), 0);
        assert_eq!(report.already_present().count(), 1);
        assert_eq!(report.artifacts[0].size_bytes, 12);
    }

    // ==================== Specs ====================

    #[test]
    fn test_acquire_spec_latest_tag() {
        let mut registry = FakeRegistry::default();
        registry.publish("leftpad", "1.0.0", &[]);
        registry.publish("leftpad", "1.1.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let spec = PackageSpec::parse("leftpad").unwrap();
        let report = walker.acquire_spec(&spec).unwrap();

        assert_eq!(report.artifacts[0].id, PackageId::new("leftpad", "1.1.0"));
        assert!(walker.source().manifest_calls.borrow().is_empty());
    }

    #[test]
    fn test_acquire_spec_range() {
        let mut registry = FakeRegistry::default();
        registry.publish("leftpad", "1.0.0", &[]);
        registry.publish("leftpad", "1.1.0", &[]);
        registry.publish("leftpad", "2.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let spec = PackageSpec::parse("leftpad@~1.0.0").unwrap();
        let report = walker.acquire_spec(&spec).unwrap();

        assert_eq!(report.artifacts[0].id.version, "1.0.0");
    }

    #[test]
    fn test_acquire_spec_unknown_tag_is_not_found() {
        let mut registry = FakeRegistry::default();
        registry.publish("leftpad", "1.0.0", &[]);
        let (_dir, mut walker) = walker(registry);

        let spec = PackageSpec::parse("leftpad@canary").unwrap();
        let err = walker.acquire_spec(&spec).unwrap_err();
        assert!(err.is_not_found());
    }
}
