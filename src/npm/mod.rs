//! npm package acquisition
//!
//! [`registry`] talks to the package registry, [`walker`] follows the
//! dependency graph and [`spec`] parses user-supplied package identifiers.

pub mod registry;
pub mod spec;
pub mod walker;

pub use registry::{NpmRegistry, PackageSource, Packument, VersionManifest};
pub use spec::{PackageSpec, Requested};
pub use walker::{ArtifactStatus, DependencyWalker, PackageId, ResolvedArtifact, WalkIssue, WalkReport};
