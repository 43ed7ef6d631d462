//! Container image acquisition
//!
//! References are parsed by [`reference`], manifests resolved by
//! [`manifest`] against a [`registry`] session, and [`puller`] streams the
//! blobs into a single archive built by [`archive`].

pub mod archive;
pub mod manifest;
pub mod puller;
pub mod reference;
pub mod registry;
pub mod select;

pub use archive::{ArchiveAssembler, CONFIG_ENTRY};
pub use manifest::{ConcreteManifest, Descriptor, Manifest, ManifestSource, Platform, PlatformEntry, ResolutionState};
pub use puller::{BlobFailure, ImagePuller, PullReport};
pub use reference::ImageReference;
pub use registry::{RegistryClient, Session};
pub use select::{PlatformPreference, Selector};
