//! Artifact acquisition from npm and container registries
//!
//! Two engines share one HTTP client, one download root and one
//! streaming path:
//!
//! - [`npm`] resolves a package and every transitive dependency to the
//!   highest satisfying version and downloads each tarball once.
//! - [`docker`] resolves an image reference through its platform index to a
//!   concrete manifest and packs the layers and config into one archive.
//!
//! # Example
//!
//! ```no_run
//! use levitate_pull::npm::{DependencyWalker, NpmRegistry};
//! use levitate_pull::Config;
//!
//! let config = Config::default();
//! let mut walker = DependencyWalker::new(NpmRegistry::new(&config), config.npm_dir());
//! let report = walker.acquire("left-pad", "1.3.0")?;
//! println!("{} tarball(s)", report.artifacts.len());
//! # Ok::<(), levitate_pull::PullError>(())
//! ```

pub mod blob;
pub mod core;
pub mod docker;
pub mod npm;
pub mod version;

pub use self::core::config::Config;
pub use self::core::error::{PullError, Result};
pub use self::core::output;
pub use self::core::progress::{ProgressObserver, Silent, TerminalProgress};
