//! Image archive assembly
//!
//! Layers are stored as opaque `.tar.gz` entries named after their digest,
//! followed by the image config as `config.json`. Entry headers carry fixed
//! mode and mtime so the same blobs always produce the same archive.
//!
//! The archive is written to a temporary file beside its destination and
//! renamed into place by [`ArchiveAssembler::finalize`].

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::error::{PullError, Result};

/// Fixed entry name of the image configuration
pub const CONFIG_ENTRY: &str = "config.json";

/// Archive entry name for a layer digest.
///
/// `sha256:ab12` becomes `sha256_ab12.tar.gz`.
pub fn layer_entry_name(digest: &str) -> String {
    let safe: String = digest
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}.tar.gz", safe)
}

/// An archive being assembled.
pub struct ArchiveAssembler {
    builder: Builder<NamedTempFile>,
    dest: PathBuf,
    entries: Vec<String>,
}

impl ArchiveAssembler {
    /// Start an archive that will be placed at `dest`.
    pub fn begin(dest: &Path) -> Result<Self> {
        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let staging = NamedTempFile::new_in(dir)?;
        Ok(Self {
            builder: Builder::new(staging),
            dest: dest.to_path_buf(),
            entries: Vec::new(),
        })
    }

    /// Append one entry of `size` bytes read from `data`.
    pub fn add_entry<R: Read>(&mut self, name: &str, size: u64, data: R) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(size);
        header.set_mode(0o644);
        header.set_mtime(0);
        self.builder.append_data(&mut header, name, data)?;
        self.entries.push(name.to_string());
        debug!(entry = name, size, "archive entry added");
        Ok(())
    }

    /// Entry names in the order they were added.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Write the trailer and move the archive to its destination.
    pub fn finalize(self) -> Result<PathBuf> {
        let staging = self.builder.into_inner()?;
        staging.as_file().sync_all()?;
        staging
            .persist(&self.dest)
            .map_err(|e| PullError::Io(e.error))?;
        Ok(self.dest)
    }
}
