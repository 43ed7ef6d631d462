//! Image pulls
//!
//! Token, tag, manifest, then one blob at a time into the archive. A layer
//! that cannot be fetched is reported and skipped; the archive is still
//! finalized with every entry that did arrive.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::archive::{layer_entry_name, ArchiveAssembler, CONFIG_ENTRY};
use super::manifest::resolve_manifest;
use super::reference::ImageReference;
use super::registry::{RegistryClient, Session};
use super::select::Selector;
use crate::core::config::Config;
use crate::core::error::{PullError, Result};
use crate::core::output;
use crate::core::progress::{ProgressObserver, Silent};

/// A blob that did not make it into the archive.
#[derive(Debug, Clone)]
pub struct BlobFailure {
    pub digest: String,
    pub message: String,
}

/// Outcome of one image pull.
#[derive(Debug, Clone)]
pub struct PullReport {
    /// Reference with the tag that was actually pulled
    pub image: ImageReference,
    pub archive: PathBuf,
    /// Entry names written, in archive order
    pub entries: Vec<String>,
    pub layers_total: usize,
    pub layers_written: usize,
    pub config_written: bool,
    pub failures: Vec<BlobFailure>,
}

impl PullReport {
    /// True if every layer and the config are in the archive.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.config_written && self.layers_written == self.layers_total
    }
}

/// Pulls images into `{image_dir}/{repository}_{tag}.tar`.
pub struct ImagePuller {
    client: RegistryClient,
    dest_dir: PathBuf,
    progress: Box<dyn ProgressObserver>,
}

impl ImagePuller {
    pub fn new(config: &Config) -> Self {
        Self {
            client: RegistryClient::new(config),
            dest_dir: config.image_dir(),
            progress: Box::new(Silent),
        }
    }

    /// Report transfer progress to `progress`.
    pub fn with_progress(mut self, progress: Box<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// List the tags of an image's repository.
    pub fn list_tags(&self, image: &ImageReference) -> Result<Vec<String>> {
        self.client.session(&image.repository)?.list_tags()
    }

    /// Pull `image`, asking `selector` for anything the reference leaves open.
    pub fn pull(&mut self, image: &ImageReference, selector: &mut dyn Selector) -> Result<PullReport> {
        let session = self.client.session(&image.repository)?;

        let image = match &image.tag {
            Some(_) => image.clone(),
            None => {
                let tags = session.list_tags()?;
                if tags.is_empty() {
                    return Err(PullError::NotFound(format!("{} has no tags", image)));
                }
                let tag = if tags.iter().any(|t| t == "latest") {
                    "latest".to_string()
                } else {
                    selector.select_tag(image, &tags).ok_or_else(|| {
                        PullError::NotFound(format!("no tag selected for {}", image))
                    })?
                };
                output::detail(&format!("using tag {}", tag));
                image.with_tag(tag)
            }
        };
        let reference = image.tag.clone().unwrap_or_default();

        let manifest = resolve_manifest(&session, &image, &reference, selector)?;
        output::detail(&format!(
            "{} layer(s), config {}",
            manifest.layers.len(),
            manifest.config.digest
        ));

        let archive_path = self.dest_dir.join(image.archive_name());
        let mut archive = ArchiveAssembler::begin(&archive_path)?;
        let mut failures = Vec::new();
        let mut added: HashSet<&str> = HashSet::new();
        let mut layers_written = 0;

        let total = manifest.layers.len();
        for (i, layer) in manifest.layers.iter().enumerate() {
            if !added.insert(layer.digest.as_str()) {
                continue;
            }
            let label = format!("layer {}/{}", i + 1, total);
            let entry = layer_entry_name(&layer.digest);
            let blob = Blob {
                digest: &layer.digest,
                entry: &entry,
                label: &label,
            };
            match stage_blob(&session, &mut archive, &self.dest_dir, self.progress.as_mut(), blob)? {
                Staged::Added => layers_written += 1,
                Staged::Failed(failure) => failures.push(failure),
            }
        }

        let blob = Blob {
            digest: &manifest.config.digest,
            entry: CONFIG_ENTRY,
            label: "config",
        };
        let config_written =
            match stage_blob(&session, &mut archive, &self.dest_dir, self.progress.as_mut(), blob)? {
                Staged::Added => true,
                Staged::Failed(failure) => {
                    failures.push(failure);
                    false
                }
            };

        let entries = archive.entries().to_vec();
        let archive = archive.finalize()?;

        Ok(PullReport {
            image,
            archive,
            entries,
            layers_total: added.len(),
            layers_written,
            config_written,
            failures,
        })
    }
}

/// One blob to place in the archive.
struct Blob<'a> {
    digest: &'a str,
    entry: &'a str,
    label: &'a str,
}

enum Staged {
    Added,
    Failed(BlobFailure),
}

/// Stage one blob on disk, then append it to the archive.
///
/// Fetch failures are reported and yield [`Staged::Failed`]; archive write
/// failures are returned, since they leave the archive unusable.
fn stage_blob(
    session: &Session<'_>,
    archive: &mut ArchiveAssembler,
    staging_dir: &Path,
    progress: &mut dyn ProgressObserver,
    blob: Blob<'_>,
) -> Result<Staged> {
    fs::create_dir_all(staging_dir)?;
    let mut staging = tempfile::tempfile_in(staging_dir)?;

    let size = match session.stream_blob(blob.digest, &mut staging, blob.label, progress) {
        Ok(size) => size,
        Err(err) => {
            output::warning(&format!("{} ({}): {}", blob.label, blob.digest, err));
            return Ok(Staged::Failed(BlobFailure {
                digest: blob.digest.to_string(),
                message: err.to_string(),
            }));
        }
    };

    rewind(&mut staging)?;
    archive.add_entry(blob.entry, size, &mut staging)?;
    Ok(Staged::Added)
}

fn rewind(file: &mut File) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}
