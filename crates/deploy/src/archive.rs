//! Project packaging.
//!
//! [`Archiver`] walks the project root and writes every entry the
//! [`IgnoreRuleSet`] lets through into a gzip-compressed tarball. The
//! result is returned as an [`ArchiveFile`], which deletes itself when
//! dropped so the tarball never outlives the command that built it.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::Builder;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ArchiveError;
use crate::ignore::IgnoreRuleSet;

/// Unique archive file name: `shiplio-<unix millis>-<random>.tar.gz`.
pub fn archive_name() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("shiplio-{millis}-{}.tar.gz", &suffix[..8])
}

/// A tarball on disk, removed when this handle is dropped.
#[derive(Debug)]
pub struct ArchiveFile {
    path: PathBuf,
    entries: usize,
}

impl ArchiveFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries written, directories included.
    pub fn entries(&self) -> usize {
        self.entries
    }
}

impl Drop for ArchiveFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "archive removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "failed to remove archive: {e}"),
        }
    }
}

/// Packs a project directory.
pub struct Archiver {
    root: PathBuf,
    rules: IgnoreRuleSet,
}

impl Archiver {
    pub fn new(root: impl Into<PathBuf>, rules: IgnoreRuleSet) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    /// Writes the archive to `dest`.
    ///
    /// The root is always walked; it has no entry of its own since its
    /// relative path is empty. Symlinks are stored as links, not followed.
    /// On error the partial file is removed.
    pub fn create(&self, dest: &Path) -> Result<ArchiveFile, ArchiveError> {
        fs::read_dir(&self.root).map_err(|source| ArchiveError::RootUnreadable {
            path: self.root.clone(),
            source,
        })?;

        let file = File::create(dest).map_err(|source| ArchiveError::Destination {
            path: dest.to_path_buf(),
            source,
        })?;
        let mut archive = ArchiveFile {
            path: dest.to_path_buf(),
            entries: 0,
        };

        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = Builder::new(encoder);
        builder.follow_symlinks(false);

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                !self.rules.is_ignored(rel, entry.file_type().is_dir())
            });

        for entry in walker {
            let entry = entry?;
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            if entry.file_type().is_dir() {
                builder.append_dir(rel, entry.path())?;
            } else {
                builder.append_path_with_name(entry.path(), rel)?;
            }
            archive.entries += 1;
        }

        let writer = builder.into_inner()?.finish()?;
        writer.into_inner().map_err(io::IntoInnerError::into_error)?;

        debug!(
            root = %self.root.display(),
            dest = %dest.display(),
            entries = archive.entries,
            "archive created"
        );
        Ok(archive)
    }
}
