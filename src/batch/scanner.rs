//! Input directory enumeration.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One item produced by [`DirectoryScanner::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    /// A readable PDF candidate
    Document(PathBuf),

    /// A PDF that could not be opened for reading
    Skipped { path: PathBuf, reason: String },
}

impl ScanEntry {
    pub fn path(&self) -> &Path {
        match self {
            ScanEntry::Document(path) => path,
            ScanEntry::Skipped { path, .. } => path,
        }
    }
}

/// Lists the `.pdf` files directly inside a directory, sorted by name.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    root: PathBuf,
}

impl DirectoryScanner {
    /// Fails with [`Error::NotFound`] unless `root` is an existing directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::NotFound(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the directory again and iterate its PDFs in lexicographic order.
    ///
    /// Files are only opened as the iterator reaches them.
    pub fn entries(&self) -> Result<ScanIter> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.root)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(self.root.clone()),
                _ => Error::Io(e),
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_pdf_extension(path))
            .collect();
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        log::debug!("{}: {} PDF files", self.root.display(), paths.len());
        Ok(ScanIter {
            paths: paths.into_iter(),
        })
    }
}

/// Iterator returned by [`DirectoryScanner::entries`].
#[derive(Debug)]
pub struct ScanIter {
    paths: std::vec::IntoIter<PathBuf>,
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        let path = self.paths.next()?;
        Some(match File::open(&path) {
            Ok(_) => ScanEntry::Document(path),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                ScanEntry::Skipped {
                    path,
                    reason: e.to_string(),
                }
            }
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}

impl ExactSizeIterator for ScanIter {}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}
