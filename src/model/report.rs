//! Per-page, per-file and per-run results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of cleaning one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    /// Page number (1-indexed)
    pub number: u32,

    /// Number of watermark candidates detected
    pub detected: usize,

    /// Number of candidates removed
    pub removed: usize,

    /// Candidates left in place, with the reason
    pub unsupported: Vec<String>,
}

impl PageReport {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    pub fn is_partial(&self) -> bool {
        !self.unsupported.is_empty()
    }
}

/// Outcome of cleaning one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub page_count: u32,
    pub pages: Vec<PageReport>,
}

impl DocumentReport {
    pub fn detected(&self) -> usize {
        self.pages.iter().map(|p| p.detected).sum()
    }

    pub fn removed(&self) -> usize {
        self.pages.iter().map(|p| p.removed).sum()
    }

    /// Whether some candidate could not be removed.
    pub fn is_partial(&self) -> bool {
        self.pages.iter().any(PageReport::is_partial)
    }

    /// Whether the output differs from the input.
    pub fn is_modified(&self) -> bool {
        self.removed() > 0
    }
}

/// Final state of one scanned file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Watermarks removed
    Cleaned,
    /// Nothing detected; written unchanged
    Unchanged,
    /// Some watermarks could not be removed
    Partial,
    /// Could not be processed
    Failed,
    /// Not readable; never opened
    Skipped,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileStatus::Cleaned => "cleaned",
            FileStatus::Unchanged => "unchanged",
            FileStatus::Partial => "partial",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Outcome of one file in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// File name, shared by input and output
    pub name: String,

    pub input: PathBuf,

    /// Where the output was written, if anything was
    pub output: Option<PathBuf>,

    pub status: FileStatus,

    /// Page-level details for files that were opened
    pub document: Option<DocumentReport>,

    /// Failure or skip reason
    pub error: Option<String>,
}

impl FileReport {
    pub(crate) fn new(input: PathBuf, status: FileStatus) -> Self {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            name,
            input,
            output: None,
            status,
            document: None,
            error: None,
        }
    }

    /// Warning lines this file contributes to the run summary.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(ref error) = self.error {
            warnings.push(format!("{}: {} ({})", self.name, error, self.status));
        }
        if let Some(ref doc) = self.document {
            for page in &doc.pages {
                for reason in &page.unsupported {
                    warnings.push(format!("{}: page {}: {}", self.name, page.number, reason));
                }
            }
        }
        warnings
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,

    /// One entry per scanned file, in scan order
    pub files: Vec<FileReport>,
}

impl RunSummary {
    pub fn count(&self, status: FileStatus) -> usize {
        self.files.iter().filter(|f| f.status == status).count()
    }

    /// Files written to the output directory after processing.
    pub fn succeeded(&self) -> usize {
        self.count(FileStatus::Cleaned)
            + self.count(FileStatus::Unchanged)
            + self.count(FileStatus::Partial)
    }

    pub fn failed(&self) -> usize {
        self.count(FileStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(FileStatus::Skipped)
    }

    pub fn watermarks_removed(&self) -> usize {
        self.files
            .iter()
            .filter_map(|f| f.document.as_ref())
            .map(DocumentReport::removed)
            .sum()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.files.iter().flat_map(FileReport::warnings).collect()
    }
}
