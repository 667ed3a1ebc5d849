//! # unmark
//!
//! Batch watermark removal for PDF documents.
//!
//! This library finds watermarks in PDF pages (stamped text, translucent
//! overlays, repeated logos, watermark layers and annotations) and removes
//! them while leaving the rest of each page untouched.
//!
//! ## Quick Start
//!
//! ```no_run
//! use unmark::{run_batch, CleanOptions};
//!
//! fn main() -> unmark::Result<()> {
//!     let options = CleanOptions::new().with_pattern("CONFIDENTIAL");
//!     let summary = run_batch("pdf_data", "clean_pdf_data", options)?;
//!
//!     println!("{} files cleaned", summary.succeeded());
//!     for warning in summary.warnings() {
//!         eprintln!("warning: {}", warning);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Pattern and opacity rules**: configurable strings or regexes, faint text
//! - **Repetition rules**: rotated text and images repeated across pages
//! - **Structural watermarks**: `/Artifact` marked content, optional content
//!   layers and `/Watermark` annotations
//! - **Safe rewriting**: anything that cannot be removed cleanly is reported
//!   and left in place; untouched documents are copied byte for byte
//! - **Parallel processing**: optional Rayon worker pool for directories

pub mod batch;
pub mod clean;
pub mod detect;
pub mod error;
pub mod model;
pub mod parser;

// Re-export commonly used types
pub use batch::{write_report, BatchRunner, DirectoryScanner, ScanEntry};
pub use clean::{CleanOptions, CleanOutcome, DocumentCleaner, WatermarkDetector};
pub use detect::{is_pdf_bytes, sniff_version};
pub use error::{Error, Result};
pub use model::{
    Candidate, DocumentReport, FileReport, FileStatus, Inspection, PageReport, Reason,
    RunSummary, Target,
};

use std::path::Path;

/// Remove watermarks from an in-memory PDF.
///
/// # Example
///
/// ```no_run
/// use unmark::{clean_bytes, CleanOptions};
///
/// let data = std::fs::read("scan.pdf").unwrap();
/// let outcome = clean_bytes(&data, CleanOptions::new().with_pattern("DRAFT")).unwrap();
/// std::fs::write("scan.clean.pdf", &outcome.bytes).unwrap();
/// ```
pub fn clean_bytes(data: &[u8], options: CleanOptions) -> Result<CleanOutcome> {
    DocumentCleaner::new(options)?.clean_bytes(data)
}

/// Remove watermarks from a PDF file, returning the cleaned bytes.
pub fn clean_file<P: AsRef<Path>>(path: P, options: CleanOptions) -> Result<CleanOutcome> {
    DocumentCleaner::new(options)?.clean_file(path)
}

/// List the watermark candidates of a PDF file without changing it.
///
/// # Example
///
/// ```no_run
/// use unmark::{inspect_file, CleanOptions};
///
/// let inspection = inspect_file("report.pdf", CleanOptions::new()).unwrap();
/// for page in &inspection.pages {
///     for candidate in &page.candidates {
///         println!("page {}: {} ({})", page.number, candidate.label, candidate.describe());
///     }
/// }
/// ```
pub fn inspect_file<P: AsRef<Path>>(path: P, options: CleanOptions) -> Result<Inspection> {
    DocumentCleaner::new(options)?.inspect_file(path)
}

/// Clean every PDF in `input_dir` into `output_dir`.
///
/// The output directory is created when missing. Individual files that
/// cannot be processed are recorded in the summary without stopping the run.
pub fn run_batch<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_dir: Q,
    options: CleanOptions,
) -> Result<RunSummary> {
    BatchRunner::new(options)?.run(input_dir, output_dir)
}
