//! Batch processing of input directories.

mod runner;
mod scanner;

pub use runner::{write_report, BatchRunner, Observer};
pub use scanner::{DirectoryScanner, ScanEntry, ScanIter};
