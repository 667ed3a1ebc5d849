//! Watermark detection and removal for single documents.

mod cleaner;
mod detector;
mod options;
mod remover;

pub use cleaner::{CleanOutcome, DocumentCleaner};
pub use detector::{PatternSet, RepetitionIndex, WatermarkDetector};
pub use options::CleanOptions;
pub use remover::{remove_candidates, Removal};
