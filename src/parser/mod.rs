//! PDF access and content stream interpretation.

mod backend;
mod fingerprint;
mod interpreter;
mod matrix;

pub use backend::{decode_operations, decode_text_simple, PageId, PdfDocument};
pub use fingerprint::{difference_hash, digest, hamming_distance, image_hash};
pub use interpreter::{scan_page, PageScan};
pub use matrix::Matrix;
