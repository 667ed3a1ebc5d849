//! PDF header sniffing.
//!
//! Files are checked for the `%PDF-x.y` magic before they are handed to the
//! object parser, so a stray non-PDF file with a `.pdf` name is reported as
//! corrupt with a clear reason instead of a parser error.

use crate::error::{Error, Result};

/// PDF magic bytes: %PDF-
const PDF_MAGIC: &[u8] = b"%PDF-";
const VERSION_LEN: usize = 3; // e.g., "1.7"

/// Some producers prepend junk before the header; the PDF reference allows
/// the header anywhere in the first 1024 bytes.
const HEADER_SEARCH_WINDOW: usize = 1024;

/// Return the PDF version declared in the file header (e.g. `"1.7"`).
pub fn sniff_version(data: &[u8]) -> Result<String> {
    let window = &data[..data.len().min(HEADER_SEARCH_WINDOW)];
    let start = window
        .windows(PDF_MAGIC.len())
        .position(|w| w == PDF_MAGIC)
        .ok_or_else(|| Error::CorruptDocument("missing %PDF header".to_string()))?;

    let version_start = start + PDF_MAGIC.len();
    let version_bytes = data
        .get(version_start..version_start + VERSION_LEN)
        .ok_or_else(|| Error::CorruptDocument("truncated %PDF header".to_string()))?;
    let version = String::from_utf8_lossy(version_bytes).to_string();

    if !is_valid_version(version_bytes) {
        return Err(Error::UnsupportedVersion(version));
    }
    Ok(version)
}

/// Check if bytes start like a PDF file.
pub fn is_pdf_bytes(data: &[u8]) -> bool {
    sniff_version(data).is_ok()
}

fn is_valid_version(version: &[u8]) -> bool {
    matches!(version, [major, b'.', minor] if major.is_ascii_digit() && minor.is_ascii_digit())
}
