//! Whole-document cleaning.

use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{
    Candidate, DocumentReport, Inspection, PageContent, PageFindings, PageReport, Target,
};
use crate::parser::{scan_page, PageId, PdfDocument};

use super::detector::{RepetitionIndex, WatermarkDetector};
use super::options::CleanOptions;
use super::remover::remove_candidates;

/// Cleaned document bytes and what was done to them.
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    /// The cleaned document, or the input unchanged when nothing was removed
    pub bytes: Vec<u8>,

    pub report: DocumentReport,
}

/// One page after interpretation and detection.
struct PageAnalysis {
    number: u32,
    page_id: PageId,
    operations: Option<Vec<lopdf::content::Operation>>,
    scan_error: Option<String>,
    candidates: Vec<Candidate>,
}

/// Detects and removes watermarks from single documents.
///
/// # Example
///
/// ```no_run
/// use unmark::{CleanOptions, DocumentCleaner};
///
/// let cleaner = DocumentCleaner::new(CleanOptions::new().with_pattern("CONFIDENTIAL"))?;
/// let outcome = cleaner.clean_file("report.pdf")?;
/// println!("removed {} watermarks", outcome.report.removed());
/// std::fs::write("report.clean.pdf", &outcome.bytes)?;
/// # Ok::<(), unmark::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct DocumentCleaner {
    detector: WatermarkDetector,
}

impl DocumentCleaner {
    /// Validate options and compile patterns.
    pub fn new(options: CleanOptions) -> Result<Self> {
        Ok(Self {
            detector: WatermarkDetector::new(&options)?,
        })
    }

    pub fn options(&self) -> &CleanOptions {
        self.detector.options()
    }

    /// Clean a document read from disk.
    pub fn clean_file<P: AsRef<Path>>(&self, path: P) -> Result<CleanOutcome> {
        let data = std::fs::read(path)?;
        self.clean_bytes(&data)
    }

    /// Report candidates for a document read from disk.
    pub fn inspect_file<P: AsRef<Path>>(&self, path: P) -> Result<Inspection> {
        let data = std::fs::read(path)?;
        self.inspect_bytes(&data)
    }

    /// Detect watermarks without modifying anything.
    pub fn inspect_bytes(&self, data: &[u8]) -> Result<Inspection> {
        let pdf = PdfDocument::load_bytes(data)?;
        let analysis = self.analyze(&pdf);
        Ok(Inspection {
            page_count: analysis.len() as u32,
            pages: analysis
                .into_iter()
                .map(|page| PageFindings {
                    number: page.number,
                    candidates: page.candidates,
                })
                .collect(),
        })
    }

    /// Remove watermarks from an in-memory document.
    ///
    /// Candidates that cannot be removed without disturbing other content
    /// are left in place and listed in the page report. The page tree,
    /// page dimensions and all untouched objects are preserved.
    pub fn clean_bytes(&self, data: &[u8]) -> Result<CleanOutcome> {
        let mut pdf = PdfDocument::load_bytes(data)?;
        let analysis = self.analyze(&pdf);
        let mut report = DocumentReport {
            page_count: analysis.len() as u32,
            pages: Vec::with_capacity(analysis.len()),
        };

        for page in analysis {
            let mut page_report = PageReport::new(page.number);
            page_report.detected = page.candidates.len();
            if let Some(err) = page.scan_error {
                page_report
                    .unsupported
                    .push(format!("content stream could not be read: {}", err));
            }

            if let Some(operations) = page.operations.filter(|_| !page.candidates.is_empty()) {
                let removal = remove_candidates(&operations, &page.candidates);
                if removal.is_changed() {
                    pdf.replace_page_content(page.page_id, removal.operations)?;
                }
                page_report.removed += removal.removed.len();
                for (index, reason) in removal.unsupported {
                    let candidate = &page.candidates[index];
                    let detail = format!("{} ({}): {}", candidate.label, candidate.describe(), reason);
                    let err = Error::UnsupportedContent {
                        page: page.number,
                        reason: detail.clone(),
                    };
                    log::warn!("{}", err);
                    page_report.unsupported.push(detail);
                }
            }

            let annotations: Vec<usize> = page
                .candidates
                .iter()
                .filter_map(|c| match c.target {
                    Target::Annotation { index } => Some(index),
                    _ => None,
                })
                .collect();
            if !annotations.is_empty() {
                pdf.remove_annotations(page.page_id, &annotations)?;
                page_report.removed += annotations.len();
            }

            report.pages.push(page_report);
        }

        let bytes = if pdf.is_modified() {
            pdf.save_to_bytes()?
        } else {
            data.to_vec()
        };
        log::info!(
            "{} pages, {} watermarks detected, {} removed",
            report.page_count,
            report.detected(),
            report.removed()
        );
        Ok(CleanOutcome { bytes, report })
    }

    /// Interpret every page, then apply the detection policy.
    fn analyze(&self, pdf: &PdfDocument) -> Vec<PageAnalysis> {
        let mut scanned = Vec::new();
        let mut contents = Vec::new();

        for (number, page_id) in pdf.pages() {
            match scan_page(pdf, number, page_id) {
                Ok(scan) => {
                    contents.push(scan.content);
                    scanned.push((number, page_id, Some(scan.operations), None));
                }
                Err(e) => {
                    log::warn!("page {}: content stream unreadable: {}", number, e);
                    // Annotations can still be inspected without the content
                    let mut content = PageContent::new(number);
                    content.annotations = pdf.annotations(page_id);
                    contents.push(content);
                    scanned.push((number, page_id, None, Some(e.to_string())));
                }
            }
        }

        let index = RepetitionIndex::build(&contents, self.options());
        scanned
            .into_iter()
            .zip(&contents)
            .map(|((number, page_id, operations, scan_error), content)| PageAnalysis {
                number,
                page_id,
                operations,
                scan_error,
                candidates: self.detector.detect(content, &index),
            })
            .collect()
    }
}
