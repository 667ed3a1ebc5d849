//! Watermark candidates produced by the detector.

use serde::{Deserialize, Serialize};

/// What a candidate points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A single text-showing operator
    Text { op_index: usize },

    /// A `Do` operator placing an image or form XObject
    XObject { op_index: usize, name: String },

    /// A marked-content range, `BDC` through `EMC`
    Region { start: usize, end: usize },

    /// Watermark text merged into a form XObject alongside regular content
    Embedded { op_index: usize, name: String },

    /// An entry of the page's `/Annots` array
    Annotation { index: usize },
}

/// Which detection rule fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reason {
    /// Text matched a configured pattern
    Pattern(String),

    /// Painted with opacity below the threshold
    LowOpacity(f32),

    /// Rotated text repeated on this many pages
    RepeatedRotatedText { pages: usize },

    /// Same XObject at the same spot on this many pages
    RepeatedXObject { pages: usize },

    /// Form XObject whose text is all watermark text
    WatermarkForm,

    /// `/Artifact` marked content with `/Subtype /Watermark`
    WatermarkArtifact,

    /// Optional content group named like a watermark layer
    WatermarkLayer(String),

    /// Annotation with `/Subtype /Watermark`
    WatermarkAnnotation,
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::Pattern(p) => write!(f, "matches pattern \"{}\"", p),
            Reason::LowOpacity(a) => write!(f, "opacity {:.2}", a),
            Reason::RepeatedRotatedText { pages } => {
                write!(f, "rotated text repeated on {} pages", pages)
            }
            Reason::RepeatedXObject { pages } => write!(f, "repeated on {} pages", pages),
            Reason::WatermarkForm => write!(f, "form holds only watermark text"),
            Reason::WatermarkArtifact => write!(f, "watermark artifact"),
            Reason::WatermarkLayer(name) => write!(f, "layer \"{}\"", name),
            Reason::WatermarkAnnotation => write!(f, "watermark annotation"),
        }
    }
}

/// A page element judged to be a watermark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Page number (1-indexed)
    pub page: u32,

    pub target: Target,

    /// Every rule that fired; never empty
    pub reasons: Vec<Reason>,

    /// Short human-readable description (text preview or resource name)
    pub label: String,
}

impl Candidate {
    pub fn new(page: u32, target: Target, reasons: Vec<Reason>, label: impl Into<String>) -> Self {
        Self {
            page,
            target,
            reasons,
            label: label.into(),
        }
    }

    /// Reasons joined for display.
    pub fn describe(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Candidates found on one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageFindings {
    pub number: u32,
    pub candidates: Vec<Candidate>,
}

/// Detection results for a whole document, without modifying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub page_count: u32,
    pub pages: Vec<PageFindings>,
}

impl Inspection {
    pub fn candidate_count(&self) -> usize {
        self.pages.iter().map(|p| p.candidates.len()).sum()
    }
}
