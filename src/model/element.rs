//! Page elements recovered from a content stream.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in default user space (points).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Whether both rectangles sit at the same place within `tolerance` points.
    pub fn approx_eq(&self, other: &Rect, tolerance: f32) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

/// One text-showing operator (`Tj`, `TJ`, `'` or `"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    /// Index of the showing operator in the page's operation list
    pub op_index: usize,

    /// Decoded, NFKC-normalised text
    pub text: String,

    /// Fill alpha (`ca`) in effect
    pub fill_alpha: f32,

    /// Stroke alpha (`CA`) in effect
    pub stroke_alpha: f32,

    /// Text render mode (`Tr`), 0..=7
    pub render_mode: u8,

    /// Baseline angle in degrees, counter-clockwise, in (-180, 180]
    pub angle: f32,

    /// Text origin in default user space
    pub origin: (f32, f32),
}

impl TextRun {
    /// Whether the run paints nothing (render modes 3 and 7).
    pub fn is_invisible(&self) -> bool {
        matches!(self.render_mode, 3 | 7)
    }

    /// Alpha that governs how the glyphs are painted, `None` for invisible text.
    pub fn effective_opacity(&self) -> Option<f32> {
        match self.render_mode {
            3 | 7 => None,
            // Stroke only
            1 | 5 => Some(self.stroke_alpha),
            // Fill and stroke: the more opaque of the two dominates
            2 | 6 => Some(self.fill_alpha.max(self.stroke_alpha)),
            _ => Some(self.fill_alpha),
        }
    }

    /// Whether the baseline is rotated by more than `min_degrees`.
    pub fn is_rotated(&self, min_degrees: f32) -> bool {
        self.angle.abs() > min_degrees
    }
}

/// XObject subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XObjectKind {
    Image,
    Form,
}

/// One `Do` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XObjectPlacement {
    /// Index of the `Do` operator in the page's operation list
    pub op_index: usize,

    /// Resource name (without the leading slash)
    pub name: String,

    pub kind: XObjectKind,

    /// Bounding box of the placed object in default user space
    pub rect: Rect,

    /// MD5 of the raw stream bytes
    pub digest: [u8; 16],

    /// 64-bit difference hash of the decoded image, when decodable
    pub phash: Option<u64>,

    /// Text runs drawn by a form XObject (empty for images)
    pub inner_text: Vec<TextRun>,
}

/// Why a marked-content sequence was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionKind {
    /// `/Artifact` sequence; carries its `/Subtype` if present
    Artifact { subtype: Option<String> },

    /// `/OC` sequence bound to an optional content group
    OptionalContent { layer: String },
}

/// A `BDC` … `EMC` range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedRegion {
    /// Index of the `BDC` operator
    pub start: usize,

    /// Index of the matching `EMC` operator
    pub end: usize,

    pub kind: RegionKind,
}

/// An entry of the page's `/Annots` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationInfo {
    /// Position in the `/Annots` array
    pub index: usize,

    /// `/Subtype` name
    pub subtype: String,
}

/// Everything the detector looks at on one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    /// Page number (1-indexed)
    pub number: u32,

    pub text_runs: Vec<TextRun>,

    pub placements: Vec<XObjectPlacement>,

    pub regions: Vec<MarkedRegion>,

    pub annotations: Vec<AnnotationInfo>,
}

impl PageContent {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }
}
