//! Cleaning options and configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options controlling detection, removal and batch execution.
///
/// Every field has a default, so a JSON configuration file only needs the
/// keys it wants to change:
///
/// ```
/// use unmark::CleanOptions;
///
/// let options = CleanOptions::from_json_str(r#"{ "patterns": ["DRAFT"] }"#).unwrap();
/// assert_eq!(options.opacity_threshold, 0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanOptions {
    /// Watermark strings, matched case-insensitively as substrings.
    /// A `re:` prefix makes the rest a case-insensitive regular expression.
    pub patterns: Vec<String>,

    /// Text painted with an opacity below this is a watermark (0.0 disables)
    pub opacity_threshold: f32,

    /// Whether cross-page repetition rules are applied
    pub detect_repetition: bool,

    /// Minimum baseline rotation, in degrees, for the rotated-text rule
    pub min_rotation_degrees: f32,

    /// Maximum perceptual-hash Hamming distance for "near-identical" images
    pub image_hash_distance: u32,

    /// Position tolerance in points when comparing placements across pages
    pub position_tolerance: f32,

    /// Whether `/Artifact /Watermark` regions and watermark layers are removed
    pub detect_marked_content: bool,

    /// Whether `/Subtype /Watermark` annotations are removed
    pub remove_annotations: bool,

    /// Whether to process files on a worker pool
    pub parallel: bool,

    /// Worker count for parallel runs (0 = number of CPUs)
    pub jobs: usize,

    /// Copy the original file to the output when cleaning fails
    pub copy_on_failure: bool,
}

impl CleanOptions {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watermark pattern.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.patterns.push(pattern.into());
        self
    }

    /// Add several watermark patterns.
    pub fn with_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Set the opacity threshold.
    pub fn with_opacity_threshold(mut self, threshold: f32) -> Self {
        self.opacity_threshold = threshold;
        self
    }

    /// Disable cross-page repetition rules.
    pub fn without_repetition(mut self) -> Self {
        self.detect_repetition = false;
        self
    }

    /// Set the perceptual-hash distance for near-identical images.
    pub fn with_image_hash_distance(mut self, distance: u32) -> Self {
        self.image_hash_distance = distance;
        self
    }

    /// Set the position tolerance in points.
    pub fn with_position_tolerance(mut self, tolerance: f32) -> Self {
        self.position_tolerance = tolerance;
        self
    }

    /// Keep watermark annotations.
    pub fn keep_annotations(mut self) -> Self {
        self.remove_annotations = false;
        self
    }

    /// Process files in parallel on `jobs` workers (0 = number of CPUs).
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.parallel = true;
        self.jobs = jobs;
        self
    }

    /// Process files one at a time.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Enable or disable copying originals when cleaning fails.
    pub fn with_copy_on_failure(mut self, copy: bool) -> Self {
        self.copy_on_failure = copy;
        self
    }

    /// Parse options from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    /// Reject values that make detection meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.opacity_threshold) {
            return Err(Error::Config(format!(
                "opacity_threshold must be within 0..=1, got {}",
                self.opacity_threshold
            )));
        }
        if !(self.position_tolerance >= 0.0) {
            return Err(Error::Config(format!(
                "position_tolerance must not be negative, got {}",
                self.position_tolerance
            )));
        }
        if !(0.0..180.0).contains(&self.min_rotation_degrees) {
            return Err(Error::Config(format!(
                "min_rotation_degrees must be within 0..180, got {}",
                self.min_rotation_degrees
            )));
        }
        if self.image_hash_distance > 64 {
            return Err(Error::Config(format!(
                "image_hash_distance must be at most 64, got {}",
                self.image_hash_distance
            )));
        }
        if let Some(empty) = self.patterns.iter().find(|p| p.trim().is_empty() || *p == "re:") {
            return Err(Error::Config(format!("empty watermark pattern {:?}", empty)));
        }
        Ok(())
    }
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            opacity_threshold: 0.5,
            detect_repetition: true,
            min_rotation_degrees: 0.5,
            image_hash_distance: 5,
            position_tolerance: 1.0,
            detect_marked_content: true,
            remove_annotations: true,
            parallel: false,
            jobs: 0,
            copy_on_failure: false,
        }
    }
}
