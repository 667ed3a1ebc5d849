//! Watermark detection policy.
//!
//! Detection is deterministic and driven entirely by [`CleanOptions`]:
//!
//! - text matching a configured pattern, or painted below the opacity
//!   threshold, or rotated and repeated at the same spot on most pages;
//! - XObjects placed at the same spot on most pages with identical (MD5) or
//!   near-identical (difference hash) content;
//! - form XObjects that draw nothing but watermark text;
//! - `/Artifact /Watermark` marked content and watermark layers;
//! - `/Watermark` annotations.
//!
//! Repetition rules need at least two pages and a strict majority.

use std::collections::HashMap;

use regex::{RegexSet, RegexSetBuilder};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Error, Result};
use crate::model::{
    Candidate, PageContent, Reason, RegionKind, Target, TextRun, XObjectKind, XObjectPlacement,
};
use crate::parser::hamming_distance;

use super::options::CleanOptions;

/// Degrees two baselines may differ by and still count as the same rotation.
const ANGLE_TOLERANCE: f32 = 0.5;

/// Layers whose name contains this are watermark layers even without a pattern.
const LAYER_KEYWORD: &str = "watermark";

const LABEL_MAX_CHARS: usize = 40;

/// Compiled watermark patterns.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    set: Option<RegexSet>,
}

impl PatternSet {
    /// Compile patterns; plain strings match as case-insensitive substrings,
    /// `re:`-prefixed ones as case-insensitive regular expressions.
    pub fn new(patterns: &[String]) -> Result<Self> {
        let sources: Vec<String> = patterns
            .iter()
            .map(|p| match p.strip_prefix("re:") {
                Some(expr) => expr.to_string(),
                None => regex::escape(&p.nfkc().collect::<String>()),
            })
            .collect();

        let set = if sources.is_empty() {
            None
        } else {
            let set = RegexSetBuilder::new(&sources)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::Config(format!("invalid watermark pattern: {}", e)))?;
            Some(set)
        };

        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The first configured pattern found in `text`.
    pub fn first_match(&self, text: &str) -> Option<&str> {
        let set = self.set.as_ref()?;
        set.matches(text)
            .iter()
            .next()
            .map(|i| self.patterns[i].as_str())
    }
}

/// Cross-page repetition facts, computed once per document.
#[derive(Debug, Clone, Default)]
pub struct RepetitionIndex {
    page_count: usize,
    rotated_text: HashMap<(u32, usize), usize>,
    xobjects: HashMap<(u32, usize), usize>,
}

impl RepetitionIndex {
    /// Build the index over all pages of a document.
    pub fn build(pages: &[PageContent], options: &CleanOptions) -> Self {
        let mut index = Self {
            page_count: pages.len(),
            ..Default::default()
        };
        if !options.detect_repetition || pages.len() < 2 {
            return index;
        }

        for page in pages {
            for run in &page.text_runs {
                if run.is_invisible() || !run.is_rotated(options.min_rotation_degrees) {
                    continue;
                }
                let count = pages
                    .iter()
                    .filter(|other| {
                        other
                            .text_runs
                            .iter()
                            .any(|r| same_rotated_text(run, r, options.position_tolerance))
                    })
                    .count();
                if index.is_majority(count) {
                    index.rotated_text.insert((page.number, run.op_index), count);
                }
            }

            for placement in &page.placements {
                let count = pages
                    .iter()
                    .filter(|other| {
                        other
                            .placements
                            .iter()
                            .any(|p| same_xobject(placement, p, options))
                    })
                    .count();
                if index.is_majority(count) {
                    index
                        .xobjects
                        .insert((page.number, placement.op_index), count);
                }
            }
        }

        log::debug!(
            "repetition index: {} rotated runs, {} xobject placements repeated across {} pages",
            index.rotated_text.len(),
            index.xobjects.len(),
            index.page_count
        );
        index
    }

    fn is_majority(&self, count: usize) -> bool {
        self.page_count >= 2 && count * 2 > self.page_count
    }

    /// Pages carrying the same rotated run, if it repeats on a majority.
    pub fn rotated_text(&self, page: u32, op_index: usize) -> Option<usize> {
        self.rotated_text.get(&(page, op_index)).copied()
    }

    /// Pages carrying the same placement, if it repeats on a majority.
    pub fn xobject(&self, page: u32, op_index: usize) -> Option<usize> {
        self.xobjects.get(&(page, op_index)).copied()
    }
}

fn same_rotated_text(a: &TextRun, b: &TextRun, tolerance: f32) -> bool {
    a.text == b.text
        && (a.angle - b.angle).abs() <= ANGLE_TOLERANCE
        && (a.origin.0 - b.origin.0).abs() <= tolerance
        && (a.origin.1 - b.origin.1).abs() <= tolerance
}

fn same_xobject(a: &XObjectPlacement, b: &XObjectPlacement, options: &CleanOptions) -> bool {
    if a.kind != b.kind || !a.rect.approx_eq(&b.rect, options.position_tolerance) {
        return false;
    }
    if a.digest == b.digest {
        return true;
    }
    match (a.phash, b.phash) {
        (Some(x), Some(y)) => hamming_distance(x, y) <= options.image_hash_distance,
        _ => false,
    }
}

/// Applies the detection policy to pages.
#[derive(Debug, Clone)]
pub struct WatermarkDetector {
    options: CleanOptions,
    patterns: PatternSet,
}

impl WatermarkDetector {
    pub fn new(options: &CleanOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options: options.clone(),
            patterns: PatternSet::new(&options.patterns)?,
        })
    }

    pub fn options(&self) -> &CleanOptions {
        &self.options
    }

    /// Candidates on one page.
    pub fn detect(&self, page: &PageContent, index: &RepetitionIndex) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        if self.options.detect_marked_content {
            for region in &page.regions {
                if let Some(reason) = self.region_reason(&region.kind) {
                    candidates.push(Candidate::new(
                        page.number,
                        Target::Region {
                            start: region.start,
                            end: region.end,
                        },
                        vec![reason],
                        format!("marked content at ops {}..={}", region.start, region.end),
                    ));
                }
            }
        }
        // Elements inside a flagged region are removed with it
        let covered: Vec<(usize, usize)> = candidates
            .iter()
            .filter_map(|c| match c.target {
                Target::Region { start, end } => Some((start, end)),
                _ => None,
            })
            .collect();
        let in_region = |op: usize| covered.iter().any(|&(s, e)| s < op && op < e);

        for run in page.text_runs.iter().filter(|r| !in_region(r.op_index)) {
            let mut reasons = self.text_reasons(run);
            if let Some(pages) = index.rotated_text(page.number, run.op_index) {
                reasons.push(Reason::RepeatedRotatedText { pages });
            }
            if !reasons.is_empty() {
                candidates.push(Candidate::new(
                    page.number,
                    Target::Text {
                        op_index: run.op_index,
                    },
                    reasons,
                    preview(&run.text),
                ));
            }
        }

        for placement in page.placements.iter().filter(|p| !in_region(p.op_index)) {
            if let Some(candidate) = self.placement_candidate(page.number, placement, index) {
                candidates.push(candidate);
            }
        }

        if self.options.remove_annotations {
            for annot in page.annotations.iter().filter(|a| a.subtype == "Watermark") {
                candidates.push(Candidate::new(
                    page.number,
                    Target::Annotation { index: annot.index },
                    vec![Reason::WatermarkAnnotation],
                    format!("annotation #{}", annot.index),
                ));
            }
        }

        for c in &candidates {
            log::debug!("page {}: candidate {:?} ({})", c.page, c.label, c.describe());
        }
        candidates
    }

    /// Pattern and opacity rules for a single run.
    fn text_reasons(&self, run: &TextRun) -> Vec<Reason> {
        let mut reasons = Vec::new();
        if let Some(pattern) = self.patterns.first_match(&run.text) {
            reasons.push(Reason::Pattern(pattern.to_string()));
        }
        if let Some(opacity) = run.effective_opacity() {
            if opacity < self.options.opacity_threshold {
                reasons.push(Reason::LowOpacity(opacity));
            }
        }
        reasons
    }

    fn placement_candidate(
        &self,
        page: u32,
        placement: &XObjectPlacement,
        index: &RepetitionIndex,
    ) -> Option<Candidate> {
        let mut reasons = Vec::new();
        if let Some(pages) = index.xobject(page, placement.op_index) {
            reasons.push(Reason::RepeatedXObject { pages });
        }

        let mut embedded = Vec::new();
        if placement.kind == XObjectKind::Form && !placement.inner_text.is_empty() {
            let inner: Vec<Vec<Reason>> = placement
                .inner_text
                .iter()
                .map(|r| self.text_reasons(r))
                .collect();
            if inner.iter().all(|r| !r.is_empty()) {
                reasons.push(Reason::WatermarkForm);
            } else if let Some(first) = inner.into_iter().find(|r| !r.is_empty()) {
                embedded = first;
            }
        }

        let label = format!("/{}", placement.name);
        if !reasons.is_empty() {
            return Some(Candidate::new(
                page,
                Target::XObject {
                    op_index: placement.op_index,
                    name: placement.name.clone(),
                },
                reasons,
                label,
            ));
        }
        if !embedded.is_empty() {
            return Some(Candidate::new(
                page,
                Target::Embedded {
                    op_index: placement.op_index,
                    name: placement.name.clone(),
                },
                embedded,
                label,
            ));
        }
        None
    }

    fn region_reason(&self, kind: &RegionKind) -> Option<Reason> {
        match kind {
            RegionKind::Artifact { subtype } if subtype.as_deref() == Some("Watermark") => {
                Some(Reason::WatermarkArtifact)
            }
            RegionKind::OptionalContent { layer } => {
                let is_watermark = layer.to_lowercase().contains(LAYER_KEYWORD)
                    || self.patterns.first_match(layer).is_some();
                is_watermark.then(|| Reason::WatermarkLayer(layer.clone()))
            }
            _ => None,
        }
    }
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= LABEL_MAX_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(LABEL_MAX_CHARS).collect();
    short.push('…');
    short
}
