//! Model types shared by the detector, remover and batch runner.
//!
//! Page elements are a library-independent view of what a content stream
//! draws; candidates and reports describe what was found and what was done.

mod candidate;
mod element;
mod report;

pub use candidate::{Candidate, Inspection, PageFindings, Reason, Target};
pub use element::{
    AnnotationInfo, MarkedRegion, PageContent, Rect, RegionKind, TextRun, XObjectKind,
    XObjectPlacement,
};
pub use report::{DocumentReport, FileReport, FileStatus, PageReport, RunSummary};
