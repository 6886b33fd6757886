//! Pipeline stages for paper analysis.
//!
//! Each submodule implements exactly one step. The four checkers read the
//! same immutable [`Document`](crate::model::Document) and return their own
//! findings, so they can run in parallel and be tested one at a time.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ compile ──▶ normalize ──▶ classify ──▶ roles ──┬─▶ validate   ──┐
//! (sniff)   (DOCX/TeX)  (indices)     (template)  (styles) ├─▶ captions   ──┤
//!                                                          ├─▶ references ──┼─▶ aggregate
//!                                                          └─▶ crossref   ──┘
//! ```
//!
//! 1. [`input`]     read the file and decide DOCX or LaTeX
//! 2. [`compile`]   source to [`BlockTree`](crate::model::BlockTree); runs
//!    in `spawn_blocking` because both readers are CPU-bound
//! 3. [`normalize`] text cleanup rules, sequence indices, object ranges
//! 4. [`classify`]  EDM / JEDM / UNKNOWN from template fingerprints
//! 5. [`roles`]     style-to-role binding and caption linking
//! 6. [`validate`], [`captions`], [`references`], [`crossref`]: the
//!    independent checkers
//! 7. [`aggregate`] dedupe, order and resolve findings into warnings

pub mod aggregate;
pub mod bibliography;
pub mod captions;
pub mod classify;
pub mod compile;
pub mod crossref;
pub mod input;
pub mod normalize;
pub mod references;
pub mod roles;
pub mod validate;

use crate::catalog::Finding;
use crate::config::AnalysisConfig;
use crate::model::{Document, Template};
use crate::templates::TemplateTable;
use bibliography::ReferenceParser;
use references::ReferenceReport;

/// Thresholds the checkers need, copied out of [`AnalysisConfig`] so each
/// checker task can own them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSettings {
    /// Non-blank blocks tolerated between an object and its caption.
    pub caption_window: usize,
    pub alt_text_max_chars: usize,
    pub heading_max_chars: usize,
    /// Characters accepted right after a caption number.
    pub caption_punctuation: String,
}

impl CheckSettings {
    pub fn new(config: &AnalysisConfig, templates: &TemplateTable, template: Template) -> Self {
        Self {
            caption_window: config.caption_window,
            alt_text_max_chars: config.alt_text_max_chars,
            heading_max_chars: config.heading_max_chars,
            caption_punctuation: templates.caption_punctuation(template),
        }
    }
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            caption_window: 0,
            alt_text_max_chars: 2000,
            heading_max_chars: 200,
            caption_punctuation: ".".into(),
        }
    }
}

/// The four independent checkers run over a role-bound document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checker {
    Validate,
    Captions,
    References,
    CrossRef,
}

impl Checker {
    pub const ALL: [Checker; 4] = [
        Checker::Validate,
        Checker::Captions,
        Checker::References,
        Checker::CrossRef,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Checker::Validate => "validate",
            Checker::Captions => "captions",
            Checker::References => "references",
            Checker::CrossRef => "crossref",
        }
    }

    /// Run this checker. Only the reference reconciler fills the counts.
    pub fn run(
        self,
        doc: &Document,
        settings: &CheckSettings,
        parser: &dyn ReferenceParser,
    ) -> ReferenceReport {
        let findings: Vec<Finding> = match self {
            Checker::Validate => validate::validate(doc, settings),
            Checker::Captions => captions::check_captions(doc, settings),
            Checker::References => return references::check_references(doc, parser),
            Checker::CrossRef => crossref::check_cross_references(doc),
        };
        ReferenceReport {
            findings,
            ..ReferenceReport::default()
        }
    }
}
