//! Required-role presence.
//!
//! Each missing role is its own finding, so an author sees every gap in the
//! front matter at once.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, SemanticRole, SourceKind};
use crate::pipeline::references::references_heading;
use crate::pipeline::CheckSettings;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_INTRODUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\s.0-9IVX]*introduction").unwrap());

/// Roles every paper must carry, with the code reported when one is absent.
const REQUIRED: &[(SemanticRole, WarningCode)] = &[
    (SemanticRole::Title, WarningCode::StylePaperTitle),
    (SemanticRole::Affiliation, WarningCode::StyleAffiliations),
    (SemanticRole::Email, WarningCode::StyleEmail),
    (SemanticRole::AbstractHeading, WarningCode::StyleAbstractHeading),
    (SemanticRole::Abstract, WarningCode::StyleAbstract),
    (SemanticRole::KeywordsHeading, WarningCode::StyleKeywordsHeading),
    (SemanticRole::Keywords, WarningCode::StyleKeywords),
];

pub fn check_required_roles(doc: &Document, _: &CheckSettings) -> Vec<Finding> {
    let mut findings: Vec<Finding> = REQUIRED
        .iter()
        .filter(|(role, _)| !doc.has_role(*role))
        .map(|(_, code)| Finding::new(*code))
        .collect();

    if !doc.has_role(SemanticRole::Author) {
        // LaTeX authors come from \author, so a miss means the data itself
        // could not be read.
        findings.push(Finding::new(match doc.kind {
            SourceKind::Latex => WarningCode::AuthorDataMissing,
            SourceKind::Docx => WarningCode::StyleAuthor,
        }));
    }
    if !has_introduction(doc) {
        findings.push(Finding::new(WarningCode::StyleNoIntro));
    }
    if references_heading(doc).is_none() {
        findings.push(Finding::new(WarningCode::StyleNoRefs));
    }
    findings
}

fn has_introduction(doc: &Document) -> bool {
    doc.blocks
        .iter()
        .filter(|b| matches!(b.role, SemanticRole::Heading(1)))
        .any(|b| RE_INTRODUCTION.is_match(&b.text()))
}
