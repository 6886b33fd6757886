//! Warning Aggregator.
//!
//! Merges the findings of every checker into the final warning list:
//! duplicates (same code, context and block) are dropped, the rest are
//! ordered by severity, then position, then code, and resolved against the
//! catalog for the document's template and source kind.

use crate::catalog::{Finding, Warning, WarningCatalog};
use crate::model::{SourceKind, Template};
use std::collections::HashSet;

pub fn aggregate(
    findings: Vec<Finding>,
    catalog: &WarningCatalog,
    template: Template,
    source: Option<SourceKind>,
) -> Vec<Warning> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Finding> = findings
        .into_iter()
        .filter(|f| seen.insert((f.code, f.context.clone(), f.block)))
        .collect();

    // Stable: equal keys keep the order checkers emitted them in.
    unique.sort_by(|a, b| {
        catalog
            .severity(b.code)
            .cmp(&catalog.severity(a.code))
            .then(a.block.cmp(&b.block))
            .then(a.code.as_str().cmp(b.code.as_str()))
    });

    unique
        .into_iter()
        .map(|f| catalog.warning(f, template, source))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Severity, WarningCode};

    #[test]
    fn test_dedupe_keeps_first() {
        let findings = vec![
            Finding::new(WarningCode::AltTextMissing).at_block(3).with_context("Figure index 1"),
            Finding::new(WarningCode::AltTextMissing).at_block(3).with_context("Figure index 1"),
            Finding::new(WarningCode::AltTextMissing).at_block(5).with_context("Figure index 1"),
        ];
        let warnings = aggregate(findings, WarningCatalog::builtin(), Template::Edm, None);
        assert_eq!(warnings.len(), 2);
    }

    #[test]
    fn test_order_severity_then_position() {
        let catalog = WarningCatalog::builtin();
        let findings = vec![
            Finding::new(WarningCode::StyleNoIntro),
            Finding::new(WarningCode::AltTextMissing).at_block(9),
            Finding::new(WarningCode::AltTextMissing).at_block(2),
            Finding::new(WarningCode::StyleAuthor),
        ];
        let warnings = aggregate(findings, catalog, Template::Edm, Some(SourceKind::Docx));
        let severities: Vec<Severity> = warnings.iter().map(|w| w.severity).collect();
        let mut sorted = severities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(severities, sorted);

        let alt: Vec<Option<usize>> = warnings
            .iter()
            .filter(|w| w.code == WarningCode::AltTextMissing)
            .map(|w| w.block)
            .collect();
        assert_eq!(alt, vec![Some(2), Some(9)]);
        assert_eq!(warnings.last().map(|w| w.code), Some(WarningCode::StyleNoIntro));
    }

    #[test]
    fn test_resolved_text_comes_from_catalog() {
        let catalog = WarningCatalog::builtin();
        let warnings = aggregate(
            vec![Finding::new(WarningCode::Wingdings).with_context("x")],
            catalog,
            Template::Jedm,
            None,
        );
        let text = catalog.resolve(WarningCode::Wingdings, Template::Jedm, None);
        assert_eq!(warnings[0].message, text.message);
        assert_eq!(warnings[0].help, text.help);
        assert_eq!(warnings[0].context.as_deref(), Some("x"));
    }
}
