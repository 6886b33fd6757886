//! Template classification from fingerprints.
//!
//! Each known template contributes one point per matching marker: a block
//! style only that template defines, its `\documentclass`, or a class file
//! bundled with the project. The highest score wins; ties go to the first
//! template in table order. No match at all yields `Unknown` plus a
//! `template_not_detected` finding, and the pipeline carries on.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, Template};
use crate::templates::{Fingerprint, TemplateTable};
use std::collections::BTreeSet;
use tracing::debug;

/// Decide the template of `doc`.
///
/// Returns the template and the findings the decision produced.
pub fn classify(
    doc: &Document,
    table: &TemplateTable,
    override_with: Option<Template>,
) -> (Template, Vec<Finding>) {
    if let Some(template) = override_with {
        debug!("Template forced to {}", template);
        return (template, Vec::new());
    }

    let styles: BTreeSet<String> = doc
        .blocks
        .iter()
        .filter_map(|b| b.style.as_deref())
        .map(str::to_lowercase)
        .collect();

    let mut best: Option<(Template, usize)> = None;
    for (template, fingerprint) in table.fingerprints() {
        let score = score(fingerprint, doc, &styles);
        debug!("Fingerprint score for {}: {}", template, score);
        if score > 0 && best.is_none_or(|(_, s)| score > s) {
            best = Some((template, score));
        }
    }

    match best {
        Some((template, _)) => (template, Vec::new()),
        None => (
            Template::Unknown,
            vec![Finding::new(WarningCode::TemplateNotDetected)],
        ),
    }
}

fn score(fingerprint: &Fingerprint, doc: &Document, styles: &BTreeSet<String>) -> usize {
    let style_hits = fingerprint
        .styles
        .iter()
        .filter(|s| styles.contains(&s.to_lowercase()))
        .count();
    let class_hit = doc.markers.document_class.as_deref().is_some_and(|class| {
        fingerprint
            .document_classes
            .iter()
            .any(|c| c.eq_ignore_ascii_case(class.trim()))
    });
    let file_hits = fingerprint
        .class_files
        .iter()
        .filter(|f| {
            doc.markers
                .class_files
                .iter()
                .any(|bundled| bundled.eq_ignore_ascii_case(f))
        })
        .count();
    style_hits + usize::from(class_hit) + file_hits
}
