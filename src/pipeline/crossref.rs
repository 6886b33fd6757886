//! Cross-Reference Resolver.
//!
//! Every label defined anywhere in the document (bookmarks, `\label`) is
//! a valid target. A reference is broken when it names a label that does
//! not exist, or when the source already rendered it as unresolved:
//! Word's "Error! Reference source not found." field text, or LaTeX's
//! `??`. Labels compare exactly, case included.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, Inline, SourceBlock};
use crate::pipeline::captions::snippet;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const UNRESOLVED_FIELD: &str = "Error! Reference source not found.";

static RE_UNRESOLVED_TEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s|\()\?\?(?:$|\s|[.,;:)])").unwrap());

const CONTEXT_CHARS: usize = 100;

pub fn check_cross_references(doc: &Document) -> Vec<Finding> {
    let defined: HashSet<&str> = doc
        .blocks
        .iter()
        .flat_map(|b| b.labels.iter().map(String::as_str))
        .collect();

    let mut findings = Vec::new();
    for block in &doc.blocks {
        let text = block.text();
        let excerpt = snippet(text.trim(), CONTEXT_CHARS);

        for run in &block.runs {
            let target = match run {
                Inline::CrossRef { label, .. } if !defined.contains(label.as_str()) => {
                    format!("Label \"{label}\"")
                }
                Inline::Link { href, .. } => match href.strip_prefix('#') {
                    Some(anchor) if !defined.contains(anchor) => format!("Anchor \"{href}\""),
                    _ => continue,
                },
                _ => continue,
            };
            findings.push(broken_ref(block, format!("{target} in text: \"{excerpt}\"")));
        }

        // Rendered failures carry no label, so the offset keeps them apart.
        let rendered = text
            .match_indices(UNRESOLVED_FIELD)
            .map(|(at, _)| at)
            .chain(RE_UNRESOLVED_TEX.find_iter(&text).map(|m| m.start()));
        for at in rendered {
            findings.push(broken_ref(
                block,
                format!("Unresolved reference at offset {at} in text: \"{excerpt}\""),
            ));
        }
    }
    findings
}

fn broken_ref(block: &SourceBlock, context: String) -> Finding {
    Finding::new(WarningCode::BrokenInternalRef)
        .with_context(context)
        .at_block(block.index)
        .at_line(block.line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WarningCatalog;
    use crate::model::{SemanticRole, SourceKind, Template};
    use crate::pipeline::aggregate::aggregate;
    use crate::pipeline::validate::testing::DocBuilder;

    fn xref(label: &str) -> Inline {
        Inline::CrossRef {
            label: label.into(),
            text: label.into(),
        }
    }

    #[test]
    fn test_defined_labels_resolve() {
        let mut doc = DocBuilder::new(SourceKind::Latex)
            .text(SemanticRole::Heading(1), "1. Introduction")
            .runs(
                SemanticRole::Body,
                vec![Inline::text("See Section "), xref("sec:intro"), Inline::text(".")],
            )
            .build();
        doc.blocks[0].labels.push("sec:intro".into());
        assert!(check_cross_references(&doc).is_empty());
    }

    #[test]
    fn test_undefined_and_case_mismatch() {
        let mut doc = DocBuilder::new(SourceKind::Latex)
            .runs(
                SemanticRole::Body,
                vec![Inline::text("See "), xref("fig:Plot"), xref("tab:none")],
            )
            .build();
        doc.blocks[0].labels.push("fig:plot".into());
        let found = check_cross_references(&doc);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|f| f.code == WarningCode::BrokenInternalRef));
        assert_eq!(found[0].block, Some(0));
        assert_eq!(
            found[0].context.as_deref(),
            Some("Label \"fig:Plot\" in text: \"See fig:Plottab:none\"")
        );
        assert_ne!(found[0].context, found[1].context);
    }

    #[test]
    fn test_internal_links() {
        let link = |href: &str| Inline::Link {
            href: href.into(),
            text: "here".into(),
        };
        let mut doc = DocBuilder::new(SourceKind::Docx)
            .runs(
                SemanticRole::Body,
                vec![link("#_Ref1"), link("#_Ref2"), link("https://example.org")],
            )
            .build();
        doc.blocks[0].labels.push("_Ref1".into());
        assert_eq!(check_cross_references(&doc).len(), 1);
    }

    #[test]
    fn test_rendered_failures() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(
                SemanticRole::Body,
                "As Figure Error! Reference source not found. shows, and Table ?? too.",
            )
            .text(SemanticRole::Body, "Is this right?? Probably.")
            .build();
        let found = check_cross_references(&doc);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|f| f.block == Some(0)));
        assert!(found[0]
            .context
            .as_deref()
            .is_some_and(|c| c.starts_with("Unresolved reference at offset 10 ")));
    }

    #[test]
    fn test_broken_refs_in_one_block_survive_aggregation() {
        let doc = DocBuilder::new(SourceKind::Latex)
            .runs(
                SemanticRole::Body,
                vec![Inline::text("See "), xref("fig:a"), Inline::text(" and "), xref("tab:b")],
            )
            .text(SemanticRole::Body, "Tables ?? and ?? disagree.")
            .build();
        let warnings = aggregate(
            check_cross_references(&doc),
            WarningCatalog::builtin(),
            Template::Edm,
            Some(SourceKind::Latex),
        );
        assert_eq!(warnings.len(), 4);
        assert_eq!(warnings.iter().filter(|w| w.block == Some(0)).count(), 2);
    }
}
