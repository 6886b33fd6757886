//! Table structure: caption, header row, cell styles.
//!
//! A table with a single row is layout, not data, and is skipped.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, ObjectKind, SemanticRole, VisualObject};
use crate::pipeline::captions::{match_caption, snippet, CaptionSearch};
use crate::pipeline::CheckSettings;

pub fn check_tables(doc: &Document, settings: &CheckSettings) -> Vec<Finding> {
    let mut findings = Vec::new();
    let tables = doc.objects.iter().filter(|o| o.kind == ObjectKind::Table);
    for (i, table) in tables.enumerate() {
        if doc.table_row_count(table.id) <= 1 {
            continue;
        }
        let context = table_context(doc, table, i + 1);
        let at = |code: WarningCode| {
            Finding::new(code)
                .with_context(context.clone())
                .at_block(table.first_block)
                .at_line(doc.blocks[table.first_block].line)
        };

        if match_caption(doc, table, settings.caption_window) == CaptionSearch::None {
            findings.push(at(WarningCode::TableCaptionMissing));
        }

        let has_header = doc
            .table_cells(table.id)
            .any(|(b, c)| c.header || b.role == SemanticRole::TableHeader);
        if !has_header {
            findings.push(at(WarningCode::TableHeaderMissing));
        }

        let unstyled = doc.table_cells(table.id).any(|(b, _)| {
            !b.is_blank() && !matches!(b.role, SemanticRole::TableHeader | SemanticRole::TableText)
        });
        if unstyled {
            findings.push(at(WarningCode::TableStylesMissing));
        }
    }
    findings
}

fn table_context(doc: &Document, table: &VisualObject, ordinal: usize) -> String {
    let text: String = doc
        .table_cells(table.id)
        .map(|(b, _)| b.text())
        .collect::<Vec<_>>()
        .join("")
        .split_whitespace()
        .collect();
    format!("Table index {ordinal}; table text: \"{}\"", snippet(&text, 15))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use crate::pipeline::validate::testing::DocBuilder;

    fn codes(doc: &Document) -> Vec<WarningCode> {
        check_tables(doc, &CheckSettings::default())
            .into_iter()
            .map(|f| f.code)
            .collect()
    }

    #[test]
    fn test_well_formed_table() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Caption, "Table 1. Results")
            .table(&[(SemanticRole::TableHeader, true), (SemanticRole::TableText, false)])
            .build();
        assert!(codes(&doc).is_empty());
    }

    #[test]
    fn test_header_missing_only() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Caption, "Table 1. Results")
            .table(&[(SemanticRole::TableText, false), (SemanticRole::TableText, false)])
            .build();
        assert_eq!(codes(&doc), vec![WarningCode::TableHeaderMissing]);
    }

    #[test]
    fn test_header_style_counts_as_header() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Caption, "Table 1. Results")
            .table(&[(SemanticRole::TableHeader, false), (SemanticRole::TableText, false)])
            .build();
        assert!(codes(&doc).is_empty());
    }

    #[test]
    fn test_missing_caption_and_styles() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Body, "Some text")
            .table(&[(SemanticRole::Unknown, true), (SemanticRole::Unknown, false)])
            .build();
        let found = check_tables(&doc, &CheckSettings::default());
        let codes: Vec<_> = found.iter().map(|f| f.code).collect();
        assert_eq!(
            codes,
            vec![WarningCode::TableCaptionMissing, WarningCode::TableStylesMissing]
        );
        assert_eq!(
            found[0].context.as_deref(),
            Some("Table index 1; table text: \"r0c0r0c1r1c0r1c...\"")
        );
    }

    #[test]
    fn test_distant_caption_is_not_missing() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .table(&[(SemanticRole::TableHeader, true), (SemanticRole::TableText, false)])
            .text(SemanticRole::Caption, "Table 1. Below the table")
            .build();
        assert!(codes(&doc).is_empty());
    }

    #[test]
    fn test_single_row_table_skipped() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .table(&[(SemanticRole::Unknown, false)])
            .build();
        assert!(codes(&doc).is_empty());
    }
}
