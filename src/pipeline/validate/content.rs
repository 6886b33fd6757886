//! Sanity checks on the text of role-bound blocks.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, SemanticRole};
use crate::pipeline::CheckSettings;

pub fn check_role_content(doc: &Document, settings: &CheckSettings) -> Vec<Finding> {
    let mut findings = Vec::new();
    for block in &doc.blocks {
        let text = block.text();
        let text = text.trim();
        let code = match block.role {
            SemanticRole::Author if text.contains('@') => WarningCode::StyleEmailInAuthor,
            SemanticRole::Email if text.contains(char::is_whitespace) => {
                WarningCode::StyleSpaceInEmail
            }
            role if role.is_heading() && text.chars().count() > settings.heading_max_chars => {
                WarningCode::StyleLongHeading
            }
            _ => continue,
        };
        findings.push(
            Finding::new(code)
                .with_context(text)
                .at_block(block.index)
                .at_line(block.line),
        );
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceKind;
    use crate::pipeline::validate::testing::DocBuilder;

    fn run(doc: &Document, settings: &CheckSettings) -> Vec<(WarningCode, String)> {
        check_role_content(doc, settings)
            .into_iter()
            .map(|f| (f.code, f.context.unwrap_or_default()))
            .collect()
    }

    #[test]
    fn test_email_in_author() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Author, "Ada Lovelace ada@example.org")
            .text(SemanticRole::Author, "Alan Turing")
            .build();
        assert_eq!(
            run(&doc, &CheckSettings::default()),
            vec![(WarningCode::StyleEmailInAuthor, "Ada Lovelace ada@example.org".into())]
        );
    }

    #[test]
    fn test_space_in_email() {
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Email, "ada@example.org")
            .text(SemanticRole::Email, "{ada, alan}@example.org")
            .build();
        let found = run(&doc, &CheckSettings::default());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, WarningCode::StyleSpaceInEmail);
    }

    #[test]
    fn test_long_heading_threshold() {
        let at_limit = "x".repeat(200);
        let over = "y".repeat(201);
        let doc = DocBuilder::new(SourceKind::Docx)
            .text(SemanticRole::Heading(2), &at_limit)
            .text(SemanticRole::Heading(1), &over)
            .text(SemanticRole::Body, &over)
            .build();
        let found = run(&doc, &CheckSettings::default());
        assert_eq!(found, vec![(WarningCode::StyleLongHeading, over)]);

        let strict = CheckSettings {
            heading_max_chars: 10,
            ..CheckSettings::default()
        };
        assert_eq!(run(&doc, &strict).len(), 2);
    }
}
