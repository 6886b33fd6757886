//! Semantic role binding.
//!
//! A pure lookup of `(style, template, container, text)` in the template
//! table, plus one contextual rule: an unstyled paragraph set entirely in a
//! monospace font is code. Nothing is removed; roles are added on top of the
//! normalized blocks.

use crate::model::{Document, Inline, SemanticRole, SourceBlock, Template};
use crate::pipeline::captions;
use crate::templates::TemplateTable;
use std::collections::BTreeSet;
use tracing::debug;

/// Bind roles to every block of `doc` for `template`, then link captions.
pub fn assign_roles(doc: &mut Document, table: &TemplateTable, template: Template, window: usize) {
    doc.template = template;
    for block in &mut doc.blocks {
        block.role = role_of(block, table, template);
    }

    let present: BTreeSet<SemanticRole> = doc.blocks.iter().map(|b| b.role).collect();
    doc.implied_roles = table.implied_roles(template, &present);
    captions::link_captions(doc, window);

    debug!(
        "Bound roles for {} template: {} of {} blocks have a role",
        template,
        doc.blocks
            .iter()
            .filter(|b| b.role != SemanticRole::Unknown)
            .count(),
        doc.blocks.len()
    );
}

fn role_of(block: &SourceBlock, table: &TemplateTable, template: Template) -> SemanticRole {
    let text = block.text();
    let role = block
        .style
        .as_deref()
        .map(|style| table.lookup(template, style, block.cell.is_some(), &text))
        .unwrap_or_default();
    if role == SemanticRole::Unknown && is_monospace(block, table) {
        return SemanticRole::Code;
    }
    role
}

fn is_monospace(block: &SourceBlock, table: &TemplateTable) -> bool {
    let mut fonts = block.runs.iter().filter_map(|r| match r {
        Inline::Text { text, font, .. } if !text.trim().is_empty() => Some(font.as_deref()),
        _ => None,
    });
    let mut any = false;
    let all = fonts.all(|font| {
        any = true;
        font.is_some_and(|f| table.is_monospace(f))
    });
    any && all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectKind, SourceKind, TableCell, VisualObject};

    fn block(index: usize, style: Option<&str>, runs: Vec<Inline>) -> SourceBlock {
        SourceBlock {
            index,
            style: style.map(String::from),
            runs,
            cell: None,
            object: None,
            labels: vec![],
            line: None,
            role: SemanticRole::Unknown,
        }
    }

    fn doc(blocks: Vec<SourceBlock>) -> Document {
        Document {
            kind: SourceKind::Docx,
            template: Template::Unknown,
            blocks,
            objects: vec![],
            markers: Default::default(),
            implied_roles: Default::default(),
            notes: vec![],
        }
    }

    fn mono(text: &str, font: Option<&str>) -> Inline {
        Inline::Text {
            text: text.into(),
            emphasis: false,
            font: font.map(String::from),
        }
    }

    #[test]
    fn test_roles_follow_template() {
        let mut d = doc(vec![
            block(0, Some("MainTitle"), vec![Inline::text("A paper")]),
            block(1, Some("Author"), vec![Inline::text("Ada")]),
            block(2, Some("Normal"), vec![Inline::text("Body")]),
        ]);
        assign_roles(&mut d, TemplateTable::builtin(), Template::Jedm, 0);
        let roles: Vec<_> = d.blocks.iter().map(|b| b.role).collect();
        assert_eq!(
            roles,
            vec![SemanticRole::Title, SemanticRole::Author, SemanticRole::Unknown]
        );
        assert_eq!(d.template, Template::Jedm);
    }

    #[test]
    fn test_monospace_paragraph_is_code() {
        let mut d = doc(vec![
            block(0, None, vec![mono("x = 1", Some("Courier New")), mono(" ", None)]),
            block(1, Some("Normal"), vec![mono("y", Some("Consolas")), mono("z", Some("Arial"))]),
            block(2, None, vec![Inline::Image { object: 0 }]),
        ]);
        assign_roles(&mut d, TemplateTable::builtin(), Template::Edm, 0);
        assert_eq!(d.blocks[0].role, SemanticRole::Code);
        assert_eq!(d.blocks[1].role, SemanticRole::Unknown);
        assert_eq!(d.blocks[2].role, SemanticRole::Unknown);
    }

    #[test]
    fn test_implied_roles_recorded() {
        let mut d = doc(vec![block(0, Some("Abstract"), vec![Inline::text("We study")])]);
        assign_roles(&mut d, TemplateTable::builtin(), Template::Jedm, 0);
        assert!(d.implied_roles.contains(&SemanticRole::AbstractHeading));
        assert!(d.has_role(SemanticRole::AbstractHeading));
    }

    #[test]
    fn test_table_cell_context_and_caption_link() {
        let mut cell = block(1, Some("TableText"), vec![Inline::text("1")]);
        cell.cell = Some(TableCell {
            table: 0,
            row: 0,
            column: 0,
            header: false,
        });
        cell.object = Some(0);
        let mut d = doc(vec![
            block(0, Some("Caption"), vec![Inline::text("Table 1. Results")]),
            cell,
        ]);
        d.objects.push(VisualObject::new(0, ObjectKind::Table, 1));
        assign_roles(&mut d, TemplateTable::builtin(), Template::Edm, 0);
        assert_eq!(d.blocks[1].role, SemanticRole::TableText);
        assert_eq!(d.objects[0].caption, Some(0));
    }
}
