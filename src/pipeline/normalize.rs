//! Normalization: a compiler's [`BlockTree`] to an indexed [`Document`].
//!
//! Blocks are never dropped or reordered here; the position a block has in
//! the tree becomes its permanent sequence index. Only the *text* of runs is
//! cleaned, by a fixed set of rules that make the two source formats look
//! alike to the checkers.
//!
//! ## Rule Order
//!
//! Line endings are unified before invisible characters are removed, and
//! both happen before whitespace is collapsed, so a `\r\n` or a zero-width
//! space between two words still ends up as exactly one space.

use crate::error::PaperCheckError;
use crate::model::{BlockTree, Document, Inline, RawBlock, SourceBlock, Template};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Turn a compiled tree into a [`Document`] with template `Unknown`.
///
/// Rules (applied to every text-bearing run, in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, ...)
/// 3. Collapse whitespace runs to one space, except in code blocks
/// 4. Trim the outer edges of the block and drop empty text runs
///
/// Fails with [`PaperCheckError::EmptyDocument`] when nothing visible is
/// left.
pub fn normalize(tree: BlockTree, name: &str) -> Result<Document, PaperCheckError> {
    let BlockTree {
        kind,
        blocks,
        mut objects,
        markers,
        notes,
    } = tree;

    let mut blocks: Vec<SourceBlock> = blocks
        .into_iter()
        .enumerate()
        .map(|(index, raw)| normalize_block(index, raw))
        .collect();

    if blocks.is_empty() || (objects.is_empty() && blocks.iter().all(SourceBlock::is_blank)) {
        return Err(PaperCheckError::EmptyDocument {
            name: name.to_string(),
        });
    }

    // Clamp object ranges, then give every block its innermost object.
    let last = blocks.len() - 1;
    for obj in &mut objects {
        obj.first_block = obj.first_block.min(last);
        obj.last_block = obj.last_block.clamp(obj.first_block, last);
    }
    let mut by_span: Vec<_> = objects
        .iter()
        .map(|o| (o.last_block - o.first_block, o.id, o.first_block, o.last_block))
        .collect();
    by_span.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, id, first, last) in by_span {
        for block in &mut blocks[first..=last] {
            block.object = Some(id);
        }
    }

    debug!(
        "Normalized '{}': {} blocks, {} objects",
        name,
        blocks.len(),
        objects.len()
    );

    Ok(Document {
        kind,
        template: Template::Unknown,
        blocks,
        objects,
        markers,
        implied_roles: Default::default(),
        notes,
    })
}

fn normalize_block(index: usize, raw: RawBlock) -> SourceBlock {
    let preformatted = raw.style.as_deref().is_some_and(is_preformatted);
    let mut runs: Vec<Inline> = raw
        .runs
        .into_iter()
        .map(|run| clean_run(run, preformatted))
        .collect();
    trim_edges(&mut runs);
    runs.retain(|r| !matches!(r, Inline::Text { text, .. } if text.is_empty()));

    SourceBlock {
        index,
        style: raw.style.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        runs,
        cell: raw.cell,
        object: None,
        labels: raw.labels,
        line: raw.line,
        role: Default::default(),
    }
}

fn is_preformatted(style: &str) -> bool {
    let style = style.to_ascii_lowercase();
    style.contains("code") || style.contains("algorithm") || style.contains("verbatim")
}

fn clean_run(run: Inline, preformatted: bool) -> Inline {
    let clean = |s: String| {
        let s = normalise_line_endings(&s);
        let s = remove_invisible_chars(&s);
        if preformatted {
            s
        } else {
            collapse_whitespace(&s)
        }
    };
    match run {
        Inline::Text {
            text,
            emphasis,
            font,
        } => Inline::Text {
            text: clean(text),
            emphasis,
            font,
        },
        Inline::Link { href, text } => Inline::Link {
            href: href.trim().to_string(),
            text: clean(text),
        },
        Inline::CrossRef { label, text } => Inline::CrossRef {
            label,
            text: clean(text),
        },
        other => other,
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip invisible Unicode ──────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
            )
        })
        .collect()
}

// ── Rule 3: Collapse whitespace ──────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\n\u{00A0}]+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").into_owned()
}

// ── Rule 4: Trim block edges ─────────────────────────────────────────────

fn trim_edges(runs: &mut [Inline]) {
    if let Some(Inline::Text { text, .. }) = runs
        .iter_mut()
        .find(|r| !matches!(r, Inline::Text { text, .. } if text.trim().is_empty()))
    {
        *text = text.trim_start().to_string();
    }
    if let Some(Inline::Text { text, .. }) = runs
        .iter_mut()
        .rev()
        .find(|r| !matches!(r, Inline::Text { text, .. } if text.trim().is_empty()))
    {
        *text = text.trim_end().to_string();
    }
    // Whitespace-only runs at the edges carry nothing.
    for run in runs.iter_mut() {
        match run {
            Inline::Text { text, .. } if text.trim().is_empty() => text.clear(),
            _ => break,
        }
    }
    for run in runs.iter_mut().rev() {
        match run {
            Inline::Text { text, .. } if text.trim().is_empty() => text.clear(),
            _ => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ObjectKind, SourceKind, TableCell, VisualObject};

    fn tree(blocks: Vec<RawBlock>) -> BlockTree {
        let mut t = BlockTree::new(SourceKind::Docx);
        t.blocks = blocks;
        t
    }

    fn text_block(s: &str) -> RawBlock {
        RawBlock::styled("Normal", vec![Inline::text(s)])
    }

    #[test]
    fn test_whitespace_and_invisible_chars() {
        let doc = normalize(
            tree(vec![text_block("  Deep\u{200B}  learning\r\nfor\u{00AD}\tall  ")]),
            "x",
        )
        .unwrap();
        assert_eq!(doc.blocks[0].text(), "Deep learning for all");
        assert_eq!(doc.template, Template::Unknown);
    }

    #[test]
    fn test_spaces_between_runs_survive() {
        let doc = normalize(
            tree(vec![RawBlock::styled(
                "Normal",
                vec![
                    Inline::text(" A "),
                    Inline::Text {
                        text: "bold".into(),
                        emphasis: true,
                        font: None,
                    },
                    Inline::text(" word "),
                    Inline::text("   "),
                ],
            )]),
            "x",
        )
        .unwrap();
        assert_eq!(doc.blocks[0].text(), "A bold word");
        assert_eq!(doc.blocks[0].runs.len(), 3);
    }

    #[test]
    fn test_code_keeps_newlines() {
        let doc = normalize(
            tree(vec![RawBlock::styled(
                "latex:code",
                vec![Inline::text("for i in x:\r\n    print(i)")],
            )]),
            "x",
        )
        .unwrap();
        assert_eq!(doc.blocks[0].text(), "for i in x:\n    print(i)");
    }

    #[test]
    fn test_indices_and_blank_blocks_kept() {
        let doc = normalize(
            tree(vec![text_block("a"), text_block("   "), text_block("b")]),
            "x",
        )
        .unwrap();
        let indices: Vec<_> = doc.blocks.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(doc.blocks[1].is_blank());
    }

    #[test]
    fn test_innermost_object_wins() {
        let mut t = tree(vec![text_block("before"), text_block(""), text_block(""), text_block("")]);
        t.blocks[2].runs = vec![Inline::Image { object: 1 }];
        for b in &mut t.blocks[1..4] {
            b.cell = Some(TableCell {
                table: 0,
                row: 0,
                column: 0,
                header: false,
            });
        }
        let mut table = VisualObject::new(0, ObjectKind::Table, 1);
        table.last_block = 3;
        t.objects = vec![table, VisualObject::new(1, ObjectKind::Figure, 2)];

        let doc = normalize(t, "x").unwrap();
        assert_eq!(doc.blocks[0].object, None);
        assert_eq!(doc.blocks[1].object, Some(0));
        assert_eq!(doc.blocks[2].object, Some(1));
        assert_eq!(doc.blocks[3].object, Some(0));
    }

    #[test]
    fn test_object_ranges_clamped() {
        let mut t = tree(vec![text_block("only")]);
        let mut table = VisualObject::new(0, ObjectKind::Table, 5);
        table.last_block = 9;
        t.objects = vec![table];
        let doc = normalize(t, "x").unwrap();
        assert_eq!((doc.objects[0].first_block, doc.objects[0].last_block), (0, 0));
    }

    #[test]
    fn test_empty_documents_rejected() {
        let err = normalize(tree(vec![]), "empty.docx").unwrap_err();
        assert!(matches!(err, PaperCheckError::EmptyDocument { .. }));
        assert!(normalize(tree(vec![text_block(" \u{200B} ")]), "x").is_err());
    }

    #[test]
    fn test_image_only_document_is_not_empty() {
        let mut t = tree(vec![RawBlock::styled("Normal", vec![Inline::Image { object: 0 }])]);
        t.objects = vec![VisualObject::new(0, ObjectKind::Figure, 0)];
        assert!(normalize(t, "x").is_ok());
    }
}
