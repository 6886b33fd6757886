//! Typography: symbol fonts, link schemes and quotation mark direction.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, Inline, SemanticRole, SourceBlock};
use crate::pipeline::CheckSettings;
use once_cell::sync::Lazy;
use regex::Regex;

/// Fonts whose glyphs carry no text meaning for a screen reader.
const SYMBOL_FONTS: &[&str] = &["wingdings", "webdings"];

const URL_SCHEMES: &[&str] = &["#", "http://", "https://", "mailto:", "ftp://"];

/// A closing quote opening a word, or an opening quote closing one.
static RE_QUOTE_DIRECTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\s”\w|\w“\s)").unwrap());

const SNIPPET_CHARS: usize = 20;

pub fn check_typography(doc: &Document, _: &CheckSettings) -> Vec<Finding> {
    let mut findings = Vec::new();
    for block in &doc.blocks {
        symbol_fonts(block, &mut findings);
        url_schemes(block, &mut findings);
        if block.role != SemanticRole::Code {
            quote_direction(block, &mut findings);
        }
    }
    findings
}

fn symbol_fonts(block: &SourceBlock, out: &mut Vec<Finding>) {
    for run in &block.runs {
        let Inline::Text {
            text,
            font: Some(font),
            ..
        } = run
        else {
            continue;
        };
        let font = font.to_lowercase();
        if SYMBOL_FONTS.iter().any(|f| font.contains(f)) {
            out.push(
                Finding::new(WarningCode::Wingdings)
                    .with_context(text.trim())
                    .at_block(block.index)
                    .at_line(block.line),
            );
        }
    }
}

fn url_schemes(block: &SourceBlock, out: &mut Vec<Finding>) {
    for run in &block.runs {
        let Inline::Link { href, .. } = run else {
            continue;
        };
        if href.is_empty() || URL_SCHEMES.iter().any(|s| href.starts_with(s)) {
            continue;
        }
        out.push(
            Finding::new(WarningCode::UrlSchema)
                .with_context(href.as_str())
                .at_block(block.index)
                .at_line(block.line),
        );
    }
}

fn quote_direction(block: &SourceBlock, out: &mut Vec<Finding>) {
    let text = block.text();
    for m in RE_QUOTE_DIRECTION.find_iter(&text) {
        let before: String = text[..m.start()]
            .chars()
            .rev()
            .take(SNIPPET_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        let after: String = text[m.end()..].chars().take(SNIPPET_CHARS).collect();
        let snippet = format!("{before}{}{after}", m.as_str()).replace('\n', " ");
        let Some((rel, mark)) = m.as_str().char_indices().find(|(_, c)| matches!(c, '“' | '”'))
        else {
            continue;
        };
        // Character offset of the mark, so two marks in a short block stay distinct.
        let offset = text[..m.start() + rel].chars().count();
        out.push(
            Finding::new(WarningCode::QuoteDirection)
                .with_context(format!("Quote {mark} at offset {offset}: \"{snippet}\""))
                .at_block(block.index)
                .at_line(block.line),
        );
    }
}
