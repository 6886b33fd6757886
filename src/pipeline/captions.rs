//! Caption/object matching.
//!
//! Captions belong below figures and charts and above tables. The matcher
//! never moves anything: it only decides which caption block an object
//! points at and reports what is wrong with the placement or the text.
//!
//! The search for one object runs in three passes, stopping at the first
//! hit:
//!
//! 1. the canonical side, within `caption_window` non-blank blocks
//!    ([`CaptionSearch::Adjacent`]);
//! 2. the opposite side, within the same window
//!    ([`CaptionSearch::Distant`], the caption is on the wrong side);
//! 3. the canonical side, further out, up to the next object of the same
//!    kind ([`CaptionSearch::Distant`]).
//!
//! Equidistant candidates therefore always resolve to the canonical side,
//! and within one side to the first block in document order.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, ObjectKind, SemanticRole, SourceBlock, VisualObject};
use crate::pipeline::CheckSettings;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_CAPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(Figure|Fig\.|Table)\s*(\d+)?").unwrap());

/// What a caption's leading keyword says it captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionKind {
    Figure,
    Table,
}

/// Parsed caption label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptionLabel {
    pub kind: CaptionKind,
    pub number: Option<u32>,
    /// The matched label text, e.g. `Figure 3`.
    pub label: String,
    /// Everything after the label.
    pub rest: String,
}

/// Read the `Figure N` / `Table N` label at the start of a caption.
pub fn caption_label(text: &str) -> Option<CaptionLabel> {
    let caps = RE_CAPTION.captures(text)?;
    let whole = caps.get(0)?;
    let kind = if caps[1].eq_ignore_ascii_case("table") {
        CaptionKind::Table
    } else {
        CaptionKind::Figure
    };
    Some(CaptionLabel {
        kind,
        number: caps.get(2).and_then(|m| m.as_str().parse().ok()),
        label: whole.as_str().trim().to_string(),
        rest: text[whole.end()..].to_string(),
    })
}

/// Result of looking for one object's caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptionSearch {
    /// A caption within the window on the canonical side.
    Adjacent(usize),
    /// A caption exists but is too far away or on the wrong side.
    Distant(usize),
    None,
}

impl CaptionSearch {
    pub fn block(self) -> Option<usize> {
        match self {
            CaptionSearch::Adjacent(b) | CaptionSearch::Distant(b) => Some(b),
            CaptionSearch::None => None,
        }
    }
}

fn expected_kind(kind: ObjectKind) -> CaptionKind {
    match kind {
        ObjectKind::Table => CaptionKind::Table,
        ObjectKind::Figure | ObjectKind::Chart => CaptionKind::Figure,
    }
}

/// A caption-role block that could caption an object of `kind`. Captions
/// with no recognisable keyword are accepted for any kind.
fn is_candidate(block: &SourceBlock, kind: CaptionKind) -> bool {
    block.role == SemanticRole::Caption
        && caption_label(&block.text()).is_none_or(|l| l.kind == kind)
}

/// A paragraph holding nothing but pictures, treated as part of a figure group.
fn is_image_only(block: &SourceBlock) -> bool {
    block.images().next().is_some() && block.text().trim().is_empty()
}

/// Find the caption for `obj`.
pub fn match_caption(doc: &Document, obj: &VisualObject, window: usize) -> CaptionSearch {
    let kind = expected_kind(obj.kind);

    // A DOCX picture can sit inside its own caption paragraph.
    if obj.kind != ObjectKind::Table {
        if let Some(anchor) = doc.blocks.get(obj.first_block) {
            if anchor.role == SemanticRole::Caption && caption_label(&anchor.text()).is_some() {
                return CaptionSearch::Adjacent(anchor.index);
            }
        }
    }

    let below = || doc.blocks.iter().skip(obj.last_block + 1);
    let above = || doc.blocks[..obj.first_block].iter().rev();
    let canonical_below = obj.kind != ObjectKind::Table;

    let first = if canonical_below {
        scan(below(), obj, kind, Some(window))
    } else {
        scan(above(), obj, kind, Some(window))
    };
    if let Some(b) = first {
        return CaptionSearch::Adjacent(b);
    }

    let wrong_side = if canonical_below {
        scan(above(), obj, kind, Some(window))
    } else {
        scan(below(), obj, kind, Some(window))
    };
    if let Some(b) = wrong_side {
        return CaptionSearch::Distant(b);
    }

    let far = if canonical_below {
        scan(below(), obj, kind, None)
    } else {
        scan(above(), obj, kind, None)
    };
    far.map_or(CaptionSearch::None, CaptionSearch::Distant)
}

fn scan<'a>(
    blocks: impl Iterator<Item = &'a SourceBlock>,
    obj: &VisualObject,
    kind: CaptionKind,
    window: Option<usize>,
) -> Option<usize> {
    let mut gap = 0usize;
    for block in blocks {
        if block.object == Some(obj.id) || block.is_blank() {
            continue;
        }
        if is_candidate(block, kind) {
            return Some(block.index);
        }
        // The next object of the same kind owns whatever follows.
        if window.is_none() && starts_same_kind_object(block, obj) {
            return None;
        }
        if kind == CaptionKind::Figure && is_image_only(block) {
            continue;
        }
        gap += 1;
        if window.is_some_and(|w| gap > w) {
            return None;
        }
    }
    None
}

fn starts_same_kind_object(block: &SourceBlock, obj: &VisualObject) -> bool {
    match obj.kind {
        ObjectKind::Table => block.cell.is_some_and(|c| c.table != obj.id),
        ObjectKind::Figure | ObjectKind::Chart => {
            block.images().any(|id| id != obj.id) && !is_image_only(block)
        }
    }
}

/// Point every object at its caption block.
pub fn link_captions(doc: &mut Document, window: usize) {
    let links: Vec<Option<usize>> = doc
        .objects
        .iter()
        .map(|o| match_caption(doc, o, window).block())
        .collect();
    for (obj, caption) in doc.objects.iter_mut().zip(links) {
        obj.caption = caption;
    }
}

/// 1-based position of `obj` among the objects of its kind.
pub(crate) fn ordinal(doc: &Document, obj: &VisualObject) -> usize {
    doc.objects
        .iter()
        .filter(|o| o.kind == obj.kind && o.first_block <= obj.first_block)
        .count()
}

/// Short human description of an object for warning contexts.
pub(crate) fn describe(doc: &Document, obj: &VisualObject) -> String {
    let name = match obj.kind {
        ObjectKind::Figure => "Figure",
        ObjectKind::Table => "Table",
        ObjectKind::Chart => "Chart",
    };
    let mut s = format!("{name} index {}", ordinal(doc, obj));
    if let Some(alt) = obj.alt_text.as_deref() {
        s.push_str(&format!(" with alt text \"{}\"", snippet(alt, 40)));
    } else if let Some(target) = obj.target.as_deref() {
        s.push_str(&format!(" ({target})"));
    }
    s
}

pub(crate) fn snippet(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn caption_context(text: &str) -> String {
    format!("Caption text: \"{}\"", text.trim())
}

/// Run every caption check.
pub fn check_captions(doc: &Document, settings: &CheckSettings) -> Vec<Finding> {
    let mut findings = Vec::new();
    object_placement(doc, settings, &mut findings);
    for block in doc.blocks_with_role(SemanticRole::Caption) {
        caption_text(doc, block, settings, &mut findings);
    }
    findings
}

fn object_placement(doc: &Document, settings: &CheckSettings, out: &mut Vec<Finding>) {
    for obj in &doc.objects {
        if obj.kind == ObjectKind::Table && doc.table_row_count(obj.id) <= 1 {
            continue;
        }
        let code = match obj.kind {
            ObjectKind::Figure => WarningCode::FigureCaptionDistance,
            ObjectKind::Table => WarningCode::TableCaptionDistance,
            ObjectKind::Chart => WarningCode::ChartCaptionDistance,
        };
        match match_caption(doc, obj, settings.caption_window) {
            CaptionSearch::Adjacent(_) => {}
            CaptionSearch::Distant(b) => {
                let block = &doc.blocks[b];
                out.push(
                    Finding::new(code)
                        .with_context(caption_context(&block.text()))
                        .at_block(obj.first_block)
                        .at_line(doc.blocks[obj.first_block].line),
                );
            }
            // Tables without any caption are reported by the table checks.
            CaptionSearch::None if obj.kind == ObjectKind::Table => {}
            CaptionSearch::None => {
                if let Some(next) = unstyled_caption(doc, obj) {
                    out.push(
                        Finding::new(WarningCode::FigureCaptionUnstyled)
                            .with_context(format!("{}...", snippet(&next.text(), 20)))
                            .at_block(next.index)
                            .at_line(next.line),
                    );
                } else {
                    out.push(
                        Finding::new(code)
                            .with_context(describe(doc, obj))
                            .at_block(obj.first_block)
                            .at_line(doc.blocks[obj.first_block].line),
                    );
                }
            }
        }
    }
}

/// The block right after a picture that reads like a caption but is not
/// styled as one.
fn unstyled_caption<'a>(doc: &'a Document, obj: &VisualObject) -> Option<&'a SourceBlock> {
    let next = doc
        .blocks
        .iter()
        .skip(obj.last_block + 1)
        .find(|b| !b.is_blank())?;
    (next.role != SemanticRole::Caption && next.text().trim_start().starts_with("Figure "))
        .then_some(next)
}

fn caption_text(
    doc: &Document,
    block: &SourceBlock,
    settings: &CheckSettings,
    out: &mut Vec<Finding>,
) {
    let text = block.text();
    let at = |code: WarningCode| Finding::new(code).at_block(block.index).at_line(block.line);

    if block.cell.is_some() {
        out.push(at(WarningCode::CaptionInTable).with_context(caption_context(&text)));
    }

    let Some(label) = caption_label(&text) else {
        let context = if text.trim().is_empty() {
            format!(
                "Caption text: BLANK; text before: \"{}\" after: \"{}\"",
                neighbour_text(doc.blocks[..block.index].iter().rev()),
                neighbour_text(doc.blocks.iter().skip(block.index + 1)),
            )
        } else {
            caption_context(&text)
        };
        out.push(at(WarningCode::UnknownCaptionType).with_context(context));
        return;
    };

    let description = label
        .rest
        .trim_start_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation());
    if description.trim().is_empty() {
        out.push(at(WarningCode::FigureCaptionBlank).with_context(caption_context(&text)));
    } else if label.number.is_some() {
        let after = label.rest.chars().next();
        if !after.is_some_and(|c| settings.caption_punctuation.contains(c)) {
            out.push(at(WarningCode::NoCaptionNumberPeriod).with_context(label.label.clone()));
        }
    }

    if label.kind == CaptionKind::Table {
        let next = doc
            .blocks
            .iter()
            .skip(block.index + 1)
            .find(|b| !b.is_blank());
        if next.is_some_and(|b| b.cell.is_none() && b.images().next().is_some()) {
            out.push(at(WarningCode::ImageAsTable).with_context(caption_context(&text)));
        }
    }
}

fn neighbour_text<'a>(mut blocks: impl Iterator<Item = &'a SourceBlock>) -> String {
    blocks
        .find(|b| !b.text().trim().is_empty())
        .map(|b| b.text().trim().to_string())
        .unwrap_or_default()
}
