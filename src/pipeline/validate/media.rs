//! Alt text and image format checks on visual objects.
//!
//! Alt text doubles as the identity key of an image downstream, so two
//! objects sharing one alt string is treated as seriously as a missing one.

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, ImageFormat, ObjectKind, VisualObject};
use crate::pipeline::captions::{describe, snippet};
use crate::pipeline::CheckSettings;
use std::collections::HashSet;

fn finding(doc: &Document, obj: &VisualObject, code: WarningCode) -> Finding {
    Finding::new(code)
        .at_block(obj.first_block)
        .at_line(doc.blocks.get(obj.first_block).and_then(|b| b.line))
}

/// Missing, overlong and duplicated alt text.
///
/// Figures and charts must carry alt text. Tables are only checked when
/// they carry some, since their cells are readable on their own.
/// The author checklist lists tables too, but the HTML converter only
/// reads `alt` from pictures; keep tables exempt.
pub fn check_alt_text(doc: &Document, settings: &CheckSettings) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();

    for obj in &doc.objects {
        let alt = obj.alt_text.as_deref().filter(|a| !a.trim().is_empty());
        let Some(alt) = alt else {
            if obj.kind != ObjectKind::Table {
                findings.push(
                    finding(doc, obj, WarningCode::AltTextMissing).with_context(describe(doc, obj)),
                );
            }
            continue;
        };

        if alt.chars().count() > settings.alt_text_max_chars {
            findings.push(
                finding(doc, obj, WarningCode::AltTextLong).with_context(snippet(alt, 100)),
            );
        }
        if !seen.insert(alt) {
            findings.push(
                finding(doc, obj, WarningCode::AltTextDuplicate)
                    .with_context(format!("Alt text: \"{}\"", snippet(alt, 100))),
            );
        }
    }
    findings
}

/// Picture formats the HTML output cannot show.
pub fn check_image_formats(doc: &Document, _: &CheckSettings) -> Vec<Finding> {
    doc.objects
        .iter()
        .filter_map(|obj| match obj.format.as_ref()? {
            ImageFormat::Wmf => Some(
                finding(doc, obj, WarningCode::WmfImages).with_context(describe(doc, obj)),
            ),
            ImageFormat::Other(ext) => Some(
                finding(doc, obj, WarningCode::UnknownImageType).with_context(ext.as_str()),
            ),
            _ => None,
        })
        .collect()
}
