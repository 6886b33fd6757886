//! Document model shared by every pipeline stage.
//!
//! A compiler turns a raw source into a [`BlockTree`]; the normalizer turns
//! that into a [`Document`] whose [`SourceBlock`]s carry stable sequence
//! indices. Every later stage reads the same `Document` and refers to blocks
//! by index only, so "adjacency" always means "neighbouring indices".

use crate::catalog::Finding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ── Template and source kind ─────────────────────────────────────────────

/// The document template a paper was written against.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Template {
    /// EDM conference proceedings template.
    Edm,
    /// Journal of Educational Data Mining template.
    Jedm,
    /// Neither fingerprint matched; only shared role entries apply.
    #[default]
    Unknown,
}

impl Template {
    pub fn as_str(self) -> &'static str {
        match self {
            Template::Edm => "EDM",
            Template::Jedm => "JEDM",
            Template::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two supported raw source formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Word-processor package (`.docx`).
    Docx,
    /// LaTeX source, either a single `.tex` file or a zipped project.
    Latex,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Docx => "docx",
            SourceKind::Latex => "latex",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Roles ────────────────────────────────────────────────────────────────

/// Semantic meaning of a block, independent of its formatting markup.
///
/// `Unknown` is the default. It produces no warning by itself but disables
/// role-specific checks for the block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SemanticRole {
    Title,
    Author,
    Affiliation,
    Email,
    AbstractHeading,
    Abstract,
    KeywordsHeading,
    Keywords,
    Heading(u8),
    Caption,
    TableHeader,
    TableText,
    Code,
    Body,
    #[default]
    Unknown,
}

impl SemanticRole {
    /// True for every role rendered as a section heading.
    pub fn is_heading(self) -> bool {
        matches!(
            self,
            SemanticRole::Heading(_) | SemanticRole::AbstractHeading | SemanticRole::KeywordsHeading
        )
    }

    /// Heading level, treating the abstract/keywords headings as level 1.
    pub fn heading_level(self) -> Option<u8> {
        match self {
            SemanticRole::Heading(level) => Some(level),
            SemanticRole::AbstractHeading | SemanticRole::KeywordsHeading => Some(1),
            _ => None,
        }
    }
}

// ── Inline content ───────────────────────────────────────────────────────

/// One inline run inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inline {
    /// Plain or emphasised text, with the font it is rendered in when known.
    Text {
        text: String,
        #[serde(default)]
        emphasis: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font: Option<String>,
    },
    /// Hyperlink; `href` is the raw target (`#anchor` for internal links).
    Link { href: String, text: String },
    /// Inline image, pointing at a [`VisualObject`] id.
    Image { object: usize },
    /// Inline math in its source notation.
    Math { source: String },
    /// Internal cross reference to a label.
    CrossRef { label: String, text: String },
    /// Citation by bibliography key (LaTeX `\cite`).
    Citation { keys: Vec<String> },
}

impl Inline {
    /// Plain, unemphasised text run.
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text {
            text: text.into(),
            emphasis: false,
            font: None,
        }
    }

    /// The text this run contributes to its block's plain text.
    pub fn plain_text(&self) -> &str {
        match self {
            Inline::Text { text, .. } | Inline::Link { text, .. } | Inline::CrossRef { text, .. } => {
                text
            }
            Inline::Math { source } => source,
            Inline::Image { .. } | Inline::Citation { .. } => "",
        }
    }
}

// ── Blocks ───────────────────────────────────────────────────────────────

/// Position of a block inside a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    /// Id of the owning table [`VisualObject`].
    pub table: usize,
    /// 0-based row within the table.
    pub row: usize,
    /// 0-based column within the row.
    pub column: usize,
    /// The row is marked as a header row in the source.
    pub header: bool,
}

/// A block as produced by a compiler, before sequence indices are assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBlock {
    /// Raw style identifier (style name for DOCX, `latex:*` for LaTeX).
    pub style: Option<String>,
    pub runs: Vec<Inline>,
    pub cell: Option<TableCell>,
    /// Labels defined on this block (bookmarks, `\label`).
    pub labels: Vec<String>,
    /// 1-based source line, when the compiler knows it.
    pub line: Option<usize>,
}

impl RawBlock {
    pub fn styled(style: impl Into<String>, runs: Vec<Inline>) -> Self {
        Self {
            style: Some(style.into()),
            runs,
            ..Self::default()
        }
    }
}

/// One logical unit of document content.
///
/// Created by the normalizer and never removed; later stages only annotate
/// `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBlock {
    /// Position in document order; unique and stable.
    pub index: usize,
    pub style: Option<String>,
    pub runs: Vec<Inline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<TableCell>,
    /// Nested table or figure this block belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default)]
    pub role: SemanticRole,
}

impl SourceBlock {
    /// Concatenated plain text of all runs.
    pub fn text(&self) -> String {
        self.runs.iter().map(Inline::plain_text).collect()
    }

    /// Ids of images embedded in this block.
    pub fn images(&self) -> impl Iterator<Item = usize> + '_ {
        self.runs.iter().filter_map(|r| match r {
            Inline::Image { object } => Some(*object),
            _ => None,
        })
    }

    /// A block with no visible text, image or math.
    pub fn is_blank(&self) -> bool {
        self.runs.iter().all(|r| match r {
            Inline::Text { text, .. } => text.trim().is_empty(),
            Inline::Link { text, .. } | Inline::CrossRef { text, .. } => text.trim().is_empty(),
            Inline::Math { .. } | Inline::Image { .. } | Inline::Citation { .. } => false,
        })
    }
}

// ── Visual objects ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Figure,
    Table,
    Chart,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Figure => "figure",
            ObjectKind::Table => "table",
            ObjectKind::Chart => "chart",
        }
    }
}

/// Image encoding of a figure, derived from its file extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Svg,
    Tiff,
    Bmp,
    Emf,
    Wmf,
    Pdf,
    Eps,
    Other(String),
}

impl ImageFormat {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "png" => ImageFormat::Png,
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "gif" => ImageFormat::Gif,
            "svg" => ImageFormat::Svg,
            "tif" | "tiff" => ImageFormat::Tiff,
            "bmp" => ImageFormat::Bmp,
            "emf" => ImageFormat::Emf,
            "wmf" => ImageFormat::Wmf,
            "pdf" => ImageFormat::Pdf,
            "eps" => ImageFormat::Eps,
            other => ImageFormat::Other(other.to_string()),
        }
    }

    /// Format of a path or URL-like target, if it has an extension.
    pub fn from_target(target: &str) -> Option<Self> {
        let name = target.rsplit(['/', '\\']).next().unwrap_or(target);
        let (_, ext) = name.rsplit_once('.')?;
        if ext.is_empty() {
            return None;
        }
        Some(Self::from_extension(ext))
    }
}

/// A positioned figure, table or chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualObject {
    pub id: usize,
    pub kind: ObjectKind,
    /// First block index occupied by the object.
    pub first_block: usize,
    /// Last block index occupied by the object (equal to `first_block`
    /// for figures and charts).
    pub last_block: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    /// Image path or relationship target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    /// Caption block matched to this object (back-reference only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<usize>,
}

impl VisualObject {
    pub fn new(id: usize, kind: ObjectKind, block: usize) -> Self {
        Self {
            id,
            kind,
            first_block: block,
            last_block: block,
            alt_text: None,
            target: None,
            format: None,
            caption: None,
        }
    }
}

// ── Trees ────────────────────────────────────────────────────────────────

/// Template fingerprints found outside the block content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateMarkers {
    /// Class files bundled with a LaTeX project (`jedm.cls`, ...).
    #[serde(default)]
    pub class_files: BTreeSet<String>,
    /// Argument of `\documentclass`.
    #[serde(default)]
    pub document_class: Option<String>,
    /// Packages loaded with `\usepackage`.
    #[serde(default)]
    pub packages: BTreeSet<String>,
}

/// Output of a [`crate::pipeline::compile::DocumentCompiler`].
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTree {
    pub kind: SourceKind,
    pub blocks: Vec<RawBlock>,
    /// Objects whose block positions index into `blocks`.
    pub objects: Vec<VisualObject>,
    pub markers: TemplateMarkers,
    /// Soft findings raised while compiling the source.
    pub notes: Vec<Finding>,
}

impl BlockTree {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            blocks: Vec::new(),
            objects: Vec::new(),
            markers: TemplateMarkers::default(),
            notes: Vec::new(),
        }
    }
}

/// The normalized, role-bound document every checker reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub kind: SourceKind,
    pub template: Template,
    pub blocks: Vec<SourceBlock>,
    pub objects: Vec<VisualObject>,
    #[serde(default)]
    pub markers: TemplateMarkers,
    /// Roles the template treats as present whenever another role is.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub implied_roles: BTreeSet<SemanticRole>,
    #[serde(skip)]
    pub notes: Vec<Finding>,
}

impl Document {
    /// True when a block carries `role` or the template implies it.
    pub fn has_role(&self, role: SemanticRole) -> bool {
        self.implied_roles.contains(&role) || self.blocks.iter().any(|b| b.role == role)
    }

    pub fn blocks_with_role(&self, role: SemanticRole) -> impl Iterator<Item = &SourceBlock> {
        self.blocks.iter().filter(move |b| b.role == role)
    }

    /// Cell blocks of one table, in document order.
    pub fn table_cells(&self, table: usize) -> impl Iterator<Item = (&SourceBlock, TableCell)> {
        self.blocks
            .iter()
            .filter_map(move |b| b.cell.filter(|c| c.table == table).map(|c| (b, c)))
    }

    /// Number of distinct rows in a table.
    pub fn table_row_count(&self, table: usize) -> usize {
        self.table_cells(table)
            .map(|(_, c)| c.row)
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn object(&self, id: usize) -> Option<&VisualObject> {
        self.objects.iter().find(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: usize, runs: Vec<Inline>) -> SourceBlock {
        SourceBlock {
            index,
            style: None,
            runs,
            cell: None,
            object: None,
            labels: vec![],
            line: None,
            role: SemanticRole::Unknown,
        }
    }

    #[test]
    fn test_block_text_skips_images_and_citations() {
        let b = block(
            0,
            vec![
                Inline::text("See "),
                Inline::Image { object: 2 },
                Inline::Citation {
                    keys: vec!["k".into()],
                },
                Inline::CrossRef {
                    label: "fig:a".into(),
                    text: "Figure 1".into(),
                },
            ],
        );
        assert_eq!(b.text(), "See Figure 1");
        assert_eq!(b.images().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn test_blank_detection() {
        assert!(block(0, vec![Inline::text("  \t")]).is_blank());
        assert!(block(0, vec![]).is_blank());
        assert!(!block(0, vec![Inline::Image { object: 0 }]).is_blank());
        assert!(!block(0, vec![Inline::text("x")]).is_blank());
    }

    #[test]
    fn test_image_format_from_target() {
        assert_eq!(
            ImageFormat::from_target("media/image1.PNG"),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::from_target("figs\\plot.wmf"),
            Some(ImageFormat::Wmf)
        );
        assert_eq!(ImageFormat::from_target("figs/plot"), None);
        assert_eq!(
            ImageFormat::from_target("a.xyz"),
            Some(ImageFormat::Other("xyz".into()))
        );
    }

    #[test]
    fn test_heading_roles() {
        assert!(SemanticRole::Heading(2).is_heading());
        assert!(SemanticRole::AbstractHeading.is_heading());
        assert!(!SemanticRole::Caption.is_heading());
        assert_eq!(SemanticRole::KeywordsHeading.heading_level(), Some(1));
    }

    #[test]
    fn test_template_serde_names() {
        assert_eq!(serde_json::to_string(&Template::Jedm).unwrap(), "\"JEDM\"");
        let t: Template = serde_json::from_str("\"EDM\"").unwrap();
        assert_eq!(t, Template::Edm);
    }
}
