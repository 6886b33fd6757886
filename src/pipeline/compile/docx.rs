//! DOCX reader: `word/document.xml` to a [`BlockTree`].
//!
//! Every `w:p` becomes one block carrying its style *name* (resolved through
//! `word/styles.xml`), so role lookup works on the names authors see in
//! Word. Table cell paragraphs are blocks too, tagged with their cell
//! position. Drawings, VML pictures and charts become [`VisualObject`]s
//! anchored at the block that contains them.

use super::read_member;
use crate::error::CompileError;
use crate::model::{
    BlockTree, ImageFormat, Inline, ObjectKind, RawBlock, SourceKind, TableCell, VisualObject,
};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;
use std::io::Cursor;
use tracing::debug;
use zip::ZipArchive;

const DOCUMENT_XML: &str = "word/document.xml";
const STYLES_XML: &str = "word/styles.xml";
const DOCUMENT_RELS: &str = "word/_rels/document.xml.rels";

/// Word's "last edit position" bookmark, never a real label.
const GO_BACK: &str = "_GoBack";

static RE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]*)""#).unwrap());

/// Compile a DOCX package.
pub fn compile(bytes: &[u8]) -> Result<BlockTree, CompileError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| CompileError::new(SourceKind::Docx, format!("not a zip package: {e}")))?;

    let document = read_member(&mut archive, DOCUMENT_XML, SourceKind::Docx)?.ok_or_else(|| {
        CompileError::new(SourceKind::Docx, format!("{DOCUMENT_XML} is missing"))
    })?;
    let styles = match read_member(&mut archive, STYLES_XML, SourceKind::Docx)? {
        Some(xml) => parse_styles(&xml)?,
        None => HashMap::new(),
    };
    let rels = match read_member(&mut archive, DOCUMENT_RELS, SourceKind::Docx)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let tree = Walker::new(&styles, &rels).walk(&document)?;
    debug!(
        "DOCX: {} blocks, {} objects, {} styles",
        tree.blocks.len(),
        tree.objects.len(),
        styles.len()
    );
    Ok(tree)
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> CompileError {
    CompileError::new(SourceKind::Docx, format!("malformed {part}: {e}"))
}

// ── Package parts ────────────────────────────────────────────────────────

/// Style id → display name.
fn parse_styles(xml: &str) -> Result<HashMap<String, String>, CompileError> {
    let mut reader = Reader::from_str(xml);
    let mut styles = HashMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:style" => current = attr(&e, b"styleId"),
                b"w:name" => {
                    if let (Some(id), Some(name)) = (current.as_ref(), attr(&e, b"val")) {
                        styles.insert(id.clone(), name);
                    }
                }
                _ => {}
            },
            Ok(Event::End(e)) if e.name().as_ref() == b"w:style" => current = None,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(STYLES_XML, e)),
            _ => {}
        }
    }
    Ok(styles)
}

/// Relationship id → target.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, CompileError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(DOCUMENT_RELS, e)),
            _ => {}
        }
    }
    Ok(rels)
}

// ── Document walker ──────────────────────────────────────────────────────

#[derive(Default)]
struct Paragraph {
    style_id: Option<String>,
    runs: Vec<Inline>,
    labels: Vec<String>,
    objects: Vec<usize>,
}

#[derive(Default)]
struct RunProps {
    font: Option<String>,
    emphasis: bool,
}

struct Hyperlink {
    href: String,
    text: String,
}

#[derive(PartialEq)]
enum FieldPhase {
    Instruction,
    Result,
}

struct Field {
    instr: String,
    result: String,
    phase: FieldPhase,
    /// Nesting depth of complex fields (`w:fldChar`); 0 for `w:fldSimple`.
    depth: usize,
}

#[derive(Default)]
struct Picture {
    alt: Option<String>,
    title: Option<String>,
    image: Option<String>,
    chart: bool,
}

struct TableState {
    id: usize,
    row: Option<usize>,
    column: Option<usize>,
    header: bool,
}

struct Walker<'a> {
    styles: &'a HashMap<String, String>,
    rels: &'a HashMap<String, String>,
    tree: BlockTree,
    para: Option<Paragraph>,
    pending_labels: Vec<String>,
    run: RunProps,
    in_run_props: bool,
    in_para_props: bool,
    in_text: bool,
    in_instr: bool,
    link: Option<Hyperlink>,
    field: Option<Field>,
    picture: Option<Picture>,
    math: Option<String>,
    math_depth: usize,
    tables: Vec<TableState>,
    textbox_depth: usize,
}

impl<'a> Walker<'a> {
    fn new(styles: &'a HashMap<String, String>, rels: &'a HashMap<String, String>) -> Self {
        Self {
            styles,
            rels,
            tree: BlockTree::new(SourceKind::Docx),
            para: None,
            pending_labels: Vec::new(),
            run: RunProps::default(),
            in_run_props: false,
            in_para_props: false,
            in_text: false,
            in_instr: false,
            link: None,
            field: None,
            picture: None,
            math: None,
            math_depth: 0,
            tables: Vec::new(),
            textbox_depth: 0,
        }
    }

    fn walk(mut self, xml: &str) -> Result<BlockTree, CompileError> {
        let mut reader = Reader::from_str(xml);

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => self.start(&e),
                Ok(Event::Empty(e)) => {
                    self.start(&e);
                    self.end(e.name().as_ref());
                }
                Ok(Event::End(e)) => self.end(e.name().as_ref()),
                Ok(Event::Text(e)) => self.text(&String::from_utf8_lossy(e.as_ref())),
                Ok(Event::GeneralRef(e)) => {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        self.text(&resolved);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(DOCUMENT_XML, e)),
                _ => {}
            }
        }

        if !self.pending_labels.is_empty() {
            if let Some(last) = self.tree.blocks.last_mut() {
                last.labels.append(&mut self.pending_labels);
            }
        }
        Ok(self.tree)
    }

    fn start(&mut self, e: &BytesStart) {
        match e.name().as_ref() {
            b"w:p" if self.textbox_depth == 0 => {
                self.para = Some(Paragraph {
                    labels: std::mem::take(&mut self.pending_labels),
                    ..Paragraph::default()
                });
            }
            b"w:pPr" => self.in_para_props = true,
            b"w:pStyle" if self.in_para_props && self.textbox_depth == 0 => {
                if let Some(p) = self.para.as_mut() {
                    p.style_id = attr(e, b"val");
                }
            }
            b"w:r" => self.run = RunProps::default(),
            b"w:rPr" if !self.in_para_props => self.in_run_props = true,
            b"w:rFonts" if self.in_run_props => {
                self.run.font = attr(e, b"ascii").or_else(|| attr(e, b"hAnsi"));
            }
            b"w:i" | b"w:b" if self.in_run_props => {
                if is_on(e) {
                    self.run.emphasis = true;
                }
            }
            b"w:t" | b"m:t" => self.in_text = true,
            b"w:instrText" => self.in_instr = true,
            b"w:tab" | b"w:br" | b"w:cr" if !self.in_para_props && !self.in_run_props => {
                self.content(" ")
            }
            b"w:sym" => self.symbol(e),
            b"w:hyperlink" => {
                let href = attr(e, b"anchor")
                    .map(|a| format!("#{a}"))
                    .or_else(|| attr(e, b"id").and_then(|id| self.rels.get(&id).cloned()))
                    .unwrap_or_default();
                self.link = Some(Hyperlink {
                    href,
                    text: String::new(),
                });
            }
            b"w:fldSimple" => {
                self.field = Some(Field {
                    instr: attr(e, b"instr").unwrap_or_default(),
                    result: String::new(),
                    phase: FieldPhase::Result,
                    depth: 0,
                });
            }
            b"w:fldChar" => self.field_char(e),
            b"w:bookmarkStart" => {
                if let Some(name) = attr(e, b"name").filter(|n| n != GO_BACK) {
                    match self.para.as_mut() {
                        Some(p) => p.labels.push(name),
                        None => self.pending_labels.push(name),
                    }
                }
            }
            b"w:drawing" | b"w:pict" => self.picture = Some(Picture::default()),
            b"wp:docPr" | b"v:shape" => {
                if let Some(pic) = self.picture.as_mut() {
                    let alt_key: &[u8] = if e.name().as_ref() == b"v:shape" { b"alt" } else { b"descr" };
                    pic.alt = attr(e, alt_key).or(pic.alt.take());
                    pic.title = attr(e, b"title").or(pic.title.take());
                }
            }
            b"a:blip" => {
                if let Some(pic) = self.picture.as_mut() {
                    pic.image = attr(e, b"embed").or_else(|| attr(e, b"link"));
                }
            }
            b"v:imagedata" => {
                if let Some(pic) = self.picture.as_mut() {
                    pic.image = attr(e, b"id");
                    if pic.title.is_none() {
                        pic.title = attr(e, b"title");
                    }
                }
            }
            b"c:chart" => {
                if let Some(pic) = self.picture.as_mut() {
                    pic.chart = true;
                }
            }
            b"m:oMath" => {
                self.math_depth += 1;
                if self.math_depth == 1 {
                    self.math = Some(String::new());
                }
            }
            b"w:txbxContent" => self.textbox_depth += 1,
            b"w:tbl" if self.textbox_depth == 0 => {
                let id = self.tree.objects.len();
                self.tree.objects.push(VisualObject::new(
                    id,
                    ObjectKind::Table,
                    self.tree.blocks.len(),
                ));
                self.tables.push(TableState {
                    id,
                    row: None,
                    column: None,
                    header: false,
                });
            }
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    t.row = Some(t.row.map_or(0, |r| r + 1));
                    t.column = None;
                    t.header = false;
                }
            }
            b"w:tblHeader" => {
                if let Some(t) = self.tables.last_mut() {
                    t.header = is_on(e);
                }
            }
            b"w:tc" => {
                if let Some(t) = self.tables.last_mut() {
                    t.column = Some(t.column.map_or(0, |c| c + 1));
                }
            }
            b"w:tblDescription" | b"w:tblCaption" => {
                let is_description = e.name().as_ref() == b"w:tblDescription";
                if let (Some(t), Some(val)) = (self.tables.last(), attr(e, b"val")) {
                    let obj = &mut self.tree.objects[t.id];
                    if is_description || obj.alt_text.is_none() {
                        obj.alt_text = Some(val).filter(|v| !v.trim().is_empty());
                    }
                }
            }
            _ => {}
        }
    }

    fn end(&mut self, name: &[u8]) {
        match name {
            b"w:p" if self.textbox_depth == 0 => self.finish_paragraph(),
            b"w:pPr" => self.in_para_props = false,
            b"w:rPr" => self.in_run_props = false,
            b"w:t" | b"m:t" => self.in_text = false,
            b"w:instrText" => self.in_instr = false,
            b"w:hyperlink" => {
                if let Some(link) = self.link.take() {
                    self.push_inline(Inline::Link {
                        href: link.href,
                        text: link.text,
                    });
                }
            }
            b"w:fldSimple" => {
                if let Some(field) = self.field.take() {
                    self.push_inline(field_inline(&field.instr, field.result));
                }
            }
            b"w:drawing" | b"w:pict" => self.finish_picture(),
            b"m:oMath" => {
                self.math_depth = self.math_depth.saturating_sub(1);
                if self.math_depth == 0 {
                    if let Some(source) = self.math.take() {
                        self.push_inline(Inline::Math { source });
                    }
                }
            }
            b"w:txbxContent" => self.textbox_depth = self.textbox_depth.saturating_sub(1),
            b"w:tbl" if self.textbox_depth == 0 => {
                if let Some(t) = self.tables.pop() {
                    let last = self.tree.blocks.len().saturating_sub(1);
                    let obj = &mut self.tree.objects[t.id];
                    obj.last_block = last.max(obj.first_block);
                }
            }
            _ => {}
        }
    }

    /// Route character data to whatever is currently collecting it.
    fn text(&mut self, s: &str) {
        if self.in_instr {
            if let Some(f) = self.field.as_mut().filter(|f| f.depth == 1) {
                f.instr.push_str(s);
            }
            return;
        }
        if !self.in_text {
            return;
        }
        if let Some(math) = self.math.as_mut() {
            math.push_str(s);
            return;
        }
        self.content(s);
    }

    /// Visible run text: a field result, a link label or the paragraph.
    fn content(&mut self, s: &str) {
        if let Some(f) = self
            .field
            .as_mut()
            .filter(|f| f.phase == FieldPhase::Result)
        {
            f.result.push_str(s);
            return;
        }
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(s);
            return;
        }
        let Some(para) = self.para.as_mut() else {
            return;
        };
        if let Some(Inline::Text {
            text,
            emphasis,
            font,
        }) = para.runs.last_mut()
        {
            if *emphasis == self.run.emphasis && *font == self.run.font {
                text.push_str(s);
                return;
            }
        }
        para.runs.push(Inline::Text {
            text: s.to_string(),
            emphasis: self.run.emphasis,
            font: self.run.font.clone(),
        });
    }

    fn push_inline(&mut self, inline: Inline) {
        if let Some(p) = self.para.as_mut() {
            p.runs.push(inline);
        }
    }

    fn symbol(&mut self, e: &BytesStart) {
        let ch = attr(e, b"char")
            .and_then(|c| u32::from_str_radix(&c, 16).ok())
            .and_then(char::from_u32);
        if let (Some(p), Some(ch)) = (self.para.as_mut(), ch) {
            p.runs.push(Inline::Text {
                text: ch.to_string(),
                emphasis: false,
                font: attr(e, b"font"),
            });
        }
    }

    fn field_char(&mut self, e: &BytesStart) {
        match attr(e, b"fldCharType").as_deref() {
            Some("begin") => match self.field.as_mut() {
                Some(f) if f.depth > 0 => f.depth += 1,
                _ => {
                    self.field = Some(Field {
                        instr: String::new(),
                        result: String::new(),
                        phase: FieldPhase::Instruction,
                        depth: 1,
                    })
                }
            },
            Some("separate") => {
                if let Some(f) = self.field.as_mut().filter(|f| f.depth == 1) {
                    f.phase = FieldPhase::Result;
                }
            }
            Some("end") => {
                let done = match self.field.as_mut() {
                    Some(f) if f.depth > 1 => {
                        f.depth -= 1;
                        false
                    }
                    Some(_) => true,
                    None => false,
                };
                if done {
                    if let Some(field) = self.field.take() {
                        self.push_inline(field_inline(&field.instr, field.result));
                    }
                }
            }
            _ => {}
        }
    }

    fn finish_picture(&mut self) {
        let Some(pic) = self.picture.take() else {
            return;
        };
        if pic.image.is_none() && !pic.chart {
            return;
        }
        let id = self.tree.objects.len();
        let kind = if pic.chart {
            ObjectKind::Chart
        } else {
            ObjectKind::Figure
        };
        let mut obj = VisualObject::new(id, kind, self.tree.blocks.len());
        obj.alt_text = pic
            .alt
            .or(pic.title)
            .filter(|a| !a.trim().is_empty());
        if !pic.chart {
            obj.target = pic.image.and_then(|rid| self.rels.get(&rid).cloned());
            obj.format = obj.target.as_deref().and_then(ImageFormat::from_target);
        }
        self.tree.objects.push(obj);
        if let Some(p) = self.para.as_mut() {
            p.objects.push(id);
            p.runs.push(Inline::Image { object: id });
        }
    }

    fn finish_paragraph(&mut self) {
        let Some(mut para) = self.para.take() else {
            return;
        };
        // A field that spans paragraphs (tables of contents) keeps its
        // result text where it was rendered.
        if let Some(f) = self.field.as_mut() {
            if !f.result.is_empty() {
                para.runs.push(Inline::text(std::mem::take(&mut f.result)));
            }
        }

        let index = self.tree.blocks.len();
        for id in &para.objects {
            let obj = &mut self.tree.objects[*id];
            obj.first_block = index;
            obj.last_block = index;
        }
        let cell = self.tables.last().and_then(|t| {
            Some(TableCell {
                table: t.id,
                row: t.row?,
                column: t.column?,
                header: t.header,
            })
        });
        let style = para
            .style_id
            .map(|id| self.styles.get(&id).cloned().unwrap_or(id));

        self.tree.blocks.push(RawBlock {
            style,
            runs: para.runs,
            cell,
            labels: para.labels,
            line: None,
        });
    }
}

/// The inline a finished field renders as.
fn field_inline(instr: &str, result: String) -> Inline {
    let mut tokens = instr.split_whitespace();
    match tokens.next().map(str::to_ascii_uppercase).as_deref() {
        Some("REF") | Some("PAGEREF") => Inline::CrossRef {
            label: tokens.next().unwrap_or_default().to_string(),
            text: result,
        },
        Some("HYPERLINK") => {
            let target = RE_QUOTED
                .captures(instr)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            let href = if instr.contains("\\l") {
                format!("#{target}")
            } else {
                target
            };
            Inline::Link { href, text: result }
        }
        _ => Inline::text(result),
    }
}

// ── XML helpers ──────────────────────────────────────────────────────────

/// Extract local name from a namespaced XML name (`w:val` -> `val`).
fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Attribute value by local name, with entities resolved.
fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .map(|a| unescape(&String::from_utf8_lossy(&a.value)))
}

/// OOXML on/off property: present without `w:val`, or with a truthy value.
fn is_on(e: &BytesStart) -> bool {
    !matches!(
        attr(e, b"val").as_deref(),
        Some("0") | Some("false") | Some("off") | Some("none")
    )
}

fn unescape(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find(';').and_then(|end| {
            resolve_entity(&after[..end]).map(|r| (r, end))
        }) {
            Some((resolved, end)) => {
                out.push_str(&resolved);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Resolve XML entity references.
fn resolve_entity(entity: &str) -> Option<String> {
    match entity {
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "amp" => return Some("&".to_string()),
        _ => {}
    }
    let code = if let Some(hex) = entity.strip_prefix("#x") {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceBlock;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math""#;

    fn package(body: &str, rels: &str) -> Vec<u8> {
        let document = format!(r#"<?xml version="1.0"?><w:document {NS}><w:body>{body}</w:body></w:document>"#);
        let styles = r#"<?xml version="1.0"?><w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
            <w:style w:type="paragraph" w:styleId="PaperTitle"><w:name w:val="Paper-Title"/></w:style>
            <w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="heading 1"/></w:style>
            </w:styles>"#;
        let rels = format!(
            r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
        );
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in [
            (DOCUMENT_XML, document.as_str()),
            (STYLES_XML, styles),
            (DOCUMENT_RELS, rels.as_str()),
        ] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn text_of(block: &RawBlock) -> String {
        SourceBlock {
            index: 0,
            style: None,
            runs: block.runs.clone(),
            cell: None,
            object: None,
            labels: vec![],
            line: None,
            role: Default::default(),
        }
        .text()
    }

    #[test]
    fn test_paragraph_styles_resolve_to_names() {
        let body = r#"<w:p><w:pPr><w:pStyle w:val="PaperTitle"/></w:pPr><w:r><w:t>My Paper</w:t></w:r></w:p>
                      <w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t xml:space="preserve">1. Introduction</w:t></w:r></w:p>
                      <w:p/>"#;
        let tree = compile(&package(body, "")).unwrap();
        assert_eq!(tree.blocks.len(), 3);
        assert_eq!(tree.blocks[0].style.as_deref(), Some("Paper-Title"));
        assert_eq!(text_of(&tree.blocks[0]), "My Paper");
        assert_eq!(tree.blocks[1].style.as_deref(), Some("heading 1"));
        assert!(tree.blocks[2].runs.is_empty());
    }

    #[test]
    fn test_entities_and_fonts() {
        let body = r#"<w:p><w:r><w:rPr><w:rFonts w:ascii="Wingdings"/><w:i/></w:rPr><w:t>A &amp; B</w:t></w:r>
                      <w:r><w:sym w:font="Symbol" w:char="F0B7"/></w:r></w:p>"#;
        let tree = compile(&package(body, "")).unwrap();
        match &tree.blocks[0].runs[0] {
            Inline::Text {
                text,
                emphasis,
                font,
            } => {
                assert_eq!(text, "A & B");
                assert!(*emphasis);
                assert_eq!(font.as_deref(), Some("Wingdings"));
            }
            other => panic!("unexpected run {other:?}"),
        }
        assert!(matches!(&tree.blocks[0].runs[1], Inline::Text { font: Some(f), .. } if f == "Symbol"));
    }

    #[test]
    fn test_hyperlinks_and_bookmarks() {
        let body = r#"<w:p><w:bookmarkStart w:id="0" w:name="_Ref1"/><w:bookmarkStart w:id="1" w:name="_GoBack"/>
                      <w:hyperlink r:id="rId5"><w:r><w:t>site</w:t></w:r></w:hyperlink>
                      <w:hyperlink w:anchor="sec2"><w:r><w:t>below</w:t></w:r></w:hyperlink></w:p>"#;
        let rels = r#"<Relationship Id="rId5" Type="hyperlink" Target="www.example.org" TargetMode="External"/>"#;
        let tree = compile(&package(body, rels)).unwrap();
        let block = &tree.blocks[0];
        assert_eq!(block.labels, vec!["_Ref1".to_string()]);
        assert!(block.runs.iter().any(
            |r| matches!(r, Inline::Link { href, text } if href == "www.example.org" && text == "site")
        ));
        assert!(block
            .runs
            .iter()
            .any(|r| matches!(r, Inline::Link { href, .. } if href == "#sec2")));
    }

    #[test]
    fn test_ref_field_becomes_cross_reference() {
        let body = r#"<w:p><w:r><w:t xml:space="preserve">See </w:t></w:r>
            <w:r><w:fldChar w:fldCharType="begin"/></w:r>
            <w:r><w:instrText xml:space="preserve"> REF _Ref42 \h </w:instrText></w:r>
            <w:r><w:fldChar w:fldCharType="separate"/></w:r>
            <w:r><w:t>Table 1</w:t></w:r>
            <w:r><w:fldChar w:fldCharType="end"/></w:r></w:p>"#;
        let tree = compile(&package(body, "")).unwrap();
        assert!(tree.blocks[0].runs.iter().any(
            |r| matches!(r, Inline::CrossRef { label, text } if label == "_Ref42" && text == "Table 1")
        ));
        assert_eq!(text_of(&tree.blocks[0]), "See Table 1");
    }

    #[test]
    fn test_drawing_becomes_figure() {
        let body = r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" name="Picture 1" descr="A bar chart of scores"/>
            <a:graphic><a:graphicData><pic:pic xmlns:pic="p"><pic:blipFill><a:blip r:embed="rId7"/></pic:blipFill></pic:pic></a:graphicData></a:graphic>
            </wp:inline></w:drawing></w:r></w:p>"#;
        let rels = r#"<Relationship Id="rId7" Type="image" Target="media/image1.wmf"/>"#;
        let tree = compile(&package(body, rels)).unwrap();
        assert_eq!(tree.objects.len(), 1);
        let fig = &tree.objects[0];
        assert_eq!(fig.kind, ObjectKind::Figure);
        assert_eq!(fig.first_block, 0);
        assert_eq!(fig.alt_text.as_deref(), Some("A bar chart of scores"));
        assert_eq!(fig.format, Some(ImageFormat::Wmf));
        assert_eq!(tree.blocks[0].runs, vec![Inline::Image { object: 0 }]);
    }

    #[test]
    fn test_table_cells_and_header_rows() {
        let body = r#"<w:p><w:r><w:t>Table 1. Results</w:t></w:r></w:p>
            <w:tbl><w:tblPr><w:tblDescription w:val="Scores by group"/></w:tblPr>
              <w:tr><w:trPr><w:tblHeader/></w:trPr><w:tc><w:p><w:r><w:t>Group</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>Score</w:t></w:r></w:p></w:tc></w:tr>
              <w:tr><w:tc><w:p><w:r><w:t>A</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>1</w:t></w:r></w:p></w:tc></w:tr>
            </w:tbl>
            <w:p><w:r><w:t>After</w:t></w:r></w:p>"#;
        let tree = compile(&package(body, "")).unwrap();
        assert_eq!(tree.blocks.len(), 6);
        let table = &tree.objects[0];
        assert_eq!(table.kind, ObjectKind::Table);
        assert_eq!((table.first_block, table.last_block), (1, 4));
        assert_eq!(table.alt_text.as_deref(), Some("Scores by group"));
        let header = tree.blocks[2].cell.unwrap();
        assert_eq!((header.row, header.column, header.header), (0, 1, true));
        let body_cell = tree.blocks[3].cell.unwrap();
        assert_eq!((body_cell.row, body_cell.column, body_cell.header), (1, 0, false));
        assert!(tree.blocks[5].cell.is_none());
    }

    #[test]
    fn test_math_is_inline() {
        let body = r#"<w:p><w:r><w:t xml:space="preserve">where </w:t></w:r><m:oMath><m:r><m:t>x</m:t></m:r><m:r><m:t>=1</m:t></m:r></m:oMath></w:p>"#;
        let tree = compile(&package(body, "")).unwrap();
        assert!(tree.blocks[0]
            .runs
            .iter()
            .any(|r| matches!(r, Inline::Math { source } if source == "x=1")));
    }

    #[test]
    fn test_not_a_package() {
        let err = compile(b"plain").unwrap_err();
        assert_eq!(err.kind, SourceKind::Docx);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a &amp; b &#x41; &bogus; &"), "a & b A &bogus; &");
    }
}
