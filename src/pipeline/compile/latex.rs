//! LaTeX reader: a `.tex` file or packaged project to a [`BlockTree`].
//!
//! Blocks carry synthetic `latex:*` style names that the template table maps
//! to roles. The reader is a scanner, not a TeX engine: it understands the
//! document structure the two proceedings templates use (front matter,
//! sectioning, floats, tabulars, math, code, lists, bibliographies) and
//! treats unknown environments as transparent containers.
//!
//! Source-level problems found on the way (unterminated environments,
//! unbalanced braces, missing bibliography) are recorded as notes on the
//! tree rather than failing the compile.

use super::read_member;
use crate::catalog::{Finding, WarningCode};
use crate::error::CompileError;
use crate::model::{
    BlockTree, ImageFormat, Inline, ObjectKind, RawBlock, SourceKind, TableCell, TemplateMarkers,
    VisualObject,
};
use crate::pipeline::input::{is_tex_name, Packaging, SourceInput};
use flate2::read::GzDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::path::Path;
use tar::Archive;
use tracing::debug;
use zip::ZipArchive;

// ── Patterns ─────────────────────────────────────────────────────────────

static RE_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:input|include)\s*\{\s*([^}\s]+)\s*\}").unwrap());

static RE_ALGORITHMIC_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\end\{algorithmic\}[ \t]*\n[ \t]*[a-zA-Z]{1,20}").unwrap());

static RE_DOCUMENT_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\documentclass\s*(?:\[[^\]]*\])?\s*\{\s*([^}\s]+)\s*\}").unwrap()
});

static RE_USEPACKAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\usepackage\s*(?:\[[^\]]*\])?\s*\{([^}]*)\}").unwrap());

static RE_ENV: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\(begin|end)\s*\{([^}]+)\}").unwrap());

static RE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\(begin|section|subsection|subsubsection|paragraph|caption|label|includegraphics|maketitle|title|author|affiliation|email|keywords|bibliography|printbibliography|par)\b\*?|\\\[|\$\$|\n[ \t]*\n",
    )
    .unwrap()
});

static RE_FRONT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(title|author|affiliation|email|keywords)\b\*?").unwrap());

static RE_FIGURE_PARTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(includegraphics|caption|Description|label)\b\*?").unwrap());

static RE_TABLE_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(caption|Description|label)\b\*?|\\begin\s*\{(tabular\*?|tabularx|tabulary|longtable)\}")
        .unwrap()
});

static RE_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\label\s*\{([^}]*)\}").unwrap());

static RE_CITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:cite|citep|citet|citealp|citealt|parencite|textcite|autocite)\*?\s*[\[{]")
        .unwrap()
});

static RE_BIBITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\bibitem\b").unwrap());

static RE_ALT_OPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|,)\s*alt\s*=\s*(\{[^}]*\}|[^,]*)").unwrap());

static RE_AUTHOR_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:and|And|AND|alignauthor)\b").unwrap());

const VERBATIM_ENVS: &[&str] = &["verbatim", "verbatim*", "Verbatim", "lstlisting", "minted"];
const ALGORITHM_ENVS: &[&str] = &["algorithm", "algorithm*", "algorithmic", "algorithm2e"];
const MATH_ENVS: &[&str] = &[
    "equation", "equation*", "align", "align*", "gather", "gather*", "multline", "multline*",
    "eqnarray", "eqnarray*", "displaymath", "math",
];
const LIST_ENVS: &[&str] = &["itemize", "enumerate", "description"];
const TABULAR_ENVS: &[&str] = &["tabular", "tabular*", "tabularx", "tabulary", "longtable"];

// ── Entry point ──────────────────────────────────────────────────────────

/// Compile a LaTeX source or project archive.
pub fn compile(source: &SourceInput, max_input_depth: usize) -> Result<BlockTree, CompileError> {
    let project = Project::load(source)?;
    let mut tree = BlockTree::new(SourceKind::Latex);

    // ── Step 1: main file ──
    let main = project.main_file(&mut tree.notes)?;
    debug!("LaTeX main file: {}", main);
    let base_dir = Path::new(&main)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    // ── Step 2: comments and \input ──
    let text = project.files.get(&main).map(String::as_str).unwrap_or_default();
    let src = project.inline_inputs(&strip_comments(text), &base_dir, max_input_depth, &mut tree.notes);

    // ── Step 3: source checks and fingerprints ──
    source_checks(&src, &mut tree.notes);
    tree.markers = markers(&src, &project);
    if is_jedm(&tree.markers) && tree.markers.packages.contains("natbib") {
        tree.notes.push(Finding::new(WarningCode::NatbibJedm));
    }

    // ── Step 4: structure ──
    let punctuation = if is_jedm(&tree.markers) { ':' } else { '.' };
    let stem = Path::new(&main)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut scanner = Scanner::new(&src, tree, punctuation, &project, stem);
    scanner.document();
    Ok(scanner.finish())
}

fn is_jedm(markers: &TemplateMarkers) -> bool {
    markers.document_class.as_deref() == Some("jedm") || markers.class_files.contains("jedm.cls")
}

// ── Project files ────────────────────────────────────────────────────────

struct Project {
    /// `.tex` and `.bbl` sources by archive path.
    files: BTreeMap<String, String>,
    class_files: BTreeSet<String>,
}

impl Project {
    fn load(source: &SourceInput) -> Result<Self, CompileError> {
        let mut project = Self {
            files: BTreeMap::new(),
            class_files: BTreeSet::new(),
        };
        match source.packaging {
            Packaging::Plain => {
                project.files.insert(
                    source.name.clone(),
                    String::from_utf8_lossy(super::strip_bom(&source.bytes)).into_owned(),
                );
            }
            Packaging::Zip => project.load_zip(&source.bytes)?,
            Packaging::TarGz => project.load_tarball(&source.bytes)?,
        }
        Ok(project)
    }

    fn load_zip(&mut self, bytes: &[u8]) -> Result<(), CompileError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| CompileError::new(SourceKind::Latex, format!("unreadable archive: {e}")))?;
        let names: Vec<String> = archive
            .file_names()
            .filter(|n| !n.starts_with("__MACOSX"))
            .map(str::to_string)
            .collect();
        for name in names {
            if self.wants(&name) {
                if let Some(text) = read_member(&mut archive, &name, SourceKind::Latex)? {
                    self.files.insert(name, text);
                }
            }
        }
        Ok(())
    }

    fn load_tarball(&mut self, bytes: &[u8]) -> Result<(), CompileError> {
        let tar_err = |e: std::io::Error| {
            CompileError::new(SourceKind::Latex, format!("unreadable tar.gz archive: {e}"))
        };
        let mut archive = Archive::new(GzDecoder::new(bytes));
        for entry in archive.entries().map_err(tar_err)? {
            let mut entry = entry.map_err(tar_err)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path().map_err(tar_err)?.to_string_lossy().into_owned();
            let name = name.trim_start_matches("./").to_string();
            if self.wants(&name) {
                let mut data = Vec::new();
                entry.read_to_end(&mut data).map_err(tar_err)?;
                self.files.insert(
                    name,
                    String::from_utf8_lossy(super::strip_bom(&data)).into_owned(),
                );
            }
        }
        Ok(())
    }

    /// Record class files; true when the member's text is needed.
    fn wants(&mut self, name: &str) -> bool {
        let path = Path::new(name);
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "tex" | "bbl" => true,
            "cls" => {
                if let Some(file) = path.file_name() {
                    self.class_files.insert(file.to_string_lossy().into_owned());
                }
                false
            }
            _ => false,
        }
    }

    fn tex_files(&self) -> impl Iterator<Item = &String> {
        self.files.keys().filter(|n| is_tex_name(n))
    }

    /// Pick the file to compile, preferring the only `.tex`, then the only
    /// one with `\documentclass`, then `main.tex`.
    fn main_file(&self, notes: &mut Vec<Finding>) -> Result<String, CompileError> {
        let candidates: Vec<&String> = self.tex_files().collect();
        match candidates.as_slice() {
            [] => {
                return Err(CompileError::new(SourceKind::Latex, "no .tex file in the project")
                    .with_code(WarningCode::TexFileMissing))
            }
            [only] => return Ok((*only).clone()),
            _ => {}
        }

        let with_class: Vec<&String> = candidates
            .iter()
            .copied()
            .filter(|n| self.files[*n].contains("\\documentclass"))
            .collect();
        if let [only] = with_class.as_slice() {
            return Ok((*only).clone());
        }
        let pool = if with_class.is_empty() {
            &candidates
        } else {
            &with_class
        };
        if let Some(main) = pool
            .iter()
            .find(|n| Path::new(n.as_str()).file_name().is_some_and(|f| f == "main.tex"))
        {
            return Ok((*main).clone());
        }
        let first = pool[0].clone();
        notes.push(
            Finding::new(WarningCode::AmbiguousTexFile)
                .with_context(format!("Using first file: {first}")),
        );
        Ok(first)
    }

    fn resolve(&self, base_dir: &str, name: &str) -> Option<&String> {
        let name = name.trim_start_matches("./");
        let mut tries = Vec::with_capacity(4);
        for stem in [join(base_dir, name), name.to_string()] {
            tries.push(format!("{stem}.tex"));
            tries.push(stem);
        }
        tries.iter().find_map(|t| self.files.get(t))
    }

    /// Replace `\input`/`\include` with file contents, at most `limit` times.
    fn inline_inputs(
        &self,
        src: &str,
        base_dir: &str,
        limit: usize,
        notes: &mut Vec<Finding>,
    ) -> String {
        let mut out = src.to_string();
        for _ in 0..limit {
            let Some(caps) = RE_INPUT.captures(&out) else {
                return out;
            };
            let range = caps.get(0).map(|m| m.range()).unwrap_or_default();
            let name = caps[1].to_string();
            let replacement = match self.resolve(base_dir, &name) {
                Some(text) => strip_comments(text),
                None => {
                    notes.push(
                        Finding::new(WarningCode::Make4htWarnings)
                            .with_context(format!("Input file not found: {name}")),
                    );
                    String::new()
                }
            };
            out.replace_range(range, &replacement);
        }
        if RE_INPUT.is_match(&out) {
            notes.push(
                Finding::new(WarningCode::Make4htWarnings)
                    .with_context(format!("\\input nesting deeper than {limit}; remaining files skipped")),
            );
            out = RE_INPUT.replace_all(&out, "").into_owned();
        }
        out
    }

    /// The bibliography produced for `\bibliography{name}`.
    fn bbl(&self, name: Option<&str>, main_stem: &str) -> Option<&String> {
        let bbls: Vec<(&String, &String)> = self
            .files
            .iter()
            .filter(|(n, _)| n.to_ascii_lowercase().ends_with(".bbl"))
            .collect();
        let stem_of = |n: &str| {
            Path::new(n)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        let wanted: Vec<String> = name
            .into_iter()
            .flat_map(|n| n.split(','))
            .map(|n| stem_of(n.trim()))
            .chain(std::iter::once(main_stem.to_string()))
            .collect();
        bbls.iter()
            .find(|(n, _)| wanted.contains(&stem_of(n)))
            .or(if bbls.len() == 1 { bbls.first() } else { None })
            .map(|(_, text)| *text)
    }
}

/// True when the character at `at` follows an odd run of backslashes.
fn escaped(src: &str, at: usize) -> bool {
    src.as_bytes()[..at]
        .iter()
        .rev()
        .take_while(|&&b| b == b'\\')
        .count()
        % 2
        == 1
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

/// Remove `%` comments, keeping line structure.
pub fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for line in src.split_inclusive('\n') {
        let bytes = line.as_bytes();
        let mut cut = None;
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' => i += 2,
                b'%' => {
                    cut = Some(i);
                    break;
                }
                _ => i += 1,
            }
        }
        match cut {
            Some(at) => {
                out.push_str(&line[..at]);
                if line.ends_with('\n') {
                    out.push('\n');
                }
            }
            None => out.push_str(line),
        }
    }
    out
}

fn source_checks(src: &str, notes: &mut Vec<Finding>) {
    if let Some(m) = RE_ALGORITHMIC_TAIL.find(src) {
        notes.push(
            Finding::new(WarningCode::NoNewlineAfterAlgorithmic)
                .with_context(m.as_str().replace('\n', " "))
                .at_line(Some(line_of(src, m.start()))),
        );
    }

    let (body_start, body_end) = body_range(src);
    for (name, line) in unterminated_environments(src, body_start, body_end) {
        notes.push(
            Finding::new(WarningCode::TexEnvParseFail)
                .with_context(format!("\\begin{{{name}}} is not closed properly"))
                .at_line(Some(line)),
        );
    }

    if let Some(problem) = brace_problem(src) {
        notes.push(Finding::new(WarningCode::Make4htWarnings).with_context(problem));
    }
}

fn markers(src: &str, project: &Project) -> TemplateMarkers {
    let mut markers = TemplateMarkers {
        class_files: project.class_files.clone(),
        ..TemplateMarkers::default()
    };
    markers.document_class = RE_DOCUMENT_CLASS.captures(src).map(|c| c[1].to_string());
    for caps in RE_USEPACKAGE.captures_iter(src) {
        for pkg in caps[1].split(',').map(str::trim).filter(|p| !p.is_empty()) {
            markers.packages.insert(pkg.to_string());
        }
    }
    markers
}

fn line_of(src: &str, offset: usize) -> usize {
    src.as_bytes()[..offset.min(src.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

/// Byte range of the document body (whole source when there is no
/// `document` environment).
fn body_range(src: &str) -> (usize, usize) {
    let start = src
        .find("\\begin{document}")
        .map(|i| i + "\\begin{document}".len())
        .unwrap_or(0);
    let end = src[start..]
        .find("\\end{document}")
        .map(|i| start + i)
        .unwrap_or(src.len());
    (start, end)
}

/// Environments that are never closed, or closed out of order.
fn unterminated_environments(src: &str, start: usize, end: usize) -> Vec<(String, usize)> {
    let mut stack: Vec<(String, usize)> = Vec::new();
    let mut problems = Vec::new();
    let mut pos = start;

    while let Some(caps) = RE_ENV.captures_at(&src[..end], pos) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(pos..end);
        let name = caps[2].trim().to_string();
        pos = whole.end;
        if &caps[1] == "begin" {
            if VERBATIM_ENVS.contains(&name.as_str()) {
                let close = format!("\\end{{{name}}}");
                match src[pos..end].find(&close) {
                    Some(i) => pos += i + close.len(),
                    None => {
                        problems.push((name, line_of(src, whole.start)));
                        break;
                    }
                }
                continue;
            }
            stack.push((name, line_of(src, whole.start)));
        } else if let Some(depth) = stack.iter().rposition(|(n, _)| *n == name) {
            problems.extend(stack.drain(depth + 1..));
            stack.pop();
        } else {
            problems.push((name, line_of(src, whole.start)));
        }
    }
    problems.extend(stack);
    problems
}

/// Describe the first brace imbalance, if any.
fn brace_problem(src: &str) -> Option<String> {
    let bytes = src.as_bytes();
    let mut depth: i64 = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth < 0 {
                    return Some(format!(
                        "Unexpected closing brace on line {}",
                        line_of(src, i)
                    ));
                }
            }
            _ => {}
        }
        i += 1;
    }
    (depth > 0).then(|| format!("{depth} unclosed brace(s)"))
}

// ── Argument readers ─────────────────────────────────────────────────────

fn skip_ws(s: &str, mut i: usize) -> usize {
    let bytes = s.as_bytes();
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Read a delimited group starting at (or after whitespace before) `i`.
/// Returns the inner range and the position after the closing delimiter.
fn read_delimited(s: &str, i: usize, open: u8, close: u8) -> Option<(usize, usize, usize)> {
    let bytes = s.as_bytes();
    let start = skip_ws(s, i);
    if bytes.get(start) != Some(&open) {
        return None;
    }
    let mut depth = 0usize;
    let mut brace_depth = 0usize;
    let mut j = start;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 1,
            b'{' if open != b'{' => brace_depth += 1,
            b'}' if open != b'{' => brace_depth = brace_depth.saturating_sub(1),
            c if c == open && brace_depth == 0 => depth += 1,
            c if c == close && brace_depth == 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some((start + 1, j, j + 1));
                }
            }
            _ => {}
        }
        j += 1;
    }
    None
}

/// `{...}` at `i`: `(content, next)`.
fn group(s: &str, i: usize) -> Option<(&str, usize)> {
    read_delimited(s, i, b'{', b'}').map(|(a, b, next)| (&s[a..b], next))
}

/// `[...]` at `i`: `(content, next)`.
fn optional(s: &str, i: usize) -> Option<(&str, usize)> {
    read_delimited(s, i, b'[', b']').map(|(a, b, next)| (&s[a..b], next))
}

/// Skip any number of optional arguments.
fn skip_optionals(s: &str, mut i: usize) -> usize {
    while let Some((_, next)) = optional(s, i) {
        i = next;
    }
    i
}

/// Position after the matching `\end{name}` and the content end, searching
/// from `from` up to `limit`.
fn env_end(src: &str, from: usize, limit: usize, name: &str) -> Option<(usize, usize)> {
    if VERBATIM_ENVS.contains(&name) {
        let close = format!("\\end{{{name}}}");
        return src[from..limit]
            .find(&close)
            .map(|i| (from + i, from + i + close.len()));
    }
    let mut depth = 1usize;
    let mut pos = from;
    while let Some(caps) = RE_ENV.captures_at(&src[..limit], pos) {
        let whole = caps.get(0)?.range();
        pos = whole.end;
        if caps[2].trim() != name {
            continue;
        }
        if &caps[1] == "begin" {
            depth += 1;
        } else {
            depth -= 1;
            if depth == 0 {
                return Some((whole.start, whole.end));
            }
        }
    }
    None
}

/// Split at `sep` occurrences outside braces.
fn split_top_level<'s>(s: &'s str, sep: &str) -> Vec<&'s str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if depth == 0 && bytes[i..].starts_with(sep.as_bytes()) {
            parts.push(&s[last..i]);
            i += sep.len();
            last = i;
            continue;
        }
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[last..]);
    parts
}

// ── Inline content ───────────────────────────────────────────────────────

/// Runs and labels parsed from a stretch of LaTeX text.
#[derive(Debug, Default)]
pub struct Inlines {
    pub runs: Vec<Inline>,
    pub labels: Vec<String>,
}

impl Inlines {
    fn push_text(&mut self, s: &str, emphasis: bool, font: Option<&str>) {
        if s.is_empty() {
            return;
        }
        if let Some(Inline::Text {
            text,
            emphasis: e,
            font: f,
        }) = self.runs.last_mut()
        {
            if *e == emphasis && f.as_deref() == font {
                text.push_str(s);
                return;
            }
        }
        self.runs.push(Inline::Text {
            text: s.to_string(),
            emphasis,
            font: font.map(str::to_string),
        });
    }

    fn plain(&self) -> String {
        self.runs.iter().map(Inline::plain_text).collect()
    }
}

/// Parse inline LaTeX into runs.
pub fn parse_inlines(src: &str) -> Inlines {
    let mut out = Inlines::default();
    inline_into(src, &mut out, false, None);
    out
}

const CITE_COMMANDS: &[&str] = &[
    "cite", "citep", "citet", "citealp", "citealt", "parencite", "textcite", "autocite",
    "citeauthor", "citeyear",
];
const REF_COMMANDS: &[&str] = &[
    "ref", "autoref", "cref", "Cref", "eqref", "pageref", "nameref", "vref",
];
const EMPHASIS_COMMANDS: &[&str] = &["emph", "textit", "textbf", "textsl", "underline"];
const MONO_COMMANDS: &[&str] = &["texttt", "path", "code"];
const DROPPED_COMMANDS: &[&str] = &[
    "vspace", "hspace", "setlength", "addtolength", "bibliographystyle", "thanks", "titlenote",
    "includegraphics", "index", "thispagestyle", "pagestyle", "newcommand", "renewcommand",
    "begin", "end", "Description", "numberofauthors", "category", "terms", "ccsdesc",
    "setcopyright", "copyrightyear", "acmConference", "hypersetup", "usepackage",
    "documentclass", "cline", "cmidrule", "color", "nocite", "footnotemark",
    "newblock",
];
const MONOSPACE_FONT: &str = "Courier";

fn symbol(name: &str) -> Option<&'static str> {
    Some(match name {
        "ldots" | "dots" | "textellipsis" => "…",
        "LaTeX" => "LaTeX",
        "TeX" => "TeX",
        "textendash" => "–",
        "textemdash" => "—",
        "textquoteleft" => "‘",
        "textquoteright" => "’",
        "textquotedblleft" => "“",
        "textquotedblright" => "”",
        "S" => "§",
        "P" => "¶",
        "copyright" => "©",
        "textregistered" => "®",
        "newline" | "linebreak" | "quad" | "qquad" | "and" | "AND" | "And" => " ",
        _ => return None,
    })
}

fn inline_into(src: &str, out: &mut Inlines, emphasis: bool, font: Option<&str>) {
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i = command(src, i, out, emphasis, font),
            b'$' => {
                let display = bytes.get(i + 1) == Some(&b'$');
                let (open, close) = if display { (2, "$$") } else { (1, "$") };
                let start = i + open;
                match find_unescaped(src, start, close) {
                    Some(end) => {
                        out.runs.push(Inline::Math {
                            source: src[start..end].trim().to_string(),
                        });
                        i = end + close.len();
                    }
                    None => i = bytes.len(),
                }
            }
            b'{' | b'}' => i += 1,
            b'~' | b'\n' | b'\t' | b'\r' => {
                out.push_text(" ", emphasis, font);
                i += 1;
            }
            b'`' => {
                let double = bytes.get(i + 1) == Some(&b'`');
                out.push_text(if double { "“" } else { "‘" }, emphasis, font);
                i += if double { 2 } else { 1 };
            }
            b'\'' if bytes.get(i + 1) == Some(&b'\'') => {
                out.push_text("”", emphasis, font);
                i += 2;
            }
            b'-' if src[i..].starts_with("---") => {
                out.push_text("—", emphasis, font);
                i += 3;
            }
            b'-' if src[i..].starts_with("--") => {
                out.push_text("–", emphasis, font);
                i += 2;
            }
            _ => {
                let ch_len = src[i..].chars().next().map(char::len_utf8).unwrap_or(1);
                out.push_text(&src[i..i + ch_len], emphasis, font);
                i += ch_len;
            }
        }
    }
}

fn find_unescaped(src: &str, from: usize, needle: &str) -> Option<usize> {
    let mut pos = from;
    while let Some(rel) = src.get(pos..)?.find(needle) {
        let at = pos + rel;
        if at > 0 && src.as_bytes()[at - 1] == b'\\' {
            pos = at + needle.len();
            continue;
        }
        return Some(at);
    }
    None
}

/// Handle the command starting at `i` (a backslash); returns the next index.
fn command(src: &str, i: usize, out: &mut Inlines, emphasis: bool, font: Option<&str>) -> usize {
    let bytes = src.as_bytes();
    let Some(&next) = bytes.get(i + 1) else {
        return i + 1;
    };

    if !next.is_ascii_alphabetic() {
        return match next {
            b'&' | b'%' | b'$' | b'#' | b'_' | b'{' | b'}' => {
                out.push_text(&src[i + 1..i + 2], emphasis, font);
                i + 2
            }
            b'\\' | b',' | b';' | b' ' | b':' => {
                out.push_text(" ", emphasis, font);
                i + 2
            }
            b'(' | b'[' => {
                let close = if next == b'(' { "\\)" } else { "\\]" };
                match src[i + 2..].find(close) {
                    Some(rel) => {
                        out.runs.push(Inline::Math {
                            source: src[i + 2..i + 2 + rel].trim().to_string(),
                        });
                        i + 2 + rel + 2
                    }
                    None => bytes.len(),
                }
            }
            // Accents: keep the accented letter.
            b'\'' | b'"' | b'`' | b'^' | b'~' | b'=' | b'.' => i + 2,
            _ => {
                let ch_len = src[i + 1..].chars().next().map(char::len_utf8).unwrap_or(1);
                i + 1 + ch_len
            }
        };
    }

    let name_end = src[i + 1..]
        .find(|c: char| !c.is_ascii_alphabetic())
        .map(|rel| i + 1 + rel)
        .unwrap_or(src.len());
    let name = &src[i + 1..name_end];
    let mut j = name_end;
    if bytes.get(j) == Some(&b'*') {
        j += 1;
    }

    if CITE_COMMANDS.contains(&name) {
        j = skip_optionals(src, j);
        if let Some((keys, next)) = group(src, j) {
            out.runs.push(Inline::Citation {
                keys: keys
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect(),
            });
            return next;
        }
        return j;
    }
    if REF_COMMANDS.contains(&name) {
        if let Some((label, next)) = group(src, j) {
            let label = label.trim().to_string();
            out.runs.push(Inline::CrossRef {
                text: label.clone(),
                label,
            });
            return next;
        }
        return j;
    }
    match name {
        "href" => {
            if let Some((url, after_url)) = group(src, j) {
                let (text, next) = group(src, after_url).unwrap_or((url, after_url));
                out.runs.push(Inline::Link {
                    href: url.trim().to_string(),
                    text: parse_inlines(text).plain(),
                });
                return next;
            }
            return j;
        }
        "url" => {
            if let Some((url, next)) = group(src, j) {
                out.runs.push(Inline::Link {
                    href: url.trim().to_string(),
                    text: url.trim().to_string(),
                });
                return next;
            }
            return j;
        }
        "label" => {
            if let Some((label, next)) = group(src, j) {
                out.labels.push(label.trim().to_string());
                return next;
            }
            return j;
        }
        "verb" => {
            let Some(delim) = src[j..].chars().next() else {
                return j;
            };
            let start = j + delim.len_utf8();
            return match src[start..].find(delim) {
                Some(rel) => {
                    out.push_text(&src[start..start + rel], emphasis, Some(MONOSPACE_FONT));
                    start + rel + delim.len_utf8()
                }
                None => src.len(),
            };
        }
        "multicolumn" | "multirow" => {
            let mut k = j;
            for _ in 0..2 {
                k = skip_optionals(src, k);
                match group(src, k) {
                    Some((_, next)) => k = next,
                    None => return k,
                }
            }
            return match group(src, k) {
                Some((content, next)) => {
                    inline_into(content, out, emphasis, font);
                    next
                }
                None => k,
            };
        }
        "textcolor" | "colorbox" => {
            let k = group(src, j).map(|(_, next)| next).unwrap_or(j);
            return match group(src, k) {
                Some((content, next)) => {
                    inline_into(content, out, emphasis, font);
                    next
                }
                None => k,
            };
        }
        _ => {}
    }

    if EMPHASIS_COMMANDS.contains(&name) || MONO_COMMANDS.contains(&name) {
        let mono = MONO_COMMANDS.contains(&name);
        if let Some((content, next)) = group(src, j) {
            let (emph, f) = if mono {
                (emphasis, Some(MONOSPACE_FONT))
            } else {
                (true, font)
            };
            inline_into(content, out, emph, f);
            return next;
        }
        return j;
    }
    if DROPPED_COMMANDS.contains(&name) {
        let mut k = skip_optionals(src, j);
        while let Some((_, next)) = group(src, k) {
            k = skip_optionals(src, next);
            if name == "begin" || name == "end" {
                break;
            }
        }
        return k;
    }
    if let Some(text) = symbol(name) {
        out.push_text(text, emphasis, font);
        return j;
    }

    // Anything else: keep the first argument's text.
    let k = skip_optionals(src, j);
    match group(src, k) {
        Some((content, next)) => {
            inline_into(content, out, emphasis, font);
            next
        }
        None => k,
    }
}

// ── Block scanner ────────────────────────────────────────────────────────

const BODY: &str = "latex:body";

struct Scanner<'a> {
    src: &'a str,
    tree: BlockTree,
    project: &'a Project,
    main_stem: String,
    punctuation: char,
    para: String,
    para_start: Option<usize>,
    para_labels: Vec<String>,
    figures: usize,
    tables: usize,
    front_done: bool,
    has_bibliography: bool,
}

impl<'a> Scanner<'a> {
    fn new(
        src: &'a str,
        tree: BlockTree,
        punctuation: char,
        project: &'a Project,
        main_stem: String,
    ) -> Self {
        Self {
            src,
            tree,
            project,
            main_stem,
            punctuation,
            para: String::new(),
            para_start: None,
            para_labels: Vec::new(),
            figures: 0,
            tables: 0,
            front_done: false,
            has_bibliography: false,
        }
    }

    fn finish(self) -> BlockTree {
        self.tree
    }

    fn line(&self, offset: usize) -> Option<usize> {
        Some(line_of(self.src, offset))
    }

    fn document(&mut self) {
        let (start, end) = body_range(self.src);
        if !self.src[start..end].contains("\\maketitle") {
            self.front_matter(start);
        }
        self.scan(start, end, BODY);

        if !self.has_bibliography && RE_CITE.is_match(&self.src[start..end]) {
            self.tree.notes.push(
                Finding::new(WarningCode::BibCompileErrors)
                    .with_context("Citations are used but no bibliography was found"),
            );
        }
    }

    /// Title/author commands from the preamble, emitted where the title
    /// block is rendered.
    fn front_matter(&mut self, body_start: usize) {
        if self.front_done {
            return;
        }
        self.front_done = true;
        let src = self.src;
        let mut pos = 0;
        while let Some(m) = RE_FRONT.captures_at(&src[..body_start], pos) {
            let whole = m.get(0).map(|g| g.range()).unwrap_or(pos..body_start);
            let kind = m[1].to_string();
            pos = self.front_command(&kind, whole.start, whole.end);
        }
    }

    /// Emit one front-matter command; returns the position after it.
    fn front_command(&mut self, kind: &str, at: usize, after_name: usize) -> usize {
        let j = skip_optionals(self.src, after_name);
        let Some((content, next)) = group(self.src, j) else {
            return after_name;
        };
        let line = self.line(at);
        match kind {
            "title" => {
                self.push_inline_block("latex:title", content, line);
            }
            "author" => self.authors(content, line),
            "affiliation" => {
                let spaced = content.replace("}\\", "} \\");
                self.push_inline_block("latex:affiliation", &spaced, line);
            }
            "email" => {
                self.push_inline_block("latex:email", content, line);
            }
            _ => {
                self.push_text_block("latex:keywords-heading", "Keywords", line);
                self.push_inline_block("latex:keywords", content, line);
            }
        }
        next
    }

    fn authors(&mut self, content: &str, line: Option<usize>) {
        for chunk in RE_AUTHOR_SPLIT.split(content) {
            let mut named = false;
            for part in split_top_level(chunk, "\\\\") {
                let trimmed = part.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let style = if trimmed.contains("\\email") {
                    "latex:email"
                } else if trimmed.contains("\\affaddr") {
                    "latex:affiliation"
                } else if !named {
                    named = true;
                    "latex:author"
                } else if trimmed.contains('@') {
                    "latex:email"
                } else {
                    "latex:affiliation"
                };
                self.push_inline_block(style, trimmed, line);
            }
        }
    }

    fn push_inline_block(&mut self, style: &str, content: &str, line: Option<usize>) -> usize {
        let inlines = parse_inlines(content);
        self.push_block(RawBlock {
            style: Some(style.to_string()),
            runs: inlines.runs,
            cell: None,
            labels: inlines.labels,
            line,
        })
    }

    fn push_text_block(&mut self, style: &str, text: &str, line: Option<usize>) -> usize {
        self.push_block(RawBlock {
            style: Some(style.to_string()),
            runs: vec![Inline::text(text)],
            cell: None,
            labels: Vec::new(),
            line,
        })
    }

    fn push_block(&mut self, block: RawBlock) -> usize {
        self.tree.blocks.push(block);
        self.tree.blocks.len() - 1
    }

    fn flush(&mut self, style: &str) {
        let raw = std::mem::take(&mut self.para);
        let start = self.para_start.take();
        let mut labels = std::mem::take(&mut self.para_labels);
        if raw.trim().is_empty() {
            if let Some(last) = self.tree.blocks.last_mut() {
                last.labels.append(&mut labels);
            }
            return;
        }
        let mut inlines = parse_inlines(&raw);
        labels.append(&mut inlines.labels);
        let line = start.and_then(|s| self.line(s));
        self.push_block(RawBlock {
            style: Some(style.to_string()),
            runs: inlines.runs,
            cell: None,
            labels,
            line,
        });
    }

    fn append(&mut self, from: usize, to: usize) {
        if from >= to {
            return;
        }
        if self.para_start.is_none() && !self.src[from..to].trim().is_empty() {
            let lead = self.src[from..to].len() - self.src[from..to].trim_start().len();
            self.para_start = Some(from + lead);
        }
        self.para.push_str(&self.src[from..to]);
    }

    fn attach_label(&mut self, label: String) {
        if !self.para.trim().is_empty() {
            self.para_labels.push(label);
        } else if let Some(last) = self.tree.blocks.last_mut() {
            last.labels.push(label);
        } else {
            self.para_labels.push(label);
        }
    }

    /// Scan `[start, end)` of the source, emitting paragraphs as `style`.
    fn scan(&mut self, start: usize, end: usize, style: &str) {
        let src = self.src;
        let mut pos = start;

        while let Some(caps) = RE_BLOCK.captures_at(&src[..end], pos) {
            let Some(whole) = caps.get(0) else { break };
            if !whole.as_str().starts_with('\n') && escaped(src, whole.start()) {
                self.append(pos, whole.end());
                pos = whole.end();
                continue;
            }
            self.append(pos, whole.start());
            let at = whole.start();
            let after = whole.end();

            let Some(cmd) = caps.get(1).map(|c| c.as_str()) else {
                let token = whole.as_str();
                if token.trim().is_empty() {
                    self.flush(style);
                    pos = after;
                } else {
                    self.flush(style);
                    let close = if token == "$$" { "$$" } else { "\\]" };
                    let (content_end, next) = match find_unescaped(src, after, close) {
                        Some(i) if i < end => (i, i + close.len()),
                        _ => (end, end),
                    };
                    self.equation(&src[after..content_end], at);
                    pos = next;
                }
                continue;
            };

            pos = match cmd {
                "par" => {
                    self.flush(style);
                    after
                }
                "label" => match group(src, after) {
                    Some((label, next)) => {
                        self.attach_label(label.trim().to_string());
                        next
                    }
                    None => after,
                },
                "begin" => {
                    self.flush(style);
                    self.environment(after, end)
                }
                "section" | "subsection" | "subsubsection" | "paragraph" => {
                    self.flush(style);
                    let j = skip_optionals(src, after);
                    match group(src, j) {
                        Some((title, next)) => {
                            self.push_inline_block(&format!("latex:{cmd}"), title, self.line(at));
                            next
                        }
                        None => after,
                    }
                }
                "caption" => {
                    self.flush(style);
                    let j = skip_optionals(src, after);
                    match group(src, j) {
                        Some((text, next)) => {
                            self.push_inline_block("latex:caption", text, self.line(at));
                            next
                        }
                        None => after,
                    }
                }
                "includegraphics" => {
                    self.flush(style);
                    let (image, next) = self.read_image(after);
                    if let Some((path, alt)) = image {
                        self.figure_image(&path, alt, at);
                    }
                    next
                }
                "maketitle" => {
                    self.flush(style);
                    let (body_start, _) = body_range(src);
                    self.front_matter(body_start);
                    after
                }
                "title" | "author" | "affiliation" | "email" | "keywords" => {
                    self.flush(style);
                    self.front_command(cmd, at, after)
                }
                "bibliography" | "printbibliography" => {
                    self.flush(style);
                    let (arg, next) = match group(src, after) {
                        Some((arg, next)) if cmd == "bibliography" => (Some(arg), next),
                        _ => (None, skip_optionals(src, after)),
                    };
                    self.external_bibliography(arg, at);
                    next
                }
                _ => after,
            };
        }
        self.append(pos, end);
        self.flush(style);
    }

    /// Handle `\begin{...}` whose name starts at `after_begin`; returns the
    /// position after the environment (or after its opening for transparent
    /// environments).
    fn environment(&mut self, after_begin: usize, limit: usize) -> usize {
        let src = self.src;
        let Some((name, after_name)) = group(src, after_begin) else {
            return after_begin;
        };
        let name = name.trim().to_string();
        let at = after_begin.saturating_sub("\\begin".len());
        let n = name.as_str();

        let handled = n == "abstract"
            || n == "keywords"
            || n.starts_with("figure")
            || n == "wrapfigure"
            || n == "table"
            || n == "table*"
            || n == "thebibliography"
            || TABULAR_ENVS.contains(&n)
            || MATH_ENVS.contains(&n)
            || VERBATIM_ENVS.contains(&n)
            || ALGORITHM_ENVS.contains(&n)
            || LIST_ENVS.contains(&n);
        if !handled {
            // Transparent container; minipage also carries a width.
            let mut j = skip_optionals(src, after_name);
            if n == "minipage" {
                j = group(src, j).map(|(_, next)| next).unwrap_or(j);
            }
            return j;
        }

        let content_start = after_name;
        let (content_end, next) =
            env_end(src, content_start, limit, n).unwrap_or((limit, limit));

        match n {
            "abstract" => {
                self.push_text_block("latex:abstract-heading", "Abstract", self.line(at));
                self.scan(content_start, content_end, "latex:abstract");
            }
            "keywords" => {
                self.push_text_block("latex:keywords-heading", "Keywords", self.line(at));
                self.push_inline_block("latex:keywords", &src[content_start..content_end], self.line(at));
            }
            "thebibliography" => {
                let j = group(src, content_start).map(|(_, next)| next).unwrap_or(content_start);
                self.has_bibliography = true;
                self.bibliography(&src[j..content_end], Some(j), self.line(at));
            }
            "table" | "table*" => self.table_float(content_start, content_end),
            _ if TABULAR_ENVS.contains(&n) => {
                self.tabular(n, content_start, content_end);
            }
            _ if n.starts_with("figure") || n == "wrapfigure" => {
                self.figure_float(content_start, content_end)
            }
            _ if MATH_ENVS.contains(&n) => self.equation(&src[content_start..content_end], at),
            _ if VERBATIM_ENVS.contains(&n) || ALGORITHM_ENVS.contains(&n) => {
                let j = if n.starts_with("verbatim") || n == "Verbatim" {
                    content_start
                } else {
                    skip_optionals(src, content_start)
                };
                let j = if n == "minted" {
                    group(src, j).map(|(_, next)| next).unwrap_or(j)
                } else {
                    j
                };
                self.code(n, j, content_end, at);
            }
            _ if LIST_ENVS.contains(&n) => self.list(content_start, content_end),
            _ => {}
        }
        next
    }

    fn equation(&mut self, content: &str, at: usize) {
        let labels = RE_LABEL
            .captures_iter(content)
            .map(|c| c[1].trim().to_string())
            .collect();
        let source = RE_LABEL.replace_all(content, "").trim().to_string();
        self.push_block(RawBlock {
            style: Some("latex:equation".into()),
            runs: vec![Inline::Math { source }],
            cell: None,
            labels,
            line: self.line(at),
        });
    }

    fn code(&mut self, env: &str, start: usize, end: usize, at: usize) {
        let content = &self.src[start..end];
        let algorithm = ALGORITHM_ENVS.contains(&env);
        let labels: Vec<String> = if algorithm {
            RE_LABEL
                .captures_iter(content)
                .map(|c| c[1].trim().to_string())
                .collect()
        } else {
            Vec::new()
        };
        let style = if algorithm { "latex:algorithm" } else { "latex:code" };
        self.push_block(RawBlock {
            style: Some(style.into()),
            runs: vec![Inline::text(content.trim_matches('\n'))],
            cell: None,
            labels,
            line: self.line(at),
        });
    }

    fn list(&mut self, start: usize, end: usize) {
        let src = self.src;
        let mut items: Vec<usize> = Vec::new();
        let mut depth = 0usize;
        let mut pos = start;
        static RE_ITEM_OR_ENV: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\\item\b|\\(begin|end)\s*\{[^}]+\}").unwrap());
        while let Some(caps) = RE_ITEM_OR_ENV.captures_at(&src[..end], pos) {
            let Some(m) = caps.get(0) else { break };
            match caps.get(1).map(|g| g.as_str()) {
                Some("begin") => depth += 1,
                Some(_) => depth = depth.saturating_sub(1),
                None if depth == 0 => items.push(m.start()),
                None => {}
            }
            pos = m.end();
        }
        for (k, &item) in items.iter().enumerate() {
            let item_end = items.get(k + 1).copied().unwrap_or(end);
            let content = skip_optionals(src, item + "\\item".len());
            self.scan(content, item_end, "latex:list-item");
        }
    }

    /// `\includegraphics[opts]{path}` after the command name.
    fn read_image(&self, after: usize) -> (Option<(String, Option<String>)>, usize) {
        let src = self.src;
        let (opts, j) = match optional(src, after) {
            Some((opts, next)) => (Some(opts), next),
            None => (None, after),
        };
        match group(src, j) {
            Some((path, next)) => {
                let alt = opts.and_then(|o| {
                    RE_ALT_OPTION.captures(o).map(|c| {
                        c[1].trim()
                            .trim_start_matches('{')
                            .trim_end_matches('}')
                            .to_string()
                    })
                });
                (Some((path.trim().to_string(), alt)), next)
            }
            None => (None, j),
        }
    }

    fn figure_image(&mut self, path: &str, alt: Option<String>, at: usize) -> usize {
        let id = self.tree.objects.len();
        let block = self.push_block(RawBlock {
            style: Some(BODY.into()),
            runs: vec![Inline::Image { object: id }],
            cell: None,
            labels: Vec::new(),
            line: self.line(at),
        });
        let mut obj = VisualObject::new(id, ObjectKind::Figure, block);
        obj.alt_text = alt.filter(|a| !a.trim().is_empty());
        obj.target = Some(path.to_string());
        obj.format = ImageFormat::from_target(path);
        self.tree.objects.push(obj);
        id
    }

    fn caption_block(&mut self, keyword: &str, number: usize, text: &str, at: usize) -> usize {
        let mut inlines = parse_inlines(text);
        inlines.runs.insert(
            0,
            Inline::text(format!("{keyword} {number}{} ", self.punctuation)),
        );
        self.push_block(RawBlock {
            style: Some("latex:caption".into()),
            runs: inlines.runs,
            cell: None,
            labels: inlines.labels,
            line: self.line(at),
        })
    }

    fn figure_float(&mut self, start: usize, end: usize) {
        let src = self.src;
        let mut images: Vec<usize> = Vec::new();
        let mut descriptions: Vec<String> = Vec::new();
        let mut labels: Vec<String> = Vec::new();
        let mut caption: Option<usize> = None;
        let mut pending_alts: Vec<(usize, bool)> = Vec::new();
        let mut pos = start;

        while let Some(caps) = RE_FIGURE_PARTS.captures_at(&src[..end], pos) {
            let Some(whole) = caps.get(0) else { break };
            let at = whole.start();
            pos = whole.end();
            match &caps[1] {
                "includegraphics" => {
                    let (image, next) = self.read_image(whole.end());
                    pos = next;
                    if let Some((path, alt)) = image {
                        let has_alt = alt.is_some();
                        let id = self.figure_image(&path, alt, at);
                        images.push(id);
                        pending_alts.push((id, has_alt));
                    }
                }
                "caption" => {
                    let j = skip_optionals(src, whole.end());
                    if let Some((text, next)) = group(src, j) {
                        self.figures += 1;
                        let block = self.caption_block("Figure", self.figures, text, at);
                        caption.get_or_insert(block);
                        pos = next;
                    }
                }
                "Description" => {
                    let j = skip_optionals(src, whole.end());
                    if let Some((text, next)) = group(src, j) {
                        descriptions.push(parse_inlines(text).plain().trim().to_string());
                        pos = next;
                    }
                }
                _ => {
                    if let Some((label, next)) = group(src, whole.end()) {
                        labels.push(label.trim().to_string());
                        pos = next;
                    }
                }
            }
        }

        for (k, (id, has_alt)) in pending_alts.iter().enumerate() {
            if *has_alt {
                continue;
            }
            let alt = descriptions
                .get(k)
                .or(if descriptions.len() == 1 { descriptions.first() } else { None })
                .filter(|d| !d.is_empty());
            self.tree.objects[*id].alt_text = alt.cloned();
        }

        let anchor = caption.or_else(|| {
            images
                .first()
                .map(|id| self.tree.objects[*id].first_block)
        });
        if let Some(block) = anchor {
            self.tree.blocks[block].labels.extend(labels);
        }
    }

    fn table_float(&mut self, start: usize, end: usize) {
        let src = self.src;
        let mut labels: Vec<String> = Vec::new();
        let mut description: Option<String> = None;
        let mut caption: Option<usize> = None;
        let mut tables: Vec<usize> = Vec::new();
        let mut pos = start;

        while let Some(caps) = RE_TABLE_PARTS.captures_at(&src[..end], pos) {
            let Some(whole) = caps.get(0) else { break };
            let at = whole.start();
            pos = whole.end();
            if let Some(env) = caps.get(2) {
                let env = env.as_str().to_string();
                let (content_end, next) =
                    env_end(src, whole.end(), end, &env).unwrap_or((end, end));
                if let Some(id) = self.tabular(&env, whole.end(), content_end) {
                    tables.push(id);
                }
                pos = next;
                continue;
            }
            match &caps[1] {
                "caption" => {
                    let j = skip_optionals(src, whole.end());
                    if let Some((text, next)) = group(src, j) {
                        self.tables += 1;
                        let block = self.caption_block("Table", self.tables, text, at);
                        caption.get_or_insert(block);
                        pos = next;
                    }
                }
                "Description" => {
                    if let Some((text, next)) = group(src, skip_optionals(src, whole.end())) {
                        description = Some(parse_inlines(text).plain().trim().to_string());
                        pos = next;
                    }
                }
                _ => {
                    if let Some((label, next)) = group(src, whole.end()) {
                        labels.push(label.trim().to_string());
                        pos = next;
                    }
                }
            }
        }

        if let Some(alt) = description.filter(|d| !d.is_empty()) {
            for id in &tables {
                self.tree.objects[*id].alt_text = Some(alt.clone());
            }
        }
        let anchor = caption.or_else(|| tables.first().map(|id| self.tree.objects[*id].first_block));
        if let Some(block) = anchor {
            self.tree.blocks[block].labels.extend(labels);
        }
    }

    /// Emit the cells of a tabular; `start` is just after `\begin{env}`.
    fn tabular(&mut self, env: &str, start: usize, end: usize) -> Option<usize> {
        let src = self.src;
        let mut j = skip_optionals(src, start);
        if env == "tabular*" || env == "tabularx" || env == "tabulary" {
            j = group(src, j).map(|(_, next)| next).unwrap_or(j);
        }
        j = group(src, j).map(|(_, next)| next).unwrap_or(j);
        if j > end {
            return None;
        }

        let rows = parse_rows(&src[j..end]);
        if rows.is_empty() {
            return None;
        }
        let id = self.tree.objects.len();
        let first_block = self.tree.blocks.len();
        for (r, row) in rows.iter().enumerate() {
            let style = if row.header {
                "latex:table-header"
            } else {
                "latex:table-text"
            };
            for (c, cell) in row.cells.iter().enumerate() {
                let inlines = parse_inlines(cell);
                self.push_block(RawBlock {
                    style: Some(style.into()),
                    runs: inlines.runs,
                    cell: Some(TableCell {
                        table: id,
                        row: r,
                        column: c,
                        header: row.header,
                    }),
                    labels: inlines.labels,
                    line: self.line(j + row.offset),
                });
            }
        }
        let mut obj = VisualObject::new(id, ObjectKind::Table, first_block);
        obj.last_block = self.tree.blocks.len() - 1;
        self.tree.objects.push(obj);
        Some(id)
    }

    fn bibliography(&mut self, body: &str, base: Option<usize>, line: Option<usize>) {
        self.push_text_block("latex:references-heading", "References", line);
        let starts: Vec<usize> = RE_BIBITEM.find_iter(body).map(|m| m.start()).collect();
        for (k, &item) in starts.iter().enumerate() {
            let item_end = starts.get(k + 1).copied().unwrap_or(body.len());
            let j = skip_optionals(body, item + "\\bibitem".len());
            let (key, text_start) = match group(body, j) {
                Some((key, next)) => (key.trim().to_string(), next),
                None => (String::new(), j),
            };
            let inlines = parse_inlines(&body[text_start.min(item_end)..item_end]);
            let entry_line = base.and_then(|b| self.line(b + item)).or(line);
            let mut labels = inlines.labels;
            if !key.is_empty() {
                labels.insert(0, format!("{BIB_LABEL_PREFIX}{key}"));
            }
            self.push_block(RawBlock {
                style: Some("latex:bibitem".into()),
                runs: inlines.runs,
                cell: None,
                labels,
                line: entry_line,
            });
        }
    }

    fn external_bibliography(&mut self, name: Option<&str>, at: usize) {
        let project = self.project;
        let Some(bbl) = project.bbl(name, &self.main_stem) else {
            self.tree.notes.push(
                Finding::new(WarningCode::BibCompileErrors)
                    .with_context("Bibliography file (.bbl) was not included with the source")
                    .at_line(self.line(at)),
            );
            self.has_bibliography = true;
            return;
        };
        let body = match bbl.find("\\begin{thebibliography}") {
            Some(i) => {
                let after = i + "\\begin{thebibliography}".len();
                let after = group(bbl, after).map(|(_, next)| next).unwrap_or(after);
                let end = bbl[after..]
                    .find("\\end{thebibliography}")
                    .map(|e| after + e)
                    .unwrap_or(bbl.len());
                &bbl[after..end]
            }
            None => bbl.as_str(),
        };
        if !RE_BIBITEM.is_match(body) {
            self.tree.notes.push(
                Finding::new(WarningCode::BibCompileErrors)
                    .with_context("Bibliography file contains no entries")
                    .at_line(self.line(at)),
            );
        }
        self.has_bibliography = true;
        self.bibliography(body, None, self.line(at));
    }
}

/// Label prefix marking a bibliography key on a `latex:bibitem` block.
pub const BIB_LABEL_PREFIX: &str = "bib:";

// ── Tabular rows ─────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Row {
    cells: Vec<String>,
    header: bool,
    /// Offset of the row text within the tabular body.
    offset: usize,
}

static RE_RULES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\s|\\(?:hline|toprule|midrule|bottomrule|endhead|endfirsthead)\b|\\(?:cline|cmidrule)\s*(?:\([^)]*\))?\s*\{[^}]*\})*")
        .unwrap()
});

fn parse_rows(body: &str) -> Vec<Row> {
    let body = body.replace("\\tabularnewline", "\\\\");
    let mut rows = Vec::new();
    let mut midrule_before: Option<usize> = None;
    let mut hline_after_first = false;
    let mut offset = 0;

    for segment in split_top_level(&body, "\\\\") {
        let seg_offset = offset;
        offset += segment.len() + 2;
        // Row-end options such as \\[2pt].
        let segment = match segment.strip_prefix('[') {
            Some(rest) => rest.split_once(']').map(|(_, r)| r).unwrap_or(rest),
            None => segment,
        };
        let rules = RE_RULES.find(segment).map(|m| m.as_str()).unwrap_or("");
        if rules.contains("\\midrule") && midrule_before.is_none() {
            midrule_before = Some(rows.len());
        }
        if rows.len() == 1 && rules.contains("\\hline") {
            hline_after_first = true;
        }
        let text = &segment[rules.len()..];
        let text = RE_RULES_ANYWHERE.replace_all(text, "");
        if text.trim().is_empty() {
            continue;
        }
        let cells = split_cells(&text);
        rows.push(Row {
            cells,
            header: false,
            offset: seg_offset,
        });
    }

    let header_rows = match midrule_before {
        Some(n) if n > 0 && n < rows.len() => n,
        _ if hline_after_first => 1,
        _ => 0,
    };
    for row in rows.iter_mut().take(header_rows) {
        row.header = true;
    }
    rows
}

static RE_RULES_ANYWHERE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\\(?:hline|toprule|midrule|bottomrule)\b|\\(?:cline|cmidrule)\s*(?:\([^)]*\))?\s*\{[^}]*\}")
        .unwrap()
});

fn split_cells(row: &str) -> Vec<String> {
    let bytes = row.as_bytes();
    let mut cells = Vec::new();
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b'&' if depth == 0 => {
                cells.push(row[last..i].trim().to_string());
                last = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    cells.push(row[last..].trim().to_string());
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SourceBlock;

    fn compile_str(src: &str) -> BlockTree {
        let input = SourceInput {
            name: "paper.tex".into(),
            kind: SourceKind::Latex,
            bytes: src.as_bytes().to_vec(),
            packaging: Packaging::Plain,
        };
        compile(&input, 25).unwrap()
    }

    fn text(block: &RawBlock) -> String {
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

    fn styles(tree: &BlockTree) -> Vec<&str> {
        tree.blocks
            .iter()
            .filter_map(|b| b.style.as_deref())
            .collect()
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(strip_comments("a % note\nb 50\\% c\n"), "a \nb 50\\% c\n");
    }

    #[test]
    fn test_front_matter_and_sections() {
        let tree = compile_str(
            r"\documentclass{edm_article}
\title{Learning Things}
\author{\alignauthor Ada Lovelace\\ \affaddr{Analytical University}\\ \email{ada@example.org}}
\begin{document}
\maketitle
\begin{abstract}
We study things.
\end{abstract}
\keywords{data, mining}
\section{Introduction}\label{sec:intro}
Hello world.

Second paragraph.
\end{document}",
        );
        assert_eq!(
            styles(&tree),
            vec![
                "latex:title",
                "latex:author",
                "latex:affiliation",
                "latex:email",
                "latex:abstract-heading",
                "latex:abstract",
                "latex:keywords-heading",
                "latex:keywords",
                "latex:section",
                BODY,
                BODY,
            ]
        );
        assert_eq!(text(&tree.blocks[3]).trim(), "ada@example.org");
        let intro = &tree.blocks[8];
        assert_eq!(text(intro), "Introduction");
        assert_eq!(intro.labels, vec!["sec:intro".to_string()]);
        assert_eq!(intro.line, Some(10));
        assert_eq!(tree.markers.document_class.as_deref(), Some("edm_article"));
    }

    #[test]
    fn test_figure_with_description_and_caption() {
        let tree = compile_str(
            r"\documentclass{jedm}
\begin{document}
\begin{figure}[t]
\centering
\includegraphics[width=\linewidth]{figs/plot.png}
\Description{Line plot of accuracy}
\caption{Accuracy over time.}\label{fig:acc}
\end{figure}
See Figure~\ref{fig:acc}.
\end{document}",
        );
        assert_eq!(tree.objects.len(), 1);
        let fig = &tree.objects[0];
        assert_eq!(fig.kind, ObjectKind::Figure);
        assert_eq!(fig.alt_text.as_deref(), Some("Line plot of accuracy"));
        assert_eq!(fig.format, Some(ImageFormat::Png));
        let caption = &tree.blocks[fig.first_block + 1];
        assert_eq!(caption.style.as_deref(), Some("latex:caption"));
        assert!(text(caption).starts_with("Figure 1: Accuracy"));
        assert_eq!(caption.labels, vec!["fig:acc".to_string()]);
        let last = tree.blocks.last().unwrap();
        assert!(last
            .runs
            .iter()
            .any(|r| matches!(r, Inline::CrossRef { label, .. } if label == "fig:acc")));
    }

    #[test]
    fn test_table_header_rows() {
        let tree = compile_str(
            r"\begin{document}
\begin{table}
\caption{Results}
\begin{tabular}{lr}
\toprule
Group & Score \\
\midrule
A & 1 \\
B & 2 \\
\bottomrule
\end{tabular}
\end{table}
\end{document}",
        );
        assert_eq!(text(&tree.blocks[0]), "Table 1. Results");
        let table = &tree.objects[0];
        assert_eq!(table.kind, ObjectKind::Table);
        assert_eq!((table.first_block, table.last_block), (1, 6));
        let headers: Vec<bool> = tree.blocks[1..=6]
            .iter()
            .map(|b| b.cell.unwrap().header)
            .collect();
        assert_eq!(headers, vec![true, true, false, false, false, false]);
        assert_eq!(tree.blocks[1].style.as_deref(), Some("latex:table-header"));
    }

    #[test]
    fn test_hline_marks_first_row_as_header() {
        let rows = parse_rows("a & b \\\\ \\hline c & d \\\\ e & f");
        assert_eq!(rows.len(), 3);
        assert!(rows[0].header);
        assert!(!rows[1].header);
        let plain = parse_rows("a & b \\\\ c & d");
        assert!(plain.iter().all(|r| !r.header));
    }

    #[test]
    fn test_citations_and_thebibliography() {
        let tree = compile_str(
            r"\begin{document}
As shown~\cite{smith20, doe19}.
\begin{thebibliography}{9}
\bibitem{smith20} J. Smith. 2020. A paper. In \emph{Proc. EDM}.
\bibitem[Doe(2019)]{doe19} J. Doe. 2019. Another.
\end{thebibliography}
\end{document}",
        );
        let cite = tree.blocks[0]
            .runs
            .iter()
            .find_map(|r| match r {
                Inline::Citation { keys } => Some(keys.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(cite, vec!["smith20", "doe19"]);
        assert_eq!(tree.blocks[1].style.as_deref(), Some("latex:references-heading"));
        assert_eq!(tree.blocks[2].labels[0], "bib:smith20");
        assert_eq!(tree.blocks[3].labels[0], "bib:doe19");
        assert!(!tree.notes.iter().any(|n| n.code == WarningCode::BibCompileErrors));
    }

    #[test]
    fn test_missing_bibliography_is_noted() {
        let tree = compile_str("\\begin{document}\nSee \\cite{x}.\n\\end{document}");
        assert!(tree.notes.iter().any(|n| n.code == WarningCode::BibCompileErrors));
    }

    #[test]
    fn test_source_notes() {
        let tree = compile_str(
            "\\documentclass{jedm}\n\\usepackage{natbib}\n\\begin{document}\n\\begin{algorithmic}\n\\State x\n\\end{algorithmic}\nThen more.\n\\begin{itemize}\n\\item a {b\n\\end{document}",
        );
        let codes: Vec<WarningCode> = tree.notes.iter().map(|n| n.code).collect();
        assert!(codes.contains(&WarningCode::NatbibJedm));
        assert!(codes.contains(&WarningCode::NoNewlineAfterAlgorithmic));
        assert!(codes.contains(&WarningCode::TexEnvParseFail));
        assert!(codes.contains(&WarningCode::Make4htWarnings));
    }

    #[test]
    fn test_inline_parsing() {
        let inl = parse_inlines(r"A \emph{key} idea at \url{http://x.org} with $x^2$ and ``quotes'' \& more");
        assert!(inl.runs.iter().any(|r| matches!(r, Inline::Text { text, emphasis: true, .. } if text == "key")));
        assert!(inl.runs.iter().any(|r| matches!(r, Inline::Link { href, .. } if href == "http://x.org")));
        assert!(inl.runs.iter().any(|r| matches!(r, Inline::Math { source } if source == "x^2")));
        assert!(inl.plain().contains("“quotes” & more"));
    }

    #[test]
    fn test_lists_become_items() {
        let tree = compile_str("\\begin{document}\n\\begin{itemize}\n\\item One\n\\item Two\n\\end{itemize}\n\\end{document}");
        let items: Vec<String> = tree
            .blocks
            .iter()
            .filter(|b| b.style.as_deref() == Some("latex:list-item"))
            .map(|b| text(b).trim().to_string())
            .collect();
        assert_eq!(items, vec!["One", "Two"]);
    }

    #[test]
    fn test_equation_labels() {
        let tree = compile_str("\\begin{document}\n\\begin{equation}\\label{eq:1}\na=b\n\\end{equation}\n\\end{document}");
        assert_eq!(tree.blocks[0].labels, vec!["eq:1".to_string()]);
        assert_eq!(tree.blocks[0].runs, vec![Inline::Math { source: "a=b".into() }]);
    }

    #[test]
    fn test_tarball_project_with_class_file() {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in [
            ("./paper/main.tex", "\\documentclass{article}\n\\begin{document}\n\\input{body}\n\\end{document}\n"),
            ("./paper/body.tex", "\\section{Introduction}\nHello.\n"),
            ("./paper/jedm.cls", "% class"),
        ] {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut gz, &builder.into_inner().unwrap()).unwrap();
        let input = SourceInput {
            name: "paper.tar.gz".into(),
            kind: SourceKind::Latex,
            bytes: gz.finish().unwrap(),
            packaging: Packaging::TarGz,
        };

        let tree = compile(&input, 25).unwrap();
        assert!(tree.markers.class_files.contains("jedm.cls"));
        assert_eq!(styles(&tree), vec!["latex:section", BODY]);
    }
}
