//! Citation & Reference Reconciler.
//!
//! Extracts the reference list (the entries under the last references
//! heading) and the citation markers of the body text before it, then
//! reports:
//!
//! * an empty reference section or a body without citations,
//! * citations and references that do not match each other,
//! * entries whose fields look incomplete for their inferred type,
//! * entries the [`ReferenceParser`] could not read at all.
//!
//! How citations point at entries depends on the source:
//!
//! | Mode        | When                         | Cited by           |
//! |-------------|------------------------------|--------------------|
//! | `Key`       | LaTeX `\cite` / `\bibitem`   | bibliography key   |
//! | `AuthorYear`| JEDM word-processor papers   | family names, year |
//! | `Numeric`   | everything else              | `[n]` ordinals     |

use crate::catalog::{Finding, WarningCode};
use crate::model::{Document, Inline, SemanticRole, SourceBlock, SourceKind, Template};
use crate::pipeline::bibliography::{Name, ReferenceFields, ReferenceParser};
use crate::pipeline::compile::latex::BIB_LABEL_PREFIX;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

static RE_REFERENCES_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[\s.0-9IVX]*(references|bibliography)\s*$").unwrap());

/// `[1]`, `[1, 2]`, `[cf. 3]`, `[4, p. 12]`
static RE_NUMERIC_CITE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(?:cf\.\s*)?((?:[1-9]\d*,?\s*)+)(?:(?:p|Sec|Ch)[^\],]+)?\]").unwrap()
});
static RE_RANGE_CITE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([1-9]\d*)\s*[-–]\s*([1-9]\d*)\]").unwrap());
static RE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// Range citations wider than this are more likely years or data.
const MAX_RANGE_WIDTH: u32 = 25;
/// Sorted citation numbers stop being plausible after a jump this large.
const MAX_ORDINAL_JUMP: u32 = 10;

static RE_CITE_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:e\.g\.|i\.e\.|see\b|cf\.),?\s*|,?\s*\b(?:pp?\.|ch\.|chapter|sec\.|section)\s*[\d–-]+")
        .unwrap()
});
static RE_PAREN_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^()]+)\)").unwrap());
static RE_AUTHOR_YEARS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(.*?\p{L}.*?),?\s+((?:(?:19|20)\d{2}[a-z]?|n\.\s?d\.)(?:\s*,\s*(?:(?:19|20)\d{2}[a-z]?|n\.\s?d\.))*)$",
    )
    .unwrap()
});
static RE_NARRATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\p{Lu}[\p{L}'’-]+(?:\s+(?:and|&)\s+\p{Lu}[\p{L}'’-]+|\s+et\s+al\.?)?)\s+\(((?:19|20)\d{2}[a-z]?|n\.\s?d\.)\)",
    )
    .unwrap()
});
static RE_YEAR_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:19|20)\d{2}[a-z]?|n\.\s?d\.").unwrap());

/// Result of one reconciler run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceReport {
    pub findings: Vec<Finding>,
    /// Entries found in the references section.
    pub entries: usize,
    /// Citation markers found in the body text.
    pub citations: usize,
}

/// The last level-1 heading reading "References" or "Bibliography".
pub fn references_heading(doc: &Document) -> Option<&SourceBlock> {
    doc.blocks.iter().rev().find(|b| {
        b.role.heading_level() == Some(1) && RE_REFERENCES_HEADING.is_match(b.text().trim())
    })
}

/// Non-blank blocks of the references section, up to the next heading of
/// the same or a higher level.
pub fn reference_entries<'a>(doc: &'a Document, heading: &SourceBlock) -> Vec<&'a SourceBlock> {
    let level = heading.role.heading_level().unwrap_or(1);
    doc.blocks[heading.index + 1..]
        .iter()
        .take_while(|b| b.role.heading_level().is_none_or(|l| l > level))
        .filter(|b| !b.is_blank() && !b.role.is_heading())
        .collect()
}

/// Cited and defined ordinals that have no counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrdinalMismatch {
    pub cited_not_defined: Vec<u32>,
    pub defined_not_cited: Vec<u32>,
}

impl OrdinalMismatch {
    pub fn is_empty(&self) -> bool {
        self.cited_not_defined.is_empty() && self.defined_not_cited.is_empty()
    }

    fn context(&self) -> String {
        let cited = self.cited_not_defined.iter().map(|n| format!("Citation: {n}"));
        let defined = self.defined_not_cited.iter().map(|n| format!("Reference: {n}"));
        cited.chain(defined).collect::<Vec<_>>().join("; ")
    }
}

/// Symmetric difference between the defined and cited ordinal sets.
pub fn reconcile_ordinals(defined: &BTreeSet<u32>, cited: &BTreeSet<u32>) -> OrdinalMismatch {
    OrdinalMismatch {
        cited_not_defined: cited.difference(defined).copied().collect(),
        defined_not_cited: defined.difference(cited).copied().collect(),
    }
}

/// Numeric citation markers of one text, each as the ordinals it names.
pub fn numeric_citations(text: &str) -> Vec<Vec<u32>> {
    let mut cites: Vec<Vec<u32>> = RE_NUMERIC_CITE
        .captures_iter(text)
        .map(|caps| {
            RE_NUMBER
                .find_iter(&caps[1])
                .filter_map(|m| m.as_str().parse().ok())
                .collect()
        })
        .collect();
    for caps in RE_RANGE_CITE.captures_iter(text) {
        let (Ok(low), Ok(high)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        if low < high && high - low < MAX_RANGE_WIDTH {
            cites.push((low..=high).collect());
        }
    }
    cites
}

/// Drop citations past the first implausible jump in the sorted ordinals,
/// keeping a marker only when all of its numbers survive.
fn plausible_citations(cites: Vec<Vec<u32>>) -> Vec<Vec<u32>> {
    let all: BTreeSet<u32> = cites.iter().flatten().copied().collect();
    let mut kept = BTreeSet::new();
    let mut previous = None;
    for n in all {
        if previous.is_some_and(|p| n - p > MAX_ORDINAL_JUMP) {
            break;
        }
        kept.insert(n);
        previous = Some(n);
    }
    cites
        .into_iter()
        .filter(|c| !c.is_empty() && c.iter().all(|n| kept.contains(n)))
        .collect()
}

/// One author–year citation, e.g. `(Lovelace & Turing, 2020)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AuthorYearCite {
    pub authors: String,
    pub year: String,
}

impl AuthorYearCite {
    fn year_key(&self) -> String {
        year_key(Some(&self.year))
    }

    fn words(&self) -> HashSet<String> {
        words(&self.authors).collect()
    }

    fn et_al(&self) -> bool {
        self.authors.contains("et al")
    }
}

fn year_key(year: Option<&str>) -> String {
    match year {
        Some(y) if y.starts_with(|c: char| c.is_ascii_digit()) => y.chars().take(4).collect(),
        _ => "XXXX".to_string(),
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '’' || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Author–year citations of one text, parenthetical and narrative.
pub fn author_year_citations(text: &str) -> Vec<AuthorYearCite> {
    let text = RE_CITE_NOISE.replace_all(text, " ");
    let mut cites = Vec::new();

    for group in RE_PAREN_GROUP.captures_iter(&text) {
        for part in group[1].split(';') {
            let Some(caps) = RE_AUTHOR_YEARS.captures(part.trim()) else {
                continue;
            };
            let authors = caps[1].trim().trim_end_matches(',').trim();
            for year in RE_YEAR_TOKEN.find_iter(&caps[2]) {
                cites.push(AuthorYearCite {
                    authors: authors.to_string(),
                    year: year.as_str().to_string(),
                });
            }
        }
    }
    for caps in RE_NARRATIVE.captures_iter(&text) {
        cites.push(AuthorYearCite {
            authors: caps[1].to_string(),
            year: caps[2].to_string(),
        });
    }
    cites
}

/// Does `cite` refer to the entry with these fields?
///
/// The year must agree and every family name must appear in the citation,
/// except that `et al.` stands in for everyone after the first author of
/// an entry with more than two authors.
pub fn cites_entry(cite: &AuthorYearCite, fields: &ReferenceFields) -> bool {
    if cite.year_key() != year_key(fields.date.as_deref()) {
        return false;
    }
    let names = citable_names(fields);
    let Some(first) = names.first() else {
        return false;
    };
    let cited = cite.words();
    let named = |name: &Name| words(&name.family).all(|w| cited.contains(&w));
    names.iter().all(named) || (cite.et_al() && names.len() > 2 && named(first))
}

/// Authors, falling back to the publisher for corporate works.
fn citable_names(fields: &ReferenceFields) -> Vec<Name> {
    if !fields.authors.is_empty() {
        return fields.authors.clone();
    }
    fields
        .publisher
        .iter()
        .map(|p| Name::family(p.as_str()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Key,
    AuthorYear,
    Numeric,
}

fn mode(doc: &Document, entries: &[&SourceBlock]) -> Mode {
    let keyed = entries
        .iter()
        .any(|b| b.labels.iter().any(|l| l.starts_with(BIB_LABEL_PREFIX)));
    if doc.kind == SourceKind::Latex || keyed {
        Mode::Key
    } else if doc.template == Template::Jedm {
        Mode::AuthorYear
    } else {
        Mode::Numeric
    }
}

/// Run the reconciler over a role-bound document.
pub fn check_references(doc: &Document, parser: &dyn ReferenceParser) -> ReferenceReport {
    let mut report = ReferenceReport::default();
    let Some(heading) = references_heading(doc) else {
        // Reported by the validator as a missing references heading.
        return report;
    };
    let entries = reference_entries(doc, heading);
    report.entries = entries.len();
    let at_heading = |code| Finding::new(code).at_block(heading.index).at_line(heading.line);

    if entries.is_empty() {
        report
            .findings
            .push(at_heading(WarningCode::NoReferencesFoundInReferenceSection));
        return report;
    }

    let body: Vec<&SourceBlock> = doc.blocks[..heading.index]
        .iter()
        .filter(|b| b.role != SemanticRole::Code)
        .collect();

    let mut parsed: Vec<Option<ReferenceFields>> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match parser.parse(&entry.text()) {
            Ok(fields) => parsed.push(Some(fields)),
            Err(e) => {
                report.findings.push(
                    Finding::new(WarningCode::ReferenceParseFailed)
                        .with_context(format!("Reference {}: {e}", i + 1))
                        .at_block(entry.index)
                        .at_line(entry.line),
                );
                parsed.push(None);
            }
        }
    }

    let mode = mode(doc, &entries);
    let mismatch = match mode {
        Mode::Key => key_mismatch(&body, &entries, &mut report.citations),
        Mode::Numeric => numeric_mismatch(&body, entries.len(), &mut report.citations),
        Mode::AuthorYear => author_year_mismatch(&body, &parsed, &mut report.citations),
    };
    debug!(
        "References: {} entries, {} citations ({:?} mode)",
        report.entries, report.citations, mode
    );

    if report.citations == 0 {
        report
            .findings
            .push(Finding::new(WarningCode::NoCitationsFoundInText));
    } else if let Some(context) = mismatch {
        report
            .findings
            .push(at_heading(WarningCode::MismatchedRefs).with_context(context));
    }

    for (i, (entry, fields)) in entries.iter().zip(&parsed).enumerate() {
        let Some(fields) = fields else { continue };
        if let Some(context) = incomplete_context(i + 1, fields) {
            report.findings.push(
                Finding::new(WarningCode::IncompleteReference)
                    .with_context(context)
                    .at_block(entry.index)
                    .at_line(entry.line),
            );
        }
    }
    report
}

fn incomplete_context(ordinal: usize, fields: &ReferenceFields) -> Option<String> {
    let mut fields = fields.clone();
    if fields.authors.is_empty() {
        fields.authors = citable_names(&fields);
    }
    let missing = fields.missing();
    if missing.is_empty() {
        return None;
    }
    let key = fields.short_key();
    let short = if key.is_empty() {
        String::new()
    } else {
        format!(" ({key})")
    };
    Some(format!(
        "Reference {ordinal}{short} was recognized as {} and might be missing the following: {}",
        fields.kind,
        missing.join(", ")
    ))
}

fn numeric_mismatch(body: &[&SourceBlock], defined: usize, count: &mut usize) -> Option<String> {
    let cites: Vec<Vec<u32>> = body.iter().flat_map(|b| numeric_citations(&b.text())).collect();
    let cites = plausible_citations(cites);
    *count = cites.len();
    let cited: BTreeSet<u32> = cites.into_iter().flatten().collect();
    let defined: BTreeSet<u32> = (1..=defined as u32).collect();
    let mismatch = reconcile_ordinals(&defined, &cited);
    (!mismatch.is_empty()).then(|| mismatch.context())
}

fn key_mismatch(
    body: &[&SourceBlock],
    entries: &[&SourceBlock],
    count: &mut usize,
) -> Option<String> {
    let ordinals: BTreeMap<&str, u32> = entries
        .iter()
        .enumerate()
        .flat_map(|(i, b)| {
            b.labels
                .iter()
                .filter_map(|l| l.strip_prefix(BIB_LABEL_PREFIX))
                .map(move |key| (key, i as u32 + 1))
        })
        .collect();

    let mut undefined = BTreeSet::new();
    let mut cited = BTreeSet::new();
    for block in body {
        for run in &block.runs {
            let Inline::Citation { keys } = run else {
                continue;
            };
            *count += 1;
            for key in keys {
                match ordinals.get(key.as_str()) {
                    Some(&n) => {
                        cited.insert(n);
                    }
                    None => {
                        undefined.insert(key.as_str());
                    }
                }
            }
        }
    }

    let defined: BTreeSet<u32> = (1..=entries.len() as u32).collect();
    let uncited = defined.difference(&cited).map(|n| format!("Reference: {n}"));
    let context: Vec<String> = undefined
        .iter()
        .map(|k| format!("Citation: {k}"))
        .chain(uncited)
        .collect();
    (!context.is_empty()).then(|| context.join("; "))
}

fn author_year_mismatch(
    body: &[&SourceBlock],
    parsed: &[Option<ReferenceFields>],
    count: &mut usize,
) -> Option<String> {
    let cites: Vec<AuthorYearCite> = body
        .iter()
        .flat_map(|b| author_year_citations(&b.text()))
        .collect();
    *count = cites.len();

    let unmatched_cites: BTreeSet<String> = cites
        .iter()
        .filter(|c| !parsed.iter().flatten().any(|f| cites_entry(c, f)))
        .map(|c| format!("Citation: {}, {}", c.authors, c.year))
        .collect();
    let unmatched_refs = parsed
        .iter()
        .flatten()
        .filter(|f| !cites.iter().any(|c| cites_entry(c, f)))
        .map(|f| format!("Reference: {}", f.short_key()));

    let context: Vec<String> = unmatched_cites.into_iter().chain(unmatched_refs).collect();
    (!context.is_empty()).then(|| context.join("; "))
}
