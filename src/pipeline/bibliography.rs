//! Reference entry parsing.
//!
//! The reconciler only needs a handful of structured fields per entry, so
//! entry parsing sits behind the [`ReferenceParser`] capability. The
//! built-in [`HeuristicReferenceParser`] understands the two citation
//! styles the templates prescribe:
//!
//! ```text
//! ACM:  Ada Lovelace and Alan Turing. 2020. Title. In Proceedings of X. ACM, 1–10.
//! APA:  Lovelace, A., & Turing, A. (2020). Title. Journal of Y, 3(2), 1–10.
//! ```
//!
//! Field names follow CSL (`author`, `container-title`, ...), because the
//! completeness rules are phrased in those terms.

use crate::error::EntryError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Parses one raw reference entry into structured fields.
///
/// Implementations must be pure: the reconciler calls them from a blocking
/// task and isolates every failure to its entry.
pub trait ReferenceParser: Send + Sync {
    fn parse(&self, raw: &str) -> Result<ReferenceFields, EntryError>;
}

/// Inferred bibliographic type, named after its CSL type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    ArticleJournal,
    PaperConference,
    Chapter,
    Book,
    Report,
    Thesis,
    #[default]
    Other,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::ArticleJournal => "article-journal",
            EntryKind::PaperConference => "paper-conference",
            EntryKind::Chapter => "chapter",
            EntryKind::Book => "book",
            EntryKind::Report => "report",
            EntryKind::Thesis => "thesis",
            EntryKind::Other => "other",
        }
    }

    /// Fields an entry of this type is expected to have.
    pub fn requirements(self) -> &'static [&'static str] {
        match self {
            EntryKind::Book | EntryKind::Report => &["author", "title", "date", "publisher"],
            EntryKind::Chapter => &[
                "author",
                "title",
                "date",
                "publisher",
                "editor",
                "container-title",
                "pages",
                "location",
            ],
            EntryKind::PaperConference => {
                &["author", "title", "date", "container-title", "pages"]
            }
            EntryKind::ArticleJournal => &[
                "author",
                "title",
                "date",
                "container-title",
                "pages",
                "volume",
            ],
            EntryKind::Thesis | EntryKind::Other => &["title", "date"],
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One person in an author or editor list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Name {
    pub family: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
}

impl Name {
    pub fn family(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            given: None,
        }
    }
}

/// Structured fields recovered from one entry. Any field may be missing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReferenceFields {
    pub kind: EntryKind,
    #[serde(default)]
    pub authors: Vec<Name>,
    /// The author list was cut short (`et al.`, `...`).
    #[serde(default)]
    pub more_authors: bool,
    #[serde(default)]
    pub editors: Vec<Name>,
    pub title: Option<String>,
    pub container_title: Option<String>,
    /// Four-digit year, with any disambiguating letter (`2020a`).
    pub date: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    pub publisher: Option<String>,
    pub location: Option<String>,
}

impl ReferenceFields {
    /// CSL names of the fields that are present.
    pub fn present(&self) -> BTreeSet<&'static str> {
        let mut set = BTreeSet::new();
        let mut add = |name: &'static str, present: bool| {
            if present {
                set.insert(name);
            }
        };
        add("author", !self.authors.is_empty());
        add("editor", !self.editors.is_empty());
        add("title", self.title.is_some());
        add("container-title", self.container_title.is_some());
        add("date", self.date.is_some());
        add("volume", self.volume.is_some());
        add("issue", self.issue.is_some());
        add("pages", self.pages.is_some());
        add("publisher", self.publisher.is_some());
        add("location", self.location.is_some());
        set
    }

    /// Required fields for the inferred type that are absent, in rule order.
    pub fn missing(&self) -> Vec<&'static str> {
        let present = self.present();
        self.kind
            .requirements()
            .iter()
            .copied()
            .filter(|f| !present.contains(f))
            .collect()
    }

    /// A short human handle: title, else author family names, else venue.
    pub fn short_key(&self) -> String {
        let key = if let Some(title) = &self.title {
            title.clone()
        } else if !self.authors.is_empty() {
            self.authors
                .iter()
                .map(|a| a.family.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            self.container_title.clone().unwrap_or_default()
        };
        if key.chars().count() > 35 {
            format!("{}...", key.chars().take(30).collect::<String>())
        } else {
            key
        }
    }
}

// ── Heuristic parser ─────────────────────────────────────────────────────

static RE_ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:\[\d+\]|\d+\.)\s*").unwrap());
static RE_YEAR_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(?(?:([12]\d{3}[a-z]?)|n\.\s?d\.?)\)?\.?$").unwrap());
static RE_YEAR_PAREN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((?:([12]\d{3}[a-z]?)|n\.\s?d\.)\)").unwrap());
static RE_YEAR_ANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2}[a-z]?)\b").unwrap());
static RE_INITIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\p{Lu}\.?[\s-]*)+$").unwrap());
static RE_AUTHOR_SEP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*(?:&|and)\s+|\s+(?:&|and)\s+|,").unwrap());
static RE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:https?://|doi:\s*|www\.)\S+").unwrap());
static RE_PAGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:pp?\.\s*)?\b(\d+)\s*[-–—]+\s*(\d+)\b").unwrap());
static RE_VOLUME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[,\s]*(\d+)\s*(?:\((\d+)\)|,\s*(\d+)\b)?").unwrap());
static RE_EDITORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i:In:?)\s+(.+?)\s*\((?i:Eds?\.?)\)\s*,?\s*(.*)$").unwrap());
static RE_LOCATION_PUBLISHER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):\s*([^:]+)$").unwrap());

const CONFERENCE_WORDS: &[&str] = &["proceedings", "conference", "workshop", "symposium"];
const JOURNAL_WORDS: &[&str] = &["journal", "transactions", "review", "letters"];
const REPORT_WORDS: &[&str] = &["technical report", "tech. rep", "report"];
const THESIS_WORDS: &[&str] = &["thesis", "dissertation", "ph.d"];

/// Words ending in `.` that do not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "pp", "p", "proc", "vol", "no", "eds", "ed", "int", "conf", "j", "trans", "st", "jr", "inc",
    "univ", "dept", "tech", "rep", "intl", "natl", "assoc", "comput", "educ",
];

/// Rule-based parser for ACM- and APA-style entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReferenceParser;

impl ReferenceParser for HeuristicReferenceParser {
    fn parse(&self, raw: &str) -> Result<ReferenceFields, EntryError> {
        let text = RE_ORDINAL.replace(raw.trim(), "");
        let text = text.trim();
        if text.is_empty() {
            return Err(EntryError::Empty);
        }

        let segments = sentences(text);
        let mut fields = ReferenceFields::default();

        // Locate authors, date and title.
        let title_at;
        if let Some(y) = segments.iter().position(|s| RE_YEAR_ONLY.is_match(s)) {
            fields.date = RE_YEAR_ONLY
                .captures(&segments[y])
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            authors_into(&segments[..y].join(" "), &mut fields);
            title_at = y + 1;
        } else if let Some(caps) = segments.first().and_then(|s| RE_YEAR_PAREN.captures(s)) {
            let first = &segments[0];
            fields.date = caps.get(1).map(|m| m.as_str().to_string());
            let before = caps.get(0).map_or(0, |m| m.start());
            authors_into(&first[..before], &mut fields);
            title_at = 1;
        } else {
            if let Some(first) = segments.first() {
                authors_into(first, &mut fields);
            }
            fields.date = RE_YEAR_ANY
                .captures_iter(text)
                .last()
                .map(|c| c[1].to_string());
            title_at = 1;
        }
        fields.title = segments
            .get(title_at)
            .map(|t| clean(t))
            .filter(|t| !t.is_empty());

        let rest: Vec<String> = segments
            .iter()
            .skip(title_at + 1)
            .map(|s| RE_LINK.replace_all(s, "").trim().to_string())
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("doi:"))
            .collect();
        venue_into(&rest, &mut fields);
        fields.kind = infer_kind(text, &fields);

        if fields.authors.is_empty() && fields.title.is_none() && fields.date.is_none() {
            return Err(EntryError::Unrecognised {
                text: text.to_string(),
            });
        }
        Ok(fields)
    }
}

/// Split an entry into sentences, keeping initials and common
/// abbreviations inside their sentence.
fn sentences(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();
    while let Some((i, c)) = iter.next() {
        if !matches!(c, '.' | '?' | '!') {
            continue;
        }
        if iter.peek().is_some_and(|&(_, n)| !n.is_whitespace()) {
            continue;
        }
        let word = text[start..i]
            .rsplit(|ch: char| ch.is_whitespace() || ch == '(')
            .next()
            .unwrap_or("");
        if c == '.' && is_abbreviation(word) {
            continue;
        }
        let end = i + c.len_utf8();
        let sentence = text[start..end].trim();
        if !sentence.is_empty() {
            out.push(sentence.to_string());
        }
        start = end;
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

fn is_abbreviation(word: &str) -> bool {
    let mut chars = word.chars();
    let single_initial = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_uppercase());
    // Dotted initials such as "A.B" before the final period.
    let dotted = word.contains('.')
        && word
            .split('.')
            .all(|p| p.chars().count() <= 1 && p.chars().all(char::is_uppercase));
    single_initial || dotted || ABBREVIATIONS.contains(&word.to_lowercase().as_str())
}

fn clean(s: &str) -> String {
    s.trim()
        .trim_end_matches(['.', ','])
        .trim()
        .to_string()
}

/// Split an author list. APA lists alternate family names and initials;
/// ACM lists spell out "Given Family" per author.
fn authors_into(list: &str, fields: &mut ReferenceFields) {
    let list = list.trim().trim_end_matches('.');
    let mut list = list.to_string();
    for marker in ["et al.", "et al", "..."] {
        if list.contains(marker) {
            fields.more_authors = true;
            list = list.replace(marker, "");
        }
    }
    let tokens: Vec<&str> = RE_AUTHOR_SEP
        .split(&list)
        .map(|t| t.trim().trim_start_matches(['&']).trim())
        .filter(|t| !t.is_empty())
        .collect();
    let apa = tokens.iter().any(|t| RE_INITIALS.is_match(t));

    let mut names: Vec<Name> = Vec::new();
    for token in tokens {
        if apa {
            if RE_INITIALS.is_match(token) {
                if let Some(last) = names.last_mut() {
                    last.given = Some(token.to_string());
                    continue;
                }
            }
            names.push(Name::family(token));
        } else {
            let (given, family) = match token.rsplit_once(' ') {
                Some((g, f)) => (Some(g.trim().to_string()), f),
                None => (None, token),
            };
            names.push(Name {
                family: family.trim_end_matches('.').to_string(),
                given,
            });
        }
    }
    fields.authors = names;
}

fn venue_into(rest: &[String], fields: &mut ReferenceFields) {
    let Some(first) = rest.first() else {
        return;
    };
    let venue = first.as_str();

    if let Some(caps) = RE_EDITORS.captures(venue) {
        let mut editors = ReferenceFields::default();
        authors_into(&caps[1], &mut editors);
        fields.editors = editors.authors;
        let container = caps[2].split(" (").next().unwrap_or_default();
        fields.container_title = Some(clean(container)).filter(|c| !c.is_empty());
    } else if let Some(stripped) = venue
        .strip_prefix("In: ")
        .or_else(|| venue.strip_prefix("In "))
    {
        let container = stripped.split(" (pp").next().unwrap_or(stripped);
        let container = container.split(", pp").next().unwrap_or(container);
        fields.container_title = Some(clean(container)).filter(|c| !c.is_empty());
    } else if let Some(digit) = venue.find(|c: char| c.is_ascii_digit()) {
        // "Journal Name, 12(3), 1–20" or "Journal Name 12, 3 (2020), 1–20"
        let name = venue[..digit].trim_end_matches([',', ' ']);
        if !name.is_empty() {
            fields.container_title = Some(clean(name));
            if let Some(caps) = RE_VOLUME.captures(&venue[digit..]) {
                fields.volume = caps.get(1).map(|m| m.as_str().to_string());
                fields.issue = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .map(|m| m.as_str().to_string());
            }
        }
    } else if rest.len() > 1 || names_venue(venue) {
        fields.container_title = Some(clean(venue));
    }

    let all = rest.join(" ");
    if let Some(caps) = RE_PAGES.captures(&all) {
        fields.pages = Some(format!("{}–{}", &caps[1], &caps[2]));
    }

    // Publisher: the last segment that is not the venue and carries no
    // numbers once pages are removed.
    let publisher_segment = rest
        .iter()
        .enumerate()
        .rev()
        .map(|(i, s)| (i, RE_PAGES.replace_all(s, "").to_string()))
        .map(|(i, s)| (i, s.trim().trim_end_matches(['.', ',', ' ']).to_string()))
        .find(|(i, s)| {
            !s.is_empty()
                && !s.chars().any(|c| c.is_ascii_digit())
                && (*i > 0 || fields.container_title.is_none())
        });
    if let Some((_, segment)) = publisher_segment {
        if let Some(caps) = RE_LOCATION_PUBLISHER.captures(&segment) {
            fields.location = Some(clean(&caps[1]));
            fields.publisher = Some(clean(&caps[2]));
        } else {
            let mut parts = segment.splitn(2, ',');
            fields.publisher = parts.next().map(clean).filter(|p| !p.is_empty());
            fields.location = parts.next().map(clean).filter(|l| !l.is_empty());
        }
    }
}

fn names_venue(segment: &str) -> bool {
    let lower = segment.to_lowercase();
    CONFERENCE_WORDS
        .iter()
        .chain(JOURNAL_WORDS)
        .any(|w| lower.contains(w))
}

fn infer_kind(text: &str, fields: &ReferenceFields) -> EntryKind {
    let lower = text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if !fields.editors.is_empty() {
        EntryKind::Chapter
    } else if has(CONFERENCE_WORDS) {
        EntryKind::PaperConference
    } else if has(THESIS_WORDS) {
        EntryKind::Thesis
    } else if fields.volume.is_some() || has(JOURNAL_WORDS) {
        EntryKind::ArticleJournal
    } else if has(REPORT_WORDS) {
        EntryKind::Report
    } else if fields.publisher.is_some() && fields.container_title.is_none() {
        EntryKind::Book
    } else {
        EntryKind::Other
    }
}
