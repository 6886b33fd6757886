//! Warning codes, findings and the warning catalog.
//!
//! Checkers never produce user-facing text. They emit [`Finding`]s (a code
//! plus optional position), and the aggregator resolves each one against the
//! [`WarningCatalog`] using `(code, template, source kind)` as the key.
//! Overrides replace the default message or help field; they never append.
//!
//! The built-in catalog is `assets/warnings.json`, embedded at compile time
//! and parsed once on first use.

use crate::error::PaperCheckError;
use crate::model::{SourceKind, Template};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

static BUILTIN_JSON: &str = include_str!("../assets/warnings.json");

static BUILTIN: Lazy<WarningCatalog> = Lazy::new(|| {
    WarningCatalog::from_json(BUILTIN_JSON).expect("embedded warnings.json covers every code")
});

// ── Codes ────────────────────────────────────────────────────────────────

macro_rules! warning_codes {
    ($( $variant:ident => $code:literal, )+) => {
        /// Stable identifier of a warning kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum WarningCode {
            $( #[serde(rename = $code)] $variant, )+
        }

        impl WarningCode {
            /// Every code, in declaration order.
            pub const ALL: &'static [WarningCode] = &[ $( WarningCode::$variant, )+ ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( WarningCode::$variant => $code, )+
                }
            }
        }

        impl FromStr for WarningCode {
            type Err = PaperCheckError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $code => Ok(WarningCode::$variant), )+
                    other => Err(PaperCheckError::InvalidCatalog(format!(
                        "unknown warning code '{other}'"
                    ))),
                }
            }
        }
    };
}

warning_codes! {
    // pipeline stages
    UnsupportedFormat => "unsupported_format",
    EmptyDocument => "empty_document",
    Make4htFailed => "make4ht_failed",
    Unexpected => "unexpected",
    Timeout => "timeout",
    TexFileMissing => "tex_file_missing",
    // source level
    AmbiguousTexFile => "ambiguous_tex_file",
    TexEnvParseFail => "tex_env_parse_fail",
    Make4htWarnings => "make4ht_warnings",
    NoNewlineAfterAlgorithmic => "no_newline_after_algorithmic",
    BibCompileErrors => "bib_compile_errors",
    NatbibJedm => "natbib_jedm",
    TemplateNotDetected => "template_not_detected",
    // required roles
    StylePaperTitle => "style_paper_title",
    StyleAuthor => "style_author",
    AuthorDataMissing => "author_data_missing",
    StyleAffiliations => "style_affiliations",
    StyleEmail => "style_email",
    StyleAbstractHeading => "style_abstract_heading",
    StyleAbstract => "style_abstract",
    StyleKeywordsHeading => "style_keywords_heading",
    StyleKeywords => "style_keywords",
    StyleNoIntro => "style_no_intro",
    StyleNoRefs => "style_no_refs",
    // role content
    StyleEmailInAuthor => "style_email_in_author",
    StyleSpaceInEmail => "style_space_in_email",
    StyleLongHeading => "style_long_heading",
    // tables
    TableCaptionMissing => "table_caption_missing",
    TableHeaderMissing => "table_header_missing",
    TableStylesMissing => "table_styles_missing",
    // typography
    Wingdings => "wingdings",
    UrlSchema => "url_schema",
    QuoteDirection => "quote_direction",
    // alt text and media
    AltTextMissing => "alt_text_missing",
    AltTextLong => "alt_text_long",
    AltTextDuplicate => "alt_text_duplicate",
    WmfImages => "wmf_images",
    UnknownImageType => "unknown_image_type",
    // captions
    FigureCaptionDistance => "figure_caption_distance",
    TableCaptionDistance => "table_caption_distance",
    ChartCaptionDistance => "chart_caption_distance",
    UnknownCaptionType => "unknown_caption_type",
    CaptionInTable => "caption_in_table",
    FigureCaptionBlank => "figure_caption_blank",
    FigureCaptionUnstyled => "figure_caption_unstyled",
    NoCaptionNumberPeriod => "no_caption_number_period",
    ImageAsTable => "image_as_table",
    // citations and references
    NoReferencesFoundInReferenceSection => "no_references_found_in_reference_section",
    NoCitationsFoundInText => "no_citations_found_in_text",
    MismatchedRefs => "mismatched_refs",
    IncompleteReference => "incomplete_reference",
    ReferenceParseFailed => "reference_parse_failed",
    // cross references
    BrokenInternalRef => "broken_internal_ref",
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Severity ─────────────────────────────────────────────────────────────

/// How likely an issue is to produce an incorrect or inaccessible document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Findings and warnings ────────────────────────────────────────────────

/// An unresolved diagnostic emitted by a checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub code: WarningCode,
    /// Positional or explanatory context (heading text, table index, ...).
    pub context: Option<String>,
    /// Sequence index of the block the finding is about.
    pub block: Option<usize>,
    /// Source line, when known.
    pub line: Option<usize>,
}

impl Finding {
    pub fn new(code: WarningCode) -> Self {
        Self {
            code,
            context: None,
            block: None,
            line: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn at_block(mut self, block: usize) -> Self {
        self.block = Some(block);
        self
    }

    pub fn at_line(mut self, line: Option<usize>) -> Self {
        self.line = line;
        self
    }
}

/// A finding resolved against the catalog: the record shown to authors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub code: WarningCode,
    pub severity: Severity,
    pub message: String,
    pub help: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

// ── Catalog ──────────────────────────────────────────────────────────────

/// Replacement text for one template or source kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

/// Catalog text and severity for one code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub message: String,
    pub severity: Severity,
    pub help: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub template_overrides: HashMap<Template, TextOverride>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub source_overrides: HashMap<SourceKind, TextOverride>,
}

/// Text chosen for one `(code, template, source)` lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedText<'a> {
    pub severity: Severity,
    pub message: &'a str,
    pub help: &'a str,
}

/// Read-only mapping from warning code to message, severity and help.
#[derive(Debug, Clone)]
pub struct WarningCatalog {
    entries: HashMap<WarningCode, CatalogEntry>,
}

impl WarningCatalog {
    /// The embedded catalog, parsed once per process.
    pub fn builtin() -> &'static WarningCatalog {
        &BUILTIN
    }

    /// Parse a catalog, requiring an entry for every known code.
    ///
    /// Entries for codes this build does not know are skipped with a log
    /// line so newer catalog files keep working with older binaries.
    pub fn from_json(json: &str) -> Result<Self, PaperCheckError> {
        let raw: HashMap<String, CatalogEntry> = serde_json::from_str(json)
            .map_err(|e| PaperCheckError::InvalidCatalog(e.to_string()))?;

        let mut entries = HashMap::with_capacity(raw.len());
        for (key, entry) in raw {
            match key.parse::<WarningCode>() {
                Ok(code) => {
                    entries.insert(code, entry);
                }
                Err(_) => warn!("Ignoring catalog entry for unknown code '{}'", key),
            }
        }

        let missing: Vec<&str> = WarningCode::ALL
            .iter()
            .filter(|c| !entries.contains_key(c))
            .map(|c| c.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(PaperCheckError::InvalidCatalog(format!(
                "missing entries for: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { entries })
    }

    /// Load a catalog file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PaperCheckError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PaperCheckError::InvalidCatalog(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn entry(&self, code: WarningCode) -> Option<&CatalogEntry> {
        self.entries.get(&code)
    }

    pub fn severity(&self, code: WarningCode) -> Severity {
        self.entries
            .get(&code)
            .map(|e| e.severity)
            .unwrap_or(Severity::High)
    }

    /// Resolve text for a code.
    ///
    /// Each field is taken from the first of: template override, source-kind
    /// override, default.
    pub fn resolve(
        &self,
        code: WarningCode,
        template: Template,
        source: Option<SourceKind>,
    ) -> ResolvedText<'_> {
        let Some(entry) = self.entries.get(&code) else {
            return ResolvedText {
                severity: Severity::High,
                message: code.as_str(),
                help: "",
            };
        };

        let overrides = [
            entry.template_overrides.get(&template),
            source.and_then(|s| entry.source_overrides.get(&s)),
        ];

        ResolvedText {
            severity: entry.severity,
            message: pick(|o| o.message.as_ref(), overrides, &entry.message),
            help: pick(|o| o.help.as_ref(), overrides, &entry.help),
        }
    }

    /// Resolve a finding into a user-facing warning.
    pub fn warning(
        &self,
        finding: Finding,
        template: Template,
        source: Option<SourceKind>,
    ) -> Warning {
        let text = self.resolve(finding.code, template, source);
        Warning {
            code: finding.code,
            severity: text.severity,
            message: text.message.to_string(),
            help: text.help.to_string(),
            context: finding.context,
            block: finding.block,
            line: finding.line,
        }
    }

    /// All entries in code declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (WarningCode, &CatalogEntry)> {
        WarningCode::ALL
            .iter()
            .filter_map(|c| self.entries.get(c).map(|e| (*c, e)))
    }
}

fn pick<'a>(
    field: fn(&TextOverride) -> Option<&String>,
    overrides: [Option<&'a TextOverride>; 2],
    default: &'a str,
) -> &'a str {
    overrides
        .into_iter()
        .flatten()
        .find_map(field)
        .map(String::as_str)
        .unwrap_or(default)
}
