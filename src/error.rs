//! Error types for the papercheck library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PaperCheckError`]: **Fatal** for one document: the pipeline cannot
//!   meaningfully continue (unsupported input, nothing extracted, compiler
//!   failure, timeout). The `analyze*` entry points fold these into a report
//!   with a single high-severity warning; [`crate::analyze::try_analyze`]
//!   returns them raw.
//!
//! * [`EntryError`]: **Non-fatal**: one reference entry could not be parsed.
//!   It is reported as its own warning and the remaining entries are still
//!   checked.

use crate::catalog::WarningCode;
use crate::model::SourceKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage a fatal error stopped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Compile,
    Normalize,
    Classify,
    RoleMapping,
    Checks,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "input",
            Stage::Compile => "compile",
            Stage::Normalize => "normalize",
            Stage::Classify => "classify",
            Stage::RoleMapping => "role mapping",
            Stage::Checks => "checks",
            Stage::Report => "report",
        };
        f.write_str(name)
    }
}

/// Failure reported by a [`crate::pipeline::compile::DocumentCompiler`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind} compilation failed: {detail}")]
pub struct CompileError {
    pub kind: SourceKind,
    /// Warning code the failure is surfaced as.
    pub code: WarningCode,
    pub detail: String,
}

impl CompileError {
    pub fn new(kind: SourceKind, detail: impl Into<String>) -> Self {
        let code = match kind {
            SourceKind::Latex => WarningCode::Make4htFailed,
            SourceKind::Docx => WarningCode::Unexpected,
        };
        Self {
            kind,
            code,
            detail: detail.into(),
        }
    }

    pub fn with_code(mut self, code: WarningCode) -> Self {
        self.code = code;
        self
    }
}

/// All fatal errors returned by the papercheck library.
///
/// Entry-level failures use [`EntryError`] and never abort a document.
#[derive(Debug, Error)]
pub enum PaperCheckError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Source file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input is neither a DOCX package nor a LaTeX source.
    #[error("Unsupported source format for '{name}': {detail}")]
    UnsupportedFormat { name: String, detail: String },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// The compiler produced no blocks.
    #[error("No content could be extracted from '{name}'")]
    EmptyDocument { name: String },

    /// The upstream compiler failed.
    #[error(transparent)]
    Compilation(#[from] CompileError),

    /// The per-document wall-clock ceiling was exceeded.
    #[error("Processing exceeded the {secs}s time limit")]
    Timeout { secs: u64 },

    // ── Configuration errors ──────────────────────────────────────────────
    /// A warning catalog could not be loaded.
    #[error("Invalid warning catalog: {0}")]
    InvalidCatalog(String),

    /// A template table could not be loaded.
    #[error("Invalid template table: {0}")]
    InvalidTemplateTable(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write a report file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaperCheckError {
    /// The warning code this error is reported as.
    pub fn warning_code(&self) -> WarningCode {
        match self {
            PaperCheckError::FileNotFound { .. }
            | PaperCheckError::PermissionDenied { .. }
            | PaperCheckError::UnsupportedFormat { .. } => WarningCode::UnsupportedFormat,
            PaperCheckError::EmptyDocument { .. } => WarningCode::EmptyDocument,
            PaperCheckError::Compilation(e) => e.code,
            PaperCheckError::Timeout { .. } => WarningCode::Timeout,
            _ => WarningCode::Unexpected,
        }
    }

    /// The stage that reports this error.
    pub fn stage(&self) -> Stage {
        match self {
            PaperCheckError::FileNotFound { .. }
            | PaperCheckError::PermissionDenied { .. }
            | PaperCheckError::UnsupportedFormat { .. } => Stage::Input,
            PaperCheckError::Compilation(_) => Stage::Compile,
            PaperCheckError::EmptyDocument { .. } => Stage::Normalize,
            PaperCheckError::OutputWriteFailed { .. } => Stage::Report,
            _ => Stage::Checks,
        }
    }
}

/// A non-fatal failure for a single reference entry.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EntryError {
    /// The entry has no text after its number.
    #[error("entry is empty")]
    Empty,

    /// Nothing resembling a title, author list or year could be found.
    #[error("no recognisable fields in \"{text}\"")]
    Unrecognised { text: String },
}
