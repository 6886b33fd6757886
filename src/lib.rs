//! # papercheck
//!
//! Structural extraction and validation of EDM / JEDM paper sources.
//!
//! ## Why this crate?
//!
//! A proceedings can only be published as accessible HTML if every paper
//! follows its template: styled title and authors, an abstract, captioned
//! figures with alt text, tables with header rows, citations that match the
//! reference list. Authors rarely get all of that right, and a converter
//! that silently guesses produces broken pages. This crate recovers a
//! semantic model of a paper from either a Word package or a LaTeX project,
//! checks it against the template, and tells the author exactly what to fix.
//!
//! ## Pipeline Overview
//!
//! ```text
//! DOCX / LaTeX
//!  │
//!  ├─ 1. Input      read the file, sniff DOCX vs LaTeX
//!  ├─ 2. Compile    source → block tree (CPU-bound, spawn_blocking)
//!  ├─ 3. Normalize  text cleanup, stable block indices
//!  ├─ 4. Classify   EDM / JEDM / UNKNOWN fingerprint
//!  ├─ 5. Roles      style names → semantic roles, caption linking
//!  ├─ 6. Checks     validator, captions, references, cross-refs (parallel)
//!  └─ 7. Report     dedupe, order, resolve against the warning catalog
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use papercheck::{analyze, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AnalysisConfig::default();
//!     let report = analyze("paper.docx", &config).await;
//!     for warning in &report.warnings {
//!         println!("[{}] {}: {}", warning.severity, warning.code, warning.message);
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `papercheck` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! papercheck = { version = "0.1", default-features = false }
//! ```
//!
//! ## Customising
//!
//! | Surface | How |
//! |---------|-----|
//! | Warning text and severity | [`WarningCatalog::from_file`] + [`AnalysisConfigBuilder::catalog`] |
//! | Style names per template  | [`TemplateTable::from_file`] + [`AnalysisConfigBuilder::templates`] |
//! | Source compilation        | implement [`DocumentCompiler`] |
//! | Reference entry parsing   | implement [`ReferenceParser`] |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;
pub mod templates;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_all, analyze_bytes, analyze_sync, analyze_to_file, analyze_tree, run_checks,
    try_analyze,
};
pub use catalog::{Finding, Severity, Warning, WarningCatalog, WarningCode};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::{CompileError, EntryError, PaperCheckError, Stage};
pub use model::{
    BlockTree, Document, ImageFormat, Inline, ObjectKind, RawBlock, SemanticRole, SourceBlock,
    SourceKind, TableCell, Template, TemplateMarkers, VisualObject,
};
pub use output::{AnalysisReport, AnalysisStats, ReportFormat};
pub use pipeline::bibliography::{HeuristicReferenceParser, ReferenceFields, ReferenceParser};
pub use pipeline::compile::{BuiltinCompiler, DocumentCompiler};
pub use pipeline::input::SourceInput;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{analyze_stream, ReportStream};
pub use templates::TemplateTable;
