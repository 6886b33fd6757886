//! Eager (whole-document) analysis entry points.
//!
//! ## Why reports instead of errors?
//!
//! A hard failure (unsupported input, empty document, compiler failure,
//! timeout) is still something the author must fix, so [`analyze`] and its
//! siblings fold it into an [`AnalysisReport`] carrying one high-severity
//! warning and the stage that failed. Use [`try_analyze`] when the raw
//! [`PaperCheckError`] is wanted instead.
//!
//! Use [`crate::stream::analyze_stream`] to receive batch reports as they
//! complete rather than all at once.

use crate::catalog::Finding;
use crate::config::AnalysisConfig;
use crate::error::PaperCheckError;
use crate::model::{BlockTree, Document, SourceKind};
use crate::output::{AnalysisReport, AnalysisStats, ReportFormat};
use crate::pipeline::references::ReferenceReport;
use crate::pipeline::{aggregate, classify, input, normalize, roles, CheckSettings, Checker};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// A hard failure, with the source kind when it was already known.
type Failure = (Option<SourceKind>, PaperCheckError);

/// Analyse a DOCX or LaTeX file.
///
/// This is the primary entry point for the library. It never fails: hard
/// failures come back as an aborted report.
pub async fn analyze(path: impl AsRef<Path>, config: &AnalysisConfig) -> AnalysisReport {
    let path = path.as_ref();
    match analyze_path(path, config).await {
        Ok(report) => report,
        Err((kind, e)) => abort(input::display_name(path), kind, &e, config),
    }
}

/// Like [`analyze`], but returns hard failures as errors.
pub async fn try_analyze(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, PaperCheckError> {
    analyze_path(path.as_ref(), config)
        .await
        .map_err(|(_, e)| e)
}

/// Analyse a source already in memory.
///
/// `name` is only used for kind detection (`.tex`) and in the report.
pub async fn analyze_bytes(
    name: impl Into<String>,
    bytes: Vec<u8>,
    config: &AnalysisConfig,
) -> AnalysisReport {
    let name = name.into();
    let outcome = with_timeout(config, async {
        let source = input::SourceInput::from_bytes(name.clone(), bytes).map_err(|e| (None, e))?;
        let kind = source.kind;
        run_source(source, config).await.map_err(|e| (Some(kind), e))
    })
    .await;
    match outcome {
        Ok(report) => report,
        Err((kind, e)) => abort(name, kind, &e, config),
    }
}

/// Analyse a block tree produced by an external compiler, skipping input
/// resolution and compilation.
pub async fn analyze_tree(
    name: impl Into<String>,
    tree: BlockTree,
    config: &AnalysisConfig,
) -> AnalysisReport {
    let name = name.into();
    let kind = tree.kind;
    let outcome = with_timeout(config, async {
        run_tree(name.clone(), tree, config, AnalysisStats::default(), Instant::now())
            .await
            .map_err(|e| (Some(kind), e))
    })
    .await;
    match outcome {
        Ok(report) => report,
        Err((kind, e)) => abort(name, kind, &e, config),
    }
}

/// Synchronous wrapper around [`analyze`].
///
/// Creates a temporary tokio runtime internally.
pub fn analyze_sync(
    path: impl AsRef<Path>,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, PaperCheckError> {
    Ok(tokio::runtime::Runtime::new()
        .map_err(|e| PaperCheckError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(analyze(path, config)))
}

/// Analyse a paper and write the rendered report to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn analyze_to_file(
    path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    format: ReportFormat,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, PaperCheckError> {
    let report = analyze(path, config).await;
    let rendered = report.render(format)?;
    write_atomic(output_path.as_ref(), &rendered).await?;
    Ok(report)
}

/// Analyse many papers, up to `config.concurrency` at a time.
///
/// Reports come back in input order.
pub async fn analyze_all<P: AsRef<Path>>(
    paths: &[P],
    config: &AnalysisConfig,
) -> Vec<AnalysisReport> {
    let total = paths.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut reports: Vec<(usize, AnalysisReport)> =
        stream::iter(paths.iter().enumerate().map(|(index, path)| async move {
            let report = analyze_reporting(path.as_ref(), index, total, config).await;
            (index, report)
        }))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    reports.sort_by_key(|(index, _)| *index);

    let completed = reports.iter().filter(|(_, r)| !r.is_aborted()).count();
    info!("Batch complete: {}/{} papers analysed", completed, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, completed);
    }
    reports.into_iter().map(|(_, r)| r).collect()
}

/// [`analyze`] with per-document progress events.
pub(crate) async fn analyze_reporting(
    path: &Path,
    index: usize,
    total: usize,
    config: &AnalysisConfig,
) -> AnalysisReport {
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_start(index, total, &input::display_name(path));
    }
    let report = analyze(path, config).await;
    if let Some(ref cb) = config.progress_callback {
        match report.aborted_at {
            None => cb.on_document_complete(index, total, report.warnings.len()),
            Some(_) => {
                let error = report
                    .warnings
                    .first()
                    .and_then(|w| w.context.clone())
                    .unwrap_or_default();
                cb.on_document_error(index, total, &error);
            }
        }
    }
    report
}

/// Run the four checkers over a role-bound document, in parallel.
///
/// Each checker gets its own blocking task over the shared document; their
/// findings are merged once all four have finished.
pub async fn run_checks(
    doc: Arc<Document>,
    config: &AnalysisConfig,
) -> Result<ReferenceReport, PaperCheckError> {
    let settings = Arc::new(CheckSettings::new(
        config,
        config.templates(),
        doc.template,
    ));
    let parser = config.reference_parser();

    let tasks = Checker::ALL.map(|checker| {
        let doc = Arc::clone(&doc);
        let settings = Arc::clone(&settings);
        let parser = Arc::clone(&parser);
        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let report = checker.run(&doc, &settings, parser.as_ref());
            debug!(
                "Checker {} produced {} findings in {}ms",
                checker.name(),
                report.findings.len(),
                start.elapsed().as_millis()
            );
            report
        })
    });

    let mut merged = ReferenceReport::default();
    for result in join_all(tasks).await {
        let report = result.map_err(join_error)?;
        merged.findings.extend(report.findings);
        merged.entries += report.entries;
        merged.citations += report.citations;
    }
    Ok(merged)
}

// ── Internal helpers ─────────────────────────────────────────────────────

async fn analyze_path(path: &Path, config: &AnalysisConfig) -> Result<AnalysisReport, Failure> {
    with_timeout(config, async {
        let source = input::read_input(path).await.map_err(|e| (None, e))?;
        let kind = source.kind;
        run_source(source, config).await.map_err(|e| (Some(kind), e))
    })
    .await
}

async fn with_timeout<T>(
    config: &AnalysisConfig,
    work: impl Future<Output = Result<T, Failure>>,
) -> Result<T, Failure> {
    if config.timeout_secs == 0 {
        return work.await;
    }
    let secs = config.timeout_secs;
    match tokio::time::timeout(Duration::from_secs(secs), work).await {
        Ok(outcome) => outcome,
        Err(_) => Err((None, PaperCheckError::Timeout { secs })),
    }
}

async fn run_source(
    source: input::SourceInput,
    config: &AnalysisConfig,
) -> Result<AnalysisReport, PaperCheckError> {
    let started = Instant::now();
    let name = source.name.clone();
    info!("Analysing {} ({})", name, source.kind);

    let compiler = config.compiler();
    let tree = tokio::task::spawn_blocking(move || compiler.compile(&source))
        .await
        .map_err(join_error)??;
    let stats = AnalysisStats {
        compile_ms: started.elapsed().as_millis() as u64,
        ..AnalysisStats::default()
    };
    debug!("Compiled {} blocks in {}ms", tree.blocks.len(), stats.compile_ms);

    run_tree(name, tree, config, stats, started).await
}

async fn run_tree(
    name: String,
    tree: BlockTree,
    config: &AnalysisConfig,
    mut stats: AnalysisStats,
    started: Instant,
) -> Result<AnalysisReport, PaperCheckError> {
    let kind = tree.kind;

    // ── Structure: normalize → classify → roles ──────────────────────────
    let structure_start = Instant::now();
    let templates = config.shared_templates();
    let override_with = config.template_override;
    let window = config.caption_window;
    let doc_name = name.clone();
    let (doc, mut findings) = tokio::task::spawn_blocking(
        move || -> Result<(Document, Vec<Finding>), PaperCheckError> {
            let mut doc = normalize::normalize(tree, &doc_name)?;
            let (template, mut findings) = classify::classify(&doc, &templates, override_with);
            roles::assign_roles(&mut doc, &templates, template, window);
            findings.append(&mut doc.notes);
            Ok((doc, findings))
        },
    )
    .await
    .map_err(join_error)??;
    stats.structure_ms = structure_start.elapsed().as_millis() as u64;
    stats.blocks = doc.blocks.len();
    stats.objects = doc.objects.len();
    debug!(
        "Structure bound for {} ({} template) in {}ms",
        name, doc.template, stats.structure_ms
    );

    // ── Checks ───────────────────────────────────────────────────────────
    let checks_start = Instant::now();
    let doc = Arc::new(doc);
    let checked = run_checks(Arc::clone(&doc), config).await?;
    stats.checks_ms = checks_start.elapsed().as_millis() as u64;
    stats.references = checked.entries;
    stats.citations = checked.citations;
    findings.extend(checked.findings);

    // ── Aggregate ────────────────────────────────────────────────────────
    let warnings = aggregate::aggregate(findings, config.catalog(), doc.template, Some(kind));
    stats.count_severities(&warnings);
    stats.total_ms = started.elapsed().as_millis() as u64;

    info!(
        "Analysis complete: {} ({} warnings, {}ms)",
        name,
        warnings.len(),
        stats.total_ms
    );

    Ok(AnalysisReport {
        source: name,
        kind: Some(kind),
        template: doc.template,
        warnings,
        aborted_at: None,
        stats,
        document: Some(doc),
    })
}

fn abort(
    name: String,
    kind: Option<SourceKind>,
    error: &PaperCheckError,
    config: &AnalysisConfig,
) -> AnalysisReport {
    warn!("Analysis of {} aborted during {}: {}", name, error.stage(), error);
    AnalysisReport::aborted(name, kind, error, config.catalog())
}

fn join_error(e: JoinError) -> PaperCheckError {
    if e.is_panic() {
        PaperCheckError::Internal(format!("analysis task panicked: {e}"))
    } else {
        PaperCheckError::Internal(format!("analysis task failed: {e}"))
    }
}

pub(crate) async fn write_atomic(path: &Path, contents: &str) -> Result<(), PaperCheckError> {
    let write_err = |source| PaperCheckError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path: PathBuf = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".tmp");
        name.into()
    };
    tokio::fs::write(&tmp_path, contents).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WarningCode;
    use crate::error::{CompileError, Stage};
    use crate::model::{Inline, RawBlock};
    use crate::pipeline::compile::DocumentCompiler;

    fn tree() -> BlockTree {
        let mut tree = BlockTree::new(SourceKind::Docx);
        for (style, text) in [
            ("Title", "A Study"),
            ("Author", "Ada Lovelace"),
            ("Body Text", "Plain text."),
        ] {
            tree.blocks.push(RawBlock::styled(style, vec![Inline::text(text)]));
        }
        tree
    }

    #[tokio::test]
    async fn test_analyze_tree_produces_report() {
        let report = analyze_tree("paper.docx", tree(), &AnalysisConfig::default()).await;
        assert!(!report.is_aborted());
        assert_eq!(report.kind, Some(SourceKind::Docx));
        assert_eq!(report.stats.blocks, 3);
        assert!(report.document.is_some());
        let codes: Vec<WarningCode> = report.warnings.iter().map(|w| w.code).collect();
        assert!(codes.contains(&WarningCode::StyleNoRefs));
        // Severity never increases down the list.
        assert!(report
            .warnings
            .windows(2)
            .all(|w| w[0].severity >= w[1].severity));
    }

    #[tokio::test]
    async fn test_empty_tree_aborts_in_normalize() {
        let report = analyze_tree(
            "empty.docx",
            BlockTree::new(SourceKind::Docx),
            &AnalysisConfig::default(),
        )
        .await;
        assert_eq!(report.aborted_at, Some(Stage::Normalize));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].code, WarningCode::EmptyDocument);
    }

    #[tokio::test]
    async fn test_unsupported_bytes_abort_in_input() {
        let report =
            analyze_bytes("notes.bin", vec![0, 159, 146, 150], &AnalysisConfig::default()).await;
        assert_eq!(report.aborted_at, Some(Stage::Input));
        assert_eq!(report.kind, None);
        assert_eq!(report.warnings[0].code, WarningCode::UnsupportedFormat);
    }

    struct FailingCompiler;

    impl DocumentCompiler for FailingCompiler {
        fn compile(&self, source: &input::SourceInput) -> Result<BlockTree, CompileError> {
            Err(CompileError::new(source.kind, "boom"))
        }
    }

    #[tokio::test]
    async fn test_compiler_failure_is_reported() {
        let config = AnalysisConfig::builder()
            .compiler(Arc::new(FailingCompiler))
            .build()
            .unwrap();
        let src = b"\\documentclass{article}\n\\begin{document}x\\end{document}".to_vec();
        let report = analyze_bytes("paper.tex", src, &config).await;
        assert_eq!(report.aborted_at, Some(Stage::Compile));
        assert_eq!(report.kind, Some(SourceKind::Latex));
        assert_eq!(report.warnings[0].code, WarningCode::Make4htFailed);
    }

    struct SlowCompiler;

    impl DocumentCompiler for SlowCompiler {
        fn compile(&self, _: &input::SourceInput) -> Result<BlockTree, CompileError> {
            std::thread::sleep(Duration::from_millis(2500));
            Ok(tree())
        }
    }

    #[tokio::test]
    async fn test_timeout_aborts() {
        let config = AnalysisConfig::builder()
            .compiler(Arc::new(SlowCompiler))
            .timeout_secs(1)
            .build()
            .unwrap();
        let src = b"\\documentclass{article}".to_vec();
        let report = analyze_bytes("slow.tex", src, &config).await;
        assert_eq!(report.warnings[0].code, WarningCode::Timeout);
        assert!(report.is_aborted());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = try_analyze("/definitely/not/here.docx", &AnalysisConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PaperCheckError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_analyze_all_keeps_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let tex = dir.path().join("a.tex");
        std::fs::write(&tex, "\\documentclass{article}\n\\begin{document}\nHello.\n\\end{document}\n")
            .unwrap();
        let missing = dir.path().join("missing.docx");
        let config = AnalysisConfig::builder().concurrency(2).build().unwrap();
        let reports = analyze_all(&[&missing, &tex], &config).await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].source, "missing.docx");
        assert!(reports[0].is_aborted());
        assert_eq!(reports[1].source, "a.tex");
        assert!(!reports[1].is_aborted());
    }

    #[tokio::test]
    async fn test_analyze_to_file_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let tex = dir.path().join("p.tex");
        std::fs::write(&tex, "\\documentclass{article}\n\\begin{document}\nHi.\n\\end{document}\n")
            .unwrap();
        let out = dir.path().join("reports").join("p.json");
        analyze_to_file(&tex, &out, ReportFormat::Json, &AnalysisConfig::default())
            .await
            .unwrap();
        let json = std::fs::read_to_string(&out).unwrap();
        let parsed: AnalysisReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.source, "p.tex");
    }
}
