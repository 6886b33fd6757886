//! Streaming batch API: emit reports as papers finish.
//!
//! ## Why stream?
//!
//! A proceedings batch holds dozens of papers and LaTeX projects can take a
//! while each. A stream lets callers print or persist each report as soon as
//! it is ready instead of waiting for the slowest paper.
//!
//! Unlike [`crate::analyze::analyze_all`], which returns reports in input
//! order after every paper is done, [`analyze_stream`] yields them in
//! completion order. Match them back up by [`AnalysisReport::source`] if
//! order matters.

use crate::analyze::analyze_reporting;
use crate::config::AnalysisConfig;
use crate::output::AnalysisReport;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of per-paper reports.
pub type ReportStream = Pin<Box<dyn Stream<Item = AnalysisReport> + Send>>;

/// Analyse many papers, streaming each report as it completes.
///
/// Up to `config.concurrency` papers are analysed at once. Hard failures
/// arrive as aborted reports, like [`crate::analyze::analyze`]. The batch
/// start event fires immediately; per-document progress events fire as
/// papers start and finish.
///
/// # Example
/// ```rust,no_run
/// use papercheck::{analyze_stream, AnalysisConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let papers = vec!["a.docx".into(), "b.tex".into()];
/// let mut reports = analyze_stream(papers, AnalysisConfig::default());
/// while let Some(report) = reports.next().await {
///     println!("{}: {} warnings", report.source, report.warnings.len());
/// }
/// # }
/// ```
pub fn analyze_stream(paths: Vec<PathBuf>, config: AnalysisConfig) -> ReportStream {
    let total = paths.len();
    let concurrency = config.concurrency.max(1);
    info!("Starting streaming analysis of {} papers", total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let s = stream::iter(paths.into_iter().enumerate().map(move |(index, path)| {
        let config = config.clone();
        async move { analyze_reporting(&path, index, total, &config).await }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
