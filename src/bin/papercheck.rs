//! CLI binary for papercheck.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints reports.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use papercheck::{
    analyze_all, AnalysisConfig, AnalysisProgressCallback, AnalysisReport, ProgressCallback,
    ReportFormat, Severity, Template, TemplateTable, WarningCatalog,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per paper.
/// Papers finish out of order when `--concurrency` is above one.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Per-paper start times and names, keyed by input index.
    started: Mutex<HashMap<usize, (Instant, String)>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} papers  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Checking");
    }

    /// Remove the bookkeeping for a finished paper.
    fn finish(&self, index: usize) -> (String, f64) {
        self.started
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|(t, name)| (name, t.elapsed().as_secs_f64()))
            .unwrap_or_default()
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Checking {total} paper{}…",
                if total == 1 { "" } else { "s" }
            ))
        ));
    }

    fn on_document_start(&self, index: usize, _total: usize, source: &str) {
        if let Ok(mut m) = self.started.lock() {
            m.insert(index, (Instant::now(), source.to_string()));
        }
        self.bar.set_message(source.to_string());
    }

    fn on_document_complete(&self, index: usize, _total: usize, warnings: usize) {
        let (name, secs) = self.finish(index);
        let count = format!("{warnings:>3} warning{}", if warnings == 1 { "" } else { "s" });
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            green("✓"),
            name,
            if warnings == 0 { dim(&count) } else { yellow(&count) },
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, _total: usize, error: &str) {
        let (name, secs) = self.finish(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep long compiler logs from wrapping the terminal.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, completed: usize) {
        let failed = total.saturating_sub(completed);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} paper{} checked",
                green("✔"),
                bold(&completed.to_string()),
                if completed == 1 { "" } else { "s" }
            );
        } else {
            eprintln!(
                "{} {}/{} papers checked  ({} aborted)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&completed.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Check one paper, text report on stdout
  papercheck paper.docx

  # LaTeX project as a zip, JSON report to a file
  papercheck --format json project.zip -o report.json

  # A whole batch, one CSV report per paper in reports/
  papercheck --format csv -o reports/ submissions/*.docx submissions/*.zip

  # Force the journal template and fail CI on any high-severity warning
  papercheck --template jedm --fail-on high article.docx

  # Tolerate one paragraph between a figure and its caption
  papercheck --caption-window 1 paper.docx

  # Print the warning catalog
  papercheck --list-codes

EXIT STATUS:
  0  analysis finished and no warning reached --fail-on
  1  the tool itself failed (bad flags, unreadable catalog, write error)
  2  at least one warning reached the --fail-on severity

ENVIRONMENT VARIABLES:
  PAPERCHECK_FORMAT          Report format (text, json, csv)
  PAPERCHECK_TEMPLATE        Template (auto, edm, jedm)
  PAPERCHECK_CATALOG         Path to a custom warning catalog (JSON)
  PAPERCHECK_TEMPLATES       Path to a custom style table (JSON)
  PAPERCHECK_TIMEOUT         Per-paper timeout in seconds (0 disables)
  RUST_LOG                   Override the log filter (e.g. papercheck=debug)
"#;

/// Check EDM / JEDM paper sources against their template.
#[derive(Parser, Debug)]
#[command(
    name = "papercheck",
    version,
    about = "Check EDM / JEDM paper sources (DOCX and LaTeX) against their template",
    long_about = "Extract the structure of EDM / JEDM papers from Word documents or LaTeX \
projects, validate it against the proceedings template and reconcile citations with the \
reference list. Every problem is reported with a stable warning code and a fix suggestion.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// DOCX files, .tex files or zipped LaTeX projects.
    #[arg(required_unless_present = "list_codes")]
    inputs: Vec<PathBuf>,

    /// Write the report to this file (one input) or directory (several).
    #[arg(short, long, env = "PAPERCHECK_OUTPUT")]
    output: Option<PathBuf>,

    /// Report format: text, json or csv.
    #[arg(long, env = "PAPERCHECK_FORMAT", default_value = "text")]
    format: ReportFormat,

    /// Template: auto-detect, or force edm / jedm.
    #[arg(long, env = "PAPERCHECK_TEMPLATE", value_enum, default_value = "auto")]
    template: TemplateArg,

    /// Non-blank blocks tolerated between an object and its caption.
    #[arg(long, env = "PAPERCHECK_CAPTION_WINDOW", default_value_t = 0)]
    caption_window: usize,

    /// Alt text longer than this is reported.
    #[arg(long, env = "PAPERCHECK_ALT_TEXT_MAX", default_value_t = 2000,
          value_parser = clap::value_parser!(u64).range(1..))]
    alt_text_max: u64,

    /// Headings longer than this are reported.
    #[arg(long, env = "PAPERCHECK_HEADING_MAX", default_value_t = 200,
          value_parser = clap::value_parser!(u64).range(1..))]
    heading_max: u64,

    /// Per-paper timeout in seconds (0 disables).
    #[arg(long, env = "PAPERCHECK_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Papers analysed at once.
    #[arg(short, long, env = "PAPERCHECK_CONCURRENCY", default_value_t = 4,
          value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: u64,

    /// Custom warning catalog (JSON).
    #[arg(long, env = "PAPERCHECK_CATALOG")]
    catalog: Option<PathBuf>,

    /// Custom style-to-role table (JSON).
    #[arg(long, env = "PAPERCHECK_TEMPLATES")]
    templates: Option<PathBuf>,

    /// Print every warning code with its severity and message, then exit.
    #[arg(long)]
    list_codes: bool,

    /// Exit with status 2 when a warning of this severity or higher is found.
    #[arg(long, env = "PAPERCHECK_FAIL_ON", value_enum, default_value = "never")]
    fail_on: FailOn,

    /// Disable progress bar.
    #[arg(long, env = "PAPERCHECK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PAPERCHECK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except reports and errors.
    #[arg(short, long, env = "PAPERCHECK_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TemplateArg {
    Auto,
    Edm,
    Jedm,
}

impl TemplateArg {
    fn template(self) -> Option<Template> {
        match self {
            TemplateArg::Auto => None,
            TemplateArg::Edm => Some(Template::Edm),
            TemplateArg::Jedm => Some(Template::Jedm),
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FailOn {
    Never,
    Low,
    Medium,
    High,
}

impl FailOn {
    fn threshold(self) -> Option<Severity> {
        match self {
            FailOn::Never => None,
            FailOn::Low => Some(Severity::Low),
            FailOn::Medium => Some(Severity::Medium),
            FailOn::High => Some(Severity::High),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs would interleave with the progress bar.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.list_codes;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Catalog listing ──────────────────────────────────────────────────
    if cli.list_codes {
        let catalog = load_catalog(cli.catalog.as_deref())?;
        print_codes(&catalog)?;
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let reports = analyze_all(&cli.inputs, &config).await;
    emit_reports(&cli, &reports).await?;

    if !cli.quiet && !show_progress {
        let aborted = reports.iter().filter(|r| r.is_aborted()).count();
        let warnings: usize = reports.iter().map(|r| r.warnings.len()).sum();
        eprintln!(
            "Checked {}/{} papers, {} warnings",
            reports.len() - aborted,
            reports.len(),
            warnings
        );
    }

    if let Some(threshold) = cli.fail_on.threshold() {
        let worst = reports.iter().filter_map(AnalysisReport::max_severity).max();
        if worst.is_some_and(|s| s >= threshold) {
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .caption_window(cli.caption_window)
        .alt_text_max_chars(cli.alt_text_max as usize)
        .heading_max_chars(cli.heading_max as usize)
        .timeout_secs(cli.timeout)
        .concurrency(cli.concurrency as usize);

    if let Some(template) = cli.template.template() {
        builder = builder.template_override(template);
    }
    if let Some(ref path) = cli.catalog {
        builder = builder.catalog(Arc::new(load_catalog(Some(path))?));
    }
    if let Some(ref path) = cli.templates {
        let table = TemplateTable::from_file(path)
            .with_context(|| format!("Failed to load style table from {:?}", path))?;
        builder = builder.templates(Arc::new(table));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn load_catalog(path: Option<&Path>) -> Result<WarningCatalog> {
    match path {
        Some(path) => WarningCatalog::from_file(path)
            .with_context(|| format!("Failed to load warning catalog from {:?}", path)),
        None => Ok(WarningCatalog::builtin().clone()),
    }
}

fn print_codes(catalog: &WarningCatalog) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for (code, entry) in catalog.entries() {
        writeln!(
            handle,
            "{:<48} {:<6} {}",
            code.as_str(),
            entry.severity.as_str(),
            entry.message
        )
        .context("Failed to write to stdout")?;
    }
    Ok(())
}

/// Print reports to stdout or write them under `--output`.
async fn emit_reports(cli: &Cli, reports: &[AnalysisReport]) -> Result<()> {
    match &cli.output {
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            for (i, report) in reports.iter().enumerate() {
                let mut rendered = report
                    .render(cli.format)
                    .with_context(|| format!("Failed to render report for {}", report.source))?;
                // CSV headers repeat per report; keep only the first.
                if cli.format == ReportFormat::Csv && i > 0 {
                    rendered = rendered
                        .split_once('\n')
                        .map(|(_, rows)| rows.to_string())
                        .unwrap_or_default();
                }
                handle
                    .write_all(rendered.as_bytes())
                    .context("Failed to write to stdout")?;
                if !rendered.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
        }
        Some(out) if reports.len() == 1 && !out.is_dir() => {
            write_report(&reports[0], out, cli.format).await?;
            if !cli.quiet {
                eprintln!("{}  {}", green("✔"), bold(&out.display().to_string()));
            }
        }
        Some(dir) => {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create output directory {:?}", dir))?;
            for (report, input) in reports.iter().zip(&cli.inputs) {
                let stem = input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| report.source.clone());
                let path = dir.join(format!("{stem}.{}", cli.format.extension()));
                write_report(report, &path, cli.format).await?;
            }
            if !cli.quiet {
                eprintln!(
                    "{}  {} reports  →  {}",
                    green("✔"),
                    reports.len(),
                    bold(&dir.display().to_string())
                );
            }
        }
    }
    Ok(())
}

async fn write_report(report: &AnalysisReport, path: &Path, format: ReportFormat) -> Result<()> {
    let rendered = report
        .render(format)
        .with_context(|| format!("Failed to render report for {}", report.source))?;
    tokio::fs::write(path, rendered)
        .await
        .with_context(|| format!("Failed to write report to {:?}", path))
}
