//! Configuration types for paper analysis.
//!
//! All analysis behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. One struct holds every threshold and every
//! injected collaborator, so a config can be shared across a whole batch and
//! logged to explain why two runs differ.

use crate::catalog::WarningCatalog;
use crate::error::PaperCheckError;
use crate::model::Template;
use crate::pipeline::bibliography::{HeuristicReferenceParser, ReferenceParser};
use crate::pipeline::compile::{BuiltinCompiler, DocumentCompiler};
use crate::progress::ProgressCallback;
use crate::templates::TemplateTable;
use std::fmt;
use std::sync::Arc;

/// Configuration for analysing one or more papers.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use papercheck::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .caption_window(1)
///     .concurrency(8)
///     .build()
///     .unwrap();
/// assert_eq!(config.caption_window, 1);
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Non-blank blocks tolerated between an object and its caption. Default: 0.
    pub caption_window: usize,

    /// Alt text longer than this many characters is reported. Default: 2000.
    pub alt_text_max_chars: usize,

    /// Headings longer than this many characters are reported. Default: 200.
    pub heading_max_chars: usize,

    /// Wall-clock ceiling for one document, in seconds. Default: 300.
    ///
    /// Covers every stage from reading the input to the merged warning list.
    /// `0` disables the ceiling.
    pub timeout_secs: u64,

    /// Documents analysed at once by the batch entry points. Default: 4.
    pub concurrency: usize,

    /// Maximum `\input`/`\include` nesting in LaTeX sources. Default: 25.
    pub max_input_depth: usize,

    /// Skip fingerprinting and use this template.
    pub template_override: Option<Template>,

    /// Custom warning catalog. If None, uses the embedded catalog.
    pub catalog: Option<Arc<WarningCatalog>>,

    /// Custom style-to-role table. If None, uses the embedded table.
    pub templates: Option<Arc<TemplateTable>>,

    /// Source compiler. If None, uses the built-in DOCX/LaTeX compiler.
    pub compiler: Option<Arc<dyn DocumentCompiler>>,

    /// Reference entry parser. If None, uses [`HeuristicReferenceParser`].
    pub reference_parser: Option<Arc<dyn ReferenceParser>>,

    /// Optional per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            caption_window: 0,
            alt_text_max_chars: 2000,
            heading_max_chars: 200,
            timeout_secs: 300,
            concurrency: 4,
            max_input_depth: 25,
            template_override: None,
            catalog: None,
            templates: None,
            compiler: None,
            reference_parser: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("caption_window", &self.caption_window)
            .field("alt_text_max_chars", &self.alt_text_max_chars)
            .field("heading_max_chars", &self.heading_max_chars)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("max_input_depth", &self.max_input_depth)
            .field("template_override", &self.template_override)
            .field("catalog", &self.catalog.as_ref().map(|_| "<custom>"))
            .field("templates", &self.templates.as_ref().map(|_| "<custom>"))
            .field("compiler", &self.compiler.as_ref().map(|_| "<dyn DocumentCompiler>"))
            .field(
                "reference_parser",
                &self.reference_parser.as_ref().map(|_| "<dyn ReferenceParser>"),
            )
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    /// The catalog in effect.
    pub fn catalog(&self) -> &WarningCatalog {
        self.catalog
            .as_deref()
            .unwrap_or_else(|| WarningCatalog::builtin())
    }

    /// The template table in effect.
    pub fn templates(&self) -> &TemplateTable {
        self.templates
            .as_deref()
            .unwrap_or_else(|| TemplateTable::builtin())
    }

    pub(crate) fn shared_templates(&self) -> Arc<TemplateTable> {
        match &self.templates {
            Some(t) => Arc::clone(t),
            None => TemplateTable::builtin_shared(),
        }
    }

    pub(crate) fn compiler(&self) -> Arc<dyn DocumentCompiler> {
        match &self.compiler {
            Some(c) => Arc::clone(c),
            None => Arc::new(BuiltinCompiler::new(self.max_input_depth)),
        }
    }

    pub(crate) fn reference_parser(&self) -> Arc<dyn ReferenceParser> {
        match &self.reference_parser {
            Some(p) => Arc::clone(p),
            None => Arc::new(HeuristicReferenceParser),
        }
    }
}

/// Builder for [`AnalysisConfig`].
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl fmt::Debug for AnalysisConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl AnalysisConfigBuilder {
    pub fn caption_window(mut self, blocks: usize) -> Self {
        self.config.caption_window = blocks;
        self
    }

    pub fn alt_text_max_chars(mut self, n: usize) -> Self {
        self.config.alt_text_max_chars = n.max(1);
        self
    }

    pub fn heading_max_chars(mut self, n: usize) -> Self {
        self.config.heading_max_chars = n.max(1);
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_input_depth(mut self, depth: usize) -> Self {
        self.config.max_input_depth = depth;
        self
    }

    pub fn template_override(mut self, template: Template) -> Self {
        self.config.template_override = Some(template);
        self
    }

    pub fn catalog(mut self, catalog: Arc<WarningCatalog>) -> Self {
        self.config.catalog = Some(catalog);
        self
    }

    pub fn templates(mut self, table: Arc<TemplateTable>) -> Self {
        self.config.templates = Some(table);
        self
    }

    pub fn compiler(mut self, compiler: Arc<dyn DocumentCompiler>) -> Self {
        self.config.compiler = Some(compiler);
        self
    }

    pub fn reference_parser(mut self, parser: Arc<dyn ReferenceParser>) -> Self {
        self.config.reference_parser = Some(parser);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.config.progress_callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, PaperCheckError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(PaperCheckError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.alt_text_max_chars == 0 || c.heading_max_chars == 0 {
            return Err(PaperCheckError::InvalidConfig(
                "Length thresholds must be ≥ 1".into(),
            ));
        }
        if c.template_override == Some(Template::Unknown) {
            return Err(PaperCheckError::InvalidConfig(
                "Template override must be EDM or JEDM".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_thresholds() {
        let c = AnalysisConfig::default();
        assert_eq!(c.caption_window, 0);
        assert_eq!(c.alt_text_max_chars, 2000);
        assert_eq!(c.heading_max_chars, 200);
        assert_eq!(c.timeout_secs, 300);
        assert!(c.template_override.is_none());
    }

    #[test]
    fn test_builder_clamps() {
        let c = AnalysisConfig::builder()
            .concurrency(0)
            .alt_text_max_chars(0)
            .heading_max_chars(0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.alt_text_max_chars, 1);
        assert_eq!(c.heading_max_chars, 1);
    }

    #[test]
    fn test_unknown_override_rejected() {
        let err = AnalysisConfig::builder()
            .template_override(Template::Unknown)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("EDM or JEDM"));
    }

    #[test]
    fn test_debug_hides_collaborators() {
        let c = AnalysisConfig::builder()
            .catalog(Arc::new(WarningCatalog::builtin().clone()))
            .build()
            .unwrap();
        let s = format!("{:?}", c);
        assert!(s.contains("<custom>"));
        assert!(s.contains("caption_window"));
    }

    #[test]
    fn test_falls_back_to_builtin_tables() {
        let c = AnalysisConfig::default();
        assert!(c.templates().rules(Template::Edm).is_some());
        assert!(c.catalog().entry(crate::catalog::WarningCode::Timeout).is_some());
    }
}
