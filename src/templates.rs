//! Template fingerprints and the style-to-role table.
//!
//! The table is immutable configuration, loaded once. Template-specific
//! entries take precedence over shared entries, and within one entry set a
//! rule constrained by container context or text prefix wins over a bare
//! style rule. Styles with no entry resolve to [`SemanticRole::Unknown`].
//!
//! The built-in table is `assets/templates.json`, embedded at compile time.

use crate::error::PaperCheckError;
use crate::model::{SemanticRole, Template};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

static BUILTIN_JSON: &str = include_str!("../assets/templates.json");

static BUILTIN: Lazy<Arc<TemplateTable>> = Lazy::new(|| {
    Arc::new(TemplateTable::from_json(BUILTIN_JSON).expect("embedded templates.json is valid"))
});

/// Container a rule is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleContext {
    /// Only paragraphs inside a table cell.
    TableCell,
    /// Only paragraphs outside tables.
    Body,
}

/// One `(style, context?, prefix?) → role` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRule {
    /// Style name, compared case-insensitively (Word stores built-in
    /// names such as `heading 1` in lower case).
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RuleContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_prefix: Option<String>,
    pub role: SemanticRole,
}

impl StyleRule {
    fn is_specific(&self) -> bool {
        self.context.is_some() || self.text_prefix.is_some()
    }

    fn matches(&self, style: &str, in_table: bool, text: &str) -> bool {
        if !self.style.eq_ignore_ascii_case(style) {
            return false;
        }
        let context_ok = match self.context {
            None => true,
            Some(RuleContext::TableCell) => in_table,
            Some(RuleContext::Body) => !in_table,
        };
        let prefix_ok = self
            .text_prefix
            .as_deref()
            .is_none_or(|p| text.trim_start().starts_with(p));
        context_ok && prefix_ok
    }
}

/// Markers identifying a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Paragraph styles only this template defines.
    #[serde(default)]
    pub styles: Vec<String>,
    /// `\documentclass` arguments.
    #[serde(default)]
    pub document_classes: Vec<String>,
    /// Class files bundled with a LaTeX project.
    #[serde(default)]
    pub class_files: Vec<String>,
}

/// A role the template treats as present whenever `when` is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpliedRole {
    pub role: SemanticRole,
    pub when: SemanticRole,
}

/// Rules for one known template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRules {
    pub fingerprint: Fingerprint,
    /// Characters accepted directly after a caption number.
    pub caption_punctuation: String,
    #[serde(default)]
    pub styles: Vec<StyleRule>,
    #[serde(default)]
    pub implied: Vec<ImpliedRole>,
}

/// The complete style-to-role configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTable {
    /// Fonts whose runs mark an otherwise unstyled paragraph as code.
    #[serde(default)]
    pub monospace_fonts: Vec<String>,
    /// Entries every template (including `Unknown`) uses.
    #[serde(default)]
    pub shared: Vec<StyleRule>,
    pub templates: BTreeMap<Template, TemplateRules>,
}

impl TemplateTable {
    /// The embedded table, parsed once per process.
    pub fn builtin() -> &'static TemplateTable {
        &BUILTIN
    }

    /// The embedded table as a shareable handle.
    pub(crate) fn builtin_shared() -> Arc<TemplateTable> {
        Arc::clone(&BUILTIN)
    }

    pub fn from_json(json: &str) -> Result<Self, PaperCheckError> {
        let table: TemplateTable = serde_json::from_str(json)
            .map_err(|e| PaperCheckError::InvalidTemplateTable(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PaperCheckError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PaperCheckError::InvalidTemplateTable(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), PaperCheckError> {
        if self.templates.contains_key(&Template::Unknown) {
            return Err(PaperCheckError::InvalidTemplateTable(
                "UNKNOWN cannot carry its own rules; use the shared set".into(),
            ));
        }
        for (template, rules) in &self.templates {
            if rules.caption_punctuation.is_empty() {
                return Err(PaperCheckError::InvalidTemplateTable(format!(
                    "{template}: caption_punctuation is empty"
                )));
            }
        }
        let all_rules = self
            .shared
            .iter()
            .chain(self.templates.values().flat_map(|t| t.styles.iter()));
        for rule in all_rules {
            if let SemanticRole::Heading(level) = rule.role {
                if !(1..=6).contains(&level) {
                    return Err(PaperCheckError::InvalidTemplateTable(format!(
                        "style '{}': heading level {level} out of range 1-6",
                        rule.style
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn rules(&self, template: Template) -> Option<&TemplateRules> {
        self.templates.get(&template)
    }

    /// Known templates and their fingerprints, in a stable order.
    pub fn fingerprints(&self) -> impl Iterator<Item = (Template, &Fingerprint)> {
        self.templates.iter().map(|(t, r)| (*t, &r.fingerprint))
    }

    /// Resolve the role of one block.
    pub fn lookup(&self, template: Template, style: &str, in_table: bool, text: &str) -> SemanticRole {
        let template_rules = self.rules(template).map(|r| r.styles.as_slice()).unwrap_or(&[]);
        for set in [template_rules, self.shared.as_slice()] {
            for specific in [true, false] {
                if let Some(rule) = set
                    .iter()
                    .filter(|r| r.is_specific() == specific)
                    .find(|r| r.matches(style, in_table, text))
                {
                    return rule.role;
                }
            }
        }
        SemanticRole::Unknown
    }

    /// Roles implied by the ones already present.
    pub fn implied_roles(
        &self,
        template: Template,
        present: &BTreeSet<SemanticRole>,
    ) -> BTreeSet<SemanticRole> {
        self.rules(template)
            .map(|r| {
                r.implied
                    .iter()
                    .filter(|i| present.contains(&i.when))
                    .map(|i| i.role)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Punctuation accepted after a caption number. `Unknown` accepts the
    /// punctuation of every known template.
    pub fn caption_punctuation(&self, template: Template) -> String {
        match self.rules(template) {
            Some(r) => r.caption_punctuation.clone(),
            None => {
                let chars: BTreeSet<char> = self
                    .templates
                    .values()
                    .flat_map(|r| r.caption_punctuation.chars())
                    .collect();
                chars.into_iter().collect()
            }
        }
    }

    pub fn is_monospace(&self, font: &str) -> bool {
        self.monospace_fonts
            .iter()
            .any(|f| f.eq_ignore_ascii_case(font.trim()))
    }
}
