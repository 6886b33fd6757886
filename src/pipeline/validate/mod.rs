//! The structural validator battery.
//!
//! Every check is a plain function from the role-bound [`Document`] to its
//! own findings. Checks never see each other's output and run in a fixed
//! order only so that the raw finding list is reproducible; final ordering
//! is the aggregator's job.

pub mod content;
pub mod media;
pub mod required;
pub mod tables;
pub mod typography;

use crate::catalog::Finding;
use crate::model::Document;
use crate::pipeline::CheckSettings;
use tracing::trace;

/// Signature shared by every validator check.
pub type Check = fn(&Document, &CheckSettings) -> Vec<Finding>;

/// The checks in battery order, with the name used in debug logs.
pub const CHECKS: &[(&str, Check)] = &[
    ("required roles", required::check_required_roles),
    ("role content", content::check_role_content),
    ("tables", tables::check_tables),
    ("typography", typography::check_typography),
    ("alt text", media::check_alt_text),
    ("image formats", media::check_image_formats),
];

/// Run the whole battery.
pub fn validate(doc: &Document, settings: &CheckSettings) -> Vec<Finding> {
    CHECKS
        .iter()
        .flat_map(|(name, check)| {
            let found = check(doc, settings);
            trace!("Check '{}' produced {} findings", name, found.len());
            found
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Small document builder shared by the validator tests.

    use crate::model::{
        Document, Inline, ObjectKind, SemanticRole, SourceBlock, SourceKind, TableCell, Template,
        VisualObject,
    };

    pub struct DocBuilder {
        pub doc: Document,
    }

    impl DocBuilder {
        pub fn new(kind: SourceKind) -> Self {
            Self {
                doc: Document {
                    kind,
                    template: Template::Edm,
                    blocks: vec![],
                    objects: vec![],
                    markers: Default::default(),
                    implied_roles: Default::default(),
                    notes: vec![],
                },
            }
        }

        pub fn runs(mut self, role: SemanticRole, runs: Vec<Inline>) -> Self {
            let index = self.doc.blocks.len();
            self.doc.blocks.push(SourceBlock {
                index,
                style: None,
                runs,
                cell: None,
                object: None,
                labels: vec![],
                line: None,
                role,
            });
            self
        }

        pub fn text(self, role: SemanticRole, s: &str) -> Self {
            self.runs(role, vec![Inline::text(s)])
        }

        pub fn template(mut self, template: Template) -> Self {
            self.doc.template = template;
            self
        }

        /// A complete, valid front matter.
        pub fn front_matter(self) -> Self {
            self.text(SemanticRole::Title, "A Study of Things")
                .text(SemanticRole::Author, "Ada Lovelace")
                .text(SemanticRole::Author, "Alan Turing")
                .text(SemanticRole::Affiliation, "Some University")
                .text(SemanticRole::Email, "ada@example.org")
                .text(SemanticRole::AbstractHeading, "ABSTRACT")
                .text(SemanticRole::Abstract, "We study things.")
                .text(SemanticRole::KeywordsHeading, "Keywords")
                .text(SemanticRole::Keywords, "things, study")
                .text(SemanticRole::Heading(1), "1. INTRODUCTION")
        }

        pub fn figure(mut self, alt: Option<&str>) -> Self {
            let id = self.doc.objects.len();
            let index = self.doc.blocks.len();
            let mut obj = VisualObject::new(id, ObjectKind::Figure, index);
            obj.alt_text = alt.map(String::from);
            self.doc.objects.push(obj);
            let mut b = self.runs(SemanticRole::Unknown, vec![Inline::Image { object: id }]);
            b.doc.blocks[index].object = Some(id);
            b
        }

        /// A table whose rows are given as `(role, header flag)` per row.
        pub fn table(mut self, rows: &[(SemanticRole, bool)]) -> Self {
            let id = self.doc.objects.len();
            let first = self.doc.blocks.len();
            for (row, (role, header)) in rows.iter().enumerate() {
                for column in 0..2 {
                    let index = self.doc.blocks.len();
                    self = self.text(*role, &format!("r{row}c{column}"));
                    self.doc.blocks[index].cell = Some(TableCell {
                        table: id,
                        row,
                        column,
                        header: *header,
                    });
                    self.doc.blocks[index].object = Some(id);
                }
            }
            let mut obj = VisualObject::new(id, ObjectKind::Table, first);
            obj.last_block = self.doc.blocks.len().saturating_sub(1).max(first);
            self.doc.objects.push(obj);
            self
        }

        pub fn build(self) -> Document {
            self.doc
        }
    }
}
