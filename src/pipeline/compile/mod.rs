//! Source compilation: raw source bytes to a [`BlockTree`].
//!
//! The rest of the pipeline depends only on the [`DocumentCompiler`]
//! contract, never on how a particular format is read. [`BuiltinCompiler`]
//! dispatches to the in-process DOCX and LaTeX readers; callers can inject
//! their own implementation through
//! [`crate::config::AnalysisConfigBuilder::compiler`].

pub mod docx;
pub mod latex;

use crate::error::CompileError;
use crate::model::{BlockTree, SourceKind};
use crate::pipeline::input::SourceInput;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Turns a classified source into an ordered block tree.
///
/// Implementations run inside `spawn_blocking` and may do CPU-heavy or
/// blocking work.
pub trait DocumentCompiler: Send + Sync {
    fn compile(&self, source: &SourceInput) -> Result<BlockTree, CompileError>;
}

/// The built-in DOCX + LaTeX compiler.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinCompiler {
    max_input_depth: usize,
}

impl BuiltinCompiler {
    pub fn new(max_input_depth: usize) -> Self {
        Self { max_input_depth }
    }
}

impl Default for BuiltinCompiler {
    fn default() -> Self {
        Self::new(25)
    }
}

impl DocumentCompiler for BuiltinCompiler {
    fn compile(&self, source: &SourceInput) -> Result<BlockTree, CompileError> {
        match source.kind {
            SourceKind::Docx => docx::compile(&source.bytes),
            SourceKind::Latex => latex::compile(source, self.max_input_depth),
        }
    }
}

/// Read one archive member as text, `None` when it does not exist.
pub(crate) fn read_member(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    path: &str,
    kind: SourceKind,
) -> Result<Option<String>, CompileError> {
    let mut file = match archive.by_name(path) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(CompileError::new(kind, format!("cannot open '{path}': {e}"))),
    };
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| CompileError::new(kind, format!("cannot read '{path}': {e}")))?;
    Ok(Some(String::from_utf8_lossy(strip_bom(&bytes)).into_owned()))
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data)
}
