//! Input resolution: read a user-supplied path and decide its source kind.
//!
//! Kind detection looks at content, not just the extension: a DOCX is a zip
//! package containing `word/document.xml`, a LaTeX project is either plain
//! text with `\documentclass` (or a `.tex` name), or a zip or gzipped tarball
//! holding at least one `.tex` file. Anything else is rejected before
//! compilation starts.

use crate::error::PaperCheckError;
use crate::model::SourceKind;
use flate2::read::GzDecoder;
use std::io::Cursor;
use std::path::Path;
use tar::Archive;
use tracing::debug;
use zip::ZipArchive;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const GZIP_MAGIC: &[u8] = b"\x1f\x8b";

/// How the source bytes are packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packaging {
    /// One uncompressed file.
    Plain,
    Zip,
    /// `.tar.gz` / `.tgz`, the form arXiv hands out sources in.
    TarGz,
}

/// A source document read into memory.
#[derive(Debug, Clone)]
pub struct SourceInput {
    /// Display name (file name or caller-supplied label).
    pub name: String,
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
    pub packaging: Packaging,
}

impl SourceInput {
    /// Classify in-memory bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, PaperCheckError> {
        let name = name.into();
        let (kind, packaging) = sniff(&name, &bytes)?;
        debug!(
            "Detected {} source '{}' ({:?}, {} bytes)",
            kind,
            name,
            packaging,
            bytes.len()
        );
        Ok(Self {
            name,
            kind,
            bytes,
            packaging,
        })
    }
}

/// Read a local file and classify it.
pub async fn read_input(path: &Path) -> Result<SourceInput, PaperCheckError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PaperCheckError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => PaperCheckError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PaperCheckError::UnsupportedFormat {
            name: path.display().to_string(),
            detail: e.to_string(),
        },
    })?;
    SourceInput::from_bytes(display_name(path), bytes)
}

/// File name of a path, falling back to the full path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Decide the source kind and packaging of `bytes`.
pub fn sniff(name: &str, bytes: &[u8]) -> Result<(SourceKind, Packaging), PaperCheckError> {
    let unsupported = |detail: &str| PaperCheckError::UnsupportedFormat {
        name: name.to_string(),
        detail: detail.to_string(),
    };

    if bytes.starts_with(ZIP_MAGIC) {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| unsupported(&format!("unreadable zip archive: {e}")))?;
        let names: Vec<&str> = archive.file_names().collect();
        if names.contains(&"word/document.xml") {
            return Ok((SourceKind::Docx, Packaging::Zip));
        }
        if names.iter().any(|n| is_tex_name(n)) {
            return Ok((SourceKind::Latex, Packaging::Zip));
        }
        return Err(unsupported(
            "zip archive contains neither word/document.xml nor a .tex file",
        ));
    }

    if bytes.starts_with(GZIP_MAGIC) {
        let names = tarball_names(bytes)
            .map_err(|e| unsupported(&format!("unreadable tar.gz archive: {e}")))?;
        if names.iter().any(|n| is_tex_name(n)) {
            return Ok((SourceKind::Latex, Packaging::TarGz));
        }
        return Err(unsupported("tar.gz archive contains no .tex file"));
    }

    let Ok(text) = std::str::from_utf8(bytes) else {
        return Err(unsupported("not a DOCX package or UTF-8 LaTeX source"));
    };
    if is_tex_name(name) || text.contains("\\documentclass") {
        return Ok((SourceKind::Latex, Packaging::Plain));
    }
    Err(unsupported("plain text without \\documentclass"))
}

/// Regular-file paths inside a gzipped tarball.
fn tarball_names(bytes: &[u8]) -> std::io::Result<Vec<String>> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_file() {
            names.push(entry.path()?.to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

pub(crate) fn is_tex_name(name: &str) -> bool {
    !name.starts_with("__MACOSX")
        && Path::new(name)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("tex"))
}
