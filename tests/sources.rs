//! Whole-file runs over DOCX packages and LaTeX projects built on the fly.

use papercheck::{
    analyze, analyze_all, analyze_bytes, analyze_sync, analyze_to_file, AnalysisConfig,
    AnalysisReport, ReportFormat, Severity, SourceKind, Stage, Template, WarningCode,
};
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Fixtures ─────────────────────────────────────────────────────────────

const NS: &str = r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main""#;

const STYLES: &str = r#"<?xml version="1.0"?><w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
<w:style w:type="paragraph" w:styleId="PaperTitle"><w:name w:val="Paper-Title"/></w:style>
<w:style w:type="paragraph" w:styleId="Author"><w:name w:val="Author"/></w:style>
<w:style w:type="paragraph" w:styleId="Affiliations"><w:name w:val="Affiliations"/></w:style>
<w:style w:type="paragraph" w:styleId="EMail"><w:name w:val="E-Mail"/></w:style>
<w:style w:type="paragraph" w:styleId="AbstractHeading"><w:name w:val="AbstractHeading"/></w:style>
<w:style w:type="paragraph" w:styleId="Abstract"><w:name w:val="Abstract"/></w:style>
<w:style w:type="paragraph" w:styleId="KeywordsHeading"><w:name w:val="KeywordsHeading"/></w:style>
<w:style w:type="paragraph" w:styleId="Keywords"><w:name w:val="Keywords"/></w:style>
<w:style w:type="paragraph" w:styleId="Heading1"><w:name w:val="Heading 1"/></w:style>
<w:style w:type="paragraph" w:styleId="Caption"><w:name w:val="Caption"/></w:style>
</w:styles>"#;

fn zip_bytes(files: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn para(style: &str, text: &str) -> String {
    format!(
        r#"<w:p><w:pPr><w:pStyle w:val="{style}"/></w:pPr><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#
    )
}

fn docx(body: &str, rels: &str) -> Vec<u8> {
    let document =
        format!(r#"<?xml version="1.0"?><w:document {NS}><w:body>{body}</w:body></w:document>"#);
    let rels = format!(
        r#"<?xml version="1.0"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    );
    zip_bytes(&[
        ("word/document.xml", &document),
        ("word/styles.xml", STYLES),
        ("word/_rels/document.xml.rels", &rels),
    ])
}

fn front_matter() -> String {
    [
        para("PaperTitle", "Predicting Dropout from Clickstreams"),
        para("Author", "Ada Lovelace"),
        para("Affiliations", "Analytical University"),
        para("EMail", "ada@example.org"),
        para("AbstractHeading", "ABSTRACT"),
        para("Abstract", "We predict dropout."),
        para("KeywordsHeading", "Keywords"),
        para("Keywords", "dropout, clickstreams"),
        para("Heading1", "1. INTRODUCTION"),
    ]
    .concat()
}

fn picture(descr: Option<&str>) -> String {
    let descr = descr.map(|d| format!(r#" descr="{d}""#)).unwrap_or_default();
    format!(
        r#"<w:p><w:r><w:drawing><wp:inline><wp:docPr id="1" name="Picture 1"{descr}/>
<a:graphic><a:graphicData><pic:pic xmlns:pic="p"><pic:blipFill><a:blip r:embed="rId7"/></pic:blipFill></pic:pic></a:graphicData></a:graphic>
</wp:inline></w:drawing></w:r></w:p>"#
    )
}

const IMAGE_REL: &str =
    r#"<Relationship Id="rId7" Type="image" Target="media/image1.png"/>"#;

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn codes(report: &AnalysisReport) -> Vec<WarningCode> {
    report.warnings.iter().map(|w| w.code).collect()
}

const EDM_TEX: &str = r"\documentclass{edm_article}
\title{Learning Things}
\author{\alignauthor Ada Lovelace\\ \affaddr{Analytical University}\\ \email{ada@example.org}}
\begin{document}
\maketitle
\begin{abstract}
We study things.
\end{abstract}
\keywords{data, mining}
\section{Introduction}\label{sec:intro}
Prior work~\cite{smith20} matters, see Section~\ref{sec:missing}.
\begin{thebibliography}{9}
\bibitem{smith20} John Smith. 2020. A paper about things. In Proceedings of the Conference on Things. ACM, 1--10.
\bibitem{doe19} Jane Doe. 2019. Another paper. In Proceedings of the Conference on Stuff. ACM, 5--9.
\end{thebibliography}
\end{document}
";

// ── DOCX ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_docx_end_to_end() {
    let body = [
        front_matter(),
        para("Normal", "Results are shown below."),
        picture(None),
        para("Caption", "Figure 1. Dropout by week"),
        r#"<w:p><w:hyperlink w:anchor="sec_missing"><w:r><w:t>see below</w:t></w:r></w:hyperlink></w:p>"#
            .to_string(),
    ]
    .concat();
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "paper.docx", &docx(&body, IMAGE_REL));

    let report = analyze(&path, &AnalysisConfig::default()).await;
    assert!(!report.is_aborted(), "{:?}", report.warnings);
    assert_eq!(report.source, "paper.docx");
    assert_eq!(report.kind, Some(SourceKind::Docx));
    assert_eq!(report.template, Template::Edm);

    let found = codes(&report);
    assert!(found.contains(&WarningCode::AltTextMissing));
    assert!(found.contains(&WarningCode::BrokenInternalRef));
    assert!(found.contains(&WarningCode::StyleNoRefs));
    assert!(!found.contains(&WarningCode::StylePaperTitle));
    assert!(!found.contains(&WarningCode::StyleAuthor));
    assert!(!found.contains(&WarningCode::FigureCaptionDistance));
    assert_eq!(report.stats.objects, 1);
    assert!(report.stats.blocks >= 12);
}

#[tokio::test]
async fn test_docx_with_alt_text_has_no_alt_warnings() {
    let body = [
        front_matter(),
        picture(Some("Line chart of weekly dropout")),
        para("Caption", "Figure 1. Dropout by week"),
    ]
    .concat();
    let report = analyze_bytes("paper.docx", docx(&body, IMAGE_REL), &AnalysisConfig::default()).await;
    let found = codes(&report);
    assert!(!found.contains(&WarningCode::AltTextMissing));
    assert!(!found.contains(&WarningCode::AltTextDuplicate));
}

#[tokio::test]
async fn test_docx_without_content_is_empty_document() {
    let report = analyze_bytes("blank.docx", docx("<w:p/><w:p/>", ""), &AnalysisConfig::default()).await;
    assert_eq!(report.aborted_at, Some(Stage::Normalize));
    assert_eq!(codes(&report), vec![WarningCode::EmptyDocument]);
    assert_eq!(report.warnings[0].severity, Severity::High);
    assert_eq!(report.kind, Some(SourceKind::Docx));
}

// ── LaTeX ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_latex_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "paper.tex", EDM_TEX.as_bytes());

    let report = analyze(&path, &AnalysisConfig::default()).await;
    assert!(!report.is_aborted(), "{:?}", report.warnings);
    assert_eq!(report.kind, Some(SourceKind::Latex));
    assert_eq!(report.template, Template::Edm);

    let mismatched: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.code == WarningCode::MismatchedRefs)
        .collect();
    assert_eq!(mismatched.len(), 1);
    assert_eq!(mismatched[0].context.as_deref(), Some("Reference: 2"));
    assert!(codes(&report).contains(&WarningCode::BrokenInternalRef));
    assert!(!codes(&report).contains(&WarningCode::AuthorDataMissing));
    assert_eq!(report.stats.references, 2);
}

#[tokio::test]
async fn test_zipped_jedm_project_with_inputs() {
    let main = r"\documentclass{article}
\title{Journal Paper}
\author{Ada Lovelace}
\begin{document}
\maketitle
\input{sections/intro}
\end{document}
";
    let intro = r"\section{Introduction}
Some text.
";
    let bytes = zip_bytes(&[
        ("project/main.tex", main),
        ("project/sections/intro.tex", intro),
        ("project/jedm.cls", "% class"),
    ]);
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "project.zip", &bytes);

    let report = analyze(&path, &AnalysisConfig::default()).await;
    assert!(!report.is_aborted(), "{:?}", report.warnings);
    assert_eq!(report.kind, Some(SourceKind::Latex));
    assert_eq!(report.template, Template::Jedm);
    assert!(!codes(&report).contains(&WarningCode::StyleNoIntro));
    assert!(!codes(&report).contains(&WarningCode::TemplateNotDetected));
}

#[tokio::test]
async fn test_zip_without_sources_is_unsupported() {
    let bytes = zip_bytes(&[("notes.txt", "hello")]);
    let report = analyze_bytes("archive.zip", bytes, &AnalysisConfig::default()).await;
    assert_eq!(report.aborted_at, Some(Stage::Input));
    assert_eq!(report.kind, None);
    assert_eq!(codes(&report), vec![WarningCode::UnsupportedFormat]);
}

// ── Batch and output ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_batch_keeps_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let tex = write(dir.path(), "b.tex", EDM_TEX.as_bytes());
    let doc = write(dir.path(), "a.docx", &docx(&front_matter(), ""));
    let bad = write(dir.path(), "c.txt", b"just some notes");

    let config = AnalysisConfig::builder().concurrency(3).build().unwrap();
    let reports = analyze_all(&[tex, doc, bad], &config).await;
    let names: Vec<&str> = reports.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(names, vec!["b.tex", "a.docx", "c.txt"]);
    assert!(!reports[0].is_aborted());
    assert!(!reports[1].is_aborted());
    assert_eq!(reports[2].aborted_at, Some(Stage::Input));
}

#[tokio::test]
async fn test_csv_report_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "paper.tex", EDM_TEX.as_bytes());
    let out = dir.path().join("report.csv");

    let report = analyze_to_file(&input, &out, ReportFormat::Csv, &AnalysisConfig::default())
        .await
        .unwrap();
    let written = std::fs::read_to_string(&out).unwrap();
    let mut reader = csv::Reader::from_reader(written.as_bytes());
    assert_eq!(reader.records().count(), report.warnings.len());
    assert!(written.contains("mismatched_refs"));
}

#[test]
fn test_sync_wrapper() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "paper.tex", EDM_TEX.as_bytes());
    let report = analyze_sync(&path, &AnalysisConfig::default()).unwrap();
    assert_eq!(report.kind, Some(SourceKind::Latex));
}
