//! Integration tests for document formats: PDF, Word, PowerPoint, Excel,
//! delimited text and legacy-encoded plain text, end to end through the CLI.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn shelf_binary() -> std::path::PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("shelf");
    path
}

/// Minimal valid PDF containing the text "quarterly report phrase".
/// Builds body then xref with correct byte offsets so lopdf can parse it.
fn minimal_pdf_with_phrase() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(b"4 0 obj << /Length 55 >> stream\nBT /F1 12 Tf 100 700 Td (quarterly report phrase) Tj ET\nendstream endobj\n");
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o1).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o2).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o3).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o4).as_bytes());
    out.extend_from_slice(format!("{:010} 00000 n \n", o5).as_bytes());
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}

fn zip_with(entries: &[(&str, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }
    buf
}

fn minimal_docx_with_text(phrase: &str) -> Vec<u8> {
    zip_with(&[(
        "word/document.xml",
        format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        ),
    )])
}

fn minimal_pptx_with_slides(slides: &[&str]) -> Vec<u8> {
    let entries: Vec<(String, String)> = slides
        .iter()
        .enumerate()
        .map(|(i, text)| {
            (
                format!("ppt/slides/slide{}.xml", i + 1),
                format!(
                    "<p:sld xmlns:p=\"http://schemas.openxmlformats.org/presentationml/2006/main\" xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>",
                    text
                ),
            )
        })
        .collect();
    let refs: Vec<(&str, String)> = entries
        .iter()
        .map(|(n, b)| (n.as_str(), b.clone()))
        .collect();
    zip_with(&refs)
}

fn minimal_xlsx(shared: &[&str]) -> Vec<u8> {
    let sst: String = shared
        .iter()
        .map(|s| format!("<si><t>{}</t></si>", s))
        .collect();
    let cells: String = (0..shared.len())
        .map(|i| format!("<c t=\"s\"><v>{}</v></c>", i))
        .collect();
    zip_with(&[
        ("xl/sharedStrings.xml", format!("<sst>{}</sst>", sst)),
        (
            "xl/worksheets/sheet1.xml",
            format!(
                "<worksheet><sheetData><row r=\"1\">{}</row><row r=\"2\"><c><v>1234.5</v></c></row></sheetData></worksheet>",
                cells
            ),
        ),
    ])
}

fn setup_file_support_env(files: &[(&str, Vec<u8>)]) -> (TempDir, std::path::PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();
    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    for (name, bytes) in files {
        fs::write(files_dir.join(name), bytes).unwrap();
    }

    let config_path = root.join("shelf.toml");
    fs::write(
        &config_path,
        format!("[db]\npath = \"{}/data/shelf.sqlite\"\n", root.display()),
    )
    .unwrap();

    run_shelf(&config_path, &["init"]);
    let (_, stderr, success) =
        run_shelf(&config_path, &["root", "add", files_dir.to_str().unwrap()]);
    assert!(success, "root add failed: {}", stderr);
    let (_, stderr, success) = run_shelf(&config_path, &["scan", "1", "--progress", "off"]);
    assert!(success, "scan failed: {}", stderr);

    (tmp, config_path)
}

fn run_shelf(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = shelf_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run shelf binary at {:?}: {}", binary, e));
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn index_json(config_path: &Path) -> serde_json::Value {
    let (stdout, stderr, success) =
        run_shelf(config_path, &["index", "--json", "--progress", "off"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap()
}

fn search_names(config_path: &Path, query: &str) -> Vec<String> {
    let (stdout, stderr, success) = run_shelf(config_path, &["search", query, "--json"]);
    assert!(success, "search failed: {}", stderr);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    hits.as_array()
        .unwrap()
        .iter()
        .map(|h| h["name"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn file_support_pdf_index_and_search() {
    let (_tmp, config_path) =
        setup_file_support_env(&[("report.pdf", minimal_pdf_with_phrase())]);

    let summary = index_json(&config_path);
    assert_eq!(summary["indexed"], 1);
    assert_eq!(summary["errors"], 0);

    assert_eq!(search_names(&config_path, "quarterly"), vec!["report.pdf"]);
}

#[test]
fn file_support_office_formats() {
    let (_tmp, config_path) = setup_file_support_env(&[
        ("memo.docx", minimal_docx_with_text("office memo phrase")),
        ("deck.pptx", minimal_pptx_with_slides(&["roadmap intro", "roadmap milestones"])),
        ("ledger.xlsx", minimal_xlsx(&["Revenue", "Forecast"])),
    ]);

    let summary = index_json(&config_path);
    assert_eq!(summary["indexed"], 3);
    assert_eq!(summary["empty"], 0);

    assert_eq!(search_names(&config_path, "memo"), vec!["memo.docx"]);
    assert_eq!(search_names(&config_path, "milestones"), vec!["deck.pptx"]);
    assert_eq!(search_names(&config_path, "revenue"), vec!["ledger.xlsx"]);
}

#[test]
fn file_support_delimited_and_legacy_text() {
    // "relatório" in Windows-1252.
    let mut latin = b"relat".to_vec();
    latin.push(0xF3);
    latin.extend_from_slice(b"rio anual");
    let (_tmp, config_path) = setup_file_support_env(&[
        ("people.tsv", b"name\tteam\nCarla\tplatform\n".to_vec()),
        ("legacy.txt", latin),
    ]);

    let summary = index_json(&config_path);
    assert_eq!(summary["indexed"], 2);

    assert_eq!(search_names(&config_path, "platform"), vec!["people.tsv"]);
    assert_eq!(search_names(&config_path, "relatório"), vec!["legacy.txt"]);
}

#[test]
fn file_support_idempotent_reindex() {
    let (_tmp, config_path) = setup_file_support_env(&[
        ("memo.docx", minimal_docx_with_text("steady text")),
        ("report.pdf", minimal_pdf_with_phrase()),
    ]);

    assert_eq!(index_json(&config_path)["indexed"], 2);
    let second = index_json(&config_path);
    assert_eq!(second["indexed"], 0);
    assert_eq!(second["skipped"], 2);
}

#[test]
fn file_support_corrupt_files_index_as_empty() {
    let (_tmp, config_path) = setup_file_support_env(&[
        ("broken.pdf", b"%PDF-1.4 truncated".to_vec()),
        ("broken.docx", b"PK not really a zip".to_vec()),
        ("fine.md", b"# fine\nreadable notes".to_vec()),
    ]);

    let summary = index_json(&config_path);
    assert_eq!(summary["indexed"], 3);
    assert_eq!(summary["empty"], 2);
    assert_eq!(summary["errors"], 0);

    assert_eq!(search_names(&config_path, "readable"), vec!["fine.md"]);
}

#[test]
fn file_support_ext_filter_limits_candidates() {
    let (_tmp, config_path) = setup_file_support_env(&[
        ("memo.docx", minimal_docx_with_text("office memo phrase")),
        ("report.pdf", minimal_pdf_with_phrase()),
    ]);

    let (stdout, _, success) = run_shelf(
        &config_path,
        &["index", "--ext", "pdf", "--json", "--progress", "off"],
    );
    assert!(success);
    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["candidates"], 1);
    assert_eq!(summary["indexed"], 1);
    assert!(search_names(&config_path, "memo").is_empty());
}
