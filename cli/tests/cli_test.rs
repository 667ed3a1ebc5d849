//! End-to-end tests for the `unmark` binary.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use lopdf::{dictionary, Dictionary, Document, Object, Stream};

fn unmark(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_unmark"))
        .current_dir(dir)
        .args(args)
        .env_remove("UNMARK_CONFIG")
        .output()
        .unwrap()
}

/// One page with body text and a rotated translucent stamp.
fn stamped_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let gs_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => 0.25,
    });
    let content = b"BT /F1 12 Tf 72 720 Td (Hello) Tj ET \
        q /GS1 gs BT /F1 60 Tf 0.7071 0.7071 -0.7071 0.7071 150 200 Tm (CONFIDENTIAL) Tj ET Q";
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
        "Resources" => dictionary! {
            "Font" => dictionary! { "F1" => font_id },
            "ExtGState" => dictionary! { "GS1" => gs_id },
        },
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[test]
fn test_missing_input_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = unmark(dir.path(), &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("pdf_data"));
    assert!(!dir.path().join("clean_pdf_data").exists());
}

#[test]
fn test_empty_input_dir_fails() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("pdf_data")).unwrap();
    let output = unmark(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_bad_and_good_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pdf_data");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("bad.pdf"), b"not a pdf at all").unwrap();
    fs::write(input.join("good.pdf"), stamped_pdf()).unwrap();

    let output = unmark(dir.path(), &["--report", "report.json"]);
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Warnings"));
    assert!(dir.path().join("clean_pdf_data").join("good.pdf").exists());
    assert!(!dir.path().join("clean_pdf_data").join("bad.pdf").exists());

    let report: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("report.json")).unwrap()).unwrap();
    assert_eq!(report["files"][0]["status"], "failed");
    assert_eq!(report["files"][1]["status"], "cleaned");
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("pdf_data");
    fs::create_dir(&input).unwrap();
    fs::write(input.join("good.pdf"), stamped_pdf()).unwrap();
    fs::write(dir.path().join("unmark.json"), r#"{ "opacity_threshold": 3.0 }"#).unwrap();

    let output = unmark(dir.path(), &["--config", "unmark.json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join("clean_pdf_data").exists());
}

#[test]
fn test_inspect_json() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("doc.pdf"), stamped_pdf()).unwrap();

    let output = unmark(dir.path(), &["inspect", "doc.pdf", "--json"]);
    assert_eq!(output.status.code(), Some(0));

    let inspection: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(inspection["page_count"], 1);
    assert_eq!(inspection["pages"][0]["candidates"].as_array().unwrap().len(), 1);
}
