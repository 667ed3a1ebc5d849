//! In-memory PDF fixtures shared by the integration tests.
#![allow(dead_code)]

use lopdf::{
    dictionary, Dictionary, Document, EncryptionState, EncryptionVersion, Object, Permissions,
    Stream,
};

use unmark::parser::{scan_page, PdfDocument};

/// 45° "CONFIDENTIAL" painted at 30% opacity.
pub const CONFIDENTIAL_STAMP: &str = "q /GS1 gs BT /F1 60 Tf \
     0.7071 0.7071 -0.7071 0.7071 150 200 Tm (CONFIDENTIAL) Tj ET Q";

/// Logo image placed in the bottom-right corner.
pub const LOGO: &str = "q 120 0 0 40 400 20 cm /Logo Do Q";

/// Form XObject that only draws "DRAFT".
pub const DRAFT_FORM: &str = "q /Wm Do Q";

/// Full-page tint marked as a watermark artifact.
pub const ARTIFACT_TINT: &str =
    "/Artifact <</Subtype /Watermark>> BDC q 0.9 g 0 0 612 792 re f Q EMC";

pub fn body(page: usize) -> String {
    format!("BT /F1 12 Tf 72 720 Td (Page {} of the quarterly report) Tj ET", page)
}

/// Page content made of the given fragments.
pub fn page(parts: &[&str]) -> String {
    parts.join("\n")
}

/// Options for [`build_pdf`].
#[derive(Default, Clone, Copy)]
pub struct Extras {
    /// Add a `/Watermark` annotation and a link annotation to every page
    pub annotations: bool,
    /// Write each line of a page as its own stream, inside a `q`/`Q` pair
    pub split_contents: bool,
    /// Encrypt with owner password "owner" and this user password
    pub user_password: Option<&'static str>,
}

/// Build a PDF with one page per content string.
///
/// Every page shares a resource dictionary with `/F1` (Helvetica), `/GS1`
/// (30% alpha), `/Logo` (a gray image) and `/Wm` (a form drawing "DRAFT").
pub fn build_pdf(contents: &[String], extras: Extras) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let gs_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => 0.3,
        "CA" => 0.3,
    });
    let logo: Vec<u8> = (0..32u32 * 32)
        .map(|i| ((i % 32) * 8) as u8)
        .collect();
    let logo_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 32,
            "Height" => 32,
            "BitsPerComponent" => 8,
            "ColorSpace" => "DeviceGray",
        },
        logo,
    ));
    let form_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        },
        b"BT /F1 48 Tf 200 400 Td (DRAFT) Tj ET".to_vec(),
    ));

    let mut kids: Vec<Object> = Vec::new();
    for content in contents {
        let page_contents: Object = if extras.split_contents {
            let mut parts = vec!["q"];
            parts.extend(content.lines());
            parts.push("Q");
            Object::Array(
                parts
                    .into_iter()
                    .map(|part| {
                        doc.add_object(Stream::new(Dictionary::new(), part.as_bytes().to_vec()))
                            .into()
                    })
                    .collect(),
            )
        } else {
            doc.add_object(Stream::new(Dictionary::new(), content.as_bytes().to_vec()))
                .into()
        };
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => page_contents,
        };
        if extras.annotations {
            let watermark = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Watermark",
                "Rect" => Object::Array(vec![100.into(), 100.into(), 500.into(), 300.into()]),
            });
            let link = doc.add_object(dictionary! {
                "Type" => "Annot",
                "Subtype" => "Link",
                "Rect" => Object::Array(vec![72.into(), 700.into(), 200.into(), 730.into()]),
            });
            page.set("Annots", Object::Array(vec![watermark.into(), link.into()]));
        }
        kids.push(doc.add_object(page).into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "ExtGState" => dictionary! { "GS1" => gs_id },
                "XObject" => dictionary! { "Logo" => logo_id, "Wm" => form_id },
            },
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    if let Some(user_password) = extras.user_password {
        doc.trailer.set(
            "ID",
            Object::Array(vec![
                Object::string_literal(b"unmark-fixture-id".to_vec()),
                Object::string_literal(b"unmark-fixture-id".to_vec()),
            ]),
        );
        let version = EncryptionVersion::V2 {
            document: &doc,
            owner_password: "owner",
            user_password,
            key_length: 128,
            permissions: Permissions::all(),
        };
        let state = EncryptionState::try_from(version).unwrap();
        doc.encrypt(&state).unwrap();
    }

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Text of every run on every page.
pub fn page_texts(bytes: &[u8]) -> Vec<Vec<String>> {
    let pdf = PdfDocument::load_bytes(bytes).unwrap();
    pdf.pages()
        .into_iter()
        .map(|(number, page_id)| {
            scan_page(&pdf, number, page_id)
                .unwrap()
                .content
                .text_runs
                .into_iter()
                .map(|run| run.text)
                .collect()
        })
        .collect()
}

/// Names of the XObjects drawn on every page.
pub fn page_xobjects(bytes: &[u8]) -> Vec<Vec<String>> {
    let pdf = PdfDocument::load_bytes(bytes).unwrap();
    pdf.pages()
        .into_iter()
        .map(|(number, page_id)| {
            scan_page(&pdf, number, page_id)
                .unwrap()
                .content
                .placements
                .into_iter()
                .map(|p| p.name)
                .collect()
        })
        .collect()
}

/// Annotation subtypes of every page.
pub fn page_annotations(bytes: &[u8]) -> Vec<Vec<String>> {
    let pdf = PdfDocument::load_bytes(bytes).unwrap();
    pdf.pages()
        .values()
        .map(|page_id| {
            pdf.annotations(*page_id)
                .into_iter()
                .map(|a| a.subtype)
                .collect()
        })
        .collect()
}
