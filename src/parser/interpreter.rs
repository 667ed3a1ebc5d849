//! Content stream interpretation.
//!
//! Walks a page's operations while tracking the parts of the graphics state
//! that matter for watermark detection (CTM, alpha, text matrices, render
//! mode, marked content) and records every text run, XObject placement and
//! interesting marked-content region together with its operation index.

use lopdf::content::Operation;
use lopdf::{Dictionary, Document as LopdfDocument, Object, Stream};
use unicode_normalization::UnicodeNormalization;

use crate::error::Result;
use crate::model::{
    MarkedRegion, PageContent, Rect, RegionKind, TextRun, XObjectKind, XObjectPlacement,
};

use super::backend::{decode_operations, decode_text_simple, stream_bytes, PageId, PdfDocument};
use super::fingerprint::{digest, image_hash};
use super::matrix::{get_number, Matrix};

/// Nested form XObjects deeper than this are not inspected.
const MAX_FORM_DEPTH: usize = 8;

/// TJ adjustments beyond this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = 200.0;

/// A page's elements together with the operations they index into.
#[derive(Debug, Clone)]
pub struct PageScan {
    pub page_id: PageId,
    pub content: PageContent,
    pub operations: Vec<Operation>,
}

/// Interpret one page.
pub fn scan_page(pdf: &PdfDocument, number: u32, page_id: PageId) -> Result<PageScan> {
    let operations = pdf.page_operations(page_id)?;
    let mut interpreter = Interpreter::new(pdf, pdf.page_resources(page_id), 0);
    let found = interpreter.run(&operations, GraphicsState::default());

    let mut content = PageContent::new(number);
    content.text_runs = found.text_runs;
    content.placements = found.placements;
    content.regions = found.regions;
    content.annotations = pdf.annotations(page_id);

    log::debug!(
        "page {}: {} ops, {} text runs, {} placements, {} regions",
        number,
        operations.len(),
        content.text_runs.len(),
        content.placements.len(),
        content.regions.len()
    );

    Ok(PageScan {
        page_id,
        content,
        operations,
    })
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill_alpha: f32,
    stroke_alpha: f32,
    render_mode: u8,
    font: Vec<u8>,
    leading: f32,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill_alpha: 1.0,
            stroke_alpha: 1.0,
            render_mode: 0,
            font: Vec::new(),
            leading: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct Found {
    text_runs: Vec<TextRun>,
    placements: Vec<XObjectPlacement>,
    regions: Vec<MarkedRegion>,
}

struct Interpreter<'a> {
    pdf: &'a PdfDocument,
    resources: Option<&'a Dictionary>,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    fn new(pdf: &'a PdfDocument, resources: Option<&'a Dictionary>, depth: usize) -> Self {
        Self {
            pdf,
            resources,
            depth,
        }
    }

    fn run(&mut self, operations: &[Operation], initial: GraphicsState) -> Found {
        let mut found = Found::default();
        let mut state = initial;
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut text_matrix = Matrix::IDENTITY;
        let mut line_matrix = Matrix::IDENTITY;
        let mut marked: Vec<(usize, Option<RegionKind>)> = Vec::new();

        for (index, op) in operations.iter().enumerate() {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => stack.push(state.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.ctm = m.then(&state.ctm);
                    }
                }
                "gs" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        self.apply_ext_gstate(&mut state, name);
                    }
                }
                "BT" => {
                    text_matrix = Matrix::IDENTITY;
                    line_matrix = Matrix::IDENTITY;
                }
                "Tf" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        state.font = name.clone();
                    }
                }
                "Tr" => {
                    if let Some(mode) = operands.first().and_then(get_number) {
                        state.render_mode = (mode as i64).clamp(0, 7) as u8;
                    }
                }
                "TL" => {
                    if let Some(leading) = operands.first().and_then(get_number) {
                        state.leading = leading;
                    }
                }
                "Td" | "TD" => {
                    if operands.len() >= 2 {
                        let tx = get_number(&operands[0]).unwrap_or(0.0);
                        let ty = get_number(&operands[1]).unwrap_or(0.0);
                        if op.operator == "TD" {
                            state.leading = -ty;
                        }
                        line_matrix = Matrix::translation(tx, ty).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        line_matrix = m;
                        text_matrix = m;
                    }
                }
                "T*" => {
                    line_matrix = Matrix::translation(0.0, -state.leading).then(&line_matrix);
                    text_matrix = line_matrix;
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator != "Tj" && op.operator != "TJ" {
                        line_matrix = Matrix::translation(0.0, -state.leading).then(&line_matrix);
                        text_matrix = line_matrix;
                    }
                    let shown = if op.operator == "\"" {
                        operands.get(2)
                    } else {
                        operands.first()
                    };
                    if let Some(shown) = shown {
                        let text = self.decode_shown_text(&state, shown);
                        if !text.trim().is_empty() {
                            let rendering = text_matrix.then(&state.ctm);
                            found.text_runs.push(TextRun {
                                op_index: index,
                                text,
                                fill_alpha: state.fill_alpha,
                                stroke_alpha: state.stroke_alpha,
                                render_mode: state.render_mode,
                                angle: rendering.angle_degrees(),
                                origin: rendering.apply(0.0, 0.0),
                            });
                        }
                    }
                }
                "Do" => {
                    if let Some(Object::Name(name)) = operands.first() {
                        if let Some(placement) = self.place_xobject(index, name, &state) {
                            found.placements.push(placement);
                        }
                    }
                }
                "BMC" => marked.push((index, None)),
                "BDC" => marked.push((index, self.region_kind(operands))),
                "EMC" => {
                    if let Some((start, Some(kind))) = marked.pop() {
                        found.regions.push(MarkedRegion {
                            start,
                            end: index,
                            kind,
                        });
                    }
                }
                _ => {}
            }
        }

        if !marked.is_empty() {
            log::debug!("{} marked-content sequences left open", marked.len());
        }
        found
    }

    fn apply_ext_gstate(&self, state: &mut GraphicsState, name: &[u8]) {
        let Some(dict) = self
            .resources
            .and_then(|r| self.pdf.resource(r, b"ExtGState", name))
            .and_then(|(_, obj)| self.pdf.resolve_dict(obj))
        else {
            return;
        };
        let alpha = |key: &[u8]| {
            dict.get(key)
                .ok()
                .and_then(|o| self.pdf.resolve(o))
                .and_then(get_number)
                .map(|a| a.clamp(0.0, 1.0))
        };
        if let Some(ca) = alpha(b"ca") {
            state.fill_alpha = ca;
        }
        if let Some(ca) = alpha(b"CA") {
            state.stroke_alpha = ca;
        }
    }

    fn decode_shown_text(&self, state: &GraphicsState, shown: &Object) -> String {
        let doc = self.pdf.raw_doc();
        let font = self
            .resources
            .and_then(|r| self.pdf.resource(r, b"Font", &state.font))
            .and_then(|(_, obj)| self.pdf.resolve_dict(obj));
        let encoding = font.and_then(|f| f.get_font_encoding(doc).ok());
        let decode = |bytes: &[u8]| match encoding {
            Some(ref enc) => {
                LopdfDocument::decode_text(enc, bytes).unwrap_or_else(|_| decode_text_simple(bytes))
            }
            None => decode_text_simple(bytes),
        };

        let raw = match shown {
            Object::String(bytes, _) => decode(bytes),
            Object::Array(items) => {
                let mut combined = String::new();
                for item in items {
                    match item {
                        Object::String(bytes, _) => combined.push_str(&decode(bytes)),
                        other => {
                            // Negative adjustments move the next glyph right
                            let gap = get_number(other).map(|n| -n).unwrap_or(0.0);
                            if gap > TJ_SPACE_THRESHOLD
                                && !combined.is_empty()
                                && !combined.ends_with(' ')
                            {
                                combined.push(' ');
                            }
                        }
                    }
                }
                combined
            }
            _ => String::new(),
        };
        raw.nfkc().collect()
    }

    fn place_xobject(
        &self,
        op_index: usize,
        name: &[u8],
        state: &GraphicsState,
    ) -> Option<XObjectPlacement> {
        let (_, obj) = self.pdf.resource(self.resources?, b"XObject", name)?;
        let Object::Stream(stream) = obj else {
            return None;
        };

        let subtype = stream.dict.get(b"Subtype").ok()?.as_name().ok()?;
        let name = String::from_utf8_lossy(name).to_string();
        match subtype {
            b"Image" => Some(XObjectPlacement {
                op_index,
                name,
                kind: XObjectKind::Image,
                rect: state.ctm.transform_rect(&Rect::new(0.0, 0.0, 1.0, 1.0)),
                digest: digest(&stream.content),
                phash: image_hash(stream),
                inner_text: Vec::new(),
            }),
            b"Form" => {
                let form_matrix = stream
                    .dict
                    .get(b"Matrix")
                    .ok()
                    .and_then(|o| o.as_array().ok())
                    .and_then(|a| Matrix::from_operands(a))
                    .unwrap_or(Matrix::IDENTITY);
                let placed = form_matrix.then(&state.ctm);
                let bbox = stream
                    .dict
                    .get(b"BBox")
                    .ok()
                    .and_then(|o| o.as_array().ok())
                    .and_then(|a| bbox_rect(a))
                    .unwrap_or_default();

                Some(XObjectPlacement {
                    op_index,
                    name,
                    kind: XObjectKind::Form,
                    rect: placed.transform_rect(&bbox),
                    digest: digest(&stream.content),
                    phash: None,
                    inner_text: self.form_text(stream, state, placed),
                })
            }
            _ => None,
        }
    }

    /// Text drawn by a form XObject, including nested forms.
    fn form_text(&self, stream: &'a Stream, state: &GraphicsState, placed: Matrix) -> Vec<TextRun> {
        if self.depth >= MAX_FORM_DEPTH {
            log::debug!("form nesting deeper than {}, not inspected", MAX_FORM_DEPTH);
            return Vec::new();
        }
        let operations = match stream_bytes(stream).and_then(|data| decode_operations(&data)) {
            Ok(ops) => ops,
            Err(e) => {
                log::debug!("cannot decode form content: {}", e);
                return Vec::new();
            }
        };

        let resources = stream
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|o| self.pdf.resolve_dict(o))
            .or(self.resources);
        let mut nested = Interpreter::new(self.pdf, resources, self.depth + 1);
        let mut initial = state.clone();
        initial.ctm = placed;

        let found = nested.run(&operations, initial);
        let mut runs = found.text_runs;
        runs.extend(found.placements.into_iter().flat_map(|p| p.inner_text));
        runs
    }

    fn region_kind(&self, operands: &[Object]) -> Option<RegionKind> {
        let Some(Object::Name(tag)) = operands.first() else {
            return None;
        };
        let properties = match operands.get(1)? {
            Object::Dictionary(dict) => Some(dict),
            Object::Name(name) => self
                .resources
                .and_then(|r| self.pdf.resource(r, b"Properties", name))
                .and_then(|(_, obj)| self.pdf.resolve_dict(obj)),
            _ => None,
        };

        match tag.as_slice() {
            b"Artifact" => {
                let subtype = properties
                    .and_then(|p| p.get(b"Subtype").ok())
                    .and_then(|o| o.as_name().ok())
                    .map(|n| String::from_utf8_lossy(n).to_string());
                Some(RegionKind::Artifact { subtype })
            }
            b"OC" => {
                let layer = self.layer_name(properties?)?;
                Some(RegionKind::OptionalContent { layer })
            }
            _ => None,
        }
    }

    /// Name of an optional content group, or the joined names of an OCMD's groups.
    fn layer_name(&self, dict: &Dictionary) -> Option<String> {
        if let Ok(Object::String(bytes, _)) = dict.get(b"Name") {
            return Some(decode_text_simple(bytes));
        }
        let groups = self.pdf.resolve(dict.get(b"OCGs").ok()?)?;
        let names: Vec<String> = match groups {
            Object::Array(items) => items
                .iter()
                .filter_map(|o| self.pdf.resolve_dict(o))
                .filter_map(|d| match d.get(b"Name") {
                    Ok(Object::String(bytes, _)) => Some(decode_text_simple(bytes)),
                    _ => None,
                })
                .collect(),
            Object::Dictionary(d) => match d.get(b"Name") {
                Ok(Object::String(bytes, _)) => vec![decode_text_simple(bytes)],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        (!names.is_empty()).then(|| names.join(", "))
    }
}

fn bbox_rect(values: &[Object]) -> Option<Rect> {
    if values.len() < 4 {
        return None;
    }
    let x0 = get_number(&values[0])?;
    let y0 = get_number(&values[1])?;
    let x1 = get_number(&values[2])?;
    let y1 = get_number(&values[3])?;
    Some(Rect::new(
        x0.min(x1),
        y0.min(y1),
        (x1 - x0).abs(),
        (y1 - y0).abs(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};

    /// One-page document with the given content; `build` creates the resources.
    fn scan_with(content: &[u8], build: impl FnOnce(&mut LopdfDocument) -> Dictionary) -> PageScan {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.to_vec()));
        let resources = build(&mut doc);
        let resources_id = doc.add_object(resources);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();

        let pdf = PdfDocument::load_bytes(&buf).unwrap();
        let page_id = pdf.pages()[&1];
        scan_page(&pdf, 1, page_id).unwrap()
    }

    fn scan(content: &[u8], resources: Dictionary) -> PageScan {
        scan_with(content, |_| resources)
    }

    fn font_resources() -> Dictionary {
        dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
            },
            "ExtGState" => dictionary! {
                "GS1" => dictionary! { "ca" => 0.3, "CA" => 0.3 },
            },
        }
    }

    #[test]
    fn test_rotated_transparent_text() {
        let content = b"q /GS1 gs BT /F1 60 Tf 0.7071 0.7071 -0.7071 0.7071 150 200 Tm \
                        (CONFIDENTIAL) Tj ET Q BT /F1 12 Tf 72 720 Td (Body text) Tj ET";
        let page = scan(content, font_resources());
        let runs = &page.content.text_runs;
        assert_eq!(runs.len(), 2);

        assert_eq!(runs[0].text, "CONFIDENTIAL");
        assert!((runs[0].angle - 45.0).abs() < 0.1);
        assert!((runs[0].fill_alpha - 0.3).abs() < 1e-6);
        assert_eq!(runs[0].op_index, 5);

        // Q restores full opacity
        assert_eq!(runs[1].text, "Body text");
        assert_eq!(runs[1].fill_alpha, 1.0);
        assert_eq!(runs[1].angle, 0.0);
        assert_eq!(runs[1].origin, (72.0, 720.0));
    }

    #[test]
    fn test_tj_array_and_quote_operators() {
        let content = b"BT /F1 12 Tf 14 TL 72 700 Td [(Hel) 10 (lo) -300 (World)] TJ \
                        (Next line) ' 1 2 (Spaced) \" ET";
        let page = scan(content, font_resources());
        let texts: Vec<_> = page.content.text_runs.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello World", "Next line", "Spaced"]);
        assert_eq!(page.content.text_runs[1].origin, (72.0, 686.0));
        assert_eq!(page.content.text_runs[2].origin, (72.0, 672.0));
    }

    #[test]
    fn test_invisible_render_mode() {
        let page = scan(b"BT /F1 12 Tf 3 Tr (ocr layer) Tj ET", font_resources());
        assert!(page.content.text_runs[0].is_invisible());
    }

    #[test]
    fn test_nfkc_normalisation() {
        let mut resources = font_resources();
        resources.remove(b"Font");
        let text = "\u{FB01}le".as_bytes().to_vec(); // "ﬁle"
        let content = lopdf::content::Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tj", vec![Object::String(text, StringFormat::Literal)]),
                Operation::new("ET", vec![]),
            ],
        };
        let page = scan(&content.encode().unwrap(), resources);
        assert_eq!(page.content.text_runs[0].text, "file");
    }

    #[test]
    fn test_image_and_form_placements() {
        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2i64,
                "Height" => 2i64,
                "BitsPerComponent" => 8i64,
                "ColorSpace" => "DeviceGray",
            },
            vec![0, 255, 255, 0],
        );
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 100.into(), 20.into()],
                "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 10.into(), 10.into()],
            },
            b"BT /F1 10 Tf (DRAFT) Tj ET".to_vec(),
        );
        let page = scan_with(
            b"q 200 0 0 100 50 60 cm /Im1 Do Q q 1 0 0 1 100 100 cm /Fm1 Do Q",
            |doc| {
                let image_id = doc.add_object(image);
                let form_id = doc.add_object(form);
                let mut resources = font_resources();
                resources.set("XObject", dictionary! { "Im1" => image_id, "Fm1" => form_id });
                resources
            },
        );
        let placements = &page.content.placements;
        assert_eq!(placements.len(), 2);

        assert_eq!(placements[0].kind, XObjectKind::Image);
        assert_eq!(placements[0].rect, Rect::new(50.0, 60.0, 200.0, 100.0));
        assert!(placements[0].phash.is_some());

        assert_eq!(placements[1].kind, XObjectKind::Form);
        assert_eq!(placements[1].rect, Rect::new(110.0, 110.0, 100.0, 20.0));
        assert_eq!(placements[1].inner_text.len(), 1);
        assert_eq!(placements[1].inner_text[0].text, "DRAFT");
    }

    #[test]
    fn test_marked_regions() {
        let mut resources = font_resources();
        resources.set(
            "Properties",
            dictionary! {
                "oc1" => dictionary! {
                    "Type" => "OCG",
                    "Name" => Object::string_literal("Watermark"),
                },
            },
        );
        let content = b"/Artifact <</Type /Pagination /Subtype /Watermark>> BDC \
                        BT /F1 40 Tf (SAMPLE) Tj ET EMC \
                        /OC /oc1 BDC 0 0 m 10 10 l S EMC \
                        /Span <</ActualText (x)>> BDC BT (body) Tj ET EMC";
        let page = scan(content, resources);
        let regions = &page.content.regions;
        assert_eq!(regions.len(), 2);
        assert_eq!(
            regions[0].kind,
            RegionKind::Artifact {
                subtype: Some("Watermark".into())
            }
        );
        assert_eq!((regions[0].start, regions[0].end), (0, 5));
        assert_eq!(
            regions[1].kind,
            RegionKind::OptionalContent {
                layer: "Watermark".into()
            }
        );
    }
}
