//! PDF backend layer.
//!
//! Wraps `lopdf::Document` with the handful of operations the cleaner needs:
//! page enumeration, content stream access, resource lookup, annotation
//! editing, content replacement and serialisation.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId, Stream};

use crate::detect::sniff_version;
use crate::error::{Error, Result};
use crate::model::AnnotationInfo;

/// Page identifier: (object number, generation number).
pub type PageId = ObjectId;

/// Guards walks over `/Parent` chains and reference chains in broken files.
const MAX_CHAIN_DEPTH: usize = 32;

/// A loaded PDF document.
pub struct PdfDocument {
    doc: LopdfDocument,
    modified: bool,
}

impl PdfDocument {
    /// Load from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self> {
        sniff_version(data)?;

        let doc = LopdfDocument::load_mem(data).map_err(|e| match e {
            lopdf::Error::Decryption(_) => Error::Encrypted,
            lopdf::Error::IO(e) => Error::Io(e),
            other => Error::CorruptDocument(other.to_string()),
        })?;

        // lopdf decrypts files with an empty user password while loading
        if doc.is_encrypted() && doc.encryption_state.is_none() {
            return Err(Error::Encrypted);
        }
        if doc.get_pages().is_empty() {
            return Err(Error::CorruptDocument("document has no pages".to_string()));
        }

        Ok(Self {
            doc,
            modified: false,
        })
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &LopdfDocument {
        &self.doc
    }

    /// Return all pages as (page_number → PageId).
    pub fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    /// Whether any page was rewritten since loading.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Follow references until a direct object is reached.
    pub fn resolve<'a>(&'a self, mut obj: &'a Object) -> Option<&'a Object> {
        for _ in 0..MAX_CHAIN_DEPTH {
            match obj {
                Object::Reference(id) => obj = self.doc.get_object(*id).ok()?,
                direct => return Some(direct),
            }
        }
        None
    }

    pub fn resolve_dict<'a>(&'a self, obj: &'a Object) -> Option<&'a Dictionary> {
        match self.resolve(obj)? {
            Object::Dictionary(dict) => Some(dict),
            Object::Stream(stream) => Some(&stream.dict),
            _ => None,
        }
    }

    fn page_dict(&self, page_id: PageId) -> Result<&Dictionary> {
        self.doc
            .get_dictionary(page_id)
            .map_err(|e| Error::Pdf(e.to_string()))
    }

    /// Look up an entry on the page or, failing that, on its ancestors.
    fn inherited<'a>(&'a self, page_id: PageId, key: &[u8]) -> Option<&'a Object> {
        let mut node = self.page_dict(page_id).ok()?;
        for _ in 0..MAX_CHAIN_DEPTH {
            if let Ok(value) = node.get(key) {
                return self.resolve(value);
            }
            node = self.resolve_dict(node.get(b"Parent").ok()?)?;
        }
        None
    }

    /// The resource dictionary in effect for a page.
    pub fn page_resources(&self, page_id: PageId) -> Option<&Dictionary> {
        match self.inherited(page_id, b"Resources")? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        }
    }

    /// Page `/MediaBox` as `[llx, lly, urx, ury]`.
    pub fn media_box(&self, page_id: PageId) -> Option<[f32; 4]> {
        let array = self.inherited(page_id, b"MediaBox")?.as_array().ok()?;
        if array.len() < 4 {
            return None;
        }
        let mut rect = [0.0f32; 4];
        for (slot, obj) in rect.iter_mut().zip(array) {
            *slot = super::matrix::get_number(self.resolve(obj)?)?;
        }
        Some(rect)
    }

    /// Look up `name` in a resource category such as `XObject` or `ExtGState`.
    pub fn resource<'a>(
        &'a self,
        resources: &'a Dictionary,
        category: &[u8],
        name: &[u8],
    ) -> Option<(Option<ObjectId>, &'a Object)> {
        let entries = self.resolve_dict(resources.get(category).ok()?)?;
        match entries.get(name).ok()? {
            Object::Reference(id) => {
                let target = self.doc.get_object(*id).ok()?;
                Some((Some(*id), self.resolve(target)?))
            }
            direct => Some((None, direct)),
        }
    }

    /// Return the decoded bytes of a page's content, joining multiple streams.
    pub fn page_content(&self, page_id: PageId) -> Result<Vec<u8>> {
        let page_dict = self.page_dict(page_id)?;
        let contents = match page_dict.get(b"Contents") {
            Ok(obj) => self
                .resolve(obj)
                .ok_or_else(|| Error::Pdf("dangling /Contents reference".to_string()))?,
            // A page without /Contents is blank
            Err(_) => return Ok(Vec::new()),
        };

        match contents {
            Object::Stream(s) => stream_bytes(s),
            Object::Array(arr) => {
                let mut content = Vec::new();
                for obj in arr {
                    if let Some(Object::Stream(s)) = self.resolve(obj) {
                        content.extend_from_slice(&stream_bytes(s)?);
                        content.push(b'\n');
                    }
                }
                Ok(content)
            }
            _ => Err(Error::Pdf("Invalid content stream".to_string())),
        }
    }

    /// Parse a page's content into operations.
    pub fn page_operations(&self, page_id: PageId) -> Result<Vec<Operation>> {
        let data = self.page_content(page_id)?;
        decode_operations(&data)
    }

    /// Annotations attached to a page.
    pub fn annotations(&self, page_id: PageId) -> Vec<AnnotationInfo> {
        let Ok(page_dict) = self.page_dict(page_id) else {
            return Vec::new();
        };
        let Some(Object::Array(annots)) = page_dict.get(b"Annots").ok().and_then(|o| self.resolve(o))
        else {
            return Vec::new();
        };

        annots
            .iter()
            .enumerate()
            .filter_map(|(index, obj)| {
                let dict = self.resolve_dict(obj)?;
                let subtype = dict.get(b"Subtype").ok()?.as_name().ok()?;
                Some(AnnotationInfo {
                    index,
                    subtype: String::from_utf8_lossy(subtype).to_string(),
                })
            })
            .collect()
    }

    /// Remove entries of a page's `/Annots` array by position.
    pub fn remove_annotations(&mut self, page_id: PageId, indices: &[usize]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let mut indices = indices.to_vec();
        indices.sort_unstable();
        indices.dedup();

        let indirect = match self.page_dict(page_id)?.get(b"Annots") {
            Ok(Object::Reference(id)) => Some(*id),
            Ok(_) => None,
            Err(_) => return Ok(()),
        };

        let annots = match indirect {
            Some(id) => self.doc.get_object_mut(id)?.as_array_mut()?,
            None => self
                .doc
                .get_object_mut(page_id)?
                .as_dict_mut()?
                .get_mut(b"Annots")?
                .as_array_mut()?,
        };
        for index in indices.into_iter().rev() {
            if index < annots.len() {
                annots.remove(index);
            }
        }
        let now_empty = annots.is_empty();

        if now_empty && indirect.is_none() {
            self.doc
                .get_object_mut(page_id)?
                .as_dict_mut()?
                .remove(b"Annots");
        }
        self.modified = true;
        Ok(())
    }

    /// Replace a page's content with a single new stream.
    pub fn replace_page_content(
        &mut self,
        page_id: PageId,
        operations: Vec<Operation>,
    ) -> Result<()> {
        let data = encode_operations(operations)?;
        let mut stream = Stream::new(Dictionary::new(), data);
        stream.compress()?;

        let stream_id = self.doc.add_object(stream);
        self.doc
            .get_object_mut(page_id)?
            .as_dict_mut()?
            .set("Contents", Object::Reference(stream_id));
        self.modified = true;
        Ok(())
    }

    /// Serialise the document.
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>> {
        if self.modified {
            // Objects were decrypted on load and are written back in the clear
            if self.doc.encryption_state.take().is_some() {
                self.doc.trailer.remove(b"Encrypt");
            }
            // Drop the content streams that were replaced
            self.doc.prune_objects();
        }
        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| Error::Pdf(e.to_string()))?;
        Ok(output)
    }
}

/// Bytes of a stream with its filters undone.
pub fn stream_bytes(stream: &Stream) -> Result<Vec<u8>> {
    if stream.dict.get(b"Filter").is_err() {
        return Ok(stream.content.clone());
    }
    stream
        .decompressed_content()
        .map_err(|e| Error::Pdf(e.to_string()))
}

/// Parse raw content stream bytes into a sequence of operations.
pub fn decode_operations(data: &[u8]) -> Result<Vec<Operation>> {
    Content::decode(data)
        .map(|content| content.operations)
        .map_err(|e| Error::Pdf(e.to_string()))
}

/// Serialise operations back into content stream bytes.
///
/// lopdf parses an inline image into a `BI` operation carrying a stream,
/// which `Content::encode` would write as an indirect-style stream. Those
/// are written out as `BI <entries> ID <data> EI` instead.
pub fn encode_operations(operations: Vec<Operation>) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut pending = Vec::new();

    for mut op in operations {
        if op.operator != "BI" || !matches!(op.operands.as_slice(), [Object::Stream(_)]) {
            pending.push(op);
            continue;
        }
        let Some(Object::Stream(image)) = op.operands.pop() else {
            continue;
        };

        let entries = image
            .dict
            .iter()
            .filter(|(key, _)| key.as_slice() != b"Length")
            .flat_map(|(key, value)| [Object::Name(key.clone()), value.clone()])
            .collect();
        pending.push(Operation::new("BI", vec![]));
        pending.push(Operation::new("ID", entries));
        flush_operations(&mut data, &mut pending)?;
        data.push(b' ');
        data.extend_from_slice(&image.content);
        data.extend_from_slice(b"\nEI");
    }
    flush_operations(&mut data, &mut pending)?;
    Ok(data)
}

fn flush_operations(data: &mut Vec<u8>, pending: &mut Vec<Operation>) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let encoded = Content {
        operations: std::mem::take(pending),
    }
    .encode()
    .map_err(|e| Error::Pdf(e.to_string()))?;
    if !data.is_empty() {
        data.push(b'\n');
    }
    data.extend_from_slice(&encoded);
    Ok(())
}

/// Simple text decoding fallback when no encoding is available.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    // Try UTF-16BE first (BOM marker)
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    // Fallback: Latin-1
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn two_page_pdf(annots: bool) -> Vec<u8> {
        let mut doc = LopdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(
            Dictionary::new(),
            b"BT /F1 12 Tf 72 700 Td (Hello) Tj ET".to_vec(),
        ));
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                },
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for _ in 0..2 {
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if annots {
                page.set(
                    "Annots",
                    vec![
                        Object::Dictionary(dictionary! { "Subtype" => "Link" }),
                        Object::Dictionary(dictionary! { "Subtype" => "Watermark" }),
                    ],
                );
            }
            kids.push(doc.add_object(page).into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => 2i64,
                "Resources" => resources_id,
                "MediaBox" => Object::Array(vec![0.into(), 0.into(), 612.into(), 792.into()]),
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_load_rejects_non_pdf() {
        let result = PdfDocument::load_bytes(b"hello world");
        assert!(matches!(result, Err(Error::CorruptDocument(_))));
    }

    #[test]
    fn test_load_rejects_truncated_pdf() {
        let result = PdfDocument::load_bytes(b"%PDF-1.4\n1 0 obj\n<< /Type");
        assert!(matches!(result, Err(Error::CorruptDocument(_))));
    }

    #[test]
    fn test_inherited_resources_and_media_box() {
        let pdf = PdfDocument::load_bytes(&two_page_pdf(false)).unwrap();
        let pages = pdf.pages();
        assert_eq!(pages.len(), 2);
        let page_id = pages[&1];

        let resources = pdf.page_resources(page_id).unwrap();
        assert!(pdf.resource(resources, b"Font", b"F1").is_some());
        assert!(pdf.resource(resources, b"Font", b"F2").is_none());
        assert_eq!(pdf.media_box(page_id), Some([0.0, 0.0, 612.0, 792.0]));
    }

    #[test]
    fn test_page_operations() {
        let pdf = PdfDocument::load_bytes(&two_page_pdf(false)).unwrap();
        let ops = pdf.page_operations(pdf.pages()[&1]).unwrap();
        let names: Vec<_> = ops.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(names, vec!["BT", "Tf", "Td", "Tj", "ET"]);
    }

    #[test]
    fn test_remove_annotations() {
        let mut pdf = PdfDocument::load_bytes(&two_page_pdf(true)).unwrap();
        let page_id = pdf.pages()[&2];
        let annots = pdf.annotations(page_id);
        assert_eq!(annots.len(), 2);
        assert_eq!(annots[1].subtype, "Watermark");

        pdf.remove_annotations(page_id, &[1]).unwrap();
        let annots = pdf.annotations(page_id);
        assert_eq!(annots.len(), 1);
        assert_eq!(annots[0].subtype, "Link");
        assert!(pdf.is_modified());
    }

    #[test]
    fn test_replace_content_roundtrip() {
        let mut pdf = PdfDocument::load_bytes(&two_page_pdf(false)).unwrap();
        let page_id = pdf.pages()[&1];
        let ops = vec![Operation::new("BT", vec![]), Operation::new("ET", vec![])];
        pdf.replace_page_content(page_id, ops).unwrap();
        let bytes = pdf.save_to_bytes().unwrap();

        let reloaded = PdfDocument::load_bytes(&bytes).unwrap();
        let pages = reloaded.pages();
        assert_eq!(reloaded.page_operations(pages[&1]).unwrap().len(), 2);
        // The second page still shares the original stream
        assert_eq!(reloaded.page_operations(pages[&2]).unwrap().len(), 5);
    }

    #[test]
    fn test_encode_inline_image() {
        let source = b"q 10 0 0 10 300 300 cm BI /W 2 /H 2 /CS /Gray /BPC 8 ID wxyz EI Q";
        let ops = decode_operations(source).unwrap();
        assert_eq!(ops[2].operator, "BI");

        let encoded = encode_operations(ops).unwrap();
        let text = String::from_utf8_lossy(&encoded);
        assert!(text.contains("BI"));
        assert!(text.contains(" ID wxyz\nEI"));
        assert!(!text.contains("stream"));
        assert!(!text.contains("Length"));

        let reparsed = decode_operations(&encoded).unwrap();
        let operators: Vec<&str> = reparsed.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators, vec!["q", "cm", "BI", "Q"]);
        match reparsed[2].operands.as_slice() {
            [Object::Stream(image)] => assert_eq!(image.content, b"wxyz"),
            other => panic!("unexpected inline image operands: {:?}", other),
        }
    }

    #[test]
    fn test_decode_text_simple() {
        assert_eq!(decode_text_simple(b"Hello"), "Hello");
        assert_eq!(decode_text_simple(&[0x48, 0x65, 0x6C, 0x6C, 0xE9]), "Hellé");
        assert_eq!(decode_text_simple(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
    }
}
