//! Source document model.
//!
//! Wraps a parsed `lopdf::Document` together with the exact bytes it was
//! parsed from. The bytes are what an incremental update builds on; the parsed
//! model is only read, never re-serialized.

use crate::error::{Error, Result};
use crate::geometry::Rect;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;

/// Maximum depth followed through `/Parent` links and reference chains.
const MAX_RECURSION_DEPTH: u32 = 32;

/// US Letter, used when no page box is found anywhere in the page tree.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// A parsed PDF together with its original bytes.
///
/// # Example
///
/// ```no_run
/// use pades_signer::document::SourceDocument;
///
/// let doc = SourceDocument::open("prescription.pdf")?;
/// println!("Page count: {}", doc.page_count());
/// # Ok::<(), pades_signer::Error>(())
/// ```
pub struct SourceDocument {
    bytes: Vec<u8>,
    doc: Document,
}

impl std::fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDocument")
            .field("bytes", &format!("{} bytes", self.bytes.len()))
            .field("objects", &self.doc.objects.len())
            .finish()
    }
}

impl SourceDocument {
    /// Parse a document from memory.
    ///
    /// Encrypted documents and documents without pages are rejected with
    /// [`Error::DocumentFormat`].
    pub fn load(bytes: &[u8]) -> Result<Self> {
        let doc = Document::load_mem(bytes)?;

        if doc.trailer.has(b"Encrypt") {
            return Err(Error::DocumentFormat(
                "encrypted documents cannot be signed".to_string(),
            ));
        }

        let source = Self {
            bytes: bytes.to_vec(),
            doc,
        };
        if source.page_count() == 0 {
            return Err(Error::DocumentFormat("document has no pages".to_string()));
        }

        log::debug!(
            "Loaded document: {} bytes, {} objects, {} pages",
            source.bytes.len(),
            source.doc.objects.len(),
            source.page_count()
        );
        Ok(source)
    }

    /// Read and parse a document from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::load(&bytes)
    }

    /// The exact bytes the document was parsed from.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The parsed object model.
    pub fn inner(&self) -> &Document {
        &self.doc
    }

    /// The trailer dictionary of the latest revision.
    pub fn trailer(&self) -> &Dictionary {
        &self.doc.trailer
    }

    /// Number of pages.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Object id of the page at zero-based `index`.
    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        let pages = self.doc.get_pages();
        let number = u32::try_from(index + 1)
            .map_err(|_| Error::DocumentFormat(format!("page index {} out of range", index)))?;
        pages.get(&number).copied().ok_or_else(|| {
            Error::DocumentFormat(format!(
                "page index {} out of range (document has {} pages)",
                index,
                pages.len()
            ))
        })
    }

    /// Dictionary of the page object `page_id`.
    pub fn page_dict(&self, page_id: ObjectId) -> Result<&Dictionary> {
        Ok(self.doc.get_object(page_id)?.as_dict()?)
    }

    /// The page's MediaBox, following `/Parent` inheritance.
    pub fn media_box(&self, page_id: ObjectId) -> Result<Rect> {
        let mut dict = self.page_dict(page_id)?;
        for _ in 0..MAX_RECURSION_DEPTH {
            if let Ok(media_box) = dict.get(b"MediaBox") {
                if let Some(rect) = self.resolve(media_box).ok().and_then(rect_from_array) {
                    return Ok(rect);
                }
            }
            match dict.get(b"Parent").and_then(Object::as_reference) {
                Ok(parent) => dict = self.doc.get_object(parent)?.as_dict()?,
                Err(_) => break,
            }
        }
        let [x0, y0, x1, y1] = DEFAULT_MEDIA_BOX;
        log::debug!("Page {:?} has no MediaBox, assuming US Letter", page_id);
        Ok(Rect::from_points(x0, y0, x1, y1))
    }

    /// Object id of the document catalog.
    pub fn catalog_id(&self) -> Result<ObjectId> {
        Ok(self.doc.trailer.get(b"Root")?.as_reference()?)
    }

    /// The document catalog.
    pub fn catalog(&self) -> Result<&Dictionary> {
        Ok(self.doc.catalog()?)
    }

    /// Follow references until a direct object is reached.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_RECURSION_DEPTH {
            match current {
                Object::Reference(id) => current = self.doc.get_object(*id)?,
                other => return Ok(other),
            }
        }
        Err(Error::DocumentFormat("reference chain too deep".to_string()))
    }

    /// First object number that is free in every earlier revision.
    pub fn next_object_id(&self) -> u32 {
        let size = self
            .doc
            .trailer
            .get(b"Size")
            .and_then(Object::as_i64)
            .ok()
            .and_then(|size| u32::try_from(size).ok())
            .unwrap_or(0);
        size.saturating_sub(1).max(self.doc.max_id) + 1
    }

    /// The interactive form dictionary, if the catalog has one.
    pub fn acro_form(&self) -> Option<&Dictionary> {
        let catalog = self.catalog().ok()?;
        let form = catalog.get(b"AcroForm").ok()?;
        self.resolve(form).ok()?.as_dict().ok()
    }

    /// Fully qualified names of the top-level AcroForm fields.
    pub fn field_names(&self) -> Vec<String> {
        let Some(form) = self.acro_form() else {
            return Vec::new();
        };
        let Some(fields) = form
            .get(b"Fields")
            .ok()
            .and_then(|f| self.resolve(f).ok())
            .and_then(|f| f.as_array().ok())
        else {
            return Vec::new();
        };

        fields
            .iter()
            .filter_map(|field| self.resolve(field).ok()?.as_dict().ok())
            .filter_map(|dict| match dict.get(b"T") {
                Ok(Object::String(name, _)) => Some(decode_text_string(name)),
                _ => None,
            })
            .collect()
    }
}

/// Decode a PDF text string: UTF-16BE with byte order mark, else Latin-1.
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        },
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Parse a four-number rectangle array.
pub(crate) fn rect_from_array(obj: &Object) -> Option<Rect> {
    let arr = obj.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let values: Vec<f32> = arr.iter().filter_map(number).collect();
    match values.as_slice() {
        [x0, y0, x1, y1] => Some(Rect::from_points(*x0, *y0, *x1, *y1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    fn build(media_box_on_page: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"".to_vec()));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        };
        if media_box_on_page {
            page.set("MediaBox", vec![10.into(), 20.into(), 605.into(), 862.into()]);
        }
        let page_id = doc.add_object(page);
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
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
    fn test_load_and_pages() {
        let doc = SourceDocument::load(&build(false)).unwrap();
        assert_eq!(doc.page_count(), 1);
        assert!(doc.page_id(0).is_ok());
        assert!(matches!(doc.page_id(1), Err(Error::DocumentFormat(_))));
    }

    #[test]
    fn test_media_box_inherited() {
        let doc = SourceDocument::load(&build(false)).unwrap();
        let rect = doc.media_box(doc.page_id(0).unwrap()).unwrap();
        assert_eq!(rect, Rect::new(0.0, 0.0, 595.0, 842.0));
    }

    #[test]
    fn test_media_box_on_page_wins() {
        let doc = SourceDocument::load(&build(true)).unwrap();
        let rect = doc.media_box(doc.page_id(0).unwrap()).unwrap();
        assert_eq!(rect, Rect::from_points(10.0, 20.0, 605.0, 862.0));
    }

    #[test]
    fn test_next_object_id_past_existing() {
        let doc = SourceDocument::load(&build(false)).unwrap();
        assert!(doc.next_object_id() > doc.inner().max_id);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            SourceDocument::load(b"definitely not a pdf"),
            Err(Error::DocumentFormat(_))
        ));
    }

    #[test]
    fn test_no_fields_without_acroform() {
        let doc = SourceDocument::load(&build(false)).unwrap();
        assert!(doc.acro_form().is_none());
        assert!(doc.field_names().is_empty());
    }

    #[test]
    fn test_decode_text_string() {
        assert_eq!(decode_text_string(b"Signature1"), "Signature1");
        assert_eq!(decode_text_string(&[0xFE, 0xFF, 0x00, 0x4A, 0x00, 0xE3]), "J\u{e3}");
        assert_eq!(decode_text_string(&[0x4A, 0xE3]), "J\u{e3}");
    }

    #[test]
    fn test_rect_from_array() {
        let arr = Object::Array(vec![100.into(), 50.into(), Object::Real(0.0), 0.into()]);
        assert_eq!(rect_from_array(&arr), Some(Rect::new(0.0, 0.0, 100.0, 50.0)));
        assert_eq!(rect_from_array(&Object::Array(vec![1.into()])), None);
    }
}
