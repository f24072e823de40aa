//! Signature placeholder insertion.
//!
//! Adds a signature field with a visible stamp and a reserved `/Contents`
//! slot to a document, written as a single incremental update. The returned
//! [`PreparedDocument`] records where the slot is so the signer can splice the
//! CMS container in without re-serializing anything.

use super::byterange::ByteRangeCalculator;
use super::types::{SignatureSubFilter, StampDescriptor};
use crate::config::{PageSelector, StampLabels, DEFAULT_RESERVED_CAPACITY};
use crate::document::SourceDocument;
use crate::error::{Error, Result};
use crate::geometry::{Rect, SignatureGeometry};
use crate::writer::incremental::IncrementalWriter;
use crate::writer::object_serializer::{rect_array, text_string, ObjectSerializer};
use crate::writer::signature_stamp::{build_stamp, render_appearance};
use chrono::{DateTime, FixedOffset};
use lopdf::{dictionary, Dictionary, Object, ObjectId};
use std::collections::HashSet;
use std::io::Write;

/// Annotation flags: Print | Locked.
const WIDGET_FLAGS: i64 = 4 | 128;

/// AcroForm flags: SignaturesExist | AppendOnly.
const SIG_FLAGS: i64 = 3;

/// What to insert and where.
#[derive(Debug, Clone)]
pub struct PlaceholderRequest {
    /// Page receiving the widget
    pub page: PageSelector,
    /// Explicit widget rectangle; resolved from `geometry` when absent
    pub rect: Option<Rect>,
    /// Block geometry for the default rectangle
    pub geometry: SignatureGeometry,
    /// Values shown in the stamp and written to the signature dictionary
    pub descriptor: StampDescriptor,
    /// Fixed stamp texts
    pub labels: StampLabels,
    /// Size of the `/Contents` slot in bytes
    pub reserved_capacity: usize,
    /// `/SubFilter` of the signature dictionary
    pub sub_filter: SignatureSubFilter,
    /// Field name; a unique `{prefix}{n}` name is generated when absent
    pub field_name: Option<String>,
}

impl PlaceholderRequest {
    /// A request with default placement and capacity.
    pub fn new(descriptor: StampDescriptor) -> Self {
        Self {
            page: PageSelector::Last,
            rect: None,
            geometry: SignatureGeometry::default(),
            descriptor,
            labels: StampLabels::default(),
            reserved_capacity: DEFAULT_RESERVED_CAPACITY,
            sub_filter: SignatureSubFilter::default(),
            field_name: None,
        }
    }

    /// Set the target page.
    pub fn with_page(mut self, page: PageSelector) -> Self {
        self.page = page;
        self
    }

    /// Use an explicit widget rectangle.
    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }

    /// Set the geometry used when no rectangle is given.
    pub fn with_geometry(mut self, geometry: SignatureGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the stamp labels.
    pub fn with_labels(mut self, labels: StampLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Set the reserved capacity in bytes.
    pub fn with_reserved_capacity(mut self, capacity: usize) -> Self {
        self.reserved_capacity = capacity;
        self
    }

    /// Set the sub-filter.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Set the field name.
    pub fn with_field_name(mut self, name: impl Into<String>) -> Self {
        self.field_name = Some(name.into());
        self
    }
}

/// A document with a reserved, not yet filled signature slot.
#[derive(Clone)]
pub struct PreparedDocument {
    /// Document bytes, ByteRange already final
    pub bytes: Vec<u8>,
    /// `[0, a, b, c]` around the `/Contents` placeholder
    pub byte_range: [usize; 4],
    /// Offset of the `<` opening the placeholder
    pub contents_offset: usize,
    /// Reserved capacity in bytes
    pub reserved_capacity: usize,
    /// Name of the new signature field
    pub field_name: String,
    /// Zero-based page index of the widget
    pub page_index: usize,
    /// Widget rectangle
    pub rect: Rect,
}

impl std::fmt::Debug for PreparedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedDocument")
            .field("bytes", &format!("{} bytes", self.bytes.len()))
            .field("byte_range", &self.byte_range)
            .field("contents_offset", &self.contents_offset)
            .field("reserved_capacity", &self.reserved_capacity)
            .field("field_name", &self.field_name)
            .field("page_index", &self.page_index)
            .field("rect", &self.rect)
            .finish()
    }
}

/// Inserts signature placeholders.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderInserter;

impl PlaceholderInserter {
    /// Create an inserter.
    pub fn new() -> Self {
        Self
    }

    /// Add a signature field, widget and reserved slot to `source`.
    ///
    /// The original bytes are copied unchanged and the new objects appended
    /// as one revision. Fails with [`Error::DocumentFormat`] when the page
    /// selector does not resolve.
    pub fn insert(
        &self,
        source: &SourceDocument,
        request: &PlaceholderRequest,
    ) -> Result<PreparedDocument> {
        if request.reserved_capacity == 0 {
            return Err(Error::Unsupported("reserved capacity must be positive".to_string()));
        }

        let page_count = source.page_count();
        let page_index = request.page.resolve(page_count).ok_or_else(|| {
            Error::DocumentFormat(format!(
                "page {:?} out of range (document has {} pages)",
                request.page, page_count
            ))
        })?;
        let page_id = source.page_id(page_index)?;
        let rect = match request.rect {
            Some(rect) => rect,
            None => request.geometry.resolve(&source.media_box(page_id)?),
        };

        let stamp = build_stamp(rect, &request.descriptor, &request.labels)?;
        let field_name = match &request.field_name {
            Some(name) => name.clone(),
            None => unique_field_name(&request.labels.field_name_prefix, &source.field_names()),
        };

        let first_id = source.next_object_id();
        let sig_id: ObjectId = (first_id, 0);
        let widget_id: ObjectId = (first_id + 1, 0);
        let form_id: ObjectId = (first_id + 2, 0);
        let image_id: ObjectId = (first_id + 3, 0);
        let acro_form_id: ObjectId = (first_id + 4, 0);

        let appearance = render_appearance(&stamp, image_id)?;

        let widget = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
            "Rect" => rect_array(&rect),
            "P" => page_id,
            "T" => text_string(&field_name),
            "V" => sig_id,
            "F" => WIDGET_FLAGS,
            "AP" => dictionary! { "N" => form_id },
        };

        let mut writer = IncrementalWriter::new(source.bytes())?;
        writer.add_object(widget_id, &Object::Dictionary(widget))?;
        writer.add_object(form_id, &Object::Stream(appearance.form))?;
        writer.add_object(image_id, &Object::Stream(appearance.image))?;
        writer.add_object(page_id, &Object::Dictionary(page_with_widget(source, page_id, widget_id)?))?;
        for (id, object) in form_revisions(source, widget_id, acro_form_id)? {
            writer.add_object(id, &object)?;
        }

        let calculator = ByteRangeCalculator::new(request.reserved_capacity);
        let body = signature_dictionary_body(request, &calculator)?;
        let body_offset = writer.add_raw_object(sig_id, &body.bytes)?;
        let slot_offset = body_offset + body.slot_offset;
        let contents_offset = body_offset + body.contents_offset;

        let mut bytes = writer.finish(source.trailer())?;
        let byte_range = calculator.calculate_byte_range(bytes.len(), contents_offset)?;
        ByteRangeCalculator::patch_byte_range(&mut bytes, slot_offset, &byte_range)?;

        log::debug!(
            "Placeholder inserted: field '{}' on page {}, /Contents at {}, ByteRange {:?}",
            field_name,
            page_index,
            contents_offset,
            byte_range
        );

        Ok(PreparedDocument {
            bytes,
            byte_range,
            contents_offset,
            reserved_capacity: request.reserved_capacity,
            field_name,
            page_index,
            rect,
        })
    }
}

/// First `{prefix}{n}` not already used, counting from one.
fn unique_field_name(prefix: &str, existing: &[String]) -> String {
    let taken: HashSet<&str> = existing.iter().map(String::as_str).collect();
    (1..)
        .map(|n| format!("{}{}", prefix, n))
        .find(|name| !taken.contains(name.as_str()))
        .unwrap_or_else(|| prefix.to_string())
}

/// PDF date string `D:YYYYMMDDHHmmSS+HH'mm'`.
pub fn pdf_date(time: &DateTime<FixedOffset>) -> String {
    let offset = time.offset().local_minus_utc();
    let sign = if offset < 0 { '-' } else { '+' };
    let minutes = offset.abs() / 60;
    format!(
        "D:{}{}{:02}'{:02}'",
        time.format("%Y%m%d%H%M%S"),
        sign,
        minutes / 60,
        minutes % 60
    )
}

struct SignatureBody {
    bytes: Vec<u8>,
    slot_offset: usize,
    contents_offset: usize,
}

/// Serialize the signature dictionary with the ByteRange slot and the
/// `/Contents` placeholder appended as raw text.
fn signature_dictionary_body(
    request: &PlaceholderRequest,
    calculator: &ByteRangeCalculator,
) -> Result<SignatureBody> {
    let descriptor = &request.descriptor;
    let mut dict = dictionary! {
        "Type" => "Sig",
        "Filter" => "Adobe.PPKLite",
        "SubFilter" => Object::Name(request.sub_filter.as_pdf_name().as_bytes().to_vec()),
        "Name" => text_string(&descriptor.signer_name),
        "M" => Object::string_literal(pdf_date(&descriptor.signing_time)),
    };
    for (key, value) in [
        ("Reason", &descriptor.reason),
        ("Location", &descriptor.location),
        ("ContactInfo", &descriptor.contact),
    ] {
        if !value.is_empty() {
            dict.set(key, text_string(value));
        }
    }
    dict.set(
        "Prop_Build",
        dictionary! {
            "App" => dictionary! {
                "Name" => Object::Name(crate::NAME.as_bytes().to_vec()),
                "REx" => Object::string_literal(crate::VERSION),
            },
        },
    );

    let mut bytes = Vec::new();
    write!(bytes, "<<")?;
    ObjectSerializer::compact().write_dictionary_entries(&mut bytes, &dict)?;
    write!(bytes, " /ByteRange ")?;
    let slot_offset = bytes.len();
    bytes.extend_from_slice(ByteRangeCalculator::slot_marker().as_bytes());
    write!(bytes, " /Contents ")?;
    let contents_offset = bytes.len();
    bytes.extend_from_slice(calculator.generate_placeholder().as_bytes());
    write!(bytes, " >>")?;

    Ok(SignatureBody {
        bytes,
        slot_offset,
        contents_offset,
    })
}

/// New revision of the page dictionary with the widget appended to `/Annots`.
fn page_with_widget(
    source: &SourceDocument,
    page_id: ObjectId,
    widget_id: ObjectId,
) -> Result<Dictionary> {
    let mut page = source.page_dict(page_id)?.clone();
    let mut annots = match page.get(b"Annots") {
        Ok(annots) => source.resolve(annots)?.as_array()?.clone(),
        Err(_) => Vec::new(),
    };
    annots.push(Object::Reference(widget_id));
    page.set("Annots", annots);
    Ok(page)
}

/// Objects registering the field with the interactive form.
///
/// An indirect AcroForm gets a new revision of its own; otherwise the
/// catalog is revised to point at a new AcroForm object. Existing fields are
/// kept.
fn form_revisions(
    source: &SourceDocument,
    widget_id: ObjectId,
    new_form_id: ObjectId,
) -> Result<Vec<(ObjectId, Object)>> {
    let catalog = source.catalog()?;
    let existing_ref = catalog.get(b"AcroForm").and_then(Object::as_reference).ok();

    let mut form = source.acro_form().cloned().unwrap_or_default();
    let mut fields = match form.get(b"Fields") {
        Ok(fields) => source.resolve(fields)?.as_array()?.clone(),
        Err(_) => Vec::new(),
    };
    fields.push(Object::Reference(widget_id));
    form.set("Fields", fields);
    form.set("SigFlags", SIG_FLAGS);

    if let Some(form_id) = existing_ref {
        return Ok(vec![(form_id, Object::Dictionary(form))]);
    }

    let mut catalog = catalog.clone();
    catalog.set("AcroForm", new_form_id);
    Ok(vec![
        (new_form_id, Object::Dictionary(form)),
        (source.catalog_id()?, Object::Dictionary(catalog)),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pdf_date() {
        let tz = FixedOffset::west_opt(3 * 3600).unwrap();
        let time = tz.with_ymd_and_hms(2024, 5, 17, 14, 30, 5).unwrap();
        assert_eq!(pdf_date(&time), "D:20240517143005-03'00'");

        let ist = FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap();
        let time = ist.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(pdf_date(&time), "D:20240102030405+05'30'");
    }

    #[test]
    fn test_unique_field_name() {
        assert_eq!(unique_field_name("Signature", &[]), "Signature1");
        let existing = vec!["Signature1".to_string(), "Patient".to_string()];
        assert_eq!(unique_field_name("Signature", &existing), "Signature2");
        let existing = vec!["Signature2".to_string()];
        assert_eq!(unique_field_name("Signature", &existing), "Signature1");
    }

    #[test]
    fn test_signature_body_offsets() {
        let time = FixedOffset::east_opt(0).unwrap().with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = PlaceholderRequest::new(
            StampDescriptor::new("Dr. Ana Souza", time).with_reason("Prescription"),
        )
        .with_reserved_capacity(8);
        let calculator = ByteRangeCalculator::new(8);
        let body = signature_dictionary_body(&request, &calculator).unwrap();

        let text = String::from_utf8(body.bytes.clone()).unwrap();
        assert!(text.starts_with("<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached"));
        assert!(text.contains("/Reason (Prescription)"));
        assert!(!text.contains("/Location"));
        assert!(text.contains("/M (D:20240101000000+00'00')"));
        assert!(text.contains("/Prop_Build"));
        assert_eq!(&body.bytes[body.slot_offset..body.slot_offset + 3], b"[0 ");
        assert_eq!(
            &body.bytes[body.contents_offset..body.contents_offset + 18],
            b"<0000000000000000>"
        );
        assert!(text.ends_with(" >>"));
    }
}
