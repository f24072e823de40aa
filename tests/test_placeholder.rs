//! Integration tests for signature placeholder insertion.
//!
//! Tests the prepared (not yet signed) document:
//! - Append-only revision over the original bytes
//! - Field registration next to existing AcroForm fields
//! - Widget placement on pages of different sizes
//! - ByteRange and `/Contents` slot layout

mod common;

use common::*;
use lopdf::{Document, Object};
use pades_signer::config::PageSelector;
use pades_signer::document::SourceDocument;
use pades_signer::error::Error;
use pades_signer::geometry::Rect;
use pades_signer::signatures::{
    PlaceholderInserter, PlaceholderRequest, PreparedDocument, StampDescriptor,
};
use pades_signer::writer::{build_stamp, stamp_payload};
use pades_signer::StampLabels;

fn descriptor() -> StampDescriptor {
    StampDescriptor::new("Dr. Ana Souza", signing_time())
        .with_registry_id("CRM-SP 123456")
        .with_contact("clinic@example.com")
}

fn prepare(pdf: &[u8], request: &PlaceholderRequest) -> pades_signer::Result<PreparedDocument> {
    let source = SourceDocument::load(pdf)?;
    PlaceholderInserter::new().insert(&source, request)
}

/// The widget dictionary of the prepared signature field.
fn widget(prepared: &PreparedDocument) -> lopdf::Dictionary {
    let doc = Document::load_mem(&prepared.bytes).unwrap();
    doc.objects
        .values()
        .filter_map(|obj| obj.as_dict().ok())
        .find(|dict| {
            matches!(dict.get(b"FT"), Ok(Object::Name(ft)) if ft == b"Sig")
                && matches!(dict.get(b"Subtype"), Ok(Object::Name(s)) if s == b"Widget")
        })
        .cloned()
        .expect("signature widget")
}

mod layout_tests {
    use super::*;

    #[test]
    fn test_original_bytes_unchanged() {
        init_logging();
        let pdf = simple_pdf();
        let prepared = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();
        assert!(prepared.bytes.starts_with(&pdf));
        assert!(prepared.bytes.len() > pdf.len());
    }

    #[test]
    fn test_byte_range_brackets_zero_slot() {
        let prepared = prepare(&simple_pdf(), &PlaceholderRequest::new(descriptor())).unwrap();
        let [start, a, b, c] = prepared.byte_range;

        assert_eq!(start, 0);
        assert_eq!(a, prepared.contents_offset);
        assert_eq!(b - a, 2 * prepared.reserved_capacity + 2);
        assert_eq!(b + c, prepared.bytes.len());
        assert_eq!(prepared.bytes[a], b'<');
        assert_eq!(prepared.bytes[b - 1], b'>');
        assert!(prepared.bytes[a + 1..b - 1].iter().all(|&byte| byte == b'0'));
    }

    #[test]
    fn test_custom_capacity() {
        let request = PlaceholderRequest::new(descriptor()).with_reserved_capacity(4096);
        let prepared = prepare(&simple_pdf(), &request).unwrap();
        assert_eq!(prepared.reserved_capacity, 4096);
        assert_eq!(prepared.byte_range[2] - prepared.byte_range[1], 8194);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let request = PlaceholderRequest::new(descriptor()).with_reserved_capacity(0);
        assert!(matches!(prepare(&simple_pdf(), &request), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_prepared_document_reloads() {
        let prepared = prepare(&simple_pdf(), &PlaceholderRequest::new(descriptor())).unwrap();
        let doc = Document::load_mem(&prepared.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let source = SourceDocument::load(&prepared.bytes).unwrap();
        assert_eq!(source.field_names(), vec!["Signature1".to_string()]);
    }

    #[test]
    fn test_widget_flags_and_appearance() {
        let prepared = prepare(&simple_pdf(), &PlaceholderRequest::new(descriptor())).unwrap();
        let widget = widget(&prepared);

        assert_eq!(widget.get(b"F").unwrap().as_i64().unwrap(), 132);
        assert!(widget.get(b"AP").unwrap().as_dict().unwrap().has(b"N"));
        assert!(widget.get(b"V").unwrap().as_reference().is_ok());
    }
}

mod acroform_tests {
    use super::*;

    #[test]
    fn test_existing_fields_preserved() {
        let pdf = TestPdf::default().with_field("PatientName").build();
        let prepared = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();

        let names = field_names(&prepared.bytes);
        assert!(names.contains(&"PatientName".to_string()));
        assert!(names.contains(&"Signature1".to_string()));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_existing_annotations_preserved() {
        let pdf = TestPdf::default().with_field("PatientName").build();
        let prepared = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();

        let doc = Document::load_mem(&prepared.bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        assert_eq!(page.get(b"Annots").unwrap().as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_sig_flags_set() {
        let prepared = prepare(&simple_pdf(), &PlaceholderRequest::new(descriptor())).unwrap();
        let doc = Document::load_mem(&prepared.bytes).unwrap();
        let catalog = doc.catalog().unwrap();
        let form = match catalog.get(b"AcroForm").unwrap() {
            Object::Reference(id) => doc.get_dictionary(*id).unwrap(),
            Object::Dictionary(dict) => dict,
            other => panic!("unexpected AcroForm {:?}", other),
        };
        assert_eq!(form.get(b"SigFlags").unwrap().as_i64().unwrap(), 3);
    }

    #[test]
    fn test_explicit_field_name() {
        let request = PlaceholderRequest::new(descriptor()).with_field_name("Assinatura Médica");
        let prepared = prepare(&simple_pdf(), &request).unwrap();
        assert_eq!(prepared.field_name, "Assinatura Médica");
        assert_eq!(field_names(&prepared.bytes), vec!["Assinatura Médica".to_string()]);
    }

    #[test]
    fn test_generated_name_skips_taken() {
        let pdf = TestPdf::default().with_field("Signature1").build();
        let prepared = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();
        assert_eq!(prepared.field_name, "Signature2");
    }
}

mod placement_tests {
    use super::*;

    #[test]
    fn test_default_rect_on_a4() {
        let prepared = prepare(&simple_pdf(), &PlaceholderRequest::new(descriptor())).unwrap();
        let margin = 595.0 * 10.0 / 210.0;

        assert!((prepared.rect.x0() - margin).abs() < 1e-3);
        assert!((prepared.rect.y0() - margin).abs() < 1e-3);
        assert!((prepared.rect.width - (595.0 - 2.0 * margin)).abs() < 1e-3);
        assert_eq!(prepared.rect.height, 80.0);
    }

    #[test]
    fn test_double_width_page_doubles_rect_width() {
        let narrow = prepare(&simple_pdf(), &PlaceholderRequest::new(descriptor())).unwrap();
        let wide_pdf = TestPdf::default().size(2 * A4.0, A4.1).build();
        let wide = prepare(&wide_pdf, &PlaceholderRequest::new(descriptor())).unwrap();

        assert!((wide.rect.width - 2.0 * narrow.rect.width).abs() < 1e-2);
        assert_eq!(wide.rect.height, narrow.rect.height);
    }

    #[test]
    fn test_explicit_rect() {
        let rect = Rect::new(100.0, 100.0, 300.0, 90.0);
        let request = PlaceholderRequest::new(descriptor()).with_rect(rect);
        let prepared = prepare(&simple_pdf(), &request).unwrap();
        assert_eq!(prepared.rect, rect);

        let widget = widget(&prepared);
        let corners: Vec<f32> = widget
            .get(b"Rect")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect();
        assert_eq!(corners, vec![100.0, 100.0, 400.0, 190.0]);
    }

    #[test]
    fn test_selected_page() {
        let pdf = TestPdf::default().pages(3).build();
        let request = PlaceholderRequest::new(descriptor()).with_page(PageSelector::Index(1));
        let prepared = prepare(&pdf, &request).unwrap();
        assert_eq!(prepared.page_index, 1);

        let last = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();
        assert_eq!(last.page_index, 2);
    }

    #[test]
    fn test_page_out_of_range() {
        let request = PlaceholderRequest::new(descriptor()).with_page(PageSelector::Index(1));
        assert!(matches!(prepare(&simple_pdf(), &request), Err(Error::DocumentFormat(_))));
    }
}

mod stamp_tests {
    use super::*;

    #[test]
    fn test_stamp_is_deterministic() {
        let rect = Rect::new(28.0, 28.0, 539.0, 80.0);
        let labels = StampLabels::default();
        let first = build_stamp(rect, &descriptor(), &labels).unwrap();
        let second = build_stamp(rect, &descriptor(), &labels).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_payload_lists_signer_fields() {
        let payload = stamp_payload(&descriptor());
        assert!(payload.contains("Dr. Ana Souza"));
        assert!(payload.contains("CRM-SP 123456"));
        assert!(payload.contains("clinic@example.com"));
    }

    #[test]
    fn test_prepared_bytes_are_deterministic() {
        let pdf = simple_pdf();
        let first = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();
        let second = prepare(&pdf, &PlaceholderRequest::new(descriptor())).unwrap();
        assert_eq!(first.bytes, second.bytes);
    }
}
