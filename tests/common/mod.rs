//! Shared helpers for the integration tests.

#![allow(dead_code)]

use chrono::{DateTime, FixedOffset, TimeZone};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pades_signer::signatures::byterange::hex_to_bytes;
use pades_signer::signatures::CertificateBundle;

/// Passphrase of every bundle under `tests/fixtures`.
pub const PASSPHRASE: &str = "clinic-passphrase";

/// A4 in points.
pub const A4: (i64, i64) = (595, 842);

/// Route `log` output to the test harness.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Raw bytes of a fixture file.
pub fn fixture_bytes(name: &str) -> Vec<u8> {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("failed to read {}: {}", path, e))
}

/// Bundle loaded from a fixture file.
pub fn bundle(name: &str) -> CertificateBundle {
    CertificateBundle::from_pkcs12_bytes(fixture_bytes(name)).unwrap()
}

/// Fixed signing time inside the validity window of all non-expired fixtures.
pub fn signing_time() -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 5, 17, 14, 30, 0)
        .unwrap()
}

/// Options for [`build_pdf`].
#[derive(Debug, Clone)]
pub struct TestPdf {
    pub pages: usize,
    pub width: i64,
    pub height: i64,
    pub existing_field: Option<String>,
}

impl Default for TestPdf {
    fn default() -> Self {
        Self {
            pages: 1,
            width: A4.0,
            height: A4.1,
            existing_field: None,
        }
    }
}

impl TestPdf {
    pub fn pages(mut self, pages: usize) -> Self {
        self.pages = pages;
        self
    }

    pub fn size(mut self, width: i64, height: i64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_field(mut self, name: &str) -> Self {
        self.existing_field = Some(name.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        build_pdf(self)
    }
}

/// Single A4 page with a line of text.
pub fn simple_pdf() -> Vec<u8> {
    TestPdf::default().build()
}

/// Build a small document with lopdf.
pub fn build_pdf(options: &TestPdf) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    let mut first_page: Option<ObjectId> = None;
    for index in 0..options.pages {
        let text = format!("BT /F1 12 Tf 72 720 Td (Prescription page {}) Tj ET", index + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, text.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(options.width),
                Object::Integer(options.height),
            ],
        });
        first_page.get_or_insert(page_id);
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    if let (Some(name), Some(page_id)) = (&options.existing_field, first_page) {
        let field_id = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal(name.as_str()),
            "Rect" => vec![
                Object::Integer(72),
                Object::Integer(600),
                Object::Integer(272),
                Object::Integer(620),
            ],
            "P" => page_id,
        });
        if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
            page.set("Annots", vec![Object::Reference(field_id)]);
        }
        catalog.set(
            "AcroForm",
            dictionary! { "Fields" => vec![Object::Reference(field_id)] },
        );
    }

    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    out
}

/// Names of all fields in the AcroForm of `pdf`.
pub fn field_names(pdf: &[u8]) -> Vec<String> {
    pades_signer::document::SourceDocument::load(pdf)
        .unwrap()
        .field_names()
}

/// Decoded `/Contents` value between the two signed spans, padding included.
pub fn signature_contents(pdf: &[u8], byte_range: &[usize; 4]) -> Vec<u8> {
    hex_to_bytes(&pdf[byte_range[1] + 1..byte_range[2] - 1]).unwrap()
}
