//! Visual signature stamp.
//!
//! Lays out the human readable block shown in the signature widget:
//!
//! ```text
//! +--------------------------------------------------+
//! | TITLE                                 TRUST MARK | header bar
//! +--------+-+---------------------------------------+
//! |        | | Signer name                           |
//! |   QR   | | Registry - Role                       |
//! |        | | Contact                               |
//! |        | | Signed at: 17/05/2024 14:30:00 -03:00 |
//! |        | | disclaimer (italic)                   |
//! +--------+-+---------------------------------------+
//! ```
//!
//! [`build_stamp`] is a pure function producing drawing primitives in page
//! coordinates; [`render_appearance`] turns them into a Form XObject.

use super::barcode::{BarcodeGenerator, QrCodeOptions, QrMatrix};
use super::content_stream::ContentStreamBuilder;
use super::object_serializer::rect_array;
use crate::config::StampLabels;
use crate::error::{Error, Result};
use crate::geometry::{Point, Rect};
use crate::signatures::types::StampDescriptor;
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use std::io::Write;

/// Height of the header bar in points.
pub const HEADER_HEIGHT: f32 = 14.0;
/// Inner padding in points.
pub const PADDING: f32 = 4.0;
/// Baseline distance of the text lines in points.
pub const LINE_HEIGHT: f32 = 10.0;
/// Maximum number of text lines in the column.
pub const MAX_TEXT_LINES: usize = 4;

const HEADER_FONT_SIZE: f32 = 8.0;
const TRUST_MARK_FONT_SIZE: f32 = 6.5;
const BODY_FONT_SIZE: f32 = 7.5;
const DISCLAIMER_FONT_SIZE: f32 = 5.5;
const DIVIDER_WIDTH: f32 = 0.5;

const HEADER_COLOR: [f32; 3] = [0.11, 0.27, 0.45];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
const TEXT_COLOR: [f32; 3] = [0.1, 0.1, 0.1];
const MUTED_COLOR: [f32; 3] = [0.4, 0.4, 0.4];

/// Format used for the signing time in the payload and the text block.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S %:z";

const ELLIPSIS: char = '\u{2026}';

/// Resource name of the QR image inside the appearance stream.
const QR_RESOURCE: &str = "Im1";

/// Base-14 font variants used by the stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    /// Helvetica
    Regular,
    /// Helvetica-Bold
    Bold,
    /// Helvetica-Oblique
    Italic,
}

impl FontStyle {
    /// Resource name used in content streams.
    pub fn resource_name(&self) -> &'static str {
        match self {
            FontStyle::Regular => "F1",
            FontStyle::Bold => "F2",
            FontStyle::Italic => "F3",
        }
    }

    /// PostScript name of the Base-14 font.
    pub fn base_font(&self) -> &'static str {
        match self {
            FontStyle::Regular => "Helvetica",
            FontStyle::Bold => "Helvetica-Bold",
            FontStyle::Italic => "Helvetica-Oblique",
        }
    }
}

/// A drawing primitive in page coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// Filled rectangle
    FillRect {
        /// Area to fill
        rect: Rect,
        /// RGB fill color
        color: [f32; 3],
    },
    /// Straight line
    Line {
        /// Start point
        from: Point,
        /// End point
        to: Point,
        /// Stroke width
        width: f32,
        /// RGB stroke color
        color: [f32; 3],
    },
    /// The QR raster scaled into a rectangle
    Image {
        /// Placement of the raster
        rect: Rect,
    },
    /// A single line of text
    Text {
        /// Text, already truncated to its column
        text: String,
        /// Baseline origin
        origin: Point,
        /// Font size in points
        size: f32,
        /// Font variant
        style: FontStyle,
        /// RGB fill color
        color: [f32; 3],
    },
}

/// Laid-out stamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    /// Outer rectangle (also the appearance BBox)
    pub rect: Rect,
    /// Drawing primitives in paint order
    pub ops: Vec<DrawOp>,
    /// Text encoded in the QR code
    pub payload: String,
    /// Encoded QR code
    pub qr: QrMatrix,
}

/// The newline-joined `key: value` payload encoded into the QR code.
///
/// This is the only place the descriptor is formatted for the QR code, so
/// the payload drawn before signing and after any redraw is identical.
pub fn stamp_payload(descriptor: &StampDescriptor) -> String {
    format!(
        "Name: {}\nRegistry: {}\nContact: {}\nSigned at: {}",
        descriptor.signer_name,
        descriptor.registry_id,
        descriptor.contact,
        descriptor.signing_time.format(TIMESTAMP_FORMAT)
    )
}

/// Lay out the stamp for `descriptor` inside `rect`.
///
/// Deterministic: equal inputs always produce equal output.
pub fn build_stamp(rect: Rect, descriptor: &StampDescriptor, labels: &StampLabels) -> Result<Stamp> {
    if !(rect.width > 0.0 && rect.height > HEADER_HEIGHT) {
        return Err(Error::Appearance(format!(
            "signature rectangle {:.1}x{:.1} is too small for the stamp",
            rect.width, rect.height
        )));
    }

    let payload = stamp_payload(descriptor);
    let qr = BarcodeGenerator::generate_qr(&payload, &QrCodeOptions::default())?;
    let mut ops = Vec::new();

    // Header bar
    let header_y = rect.y1() - HEADER_HEIGHT;
    ops.push(DrawOp::FillRect {
        rect: Rect::new(rect.x0(), header_y, rect.width, HEADER_HEIGHT),
        color: HEADER_COLOR,
    });
    let header_baseline = header_y + (HEADER_HEIGHT - HEADER_FONT_SIZE) / 2.0 + 1.5;
    let trust_width = text_width(&labels.trust_mark, TRUST_MARK_FONT_SIZE, FontStyle::Bold);
    let title_room = (rect.width - 3.0 * PADDING - trust_width).max(0.0);
    ops.push(DrawOp::Text {
        text: truncate_to_width(&labels.title, title_room, HEADER_FONT_SIZE, FontStyle::Bold),
        origin: Point::new(rect.x0() + PADDING, header_baseline),
        size: HEADER_FONT_SIZE,
        style: FontStyle::Bold,
        color: WHITE,
    });
    if !labels.trust_mark.is_empty() {
        ops.push(DrawOp::Text {
            text: labels.trust_mark.clone(),
            origin: Point::new(rect.x1() - PADDING - trust_width, header_baseline),
            size: TRUST_MARK_FONT_SIZE,
            style: FontStyle::Bold,
            color: WHITE,
        });
    }

    // QR quadrant
    let body_height = rect.height - HEADER_HEIGHT;
    let side = (body_height - 2.0 * PADDING).min(rect.width / 2.0).max(0.0);
    let qr_rect = Rect::new(rect.x0() + PADDING, rect.y0() + PADDING, side, side);
    ops.push(DrawOp::Image { rect: qr_rect });

    // Divider
    let divider_x = qr_rect.x1() + PADDING;
    ops.push(DrawOp::Line {
        from: Point::new(divider_x, rect.y0() + PADDING),
        to: Point::new(divider_x, header_y - PADDING),
        width: DIVIDER_WIDTH,
        color: MUTED_COLOR,
    });

    // Text column
    let text_x = divider_x + PADDING;
    let column_width = (rect.x1() - PADDING - text_x).max(0.0);
    let disclaimer_baseline = rect.y0() + PADDING;
    let lowest_baseline = disclaimer_baseline + DISCLAIMER_FONT_SIZE + 2.0;

    let mut baseline = header_y - PADDING - BODY_FONT_SIZE;
    for (index, line) in text_lines(descriptor).into_iter().enumerate() {
        if baseline < lowest_baseline {
            break;
        }
        let style = if index == 0 {
            FontStyle::Bold
        } else {
            FontStyle::Regular
        };
        ops.push(DrawOp::Text {
            text: truncate_to_width(&line, column_width, BODY_FONT_SIZE, style),
            origin: Point::new(text_x, baseline),
            size: BODY_FONT_SIZE,
            style,
            color: TEXT_COLOR,
        });
        baseline -= LINE_HEIGHT;
    }

    // Disclaimer
    if !labels.disclaimer.is_empty() {
        ops.push(DrawOp::Text {
            text: truncate_to_width(
                &labels.disclaimer,
                column_width,
                DISCLAIMER_FONT_SIZE,
                FontStyle::Italic,
            ),
            origin: Point::new(text_x, disclaimer_baseline),
            size: DISCLAIMER_FONT_SIZE,
            style: FontStyle::Italic,
            color: MUTED_COLOR,
        });
    }

    Ok(Stamp {
        rect,
        ops,
        payload,
        qr,
    })
}

/// Non-empty lines of the text column, at most [`MAX_TEXT_LINES`].
fn text_lines(descriptor: &StampDescriptor) -> Vec<String> {
    let registry = [descriptor.registry_id.as_str(), descriptor.role.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" - ");
    let signed_at = format!("Signed at: {}", descriptor.signing_time.format(TIMESTAMP_FORMAT));

    [descriptor.signer_name.clone(), registry, descriptor.contact.clone(), signed_at]
        .into_iter()
        .filter(|line| !line.is_empty())
        .take(MAX_TEXT_LINES)
        .collect()
}

/// Helvetica advance width of `c` in 1/1000 em.
fn glyph_width(c: char) -> u16 {
    const ASCII: [u16; 95] = [
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
        278, 278, 584, 584, 584, 556, 1015, // :..@
        667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
        667, 611, 722, 667, 944, 667, 667, 611, // A-Z
        278, 278, 278, 469, 556, 333, // [..`
        556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
        500, 278, 556, 500, 722, 500, 500, 500, // a-z
        334, 260, 334, 584, // {..~
    ];
    match c as u32 {
        code @ 0x20..=0x7E => ASCII[(code - 0x20) as usize],
        _ if c == ELLIPSIS => 1000,
        _ => 556,
    }
}

/// Approximate rendered width of `text` in points.
pub fn text_width(text: &str, size: f32, style: FontStyle) -> f32 {
    let units: u32 = text.chars().map(|c| u32::from(glyph_width(c))).sum();
    let bold_factor = if style == FontStyle::Bold { 1.06 } else { 1.0 };
    units as f32 / 1000.0 * size * bold_factor
}

/// Truncate `text` with an ellipsis so it fits `max_width`.
pub fn truncate_to_width(text: &str, max_width: f32, size: f32, style: FontStyle) -> String {
    if text_width(text, size, style) <= max_width {
        return text.to_string();
    }
    let mut chars: Vec<char> = text.chars().collect();
    while !chars.is_empty() {
        chars.pop();
        let candidate: String = chars.iter().chain(std::iter::once(&ELLIPSIS)).collect();
        if text_width(&candidate, size, style) <= max_width {
            return candidate.trim_end_matches(' ').replace(" \u{2026}", "\u{2026}");
        }
    }
    String::new()
}

/// Streams making up a rendered stamp.
#[derive(Debug, Clone)]
pub struct AppearanceStreams {
    /// Form XObject for the widget's `/AP /N` entry
    pub form: Stream,
    /// QR raster Image XObject, referenced from the form's resources
    pub image: Stream,
}

/// Render `stamp` into a Form XObject whose BBox is the stamp rectangle.
///
/// `image_id` is the object id the caller will store the QR image under.
pub fn render_appearance(stamp: &Stamp, image_id: ObjectId) -> Result<AppearanceStreams> {
    let mut builder = ContentStreamBuilder::new();
    builder.save_state();
    for op in &stamp.ops {
        match op {
            DrawOp::FillRect { rect, color } => {
                builder
                    .end_text()
                    .set_fill_color(color[0], color[1], color[2])
                    .rect(rect.x, rect.y, rect.width, rect.height)
                    .fill();
            },
            DrawOp::Line {
                from,
                to,
                width,
                color,
            } => {
                builder
                    .end_text()
                    .set_stroke_color(color[0], color[1], color[2])
                    .set_line_width(*width)
                    .move_to(from.x, from.y)
                    .line_to(to.x, to.y)
                    .stroke();
            },
            DrawOp::Image { rect } => {
                builder.draw_image(QR_RESOURCE, rect.x, rect.y, rect.width, rect.height);
            },
            DrawOp::Text {
                text,
                origin,
                size,
                style,
                color,
            } => {
                builder
                    .begin_text()
                    .set_fill_color(color[0], color[1], color[2])
                    .set_font(style.resource_name(), *size)
                    .text(text, origin.x, origin.y);
            },
        }
    }
    builder.end_text().restore_state();
    let content = builder.build()?;

    let mut fonts = Dictionary::new();
    for style in [FontStyle::Regular, FontStyle::Bold, FontStyle::Italic] {
        fonts.set(
            style.resource_name(),
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => style.base_font(),
                "Encoding" => "WinAnsiEncoding",
            },
        );
    }

    let form_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Form",
        "FormType" => 1,
        "BBox" => rect_array(&stamp.rect),
        "Matrix" => vec![1.into(), 0.into(), 0.into(), 1.into(), 0.into(), 0.into()],
        "Resources" => dictionary! {
            "Font" => fonts,
            "XObject" => dictionary! { QR_RESOURCE => Object::Reference(image_id) },
            "ProcSet" => vec!["PDF".into(), "Text".into(), "ImageB".into()],
        },
        "Filter" => "FlateDecode",
    };
    let form = Stream::new(form_dict, compress(&content)?);

    let raster = stamp.qr.to_gray_image(&QrCodeOptions::default());
    let image_dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(raster.width()),
        "Height" => i64::from(raster.height()),
        "ColorSpace" => "DeviceGray",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    let image = Stream::new(image_dict, compress(raster.as_raw())?);

    Ok(AppearanceStreams { form, image })
}

/// Compress stream data with Flate.
fn compress(data: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| Error::Appearance(format!("stream compression failed: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Appearance(format!("stream compression failed: {}", e)))
}
