//! PDF writing components used by the signing engine.
//!
//! ## Architecture
//!
//! ```text
//! StampDescriptor + Rect
//!     ↓
//! [signature_stamp] (layout → DrawOp[], QR via [barcode])
//!     ↓
//! [ContentStreamBuilder] (DrawOp[] → content stream bytes)
//!     ↓
//! Form XObject + Image XObject (lopdf streams)
//!     ↓
//! [IncrementalWriter] (appends objects, xref section and trailer)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes
//! ```
//!
//! Nothing in this module rewrites existing bytes; every revision is
//! appended after the original file.

pub mod barcode;
pub mod content_stream;
pub mod incremental;
pub mod object_serializer;
pub mod signature_stamp;

pub use barcode::{BarcodeGenerator, QrCodeOptions, QrErrorCorrection, QrMatrix};
pub use content_stream::{ContentStreamBuilder, ContentStreamOp};
pub use incremental::IncrementalWriter;
pub use object_serializer::ObjectSerializer;
pub use signature_stamp::{
    build_stamp, render_appearance, stamp_payload, AppearanceStreams, DrawOp, FontStyle, Stamp,
};
