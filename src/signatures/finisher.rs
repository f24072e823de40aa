//! Post-signature stamp redraw.
//!
//! Replaces the appearance of an already signed widget, for callers whose
//! stamp must show values only known after signing. Any change to a signed
//! file is an integrity risk, so every pass returns an
//! [`IntegrityRiskWarning`] together with the verification status of the
//! result.
//!
//! - [`FinishMode::FullRewrite`] re-parses and re-saves the whole document.
//!   Object offsets move and the byte-range digest no longer matches.
//! - [`FinishMode::IncrementalUpdate`] appends a new widget revision. The
//!   signature still verifies but no longer covers the whole file.

use super::types::{SignedDocument, StampDescriptor, VerificationStatus};
use super::verifier::SignatureVerifier;
use crate::config::StampLabels;
use crate::document::{decode_text_string, rect_from_array, SourceDocument};
use crate::error::{Error, IntegrityRiskWarning, Result};
use crate::geometry::Rect;
use crate::writer::incremental::IncrementalWriter;
use crate::writer::signature_stamp::{build_stamp, render_appearance, DrawOp, Stamp};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

/// Fill color of the rectangle hiding the previous appearance.
const COVER_COLOR: [f32; 3] = [1.0, 1.0, 1.0];

/// How the redrawn appearance is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishMode {
    /// Re-save the whole document (breaks the signature)
    FullRewrite,
    /// Append a new revision (signature stays verifiable)
    IncrementalUpdate,
}

impl FinishMode {
    /// Name used in warnings and logs.
    pub fn name(&self) -> &'static str {
        match self {
            FinishMode::FullRewrite => "full rewrite",
            FinishMode::IncrementalUpdate => "incremental redraw",
        }
    }
}

/// Result of a post-signature pass.
#[derive(Clone)]
pub struct FinishOutcome {
    /// Document after the pass
    pub bytes: Vec<u8>,
    /// Mode that produced it
    pub mode: FinishMode,
    /// Always present
    pub warning: IntegrityRiskWarning,
    /// Verification status of `bytes`
    pub verification: VerificationStatus,
}

impl std::fmt::Debug for FinishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinishOutcome")
            .field("bytes", &format!("{} bytes", self.bytes.len()))
            .field("mode", &self.mode)
            .field("warning", &self.warning)
            .field("verification", &self.verification)
            .finish()
    }
}

/// Redraws the stamp of a signed document.
#[derive(Debug, Clone, Default)]
pub struct PostSignFinisher {
    labels: StampLabels,
}

impl PostSignFinisher {
    /// Create a finisher drawing with `labels`.
    pub fn new(labels: StampLabels) -> Self {
        Self { labels }
    }

    /// Redraw the widget of `signed.field_name` with `descriptor`.
    pub fn finish(
        &self,
        signed: &SignedDocument,
        descriptor: &StampDescriptor,
        mode: FinishMode,
    ) -> Result<FinishOutcome> {
        let source = SourceDocument::load(&signed.bytes)?;
        let (widget_id, widget) = find_widget(&source, &signed.field_name)?;
        let rect = widget
            .get(b"Rect")
            .ok()
            .and_then(|r| source.resolve(r).ok())
            .and_then(rect_from_array)
            .ok_or_else(|| {
                Error::DocumentFormat(format!("field '{}' has no /Rect", signed.field_name))
            })?;
        let stamp = covered_stamp(rect, descriptor, &self.labels)?;

        let bytes = match mode {
            FinishMode::FullRewrite => full_rewrite(&signed.bytes, widget_id, &stamp)?,
            FinishMode::IncrementalUpdate => incremental_redraw(&source, widget_id, widget, &stamp)?,
        };

        let verification = match SignatureVerifier::new().verify_document(&bytes) {
            Ok(result) => result.status,
            Err(e) => {
                log::debug!("Verification after {} failed: {}", mode.name(), e);
                VerificationStatus::Unknown
            },
        };
        let warning = IntegrityRiskWarning::new(mode.name(), verification.is_ok());
        log::warn!("{} (verification: {:?})", warning, verification);

        Ok(FinishOutcome {
            bytes,
            mode,
            warning,
            verification,
        })
    }
}

/// The stamp drawn over an opaque cover of the whole widget.
fn covered_stamp(rect: Rect, descriptor: &StampDescriptor, labels: &StampLabels) -> Result<Stamp> {
    let mut stamp = build_stamp(rect, descriptor, labels)?;
    stamp.ops.insert(
        0,
        DrawOp::FillRect {
            rect,
            color: COVER_COLOR,
        },
    );
    Ok(stamp)
}

/// Locate the signature widget of the named field.
fn find_widget(source: &SourceDocument, field_name: &str) -> Result<(ObjectId, Dictionary)> {
    let fields = source
        .acro_form()
        .and_then(|form| form.get(b"Fields").ok())
        .and_then(|fields| source.resolve(fields).ok())
        .and_then(|fields| fields.as_array().ok())
        .cloned()
        .unwrap_or_default();

    fields
        .iter()
        .filter_map(|field| field.as_reference().ok())
        .find_map(|id| {
            let dict = source.inner().get_object(id).ok()?.as_dict().ok()?;
            match dict.get(b"T") {
                Ok(Object::String(name, _)) if decode_text_string(name) == field_name => {
                    Some((id, dict.clone()))
                },
                _ => None,
            }
        })
        .ok_or_else(|| Error::DocumentFormat(format!("no signature field named '{}'", field_name)))
}

fn incremental_redraw(
    source: &SourceDocument,
    widget_id: ObjectId,
    mut widget: Dictionary,
    stamp: &Stamp,
) -> Result<Vec<u8>> {
    let first_id = source.next_object_id();
    let form_id: ObjectId = (first_id, 0);
    let image_id: ObjectId = (first_id + 1, 0);
    let appearance = render_appearance(stamp, image_id)?;
    widget.set("AP", dictionary! { "N" => form_id });

    let mut writer = IncrementalWriter::new(source.bytes())?;
    writer.add_object(form_id, &Object::Stream(appearance.form))?;
    writer.add_object(image_id, &Object::Stream(appearance.image))?;
    writer.add_object(widget_id, &Object::Dictionary(widget))?;
    writer.finish(source.trailer())
}

fn full_rewrite(bytes: &[u8], widget_id: ObjectId, stamp: &Stamp) -> Result<Vec<u8>> {
    let mut doc = Document::load_mem(bytes)?;
    let image_id = doc.new_object_id();
    let appearance = render_appearance(stamp, image_id)?;
    doc.objects.insert(image_id, Object::Stream(appearance.image));
    let form_id = doc.add_object(appearance.form);

    doc.get_object_mut(widget_id)?
        .as_dict_mut()?
        .set("AP", dictionary! { "N" => form_id });

    let mut out = Vec::with_capacity(bytes.len());
    doc.save_to(&mut out)?;
    Ok(out)
}
