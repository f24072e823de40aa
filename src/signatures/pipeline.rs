//! End-to-end signing.
//!
//! [`sign_document`] runs every stage for one document: unlock and validate
//! the credentials, insert the placeholder, sign, optionally redraw, and
//! verify the result. Callers get either a complete signed document or an
//! error, never partial output.

use super::credentials::CertificateBundle;
use super::finisher::PostSignFinisher;
use super::placeholder::{PlaceholderInserter, PlaceholderRequest};
use super::signer::{PdfSigner, SignOptions};
use super::types::{SignRequest, SignedDocument, StampDescriptor};
use super::verifier::SignatureVerifier;
use crate::config::{PostSignPass, SignerConfig};
use crate::document::SourceDocument;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local, SubsecRound};

/// Sign `pdf` with the identity in `bundle`.
///
/// The signing time is resolved once and shared by the stamp, `/M`, the
/// chain validation and the CMS signing-time attribute. The bundle is
/// unlocked before the document is parsed, so a wrong passphrase fails with
/// [`Error::InvalidCredentials`] whatever `pdf` contains.
///
/// # Example
///
/// ```no_run
/// use pades_signer::config::SignerConfig;
/// use pades_signer::signatures::{sign_document, CertificateBundle, SignRequest};
///
/// let bundle = CertificateBundle::from_file("doctor.p12")?;
/// let pdf = std::fs::read("prescription.pdf")?;
/// let request = SignRequest::new()
///     .with_registry_id("CRM-SP 123456")
///     .with_reason("Medical prescription");
/// let signed = sign_document(&pdf, &bundle, "passphrase", &request, &SignerConfig::default())?;
/// std::fs::write("prescription-signed.pdf", &signed.bytes)?;
/// # Ok::<(), pades_signer::Error>(())
/// ```
pub fn sign_document(
    pdf: &[u8],
    bundle: &CertificateBundle,
    passphrase: &str,
    request: &SignRequest,
    config: &SignerConfig,
) -> Result<SignedDocument> {
    let signing_time = request.signing_time.unwrap_or_else(now);

    let identity = bundle.unlock(passphrase)?;
    identity.validate_chain(signing_time)?;

    let signer_name = match &request.signer_name {
        Some(name) if !name.trim().is_empty() => name.clone(),
        _ => identity.common_name().unwrap_or_default(),
    };
    let descriptor = StampDescriptor::new(signer_name, signing_time)
        .with_registry_id(request.registry_id.clone())
        .with_role(request.role.clone())
        .with_contact(request.contact.clone())
        .with_location(request.location.clone())
        .with_reason(request.reason.clone());

    let prepared = {
        let source = SourceDocument::load(pdf)?;
        let placeholder = PlaceholderRequest {
            page: config.page,
            rect: request.rect,
            geometry: config.geometry,
            descriptor: descriptor.clone(),
            labels: config.labels.clone(),
            reserved_capacity: config.reserved_capacity,
            sub_filter: config.sub_filter,
            field_name: None,
        };
        PlaceholderInserter::new().insert(&source, &placeholder)?
    };

    let options = SignOptions::new()
        .with_digest_algorithm(config.digest_algorithm)
        .with_sub_filter(config.sub_filter)
        .with_signing_time(signing_time);
    let outcome = PdfSigner::new(bundle.clone(), options).sign_with_identity(&identity, &prepared.bytes)?;
    drop(identity);

    let mut signed = SignedDocument {
        bytes: outcome.bytes,
        byte_range: outcome.byte_range,
        signature_len: outcome.signature_len,
        reserved_capacity: outcome.reserved_capacity,
        field_name: prepared.field_name,
        warnings: Vec::new(),
        verification: None,
    };

    if let PostSignPass::Redraw(mode) = config.post_sign {
        let finished =
            PostSignFinisher::new(config.labels.clone()).finish(&signed, &descriptor, mode)?;
        signed.bytes = finished.bytes;
        signed.warnings.push(finished.warning);
        signed.verification = Some(finished.verification);
    } else if config.verify_after_signing {
        let result = SignatureVerifier::new().verify_document(&signed.bytes)?;
        if !result.status.is_ok() {
            return Err(Error::Signing(format!(
                "signed document failed verification: {}",
                result.messages.join("; ")
            )));
        }
        signed.verification = Some(result.status);
    }

    log::info!(
        "Signed document '{}': {} bytes, signature {} of {} bytes, {} warnings",
        signed.field_name,
        signed.bytes.len(),
        signed.signature_len,
        signed.reserved_capacity,
        signed.warnings.len()
    );
    Ok(signed)
}

fn now() -> DateTime<FixedOffset> {
    Local::now().trunc_subsecs(0).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_has_whole_seconds() {
        assert_eq!(now().timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_wrong_passphrase_before_parsing() {
        let bytes = std::fs::read(format!(
            "{}/tests/fixtures/signer.p12",
            env!("CARGO_MANIFEST_DIR")
        ))
        .unwrap();
        let bundle = CertificateBundle::from_pkcs12_bytes(bytes).unwrap();
        let err = sign_document(
            b"garbage",
            &bundle,
            "not the passphrase",
            &SignRequest::new(),
            &SignerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
    }
}
