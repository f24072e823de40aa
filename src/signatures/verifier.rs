//! PDF signature verification.
//!
//! This module verifies the signatures this crate writes: it recomputes the
//! byte-range digest, compares it with the CMS message digest and checks the
//! RSA signature over the signed attributes.

use super::byterange::ByteRangeCalculator;
use super::cms::ParsedSignedData;
use super::credentials::ParsedCertificate;
use super::types::{SignatureInfo, SignatureSubFilter, VerificationResult, VerificationStatus};
use crate::document::decode_text_string;
use crate::error::{Error, Result};
use lopdf::{Dictionary, Document, Object};

/// Issuer links followed before giving up on reaching a trusted root.
const MAX_CHAIN_DEPTH: usize = 8;

/// Verifier for PDF digital signatures.
#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    /// Trusted root certificates (DER-encoded)
    trusted_roots: Vec<Vec<u8>>,
}

impl SignatureVerifier {
    /// Create a new signature verifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a trusted root certificate.
    pub fn add_trusted_root(&mut self, cert_der: Vec<u8>) {
        self.trusted_roots.push(cert_der);
    }

    /// Add multiple trusted root certificates.
    pub fn add_trusted_roots(&mut self, certs: Vec<Vec<u8>>) {
        self.trusted_roots.extend(certs);
    }

    /// Extract signature information from a signature dictionary.
    pub fn extract_signature_info(&self, sig_dict: &Object) -> Result<SignatureInfo> {
        let dict = sig_dict
            .as_dict()
            .map_err(|_| Error::DocumentFormat("Signature must be a dictionary".to_string()))?;

        let text = |key: &[u8]| match dict.get(key) {
            Ok(Object::String(bytes, _)) => Some(decode_text_string(bytes)),
            _ => None,
        };

        let mut info = SignatureInfo {
            signer_name: text(b"Name"),
            signing_time: text(b"M"),
            reason: text(b"Reason"),
            location: text(b"Location"),
            contact_info: text(b"ContactInfo"),
            ..SignatureInfo::default()
        };

        if let Ok(Object::Name(sub_filter)) = dict.get(b"SubFilter") {
            info.sub_filter = std::str::from_utf8(sub_filter)
                .ok()
                .and_then(SignatureSubFilter::from_pdf_name);
        }

        if let Ok(Object::Array(byte_range)) = dict.get(b"ByteRange") {
            info.byte_range = byte_range
                .iter()
                .filter_map(|obj| match obj {
                    Object::Integer(i) => Some(*i),
                    _ => None,
                })
                .collect();
        }

        Ok(info)
    }

    /// Quick check if a signature appears valid (without full cryptographic verification).
    pub fn quick_check(&self, sig_dict: &Object) -> Result<bool> {
        let info = self.extract_signature_info(sig_dict)?;
        let has_contents = sig_dict.as_dict().map(|d| d.has(b"Contents")).unwrap_or(false);
        Ok(info.byte_range.len() == 4 && info.sub_filter.is_some() && has_contents)
    }

    /// Verify the most recent signature of a document.
    ///
    /// Cryptographic failures are reported through the returned status and
    /// messages; only a document without any signature dictionary is an
    /// error.
    pub fn verify_document(&self, pdf_data: &[u8]) -> Result<VerificationResult> {
        let doc = Document::load_mem(pdf_data)?;
        let sig_dict = latest_signature_dictionary(&doc).ok_or_else(|| {
            Error::DocumentFormat("document carries no signature dictionary".to_string())
        })?;
        let contents = match sig_dict.get(b"Contents") {
            Ok(Object::String(bytes, _)) => bytes.clone(),
            _ => {
                return Err(Error::DocumentFormat(
                    "signature dictionary has no /Contents string".to_string(),
                ))
            },
        };
        self.verify(pdf_data, &Object::Dictionary(sig_dict.clone()), &contents)
    }

    /// Verify a signature.
    ///
    /// `contents` is the decoded `/Contents` value, zero padding included.
    pub fn verify(
        &self,
        pdf_data: &[u8],
        sig_dict: &Object,
        contents: &[u8],
    ) -> Result<VerificationResult> {
        let mut result = VerificationResult {
            signature_info: self.extract_signature_info(sig_dict)?,
            ..VerificationResult::default()
        };

        let byte_range = match to_byte_range(&result.signature_info.byte_range) {
            Some(range) => range,
            None => {
                result.status = VerificationStatus::Invalid;
                result
                    .messages
                    .push("Invalid ByteRange: expected 4 non-negative elements".to_string());
                return Ok(result);
            },
        };

        let spans = match ByteRangeCalculator::signed_spans(pdf_data, &byte_range) {
            Ok(spans) => spans,
            Err(e) => {
                result.status = VerificationStatus::Invalid;
                result.document_modified = true;
                result.messages.push(format!("ByteRange validation failed: {}", e));
                return Ok(result);
            },
        };

        let mut structure_ok = true;
        if byte_range[0] != 0 {
            structure_ok = false;
            result.messages.push("ByteRange does not start at offset 0".to_string());
        }
        if let Err(e) = ByteRangeCalculator::validate_gap(pdf_data, byte_range[1], byte_range[2]) {
            structure_ok = false;
            result.document_modified = true;
            result.messages.push(format!("ByteRange validation failed: {}", e));
        }
        let covered_end = byte_range[2] + byte_range[3];
        result.signature_info.covers_whole_document = structure_ok && covered_end == pdf_data.len();
        if covered_end < pdf_data.len() {
            result.document_modified = true;
            result.messages.push(format!(
                "{} bytes were appended after the signed range",
                pdf_data.len() - covered_end
            ));
        }

        let parsed = match ParsedSignedData::parse(contents) {
            Ok(parsed) => parsed,
            Err(e) => {
                result.status = VerificationStatus::Invalid;
                result.messages.push(format!("Signature container unreadable: {}", e));
                return Ok(result);
            },
        };

        if let Ok(summary) = parsed.signer_certificate.summary() {
            let info = &mut result.signature_info;
            info.certificate_cn = summary.common_name.clone();
            info.certificate_issuer = Some(summary.issuer.clone());
            info.valid_from = Some(summary.not_before.to_rfc3339());
            info.valid_to = Some(summary.not_after.to_rfc3339());
        }

        let computed = parsed.digest_algorithm.digest(&spans);
        result.digest_matches = computed == parsed.message_digest;
        if !result.digest_matches {
            result
                .messages
                .push("Byte-range digest does not match the signed message digest".to_string());
        }

        match parsed.verify_signature() {
            Ok(verified) => {
                result.signature_verifies = verified;
                if !verified {
                    result
                        .messages
                        .push("Signature over the signed attributes does not verify".to_string());
                }
            },
            Err(e) => result.messages.push(format!("Signature verification failed: {}", e)),
        }

        result.status = if !(structure_ok && result.digest_matches && result.signature_verifies) {
            VerificationStatus::Invalid
        } else if result.document_modified {
            VerificationStatus::ValidWithWarnings
        } else {
            VerificationStatus::Valid
        };

        if result.status.is_ok()
            && !self.trusted_roots.is_empty()
            && !self.chains_to_trusted_root(&parsed.signer_certificate, &parsed.certificates)
        {
            result.status = VerificationStatus::Unknown;
            result.messages.push("Certificate is not trusted".to_string());
        }

        log::debug!(
            "Verified signature: status {:?}, digest matches {}, signature verifies {}",
            result.status,
            result.digest_matches,
            result.signature_verifies
        );
        Ok(result)
    }

    /// Check if a certificate is in the trusted roots.
    fn is_certificate_trusted(&self, cert_der: &[u8]) -> bool {
        self.trusted_roots.iter().any(|root| root == cert_der)
    }

    /// Follow issuer links from `leaf` through `pool` until a trusted root
    /// is met, either as a certificate in the path or as the issuer of one.
    fn chains_to_trusted_root(&self, leaf: &ParsedCertificate, pool: &[ParsedCertificate]) -> bool {
        let roots: Vec<ParsedCertificate> = self
            .trusted_roots
            .iter()
            .filter_map(|der| ParsedCertificate::from_der(der).ok())
            .collect();

        let mut current = leaf;
        for _ in 0..MAX_CHAIN_DEPTH {
            if self.is_certificate_trusted(current.der())
                || roots.iter().any(|root| current.verify_issued_by(root).is_ok())
            {
                return true;
            }
            if current.is_self_issued() {
                return false;
            }
            match pool
                .iter()
                .find(|c| c.der() != current.der() && current.verify_issued_by(c).is_ok())
            {
                Some(issuer) => current = issuer,
                None => return false,
            }
        }
        log::debug!("Certificate path exceeds {} links, treated as untrusted", MAX_CHAIN_DEPTH);
        false
    }
}

fn to_byte_range(values: &[i64]) -> Option<[usize; 4]> {
    match values {
        [a, b, c, d] => Some([
            usize::try_from(*a).ok()?,
            usize::try_from(*b).ok()?,
            usize::try_from(*c).ok()?,
            usize::try_from(*d).ok()?,
        ]),
        _ => None,
    }
}

fn is_signature_dictionary(dict: &Dictionary) -> bool {
    let typed = matches!(dict.get(b"Type"), Ok(Object::Name(name)) if name == b"Sig");
    typed || (dict.has(b"ByteRange") && dict.has(b"Contents") && dict.has(b"Filter"))
}

/// The signature dictionary whose placeholder lies furthest into the file.
fn latest_signature_dictionary(doc: &Document) -> Option<&Dictionary> {
    doc.objects
        .values()
        .filter_map(|obj| obj.as_dict().ok())
        .filter(|dict| is_signature_dictionary(dict))
        .max_by_key(|dict| match dict.get(b"ByteRange") {
            Ok(Object::Array(range)) => range.get(1).and_then(|v| v.as_i64().ok()).unwrap_or(0),
            _ => 0,
        })
}
