//! Digital signature types and data structures.
//!
//! This module defines the core types used for PDF digital signatures.

use crate::error::IntegrityRiskWarning;
use crate::geometry::Rect;
use chrono::{DateTime, FixedOffset};
use der::asn1::ObjectIdentifier;
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Digest algorithm used for signing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum DigestAlgorithm {
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Get the OID for this digest algorithm.
    pub fn oid(&self) -> ObjectIdentifier {
        match self {
            DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1"),
            DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2"),
            DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3"),
        }
    }

    /// Get the name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha384 => "SHA-384",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Look up an algorithm by its OID.
    pub fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        [Self::Sha256, Self::Sha384, Self::Sha512]
            .into_iter()
            .find(|alg| alg.oid() == *oid)
    }

    /// Digest the concatenation of `parts`.
    pub fn digest(&self, parts: &[&[u8]]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => digest_parts::<Sha256>(parts),
            DigestAlgorithm::Sha384 => digest_parts::<Sha384>(parts),
            DigestAlgorithm::Sha512 => digest_parts::<Sha512>(parts),
        }
    }
}

fn digest_parts<D: Digest>(parts: &[&[u8]]) -> Vec<u8> {
    let mut hasher = D::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().to_vec()
}

/// Signature sub-filter type (signature format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum SignatureSubFilter {
    /// adbe.pkcs7.detached - PKCS#7 detached signature
    #[default]
    Pkcs7Detached,
    /// ETSI.CAdES.detached - PAdES CAdES signature
    CadesDetached,
}

impl SignatureSubFilter {
    /// Get the PDF name for this sub-filter.
    pub fn as_pdf_name(&self) -> &'static str {
        match self {
            SignatureSubFilter::Pkcs7Detached => "adbe.pkcs7.detached",
            SignatureSubFilter::CadesDetached => "ETSI.CAdES.detached",
        }
    }

    /// Parse a PDF name into a sub-filter type.
    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "adbe.pkcs7.detached" => Some(SignatureSubFilter::Pkcs7Detached),
            "ETSI.CAdES.detached" => Some(SignatureSubFilter::CadesDetached),
            _ => None,
        }
    }

    /// Whether the CMS signing-time attribute belongs in the signed attributes.
    ///
    /// PAdES baseline signatures carry the time in `/M` only.
    pub fn includes_signing_time(&self) -> bool {
        matches!(self, SignatureSubFilter::Pkcs7Detached)
    }
}

/// The human readable values shown in the visual stamp and its QR code.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StampDescriptor {
    /// Name of the signer
    pub signer_name: String,
    /// Professional registry identifier (e.g. a medical council number)
    pub registry_id: String,
    /// Role of the signer
    pub role: String,
    /// Contact information
    pub contact: String,
    /// Signing location
    pub location: String,
    /// Reason for signing
    pub reason: String,
    /// Signing time, in the signer's local offset
    pub signing_time: DateTime<FixedOffset>,
}

impl StampDescriptor {
    /// Create a descriptor with empty text fields.
    pub fn new(signer_name: impl Into<String>, signing_time: DateTime<FixedOffset>) -> Self {
        Self {
            signer_name: signer_name.into(),
            registry_id: String::new(),
            role: String::new(),
            contact: String::new(),
            location: String::new(),
            reason: String::new(),
            signing_time,
        }
    }

    /// Set the registry identifier.
    pub fn with_registry_id(mut self, registry_id: impl Into<String>) -> Self {
        self.registry_id = registry_id.into();
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }
}

/// Per-document signing request.
///
/// Everything here describes this one signature; engine-wide settings live in
/// [`crate::config::SignerConfig`].
#[derive(Debug, Clone, Default)]
pub struct SignRequest {
    /// Name of the signer (defaults to the certificate subject CN)
    pub signer_name: Option<String>,
    /// Professional registry identifier
    pub registry_id: String,
    /// Role of the signer
    pub role: String,
    /// Contact information
    pub contact: String,
    /// Signing location
    pub location: String,
    /// Reason for signing
    pub reason: String,
    /// Signing time (defaults to now, captured once per call)
    pub signing_time: Option<DateTime<FixedOffset>>,
    /// Explicit widget rectangle (defaults to the configured geometry)
    pub rect: Option<Rect>,
}

impl SignRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signer name.
    pub fn with_signer_name(mut self, name: impl Into<String>) -> Self {
        self.signer_name = Some(name.into());
        self
    }

    /// Set the registry identifier.
    pub fn with_registry_id(mut self, registry_id: impl Into<String>) -> Self {
        self.registry_id = registry_id.into();
        self
    }

    /// Set the role.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Set the contact information.
    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = contact.into();
        self
    }

    /// Set the signing location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the reason for signing.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Fix the signing time instead of reading the clock.
    pub fn with_signing_time(mut self, time: DateTime<FixedOffset>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Place the widget at an explicit rectangle.
    pub fn with_rect(mut self, rect: Rect) -> Self {
        self.rect = Some(rect);
        self
    }
}

/// A fully signed document.
#[derive(Debug, Clone)]
pub struct SignedDocument {
    /// Final document bytes
    pub bytes: Vec<u8>,
    /// `[offset1, length1, offset2, length2]` covered by the digest
    pub byte_range: [usize; 4],
    /// DER length of the embedded CMS container
    pub signature_len: usize,
    /// Reserved capacity of the `/Contents` slot in bytes
    pub reserved_capacity: usize,
    /// Name of the signature field
    pub field_name: String,
    /// Integrity warnings raised by a post-signature pass
    pub warnings: Vec<IntegrityRiskWarning>,
    /// Status from verifying the final bytes, when requested
    pub verification: Option<VerificationStatus>,
}

impl SignedDocument {
    /// Whether the document was returned without integrity warnings.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Information about an existing signature in a PDF.
#[derive(Debug, Clone, Default)]
pub struct SignatureInfo {
    /// Name of the signer
    pub signer_name: Option<String>,
    /// Signing time (`/M`)
    pub signing_time: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Contact information
    pub contact_info: Option<String>,
    /// Signature sub-filter type
    pub sub_filter: Option<SignatureSubFilter>,
    /// Whether the signature covers the whole document
    pub covers_whole_document: bool,
    /// Byte range of the signed data
    pub byte_range: Vec<i64>,
    /// Certificate subject common name
    pub certificate_cn: Option<String>,
    /// Certificate issuer
    pub certificate_issuer: Option<String>,
    /// Certificate validity start
    pub valid_from: Option<String>,
    /// Certificate validity end
    pub valid_to: Option<String>,
}

/// Result of signature verification.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Overall verification status
    pub status: VerificationStatus,
    /// Signature information
    pub signature_info: SignatureInfo,
    /// Verification messages (errors, warnings)
    pub messages: Vec<String>,
    /// Whether the recomputed digest matches the signed message digest
    pub digest_matches: bool,
    /// Whether the RSA signature over the signed attributes verifies
    pub signature_verifies: bool,
    /// Whether bytes were appended after the signed range
    pub document_modified: bool,
}

impl Default for VerificationResult {
    fn default() -> Self {
        Self {
            status: VerificationStatus::Unknown,
            signature_info: SignatureInfo::default(),
            messages: Vec::new(),
            digest_matches: false,
            signature_verifies: false,
            document_modified: false,
        }
    }
}

/// Verification status of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum VerificationStatus {
    /// Signature is valid and covers the whole file
    Valid,
    /// Signature is invalid (cryptographically)
    Invalid,
    /// Signature validity is unknown (e.g. unsupported algorithm)
    Unknown,
    /// Signature is valid but bytes were appended after the signed range
    ValidWithWarnings,
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }

    /// Check if the status indicates any form of validity (including warnings).
    pub fn is_ok(&self) -> bool {
        matches!(self, VerificationStatus::Valid | VerificationStatus::ValidWithWarnings)
    }
}
