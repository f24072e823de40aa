//! PDF signing implementation.
//!
//! [`PdfSigner`] turns a document with a reserved signature slot into a
//! signed one. It never re-serializes the document: it reads the ByteRange,
//! digests the two spans around the slot, builds a detached CMS container and
//! overwrites the zero-filled placeholder in place.

use super::byterange::ByteRangeCalculator;
use super::cms::build_detached_signed_data;
use super::credentials::{CertificateBundle, SigningIdentity};
use super::types::{DigestAlgorithm, SignatureSubFilter};
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, Local};

/// Options for a signing call.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Digest over the byte ranges and the signed attributes
    pub digest_algorithm: DigestAlgorithm,
    /// Decides whether the signing-time attribute is included
    pub sub_filter: SignatureSubFilter,
    /// Signing time; "now" when absent
    pub signing_time: Option<DateTime<FixedOffset>>,
}

impl SignOptions {
    /// Options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set the sub-filter.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Fix the signing time.
    pub fn with_signing_time(mut self, time: DateTime<FixedOffset>) -> Self {
        self.signing_time = Some(time);
        self
    }
}

/// Output of [`PdfSigner::sign`].
#[derive(Clone)]
pub struct SignOutcome {
    /// Signed document, same length as the input
    pub bytes: Vec<u8>,
    /// ByteRange covered by the digest
    pub byte_range: [usize; 4],
    /// DER length of the CMS container
    pub signature_len: usize,
    /// Capacity of the `/Contents` slot in bytes
    pub reserved_capacity: usize,
    /// Digest of the two spans
    pub digest: Vec<u8>,
    /// Time used for chain validation and the signing-time attribute
    pub signing_time: DateTime<FixedOffset>,
}

impl std::fmt::Debug for SignOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignOutcome")
            .field("bytes", &format!("{} bytes", self.bytes.len()))
            .field("byte_range", &self.byte_range)
            .field("signature_len", &self.signature_len)
            .field("reserved_capacity", &self.reserved_capacity)
            .field("signing_time", &self.signing_time)
            .finish()
    }
}

/// PDF signer that creates digital signatures.
///
/// Holds the encrypted bundle only; the passphrase is passed per call and
/// the unlocked key is dropped before [`sign`](Self::sign) returns.
#[derive(Debug, Clone)]
pub struct PdfSigner {
    bundle: CertificateBundle,
    options: SignOptions,
}

impl PdfSigner {
    /// Create a new PDF signer with the given bundle and options.
    pub fn new(bundle: CertificateBundle, options: SignOptions) -> Self {
        Self { bundle, options }
    }

    /// Get the signing options.
    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Sign a prepared document.
    ///
    /// Steps, each failing the whole call:
    /// 1. unlock the bundle ([`Error::InvalidCredentials`]), before the
    ///    document bytes are read
    /// 2. validate the certificate chain at the signing time
    ///    ([`Error::CertificateChain`])
    /// 3. locate and validate the last ByteRange ([`Error::DocumentFormat`])
    /// 4. digest both spans and build the CMS container
    /// 5. splice it into the placeholder ([`Error::ReservedSpaceExceeded`]
    ///    when it does not fit)
    pub fn sign(&self, prepared: &[u8], passphrase: &str) -> Result<SignOutcome> {
        let identity = self.bundle.unlock(passphrase)?;
        self.sign_with_identity(&identity, prepared)
    }

    /// Sign with an identity the caller already unlocked.
    pub fn sign_with_identity(
        &self,
        identity: &SigningIdentity,
        prepared: &[u8],
    ) -> Result<SignOutcome> {
        let signing_time = self
            .options
            .signing_time
            .unwrap_or_else(|| Local::now().into());
        identity.validate_chain(signing_time)?;

        let (_, byte_range) = ByteRangeCalculator::find_last_byte_range(prepared)
            .ok_or_else(|| Error::DocumentFormat("document has no /ByteRange".to_string()))?;
        ByteRangeCalculator::validate_byte_range(prepared, &byte_range)?;

        let [_, contents_offset, contents_end, _] = byte_range;
        let reserved_capacity = (contents_end - contents_offset - 2) / 2;
        let calculator = ByteRangeCalculator::new(reserved_capacity);

        let [first, second] = ByteRangeCalculator::signed_spans(prepared, &byte_range)?;
        let digest = self.options.digest_algorithm.digest(&[first, second]);

        let attribute_time = self
            .options
            .sub_filter
            .includes_signing_time()
            .then_some(signing_time);
        let der = build_detached_signed_data(
            identity,
            &digest,
            self.options.digest_algorithm,
            attribute_time,
        )?;

        let mut bytes = prepared.to_vec();
        calculator.insert_signature(&mut bytes, contents_offset, &der)?;

        log::info!(
            "Signed {} bytes: CMS {} of {} reserved bytes, ByteRange {:?}",
            bytes.len(),
            der.len(),
            reserved_capacity,
            byte_range
        );

        Ok(SignOutcome {
            bytes,
            byte_range,
            signature_len: der.len(),
            reserved_capacity,
            digest,
            signing_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bundle(name: &str) -> CertificateBundle {
        CertificateBundle::from_file(format!(
            "{}/tests/fixtures/{}",
            env!("CARGO_MANIFEST_DIR"),
            name
        ))
        .unwrap()
    }

    fn time() -> DateTime<FixedOffset> {
        FixedOffset::west_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 17, 14, 30, 0)
            .unwrap()
    }

    /// Bare slot layout; the signer never parses the document.
    fn prepared(capacity: usize) -> Vec<u8> {
        let calc = ByteRangeCalculator::new(capacity);
        let mut data = b"%PDF-1.7\n1 0 obj\n<< /ByteRange ".to_vec();
        let slot = data.len();
        data.extend_from_slice(ByteRangeCalculator::slot_marker().as_bytes());
        data.extend_from_slice(b" /Contents ");
        let contents = data.len();
        data.extend_from_slice(calc.generate_placeholder().as_bytes());
        data.extend_from_slice(b" >>\nendobj\n%%EOF\n");
        let range = calc.calculate_byte_range(data.len(), contents).unwrap();
        ByteRangeCalculator::patch_byte_range(&mut data, slot, &range).unwrap();
        data
    }

    #[test]
    fn test_sign_keeps_length() {
        let signer = PdfSigner::new(bundle("signer.p12"), SignOptions::new().with_signing_time(time()));
        let input = prepared(8192);
        let outcome = signer.sign(&input, "clinic-passphrase").unwrap();
        assert_eq!(outcome.bytes.len(), input.len());
        assert_eq!(outcome.reserved_capacity, 8192);
        assert!(outcome.signature_len > 0);
        assert_eq!(outcome.bytes[..outcome.byte_range[1]], input[..outcome.byte_range[1]]);
    }

    #[test]
    fn test_wrong_passphrase_before_document() {
        let signer = PdfSigner::new(bundle("signer.p12"), SignOptions::new());
        let err = signer.sign(b"not a pdf at all", "wrong").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
    }

    #[test]
    fn test_capacity_too_small() {
        let signer = PdfSigner::new(bundle("signer.p12"), SignOptions::new().with_signing_time(time()));
        let err = signer.sign(&prepared(64), "clinic-passphrase").unwrap_err();
        match err {
            Error::ReservedSpaceExceeded { required, reserved } => {
                assert_eq!(reserved, 64);
                assert!(required > reserved);
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_expired_certificate_rejected() {
        let signer = PdfSigner::new(bundle("expired.p12"), SignOptions::new().with_signing_time(time()));
        let err = signer.sign(&prepared(8192), "clinic-passphrase").unwrap_err();
        assert!(matches!(err, Error::CertificateChain(_)));
    }

    #[test]
    fn test_missing_byte_range() {
        let signer = PdfSigner::new(bundle("signer.p12"), SignOptions::new().with_signing_time(time()));
        let err = signer.sign(b"%PDF-1.7\n%%EOF\n", "clinic-passphrase").unwrap_err();
        assert!(matches!(err, Error::DocumentFormat(_)));
    }
}
