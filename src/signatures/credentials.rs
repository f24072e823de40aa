//! Signing credentials from PKCS#12 bundles.
//!
//! A [`CertificateBundle`] holds the raw, still encrypted `.p12`/`.pfx` bytes
//! and can be shared freely between threads. [`CertificateBundle::unlock`]
//! decrypts it into a [`SigningIdentity`] that lives for one signing call.

use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use der::{Decode, Encode};
use openssl::pkcs12::Pkcs12;
use openssl::provider::Provider;
use pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use signature::{SignatureEncoding, Signer, Verifier};
use spki::DecodePublicKey;
use std::path::Path;
use std::sync::Arc;
use x509_cert::Certificate;

use super::types::DigestAlgorithm;

/// sha256WithRSAEncryption
const OID_SHA256_WITH_RSA: &str = "1.2.840.113549.1.1.11";
/// sha384WithRSAEncryption
const OID_SHA384_WITH_RSA: &str = "1.2.840.113549.1.1.12";
/// sha512WithRSAEncryption
const OID_SHA512_WITH_RSA: &str = "1.2.840.113549.1.1.13";

/// Maximum number of issuer links followed when validating a chain.
const MAX_CHAIN_DEPTH: usize = 8;

/// Password protected PKCS#12 bundle.
///
/// Cheap to clone; the bytes are shared read-only.
#[derive(Clone)]
pub struct CertificateBundle {
    raw: Arc<[u8]>,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("bundle", &format!("{} bytes", self.raw.len()))
            .field("contents", &"[ENCRYPTED]")
            .finish()
    }
}

impl CertificateBundle {
    /// Wrap PKCS#12 bytes.
    ///
    /// Only the outer structure is checked here; decryption needs the
    /// passphrase and happens in [`unlock`](Self::unlock).
    pub fn from_pkcs12_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes: Vec<u8> = bytes.into();
        Pkcs12::from_der(&bytes)
            .map_err(|e| Error::InvalidCredentials(format!("malformed PKCS#12 bundle: {}", e)))?;
        Ok(Self {
            raw: Arc::from(bytes),
        })
    }

    /// Read a PKCS#12 bundle from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_pkcs12_bytes(bytes)
    }

    /// Size of the encrypted bundle in bytes.
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the bundle is empty.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Decrypt the bundle.
    ///
    /// Accepts both the PBES2/AES bundles with SHA-2 MACs that current
    /// OpenSSL writes and legacy 3DES or RC2 bundles. Fails with
    /// [`Error::InvalidCredentials`] on a wrong passphrase, a malformed
    /// bundle, a missing private key or a missing matching certificate.
    pub fn unlock(&self, passphrase: &str) -> Result<SigningIdentity> {
        // RC2-40 bags need the legacy provider; loading it disables the
        // implicit default provider, so both are loaded for this call.
        let _legacy = Provider::load(None, "legacy").ok();
        let _default = Provider::load(None, "default").ok();

        let parsed = Pkcs12::from_der(&self.raw)
            .map_err(|e| Error::InvalidCredentials(format!("malformed PKCS#12 bundle: {}", e)))?
            .parse2(passphrase)
            .map_err(|_| {
                Error::InvalidCredentials("wrong passphrase or corrupted bundle".to_string())
            })?;

        let key_der = parsed
            .pkey
            .as_ref()
            .ok_or_else(|| Error::InvalidCredentials("bundle contains no private key".to_string()))?
            .private_key_to_pkcs8()
            .map_err(|e| Error::InvalidCredentials(format!("cannot export private key: {}", e)))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&key_der)
            .map_err(|e| Error::InvalidCredentials(format!("unsupported private key: {}", e)))?;

        let mut cert_ders = Vec::new();
        if let Some(cert) = &parsed.cert {
            cert_ders.push(cert.to_der().map_err(|e| {
                Error::InvalidCredentials(format!("cannot export certificate: {}", e))
            })?);
        }
        if let Some(ca) = &parsed.ca {
            for cert in ca.iter() {
                cert_ders.push(cert.to_der().map_err(|e| {
                    Error::InvalidCredentials(format!("cannot export chain certificate: {}", e))
                })?);
            }
        }

        let public_key = private_key.to_public_key();
        let mut signer = None;
        let mut chain = Vec::new();
        for der in cert_ders {
            let cert = Certificate::from_der(&der)
                .map_err(|e| Error::InvalidCredentials(format!("malformed certificate: {}", e)))?;
            let parsed = ParsedCertificate { der, cert };
            if signer.is_none() && parsed.rsa_public_key().ok().as_ref() == Some(&public_key) {
                signer = Some(parsed);
            } else {
                chain.push(parsed);
            }
        }

        let certificate = signer.ok_or_else(|| {
            Error::InvalidCredentials("no certificate matches the private key".to_string())
        })?;

        log::debug!(
            "Unlocked bundle: signer certificate {} bytes, {} chain certificates",
            certificate.der.len(),
            chain.len()
        );

        Ok(SigningIdentity {
            private_key,
            certificate,
            chain,
        })
    }
}

/// A certificate in both DER and decoded form.
#[derive(Clone)]
pub struct ParsedCertificate {
    der: Vec<u8>,
    cert: Certificate,
}

impl ParsedCertificate {
    /// Decode a DER certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let cert = Certificate::from_der(der)
            .map_err(|e| Error::CertificateChain(format!("malformed certificate: {}", e)))?;
        Ok(Self {
            der: der.to_vec(),
            cert,
        })
    }

    /// DER encoding.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Decoded structure.
    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// RSA public key of the subject.
    pub fn rsa_public_key(&self) -> Result<RsaPublicKey> {
        let spki = self
            .cert
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::CertificateChain(format!("cannot encode public key: {}", e)))?;
        RsaPublicKey::from_public_key_der(&spki)
            .map_err(|e| Error::CertificateChain(format!("certificate key is not RSA: {}", e)))
    }

    /// Human readable summary.
    pub fn summary(&self) -> Result<CertificateSummary> {
        CertificateSummary::from_der(&self.der)
    }

    pub(crate) fn is_self_issued(&self) -> bool {
        self.cert.tbs_certificate.subject == self.cert.tbs_certificate.issuer
    }

    /// Verify that `issuer`'s key signed this certificate.
    pub(crate) fn verify_issued_by(&self, issuer: &ParsedCertificate) -> Result<()> {
        let key = issuer.rsa_public_key()?;
        let tbs = self
            .cert
            .tbs_certificate
            .to_der()
            .map_err(|e| Error::CertificateChain(format!("cannot encode certificate: {}", e)))?;
        let signature = self.cert.signature.raw_bytes();
        let algorithm = self.cert.signature_algorithm.oid.to_string();

        let verified = match algorithm.as_str() {
            OID_SHA256_WITH_RSA => verify_pkcs1v15::<Sha256>(key, &tbs, signature),
            OID_SHA384_WITH_RSA => verify_pkcs1v15::<Sha384>(key, &tbs, signature),
            OID_SHA512_WITH_RSA => verify_pkcs1v15::<Sha512>(key, &tbs, signature),
            other => {
                return Err(Error::CertificateChain(format!(
                    "unsupported certificate signature algorithm {}",
                    other
                )))
            },
        };
        if verified {
            Ok(())
        } else {
            Err(Error::CertificateChain(
                "certificate signature does not verify against its issuer".to_string(),
            ))
        }
    }
}

impl std::fmt::Debug for ParsedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedCertificate")
            .field("subject", &self.cert.tbs_certificate.subject.to_string())
            .field("der", &format!("{} bytes", self.der.len()))
            .finish()
    }
}

/// Verify an RSA PKCS#1 v1.5 signature.
pub(crate) fn verify_pkcs1v15<D>(key: RsaPublicKey, message: &[u8], signature: &[u8]) -> bool
where
    D: sha2::Digest + der::oid::AssociatedOid,
{
    let Ok(signature) = rsa::pkcs1v15::Signature::try_from(signature) else {
        return false;
    };
    rsa::pkcs1v15::VerifyingKey::<D>::new(key)
        .verify(message, &signature)
        .is_ok()
}

/// Subject, issuer and validity of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    /// Subject common name
    pub common_name: Option<String>,
    /// Subject distinguished name
    pub subject: String,
    /// Issuer distinguished name
    pub issuer: String,
    /// Start of the validity window
    pub not_before: DateTime<Utc>,
    /// End of the validity window
    pub not_after: DateTime<Utc>,
}

impl CertificateSummary {
    /// Read the summary with `x509-parser`.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| Error::CertificateChain(format!("cannot parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(str::to_string);
        let validity = cert.validity();

        Ok(Self {
            common_name,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before: timestamp(validity.not_before.timestamp())?,
            not_after: timestamp(validity.not_after.timestamp())?,
        })
    }

    /// Whether `at` falls inside the validity window.
    pub fn is_valid_at(&self, at: DateTime<FixedOffset>) -> bool {
        let at = at.with_timezone(&Utc);
        self.not_before <= at && at <= self.not_after
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| Error::CertificateChain(format!("invalid certificate time {}", seconds)))
}

/// Unlocked key material for one signing call.
pub struct SigningIdentity {
    private_key: RsaPrivateKey,
    certificate: ParsedCertificate,
    chain: Vec<ParsedCertificate>,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("certificate", &format!("{} bytes", self.certificate.der.len()))
            .field("private_key", &"[REDACTED]")
            .field("chain", &format!("{} certificates", self.chain.len()))
            .finish()
    }
}

impl SigningIdentity {
    /// The signer certificate.
    pub fn certificate(&self) -> &ParsedCertificate {
        &self.certificate
    }

    /// Other certificates from the bundle.
    pub fn chain(&self) -> &[ParsedCertificate] {
        &self.chain
    }

    /// Subject common name of the signer certificate.
    pub fn common_name(&self) -> Option<String> {
        self.certificate.summary().ok().and_then(|s| s.common_name)
    }

    /// RSA PKCS#1 v1.5 signature over `message`.
    pub fn sign(&self, message: &[u8], digest: DigestAlgorithm) -> Result<Vec<u8>> {
        let key = self.private_key.clone();
        let signature = match digest {
            DigestAlgorithm::Sha256 => rsa::pkcs1v15::SigningKey::<Sha256>::new(key)
                .try_sign(message)
                .map(|s| s.to_vec()),
            DigestAlgorithm::Sha384 => rsa::pkcs1v15::SigningKey::<Sha384>::new(key)
                .try_sign(message)
                .map(|s| s.to_vec()),
            DigestAlgorithm::Sha512 => rsa::pkcs1v15::SigningKey::<Sha512>::new(key)
                .try_sign(message)
                .map(|s| s.to_vec()),
        };
        signature.map_err(|e| Error::Signing(format!("RSA signing failed: {}", e)))
    }

    /// Validate the signer certificate and its issuers at `at`.
    ///
    /// Every certificate on the path must be inside its validity window and
    /// carry a valid signature from the next certificate, whose subject must
    /// equal its issuer. The path ends at a self-issued certificate or at the
    /// last issuer present in the bundle.
    pub fn validate_chain(&self, at: DateTime<FixedOffset>) -> Result<()> {
        let mut current = &self.certificate;
        for depth in 0..MAX_CHAIN_DEPTH {
            let summary = current.summary()?;
            if !summary.is_valid_at(at) {
                return Err(Error::CertificateChain(format!(
                    "certificate '{}' is not valid at {} (valid {} to {})",
                    summary.subject,
                    at.to_rfc3339(),
                    summary.not_before.to_rfc3339(),
                    summary.not_after.to_rfc3339()
                )));
            }

            if current.is_self_issued() {
                return current.verify_issued_by(current);
            }

            let issuer_name = &current.cert.tbs_certificate.issuer;
            let Some(issuer) = self
                .chain
                .iter()
                .find(|c| &c.cert.tbs_certificate.subject == issuer_name)
            else {
                log::debug!(
                    "Chain ends at depth {} with issuer '{}' outside the bundle",
                    depth,
                    summary.issuer
                );
                return Ok(());
            };

            current.verify_issued_by(issuer)?;
            current = issuer;
        }

        Err(Error::CertificateChain(format!(
            "certificate chain longer than {} links",
            MAX_CHAIN_DEPTH
        )))
    }
}
