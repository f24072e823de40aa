//! PDF Digital Signatures module.
//!
//! This module creates and verifies PAdES-style digital signatures in PDF
//! documents.
//!
//! ## Features
//!
//! - **Placeholder insertion**: signature field, visible stamp and a
//!   fixed-size `/Contents` slot, appended as one incremental update
//! - **Signature creation**: detached CMS from a PKCS#12 bundle, spliced into
//!   the slot without moving any byte
//! - **Signature verification**: byte-range digest and RSA signature checks
//! - **Certificate handling**: PKCS#12 unlocking and chain validation
//!
//! ## Signature Types Supported
//!
//! - PKCS#7 detached signatures (adbe.pkcs7.detached)
//! - PAdES signatures (ETSI.CAdES.detached)
//!
//! ## Example
//!
//! ```no_run
//! use pades_signer::config::SignerConfig;
//! use pades_signer::signatures::{sign_document, CertificateBundle, SignRequest, SignatureVerifier};
//!
//! let bundle = CertificateBundle::from_file("doctor.p12")?;
//! let pdf = std::fs::read("document.pdf")?;
//!
//! let signed = sign_document(&pdf, &bundle, "passphrase", &SignRequest::new(), &SignerConfig::default())?;
//!
//! let result = SignatureVerifier::new().verify_document(&signed.bytes)?;
//! assert!(result.status.is_valid());
//! # Ok::<(), pades_signer::Error>(())
//! ```
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - ISO 32000-1:2008 Section 7.5.6 - Incremental Updates
//! - ETSI EN 319 142 - PAdES

pub mod byterange;
pub mod cms;
pub mod credentials;
pub mod finisher;
pub mod pipeline;
pub mod placeholder;
pub mod signer;
pub mod types;
pub mod verifier;

pub use byterange::ByteRangeCalculator;
pub use credentials::{CertificateBundle, CertificateSummary, ParsedCertificate, SigningIdentity};
pub use finisher::{FinishMode, FinishOutcome, PostSignFinisher};
pub use pipeline::sign_document;
pub use placeholder::{PlaceholderInserter, PlaceholderRequest, PreparedDocument};
pub use signer::{PdfSigner, SignOptions, SignOutcome};
pub use types::{
    DigestAlgorithm, SignRequest, SignatureInfo, SignatureSubFilter, SignedDocument,
    StampDescriptor, VerificationResult, VerificationStatus,
};
pub use verifier::SignatureVerifier;
