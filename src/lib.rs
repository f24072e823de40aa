// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::too_many_arguments)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::len_without_is_empty)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # pades_signer
//!
//! PAdES-style digital signing engine for PDF documents.
//!
//! ## Core Features
//!
//! - **Byte-stable placeholders**: a fixed-size `/Contents` slot and a
//!   fixed-width `/ByteRange` written in one append-only incremental update
//!   (ISO 32000-1:2008, 7.5.6 and 12.8)
//! - **Detached CMS signatures**: RSA PKCS#1 v1.5 over signed attributes
//!   (content-type, message-digest, signing-time, ESS signing-certificate-v2)
//!   from password-protected PKCS#12 bundles
//! - **In-place splice**: the signature replaces the zero-filled placeholder
//!   without changing the file length
//! - **Visible stamp**: header bar, QR code, text block and disclaimer as the
//!   widget appearance
//! - **Verification**: byte-range digest and signature checks for the
//!   signatures this crate writes
//!
//! ## Architecture
//!
//! ```text
//! SignRequest + SignerConfig
//!     ↓
//! [CertificateBundle::unlock] → chain validation at signing time
//!     ↓
//! [SignatureGeometry::resolve] → widget rectangle
//!     ↓
//! [PlaceholderInserter] (stamp + field + reserved slot, one revision)
//!     ↓
//! [PdfSigner] (digest byte ranges, build CMS, splice)
//!     ↓
//! [PostSignFinisher] (optional, always warns)
//!     ↓
//! [SignatureVerifier] → SignedDocument
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use pades_signer::config::SignerConfig;
//! use pades_signer::signatures::{sign_document, CertificateBundle, SignRequest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bundle = CertificateBundle::from_file("doctor.p12")?;
//! let pdf = std::fs::read("prescription.pdf")?;
//!
//! let request = SignRequest::new()
//!     .with_registry_id("CRM-SP 123456")
//!     .with_role("Physician")
//!     .with_contact("clinic@example.com")
//!     .with_location("Sao Paulo")
//!     .with_reason("Medical prescription");
//!
//! let signed = sign_document(&pdf, &bundle, "passphrase", &request, &SignerConfig::default())?;
//! assert_eq!(signed.byte_range[0], 0);
//! std::fs::write("prescription-signed.pdf", &signed.bytes)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Page geometry
pub mod geometry;

// Source document model
pub mod document;

// PDF writing (stamp, serialization, incremental updates)
pub mod writer;

// Digital signatures
pub mod signatures;

// Re-exports
pub use config::{PageSelector, PostSignPass, SignerConfig, StampLabels};
pub use error::{Error, IntegrityRiskWarning, Result};
pub use signatures::{sign_document, CertificateBundle, SignRequest, SignedDocument};

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        // VERSION is populated from CARGO_PKG_VERSION at compile time
        assert!(VERSION.starts_with("0."));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "pades_signer");
    }
}
