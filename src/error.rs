//! Error types for the signing engine.
//!
//! This module defines all error types that can occur while preparing, signing,
//! finishing or verifying a PDF signature, plus the non-fatal
//! [`IntegrityRiskWarning`] reported by the post-signature pass.

use std::fmt;

/// Result type alias for signing engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during PDF signing.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Source document is unparseable, corrupt, encrypted or has no pages
    #[error("Document format error: {0}")]
    DocumentFormat(String),

    /// Wrong passphrase, malformed bundle or missing private key
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Certificate chain failed validation at signing time
    #[error("Certificate chain error: {0}")]
    CertificateChain(String),

    /// Encoded signature does not fit the reserved `/Contents` slot
    #[error("Signature needs {required} bytes but only {reserved} bytes are reserved")]
    ReservedSpaceExceeded {
        /// DER length of the signature container in bytes
        required: usize,
        /// Reserved capacity of the placeholder in bytes
        reserved: usize,
    },

    /// CMS/RSA encoding or signing failure
    #[error("Signing error: {0}")]
    Signing(String),

    /// Stamp or QR code rendering failure
    #[error("Appearance error: {0}")]
    Appearance(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::DocumentFormat(err.to_string())
    }
}

/// Non-fatal warning raised whenever a signed document is modified afterwards.
///
/// A full re-save shifts object offsets so the byte-range digest no longer
/// matches the embedded signature. An incremental redraw keeps the digest
/// intact but leaves bytes outside the signed range.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IntegrityRiskWarning {
    /// Name of the post-signature pass that produced the warning
    pub pass: String,
    /// Whether the embedded signature still verifies after the pass
    pub signature_verifies: bool,
    /// Human readable explanation
    pub message: String,
}

impl IntegrityRiskWarning {
    /// Create a warning for the named pass.
    pub fn new(pass: impl Into<String>, signature_verifies: bool) -> Self {
        let pass = pass.into();
        let message = if signature_verifies {
            format!(
                "{} appended bytes after the signed range; the signature no longer covers the whole document",
                pass
            )
        } else {
            format!(
                "{} re-serialized the signed document; the byte-range digest no longer matches the embedded signature",
                pass
            )
        };
        Self {
            pass,
            signature_verifies,
            message,
        }
    }
}

impl fmt::Display for IntegrityRiskWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Integrity risk: {}", self.message)
    }
}
