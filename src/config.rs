//! Configuration for the signing engine.

use crate::geometry::SignatureGeometry;
use crate::signatures::finisher::FinishMode;
use crate::signatures::types::{DigestAlgorithm, SignatureSubFilter};

/// Default size of the `/Contents` slot in bytes.
pub const DEFAULT_RESERVED_CAPACITY: usize = 16384;

/// Which page receives the signature widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSelector {
    /// The last page of the document.
    #[default]
    Last,
    /// A zero-based page index.
    Index(usize),
}

impl PageSelector {
    /// Resolve against a page count. `None` when the index is out of range or
    /// the document has no pages.
    pub fn resolve(&self, page_count: usize) -> Option<usize> {
        match *self {
            PageSelector::Last => page_count.checked_sub(1),
            PageSelector::Index(index) if index < page_count => Some(index),
            PageSelector::Index(_) => None,
        }
    }
}

/// Optional pass that redraws the stamp after the signature is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostSignPass {
    /// No post-signature modification (recommended).
    #[default]
    Disabled,
    /// Redraw the stamp with the given finishing mode.
    Redraw(FinishMode),
}

/// Fixed text printed in the visual stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampLabels {
    /// Title in the header bar
    pub title: String,
    /// Trust mark at the right of the header bar
    pub trust_mark: String,
    /// Italic line pinned to the bottom of the block
    pub disclaimer: String,
    /// Prefix for generated signature field names
    pub field_name_prefix: String,
}

impl Default for StampLabels {
    fn default() -> Self {
        Self {
            title: "DIGITALLY SIGNED DOCUMENT".to_string(),
            trust_mark: "ICP-Brasil".to_string(),
            disclaimer: "Legally valid electronic signature (MP 2.200-2/2001).".to_string(),
            field_name_prefix: "Signature".to_string(),
        }
    }
}

impl StampLabels {
    /// Set the header title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the trust mark label.
    pub fn with_trust_mark(mut self, trust_mark: impl Into<String>) -> Self {
        self.trust_mark = trust_mark.into();
        self
    }

    /// Set the disclaimer line.
    pub fn with_disclaimer(mut self, disclaimer: impl Into<String>) -> Self {
        self.disclaimer = disclaimer.into();
        self
    }
}

/// Signing engine configuration.
///
/// # Examples
///
/// ```
/// use pades_signer::config::{PageSelector, SignerConfig};
///
/// let config = SignerConfig::default()
///     .with_reserved_capacity(32768)
///     .with_page(PageSelector::Index(0));
/// assert_eq!(config.reserved_capacity, 32768);
/// assert!(config.verify_after_signing);
/// ```
#[derive(Debug, Clone)]
pub struct SignerConfig {
    /// Size of the `/Contents` slot in bytes.
    pub reserved_capacity: usize,

    /// Digest used for the byte ranges and the CMS signed attributes.
    pub digest_algorithm: DigestAlgorithm,

    /// Signature format written to `/SubFilter`.
    pub sub_filter: SignatureSubFilter,

    /// Block geometry used when the request has no explicit rectangle.
    pub geometry: SignatureGeometry,

    /// Stamp texts.
    pub labels: StampLabels,

    /// Page receiving the widget.
    pub page: PageSelector,

    /// Post-signature redraw.
    pub post_sign: PostSignPass,

    /// Verify the final bytes before returning them.
    pub verify_after_signing: bool,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerConfig {
    /// Create new configuration with defaults.
    pub fn new() -> Self {
        Self {
            reserved_capacity: DEFAULT_RESERVED_CAPACITY,
            digest_algorithm: DigestAlgorithm::Sha256,
            sub_filter: SignatureSubFilter::Pkcs7Detached,
            geometry: SignatureGeometry::default(),
            labels: StampLabels::default(),
            page: PageSelector::Last,
            post_sign: PostSignPass::Disabled,
            verify_after_signing: true,
        }
    }

    /// Set the reserved `/Contents` capacity in bytes.
    pub fn with_reserved_capacity(mut self, capacity: usize) -> Self {
        self.reserved_capacity = capacity;
        self
    }

    /// Set the digest algorithm.
    pub fn with_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = algorithm;
        self
    }

    /// Set the signature sub-filter.
    pub fn with_sub_filter(mut self, sub_filter: SignatureSubFilter) -> Self {
        self.sub_filter = sub_filter;
        self
    }

    /// Set the block geometry.
    pub fn with_geometry(mut self, geometry: SignatureGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Set the stamp labels.
    pub fn with_labels(mut self, labels: StampLabels) -> Self {
        self.labels = labels;
        self
    }

    /// Select the page receiving the widget.
    pub fn with_page(mut self, page: PageSelector) -> Self {
        self.page = page;
        self
    }

    /// Enable a post-signature redraw.
    pub fn with_post_sign(mut self, pass: PostSignPass) -> Self {
        self.post_sign = pass;
        self
    }

    /// Enable or disable verification of the final bytes.
    pub fn with_verify_after_signing(mut self, enable: bool) -> Self {
        self.verify_after_signing = enable;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SignerConfig::default();
        assert_eq!(config.reserved_capacity, 16384);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.sub_filter, SignatureSubFilter::Pkcs7Detached);
        assert_eq!(config.page, PageSelector::Last);
        assert_eq!(config.post_sign, PostSignPass::Disabled);
        assert!(config.verify_after_signing);
    }

    #[test]
    fn test_builder() {
        let config = SignerConfig::new()
            .with_digest_algorithm(DigestAlgorithm::Sha512)
            .with_sub_filter(SignatureSubFilter::CadesDetached)
            .with_post_sign(PostSignPass::Redraw(FinishMode::IncrementalUpdate))
            .with_labels(StampLabels::default().with_title("SIGNED"))
            .with_verify_after_signing(false);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha512);
        assert_eq!(config.sub_filter, SignatureSubFilter::CadesDetached);
        assert_eq!(config.labels.title, "SIGNED");
        assert!(!config.verify_after_signing);
    }

    #[test]
    fn test_page_selector() {
        assert_eq!(PageSelector::Last.resolve(3), Some(2));
        assert_eq!(PageSelector::Last.resolve(0), None);
        assert_eq!(PageSelector::Index(0).resolve(3), Some(0));
        assert_eq!(PageSelector::Index(3).resolve(3), None);
    }
}
