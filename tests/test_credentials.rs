//! Integration tests for PKCS#12 bundles and signing identities.

mod common;

use common::*;
use pades_signer::error::Error;
use pades_signer::signatures::{CertificateBundle, DigestAlgorithm};
use std::io::Write;
use tempfile::NamedTempFile;

mod bundle_tests {
    use super::*;

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&fixture_bytes("signer.p12")).unwrap();

        let bundle = CertificateBundle::from_file(file.path()).unwrap();
        assert_eq!(bundle.len(), fixture_bytes("signer.p12").len());
        assert!(!bundle.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = CertificateBundle::from_file(dir.path().join("absent.p12")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_not_a_bundle() {
        let err = CertificateBundle::from_pkcs12_bytes(b"%PDF-1.7".to_vec()).unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
    }

    #[test]
    fn test_debug_hides_contents() {
        let debug = format!("{:?}", bundle("signer.p12"));
        assert!(debug.contains("[ENCRYPTED]"));
        assert!(!debug.contains(PASSPHRASE));
    }

    #[test]
    fn test_bundle_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CertificateBundle>();
    }

    #[test]
    fn test_clones_share_bytes() {
        let original = bundle("signer.p12");
        let copy = original.clone();
        assert_eq!(copy.len(), original.len());
        assert!(copy.unlock(PASSPHRASE).is_ok());
    }
}

mod identity_tests {
    use super::*;

    #[test]
    fn test_wrong_passphrase() {
        let err = bundle("signer.p12").unlock("clinic").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
    }

    #[test]
    fn test_openssl3_default_bundle() {
        let modern = bundle("modern.p12").unlock(PASSPHRASE).unwrap();
        let legacy = bundle("signer.p12").unlock(PASSPHRASE).unwrap();

        assert_eq!(modern.certificate().der(), legacy.certificate().der());
        assert!(modern.validate_chain(signing_time()).is_ok());
        assert_eq!(modern.sign(b"attrs", DigestAlgorithm::Sha256).unwrap().len(), 256);
    }

    #[test]
    fn test_openssl3_default_bundle_wrong_passphrase() {
        let err = bundle("modern.p12").unlock("clinic").unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
    }

    #[test]
    fn test_common_names() {
        let signer = bundle("signer.p12").unlock(PASSPHRASE).unwrap();
        assert_eq!(signer.common_name().as_deref(), Some("Dr. Ana Souza"));
        assert!(signer.chain().is_empty());

        let chained = bundle("chain.p12").unlock(PASSPHRASE).unwrap();
        assert_eq!(chained.common_name().as_deref(), Some("Dr. Bruno Lima"));
        assert_eq!(chained.chain().len(), 1);
    }

    #[test]
    fn test_issuer_summary() {
        let identity = bundle("chain.p12").unlock(PASSPHRASE).unwrap();
        let leaf = identity.certificate().summary().unwrap();
        let ca = identity.chain()[0].summary().unwrap();

        assert!(leaf.issuer.contains("Clinica Exemplo Issuing CA"));
        assert_eq!(ca.common_name.as_deref(), Some("Clinica Exemplo Issuing CA"));
        assert!(leaf.is_valid_at(signing_time()));
    }

    #[test]
    fn test_chain_validation() {
        let at = signing_time();
        assert!(bundle("signer.p12").unlock(PASSPHRASE).unwrap().validate_chain(at).is_ok());
        assert!(bundle("chain.p12").unlock(PASSPHRASE).unwrap().validate_chain(at).is_ok());

        let expired = bundle("expired.p12").unlock(PASSPHRASE).unwrap();
        assert!(matches!(expired.validate_chain(at), Err(Error::CertificateChain(_))));

        let broken = bundle("broken_chain.p12").unlock(PASSPHRASE).unwrap();
        assert!(matches!(broken.validate_chain(at), Err(Error::CertificateChain(_))));
    }

    #[test]
    fn test_signature_length_matches_key() {
        let identity = bundle("signer.p12").unlock(PASSPHRASE).unwrap();
        for digest in [DigestAlgorithm::Sha256, DigestAlgorithm::Sha384, DigestAlgorithm::Sha512] {
            assert_eq!(identity.sign(b"signed attributes", digest).unwrap().len(), 256);
        }
    }
}
