//! Detached CMS (PKCS#7) SignedData containers.
//!
//! [`build_detached_signed_data`] produces the DER placed in a signature's
//! `/Contents`; [`ParsedSignedData`] reads one back for verification.
//!
//! Signed attributes:
//! - content-type (`id-data`)
//! - message-digest of the byte ranges
//! - signing-time (`adbe.pkcs7.detached` only)
//! - ESS signing-certificate-v2

use super::credentials::{verify_pkcs1v15, ParsedCertificate, SigningIdentity};
use super::types::DigestAlgorithm;
use crate::error::{Error, Result};
use chrono::{DateTime, FixedOffset};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo, SignerInfos,
};
use der::asn1::{Any, GeneralizedTime, ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Decode, Encode, Header, Reader, Sequence, SliceReader};
use sha2::{Sha256, Sha384, Sha512};
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::Attribute;
use x509_cert::time::Time;

const ID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
const ID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
const ID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
const ID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
const ID_AA_SIGNING_CERTIFICATE_V2: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.16.2.47");

/// ESSCertIDv2 (RFC 5035). `hash_algorithm` is absent for SHA-256, its default.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct EssCertIdV2 {
    #[asn1(optional = "true")]
    hash_algorithm: Option<AlgorithmIdentifierOwned>,
    cert_hash: OctetString,
}

/// SigningCertificateV2 without policies.
#[derive(Clone, Debug, Eq, PartialEq, Sequence)]
struct SigningCertificateV2 {
    certs: Vec<EssCertIdV2>,
}

/// RSA PKCS#1 v1.5 signature algorithm OID for a digest.
fn rsa_signature_oid(digest: DigestAlgorithm) -> ObjectIdentifier {
    match digest {
        DigestAlgorithm::Sha256 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"),
        DigestAlgorithm::Sha384 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12"),
        DigestAlgorithm::Sha512 => ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13"),
    }
}

fn encoding_error(e: der::Error) -> Error {
    Error::Signing(format!("CMS encoding failed: {}", e))
}

fn attribute(oid: ObjectIdentifier, value: Any) -> Result<Attribute> {
    let values = SetOfVec::try_from(vec![value]).map_err(encoding_error)?;
    Ok(Attribute { oid, values })
}

fn signing_certificate_v2(cert_der: &[u8], digest: DigestAlgorithm) -> Result<Any> {
    let hash_algorithm = match digest {
        DigestAlgorithm::Sha256 => None,
        other => Some(AlgorithmIdentifierOwned {
            oid: other.oid(),
            parameters: None,
        }),
    };
    let cert_hash = OctetString::new(digest.digest(&[cert_der])).map_err(encoding_error)?;
    let value = SigningCertificateV2 {
        certs: vec![EssCertIdV2 {
            hash_algorithm,
            cert_hash,
        }],
    };
    Any::encode_from(&value).map_err(encoding_error)
}

/// UTCTime through 2049, GeneralizedTime afterwards.
fn attribute_time(time: DateTime<FixedOffset>) -> Result<Time> {
    let seconds = u64::try_from(time.timestamp()).map_err(|_| {
        Error::Signing(format!("signing time {} precedes the epoch", time.to_rfc3339()))
    })?;
    let date = der::DateTime::from_unix_duration(std::time::Duration::from_secs(seconds))
        .map_err(encoding_error)?;
    if date.year() <= UtcTime::MAX_YEAR {
        Ok(UtcTime::from_date_time(date).map_err(encoding_error)?.into())
    } else {
        Ok(GeneralizedTime::from_date_time(date).into())
    }
}

/// Build the signed attributes for a content digest.
fn signed_attributes(
    identity: &SigningIdentity,
    content_digest: &[u8],
    digest: DigestAlgorithm,
    signing_time: Option<DateTime<FixedOffset>>,
) -> Result<SetOfVec<Attribute>> {
    let mut attrs = vec![
        attribute(ID_CONTENT_TYPE, Any::encode_from(&ID_DATA).map_err(encoding_error)?)?,
        attribute(
            ID_MESSAGE_DIGEST,
            Any::encode_from(&OctetString::new(content_digest).map_err(encoding_error)?)
                .map_err(encoding_error)?,
        )?,
        attribute(
            ID_AA_SIGNING_CERTIFICATE_V2,
            signing_certificate_v2(identity.certificate().der(), digest)?,
        )?,
    ];
    if let Some(time) = signing_time {
        attrs.push(attribute(
            ID_SIGNING_TIME,
            Any::encode_from(&attribute_time(time)?).map_err(encoding_error)?,
        )?);
    }
    // SET OF ordering is applied on conversion
    SetOfVec::try_from(attrs).map_err(encoding_error)
}

/// Build a DER-encoded detached SignedData over `content_digest`.
///
/// `signing_time` adds the signing-time attribute when present. The RSA
/// signature covers the DER of the signed attributes as a SET OF.
///
/// The signer certificate and its chain are stored as a SET OF, so they
/// appear in DER order rather than signer first. Readers locate the signer
/// through the signer info's issuer and serial number.
pub fn build_detached_signed_data(
    identity: &SigningIdentity,
    content_digest: &[u8],
    digest: DigestAlgorithm,
    signing_time: Option<DateTime<FixedOffset>>,
) -> Result<Vec<u8>> {
    let signed_attrs = signed_attributes(identity, content_digest, digest, signing_time)?;
    let to_be_signed = signed_attrs.to_der().map_err(encoding_error)?;
    let signature = identity.sign(&to_be_signed, digest)?;

    let signer_cert = identity.certificate().certificate();
    let sid = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: signer_cert.tbs_certificate.issuer.clone(),
        serial_number: signer_cert.tbs_certificate.serial_number.clone(),
    });

    let digest_alg = AlgorithmIdentifierOwned {
        oid: digest.oid(),
        parameters: None,
    };
    let signer_info = SignerInfo {
        version: CmsVersion::V1,
        sid,
        digest_alg: digest_alg.clone(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: rsa_signature_oid(digest),
            parameters: Some(Any::null()),
        },
        signature: OctetString::new(signature).map_err(encoding_error)?,
        unsigned_attrs: None,
    };

    let certificates = std::iter::once(identity.certificate())
        .chain(identity.chain().iter())
        .map(|c| CertificateChoices::Certificate(c.certificate().clone()))
        .collect::<Vec<_>>();

    let signed_data = SignedData {
        version: CmsVersion::V1,
        digest_algorithms: SetOfVec::try_from(vec![digest_alg]).map_err(encoding_error)?,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: ID_DATA,
            econtent: None,
        },
        certificates: Some(CertificateSet(
            SetOfVec::try_from(certificates).map_err(encoding_error)?,
        )),
        crls: None,
        signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).map_err(encoding_error)?),
    };

    let content_info = ContentInfo {
        content_type: ID_SIGNED_DATA,
        content: Any::encode_from(&signed_data).map_err(encoding_error)?,
    };
    let der = content_info.to_der().map_err(encoding_error)?;

    log::debug!(
        "Built CMS SignedData: {} bytes, {} certificates, digest {}",
        der.len(),
        identity.chain().len() + 1,
        digest.name()
    );
    Ok(der)
}

/// Length of the leading DER element, ignoring trailing padding.
pub fn der_element_len(bytes: &[u8]) -> Result<usize> {
    let invalid = |e: der::Error| Error::Signing(format!("invalid DER header: {}", e));
    let mut reader = SliceReader::new(bytes).map_err(invalid)?;
    let header = Header::decode(&mut reader).map_err(invalid)?;
    let total = (reader.position() + header.length).map_err(invalid)?;
    usize::try_from(total).map_err(invalid)
}

fn decode_any<T: for<'a> Decode<'a>>(value: &Any) -> Result<T> {
    let der = value.to_der().map_err(encoding_error)?;
    T::from_der(&der).map_err(|e| Error::Signing(format!("malformed CMS attribute: {}", e)))
}

/// The parts of a detached SignedData needed for verification.
#[derive(Debug, Clone)]
pub struct ParsedSignedData {
    /// Digest algorithm of the signer info
    pub digest_algorithm: DigestAlgorithm,
    /// message-digest attribute value
    pub message_digest: Vec<u8>,
    /// signing-time attribute, seconds since the epoch
    pub signing_time: Option<i64>,
    /// DER of the signed attributes as a SET OF
    pub signed_attrs_der: Vec<u8>,
    /// RSA signature value
    pub signature: Vec<u8>,
    /// Certificate identified by the signer info
    pub signer_certificate: ParsedCertificate,
    /// Every certificate embedded in the container, signer included
    pub certificates: Vec<ParsedCertificate>,
}

impl ParsedSignedData {
    /// Parse a ContentInfo, tolerating the zero padding of a `/Contents` slot.
    pub fn parse(contents: &[u8]) -> Result<Self> {
        let len = der_element_len(contents)?;
        let malformed = |e: der::Error| Error::Signing(format!("malformed CMS container: {}", e));

        let content_info = ContentInfo::from_der(&contents[..len.min(contents.len())])
            .map_err(malformed)?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(Error::Signing(format!(
                "unexpected CMS content type {}",
                content_info.content_type
            )));
        }
        let signed_data: SignedData = decode_any(&content_info.content)?;

        let signer_info = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| Error::Signing("CMS container has no signer info".to_string()))?;

        let digest_algorithm = DigestAlgorithm::from_oid(&signer_info.digest_alg.oid)
            .ok_or_else(|| {
                Error::Unsupported(format!("digest algorithm {}", signer_info.digest_alg.oid))
            })?;

        let signed_attrs = signer_info
            .signed_attrs
            .as_ref()
            .ok_or_else(|| Error::Signing("CMS signer info has no signed attributes".to_string()))?;

        let mut message_digest = None;
        let mut signing_time = None;
        for attr in signed_attrs.iter() {
            let Some(value) = attr.values.iter().next() else {
                continue;
            };
            if attr.oid == ID_MESSAGE_DIGEST {
                let digest: OctetString = decode_any(value)?;
                message_digest = Some(digest.as_bytes().to_vec());
            } else if attr.oid == ID_SIGNING_TIME {
                if let Ok(time) = decode_any::<Time>(value) {
                    signing_time = i64::try_from(time.to_unix_duration().as_secs()).ok();
                }
            }
        }
        let message_digest = message_digest
            .ok_or_else(|| Error::Signing("CMS signer info has no message digest".to_string()))?;

        let certificates = embedded_certificates(&signed_data)?;
        let signer_certificate = find_signer_certificate(&certificates, &signer_info.sid)?;

        Ok(Self {
            digest_algorithm,
            message_digest,
            signing_time,
            signed_attrs_der: signed_attrs.to_der().map_err(encoding_error)?,
            signature: signer_info.signature.as_bytes().to_vec(),
            signer_certificate,
            certificates,
        })
    }

    /// Verify the RSA signature over the signed attributes.
    pub fn verify_signature(&self) -> Result<bool> {
        let key = self.signer_certificate.rsa_public_key()?;
        let message = &self.signed_attrs_der;
        Ok(match self.digest_algorithm {
            DigestAlgorithm::Sha256 => verify_pkcs1v15::<Sha256>(key, message, &self.signature),
            DigestAlgorithm::Sha384 => verify_pkcs1v15::<Sha384>(key, message, &self.signature),
            DigestAlgorithm::Sha512 => verify_pkcs1v15::<Sha512>(key, message, &self.signature),
        })
    }
}

fn embedded_certificates(signed_data: &SignedData) -> Result<Vec<ParsedCertificate>> {
    let certificates = signed_data
        .certificates
        .as_ref()
        .ok_or_else(|| Error::Signing("CMS container carries no certificates".to_string()))?;

    certificates
        .0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert),
            _ => None,
        })
        .map(|cert| ParsedCertificate::from_der(&cert.to_der().map_err(encoding_error)?))
        .collect()
}

fn find_signer_certificate(
    certificates: &[ParsedCertificate],
    sid: &SignerIdentifier,
) -> Result<ParsedCertificate> {
    let SignerIdentifier::IssuerAndSerialNumber(id) = sid else {
        return Err(Error::Unsupported(
            "signer identified by subject key identifier".to_string(),
        ));
    };

    certificates
        .iter()
        .find(|parsed| {
            let tbs = &parsed.certificate().tbs_certificate;
            tbs.issuer == id.issuer && tbs.serial_number == id.serial_number
        })
        .cloned()
        .ok_or_else(|| Error::Signing("signer certificate not found in CMS container".to_string()))
}
