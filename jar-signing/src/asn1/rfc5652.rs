// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The subset of RFC 5652 (Cryptographic Message Syntax) used by Java
//! archive signature blocks.

use {
    crate::asn1::common::{
        take_opt_sequence_raw, take_sequence_raw, take_version, AlgorithmIdentifier, RawDer,
    },
    bcder::{
        decode::{Constructed, DecodeError, Source},
        encode::{self, PrimitiveContent, Values},
        ConstOid, Integer, Mode, OctetString, Oid, Tag,
    },
    std::{convert::Infallible, io::Write},
};

/// The data content type.
///
/// 1.2.840.113549.1.7.1
pub const OID_ID_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 1]);

/// The signed-data content type.
///
/// 1.2.840.113549.1.7.2
pub const OID_ID_SIGNED_DATA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 7, 2]);

/// Content info.
///
/// ```ASN.1
/// ContentInfo ::= SEQUENCE {
///   contentType ContentType,
///   content [0] EXPLICIT ANY DEFINED BY contentType }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContentInfo {
    pub content_type: Oid,
    /// The encoded content value.
    pub content: RawDer,
}

impl ContentInfo {
    /// Decode BER or DER data.
    pub fn from_ber(data: &[u8]) -> Result<Self, DecodeError<Infallible>> {
        Constructed::decode(data, Mode::Ber, |cons| Self::take_from(cons))
    }

    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| Self::from_sequence(cons))
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| Self::from_sequence(cons))
    }

    fn from_sequence<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let content_type = Oid::take_from(cons)?;
        let content = cons.take_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?;

        Ok(Self {
            content_type,
            content: content.into(),
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            encode::sequence_as(Tag::CTX_0, &self.content),
        ))
    }

    /// Obtain the DER encoding of this instance.
    pub fn to_der(&self) -> Vec<u8> {
        RawDer::from_values(self.encode_ref()).as_slice().to_vec()
    }

    /// Decode the content as [SignedData].
    pub fn signed_data(&self) -> Result<SignedData, DecodeError<Infallible>> {
        let is_signed_data = self.content_type == OID_ID_SIGNED_DATA;

        self.content.decode(|cons| {
            if is_signed_data {
                SignedData::take_from(cons)
            } else {
                Err(cons.content_err("content type is not signed-data"))
            }
        })
    }
}

impl Values for ContentInfo {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Signed data.
///
/// ```ASN.1
/// SignedData ::= SEQUENCE {
///   version CMSVersion,
///   digestAlgorithms DigestAlgorithmIdentifiers,
///   encapContentInfo EncapsulatedContentInfo,
///   certificates [0] IMPLICIT CertificateSet OPTIONAL,
///   crls [1] IMPLICIT RevocationInfoChoices OPTIONAL,
///   signerInfos SignerInfos }
/// ```
///
/// Certificates are only understood in their plain X.509 form and are kept
/// as encoded. Revocation info is not interpreted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignedData {
    pub version: u8,
    pub digest_algorithms: Vec<AlgorithmIdentifier>,
    pub content_info: EncapsulatedContentInfo,
    pub certificates: Option<Vec<RawDer>>,
    pub crls: Option<RawDer>,
    pub signer_infos: Vec<SignerInfo>,
}

impl SignedData {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let version = take_version(cons)?;

            let digest_algorithms = cons.take_set(|cons| {
                let mut algorithms = vec![];

                while let Some(algorithm) = AlgorithmIdentifier::take_opt_from(cons)? {
                    algorithms.push(algorithm);
                }

                Ok(algorithms)
            })?;

            let content_info = EncapsulatedContentInfo::take_from(cons)?;

            let certificates = cons.take_opt_constructed_if(Tag::CTX_0, |cons| {
                let mut certificates = vec![];

                while let Some(certificate) = take_opt_sequence_raw(cons)? {
                    certificates.push(certificate);
                }

                Ok(certificates)
            })?;

            let crls = cons
                .take_opt_constructed_if(Tag::CTX_1, |cons| cons.capture_all())?
                .map(RawDer::from);

            let signer_infos = cons.take_set(|cons| {
                let mut infos = vec![];

                while let Some(info) = SignerInfo::take_opt_from(cons)? {
                    infos.push(info);
                }

                Ok(infos)
            })?;

            Ok(Self {
                version,
                digest_algorithms,
                content_info,
                certificates,
                crls,
                signer_infos,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            encode::set(&self.digest_algorithms),
            self.content_info.encode_ref(),
            self.certificates
                .as_ref()
                .map(|certificates| encode::set_as(Tag::CTX_0, certificates)),
            self.crls
                .as_ref()
                .map(|crls| encode::set_as(Tag::CTX_1, crls)),
            encode::set(&self.signer_infos),
        ))
    }

    /// Wrap this instance in a [ContentInfo].
    pub fn to_content_info(&self) -> ContentInfo {
        ContentInfo {
            content_type: Oid(bytes::Bytes::copy_from_slice(OID_ID_SIGNED_DATA.as_ref())),
            content: RawDer::from_values(self.encode_ref()),
        }
    }

    /// Iterate over the encoded certificates.
    pub fn certificates(&self) -> impl Iterator<Item = &RawDer> {
        self.certificates.iter().flatten()
    }
}

/// Encapsulated content info.
///
/// ```ASN.1
/// EncapsulatedContentInfo ::= SEQUENCE {
///   eContentType ContentType,
///   eContent [0] EXPLICIT OCTET STRING OPTIONAL }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncapsulatedContentInfo {
    pub content_type: Oid,
    pub content: Option<OctetString>,
}

impl EncapsulatedContentInfo {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let content_type = Oid::take_from(cons)?;
            let content =
                cons.take_opt_constructed_if(Tag::CTX_0, |cons| OctetString::take_from(cons))?;

            Ok(Self {
                content_type,
                content,
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.content_type.encode_ref(),
            self.content
                .as_ref()
                .map(|content| encode::sequence_as(Tag::CTX_0, content.encode_ref())),
        ))
    }
}

/// Per-signer information.
///
/// ```ASN.1
/// SignerInfo ::= SEQUENCE {
///   version CMSVersion,
///   sid SignerIdentifier,
///   digestAlgorithm DigestAlgorithmIdentifier,
///   signedAttrs [0] IMPLICIT SignedAttributes OPTIONAL,
///   signatureAlgorithm SignatureAlgorithmIdentifier,
///   signature SignatureValue,
///   unsignedAttrs [1] IMPLICIT UnsignedAttributes OPTIONAL }
/// ```
///
/// Signed attributes are kept as their encoded SET content.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SignerInfo {
    pub version: u8,
    pub sid: SignerIdentifier,
    pub digest_algorithm: AlgorithmIdentifier,
    pub signed_attributes: Option<RawDer>,
    pub signature_algorithm: AlgorithmIdentifier,
    pub signature: OctetString,
    pub unsigned_attributes: Vec<Attribute>,
}

impl SignerInfo {
    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| Self::from_sequence(cons))
    }

    fn from_sequence<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        let version = take_version(cons)?;
        let sid = SignerIdentifier::take_from(cons)?;
        let digest_algorithm = AlgorithmIdentifier::take_from(cons)?;
        let signed_attributes = cons
            .take_opt_constructed_if(Tag::CTX_0, |cons| cons.capture_all())?
            .map(RawDer::from);
        let signature_algorithm = AlgorithmIdentifier::take_from(cons)?;
        let signature = OctetString::take_from(cons)?;
        let unsigned_attributes = cons
            .take_opt_constructed_if(Tag::CTX_1, |cons| {
                let mut attributes = vec![];

                while let Some(attribute) = Attribute::take_opt_from(cons)? {
                    attributes.push(attribute);
                }

                Ok(attributes)
            })?
            .unwrap_or_default();

        Ok(Self {
            version,
            sid,
            digest_algorithm,
            signed_attributes,
            signature_algorithm,
            signature,
            unsigned_attributes,
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((
            self.version.encode(),
            &self.sid,
            &self.digest_algorithm,
            self.signed_attributes
                .as_ref()
                .map(|attributes| encode::set_as(Tag::CTX_0, attributes)),
            &self.signature_algorithm,
            self.signature.encode_ref(),
            if self.unsigned_attributes.is_empty() {
                None
            } else {
                Some(encode::set_as(Tag::CTX_1, &self.unsigned_attributes))
            },
        ))
    }

    /// Append an unsigned attribute.
    ///
    /// Attributes are kept in DER SET OF order.
    pub fn add_unsigned_attribute(&mut self, attribute: Attribute) {
        self.unsigned_attributes.push(attribute);
        self.unsigned_attributes
            .sort_by_cached_key(|a| RawDer::from_values(a.encode_ref()).as_slice().to_vec());
    }

    /// Find the first unsigned attribute of a given type.
    pub fn unsigned_attribute(&self, typ: &Oid) -> Option<&Attribute> {
        self.unsigned_attributes.iter().find(|a| &a.typ == typ)
    }
}

impl Values for SignerInfo {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}

/// Identifies the signer's certificate.
///
/// ```ASN.1
/// SignerIdentifier ::= CHOICE {
///   issuerAndSerialNumber IssuerAndSerialNumber,
///   subjectKeyIdentifier [0] SubjectKeyIdentifier }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SignerIdentifier {
    IssuerAndSerialNumber(IssuerAndSerialNumber),
    SubjectKeyIdentifier(OctetString),
}

impl SignerIdentifier {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        if let Some(identifier) = cons.take_opt_value_if(Tag::CTX_0, OctetString::from_content)? {
            Ok(Self::SubjectKeyIdentifier(identifier))
        } else {
            Ok(Self::IssuerAndSerialNumber(
                IssuerAndSerialNumber::take_from(cons)?,
            ))
        }
    }
}

impl Values for SignerIdentifier {
    fn encoded_len(&self, mode: Mode) -> usize {
        match self {
            Self::IssuerAndSerialNumber(v) => v.encode_ref().encoded_len(mode),
            Self::SubjectKeyIdentifier(v) => v.encode_ref_as(Tag::CTX_0).encoded_len(mode),
        }
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        match self {
            Self::IssuerAndSerialNumber(v) => v.encode_ref().write_encoded(mode, target),
            Self::SubjectKeyIdentifier(v) => {
                v.encode_ref_as(Tag::CTX_0).write_encoded(mode, target)
            }
        }
    }
}

/// Issuer and serial number.
///
/// ```ASN.1
/// IssuerAndSerialNumber ::= SEQUENCE {
///   issuer Name,
///   serialNumber CertificateSerialNumber }
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuerAndSerialNumber {
    /// The encoded issuer `Name`.
    pub issuer: RawDer,
    pub serial_number: Integer,
}

impl IssuerAndSerialNumber {
    pub fn take_from<S: Source>(cons: &mut Constructed<S>) -> Result<Self, DecodeError<S::Error>> {
        cons.take_sequence(|cons| {
            let issuer = take_sequence_raw(cons)?;
            let serial_number = Integer::take_from(cons)?;

            Ok(Self {
                issuer,
                serial_number,
            })
        })
    }

    /// Extract the issuer and serial number of an encoded X.509 certificate.
    ///
    /// ```ASN.1
    /// TBSCertificate  ::=  SEQUENCE  {
    ///      version         [0]  EXPLICIT Version DEFAULT v1,
    ///      serialNumber         CertificateSerialNumber,
    ///      signature            AlgorithmIdentifier,
    ///      issuer               Name,
    ///      ... }
    /// ```
    pub fn from_certificate_der(data: &[u8]) -> Result<Self, DecodeError<Infallible>> {
        Constructed::decode(data, Mode::Der, |cons| {
            cons.take_sequence(|cons| {
                let res = cons.take_sequence(|cons| {
                    cons.take_opt_constructed_if(Tag::CTX_0, |cons| cons.skip_all())?;
                    let serial_number = Integer::take_from(cons)?;
                    AlgorithmIdentifier::take_from(cons)?;
                    let issuer = take_sequence_raw(cons)?;
                    cons.skip_all()?;

                    Ok(Self {
                        issuer,
                        serial_number,
                    })
                })?;

                cons.skip_all()?;

                Ok(res)
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((&self.issuer, (&self.serial_number).encode()))
    }
}

/// An attribute.
///
/// ```ASN.1
/// Attribute ::= SEQUENCE {
///   attrType OBJECT IDENTIFIER,
///   attrValues SET OF AttributeValue }
/// ```
///
/// Values are kept as the encoded content of the SET.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub typ: Oid,
    pub values: RawDer,
}

impl Attribute {
    /// Construct an attribute with a single value.
    pub fn new(typ: Oid, value: impl Values) -> Self {
        Self {
            typ,
            values: RawDer::from_values(value),
        }
    }

    pub fn take_opt_from<S: Source>(
        cons: &mut Constructed<S>,
    ) -> Result<Option<Self>, DecodeError<S::Error>> {
        cons.take_opt_sequence(|cons| {
            let typ = Oid::take_from(cons)?;
            let values = cons.take_set(|cons| cons.capture_all())?;

            Ok(Self {
                typ,
                values: values.into(),
            })
        })
    }

    pub fn encode_ref(&self) -> impl Values + '_ {
        encode::sequence((self.typ.encode_ref(), encode::set(&self.values)))
    }
}

impl Values for Attribute {
    fn encoded_len(&self, mode: Mode) -> usize {
        self.encode_ref().encoded_len(mode)
    }

    fn write_encoded<W: Write>(&self, mode: Mode, target: &mut W) -> Result<(), std::io::Error> {
        self.encode_ref().write_encoded(mode, target)
    }
}
