// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Construction of signature blocks.

A signature block is a DER encoded PKCS#7 `ContentInfo` holding a
`SignedData` whose signature covers a signature file. The signature file
itself is not embedded: it lives next to the block in the archive.
*/

use {
    crate::{
        algorithm::{DigestAlgorithm, KeyFamily},
        asn1::{
            common::{AlgorithmIdentifier, RawDer},
            rfc3161::OID_TIME_STAMP_TOKEN,
            rfc5652::{
                Attribute, EncapsulatedContentInfo, IssuerAndSerialNumber, SignedData,
                SignerIdentifier, SignerInfo, OID_ID_DATA,
            },
        },
        certificate::{convert_to, CertificateOrdering},
        settings::SignerName,
        time_stamp_protocol::{TimeStampClient, TimeStampToken},
        JarSignError,
    },
    bcder::{OctetString, Oid},
    bytes::Bytes,
    log::{debug, info},
    signature::Signer,
    x509_certificate::{CapturedX509Certificate, KeyInfoSigner, Sign},
};

/// An encoded signature block.
#[derive(Clone, Debug)]
pub struct SignatureBlock {
    data: Vec<u8>,
    family: KeyFamily,
    time_stamp_token: Option<TimeStampToken>,
}

impl SignatureBlock {
    /// The DER encoded `ContentInfo`.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Family of the key that produced the signature.
    pub fn family(&self) -> KeyFamily {
        self.family
    }

    /// The time-stamp token attached to the signature, if any.
    pub fn time_stamp_token(&self) -> Option<&TimeStampToken> {
        self.time_stamp_token.as_ref()
    }

    /// Archive path of this block for a signer.
    pub fn entry_name(&self, signer_name: &SignerName) -> String {
        format!("META-INF/{}.{}", signer_name, self.family.extension())
    }
}

/// Builds signature blocks for a signing key and its certificate chain.
///
/// The chain may be given in either direction. Its signing certificate must
/// hold the public key of the signing key.
pub struct SignatureBlockBuilder<'a> {
    signing_key: &'a dyn KeyInfoSigner,
    chain: &'a [CapturedX509Certificate],
    signature_algorithm: Option<Oid>,
    time_stamp_client: Option<&'a TimeStampClient>,
}

impl<'a> SignatureBlockBuilder<'a> {
    pub fn new(signing_key: &'a dyn KeyInfoSigner, chain: &'a [CapturedX509Certificate]) -> Self {
        Self {
            signing_key,
            chain,
            signature_algorithm: None,
            time_stamp_client: None,
        }
    }

    /// Require the signing key to produce signatures of a given algorithm.
    pub fn signature_algorithm(mut self, oid: Oid) -> Self {
        self.signature_algorithm = Some(oid);
        self
    }

    /// Time-stamp signatures using a client.
    ///
    /// The token is attached as the `id-aa-timeStampToken` unsigned attribute.
    pub fn time_stamp_client(mut self, client: &'a TimeStampClient) -> Self {
        self.time_stamp_client = Some(client);
        self
    }

    /// Sign content, producing a signature block.
    ///
    /// The content is signed as is. It is not embedded in the block.
    pub fn build(&self, content: &[u8]) -> Result<SignatureBlock, JarSignError> {
        if self.chain.is_empty() {
            return Err(JarSignError::EmptyCertificateChain);
        }

        let forward = convert_to(self.chain, CertificateOrdering::Forward)
            .map_err(|_| JarSignError::UnknownChainOrdering)?;
        let signing_cert = &forward[0];

        let key_algorithm = self.signing_key.key_algorithm();
        let cert_key_algorithm = signing_cert.key_algorithm();

        if key_algorithm != cert_key_algorithm {
            return Err(JarSignError::KeyAlgorithmMismatch {
                key: key_algorithm,
                certificate: cert_key_algorithm,
            });
        }

        if self.signing_key.public_key_data() != signing_cert.public_key_data() {
            return Err(JarSignError::PublicKeyMismatch);
        }

        let signature_algorithm = Oid::from(self.signing_key.signature_algorithm()?);

        if let Some(requested) = &self.signature_algorithm {
            if requested != &signature_algorithm {
                return Err(JarSignError::SignatureAlgorithmMismatch {
                    requested: requested.to_string(),
                    actual: signature_algorithm.to_string(),
                });
            }
        }

        let family = KeyFamily::for_signature_algorithm(&signature_algorithm)
            .ok_or(JarSignError::UnsupportedKeyAlgorithm)?;
        let digest_algorithm = DigestAlgorithm::for_signature_algorithm(&signature_algorithm)
            .ok_or_else(|| {
                JarSignError::UnsupportedSignatureAlgorithm(signature_algorithm.to_string())
            })?;

        let signing_cert_der = signing_cert
            .encode_der()
            .map_err(JarSignError::CertificateEncoding)?;
        let sid = IssuerAndSerialNumber::from_certificate_der(&signing_cert_der)?;

        let signature: Vec<u8> = self
            .signing_key
            .try_sign(content)
            .map_err(JarSignError::Signature)?
            .into();

        let mut signer_info = SignerInfo {
            version: 1,
            sid: SignerIdentifier::IssuerAndSerialNumber(sid),
            digest_algorithm: digest_algorithm.into(),
            signed_attributes: None,
            signature_algorithm: if family == KeyFamily::Rsa {
                AlgorithmIdentifier::with_null_parameters(signature_algorithm)
            } else {
                AlgorithmIdentifier {
                    algorithm: signature_algorithm,
                    parameters: None,
                }
            },
            signature: OctetString::new(Bytes::copy_from_slice(&signature)),
            unsigned_attributes: vec![],
        };

        let time_stamp_token = if let Some(client) = self.time_stamp_client {
            let token = client.time_stamp(&signature)?;

            info!("time-stamped signature at {}", token.gen_time().to_rfc3339());
            signer_info.add_unsigned_attribute(Attribute::new(
                Oid(Bytes::copy_from_slice(OID_TIME_STAMP_TOKEN.as_ref())),
                token.encoded(),
            ));

            Some(token)
        } else {
            None
        };

        let certificates = convert_to(self.chain, CertificateOrdering::Reverse)
            .map_err(|_| JarSignError::UnknownChainOrdering)?
            .iter()
            .map(|cert| {
                cert.encode_der()
                    .map(RawDer::new)
                    .map_err(JarSignError::CertificateEncoding)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "embedding {} certificates in signature block",
            certificates.len()
        );

        let signed_data = SignedData {
            version: 1,
            digest_algorithms: vec![digest_algorithm.into()],
            content_info: EncapsulatedContentInfo {
                content_type: Oid(Bytes::copy_from_slice(OID_ID_DATA.as_ref())),
                content: None,
            },
            certificates: Some(certificates),
            crls: None,
            signer_infos: vec![signer_info],
        };

        Ok(SignatureBlock {
            data: signed_data.to_content_info().to_der(),
            family,
            time_stamp_token,
        })
    }
}

/// Sign content with a key and certificate chain.
pub fn sign(
    content: &[u8],
    signing_key: &dyn KeyInfoSigner,
    chain: &[CapturedX509Certificate],
) -> Result<SignatureBlock, JarSignError> {
    SignatureBlockBuilder::new(signing_key, chain).build(content)
}
