// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cryptographic algorithms used by Java archive signatures.

use {
    crate::{asn1::common::AlgorithmIdentifier, error::JarSignError},
    bcder::{ConstOid, Oid},
    bytes::Bytes,
    ring::{digest, signature},
    std::{fmt::Display, str::FromStr},
};

/// SHA-1 digest algorithm.
///
/// 1.3.14.3.2.26
pub const OID_SHA1: ConstOid = Oid(&[43, 14, 3, 2, 26]);

/// SHA-256 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.1
pub const OID_SHA256: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 1]);

/// SHA-384 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.2
pub const OID_SHA384: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 2]);

/// SHA-512 digest algorithm.
///
/// 2.16.840.1.101.3.4.2.3
pub const OID_SHA512: ConstOid = Oid(&[96, 134, 72, 1, 101, 3, 4, 2, 3]);

/// RSA encryption. Also used as an RSA signature algorithm in PKCS#7.
///
/// 1.2.840.113549.1.1.1
pub const OID_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 1]);

/// SHA-1 with RSA encryption.
///
/// 1.2.840.113549.1.1.5
pub const OID_SHA1_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 5]);

/// SHA-256 with RSA encryption.
///
/// 1.2.840.113549.1.1.11
pub const OID_SHA256_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 11]);

/// SHA-384 with RSA encryption.
///
/// 1.2.840.113549.1.1.12
pub const OID_SHA384_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 12]);

/// SHA-512 with RSA encryption.
///
/// 1.2.840.113549.1.1.13
pub const OID_SHA512_RSA: ConstOid = Oid(&[42, 134, 72, 134, 247, 13, 1, 1, 13]);

/// ECDSA with SHA-256.
///
/// 1.2.840.10045.4.3.2
pub const OID_ECDSA_SHA256: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 2]);

/// ECDSA with SHA-384.
///
/// 1.2.840.10045.4.3.3
pub const OID_ECDSA_SHA384: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 3]);

/// ECDSA with SHA-512.
///
/// 1.2.840.10045.4.3.4
pub const OID_ECDSA_SHA512: ConstOid = Oid(&[42, 134, 72, 206, 61, 4, 3, 4]);

/// Ed25519 signature algorithm.
///
/// 1.3.101.112
pub const OID_ED25519: ConstOid = Oid(&[43, 101, 112]);

/// A message digest algorithm usable in manifests, signature files and signatures.
///
/// Each algorithm knows how it is named in manifest attributes, its ASN.1
/// OID and the `ring` implementation computing it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

impl Display for DigestAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        })
    }
}

impl FromStr for DigestAlgorithm {
    type Err = JarSignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" | "sha-1" => Ok(Self::Sha1),
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha384" | "sha-384" => Ok(Self::Sha384),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(JarSignError::UnknownDigestAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<&Oid> for DigestAlgorithm {
    type Error = JarSignError;

    fn try_from(v: &Oid) -> Result<Self, Self::Error> {
        Self::all()
            .iter()
            .find(|alg| v == &alg.const_oid())
            .copied()
            .ok_or_else(|| JarSignError::UnknownDigestAlgorithm(format!("{}", v)))
    }
}

impl From<DigestAlgorithm> for Oid {
    fn from(alg: DigestAlgorithm) -> Self {
        Oid(Bytes::copy_from_slice(alg.const_oid().as_ref()))
    }
}

impl From<DigestAlgorithm> for AlgorithmIdentifier {
    fn from(alg: DigestAlgorithm) -> Self {
        Self {
            algorithm: alg.into(),
            parameters: None,
        }
    }
}

impl DigestAlgorithm {
    /// All known algorithms.
    pub fn all() -> &'static [Self] {
        &[Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512]
    }

    /// Names accepted by [FromStr], as used on the command line.
    pub fn names() -> &'static [&'static str] {
        &["sha1", "sha256", "sha384", "sha512"]
    }

    fn const_oid(&self) -> ConstOid {
        match self {
            Self::Sha1 => OID_SHA1,
            Self::Sha256 => OID_SHA256,
            Self::Sha384 => OID_SHA384,
            Self::Sha512 => OID_SHA512,
        }
    }

    /// The prefix of manifest attributes holding digests of this type.
    ///
    /// e.g. `SHA-256` in `SHA-256-Digest`.
    pub fn manifest_prefix(&self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Name of the attribute holding the digest of an archive entry.
    pub fn digest_attribute(&self) -> String {
        format!("{}-Digest", self.manifest_prefix())
    }

    /// Name of the signature file attribute holding the digest of the whole manifest.
    pub fn manifest_digest_attribute(&self) -> String {
        format!("{}-Digest-Manifest", self.manifest_prefix())
    }

    /// Name of the signature file attribute holding the digest of the manifest main section.
    pub fn main_attributes_digest_attribute(&self) -> String {
        format!("{}-Digest-Manifest-Main-Attributes", self.manifest_prefix())
    }

    /// The `ring` algorithm implementing this digest.
    pub fn ring_algorithm(&self) -> &'static digest::Algorithm {
        match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
            Self::Sha512 => &digest::SHA512,
        }
    }

    /// Obtain an incremental digester.
    pub fn digester(&self) -> digest::Context {
        digest::Context::new(self.ring_algorithm())
    }

    /// Digest data in one shot.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        digest::digest(self.ring_algorithm(), data).as_ref().to_vec()
    }

    /// Resolve the digest algorithm implied by a signature algorithm OID.
    ///
    /// Ed25519 signs messages directly. It is paired with SHA-512 in
    /// `SignerInfo` structures.
    pub fn for_signature_algorithm(oid: &Oid) -> Option<Self> {
        if oid == &OID_SHA1_RSA {
            Some(Self::Sha1)
        } else if oid == &OID_SHA256_RSA || oid == &OID_ECDSA_SHA256 {
            Some(Self::Sha256)
        } else if oid == &OID_SHA384_RSA || oid == &OID_ECDSA_SHA384 {
            Some(Self::Sha384)
        } else if oid == &OID_SHA512_RSA || oid == &OID_ECDSA_SHA512 || oid == &OID_ED25519 {
            Some(Self::Sha512)
        } else {
            None
        }
    }
}

/// The family of a signing key, which names the signature block entry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KeyFamily {
    Rsa,
    Dsa,
    Ec,
}

impl KeyFamily {
    /// File extension of the signature block entry.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Dsa => "DSA",
            Self::Ec => "EC",
        }
    }

    /// Resolve the key family producing signatures of a given algorithm.
    ///
    /// Ed25519 signatures are filed under the `EC` block name.
    pub fn for_signature_algorithm(oid: &Oid) -> Option<Self> {
        if oid == &OID_RSA
            || oid == &OID_SHA1_RSA
            || oid == &OID_SHA256_RSA
            || oid == &OID_SHA384_RSA
            || oid == &OID_SHA512_RSA
        {
            Some(Self::Rsa)
        } else if oid == &OID_ECDSA_SHA256
            || oid == &OID_ECDSA_SHA384
            || oid == &OID_ECDSA_SHA512
            || oid == &OID_ED25519
        {
            Some(Self::Ec)
        } else {
            None
        }
    }

    /// Resolve the `ring` algorithm verifying signatures of this family.
    ///
    /// ECDSA curves are told apart by the length of the uncompressed public key.
    pub fn verification_algorithm(
        &self,
        signature_algorithm: &Oid,
        digest_algorithm: DigestAlgorithm,
        public_key: &[u8],
    ) -> Option<&'static dyn signature::VerificationAlgorithm> {
        match (self, digest_algorithm) {
            (Self::Rsa, DigestAlgorithm::Sha1) => {
                Some(&signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY)
            }
            (Self::Rsa, DigestAlgorithm::Sha256) => Some(&signature::RSA_PKCS1_2048_8192_SHA256),
            (Self::Rsa, DigestAlgorithm::Sha384) => Some(&signature::RSA_PKCS1_2048_8192_SHA384),
            (Self::Rsa, DigestAlgorithm::Sha512) => Some(&signature::RSA_PKCS1_2048_8192_SHA512),
            (Self::Ec, _) if signature_algorithm == &OID_ED25519 => Some(&signature::ED25519),
            (Self::Ec, digest) => match (public_key.len(), digest) {
                (65, DigestAlgorithm::Sha256) => Some(&signature::ECDSA_P256_SHA256_ASN1),
                (65, DigestAlgorithm::Sha384) => Some(&signature::ECDSA_P256_SHA384_ASN1),
                (97, DigestAlgorithm::Sha256) => Some(&signature::ECDSA_P384_SHA256_ASN1),
                (97, DigestAlgorithm::Sha384) => Some(&signature::ECDSA_P384_SHA384_ASN1),
                _ => None,
            },
            (Self::Dsa, _) => None,
        }
    }

    /// Resolve the family of a signature block entry from its extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        [Self::Rsa, Self::Dsa, Self::Ec]
            .into_iter()
            .find(|family| family.extension().eq_ignore_ascii_case(ext))
    }
}

/// Signature algorithm names accepted by [signature_algorithm_from_name].
pub const SIGNATURE_ALGORITHM_NAMES: &[&str] = &[
    "sha1-rsa",
    "sha256-rsa",
    "sha384-rsa",
    "sha512-rsa",
    "ecdsa-sha256",
    "ecdsa-sha384",
    "ecdsa-sha512",
    "ed25519",
];

/// Resolve a signature algorithm OID from its command line name.
pub fn signature_algorithm_from_name(name: &str) -> Result<Oid, JarSignError> {
    let oid = match name.to_ascii_lowercase().as_str() {
        "sha1-rsa" => OID_SHA1_RSA,
        "sha256-rsa" => OID_SHA256_RSA,
        "sha384-rsa" => OID_SHA384_RSA,
        "sha512-rsa" => OID_SHA512_RSA,
        "ecdsa-sha256" => OID_ECDSA_SHA256,
        "ecdsa-sha384" => OID_ECDSA_SHA384,
        "ecdsa-sha512" => OID_ECDSA_SHA512,
        "ed25519" => OID_ED25519,
        _ => return Err(JarSignError::UnsupportedSignatureAlgorithm(name.to_string())),
    };

    Ok(Oid(Bytes::copy_from_slice(oid.as_ref())))
}

/// Parse an OID in dotted decimal notation, e.g. `1.2.840.113549`.
pub fn parse_oid(s: &str) -> Result<Oid, JarSignError> {
    let invalid = || JarSignError::InvalidOid(s.to_string());

    let arcs = s
        .split('.')
        .map(|arc| arc.parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    let (first, second) = match arcs.as_slice() {
        [first, second, ..] if *first < 2 && *second < 40 => (*first, *second),
        [2, second, ..] => (2, *second),
        _ => return Err(invalid()),
    };

    let first_subidentifier = (first * 40).checked_add(second).ok_or_else(invalid)?;

    let mut encoded = vec![];
    for arc in std::iter::once(first_subidentifier).chain(arcs[2..].iter().copied()) {
        let mut chunk = vec![(arc & 0x7f) as u8];
        let mut remaining = arc >> 7;
        while remaining > 0 {
            chunk.push((remaining & 0x7f) as u8 | 0x80);
            remaining >>= 7;
        }
        chunk.reverse();
        encoded.extend(chunk);
    }

    Ok(Oid(Bytes::from(encoded)))
}
