// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::{time_stamp_protocol::TimeStampError, trust::TrustError},
    bcder::decode::DecodeError,
    jar_manifest::ManifestError,
    std::{convert::Infallible, path::PathBuf},
    thiserror::Error,
    x509_certificate::{KeyAlgorithm, X509CertificateError},
};

/// Unified error type for Java archive signing.
#[derive(Debug, Error)]
pub enum JarSignError {
    #[error("unknown command")]
    CliUnknownCommand,

    #[error("bad argument")]
    CliBadArgument,

    #[error("{0}")]
    CliGeneralError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("X.509 certificate handler error: {0}")]
    X509(#[from] X509CertificateError),

    #[error("ASN.1 decode error: {0}")]
    Asn1Decode(DecodeError<Infallible>),

    #[error("PEM error: {0}")]
    Pem(pem::PemError),

    #[error("time-stamp error: {0}")]
    TimeStamp(#[from] TimeStampError),

    #[error("trust validation error: {0}")]
    Trust(#[from] TrustError),

    #[error("signing error: {0}")]
    Signature(signature::Error),

    #[error("unable to determine ordering of certificate chain")]
    UnknownChainOrdering,

    #[error("certificate chain is empty")]
    EmptyCertificateChain,

    #[error("signing key algorithm {key:?} does not match certificate key algorithm {certificate:?}")]
    KeyAlgorithmMismatch {
        key: Option<KeyAlgorithm>,
        certificate: Option<KeyAlgorithm>,
    },

    #[error("signing key does not belong to the signing certificate")]
    PublicKeyMismatch,

    #[error("requested signature algorithm {requested} but signing key produces {actual}")]
    SignatureAlgorithmMismatch { requested: String, actual: String },

    #[error("key algorithm not supported for Java archive signatures")]
    UnsupportedKeyAlgorithm,

    #[error("signature algorithm not supported: {0}")]
    UnsupportedSignatureAlgorithm(String),

    #[error("invalid object identifier: {0}")]
    InvalidOid(String),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("unable to obtain DER encoding of certificate: {0}")]
    CertificateEncoding(std::io::Error),

    #[error("invalid signer name: {0:?}")]
    InvalidSignerName(String),

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("manifest has no section for {0}")]
    MissingManifestSection(String),

    #[error("no signing key found")]
    MissingSigningKey,
}

impl From<DecodeError<Infallible>> for JarSignError {
    fn from(e: DecodeError<Infallible>) -> Self {
        Self::Asn1Decode(e)
    }
}
