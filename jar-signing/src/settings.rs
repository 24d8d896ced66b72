// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Signing identities and settings controlling how archives are signed.

use {
    crate::{algorithm::DigestAlgorithm, time_stamp_protocol::TimeStampClient, JarSignError},
    bcder::Oid,
    log::warn,
    std::fmt::Display,
    x509_certificate::{CapturedX509Certificate, InMemorySigningKeyPair, KeyInfoSigner},
};

/// `Created-By` value written when none is configured.
pub const DEFAULT_CREATED_BY: &str = concat!("jarsign ", env!("CARGO_PKG_VERSION"));

/// Base name of the signature entries of a signer.
///
/// Always upper case, at most 8 characters from `[A-Z0-9_-]`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct SignerName(String);

impl SignerName {
    /// Derive a signer name from an alias.
    ///
    /// Characters that can't appear in signer names are replaced by `_`.
    pub fn new(alias: &str) -> Result<Self, JarSignError> {
        let name = alias
            .chars()
            .take(8)
            .map(|c| match c.to_ascii_uppercase() {
                c @ ('A'..='Z' | '0'..='9' | '_' | '-') => c,
                _ => '_',
            })
            .collect::<String>();

        if name.is_empty() {
            Err(JarSignError::InvalidSignerName(alias.to_string()))
        } else {
            Ok(Self(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a signature entry base name belongs to this signer.
    pub fn matches(&self, base_name: &str) -> bool {
        self.0.eq_ignore_ascii_case(base_name)
    }
}

impl Display for SignerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A private key with its certificate chain, signing under a name.
pub struct SigningIdentity {
    key: Box<dyn KeyInfoSigner + Send + Sync>,
    chain: Vec<CapturedX509Certificate>,
    signer_name: SignerName,
}

impl SigningIdentity {
    pub fn new(
        key: Box<dyn KeyInfoSigner + Send + Sync>,
        chain: Vec<CapturedX509Certificate>,
        signer_name: SignerName,
    ) -> Self {
        Self {
            key,
            chain,
            signer_name,
        }
    }

    /// Construct an instance from PEM encoded data.
    ///
    /// The data holds a `PRIVATE KEY` (PKCS#8) and one or more
    /// `CERTIFICATE` blocks, in any order. Certificates keep their order.
    pub fn from_pem_data(data: &[u8], signer_name: SignerName) -> Result<Self, JarSignError> {
        let mut keys = vec![];
        let mut chain = vec![];

        for pem in pem::parse_many(data).map_err(JarSignError::Pem)? {
            match pem.tag.as_str() {
                "CERTIFICATE" => {
                    chain.push(CapturedX509Certificate::from_der(pem.contents)?);
                }
                "PRIVATE KEY" => {
                    keys.push(InMemorySigningKeyPair::from_pkcs8_der(&pem.contents)?);
                }
                tag => warn!("(unhandled PEM tag {}; ignoring)", tag),
            }
        }

        if keys.len() > 1 {
            warn!("found {} private keys; using the first one", keys.len());
        }

        let key = keys.into_iter().next().ok_or(JarSignError::MissingSigningKey)?;

        if chain.is_empty() {
            return Err(JarSignError::EmptyCertificateChain);
        }

        Ok(Self::new(Box::new(key), chain, signer_name))
    }

    pub fn key(&self) -> &dyn KeyInfoSigner {
        self.key.as_ref()
    }

    pub fn chain(&self) -> &[CapturedX509Certificate] {
        &self.chain
    }

    pub fn signer_name(&self) -> &SignerName {
        &self.signer_name
    }
}

/// Settings for signing Java archives.
pub struct JarSigningSettings {
    identity: SigningIdentity,
    digest_algorithm: DigestAlgorithm,
    signature_algorithm: Option<Oid>,
    created_by: String,
    lenient: bool,
    time_stamp_client: Option<TimeStampClient>,
}

impl JarSigningSettings {
    /// Construct settings signing as an identity.
    ///
    /// Digests default to SHA-256 and signatures are not time-stamped.
    pub fn new(identity: SigningIdentity) -> Self {
        Self {
            identity,
            digest_algorithm: DigestAlgorithm::default(),
            signature_algorithm: None,
            created_by: DEFAULT_CREATED_BY.to_string(),
            lenient: false,
            time_stamp_client: None,
        }
    }

    pub fn identity(&self) -> &SigningIdentity {
        &self.identity
    }

    pub fn digest_algorithm(&self) -> DigestAlgorithm {
        self.digest_algorithm
    }

    /// Set the algorithm digesting entries and manifest sections.
    pub fn set_digest_algorithm(&mut self, algorithm: DigestAlgorithm) {
        self.digest_algorithm = algorithm;
    }

    pub fn signature_algorithm(&self) -> Option<&Oid> {
        self.signature_algorithm.as_ref()
    }

    /// Require the signing key to produce a given signature algorithm.
    pub fn set_signature_algorithm(&mut self, oid: Oid) {
        self.signature_algorithm = Some(oid);
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Set the `Created-By` value of new manifests and signature files.
    pub fn set_created_by(&mut self, value: impl ToString) {
        self.created_by = value.to_string();
    }

    pub fn lenient(&self) -> bool {
        self.lenient
    }

    /// Drop malformed manifest entry sections instead of failing.
    pub fn set_lenient(&mut self, value: bool) {
        self.lenient = value;
    }

    pub fn time_stamp_client(&self) -> Option<&TimeStampClient> {
        self.time_stamp_client.as_ref()
    }

    /// Time-stamp signatures using a client.
    pub fn set_time_stamp_client(&mut self, client: TimeStampClient) {
        self.time_stamp_client = Some(client);
    }
}
