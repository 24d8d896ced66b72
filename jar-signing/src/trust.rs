// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trust evaluation of certificate chains.

use {
    crate::certificate::{convert_to, CertificateLinkage, CertificateOrdering},
    log::debug,
    std::fmt::Display,
    thiserror::Error,
    x509_certificate::CapturedX509Certificate,
};

/// What a certificate chain is trusted for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrustPurpose {
    CodeSigning,
    TimeStamping,
}

impl Display for TrustPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CodeSigning => "code signing",
            Self::TimeStamping => "time-stamping",
        })
    }
}

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("certificate chain is empty")]
    EmptyChain,

    #[error("unable to determine ordering of certificate chain")]
    UnknownOrdering,

    #[error("certificate {index} in chain was not issued by the following certificate")]
    BrokenLink { index: usize },

    #[error("signature of certificate {index} in chain does not verify: {message}")]
    BadSignature { index: usize, message: String },

    #[error("certificate chain does not lead to a trusted {0} anchor")]
    NoAnchor(TrustPurpose),
}

/// Decides whether a certificate chain is trusted for a purpose.
pub trait TrustValidator: Send + Sync {
    /// Validate a chain, given in any direction.
    fn validate(
        &self,
        chain: &[CapturedX509Certificate],
        purpose: TrustPurpose,
    ) -> Result<(), TrustError>;
}

/// Trusts chains that end in, or were issued by, one of a fixed set of anchors.
///
/// Every link of the chain must be issued and signed by the next
/// certificate. This doesn't look at validity periods, key usage or
/// revocation.
#[derive(Clone, Debug, Default)]
pub struct AnchoredTrustValidator {
    anchors: Vec<CapturedX509Certificate>,
}

impl AnchoredTrustValidator {
    pub fn new(anchors: impl IntoIterator<Item = CapturedX509Certificate>) -> Self {
        Self {
            anchors: anchors.into_iter().collect(),
        }
    }

    pub fn add_anchor(&mut self, anchor: CapturedX509Certificate) {
        self.anchors.push(anchor);
    }

    pub fn anchors(&self) -> &[CapturedX509Certificate] {
        &self.anchors
    }

    fn is_anchor(&self, cert: &CapturedX509Certificate) -> bool {
        self.anchors
            .iter()
            .any(|anchor| anchor.constructed_data() == cert.constructed_data())
    }
}

impl TrustValidator for AnchoredTrustValidator {
    fn validate(
        &self,
        chain: &[CapturedX509Certificate],
        purpose: TrustPurpose,
    ) -> Result<(), TrustError> {
        if chain.is_empty() {
            return Err(TrustError::EmptyChain);
        }

        let chain = convert_to(chain, CertificateOrdering::Forward)
            .map_err(|_| TrustError::UnknownOrdering)?;

        for (index, pair) in chain.windows(2).enumerate() {
            let (cert, issuer) = (&pair[0], &pair[1]);

            if cert.issuer() != issuer.subject() {
                return Err(TrustError::BrokenLink { index });
            }

            cert.verify_signed_by_certificate(issuer)
                .map_err(|e| TrustError::BadSignature {
                    index,
                    message: e.to_string(),
                })?;
        }

        let last = &chain[chain.len() - 1];

        if self.is_anchor(last) {
            debug!("chain ends in a trusted {} anchor", purpose);
            return Ok(());
        }

        for anchor in &self.anchors {
            if last.issuer() == anchor.subject()
                && last.verify_signed_by_certificate(anchor).is_ok()
            {
                debug!("chain was issued by a trusted {} anchor", purpose);
                return Ok(());
            }
        }

        Err(TrustError::NoAnchor(purpose))
    }
}
