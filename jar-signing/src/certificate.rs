// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Ordering of X.509 certificate chains.

Signature blocks and trust evaluation need to know which end of a
certificate chain holds the signing certificate. Chains supplied by users
come in either direction. The functions in this module detect the
direction from issuer/subject linkage alone and convert between the two.
*/

use {
    std::fmt::Display,
    x509_certificate::{rfc3280::Name, CapturedX509Certificate},
};

/// Direction of a certificate chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CertificateOrdering {
    /// The signing certificate comes first, followed by its issuers.
    Forward,
    /// The trust anchor comes first. The signing certificate is last.
    Reverse,
    /// Linkage between certificates doesn't reveal the direction.
    Unknown,
}

impl Display for CertificateOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Forward => "forward",
            Self::Reverse => "reverse",
            Self::Unknown => "unknown",
        })
    }
}

/// Issuer and subject linkage of a certificate.
pub trait CertificateLinkage {
    type Name: PartialEq;

    fn subject(&self) -> &Self::Name;

    fn issuer(&self) -> &Self::Name;

    /// Whether the certificate issued itself.
    fn is_self_signed(&self) -> bool {
        self.subject() == self.issuer()
    }
}

impl CertificateLinkage for CapturedX509Certificate {
    type Name = Name;

    fn subject(&self) -> &Self::Name {
        self.subject_name()
    }

    fn issuer(&self) -> &Self::Name {
        self.issuer_name()
    }
}

/// Determine the direction of a certificate chain.
///
/// Chains with fewer than 2 certificates are [CertificateOrdering::Forward].
/// Otherwise a self-signed certificate at either end decides. Failing that,
/// the linkage between the first two certificates decides.
pub fn ordering_of<C: CertificateLinkage>(chain: &[C]) -> CertificateOrdering {
    if chain.len() < 2 {
        return CertificateOrdering::Forward;
    }

    let first = &chain[0];
    let second = &chain[1];

    if first.is_self_signed() {
        CertificateOrdering::Reverse
    } else if chain[chain.len() - 1].is_self_signed() {
        CertificateOrdering::Forward
    } else if first.subject() == second.issuer() {
        CertificateOrdering::Reverse
    } else if first.issuer() == second.subject() {
        CertificateOrdering::Forward
    } else {
        CertificateOrdering::Unknown
    }
}

/// A chain could not be put into the requested order.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownOrdering;

impl Display for UnknownOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("certificate chain ordering is unknown")
    }
}

impl std::error::Error for UnknownOrdering {}

/// Obtain a copy of a chain in the given order.
///
/// The chain is copied as is if already in that order and reversed
/// otherwise. A chain whose order can't be determined and a target of
/// [CertificateOrdering::Unknown] are both refused.
pub fn convert_to<C: CertificateLinkage + Clone>(
    chain: &[C],
    target: CertificateOrdering,
) -> Result<Vec<C>, UnknownOrdering> {
    let current = ordering_of(chain);

    if current == CertificateOrdering::Unknown || target == CertificateOrdering::Unknown {
        return Err(UnknownOrdering);
    }

    let mut res = chain.to_vec();

    if current != target {
        res.reverse();
    }

    Ok(res)
}
