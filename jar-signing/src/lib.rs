// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing of Java archives in Pure Rust

This crate signs JAR files (and other zip archives carrying a
`META-INF/MANIFEST.MF`) the way `jarsigner` does, without requiring a
Java runtime.

Signing an archive entails:

1. Digesting every entry and recording the digests in the manifest.
   Manifest sections whose digests are already correct are left untouched.
2. Producing a *signature file* (`META-INF/<SIGNER>.SF`) containing digests
   of the manifest, its main section and each of its entry sections.
3. Producing a *signature block* (`META-INF/<SIGNER>.RSA`, `.EC` or `.DSA`),
   a detached PKCS#7 / CMS `SignedData` structure signing the signature file.
4. Optionally obtaining an RFC 3161 time-stamp token over the signature and
   embedding it in the signature block.
5. Rewriting the archive with the new manifest and signature entries first.
   Signatures of other signers survive if the manifest didn't change.

The main entry point is [archive::JarSigner]. Lower level functionality is
exposed by [signature_file], [signing] and [time_stamp_protocol].

# Security Limitations

Time-stamp responses are checked to match the request they answer. The
signature and certificate chain of a time-stamp token are only verified if
a [trust::TrustValidator] is configured. Certificate revocation and validity
periods are never checked.
*/

pub mod algorithm;
pub mod archive;
pub mod asn1;
pub mod certificate;
mod error;
pub mod settings;
pub mod signature_file;
pub mod signing;
pub mod time_stamp_protocol;
pub mod trust;

#[cfg(test)]
mod testutil;

pub use {
    algorithm::{DigestAlgorithm, KeyFamily},
    archive::{JarSigner, SigningReport},
    bcder::Oid,
    error::JarSignError,
    settings::{JarSigningSettings, SignerName, SigningIdentity},
};
