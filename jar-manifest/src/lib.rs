// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Java archive manifests.
//!
//! This crate implements the `META-INF/MANIFEST.MF` text format used by Java
//! archives, as well as the structurally identical signature files
//! (`META-INF/*.SF`) produced when signing them.
//!
//! A manifest is a sequence of sections separated by blank lines. Each
//! section is a list of `Name: value` attributes. The first section holds
//! attributes applying to the archive as a whole. Every following section
//! starts with a `Name` attribute naming an archive entry. Lines longer
//! than 70 bytes are wrapped, with continuation lines starting with a
//! single space.
//!
//! Signatures over a Java archive cover digests of the exact manifest
//! bytes. So this crate goes out of its way to preserve the bytes of
//! anything it parsed: [Manifest::to_bytes] on an unmodified [Manifest]
//! returns its input verbatim, even if that input used `LF` line endings or
//! a different wrapping than we would produce. Only sections that are
//! actually changed are re-serialized in canonical form.
//!
//! ```
//! use jar_manifest::{Manifest, Section};
//!
//! let mut manifest = Manifest::parse(b"Manifest-Version: 1.0\n\n").unwrap();
//! assert_eq!(manifest.to_bytes(), b"Manifest-Version: 1.0\n\n");
//!
//! let mut section = Section::entry("com/example/Main.class").unwrap();
//! section.set_attribute("SHA-256-Digest", "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=").unwrap();
//! manifest.add_section(section).unwrap();
//!
//! assert!(manifest.is_modified());
//! ```

mod attributes;
pub use attributes::{
    is_valid_attribute_name, write_attribute_line, Attributes, LINE_TERMINATOR,
    MAX_ATTRIBUTE_NAME_LENGTH, MAX_LINE_LENGTH, NAME_ATTRIBUTE,
};
mod error;
pub use error::{CorruptionKind, ManifestError};
mod manifest;
pub use manifest::{Manifest, MANIFEST_VERSION_ATTRIBUTE};
mod reader;
mod section;
pub use section::Section;

/// Archive path of the manifest.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
