// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    std::fmt::{Display, Formatter},
    thiserror::Error,
};

/// Describes the way in which manifest data is corrupt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CorruptionKind {
    /// A continuation line appeared before any attribute line.
    OrphanContinuation,

    /// A line could not be split into an attribute name and value.
    MalformedAttribute(String),

    /// An attribute name contains illegal characters or is too long.
    InvalidAttributeName(String),

    /// An attribute name occurs more than once in a section.
    DuplicateAttribute(String),

    /// An entry section does not start with a `Name` attribute.
    MissingName,

    /// Two entry sections share the same `Name`.
    DuplicateEntry(String),

    /// An attribute value is not valid UTF-8.
    InvalidUtf8(String),
}

impl Display for CorruptionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OrphanContinuation => f.write_str("continuation line without preceding attribute"),
            Self::MalformedAttribute(line) => {
                f.write_fmt(format_args!("malformed attribute line: {:?}", line))
            }
            Self::InvalidAttributeName(name) => {
                f.write_fmt(format_args!("invalid attribute name: {:?}", name))
            }
            Self::DuplicateAttribute(name) => {
                f.write_fmt(format_args!("duplicate attribute: {}", name))
            }
            Self::MissingName => f.write_str("entry section does not begin with Name attribute"),
            Self::DuplicateEntry(name) => f.write_fmt(format_args!("duplicate entry: {}", name)),
            Self::InvalidUtf8(name) => {
                f.write_fmt(format_args!("value of attribute {} is not UTF-8", name))
            }
        }
    }
}

/// Errors related to reading and manipulating manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("corrupt manifest (section {section}, line {line}): {kind}")]
    Corrupt {
        kind: CorruptionKind,
        section: usize,
        line: usize,
    },

    #[error("invalid attribute name: {0:?}")]
    InvalidAttributeName(String),

    #[error("attribute value for {0} contains a line terminator or NUL")]
    InvalidAttributeValue(String),

    #[error("the Name attribute of an entry section cannot be changed")]
    NameAttributeReadOnly,

    #[error("entry sections require a non-empty name")]
    EmptyEntryName,

    #[error("only entry sections can be added to a manifest")]
    NotAnEntrySection,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ManifestError {
    /// Obtain the corruption kind, if this is a format error.
    pub fn corruption_kind(&self) -> Option<&CorruptionKind> {
        match self {
            Self::Corrupt { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
