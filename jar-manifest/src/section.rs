// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Manifest sections.

use {
    crate::{
        attributes::{Attributes, LINE_TERMINATOR, NAME_ATTRIBUTE},
        error::ManifestError,
    },
    std::{borrow::Cow, io::Write},
};

/// A section of attributes within a manifest.
///
/// A section read from existing manifest data is [Section::Pristine] and
/// holds on to the exact bytes it was parsed from. Encoding a pristine
/// section emits those bytes verbatim, so unmodified content round-trips
/// byte for byte.
///
/// Any mutation converts the section to [Section::Modified], discarding the
/// original bytes. Encoding a modified section serializes its attributes in
/// canonical form. There is no way back to pristine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Section {
    Pristine { raw: Vec<u8>, attributes: Attributes },
    Modified { attributes: Attributes },
}

impl Default for Section {
    fn default() -> Self {
        Self::Modified {
            attributes: Attributes::default(),
        }
    }
}

impl Section {
    /// Construct an empty main section.
    pub fn main() -> Self {
        Self::default()
    }

    /// Construct an entry section for a path.
    pub fn entry(name: impl ToString) -> Result<Self, ManifestError> {
        let name = name.to_string();
        if name.is_empty() {
            return Err(ManifestError::EmptyEntryName);
        }

        let mut attributes = Attributes::new();
        attributes.insert(NAME_ATTRIBUTE, name)?;

        Ok(Self::Modified { attributes })
    }

    pub(crate) fn from_parsed(raw: Vec<u8>, attributes: Attributes) -> Self {
        Self::Pristine { raw, attributes }
    }

    /// The attributes in this section.
    pub fn attributes(&self) -> &Attributes {
        match self {
            Self::Pristine { attributes, .. } | Self::Modified { attributes } => attributes,
        }
    }

    /// Obtain the value of a single attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes().get(name)
    }

    /// The entry path of this section.
    ///
    /// This is the value of the leading `Name` attribute. Main sections
    /// don't have one.
    pub fn name(&self) -> Option<&str> {
        match self.attributes().first() {
            Some((key, value)) if key.eq_ignore_ascii_case(NAME_ATTRIBUTE) => Some(value),
            _ => None,
        }
    }

    /// Whether this section no longer reflects the bytes it was parsed from.
    pub fn is_modified(&self) -> bool {
        matches!(self, Self::Modified { .. })
    }

    fn modify(&mut self) -> &mut Attributes {
        if let Self::Pristine { attributes, .. } = self {
            let attributes = std::mem::take(attributes);
            *self = Self::Modified { attributes };
        }

        match self {
            Self::Pristine { attributes, .. } | Self::Modified { attributes } => attributes,
        }
    }

    /// Set an attribute value.
    ///
    /// Setting an attribute to the value it already has is not a mutation
    /// and leaves a pristine section pristine.
    pub fn set_attribute(
        &mut self,
        name: impl ToString,
        value: impl ToString,
    ) -> Result<(), ManifestError> {
        let name = name.to_string();
        let value = value.to_string();

        if self.attribute(&name) == Some(value.as_str()) {
            return Ok(());
        }

        if self.name().is_some() && name.eq_ignore_ascii_case(NAME_ATTRIBUTE) {
            return Err(ManifestError::NameAttributeReadOnly);
        }

        // Validate before converting so a rejected value doesn't dirty the section.
        let mut probe = Attributes::new();
        probe.insert(&name, &value)?;

        self.modify().insert(name, value)?;

        Ok(())
    }

    /// Remove an attribute, returning its former value.
    pub fn remove_attribute(&mut self, name: &str) -> Result<Option<String>, ManifestError> {
        if !self.attributes().contains(name) {
            return Ok(None);
        }

        if self.name().is_some() && name.eq_ignore_ascii_case(NAME_ATTRIBUTE) {
            return Err(ManifestError::NameAttributeReadOnly);
        }

        Ok(self.modify().remove(name))
    }

    /// Obtain the encoded bytes of this section, including its terminating blank line.
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self {
            Self::Pristine { raw, .. } => Cow::Borrowed(raw),
            Self::Modified { attributes } => {
                let mut dest = Vec::new();
                attributes.write_lines(&mut dest);
                dest.extend_from_slice(LINE_TERMINATOR);
                Cow::Owned(dest)
            }
        }
    }

    /// Write the encoded section to a writer.
    pub fn write_to(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())
    }

    /// Compute the digest of the encoded section.
    pub fn digest(&self, algorithm: &'static ring::digest::Algorithm) -> Vec<u8> {
        ring::digest::digest(algorithm, &self.to_bytes())
            .as_ref()
            .to_vec()
    }

    /// Whether the encoded section ends with a blank line.
    ///
    /// Only the final section of parsed data can lack one, when the data
    /// ended without it.
    pub(crate) fn is_terminated(&self) -> bool {
        match self {
            Self::Modified { .. } => true,
            Self::Pristine { raw, .. } => match strip_terminator(raw) {
                Some(rest) => strip_terminator(rest).is_some(),
                None => false,
            },
        }
    }

    /// Complete the blank line of a pristine section parsed from the end of data.
    ///
    /// Needed before another section follows this one. The added bytes become
    /// part of the section, so its digest covers what is written.
    pub(crate) fn terminate(&mut self) {
        if self.is_terminated() {
            return;
        }

        if let Self::Pristine { raw, .. } = self {
            if strip_terminator(raw).is_none() {
                raw.extend_from_slice(LINE_TERMINATOR);
            }
            raw.extend_from_slice(LINE_TERMINATOR);
        }
    }
}

fn strip_terminator(data: &[u8]) -> Option<&[u8]> {
    data.strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .or_else(|| data.strip_suffix(b"\r"))
}
