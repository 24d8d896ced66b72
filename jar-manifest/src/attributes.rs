// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ordered attribute maps and their line encoding.

use crate::error::ManifestError;

/// Maximum length in bytes of an attribute name.
pub const MAX_ATTRIBUTE_NAME_LENGTH: usize = 70;

/// Maximum length in bytes of an encoded line, excluding the line terminator.
pub const MAX_LINE_LENGTH: usize = 70;

/// The line terminator used when encoding.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// The attribute holding the path of an entry section.
pub const NAME_ATTRIBUTE: &str = "Name";

/// Whether a string is a legal attribute name.
///
/// Names consist of 1 to 70 characters from `[A-Za-z0-9_-]`.
pub fn is_valid_attribute_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ATTRIBUTE_NAME_LENGTH
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// An insertion ordered mapping of attribute names to values.
///
/// Names are compared ASCII case-insensitively but retain the spelling
/// they were inserted with.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Obtain the value of an attribute.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The first attribute, if any.
    pub fn first(&self) -> Option<(&str, &str)> {
        self.entries.first().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set an attribute value.
    ///
    /// An existing attribute keeps its position. New attributes are appended.
    /// Returns the previous value.
    pub fn insert(
        &mut self,
        name: impl ToString,
        value: impl ToString,
    ) -> Result<Option<String>, ManifestError> {
        let name = name.to_string();
        let value = value.to_string();

        if !is_valid_attribute_name(&name) {
            return Err(ManifestError::InvalidAttributeName(name));
        }
        if value.bytes().any(|b| matches!(b, b'\r' | b'\n' | b'\0')) {
            return Err(ManifestError::InvalidAttributeValue(name));
        }

        Ok(match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        })
    }

    /// Remove an attribute, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// Append a parsed attribute, refusing duplicates.
    ///
    /// Name validity is the caller's responsibility.
    pub(crate) fn push_unique(&mut self, name: String, value: String) -> Result<(), String> {
        if self.contains(&name) {
            Err(name)
        } else {
            self.entries.push((name, value));
            Ok(())
        }
    }

    /// Encode all attributes as lines, without the section terminator.
    pub(crate) fn write_lines(&self, dest: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            write_attribute_line(dest, name, value);
        }
    }
}

/// Encode a single `name: value` attribute, wrapping long lines.
///
/// The first physical line holds at most [MAX_LINE_LENGTH] bytes. Every
/// continuation line is a single space followed by at most
/// `MAX_LINE_LENGTH - 1` bytes. Wrapping never splits a UTF-8 sequence.
pub fn write_attribute_line(dest: &mut Vec<u8>, name: &str, value: &str) {
    let line = format!("{}: {}", name, value);

    let mut start = 0;
    let mut limit = MAX_LINE_LENGTH;

    loop {
        let remaining = line.len() - start;

        if remaining <= limit {
            dest.extend_from_slice(line[start..].as_bytes());
            dest.extend_from_slice(LINE_TERMINATOR);
            break;
        }

        let mut end = start + limit;
        while !line.is_char_boundary(end) {
            end -= 1;
        }

        dest.extend_from_slice(line[start..end].as_bytes());
        dest.extend_from_slice(LINE_TERMINATOR);
        dest.push(b' ');

        start = end;
        limit = MAX_LINE_LENGTH - 1;
    }
}
