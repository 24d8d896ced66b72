// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Whole manifest documents.

use {
    crate::{
        attributes::{Attributes, NAME_ATTRIBUTE},
        error::{CorruptionKind, ManifestError},
        reader::{parse_attributes, split_sections, RawSection},
        section::Section,
    },
    log::warn,
    std::{collections::HashMap, io::Write},
};

/// The attribute holding the manifest format version.
pub const MANIFEST_VERSION_ATTRIBUTE: &str = "Manifest-Version";

/// A parsed or constructed manifest.
///
/// A manifest consists of a main section followed by entry sections, each
/// keyed by the archive path in its `Name` attribute. Entry sections are
/// kept in the order they were encountered or added.
///
/// Manifests obtained from [Manifest::parse] serialize back to the exact
/// bytes they were parsed from until something is changed.
#[derive(Clone, Debug)]
pub struct Manifest {
    main: Section,
    entries: Vec<Section>,
    index: HashMap<String, usize>,
    /// Bytes following an empty section that ended decoding.
    trailer: Vec<u8>,
    modified: bool,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

impl Manifest {
    /// Construct a new manifest with only a `Manifest-Version: 1.0` main attribute.
    pub fn new() -> Self {
        let mut attributes = Attributes::new();
        // Cannot collide in an empty set.
        let _ = attributes.push_unique(MANIFEST_VERSION_ATTRIBUTE.to_string(), "1.0".to_string());

        Self {
            main: Section::Modified { attributes },
            entries: vec![],
            index: HashMap::new(),
            trailer: vec![],
            modified: true,
        }
    }

    /// Construct a manifest from a main section, without entries.
    ///
    /// This is how structurally similar documents, such as signature files,
    /// are created.
    pub fn from_main_section(main: Section) -> Self {
        Self {
            main,
            entries: vec![],
            index: HashMap::new(),
            trailer: vec![],
            modified: true,
        }
    }

    /// Parse manifest data.
    ///
    /// Any format error in any section fails the whole parse.
    pub fn parse(data: &[u8]) -> Result<Self, ManifestError> {
        Self::parse_impl(data, false)
    }

    /// Parse manifest data, dropping malformed entry sections.
    ///
    /// The main section must still be well-formed. Each dropped section is
    /// logged. Dropping a section marks the manifest as modified, since it
    /// no longer reproduces its input.
    pub fn parse_lenient(data: &[u8]) -> Result<Self, ManifestError> {
        Self::parse_impl(data, true)
    }

    fn parse_impl(data: &[u8], lenient: bool) -> Result<Self, ManifestError> {
        let split = split_sections(data);
        let mut sections = split.sections.into_iter();

        let main = match sections.next() {
            Some(raw) => Section::from_parsed(
                raw.data.to_vec(),
                parse_attributes(&raw).map_err(|e| ManifestError::Corrupt {
                    kind: e.kind,
                    section: 0,
                    line: e.line,
                })?,
            ),
            None => Section::from_parsed(vec![], Attributes::new()),
        };

        let mut manifest = Self {
            main,
            entries: vec![],
            index: HashMap::new(),
            trailer: split.trailer.to_vec(),
            modified: false,
        };

        for (i, raw) in sections.enumerate() {
            let section_index = i + 1;

            match manifest.parse_entry(&raw) {
                Ok(()) => {}
                Err((kind, line)) if lenient => {
                    warn!(
                        "dropping malformed manifest section {} (line {}): {}",
                        section_index, line, kind
                    );
                    manifest.modified = true;
                }
                Err((kind, line)) => {
                    return Err(ManifestError::Corrupt {
                        kind,
                        section: section_index,
                        line,
                    });
                }
            }
        }

        Ok(manifest)
    }

    fn parse_entry(&mut self, raw: &RawSection) -> Result<(), (CorruptionKind, usize)> {
        let attributes = parse_attributes(raw).map_err(|e| (e.kind, e.line))?;
        let first_line = raw.lines.first().map(|l| l.number).unwrap_or_default();

        let name = match attributes.first() {
            Some((key, value)) if key.eq_ignore_ascii_case(NAME_ATTRIBUTE) && !value.is_empty() => {
                value.to_string()
            }
            _ => return Err((CorruptionKind::MissingName, first_line)),
        };

        if self.index.contains_key(&name) {
            return Err((CorruptionKind::DuplicateEntry(name), first_line));
        }

        self.index.insert(name, self.entries.len());
        self.entries
            .push(Section::from_parsed(raw.data.to_vec(), attributes));

        Ok(())
    }

    /// The main section.
    pub fn main_section(&self) -> &Section {
        &self.main
    }

    /// Mutable access to the main section.
    pub fn main_section_mut(&mut self) -> &mut Section {
        &mut self.main
    }

    /// Obtain the entry section for an archive path.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.index.get(name).map(|i| &self.entries[*i])
    }

    /// Mutable access to the entry section for an archive path.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        match self.index.get(name) {
            Some(i) => Some(&mut self.entries[*i]),
            None => None,
        }
    }

    /// Iterate over entry sections in manifest order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.entries.iter()
    }

    /// The number of entry sections.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry section.
    ///
    /// A section with the same name is replaced in place. Otherwise the
    /// section is appended.
    pub fn add_section(&mut self, section: Section) -> Result<(), ManifestError> {
        let name = section
            .name()
            .ok_or(ManifestError::NotAnEntrySection)?
            .to_string();

        if let Some(i) = self.index.get(&name) {
            self.entries[*i] = section;
        } else {
            // Entries after an empty main section would never be decoded.
            if self.main.attributes().is_empty() {
                self.main.set_attribute(MANIFEST_VERSION_ATTRIBUTE, "1.0")?;
            }

            match self.entries.last_mut() {
                Some(last) => last.terminate(),
                None => self.main.terminate(),
            }

            self.index.insert(name, self.entries.len());
            self.entries.push(section);
        }

        self.modified = true;
        self.trailer.clear();

        Ok(())
    }

    /// Whether this manifest differs from the data it was parsed from.
    pub fn is_modified(&self) -> bool {
        self.modified || self.main.is_modified() || self.entries.iter().any(|s| s.is_modified())
    }

    /// Write the encoded manifest to a writer.
    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), ManifestError> {
        writer.write_all(&self.to_bytes())?;

        Ok(())
    }

    /// Obtain the encoded manifest.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut dest = self.main.to_bytes().to_vec();

        for section in &self.entries {
            dest.extend_from_slice(&section.to_bytes());
        }

        dest.extend_from_slice(&self.trailer);

        dest
    }

    /// Digest of the encoded manifest.
    pub fn digest(&self, algorithm: &'static ring::digest::Algorithm) -> Vec<u8> {
        ring::digest::digest(algorithm, &self.to_bytes())
            .as_ref()
            .to_vec()
    }

    /// Digest of the encoded main section.
    pub fn main_digest(&self, algorithm: &'static ring::digest::Algorithm) -> Vec<u8> {
        self.main.digest(algorithm)
    }
}
