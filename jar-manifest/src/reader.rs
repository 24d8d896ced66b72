// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Low-level splitting of manifest data into sections and attributes.

use crate::{
    attributes::{is_valid_attribute_name, Attributes},
    error::CorruptionKind,
};

/// A physical line of manifest data.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Line<'a> {
    /// 1-based line number within the whole document.
    pub number: usize,
    /// Line content without its terminator.
    pub content: &'a [u8],
}

/// A run of lines terminated by a blank line or end of data.
#[derive(Debug)]
pub(crate) struct RawSection<'a> {
    /// All bytes of the section, including the terminating blank line.
    pub data: &'a [u8],
    pub lines: Vec<Line<'a>>,
}

/// Result of splitting manifest data into sections.
#[derive(Debug)]
pub(crate) struct SplitSections<'a> {
    pub sections: Vec<RawSection<'a>>,
    /// Bytes following an empty section, which ends decoding.
    pub trailer: &'a [u8],
}

/// Read one line starting at `offset`.
///
/// Returns the line content and the offset just past its terminator. CRLF,
/// LF and CR are all recognized as terminators. The final line may be
/// unterminated.
fn read_line(data: &[u8], offset: usize) -> (&[u8], usize, bool) {
    let rest = &data[offset..];

    match rest.iter().position(|b| *b == b'\r' || *b == b'\n') {
        Some(pos) => {
            let terminator_len = if rest[pos] == b'\r' && rest.get(pos + 1) == Some(&b'\n') {
                2
            } else {
                1
            };

            (&rest[..pos], offset + pos + terminator_len, true)
        }
        None => (rest, data.len(), false),
    }
}

/// Split manifest data into sections.
///
/// A section ends at a blank line (two consecutive line terminators) or at
/// the end of data. A section that has no lines at all stops splitting; the
/// remaining bytes are returned as the trailer so callers can reproduce
/// them.
pub(crate) fn split_sections(data: &[u8]) -> SplitSections<'_> {
    let mut sections = vec![];
    let mut offset = 0;
    let mut line_number = 0;

    while offset < data.len() {
        let start = offset;
        let mut lines = vec![];

        loop {
            if offset >= data.len() {
                break;
            }

            let (content, next, _) = read_line(data, offset);
            line_number += 1;
            offset = next;

            if content.is_empty() {
                break;
            }

            lines.push(Line {
                number: line_number,
                content,
            });
        }

        if lines.is_empty() {
            return SplitSections {
                sections,
                trailer: &data[start..],
            };
        }

        sections.push(RawSection {
            data: &data[start..offset],
            lines,
        });
    }

    SplitSections {
        sections,
        trailer: &data[data.len()..],
    }
}

/// A format error with the line it occurred on.
#[derive(Debug)]
pub(crate) struct LineError {
    pub kind: CorruptionKind,
    pub line: usize,
}

/// Parse the lines of a section into attributes.
pub(crate) fn parse_attributes(section: &RawSection) -> Result<Attributes, LineError> {
    let mut attributes = Attributes::new();
    // Name, raw value bytes and the line the attribute started on.
    let mut current: Option<(String, Vec<u8>, usize)> = None;

    for line in &section.lines {
        if let Some(continuation) = line.content.strip_prefix(b" ") {
            match &mut current {
                Some((_, value, _)) => value.extend_from_slice(continuation),
                None => {
                    return Err(LineError {
                        kind: CorruptionKind::OrphanContinuation,
                        line: line.number,
                    })
                }
            }

            continue;
        }

        if let Some(previous) = current.take() {
            finish_attribute(&mut attributes, previous)?;
        }

        let split = line
            .content
            .windows(2)
            .position(|w| w[0] == b':' && w[1] == b' ');

        let (name, value) = match split {
            Some(pos) => (&line.content[..pos], &line.content[pos + 2..]),
            None => {
                return Err(LineError {
                    kind: CorruptionKind::MalformedAttribute(
                        String::from_utf8_lossy(line.content).to_string(),
                    ),
                    line: line.number,
                })
            }
        };

        let name = match std::str::from_utf8(name) {
            Ok(name) if is_valid_attribute_name(name) => name.to_string(),
            _ => {
                return Err(LineError {
                    kind: CorruptionKind::InvalidAttributeName(
                        String::from_utf8_lossy(name).to_string(),
                    ),
                    line: line.number,
                })
            }
        };

        current = Some((name, value.to_vec(), line.number));
    }

    if let Some(previous) = current.take() {
        finish_attribute(&mut attributes, previous)?;
    }

    Ok(attributes)
}

fn finish_attribute(
    attributes: &mut Attributes,
    (name, value, line): (String, Vec<u8>, usize),
) -> Result<(), LineError> {
    let value = String::from_utf8(value).map_err(|_| LineError {
        kind: CorruptionKind::InvalidUtf8(name.clone()),
        line,
    })?;

    attributes.push_unique(name, value).map_err(|name| LineError {
        kind: CorruptionKind::DuplicateAttribute(name),
        line,
    })
}
