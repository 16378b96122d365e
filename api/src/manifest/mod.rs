//! Parse manifests and signature files, and compute digests over their sections

mod sections;

use std::collections::HashMap;
use std::str::Utf8Error;

pub use self::sections::{DigestMode, DigestTarget, ManifestSections, Section, SectionDigests};

crate::Error! {
    /// A manifest or signature file could not be parsed
    pub struct ManifestError(Error) {
        #[error("the manifest is empty")]
        Empty,
        #[error("no section boundary found, the manifest is truncated")]
        Truncated,
        #[error("the name of the section at offset {1} is not valid UTF-8")]
        NameEncoding(#[source] Utf8Error, usize),
        #[error("the line at offset {0} is not a `key: value` attribute")]
        BadAttribute(usize),
        #[error("the continuation line at offset {0} does not continue an attribute")]
        OrphanContinuation(usize),
        #[error("the value of attribute {1:?} is not valid UTF-8")]
        ValueEncoding(#[source] Utf8Error, String),
    }
}

/// Iterate over the lines of `bytes` without their terminators.
///
/// `\r\n`, `\r` and `\n` are all accepted as line terminators. A trailing unterminated line is
/// returned as well.
pub(crate) fn line_contents(bytes: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let mut rest = bytes;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        let Some(eol) = rest.iter().position(|&b| b == b'\r' || b == b'\n') else {
            return Some(std::mem::take(&mut rest));
        };
        let line = &rest[..eol];
        let skip = match &rest[eol..] {
            [b'\r', b'\n', ..] => 2,
            _ => 1,
        };
        rest = &rest[eol + skip..];
        Some(line)
    })
}

/// The attributes of one manifest section
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    values: Vec<(String, String)>,
}

impl Attributes {
    /// Parse the `key: value` lines of one section.
    ///
    /// `offset` is only used for error messages.
    pub fn parse(section: &[u8], offset: usize) -> Result<Self, ManifestError> {
        let mut pairs: Vec<(String, Vec<u8>)> = Vec::new();
        let mut line_offset = offset;
        let mut rest = section;
        for line in line_contents(section) {
            if let Some(continued) = line.strip_prefix(b" ") {
                let Some((_, value)) = pairs.last_mut() else {
                    return Err(Error::OrphanContinuation(line_offset).into());
                };
                value.extend_from_slice(continued);
            } else if !line.is_empty() {
                let Some(colon) = line.windows(2).position(|w| w == b": ") else {
                    return Err(Error::BadAttribute(line_offset).into());
                };
                let Ok(key) = std::str::from_utf8(&line[..colon]) else {
                    return Err(Error::BadAttribute(line_offset).into());
                };
                if key.is_empty() || !key.bytes().all(is_header_byte) {
                    return Err(Error::BadAttribute(line_offset).into());
                }
                pairs.push((key.to_owned(), line[colon + 2..].to_vec()));
            }

            let consumed = line.len() + terminator_len(&rest[line.len()..]);
            line_offset += consumed;
            rest = &rest[consumed..];
        }

        let values = pairs
            .into_iter()
            .map(|(key, value)| match String::from_utf8(value) {
                Ok(value) => Ok((key, value)),
                Err(err) => Err(Error::ValueEncoding(err.utf8_error(), key).into()),
            })
            .collect::<Result<Vec<_>, ManifestError>>()?;
        Ok(Self { values })
    }

    /// Look up an attribute, ignoring ASCII case of `key`.
    ///
    /// If the key is present multiple times, the last value wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over all attributes in file order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of attributes
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no attributes
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn merge(&mut self, other: Self) {
        self.values.extend(other.values);
    }
}

fn is_header_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn terminator_len(rest: &[u8]) -> usize {
    match rest {
        [b'\r', b'\n', ..] => 2,
        [b'\r' | b'\n', ..] => 1,
        _ => 0,
    }
}

/// A parsed manifest or signature file: its raw sections and the attributes in them
#[derive(Debug, Clone)]
pub struct Manifest {
    sections: ManifestSections,
    main: Attributes,
    entries: HashMap<String, Attributes>,
}

impl Manifest {
    /// Split and parse a manifest.
    ///
    /// Multiple sections for the same name are merged, sections without a name are skipped.
    pub fn parse(raw: impl Into<Box<[u8]>>) -> Result<Self, ManifestError> {
        let sections = ManifestSections::split(raw)?;

        let main_section = sections.main_section();
        let main = Attributes::parse(
            sections.section_bytes(main_section, false),
            main_section.offset(),
        )?;

        let mut entries = HashMap::<String, Attributes>::new();
        for section in sections.sections() {
            let Some(name) = section.name() else {
                continue;
            };
            let attributes =
                Attributes::parse(sections.section_bytes(section, false), section.offset())?;
            match entries.get_mut(name) {
                Some(existing) => existing.merge(attributes),
                None => {
                    let _ = entries.insert(name.to_owned(), attributes);
                },
            }
        }

        Ok(Self {
            sections,
            main,
            entries,
        })
    }

    /// The raw sections
    pub fn sections(&self) -> &ManifestSections {
        &self.sections
    }

    /// The unmodified input
    pub fn raw(&self) -> &[u8] {
        self.sections.raw()
    }

    /// The attributes of the main section
    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    /// The merged attributes of the entry `name`
    pub fn attributes(&self, name: &str) -> Option<&Attributes> {
        self.entries.get(name)
    }

    /// Iterate over all named entries, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Attributes)> + '_ {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
