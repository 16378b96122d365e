use std::collections::HashMap;

use super::{line_contents, Error, ManifestError};
use crate::constants::NAME_ATTRIBUTE;
use crate::digest::DigestAlgorithm;

/// A contiguous byte range of a manifest that forms one section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: Option<String>,
    offset: usize,
    length: usize,
    length_with_blank_line: usize,
}

impl Section {
    /// The value of the leading `Name:` attribute, `None` for the main section and for
    /// sections without a name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Start of the section in the raw manifest
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the section, not including the blank line that separates it from the next
    pub fn len(&self) -> usize {
        self.length
    }

    /// Returns `true` if [`len()`][Self::len] is zero
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Length of the section including the separating blank line
    pub fn len_with_blank_line(&self) -> usize {
        self.length_with_blank_line
    }
}

/// How the bytes of a section are fed into a digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigestMode {
    /// The section including its separating blank line
    Primary,
    /// The section without its separating blank line, as written by early Netscape tooling
    Workaround,
    /// Like [`Primary`][Self::Primary], but a space right before a `\r` is skipped, as computed
    /// by JDK 1.1 era signers
    OldStyle,
}

impl DigestMode {
    /// Primary first, then the legacy fallbacks
    pub const FALLBACK_ORDER: [Self; 3] = [Self::Primary, Self::Workaround, Self::OldStyle];
}

/// The raw bytes of a manifest (or signature file), split into sections
#[derive(Debug, Clone)]
pub struct ManifestSections {
    raw: Box<[u8]>,
    main: Section,
    sections: Vec<Section>,
    by_name: HashMap<String, Vec<usize>>,
}

struct Position {
    end_of_first_line: usize,
    end_of_section: usize,
    start_of_next: usize,
}

impl ManifestSections {
    /// Split a manifest into its main section and all following sections.
    ///
    /// Empty input, or input without a single line terminator, is rejected.
    pub fn split(raw: impl Into<Box<[u8]>>) -> Result<Self, ManifestError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(Error::Empty.into());
        }
        if !raw.iter().any(|&b| b == b'\r' || b == b'\n') {
            return Err(Error::Truncated.into());
        }

        let Some(pos) = find_section(&raw, 0) else {
            return Err(Error::Truncated.into());
        };
        let main = Section {
            name: None,
            offset: 0,
            length: pos.end_of_section,
            length_with_blank_line: pos.start_of_next,
        };

        let mut sections = Vec::new();
        let mut by_name = HashMap::<String, Vec<usize>>::new();
        let mut start = pos.start_of_next;
        while let Some(pos) = find_section(&raw, start) {
            let section = Section {
                name: section_name(&raw, start, &pos)?,
                offset: start,
                length: pos.end_of_section - start,
                length_with_blank_line: pos.start_of_next - start,
            };
            if let Some(name) = &section.name {
                by_name
                    .entry(name.clone())
                    .or_default()
                    .push(sections.len());
            }
            sections.push(section);
            start = pos.start_of_next;
        }

        Ok(Self {
            raw,
            main,
            sections,
            by_name,
        })
    }

    /// The unmodified input
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The main attributes section
    pub fn main_section(&self) -> &Section {
        &self.main
    }

    /// All sections following the main section, named or not, in file order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All physical sections for `name`, in file order
    pub fn named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Section> + 'a {
        self.by_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&idx| &self.sections[idx])
    }

    /// Returns `true` if at least one section is named `name`
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterate over the distinct entry names in order of their first section
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.sections.iter().filter_map(|section| {
            let name = section.name()?;
            let first = *self.by_name.get(name)?.first()?;
            std::ptr::eq(&self.sections[first], section).then_some(name)
        })
    }

    /// The bytes of a section, optionally including the separating blank line
    pub fn section_bytes(&self, section: &Section, with_blank_line: bool) -> &[u8] {
        let len = if with_blank_line {
            section.length_with_blank_line
        } else {
            section.length
        };
        &self.raw[section.offset..section.offset + len]
    }

    /// Digest the whole raw manifest
    pub fn digest_manifest(&self, algorithm: DigestAlgorithm) -> Vec<u8> {
        algorithm.digest(&self.raw)
    }

    /// Digest the main attributes section
    pub fn digest_main(&self, algorithm: DigestAlgorithm, mode: DigestMode) -> Vec<u8> {
        self.digest_sections(std::iter::once(&self.main), algorithm, mode)
    }

    /// Digest all sections of `name`, concatenated in file order.
    ///
    /// Returns `None` if there is no section for `name`.
    pub fn digest_entry(
        &self,
        name: &str,
        algorithm: DigestAlgorithm,
        mode: DigestMode,
    ) -> Option<Vec<u8>> {
        if !self.contains(name) {
            return None;
        }
        Some(self.digest_sections(self.named(name), algorithm, mode))
    }

    fn digest_sections<'a>(
        &'a self,
        sections: impl Iterator<Item = &'a Section>,
        algorithm: DigestAlgorithm,
        mode: DigestMode,
    ) -> Vec<u8> {
        let mut digest = algorithm.start();
        for section in sections {
            match mode {
                DigestMode::Primary => digest.update(self.section_bytes(section, true)),
                DigestMode::Workaround => digest.update(self.section_bytes(section, false)),
                DigestMode::OldStyle => {
                    update_old_style(self.section_bytes(section, true), |data| {
                        digest.update(data)
                    })
                },
            }
        }
        digest.finish()
    }
}

fn find_section(raw: &[u8], offset: usize) -> Option<Position> {
    let len = raw.len();
    if offset >= len {
        return None;
    }

    let mut end_of_first_line = None;
    let mut last_line_end = offset;
    let mut all_blank = true;
    let mut i = offset;
    while i < len {
        match raw[i] {
            b'\r' | b'\n' => {
                let _ = end_of_first_line.get_or_insert(i);
                if raw[i] == b'\r' && raw.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                let next = i + 1;
                if all_blank || next == len {
                    // a terminator at the very end closes the section, blank line or not
                    let end_of_section = if next == len { next } else { last_line_end };
                    return Some(Position {
                        end_of_first_line: end_of_first_line.unwrap_or(i),
                        end_of_section,
                        start_of_next: next,
                    });
                }
                last_line_end = next;
                all_blank = true;
            },
            _ => all_blank = false,
        }
        i += 1;
    }

    // unterminated tail
    Some(Position {
        end_of_first_line: end_of_first_line.unwrap_or(len),
        end_of_section: len,
        start_of_next: len,
    })
}

fn section_name(raw: &[u8], start: usize, pos: &Position) -> Result<Option<String>, ManifestError> {
    let first_line = &raw[start..pos.end_of_first_line];
    if first_line.len() <= NAME_ATTRIBUTE.len()
        || !first_line[..NAME_ATTRIBUTE.len()].eq_ignore_ascii_case(NAME_ATTRIBUTE)
    {
        return Ok(None);
    }

    let mut name = first_line[NAME_ATTRIBUTE.len()..].to_vec();
    for line in line_contents(&raw[start..pos.end_of_section]).skip(1) {
        match line.strip_prefix(b" ") {
            Some(continued) => name.extend_from_slice(continued),
            None => break,
        }
    }
    String::from_utf8(name)
        .map(Some)
        .map_err(|err| Error::NameEncoding(err.utf8_error(), start).into())
}

/// Feed `bytes` to `update`, leaving out a single space directly in front of every `\r`
fn update_old_style(bytes: &[u8], mut update: impl FnMut(&[u8])) {
    let mut start = 0;
    let mut prev = None;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\r' && prev == Some(b' ') {
            update(&bytes[start..i - 1]);
            start = i;
        }
        prev = Some(b);
    }
    update(&bytes[start..]);
}

/// Digests of the sections of one manifest, each computed at most once
#[derive(Debug)]
pub struct SectionDigests<'a> {
    sections: &'a ManifestSections,
    memo: HashMap<(DigestTarget, DigestAlgorithm, DigestMode), Option<Vec<u8>>>,
}

/// What part of a manifest is digested
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DigestTarget {
    /// The complete raw manifest, the digest mode is ignored
    Manifest,
    /// The main attributes section
    Main,
    /// All sections of one named entry
    Entry(String),
}

impl<'a> SectionDigests<'a> {
    /// Start with an empty table for `sections`
    pub fn new(sections: &'a ManifestSections) -> Self {
        Self {
            sections,
            memo: HashMap::new(),
        }
    }

    /// The sections the digests are computed over
    pub fn sections(&self) -> &'a ManifestSections {
        self.sections
    }

    /// Digest `target`, or return the digest computed earlier.
    ///
    /// `None` if `target` names an entry without a manifest section.
    pub fn get(
        &mut self,
        target: &DigestTarget,
        algorithm: DigestAlgorithm,
        mode: DigestMode,
    ) -> Option<&[u8]> {
        let sections = self.sections;
        self.memo
            .entry((target.clone(), algorithm, mode))
            .or_insert_with(|| match target {
                DigestTarget::Manifest => Some(sections.digest_manifest(algorithm)),
                DigestTarget::Main => Some(sections.digest_main(algorithm, mode)),
                DigestTarget::Entry(name) => sections.digest_entry(name, algorithm, mode),
            })
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use similar_asserts::assert_eq;

    use super::*;

    fn reassemble(sections: &ManifestSections) -> Vec<u8> {
        let mut out = sections
            .section_bytes(sections.main_section(), true)
            .to_vec();
        for section in sections.sections() {
            out.extend_from_slice(sections.section_bytes(section, true));
        }
        out
    }

    #[test]
    fn main_and_one_named_section() {
        let raw = b"Manifest-Version: 1.0\r\n\r\nName: a.txt\r\nSHA-256-Digest: AAAA\r\n\r\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();

        let main = sections.main_section();
        assert_eq!(main.name(), None);
        assert_eq!(main.len(), "Manifest-Version: 1.0\r\n".len());
        assert_eq!(main.len_with_blank_line(), "Manifest-Version: 1.0\r\n\r\n".len());

        assert_eq!(sections.sections().len(), 1);
        let named = &sections.sections()[0];
        assert_eq!(named.name(), Some("a.txt"));
        assert_eq!(named.offset(), main.len_with_blank_line());
        // a final blank line at the end of the buffer stays part of the section
        assert_eq!(
            sections.section_bytes(named, false),
            b"Name: a.txt\r\nSHA-256-Digest: AAAA\r\n\r\n",
        );
        assert_eq!(named.len(), named.len_with_blank_line());
    }

    #[test]
    fn blank_line_between_named_sections() {
        let raw = b"M: 1\r\n\r\nName: a\r\nX: 1\r\n\r\nName: b\r\nX: 2\r\n\r\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        let [first, last] = sections.sections() else {
            panic!("expected two named sections");
        };

        assert_eq!(first.name(), Some("a"));
        assert_eq!(first.len(), "Name: a\r\nX: 1\r\n".len());
        assert_eq!(first.len_with_blank_line(), first.len() + 2);
        assert_eq!(sections.section_bytes(first, false), b"Name: a\r\nX: 1\r\n");
        assert_eq!(sections.section_bytes(first, true), b"Name: a\r\nX: 1\r\n\r\n");
        assert_eq!(last.offset(), first.offset() + first.len_with_blank_line());
        assert_eq!(last.len(), last.len_with_blank_line());

        assert_ne!(
            sections.digest_entry("a", DigestAlgorithm::Sha256, DigestMode::Primary),
            sections.digest_entry("a", DigestAlgorithm::Sha256, DigestMode::Workaround),
        );
    }

    #[test]
    fn leading_blank_line_gives_an_empty_main_section() {
        let sections = ManifestSections::split(&b"\r\nName: a\r\n\r\n"[..]).unwrap();
        let main = sections.main_section();
        assert_eq!(main.len(), 0);
        assert_eq!(main.len_with_blank_line(), 2);
        assert!(main.is_empty());

        let named = &sections.sections()[0];
        assert_eq!(named.name(), Some("a"));
        assert!(!named.is_empty());
    }

    #[test]
    fn rejects_empty_and_unterminated_input() {
        assert!(ManifestSections::split(Vec::new()).is_err());
        assert!(ManifestSections::split(&b"Manifest-Version: 1.0"[..]).is_err());
    }

    #[test]
    fn all_line_terminators() {
        for eol in ["\n", "\r", "\r\n"] {
            let raw = format!("Manifest-Version: 1.0{eol}{eol}Name: x/y{eol}A: b{eol}{eol}");
            let sections = ManifestSections::split(raw.as_bytes()).unwrap();
            assert_eq!(sections.sections().len(), 1, "eol {eol:?}");
            assert_eq!(sections.sections()[0].name(), Some("x/y"), "eol {eol:?}");
        }
    }

    #[test]
    fn continued_name() {
        let raw = b"M: 1\n\nName: very/long/\n path/na\n me.class\nA: b\n\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        assert_eq!(
            sections.sections()[0].name(),
            Some("very/long/path/name.class"),
        );
    }

    #[test]
    fn name_split_inside_utf8_sequence() {
        let mut raw = b"M: 1\n\nName: \xc3\n \xa4.txt\n\n".to_vec();
        let sections = ManifestSections::split(raw.clone()).unwrap();
        assert_eq!(sections.sections()[0].name(), Some("\u{e4}.txt"));

        raw[12] = b'\xff';
        assert!(ManifestSections::split(raw).is_err());
    }

    #[test]
    fn anonymous_sections_are_kept_but_not_named() {
        let raw = b"M: 1\n\nName:\nA: b\n\nX-Other: 2\n\nname: ok\n\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        let names = sections
            .sections()
            .iter()
            .map(Section::name)
            .collect::<Vec<_>>();
        assert_eq!(names, [None, None, Some("ok")]);
        assert!(sections.contains("ok"));
    }

    #[test]
    fn unterminated_tail_ends_a_section() {
        let raw = b"M: 1\n\nName: a\nB: c";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        let tail = &sections.sections()[0];
        assert_eq!(tail.name(), Some("a"));
        assert_eq!(sections.section_bytes(tail, true), b"Name: a\nB: c");
    }

    #[test]
    fn duplicate_names_digest_in_file_order() {
        let raw = b"M: 1\n\nName: a\nX: 1\n\nName: b\n\nName: a\nY: 2\n\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        assert_eq!(sections.named("a").count(), 2);
        assert_eq!(sections.names().collect::<Vec<_>>(), ["a", "b"]);

        let expected = DigestAlgorithm::Sha256.digest(b"Name: a\nX: 1\n\nName: a\nY: 2\n\n");
        assert_eq!(
            sections.digest_entry("a", DigestAlgorithm::Sha256, DigestMode::Primary),
            Some(expected),
        );
        assert_eq!(
            sections.digest_entry("c", DigestAlgorithm::Sha256, DigestMode::Primary),
            None,
        );
    }

    #[test]
    fn workaround_leaves_out_blank_line() {
        let raw = b"M: 1\r\n\r\nName: a\r\nX: 1\r\n\r\nName: b\r\n\r\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        assert_eq!(
            sections.digest_entry("a", DigestAlgorithm::Sha1, DigestMode::Workaround),
            Some(DigestAlgorithm::Sha1.digest(b"Name: a\r\nX: 1\r\n")),
        );
    }

    #[test]
    fn old_style_skips_space_before_cr() {
        let raw = b"M: 1\r\n\r\nName: a \r\nX: 1  \r\n\r\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        assert_eq!(
            sections.digest_entry("a ", DigestAlgorithm::Sha256, DigestMode::OldStyle),
            Some(DigestAlgorithm::Sha256.digest(b"Name: a\r\nX: 1 \r\n\r\n")),
        );
    }

    #[test]
    fn memoised_digests() {
        let raw = b"M: 1\n\nName: a\n\n";
        let sections = ManifestSections::split(&raw[..]).unwrap();
        let mut digests = SectionDigests::new(&sections);
        let target = DigestTarget::Entry("a".to_owned());
        let first = digests
            .get(&target, DigestAlgorithm::Sha256, DigestMode::Primary)
            .map(<[u8]>::to_vec);
        let second = digests
            .get(&target, DigestAlgorithm::Sha256, DigestMode::Primary)
            .map(<[u8]>::to_vec);
        assert_eq!(first, second);
        assert_eq!(digests.memo.len(), 1);
        assert!(digests
            .get(&DigestTarget::Entry("b".to_owned()), DigestAlgorithm::Sha256, DigestMode::Primary)
            .is_none());
    }

    fn manifest_strategy() -> impl Strategy<Value = Vec<u8>> {
        let eol = prop_oneof![Just("\n"), Just("\r\n"), Just("\r")];
        let value = "[A-Za-z0-9/._ -]{1,40}";
        (eol, prop::collection::vec((value, "[a-z]{1,8}"), 1..8)).prop_map(|(eol, entries)| {
            let mut out = format!("Manifest-Version: 1.0{eol}Created-By: test{eol}{eol}");
            for (name, value) in entries {
                out.push_str(&format!("Name: {name}{eol}X-Value: {value} {eol}{eol}"));
            }
            out.into_bytes()
        })
    }

    proptest! {
        #[test]
        fn reassembling_sections_gives_the_input(raw in manifest_strategy()) {
            let sections = ManifestSections::split(raw.clone()).unwrap();
            prop_assert_eq!(reassemble(&sections), raw);
        }

        #[test]
        fn digests_are_deterministic(raw in manifest_strategy()) {
            let first = ManifestSections::split(raw.clone()).unwrap();
            let second = ManifestSections::split(raw).unwrap();
            for mode in DigestMode::FALLBACK_ORDER {
                for name in first.names() {
                    prop_assert_eq!(
                        first.digest_entry(name, DigestAlgorithm::Sha256, mode),
                        second.digest_entry(name, DigestAlgorithm::Sha256, mode),
                    );
                }
                prop_assert_eq!(
                    first.digest_main(DigestAlgorithm::Sha1, mode),
                    second.digest_main(DigestAlgorithm::Sha1, mode),
                );
            }
        }
    }
}
