#![cfg_attr(docsrs, doc(cfg(feature = "zip")))]

//! Open `.jar` files and read their entries with verification

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::VerifierConfig;
use crate::constants::META_INF;
use crate::manifest::Manifest;
use crate::signature::{
    match_signature_files, Certificate, CertificateChain, SignatureBlockParser,
};
use crate::verify::{JarVerifier, JarVerifierError, VerifierEntry, VerifyingReader};

crate::Error! {
    /// An error returned by [`JarFile::new()`] and [`JarFile::open()`]
    pub struct OpenJarError(Error) {
        #[error("could not open input")]
        Open(#[source] std::io::Error),
        #[error("could not read input ZIP")]
        InputZip(#[source] ZipError),
        #[error("could not read {1:?} inside input ZIP")]
        InputZipEntry(#[source] ZipError, String),
        #[error("could not read {1:?}")]
        Read(#[source] std::io::Error, String),
        #[error("{0:?} exceeds the size limit for metadata files")]
        TooLarge(String),
        #[error("the signature metadata is broken")]
        Untrustworthy(#[source] JarVerifierError),
    }
}

/// A `.jar` file whose signatures were checked when it was opened
pub struct JarFile<R> {
    archive: ZipArchive<R>,
    verifier: JarVerifier,
}

impl JarFile<BufReader<File>> {
    /// Open the `.jar` file at `path`
    pub fn open<P>(
        path: impl AsRef<Path>,
        parser: &P,
        config: &VerifierConfig,
    ) -> Result<Self, OpenJarError>
    where
        P: ?Sized + SignatureBlockParser,
    {
        let file = File::open(path).map_err(Error::Open)?;
        Self::new(BufReader::new(file), parser, config)
    }
}

impl<R: Read + Seek> JarFile<R> {
    /// Read the manifest and all signature files of the `.jar` in `reader`, and check them.
    ///
    /// Fails if the input is not a ZIP file, or if the manifest or a signature file is
    /// malformed. Such an archive must not be treated as signed.
    pub fn new<P>(reader: R, parser: &P, config: &VerifierConfig) -> Result<Self, OpenJarError>
    where
        P: ?Sized + SignatureBlockParser,
    {
        let mut archive = ZipArchive::new(reader).map_err(Error::InputZip)?;

        let meta_names = archive
            .file_names()
            .filter(|name| {
                name.strip_prefix(META_INF)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .map(str::to_owned)
            .collect::<Vec<_>>();

        let limit = config.max_metadata_size();
        let mut files = Vec::with_capacity(meta_names.len());
        for name in meta_names {
            let file = archive
                .by_name(&name)
                .map_err(|err| Error::InputZipEntry(err, name.clone()))?;
            if file.size() > limit {
                return Err(Error::TooLarge(name).into());
            }
            let mut content = Vec::new();
            let _: usize = file
                .take(limit + 1)
                .read_to_end(&mut content)
                .map_err(|err| Error::Read(err, name.clone()))?;
            if content.len() as u64 > limit {
                return Err(Error::TooLarge(name).into());
            }
            files.push((name, content));
        }
        log::debug!("read {} files from {META_INF}", files.len());

        let files = match_signature_files(files, config);
        let verifier = JarVerifier::new(files, parser, config).map_err(Error::Untrustworthy)?;
        Ok(Self { archive, verifier })
    }

    /// Returns `true` if at least one signer endorses at least one entry
    pub fn is_signed(&self) -> bool {
        self.verifier.is_signed_jar()
    }

    /// The parsed manifest, if the archive has one
    pub fn manifest(&self) -> Option<&Manifest> {
        self.verifier.manifest()
    }

    /// The verification state of the archive
    pub fn verifier(&self) -> &JarVerifier {
        &self.verifier
    }

    /// Number of entries in the archive
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    /// Returns `true` if the archive contains no entries
    pub fn is_empty(&self) -> bool {
        self.archive.is_empty()
    }

    /// Names of all entries in the archive
    pub fn file_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.archive.file_names()
    }

    /// Read the entry `name`.
    ///
    /// If the entry is signed, its digest is checked when the end of its content is reached.
    pub fn by_name(&mut self, name: &str) -> Result<JarEntryReader<'_>, ZipError> {
        let file = self.archive.by_name(name)?;
        let size = file.size();
        let entry = self.verifier.init_entry(name);
        Ok(JarEntryReader::new(name, Box::new(file), entry, size))
    }

    /// Read the entry at index `idx`.
    ///
    /// If the entry is signed, its digest is checked when the end of its content is reached.
    pub fn by_index(&mut self, idx: usize) -> Result<JarEntryReader<'_>, ZipError> {
        let file = self.archive.by_index(idx)?;
        let size = file.size();
        let name = file.name().to_owned();
        let entry = self.verifier.init_entry(&name);
        Ok(JarEntryReader::new(&name, Box::new(file), entry, size))
    }

    /// The certificate chains of all signers of `name`.
    ///
    /// Returns `None` unless the archive is signed, and the content of `name` was read
    /// completely through [`by_name()`][Self::by_name] or [`by_index()`][Self::by_index] and
    /// its digest matched.
    pub fn certificate_chains(&self, name: &str) -> Option<Vec<CertificateChain>> {
        self.verifier.certificate_chains(name)
    }

    /// All certificates of all signers of `name`, concatenated
    pub fn certificates(&self, name: &str) -> Option<Vec<Certificate>> {
        self.verifier.certificates(name)
    }
}

impl<R> fmt::Debug for JarFile<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JarFile")
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

/// The content of one entry of a [`JarFile`]
pub struct JarEntryReader<'a> {
    name: String,
    inner: Inner<'a>,
}

enum Inner<'a> {
    Plain(Box<dyn Read + 'a>),
    Verifying(VerifyingReader<'a, Box<dyn Read + 'a>>),
}

impl<'a> JarEntryReader<'a> {
    fn new(
        name: &str,
        file: Box<dyn Read + 'a>,
        entry: Option<VerifierEntry<'a>>,
        size: u64,
    ) -> Self {
        let inner = match entry {
            Some(entry) => Inner::Verifying(VerifyingReader::new(file, entry, size)),
            None => Inner::Plain(file),
        };
        Self {
            name: name.to_owned(),
            inner,
        }
    }

    /// Name of the entry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the content is checked against a signed digest.
    ///
    /// If `false`, the content is plain, untrusted data.
    pub fn is_verifying(&self) -> bool {
        matches!(self.inner, Inner::Verifying(_))
    }
}

impl Read for JarEntryReader<'_> {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            Inner::Plain(file) => file.read(buf),
            Inner::Verifying(file) => file.read(buf),
        }
    }
}

impl fmt::Debug for JarEntryReader<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut f = f.debug_struct("JarEntryReader");
        let _ = f.field("name", &self.name);
        if let Inner::Verifying(file) = &self.inner {
            let _ = f.field("entry", file.entry());
        }
        f.finish_non_exhaustive()
    }
}
