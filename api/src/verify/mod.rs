//! Decide which entries of a signed JAR are covered by which signers

mod entry;
mod reader;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub use self::entry::{EntryStatus, EntryVerifyError, VerifierEntry};
pub use self::reader::VerifyingReader;
use crate::config::VerifierConfig;
use crate::constants::DIGEST_SUFFIX;
use crate::manifest::{Manifest, ManifestError, SectionDigests};
use crate::signature::{
    expected_digests, split_chains, verify_signature_file, Certificate, CertificateChain,
    MetaInfFiles, SignatureBlockParser, SignatureFileError, SignerEndorsement,
};

crate::Error! {
    /// The metadata of the archive is broken, the archive must not be treated as signed
    pub struct JarVerifierError(Error) {
        #[error("malformed manifest")]
        Manifest(#[source] ManifestError),
        #[error("malformed signature file")]
        SignatureFile(#[source] SignatureFileError),
        #[error("invalid signature block")]
        SignatureBlock(#[source] SignatureFileError),
    }
}

/// The verification state of one archive.
///
/// All signature files are checked eagerly by [`JarVerifier::new()`]. Entries are verified
/// while they are read through a [`VerifierEntry`], and only afterwards
/// [`certificate_chains()`][Self::certificate_chains] reports their signers.
#[derive(Debug)]
pub struct JarVerifier {
    manifest: Option<Manifest>,
    signers: Vec<SignerEndorsement>,
    config: VerifierConfig,
    verified: RwLock<HashMap<String, Vec<usize>>>,
}

impl JarVerifier {
    /// Load the manifest and check every matched signature file against it.
    ///
    /// A malformed manifest or signature file is an error. A signature block that cannot be
    /// parsed, or that does not sign its signature file, only drops that signer, unless
    /// [`strict_signature_blocks`][VerifierConfig::with_strict_signature_blocks] is set.
    pub fn new<P>(
        files: MetaInfFiles,
        parser: &P,
        config: &VerifierConfig,
    ) -> Result<Self, JarVerifierError>
    where
        P: ?Sized + SignatureBlockParser,
    {
        let mut verifier = Self {
            manifest: None,
            signers: Vec::new(),
            config: config.clone(),
            verified: RwLock::default(),
        };

        let Some(manifest) = files.manifest else {
            if !files.signatures.is_empty() {
                log::warn!("signature files present, but the archive has no manifest");
            }
            return Ok(verifier);
        };
        let manifest = Manifest::parse(manifest).map_err(Error::Manifest)?;

        let mut digests = SectionDigests::new(manifest.sections());
        for signature in &files.signatures {
            match verify_signature_file(signature, &mut digests, parser, config) {
                Ok(signer) if signer.endorsed().next().is_some() => {
                    log::debug!(
                        "{:?} endorses {} entries",
                        signer.signature_file_name(),
                        signer.endorsed().count(),
                    );
                    verifier.signers.push(signer);
                },
                Ok(signer) => {
                    log::debug!("{:?} endorses no entry", signer.signature_file_name());
                },
                Err(err) if err.is_malformed_signature_file() => {
                    return Err(Error::SignatureFile(err).into());
                },
                Err(err) if config.strict_signature_blocks() => {
                    return Err(Error::SignatureBlock(err).into());
                },
                Err(err) => {
                    log::warn!("ignoring signer {:?}: {err}", signature.base_name);
                },
            }
        }

        verifier.manifest = Some(manifest);
        Ok(verifier)
    }

    /// Returns `true` if at least one signer endorses at least one entry
    pub fn is_signed_jar(&self) -> bool {
        !self.signers.is_empty()
    }

    /// The parsed manifest, if the archive has one
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// All signers that endorse at least one entry, sorted by base name
    pub fn signers(&self) -> &[SignerEndorsement] {
        &self.signers
    }

    /// Start verifying the content of the entry `name`.
    ///
    /// Returns `None` if the entry cannot be verified: the archive is unsigned, no signer
    /// endorses the entry, or its manifest section carries no usable digest. Such an entry
    /// must be treated as plain, untrusted content.
    pub fn init_entry(&self, name: &str) -> Option<VerifierEntry<'_>> {
        if !self.is_signed_jar() {
            return None;
        }
        let attributes = self.manifest.as_ref()?.attributes(name)?;
        let signers = self
            .signers
            .iter()
            .enumerate()
            .filter(|(_, signer)| signer.endorses(name))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        if signers.is_empty() {
            return None;
        }

        let (algorithm, expected) = expected_digests(attributes, DIGEST_SUFFIX, &self.config)
            .into_iter()
            .next()?;
        Some(VerifierEntry::new(self, name, algorithm, expected, signers))
    }

    /// The certificate chains of all signers of `name`.
    ///
    /// Returns `None` unless the content of `name` was read completely and its digest matched.
    pub fn certificate_chains(&self, name: &str) -> Option<Vec<CertificateChain>> {
        if !self.is_signed_jar() {
            return None;
        }
        let verified = self.verified.read().unwrap_or_else(PoisonError::into_inner);
        let signers = verified.get(name)?;
        let certificates = signers
            .iter()
            .flat_map(|&idx| self.signers[idx].certificate_chains())
            .flatten();
        Some(split_chains(certificates))
    }

    /// All certificates of all signers of `name`, concatenated.
    ///
    /// Same as [`certificate_chains()`][Self::certificate_chains], but flattened.
    pub fn certificates(&self, name: &str) -> Option<Vec<Certificate>> {
        self.certificate_chains(name)
            .map(|chains| chains.into_iter().flatten().collect())
    }

    pub(crate) fn record_verified(&self, name: &str, signers: &[usize]) {
        let mut verified = self.verified.write().unwrap_or_else(PoisonError::into_inner);
        let _ = verified.insert(name.to_owned(), signers.to_vec());
    }

    pub(crate) fn record_failed(&self, name: &str) {
        let mut verified = self.verified.write().unwrap_or_else(PoisonError::into_inner);
        let _ = verified.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use similar_asserts::assert_eq;

    use super::*;
    use crate::digest::{encode_digest, DigestAlgorithm};
    use crate::manifest::{DigestMode, ManifestSections};
    use crate::signature::{MalformedSignatureBlock, MatchedSignature, SignatureBlock};

    const CA: &str = "CN=Test CA";

    fn sha256(data: &[u8]) -> String {
        encode_digest(&DigestAlgorithm::Sha256.digest(data))
    }

    fn manifest(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut out = "Manifest-Version: 1.0\r\nCreated-By: test\r\n\r\n".to_owned();
        for (name, content) in entries {
            let digest = sha256(content.as_bytes());
            out.push_str(&format!("Name: {name}\r\nSHA-256-Digest: {digest}\r\n\r\n"));
        }
        out.into_bytes()
    }

    fn signed(manifest: &[u8], base_name: &str, signer: &str, names: &[&str]) -> MatchedSignature {
        let sections = ManifestSections::split(manifest).unwrap();
        let mut sf = format!(
            "Signature-Version: 1.0\r\nSHA-256-Digest-Manifest: {}\r\n\r\n",
            sha256(manifest),
        );
        for name in names {
            let digest = sections
                .digest_entry(name, DigestAlgorithm::Sha256, DigestMode::Primary)
                .unwrap();
            sf.push_str(&format!(
                "Name: {name}\r\nSHA-256-Digest: {}\r\n\r\n",
                encode_digest(&digest),
            ));
        }
        let block = format!(
            "{signer}\n{}",
            hex::encode(DigestAlgorithm::Sha256.digest(sf.as_bytes())),
        );
        MatchedSignature {
            base_name: base_name.to_owned(),
            signature_file_name: format!("META-INF/{base_name}.SF"),
            signature_file: sf.into_bytes(),
            block_name: format!("META-INF/{base_name}.RSA"),
            block: block.into_bytes(),
        }
    }

    fn parser(_: &str, block: &[u8]) -> Result<SignatureBlock, MalformedSignatureBlock> {
        let malformed = || MalformedSignatureBlock("not a test block".to_owned());
        let block = std::str::from_utf8(block).map_err(|_| malformed())?;
        let (signer, digest) = block.split_once('\n').ok_or_else(malformed)?;
        Ok(SignatureBlock {
            signed_content_digest_algorithm: DigestAlgorithm::Sha256,
            signed_content_digest: hex::decode(digest).map_err(|_| malformed())?,
            certificate_chains: vec![vec![
                Certificate::new(signer, CA, signer.as_bytes().to_vec()),
                Certificate::new(CA, CA, CA.as_bytes().to_vec()),
            ]],
        })
    }

    fn build_verifier(manifest: Vec<u8>, signatures: Vec<MatchedSignature>) -> JarVerifier {
        let files = MetaInfFiles {
            manifest: Some(manifest),
            signatures,
        };
        JarVerifier::new(files, &parser, &VerifierConfig::default()).unwrap()
    }

    fn leaf_subjects(chains: &[CertificateChain]) -> Vec<&str> {
        chains.iter().map(|chain| chain[0].subject()).collect()
    }

    #[test]
    fn certificates_only_after_verify() {
        let mf = manifest(&[("a.txt", "hello")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["a.txt"]);
        let verifier = build_verifier(mf, vec![sig]);
        assert!(verifier.is_signed_jar());

        let mut entry = verifier.init_entry("a.txt").unwrap();
        assert_eq!(entry.status(), EntryStatus::Created);
        assert_eq!(verifier.certificate_chains("a.txt"), None);

        entry.write(b"hel").unwrap();
        entry.write(b"lo").unwrap();
        assert_eq!(entry.status(), EntryStatus::Accumulating);
        assert_eq!(verifier.certificate_chains("a.txt"), None);

        entry.verify().unwrap();
        assert_eq!(entry.status(), EntryStatus::Verified);
        let chains = verifier.certificate_chains("a.txt").unwrap();
        assert_eq!(leaf_subjects(&chains), ["CN=alice"]);
        assert_eq!(chains[0].len(), 2);
        assert_eq!(verifier.certificates("a.txt").map(|c| c.len()), Some(2));

        assert!(matches!(entry.write(b"more"), Err(EntryVerifyError::Finalized(_))));
        assert!(matches!(entry.verify(), Err(EntryVerifyError::Finalized(_))));
    }

    #[test]
    fn empty_content() {
        let mf = manifest(&[("empty", "")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["empty"]);
        let verifier = build_verifier(mf, vec![sig]);

        let mut entry = verifier.init_entry("empty").unwrap();
        entry.verify().unwrap();
        assert_eq!(entry.status(), EntryStatus::Verified);
        assert!(verifier.certificate_chains("empty").is_some());
    }

    #[test]
    fn modified_content_fails() {
        let mf = manifest(&[("a.txt", "hello")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["a.txt"]);
        let verifier = build_verifier(mf, vec![sig]);

        let mut entry = verifier.init_entry("a.txt").unwrap();
        let _ = entry.verify().unwrap_err();
        let mut entry = verifier.init_entry("a.txt").unwrap();
        entry.write(b"hello").unwrap();
        entry.verify().unwrap();
        assert!(verifier.certificate_chains("a.txt").is_some());

        // a later read of tampered data revokes the earlier result
        let mut entry = verifier.init_entry("a.txt").unwrap();
        entry.write(b"hellp").unwrap();
        let err = entry.verify().unwrap_err();
        assert!(matches!(err, EntryVerifyError::DigestMismatch(_)));
        assert_eq!(entry.status(), EntryStatus::Failed);
        assert_eq!(verifier.certificate_chains("a.txt"), None);
    }

    #[test]
    fn two_signers_two_chains() {
        let mf = manifest(&[("a.txt", "hello"), ("b.txt", "world")]);
        let alice = signed(&mf, "ALICE", "CN=alice", &["a.txt", "b.txt"]);
        let bob = signed(&mf, "BOB", "CN=bob", &["a.txt"]);
        let verifier = build_verifier(mf, vec![alice, bob]);

        let mut entry = verifier.init_entry("a.txt").unwrap();
        entry.write(b"hello").unwrap();
        entry.verify().unwrap();
        let chains = verifier.certificate_chains("a.txt").unwrap();
        assert_eq!(leaf_subjects(&chains), ["CN=alice", "CN=bob"]);

        let mut entry = verifier.init_entry("b.txt").unwrap();
        entry.write(b"world").unwrap();
        entry.verify().unwrap();
        let chains = verifier.certificate_chains("b.txt").unwrap();
        assert_eq!(leaf_subjects(&chains), ["CN=alice"]);
    }

    #[test]
    fn unendorsed_entries_are_not_verifiable() {
        let mf = manifest(&[("a.txt", "hello"), ("b.txt", "world")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["a.txt"]);
        let verifier = build_verifier(mf, vec![sig]);
        assert!(verifier.init_entry("b.txt").is_none());
        assert!(verifier.init_entry("not-in-manifest").is_none());
        assert_eq!(verifier.certificate_chains("b.txt"), None);
    }

    #[test]
    fn no_signature_means_unsigned() {
        let mf = manifest(&[("a.txt", "hello")]);
        let verifier = build_verifier(mf, Vec::new());
        assert!(!verifier.is_signed_jar());
        assert!(verifier.init_entry("a.txt").is_none());
        assert_eq!(verifier.certificate_chains("a.txt"), None);
        assert!(verifier.manifest().is_some());
    }

    #[test]
    fn malformed_block_drops_only_that_signer() {
        let mf = manifest(&[("a.txt", "hello")]);
        let good = signed(&mf, "GOOD", "CN=alice", &["a.txt"]);
        let mut bad = signed(&mf, "BAD", "CN=mallory", &["a.txt"]);
        bad.block = b"\xff".to_vec();

        let verifier = build_verifier(mf.clone(), vec![bad.clone(), good]);
        assert_eq!(verifier.signers().len(), 1);
        assert_eq!(verifier.signers()[0].base_name(), "GOOD");

        let verifier = build_verifier(mf.clone(), vec![bad.clone()]);
        assert!(!verifier.is_signed_jar());

        let strict = VerifierConfig::default().with_strict_signature_blocks(true);
        let files = MetaInfFiles {
            manifest: Some(mf),
            signatures: vec![bad],
        };
        assert!(JarVerifier::new(files, &parser, &strict).is_err());
    }

    #[test]
    fn broken_metadata_is_fatal() {
        let files = MetaInfFiles {
            manifest: Some(b"no line terminator".to_vec()),
            signatures: Vec::new(),
        };
        assert!(JarVerifier::new(files, &parser, &VerifierConfig::default()).is_err());

        let mf = manifest(&[("a.txt", "hello")]);
        let mut sig = signed(&mf, "CERT", "CN=alice", &["a.txt"]);
        sig.signature_file = b"garbage line\r\n\r\n".to_vec();
        sig.block = format!(
            "CN=alice\n{}",
            hex::encode(DigestAlgorithm::Sha256.digest(&sig.signature_file)),
        )
        .into_bytes();
        let files = MetaInfFiles {
            manifest: Some(mf),
            signatures: vec![sig],
        };
        assert!(JarVerifier::new(files, &parser, &VerifierConfig::default()).is_err());
    }

    #[test]
    fn tampered_manifest_section_is_not_endorsed() {
        let mf = manifest(&[("a.txt", "hello"), ("b.txt", "world")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["a.txt", "b.txt"]);
        let tampered = String::from_utf8(mf)
            .unwrap()
            .replace(&sha256(b"world"), &sha256(b"evil!"))
            .into_bytes();
        let verifier = build_verifier(tampered, vec![sig]);
        assert!(verifier.is_signed_jar());
        assert!(verifier.init_entry("a.txt").is_some());
        assert!(verifier.init_entry("b.txt").is_none());
    }

    #[test]
    fn verifying_reader_checks_at_eof() {
        let mf = manifest(&[("a.txt", "hello world")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["a.txt"]);
        let verifier = build_verifier(mf, vec![sig]);

        let entry = verifier.init_entry("a.txt").unwrap();
        let mut reader = VerifyingReader::new(&b"hello world"[..], entry, 11);
        let mut content = String::new();
        let _ = reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello world");
        assert_eq!(reader.entry().status(), EntryStatus::Verified);
        assert!(verifier.certificate_chains("a.txt").is_some());

        let entry = verifier.init_entry("a.txt").unwrap();
        let mut reader = VerifyingReader::new(&b"hello wOrld"[..], entry, 11);
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(verifier.certificate_chains("a.txt"), None);

        let entry = verifier.init_entry("a.txt").unwrap();
        let mut reader = VerifyingReader::new(&b"hello world"[..], entry, 5);
        let err = reader.read_to_end(&mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(reader.entry().status(), EntryStatus::Failed);
    }

    #[test]
    fn abandoned_stream_reports_nothing() {
        let mf = manifest(&[("a.txt", "hello world")]);
        let sig = signed(&mf, "CERT", "CN=alice", &["a.txt"]);
        let verifier = build_verifier(mf, vec![sig]);

        let entry = verifier.init_entry("a.txt").unwrap();
        let mut reader = VerifyingReader::new(&b"hello world"[..], entry, 11);
        let mut buf = [0; 4];
        reader.read_exact(&mut buf).unwrap();
        drop(reader);
        assert_eq!(verifier.certificate_chains("a.txt"), None);
    }

    #[test]
    fn entries_verify_on_separate_threads() {
        let names = (0..8).map(|i| format!("entry-{i}")).collect::<Vec<_>>();
        let entries = names
            .iter()
            .map(|name| (name.as_str(), name.as_str()))
            .collect::<Vec<_>>();
        let mf = manifest(&entries);
        let all = names.iter().map(String::as_str).collect::<Vec<_>>();
        let sig = signed(&mf, "CERT", "CN=alice", &all);
        let verifier = build_verifier(mf, vec![sig]);

        std::thread::scope(|scope| {
            for name in &names {
                let verifier = &verifier;
                let _ = scope.spawn(move || {
                    let mut entry = verifier.init_entry(name).unwrap();
                    entry.write(name.as_bytes()).unwrap();
                    entry.verify().unwrap();
                });
            }
        });
        for name in &names {
            assert!(verifier.certificate_chains(name).is_some(), "{name}");
        }
    }
}
