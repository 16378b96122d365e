use std::fmt;

use super::JarVerifier;
use crate::digest::{DigestAlgorithm, RunningDigest};

/// An error returned by [`VerifierEntry::write()`] and [`VerifierEntry::verify()`]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EntryVerifyError {
    /// The content of the entry does not match the digest in the manifest
    #[error("{0:?} has been modified, its digest does not match the manifest")]
    DigestMismatch(String),
    /// The entry produced more data than its declared size
    #[error("{0:?} is larger than its declared size")]
    SizeExceeded(String),
    /// The entry was already verified, or failed verification
    #[error("{0:?} was already finalized")]
    Finalized(String),
}

/// Where a [`VerifierEntry`] is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// No data was written yet
    Created,
    /// Some data was written, but the digest was not checked yet
    Accumulating,
    /// The digest matched; terminal
    Verified,
    /// The digest did not match, or the entry was aborted; terminal
    Failed,
}

enum State {
    Created(RunningDigest),
    Accumulating(RunningDigest),
    Verified,
    Failed,
}

/// The digest state of one entry that is being read.
///
/// Feed every byte of the decompressed content to [`write()`][Self::write], then call
/// [`verify()`][Self::verify] exactly once. Only a successful `verify()` makes the signers of
/// the entry visible through [`JarVerifier::certificate_chains()`].
pub struct VerifierEntry<'a> {
    verifier: &'a JarVerifier,
    name: String,
    algorithm: DigestAlgorithm,
    expected: Vec<u8>,
    signers: Vec<usize>,
    state: State,
}

impl<'a> VerifierEntry<'a> {
    pub(super) fn new(
        verifier: &'a JarVerifier,
        name: &str,
        algorithm: DigestAlgorithm,
        expected: Vec<u8>,
        signers: Vec<usize>,
    ) -> Self {
        Self {
            verifier,
            name: name.to_owned(),
            algorithm,
            expected,
            signers,
            state: State::Created(algorithm.start()),
        }
    }

    /// Name of the entry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The algorithm the content is digested with
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// The current state
    pub fn status(&self) -> EntryStatus {
        match self.state {
            State::Created(_) => EntryStatus::Created,
            State::Accumulating(_) => EntryStatus::Accumulating,
            State::Verified => EntryStatus::Verified,
            State::Failed => EntryStatus::Failed,
        }
    }

    /// Feed the next chunk of decompressed content into the digest
    pub fn write(&mut self, data: &[u8]) -> Result<(), EntryVerifyError> {
        match std::mem::replace(&mut self.state, State::Failed) {
            State::Created(mut digest) | State::Accumulating(mut digest) => {
                digest.update(data);
                self.state = State::Accumulating(digest);
                Ok(())
            },
            state @ (State::Verified | State::Failed) => {
                self.state = state;
                Err(EntryVerifyError::Finalized(self.name.clone()))
            },
        }
    }

    /// Finish the digest and compare it with the manifest.
    ///
    /// A mismatch is final: the entry must not be trusted, and its certificates are never
    /// reported.
    pub fn verify(&mut self) -> Result<(), EntryVerifyError> {
        let digest = match std::mem::replace(&mut self.state, State::Failed) {
            State::Created(digest) | State::Accumulating(digest) => digest,
            state @ (State::Verified | State::Failed) => {
                self.state = state;
                return Err(EntryVerifyError::Finalized(self.name.clone()));
            },
        };

        let actual = digest.finish();
        if actual != self.expected {
            log::warn!(
                "{:?}: {} digest {} does not match the manifest value {}",
                self.name,
                self.algorithm,
                hex::encode(&actual),
                hex::encode(&self.expected),
            );
            self.verifier.record_failed(&self.name);
            return Err(EntryVerifyError::DigestMismatch(self.name.clone()));
        }

        log::trace!("{:?}: {} digest verified", self.name, self.algorithm);
        self.verifier.record_verified(&self.name, &self.signers);
        self.state = State::Verified;
        Ok(())
    }

    /// Give up on the entry, e.g. because the stream produced more data than announced
    pub(crate) fn fail(&mut self) {
        if let State::Created(_) | State::Accumulating(_) = self.state {
            self.state = State::Failed;
            self.verifier.record_failed(&self.name);
        }
    }
}

impl fmt::Debug for VerifierEntry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierEntry")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl std::io::Write for VerifierEntry<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        VerifierEntry::write(self, buf)
            .map(|()| buf.len())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
