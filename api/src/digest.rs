//! Digest algorithms named by JAR manifest and signature file attributes

use std::fmt;
use std::str::FromStr;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

/// A digest algorithm that can appear as `<Algo>-Digest` prefix in a manifest or signature file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DigestAlgorithm {
    /// MD5, only accepted for archives signed by legacy tooling
    Md5,
    /// SHA-1
    Sha1,
    /// SHA-224
    Sha224,
    /// SHA-256
    Sha256,
    /// SHA-384
    Sha384,
    /// SHA-512
    Sha512,
}

impl DigestAlgorithm {
    /// Strongest algorithm first
    pub const PREFERENCE: [Self; 6] = [
        Self::Sha512,
        Self::Sha384,
        Self::Sha256,
        Self::Sha224,
        Self::Sha1,
        Self::Md5,
    ];

    /// The canonical attribute prefix, e.g. `SHA-256` for `SHA-256-Digest`
    pub const fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha224 => "SHA-224",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// All spellings of this algorithm accepted as attribute prefix
    pub const fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Md5 => &["MD5"],
            Self::Sha1 => &["SHA1", "SHA-1"],
            Self::Sha224 => &["SHA-224", "SHA224"],
            Self::Sha256 => &["SHA-256", "SHA256"],
            Self::Sha384 => &["SHA-384", "SHA384"],
            Self::Sha512 => &["SHA-512", "SHA512"],
        }
    }

    /// Length of a finished digest in bytes
    pub const fn output_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha224 => 28,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Start a new incremental digest
    pub fn start(self) -> RunningDigest {
        let state = match self {
            Self::Md5 => State::Md5(md5::Context::new()),
            Self::Sha1 => State::Sha1(Sha1::new()),
            Self::Sha224 => State::Sha224(Sha224::new()),
            Self::Sha256 => State::Sha256(Sha256::new()),
            Self::Sha384 => State::Sha384(Sha384::new()),
            Self::Sha512 => State::Sha512(Sha512::new()),
        };
        RunningDigest {
            algorithm: self,
            state,
        }
    }

    /// Digest a complete buffer
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        let mut digest = self.start();
        digest.update(data);
        digest.finish()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The string did not name a known digest algorithm
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("unknown digest algorithm")]
pub struct UnknownDigestAlgorithm;

impl FromStr for DigestAlgorithm {
    type Err = UnknownDigestAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PREFERENCE
            .into_iter()
            .find(|algorithm| {
                algorithm
                    .aliases()
                    .iter()
                    .any(|alias| alias.eq_ignore_ascii_case(s))
            })
            .ok_or(UnknownDigestAlgorithm)
    }
}

/// The state of an incremental digest computation
#[derive(Clone)]
pub struct RunningDigest {
    algorithm: DigestAlgorithm,
    state: State,
}

#[derive(Clone)]
enum State {
    Md5(md5::Context),
    Sha1(Sha1),
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl RunningDigest {
    /// The algorithm this digest was started with
    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Feed more data into the digest
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Md5(ctx) => ctx.consume(data),
            State::Sha1(ctx) => ctx.update(data),
            State::Sha224(ctx) => ctx.update(data),
            State::Sha256(ctx) => ctx.update(data),
            State::Sha384(ctx) => ctx.update(data),
            State::Sha512(ctx) => ctx.update(data),
        }
    }

    /// Consume the state and return the digest bytes
    pub fn finish(self) -> Vec<u8> {
        match self.state {
            State::Md5(ctx) => ctx.finalize().0.to_vec(),
            State::Sha1(ctx) => ctx.finalize().to_vec(),
            State::Sha224(ctx) => ctx.finalize().to_vec(),
            State::Sha256(ctx) => ctx.finalize().to_vec(),
            State::Sha384(ctx) => ctx.finalize().to_vec(),
            State::Sha512(ctx) => ctx.finalize().to_vec(),
        }
    }
}

impl fmt::Debug for RunningDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningDigest")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl std::io::Write for RunningDigest {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Decode a base64 digest value as found in manifest attributes.
///
/// Surrounding whitespace is ignored. Returns `None` if the value is not valid base64.
pub(crate) fn decode_digest(value: &str) -> Option<Vec<u8>> {
    BASE64_STANDARD.decode(value.trim()).ok()
}

/// Encode digest bytes the way they are written into manifest attributes
#[cfg(test)]
pub(crate) fn encode_digest(digest: &[u8]) -> String {
    BASE64_STANDARD.encode(digest)
}
