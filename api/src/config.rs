use crate::constants::METADATA_LIMIT;
use crate::digest::DigestAlgorithm;

/// Knobs for [`JarVerifier`][crate::verify::JarVerifier] and
/// [`JarFile`][crate::jar::JarFile]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    signature_block_extensions: Vec<String>,
    digest_algorithms: Vec<DigestAlgorithm>,
    strict_signature_blocks: bool,
    max_metadata_size: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            signature_block_extensions: ["RSA", "DSA", "EC"].map(str::to_owned).to_vec(),
            digest_algorithms: DigestAlgorithm::PREFERENCE.to_vec(),
            strict_signature_blocks: false,
            max_metadata_size: METADATA_LIMIT,
        }
    }
}

impl VerifierConfig {
    /// Extensions of signature block files, compared case-insensitively.
    ///
    /// If one signature file has multiple block files, the earlier extension wins.
    pub fn with_signature_block_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signature_block_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Accepted digest algorithms, most preferred first
    pub fn with_digest_algorithms<I>(mut self, algorithms: I) -> Self
    where
        I: IntoIterator<Item = DigestAlgorithm>,
    {
        self.digest_algorithms = algorithms.into_iter().collect();
        self
    }

    /// Reject the whole archive if any signature block is malformed, instead of only ignoring
    /// that signer
    pub fn with_strict_signature_blocks(mut self, strict: bool) -> Self {
        self.strict_signature_blocks = strict;
        self
    }

    /// Upper bound for the size of a single `META-INF/` file
    pub fn with_max_metadata_size(mut self, limit: u64) -> Self {
        self.max_metadata_size = limit;
        self
    }

    /// See [`with_signature_block_extensions()`][Self::with_signature_block_extensions]
    pub fn signature_block_extensions(&self) -> &[String] {
        &self.signature_block_extensions
    }

    /// See [`with_digest_algorithms()`][Self::with_digest_algorithms]
    pub fn digest_algorithms(&self) -> &[DigestAlgorithm] {
        &self.digest_algorithms
    }

    /// See [`with_strict_signature_blocks()`][Self::with_strict_signature_blocks]
    pub fn strict_signature_blocks(&self) -> bool {
        self.strict_signature_blocks
    }

    /// See [`with_max_metadata_size()`][Self::with_max_metadata_size]
    pub fn max_metadata_size(&self) -> u64 {
        self.max_metadata_size
    }

    /// Position of `extension` in the list of block extensions
    pub(crate) fn block_extension_rank(&self, extension: &str) -> Option<usize> {
        self.signature_block_extensions
            .iter()
            .position(|known| known.eq_ignore_ascii_case(extension))
    }
}
