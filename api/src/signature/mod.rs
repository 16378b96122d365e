//! Signature files, signature blocks and the certificates they carry

mod file;
mod matcher;

pub(crate) use self::file::expected_digests;
pub use self::file::{verify_signature_file, SignatureFileError, SignerEndorsement};
pub use self::matcher::{match_signature_files, MatchedSignature, MetaInfFiles};
use crate::digest::DigestAlgorithm;

/// A certificate as reported by the signature block parser.
///
/// Only the names needed to group certificates into chains are interpreted, the encoded form
/// is passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Certificate {
    subject: String,
    issuer: String,
    encoded: Vec<u8>,
}

impl Certificate {
    /// Create a certificate record from its distinguished names and its encoded form
    pub fn new(subject: impl Into<String>, issuer: impl Into<String>, encoded: Vec<u8>) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            encoded,
        }
    }

    /// Distinguished name of the subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Distinguished name of the issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The encoded certificate, usually DER
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }
}

/// A certificate chain, leaf first
pub type CertificateChain = Vec<Certificate>;

/// What a PKCS#7 signature block signed, and by whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    /// The algorithm the signed content (the `.SF` file) was digested with
    pub signed_content_digest_algorithm: DigestAlgorithm,
    /// The digest of the signed content, as covered by the signature
    pub signed_content_digest: Vec<u8>,
    /// One chain per signer info, in the order of the block
    pub certificate_chains: Vec<CertificateChain>,
}

/// The signature block could not be parsed
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed signature block: {0}")]
pub struct MalformedSignatureBlock(pub String);

/// Parses the signature block files (`.RSA`, `.DSA`, `.EC`) of a JAR.
///
/// Implementations check the cryptographic signature of the block, but do not validate the
/// certificates against any trust root.
pub trait SignatureBlockParser {
    /// Parse the signature block `block_name` with the content `block`
    fn parse_signature_block(
        &self,
        block_name: &str,
        block: &[u8],
    ) -> Result<SignatureBlock, MalformedSignatureBlock>;
}

impl<F> SignatureBlockParser for F
where
    F: Fn(&str, &[u8]) -> Result<SignatureBlock, MalformedSignatureBlock>,
{
    #[inline]
    fn parse_signature_block(
        &self,
        block_name: &str,
        block: &[u8],
    ) -> Result<SignatureBlock, MalformedSignatureBlock> {
        self(block_name, block)
    }
}

/// Group a flat, ordered list of certificates into chains.
///
/// A certificate continues the current chain iff its subject is the issuer of the certificate
/// before it.
pub fn split_chains<'a, I>(certificates: I) -> Vec<CertificateChain>
where
    I: IntoIterator<Item = &'a Certificate>,
{
    let mut chains = Vec::new();
    let mut current: CertificateChain = Vec::new();
    for certificate in certificates {
        if let Some(prev) = current.last() {
            if prev.issuer != certificate.subject {
                chains.push(std::mem::take(&mut current));
            }
        }
        current.push(certificate.clone());
    }
    if !current.is_empty() {
        chains.push(current);
    }
    chains
}
