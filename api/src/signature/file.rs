use std::collections::BTreeSet;

use super::{
    CertificateChain, MalformedSignatureBlock, MatchedSignature, SignatureBlockParser,
};
use crate::config::VerifierConfig;
use crate::constants::{DIGEST_MAIN_ATTRIBUTES_SUFFIX, DIGEST_MANIFEST_SUFFIX, DIGEST_SUFFIX};
use crate::digest::{decode_digest, DigestAlgorithm};
use crate::manifest::{
    Attributes, DigestMode, DigestTarget, Manifest, ManifestError, SectionDigests,
};

/// An error returned by [`verify_signature_file()`]
#[derive(Debug, thiserror::Error)]
pub enum SignatureFileError {
    /// The signature file could not be parsed
    #[error("malformed signature file {1:?}")]
    Malformed(#[source] ManifestError, String),
    /// The signature block parser rejected the block
    #[error("invalid signature block {1:?}")]
    InvalidSignatureBlock(#[source] MalformedSignatureBlock, String),
    /// The signature block signed something else than the signature file
    #[error("signature block {0:?} does not sign the content of its signature file")]
    ContentMismatch(String),
    /// The signature block did not contain any certificate
    #[error("signature block {0:?} contains no certificates")]
    NoCertificates(String),
}

impl SignatureFileError {
    /// Returns `true` if the signature file itself is broken, as opposed to its signature block
    pub fn is_malformed_signature_file(&self) -> bool {
        matches!(self, Self::Malformed(..))
    }
}

/// The entries one signer vouches for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerEndorsement {
    base_name: String,
    signature_file_name: String,
    certificate_chains: Vec<CertificateChain>,
    endorsed: BTreeSet<String>,
    whole_manifest: bool,
}

impl SignerEndorsement {
    /// Shared base name of the signature file and its block
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Full name of the signature file
    pub fn signature_file_name(&self) -> &str {
        &self.signature_file_name
    }

    /// The certificate chains of the signature block, leaf first
    pub fn certificate_chains(&self) -> &[CertificateChain] {
        &self.certificate_chains
    }

    /// Returns `true` if this signer vouches for the manifest section of `name`
    pub fn endorses(&self, name: &str) -> bool {
        self.endorsed.contains(name)
    }

    /// All endorsed entry names
    pub fn endorsed(&self) -> impl Iterator<Item = &str> + '_ {
        self.endorsed.iter().map(String::as_str)
    }

    /// Returns `true` if the digest of the whole manifest matched
    pub fn whole_manifest(&self) -> bool {
        self.whole_manifest
    }
}

/// Check one signature file and its signature block against the manifest.
///
/// An `Err` means that this signer cannot be used at all. An `Ok` value may still endorse no
/// entry, if none of the digests in the signature file match the manifest.
pub fn verify_signature_file<P>(
    signature: &MatchedSignature,
    manifest_digests: &mut SectionDigests<'_>,
    parser: &P,
    config: &VerifierConfig,
) -> Result<SignerEndorsement, SignatureFileError>
where
    P: ?Sized + SignatureBlockParser,
{
    let signature_file = Manifest::parse(signature.signature_file.as_slice())
        .map_err(|err| SignatureFileError::Malformed(err, signature.signature_file_name.clone()))?;

    let block = parser
        .parse_signature_block(&signature.block_name, &signature.block)
        .map_err(|err| SignatureFileError::InvalidSignatureBlock(err, signature.block_name.clone()))?;
    let content_digest = block
        .signed_content_digest_algorithm
        .digest(&signature.signature_file);
    if content_digest != block.signed_content_digest {
        return Err(SignatureFileError::ContentMismatch(
            signature.block_name.clone(),
        ));
    }
    if block.certificate_chains.iter().all(Vec::is_empty) {
        return Err(SignatureFileError::NoCertificates(
            signature.block_name.clone(),
        ));
    }

    let mut endorsement = SignerEndorsement {
        base_name: signature.base_name.clone(),
        signature_file_name: signature.signature_file_name.clone(),
        certificate_chains: block.certificate_chains,
        endorsed: BTreeSet::new(),
        whole_manifest: false,
    };

    let main = signature_file.main_attributes();
    let expected = expected_digests(main, DIGEST_MAIN_ATTRIBUTES_SUFFIX, config);
    if !expected.is_empty() && !matches_any(manifest_digests, &DigestTarget::Main, &expected) {
        log::warn!(
            "{:?}: digest of the manifest main attributes does not match",
            signature.signature_file_name,
        );
        return Ok(endorsement);
    }

    let expected = expected_digests(main, DIGEST_MANIFEST_SUFFIX, config);
    endorsement.whole_manifest = expected.iter().any(|(algorithm, digest)| {
        manifest_digests.get(&DigestTarget::Manifest, *algorithm, DigestMode::Primary)
            == Some(digest.as_slice())
    });
    log::debug!(
        "{:?}: whole manifest digest matches: {}",
        signature.signature_file_name,
        endorsement.whole_manifest,
    );

    let sections = manifest_digests.sections();
    for name in signature_file.sections().names() {
        if !sections.contains(name) {
            log::debug!(
                "{:?}: entry {name:?} has no manifest section",
                signature.signature_file_name,
            );
            continue;
        }
        if !endorsement.whole_manifest {
            let Some(attributes) = signature_file.attributes(name) else {
                continue;
            };
            let expected = expected_digests(attributes, DIGEST_SUFFIX, config);
            let target = DigestTarget::Entry(name.to_owned());
            if !matches_any(manifest_digests, &target, &expected) {
                log::debug!(
                    "{:?}: digest of the manifest section of {name:?} does not match",
                    signature.signature_file_name,
                );
                continue;
            }
        }
        let _ = endorsement.endorsed.insert(name.to_owned());
    }

    Ok(endorsement)
}

/// Collect `<Algo><suffix>` digests present in `attributes`, in order of preference.
///
/// Values that are not valid base64 are skipped.
pub(crate) fn expected_digests(
    attributes: &Attributes,
    suffix: &str,
    config: &VerifierConfig,
) -> Vec<(DigestAlgorithm, Vec<u8>)> {
    config
        .digest_algorithms()
        .iter()
        .filter_map(|&algorithm| {
            let value = algorithm
                .aliases()
                .iter()
                .find_map(|alias| attributes.get(&format!("{alias}{suffix}")))?;
            let digest = decode_digest(value);
            if digest.is_none() {
                log::debug!("ignoring malformed {algorithm}{suffix} value {value:?}");
            }
            Some((algorithm, digest?))
        })
        .collect()
}

/// Returns `true` if any of the `expected` digests matches `target` in any digest mode.
///
/// The legacy modes are only computed if the primary mode did not match.
fn matches_any(
    digests: &mut SectionDigests<'_>,
    target: &DigestTarget,
    expected: &[(DigestAlgorithm, Vec<u8>)],
) -> bool {
    DigestMode::FALLBACK_ORDER.into_iter().any(|mode| {
        expected.iter().any(|(algorithm, digest)| {
            let matched = digests.get(target, *algorithm, mode) == Some(digest.as_slice());
            log::trace!("{target:?} {algorithm} {mode:?}: {matched}");
            matched
        })
    })
}
