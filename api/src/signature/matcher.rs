use std::collections::BTreeMap;

use crate::config::VerifierConfig;
use crate::constants::{MANIFEST_FILE_NAME, META_INF, SIGNATURE_FILE_EXTENSION};

/// A signature file together with the signature block that signs it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedSignature {
    /// Shared file name of both files, without directory and extension
    pub base_name: String,
    /// Full name of the signature file, e.g. `META-INF/CERT.SF`
    pub signature_file_name: String,
    /// Content of the signature file
    pub signature_file: Vec<u8>,
    /// Full name of the signature block, e.g. `META-INF/CERT.RSA`
    pub block_name: String,
    /// Content of the signature block
    pub block: Vec<u8>,
}

/// The files in `META-INF/` that take part in verification
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaInfFiles {
    /// Content of `META-INF/MANIFEST.MF`, if present
    pub manifest: Option<Vec<u8>>,
    /// All matched signature files, sorted by base name
    pub signatures: Vec<MatchedSignature>,
}

#[derive(Default)]
struct Candidate {
    signature_file: Option<(String, Vec<u8>)>,
    block: Option<(usize, String, Vec<u8>)>,
}

/// Pair every `.SF` file directly inside `META-INF/` with its signature block.
///
/// Signature files without a block file, and block files without a signature file, are
/// ignored. Files outside of `META-INF/` or in subdirectories of it are never considered.
pub fn match_signature_files<I>(files: I, config: &VerifierConfig) -> MetaInfFiles
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut manifest = None;
    let mut candidates = BTreeMap::<String, Candidate>::new();
    for (name, content) in files {
        let Some(file_name) = name.strip_prefix(META_INF) else {
            continue;
        };
        if file_name.contains('/') {
            continue;
        }
        if file_name == MANIFEST_FILE_NAME {
            manifest = Some(content);
            continue;
        }

        let Some((base_name, extension)) = file_name.rsplit_once('.') else {
            continue;
        };
        if base_name.is_empty() {
            continue;
        }
        if extension.eq_ignore_ascii_case(SIGNATURE_FILE_EXTENSION) {
            let candidate = candidates.entry(base_name.to_owned()).or_default();
            candidate.signature_file = Some((name, content));
        } else if let Some(rank) = config.block_extension_rank(extension) {
            let candidate = candidates.entry(base_name.to_owned()).or_default();
            let replace = match &candidate.block {
                Some((existing, ..)) => rank < *existing,
                None => true,
            };
            if replace {
                candidate.block = Some((rank, name, content));
            }
        }
    }

    let signatures = candidates
        .into_iter()
        .filter_map(|(base_name, candidate)| match candidate {
            Candidate {
                signature_file: Some((signature_file_name, signature_file)),
                block: Some((_, block_name, block)),
            } => Some(MatchedSignature {
                base_name,
                signature_file_name,
                signature_file,
                block_name,
                block,
            }),
            Candidate {
                signature_file: Some((signature_file_name, _)),
                block: None,
            } => {
                log::debug!("signature file {signature_file_name:?} has no signature block");
                None
            },
            _ => None,
        })
        .collect();

    MetaInfFiles {
        manifest,
        signatures,
    }
}
