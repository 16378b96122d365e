/// Directory holding the manifest and all signature related files
pub const META_INF: &str = "META-INF/";

/// Exact file name of the manifest inside [`META_INF`]
pub const MANIFEST_FILE_NAME: &str = "MANIFEST.MF";

/// Extension of a signature file, compared case-insensitively
pub(crate) const SIGNATURE_FILE_EXTENSION: &str = "SF";

/// Case-insensitive prefix of the line that names a manifest section
pub(crate) const NAME_ATTRIBUTE: &[u8; 6] = b"Name: ";

pub(crate) const DIGEST_SUFFIX: &str = "-Digest";
pub(crate) const DIGEST_MANIFEST_SUFFIX: &str = "-Digest-Manifest";
pub(crate) const DIGEST_MAIN_ATTRIBUTES_SUFFIX: &str = "-Digest-Manifest-Main-Attributes";

/// Default upper bound for a single file read eagerly from [`META_INF`]
pub(crate) const METADATA_LIMIT: u64 = 16 << 20; // 16 MiB
