#![cfg_attr(docsrs, feature(doc_cfg))]
#![forbid(unsafe_code)]
#![allow(unknown_lints)]
#![warn(absolute_paths_not_starting_with_crate)]
#![warn(elided_lifetimes_in_paths)]
#![warn(explicit_outlives_requirements)]
#![warn(meta_variable_misuse)]
#![warn(missing_copy_implementations)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![warn(non_ascii_idents)]
#![warn(noop_method_call)]
#![warn(rust_2018_idioms)]
#![warn(single_use_lifetimes)]
#![warn(trivial_casts)]
#![warn(unreachable_pub)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_lifetimes)]
#![warn(unused_results)]
#![allow(clippy::enum_variant_names)]
#![doc = include_str!("../README.md")]

mod config;
mod constants;
pub mod digest;
#[cfg(feature = "zip")]
pub mod jar;
pub mod manifest;
pub mod signature;
pub mod verify;

pub use self::config::VerifierConfig;
pub use self::constants::{MANIFEST_FILE_NAME, META_INF};
pub use self::digest::DigestAlgorithm;
#[cfg(feature = "zip")]
pub use self::jar::{JarEntryReader, JarFile, OpenJarError};
pub use self::manifest::{Attributes, Manifest};
pub use self::signature::{Certificate, CertificateChain, SignatureBlock, SignatureBlockParser};
pub use self::verify::{JarVerifier, VerifierEntry, VerifyingReader};

/// A collection of all errors this library can return
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub enum JarVerifyError {
    /// An error returned by [`Manifest::parse()`]
    Manifest(#[from] self::manifest::ManifestError),
    /// An error returned by [`verify_signature_file()`][self::signature::verify_signature_file]
    SignatureFile(#[from] self::signature::SignatureFileError),
    /// An error returned by a [`SignatureBlockParser`]
    SignatureBlock(#[from] self::signature::MalformedSignatureBlock),
    /// An error returned by [`JarVerifier::new()`]
    JarVerifier(#[from] self::verify::JarVerifierError),
    /// An error returned by [`VerifierEntry::verify()`]
    Entry(#[from] self::verify::EntryVerifyError),
    /// An error returned by [`JarFile::new()`]
    #[cfg(feature = "zip")]
    #[cfg_attr(docsrs, doc(cfg(feature = "zip")))]
    OpenJar(#[from] self::jar::OpenJarError),
    /// An I/O occurred
    Io(#[from] std::io::Error),
}

macro_rules! Error {
    (
        $(#[$meta:meta])+
        $vis:vis struct $outer:ident($inner:ident) { $(
            $(#[$field_meta:meta])+
            $field:ident $(( $(
                $(#[$ty_meta:meta])*
                $field_type:ty
            ),+ $(,)? ))?
        ),+ $(,)? }
    ) => {
        $(#[$meta])+
        $vis struct $outer($inner);

        #[derive(Debug, thiserror::Error)]
        enum $inner { $(
            $(#[$field_meta])+
            $field $(( $(
                $(#[$ty_meta])* $field_type,
            )+ ))?,
        )+ }

        const _: () = {
            impl std::fmt::Debug for $outer {
                #[inline]
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    std::fmt::Debug::fmt(&self.0, f)
                }
            }

            impl std::fmt::Display for $outer {
                #[inline]
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    std::fmt::Display::fmt(&self.0, f)
                }
            }

            impl From<$inner> for $outer {
                #[inline]
                fn from(value: $inner) -> Self {
                    Self(value)
                }
            }

            impl std::error::Error for $outer {
                #[inline]
                fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                    self.0.source()
                }
            }
        };
    };
}

pub(crate) use Error;
