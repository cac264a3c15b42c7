//! Error kinds shared across the TOPAY-Z512 primitives.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, CryptoError>;

/// Errors returned by the TOPAY-Z512 operations.
///
/// The library is silent on success; failures carry exactly one of these
/// kinds and no further detail. `DecapsulationFailed` deliberately covers
/// every KEM failure with a single message.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// A key, seed, or salt input has the wrong length.
    #[error("invalid key size")]
    InvalidKeySize,

    /// A digest input has the wrong length.
    #[error("invalid hash size")]
    InvalidHashSize,

    /// A ciphertext input is not exactly 64 bytes.
    #[error("invalid ciphertext size")]
    InvalidCiphertextSize,

    /// A hex string has odd length or a non-hex character.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// A non-empty buffer is required.
    #[error("empty input data")]
    EmptyData,

    /// KEM decapsulation failed.
    #[error("decapsulation failed")]
    DecapsulationFailed,

    /// Fragment identity, ordering, or checksum mismatch.
    #[error("fragment reconstruction failed")]
    ReconstructionFailed,

    /// Fragment list length disagrees with its metadata, an index is out
    /// of range, or a serialized fragment buffer is truncated.
    #[error("invalid fragment count")]
    InvalidFragmentCount,

    /// The operating system randomness source is unavailable.
    #[error("system randomness unavailable")]
    Random,
}
