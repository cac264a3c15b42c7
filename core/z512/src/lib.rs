#![deny(unsafe_code)]
#![allow(missing_docs)]

//! TOPAY-Z512 cryptographic primitives.
//!
//! This crate implements the following primitives:
//! - 512-bit chaining digest with a streaming absorb/finalize state machine
//! - Key pairs with deterministic, batch, and hierarchical derivation
//! - Hash-based key encapsulation with an authenticated ciphertext
//! - Authenticated fragmentation of large buffers for parallel processing
//!
//! All fixed-size values (keys, digests, ciphertexts, shared secrets) are
//! 64 bytes. Secret-bearing types are zeroized on drop and compared in
//! constant time; batch operations fan out over a process-wide worker
//! pool and preserve input order.
//!
//! # Example
//!
//! ```
//! use topay_z512::{kem, util};
//!
//! # fn main() -> topay_z512::Result<()> {
//! let pair = kem::keygen()?;
//! let (ciphertext, sender_secret) = kem::encapsulate(&pair.public_key)?;
//! let receiver_secret = kem::decapsulate(&pair.secret_key, &ciphertext)?;
//! assert!(util::ct_eq(sender_secret.as_bytes(), receiver_secret.as_bytes()));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod features;
pub mod fragment;
pub mod hash;
pub mod kem;
pub mod keypair;
pub mod pool;
pub mod util;
pub mod worker;

pub use error::{CryptoError, Result};
pub use fragment::{Fragment, FragmentMetadata, FragmentationResult, ReconstructionResult};
pub use hash::{Digest, Hasher};
pub use kem::{Ciphertext, KemKeyPair, KemPublicKey, KemSecretKey, SharedSecret};
pub use keypair::{KeyPair, PublicKey, SecretKey};

/// Secret and public key size in bytes.
pub const KEY_SIZE: usize = 64;

/// Digest output size in bytes.
pub const HASH_SIZE: usize = 64;

/// KEM ciphertext size in bytes.
pub const CIPHERTEXT_SIZE: usize = 64;

/// KEM shared secret size in bytes.
pub const SHARED_SECRET_SIZE: usize = 64;
