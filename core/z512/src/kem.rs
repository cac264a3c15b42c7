//! Key encapsulation with an authenticated ciphertext.
//!
//! The construction is a hash-based KEM: the sender masks a fresh 32-byte
//! ephemeral value with a key stream derived from the recipient's public
//! key, appends an integrity tag over the masked half, and both sides
//! derive the shared secret from the ephemeral value and the public key
//! under a fixed domain tag. Tampering with any ciphertext byte is caught
//! by the tag before any secret material is produced.

use sha3::{Digest as _, Sha3_256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};
use crate::util;
use crate::worker;

/// KEM public and secret key size in bytes.
pub const KEM_KEY_SIZE: usize = 64;

/// Ciphertext size in bytes: a 32-byte masked ephemeral plus a 32-byte tag.
pub const CIPHERTEXT_SIZE: usize = 64;

/// Shared secret size in bytes.
pub const SHARED_SECRET_SIZE: usize = 64;

const EPHEMERAL_SIZE: usize = 32;

const PUBLIC_KEY_TAG: &[u8] = b"TOPAY-Z512-KEM-PUBLIC-KEY";
const PUBLIC_KEY_ROUND2_TAG: &[u8] = b"KEM-DERIVATION-ROUND-2";
const SHARED_SECRET_TAG: &[u8] = b"TOPAY-Z512-KEM-SHARED-SECRET";
const ENCRYPTION_KEY_TAG: &[u8] = b"TOPAY-Z512-KEM-ENCRYPTION-KEY";
const CONTEXT_SECRET_TAG: &[u8] = b"TOPAY-Z512-KEM-CONTEXT-SECRET";

/// A freely shareable KEM public key.
#[derive(Clone, Eq)]
pub struct KemPublicKey([u8; KEM_KEY_SIZE]);

/// An exclusively owned KEM secret key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct KemSecretKey([u8; KEM_KEY_SIZE]);

/// An encapsulation addressed to one public key. Opaque to its holder.
#[derive(Clone, Eq)]
pub struct Ciphertext([u8; CIPHERTEXT_SIZE]);

/// Key material shared between encapsulator and decapsulator. Zeroized on
/// drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; SHARED_SECRET_SIZE]);

/// A matched KEM key pair.
#[derive(Debug)]
pub struct KemKeyPair {
    pub secret_key: KemSecretKey,
    pub public_key: KemPublicKey,
}

macro_rules! byte_newtype {
    ($name:ident, $len:expr, $err:expr) => {
        impl $name {
            pub fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                if bytes.len() != $len {
                    return Err($err);
                }
                let mut out = [0u8; $len];
                out.copy_from_slice(bytes);
                Ok(Self(out))
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Lowercase hex form, two characters per byte.
            pub fn to_hex(&self) -> String {
                util::to_hex(&self.0)
            }

            pub fn from_hex(s: &str) -> Result<Self> {
                let bytes = util::from_hex(s)?;
                Self::from_slice(&bytes)
            }

            /// Valid unless all-zero, evaluated in constant time.
            pub fn is_valid(&self) -> bool {
                !util::ct_eq(&self.0, &[0u8; $len])
            }
        }
    };
}

byte_newtype!(KemPublicKey, KEM_KEY_SIZE, CryptoError::InvalidKeySize);
byte_newtype!(KemSecretKey, KEM_KEY_SIZE, CryptoError::InvalidKeySize);
byte_newtype!(Ciphertext, CIPHERTEXT_SIZE, CryptoError::InvalidCiphertextSize);
byte_newtype!(SharedSecret, SHARED_SECRET_SIZE, CryptoError::InvalidKeySize);

impl PartialEq for KemPublicKey {
    fn eq(&self, other: &Self) -> bool {
        util::ct_eq(&self.0, &other.0)
    }
}

impl PartialEq for Ciphertext {
    fn eq(&self, other: &Self) -> bool {
        util::ct_eq(&self.0, &other.0)
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        util::ct_eq(&self.0, &other.0)
    }
}

impl core::fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "KemPublicKey({})", self.to_hex())
    }
}

impl core::fmt::Debug for KemSecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("KemSecretKey(..)")
    }
}

impl core::fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Ciphertext({})", self.to_hex())
    }
}

impl core::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SharedSecret(..)")
    }
}

fn h32(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derive the KEM public key for `secret_key`: two SHA3-256 rounds under
/// the KEM domain tags, zero-extended into the upper half of the slot.
pub fn derive_public_key(secret_key: &KemSecretKey) -> KemPublicKey {
    let mut round_one = h32(&[&secret_key.0, PUBLIC_KEY_TAG]);
    let round_two = h32(&[&round_one, PUBLIC_KEY_ROUND2_TAG]);
    round_one.zeroize();

    let mut out = [0u8; KEM_KEY_SIZE];
    out[..32].copy_from_slice(&round_two);
    KemPublicKey(out)
}

/// Sample a fresh KEM key pair.
pub fn keygen() -> Result<KemKeyPair> {
    let secret_key = KemSecretKey(util::secure_random_array::<KEM_KEY_SIZE>()?);
    let public_key = derive_public_key(&secret_key);
    Ok(KemKeyPair {
        secret_key,
        public_key,
    })
}

fn encapsulate_inner(
    public_key: &KemPublicKey,
    secret_tag: &[u8],
    context: Option<&[u8]>,
) -> Result<(Ciphertext, SharedSecret)> {
    let mut ephemeral = util::secure_random_array::<EPHEMERAL_SIZE>()?;

    let shared = derive_shared(&ephemeral, public_key, secret_tag, context);

    let mut key_stream = h32(&[&public_key.0, ENCRYPTION_KEY_TAG]);
    let mut ct = [0u8; CIPHERTEXT_SIZE];
    util::xor_into(&mut ct[..EPHEMERAL_SIZE], &ephemeral, &key_stream);
    let tag = h32(&[&ct[..EPHEMERAL_SIZE], &public_key.0]);
    ct[EPHEMERAL_SIZE..].copy_from_slice(&tag);

    ephemeral.zeroize();
    key_stream.zeroize();
    Ok((Ciphertext(ct), shared))
}

fn decapsulate_inner(
    secret_key: &KemSecretKey,
    ciphertext: &Ciphertext,
    secret_tag: &[u8],
    context: Option<&[u8]>,
) -> Result<SharedSecret> {
    let public_key = derive_public_key(secret_key);

    let mut key_stream = h32(&[&public_key.0, ENCRYPTION_KEY_TAG]);
    let mut ephemeral = [0u8; EPHEMERAL_SIZE];
    util::xor_into(
        &mut ephemeral,
        &ciphertext.0[..EPHEMERAL_SIZE],
        &key_stream,
    );
    key_stream.zeroize();

    let tag = h32(&[&ciphertext.0[..EPHEMERAL_SIZE], &public_key.0]);
    if !util::ct_eq(&tag, &ciphertext.0[EPHEMERAL_SIZE..]) {
        ephemeral.zeroize();
        return Err(CryptoError::DecapsulationFailed);
    }

    let shared = derive_shared(&ephemeral, &public_key, secret_tag, context);
    ephemeral.zeroize();
    Ok(shared)
}

fn derive_shared(
    ephemeral: &[u8; EPHEMERAL_SIZE],
    public_key: &KemPublicKey,
    secret_tag: &[u8],
    context: Option<&[u8]>,
) -> SharedSecret {
    let digest = match context {
        None => h32(&[ephemeral, &public_key.0, secret_tag]),
        Some(ctx) => h32(&[ephemeral, &public_key.0, ctx, secret_tag]),
    };
    let mut out = [0u8; SHARED_SECRET_SIZE];
    out[..32].copy_from_slice(&digest);
    SharedSecret(out)
}

/// Derive a shared secret addressed to `public_key`, returning the
/// ciphertext to transmit and the sender's copy of the secret.
pub fn encapsulate(public_key: &KemPublicKey) -> Result<(Ciphertext, SharedSecret)> {
    encapsulate_inner(public_key, SHARED_SECRET_TAG, None)
}

/// Recover the shared secret from a ciphertext addressed to `secret_key`.
///
/// The integrity tag is checked in constant time before any secret is
/// derived; a tampered ciphertext yields `DecapsulationFailed` and no
/// secret material.
pub fn decapsulate(secret_key: &KemSecretKey, ciphertext: &Ciphertext) -> Result<SharedSecret> {
    decapsulate_inner(secret_key, ciphertext, SHARED_SECRET_TAG, None)
}

/// [`encapsulate`] with the shared secret bound to an application context.
///
/// The ciphertext format is unchanged; only the shared-secret domain
/// differs, so decapsulating without the matching context yields an
/// unrelated secret.
pub fn encapsulate_with_context(
    public_key: &KemPublicKey,
    context: &[u8],
) -> Result<(Ciphertext, SharedSecret)> {
    encapsulate_inner(public_key, CONTEXT_SECRET_TAG, Some(context))
}

/// Inverse of [`encapsulate_with_context`] under the same context.
pub fn decapsulate_with_context(
    secret_key: &KemSecretKey,
    ciphertext: &Ciphertext,
    context: &[u8],
) -> Result<SharedSecret> {
    decapsulate_inner(secret_key, ciphertext, CONTEXT_SECRET_TAG, Some(context))
}

/// Sample `count` KEM key pairs on the worker pool, in output order.
pub fn batch_keygen(count: usize) -> Result<Vec<KemKeyPair>> {
    let inputs = vec![(); count];
    worker::run_batch(worker::global(), inputs, |()| keygen())
}

/// Encapsulate to every public key on the worker pool, preserving order.
/// The first failure aborts the batch.
pub fn batch_encapsulate(public_keys: &[KemPublicKey]) -> Result<Vec<(Ciphertext, SharedSecret)>> {
    let owned: Vec<KemPublicKey> = public_keys.to_vec();
    worker::run_batch(worker::global(), owned, |pk| encapsulate(&pk))
}

/// Decapsulate each ciphertext with its matching secret key on the worker
/// pool, preserving order. The key and ciphertext lists must have equal
/// length; the first failure aborts the batch.
pub fn batch_decapsulate(
    secret_keys: Vec<KemSecretKey>,
    ciphertexts: Vec<Ciphertext>,
) -> Result<Vec<SharedSecret>> {
    if secret_keys.len() != ciphertexts.len() {
        return Err(CryptoError::InvalidCiphertextSize);
    }
    let pairs: Vec<(KemSecretKey, Ciphertext)> =
        secret_keys.into_iter().zip(ciphertexts).collect();
    worker::run_batch(worker::global(), pairs, |(sk, ct)| decapsulate(&sk, &ct))
}

/// A KEM key pair is intact when both keys are valid and the stored public
/// key equals the derived one under constant-time comparison.
pub fn verify_key_pair(public_key: &KemPublicKey, secret_key: &KemSecretKey) -> bool {
    let derived = derive_public_key(secret_key);
    secret_key.is_valid() & public_key.is_valid() & util::ct_eq(&derived.0, &public_key.0)
}
