//! Key pair generation, derivation chains, and hierarchical wallets.
//!
//! Public keys are a pure function of the secret key: two digest rounds
//! separated by a fixed domain tag, so the same secret always recovers the
//! same public key. Seed, password, and child derivations all reduce to
//! the same digest under their own domain tags.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};
use crate::hash::{self, Hasher};
use crate::util;
use crate::worker;

/// Secret and public key size in bytes.
pub const KEY_SIZE: usize = 64;

/// Minimum accepted seed length in bytes.
pub const MIN_SEED_SIZE: usize = 32;

/// Minimum accepted password salt length in bytes.
pub const MIN_SALT_SIZE: usize = 16;

/// Maximum depth of a hierarchical wallet.
pub const MAX_WALLET_DEPTH: usize = 256;

const PUBLIC_KEY_TAG: &[u8] = b"TOPAY-Z512-PUBLIC-KEY-DERIVATION";
const SEED_TAG: &[u8] = b"TOPAY-Z512-PRIVATE-KEY-SEED";
const CHILD_KEY_TAG: &[u8] = b"TOPAY-Z512-CHILD-KEY";

/// An exclusively owned 64-byte secret key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeySize);
        }
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex form, always 128 characters.
    pub fn to_hex(&self) -> String {
        util::to_hex(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = util::from_hex(s)?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    /// A secret key is valid unless it is all-zero or all-ones. Evaluated
    /// in constant time.
    pub fn is_valid(&self) -> bool {
        valid_key_bytes(&self.0)
    }
}

impl core::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

/// A freely shareable 64-byte public key.
#[derive(Clone, Eq)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeySize);
        }
        let mut out = [0u8; KEY_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Lowercase hex form, always 128 characters.
    pub fn to_hex(&self) -> String {
        util::to_hex(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = util::from_hex(s)?;
        Self::from_slice(&bytes)
    }

    /// Same validity predicate as [`SecretKey::is_valid`].
    pub fn is_valid(&self) -> bool {
        valid_key_bytes(&self.0)
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        util::ct_eq(&self.0, &other.0)
    }
}

impl core::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

/// A matched secret and public key.
#[derive(Debug)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

fn valid_key_bytes(bytes: &[u8; KEY_SIZE]) -> bool {
    let not_zero = !util::ct_eq(bytes, &[0u8; KEY_SIZE]);
    let not_ones = !util::ct_eq(bytes, &[0xffu8; KEY_SIZE]);
    not_zero & not_ones
}

/// Sample a fresh key pair from operating-system randomness.
pub fn generate_key_pair() -> Result<KeyPair> {
    let secret_key = SecretKey(util::secure_random_array::<KEY_SIZE>()?);
    let public_key = derive_public_key(&secret_key);
    Ok(KeyPair {
        secret_key,
        public_key,
    })
}

/// Derive the public key for `secret_key`.
///
/// Round one digests the secret under the public-key domain tag; round two
/// digests that result together with the secret again. Pure and
/// deterministic.
pub fn derive_public_key(secret_key: &SecretKey) -> PublicKey {
    let mut first = Hasher::new();
    first.update(&secret_key.0);
    first.update(PUBLIC_KEY_TAG);
    let round_one = first.finalize();

    let mut second = Hasher::new();
    second.update(round_one.as_bytes());
    second.update(&secret_key.0);
    PublicKey(second.finalize().into_bytes())
}

/// Deterministically derive a key pair from a seed of at least 32 bytes.
pub fn generate_key_pair_from_seed(seed: &[u8]) -> Result<KeyPair> {
    if seed.len() < MIN_SEED_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }
    let digest = hash::hash_concat(seed, SEED_TAG)?;
    let secret_key = SecretKey(digest.into_bytes());
    let public_key = derive_public_key(&secret_key);
    Ok(KeyPair {
        secret_key,
        public_key,
    })
}

/// Derive a secret key from a password and salt by iterated digesting.
///
/// The rolling buffer starts as password ‖ salt and is re-digested
/// `iterations` times (at least once). In the negligible case where the
/// result fails the key validity predicate, the derivation retries with
/// `0x01` appended to the salt; the predicate rejects only the all-zero
/// and all-ones keys, so the retry terminates.
pub fn derive_key_from_password(password: &[u8], salt: &[u8], iterations: u32) -> Result<SecretKey> {
    if password.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    if salt.len() < MIN_SALT_SIZE {
        return Err(CryptoError::InvalidKeySize);
    }

    let mut salted = salt.to_vec();
    loop {
        let mut rolling = [password, salted.as_slice()].concat();
        for _ in 0..iterations.max(1) {
            let digest = hash::compute_hash(&rolling)?;
            rolling.zeroize();
            rolling = digest.into_bytes().to_vec();
        }
        let candidate = SecretKey::from_slice(&rolling)?;
        rolling.zeroize();
        if candidate.is_valid() {
            return Ok(candidate);
        }
        salted.push(0x01);
    }
}

/// Derive the `index`-th child secret key of `parent`.
pub fn derive_child_key(parent: &SecretKey, index: u32) -> SecretKey {
    let mut state = Hasher::new();
    state.update(&parent.0);
    state.update(CHILD_KEY_TAG);
    state.update(&index.to_be_bytes());
    SecretKey(state.finalize().into_bytes())
}

/// Derive a hierarchical wallet of `depth` key pairs from a seed.
///
/// The first pair is the master pair; each following secret key is the
/// child of its predecessor at its own position index.
pub fn generate_hd_wallet(seed: &[u8], depth: usize) -> Result<Vec<KeyPair>> {
    if depth == 0 || depth > MAX_WALLET_DEPTH {
        return Err(CryptoError::InvalidKeySize);
    }
    let mut wallet = Vec::with_capacity(depth);
    wallet.push(generate_key_pair_from_seed(seed)?);
    for index in 1..depth {
        let child_secret = derive_child_key(&wallet[index - 1].secret_key, index as u32);
        let child_public = derive_public_key(&child_secret);
        wallet.push(KeyPair {
            secret_key: child_secret,
            public_key: child_public,
        });
    }
    Ok(wallet)
}

/// Sample `count` key pairs on the worker pool, in output order.
pub fn batch_generate_key_pairs(count: usize) -> Result<Vec<KeyPair>> {
    let inputs = vec![(); count];
    worker::run_batch(worker::global(), inputs, |()| generate_key_pair())
}

/// Derive one key pair per seed on the worker pool, preserving order.
pub fn batch_generate_key_pairs_from_seeds(seeds: &[&[u8]]) -> Result<Vec<KeyPair>> {
    let owned: Vec<Vec<u8>> = seeds.iter().map(|seed| seed.to_vec()).collect();
    worker::run_batch(worker::global(), owned, |seed| {
        generate_key_pair_from_seed(&seed)
    })
}

/// A key pair is intact when both keys are valid and the stored public key
/// equals the derived one under constant-time comparison.
pub fn validate_key_pair_integrity(pair: &KeyPair) -> bool {
    let derived = derive_public_key(&pair.secret_key);
    pair.secret_key.is_valid()
        & pair.public_key.is_valid()
        & util::ct_eq(&derived.0, &pair.public_key.0)
}

/// Recover the public key for a valid secret key.
pub fn recover_public_key(secret_key: &SecretKey) -> Result<PublicKey> {
    if !secret_key.is_valid() {
        return Err(CryptoError::InvalidKeySize);
    }
    Ok(derive_public_key(secret_key))
}

/// Overwrite a secret key with zeros in place.
pub fn secure_erase_secret_key(secret_key: &mut SecretKey) {
    secret_key.0.zeroize();
}

/// Overwrite both halves of a key pair with zeros in place.
pub fn secure_erase_key_pair(pair: &mut KeyPair) {
    pair.secret_key.0.zeroize();
    pair.public_key.0.zeroize();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_derivation_is_deterministic() {
        let pair = generate_key_pair().unwrap();
        let again = derive_public_key(&pair.secret_key);
        assert_eq!(pair.public_key, again);
    }

    #[test]
    fn seed_derivation_is_deterministic_and_bounded() {
        let seed = [7u8; 48];
        let a = generate_key_pair_from_seed(&seed).unwrap();
        let b = generate_key_pair_from_seed(&seed).unwrap();
        assert_eq!(a.secret_key.as_bytes(), b.secret_key.as_bytes());
        assert_eq!(a.public_key, b.public_key);

        assert!(matches!(
            generate_key_pair_from_seed(&[0u8; 31]),
            Err(CryptoError::InvalidKeySize)
        ));
    }

    #[test]
    fn password_derivation_checks_inputs() {
        let salt = [9u8; 16];
        assert!(matches!(
            derive_key_from_password(b"", &salt, 10),
            Err(CryptoError::EmptyData)
        ));
        assert!(matches!(
            derive_key_from_password(b"pw", &salt[..15], 10),
            Err(CryptoError::InvalidKeySize)
        ));

        let a = derive_key_from_password(b"correct horse", &salt, 100).unwrap();
        let b = derive_key_from_password(b"correct horse", &salt, 100).unwrap();
        assert!(util::ct_eq(a.as_bytes(), b.as_bytes()));
        assert!(a.is_valid());

        let other = derive_key_from_password(b"correct horse", &salt, 101).unwrap();
        assert!(!util::ct_eq(a.as_bytes(), other.as_bytes()));
    }

    #[test]
    fn child_keys_differ_by_index() {
        let parent = generate_key_pair().unwrap().secret_key;
        let c1 = derive_child_key(&parent, 1);
        let c2 = derive_child_key(&parent, 2);
        assert!(!util::ct_eq(c1.as_bytes(), c2.as_bytes()));
        assert!(util::ct_eq(
            c1.as_bytes(),
            derive_child_key(&parent, 1).as_bytes()
        ));
    }

    #[test]
    fn wallet_depth_is_bounded() {
        let seed = [3u8; 32];
        assert!(matches!(
            generate_hd_wallet(&seed, 0),
            Err(CryptoError::InvalidKeySize)
        ));
        assert!(matches!(
            generate_hd_wallet(&seed, MAX_WALLET_DEPTH + 1),
            Err(CryptoError::InvalidKeySize)
        ));
        let wallet = generate_hd_wallet(&seed, 4).unwrap();
        assert_eq!(wallet.len(), 4);
        for pair in &wallet {
            assert!(validate_key_pair_integrity(pair));
        }
    }

    #[test]
    fn tampered_pair_fails_integrity() {
        let mut pair = generate_key_pair().unwrap();
        assert!(validate_key_pair_integrity(&pair));
        let mut bytes = *pair.public_key.as_bytes();
        bytes[0] ^= 0x01;
        pair.public_key = PublicKey::from_bytes(bytes);
        assert!(!validate_key_pair_integrity(&pair));
    }

    #[test]
    fn erased_keys_are_zero_and_invalid() {
        let mut pair = generate_key_pair().unwrap();
        secure_erase_key_pair(&mut pair);
        assert_eq!(pair.secret_key.as_bytes(), &[0u8; KEY_SIZE]);
        assert_eq!(pair.public_key.as_bytes(), &[0u8; KEY_SIZE]);
        assert!(!pair.secret_key.is_valid());
        assert!(matches!(
            recover_public_key(&pair.secret_key),
            Err(CryptoError::InvalidKeySize)
        ));
    }

    #[test]
    fn secret_key_hex_round_trips() {
        let pair = generate_key_pair().unwrap();
        let hex = pair.secret_key.to_hex();
        assert_eq!(hex.len(), 2 * KEY_SIZE);
        let back = SecretKey::from_hex(&hex).unwrap();
        assert!(util::ct_eq(back.as_bytes(), pair.secret_key.as_bytes()));
    }
}
