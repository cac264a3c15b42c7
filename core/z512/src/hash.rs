//! 512-bit chaining digest.
//!
//! The digest is a chaining wrapper over SHA-512: the input is absorbed in
//! 128-byte blocks, each block is hashed with SHA-512, and the 64-byte
//! result is XOR-folded into eight chaining words seeded with the SHA-512
//! initialization vector. Finalization applies the usual `0x80` marker and
//! a 128-bit big-endian bit-length trailer. The output is NOT plain
//! SHA-512 of the input and is not interchangeable with it.

use sha2::{Digest as _, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, Result};
use crate::pool;
use crate::util;
use crate::worker;

/// Digest output size in bytes.
pub const HASH_SIZE: usize = 64;

/// Internal block size of the absorb phase, in bytes.
pub const BLOCK_SIZE: usize = 128;

/// Number of rounds applied by [`secure_hash`].
const SECURE_HASH_ROUNDS: usize = 4;

// SHA-512 initialization vector, used to seed the chaining words.
const IV: [u64; 8] = [
    0x6a09_e667_f3bc_c908,
    0xbb67_ae85_84ca_a73b,
    0x3c6e_f372_fe94_f82b,
    0xa54f_f53a_5f1d_36f1,
    0x510e_527f_ade6_82d1,
    0x9b05_688c_2b3e_6c1f,
    0x1f83_d9ab_fb41_bd6b,
    0x5be0_cd19_137e_2179,
];

/// A 512-bit digest value.
#[derive(Clone, Eq)]
pub struct Digest([u8; HASH_SIZE]);

impl Digest {
    /// Wrap an existing 64-byte value.
    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build a digest from a slice, rejecting any length other than 64.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HASH_SIZE {
            return Err(CryptoError::InvalidHashSize);
        }
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Borrow the digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    /// Consume the digest, returning its bytes.
    pub fn into_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    /// Lowercase hex form, always 128 characters.
    pub fn to_hex(&self) -> String {
        util::to_hex(&self.0)
    }

    /// Parse a 128-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = util::from_hex(s)?;
        Self::from_slice(&bytes)
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        util::ct_eq(&self.0, &other.0)
    }
}

impl core::fmt::Debug for Digest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn compress(state: &mut [u64; 8], block: &[u8]) {
    let folded: [u8; HASH_SIZE] = Sha512::digest(block).into();
    for (word, chunk) in state.iter_mut().zip(folded.chunks_exact(8)) {
        let mut lane = [0u8; 8];
        lane.copy_from_slice(chunk);
        *word ^= u64::from_be_bytes(lane);
    }
}

/// Streaming digest state.
///
/// The state starts at a fixed IV, absorbs input through [`update`], and is
/// consumed by [`finalize`]. [`reset`] returns a used state to its initial
/// value; the internal buffer is zeroized on reset and on drop.
///
/// [`update`]: Hasher::update
/// [`finalize`]: Hasher::finalize
/// [`reset`]: Hasher::reset
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Hasher {
    state: [u64; 8],
    buffer: [u8; BLOCK_SIZE],
    buffered: usize,
    length: u64,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a state at the initial IV.
    pub fn new() -> Self {
        Self {
            state: IV,
            buffer: [0u8; BLOCK_SIZE],
            buffered: 0,
            length: 0,
        }
    }

    /// Absorb `data` into the state.
    pub fn update(&mut self, mut data: &[u8]) {
        self.length = self.length.wrapping_add(data.len() as u64);

        if self.buffered > 0 {
            let take = (BLOCK_SIZE - self.buffered).min(data.len());
            self.buffer[self.buffered..self.buffered + take].copy_from_slice(&data[..take]);
            self.buffered += take;
            data = &data[take..];
            if self.buffered == BLOCK_SIZE {
                let block = self.buffer;
                compress(&mut self.state, &block);
                self.buffered = 0;
            }
        }

        while data.len() >= BLOCK_SIZE {
            let (block, rest) = data.split_at(BLOCK_SIZE);
            compress(&mut self.state, block);
            data = rest;
        }

        if !data.is_empty() {
            self.buffer[..data.len()].copy_from_slice(data);
            self.buffered = data.len();
        }
    }

    /// Consume the state and emit the digest.
    pub fn finalize(mut self) -> Digest {
        let mut out = [0u8; HASH_SIZE];
        self.finalize_into(&mut out);
        Digest(out)
    }

    /// Return the state to its initial value, clearing the block buffer.
    pub fn reset(&mut self) {
        self.state = IV;
        self.buffer.zeroize();
        self.buffered = 0;
        self.length = 0;
    }

    /// Finalize in place and reset, so the state can be reused.
    pub(crate) fn finalize_reset(&mut self) -> Digest {
        let mut out = [0u8; HASH_SIZE];
        self.finalize_into(&mut out);
        self.reset();
        Digest(out)
    }

    fn finalize_into(&mut self, out: &mut [u8; HASH_SIZE]) {
        let bit_length = self.length.wrapping_mul(8);

        self.buffer[self.buffered] = 0x80;
        self.buffered += 1;
        if self.buffered > BLOCK_SIZE - 16 {
            self.buffer[self.buffered..].fill(0);
            let block = self.buffer;
            compress(&mut self.state, &block);
            self.buffered = 0;
        }
        self.buffer[self.buffered..BLOCK_SIZE - 8].fill(0);
        self.buffer[BLOCK_SIZE - 8..].copy_from_slice(&bit_length.to_be_bytes());
        let block = self.buffer;
        compress(&mut self.state, &block);

        for (chunk, word) in out.chunks_exact_mut(8).zip(self.state.iter()) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
    }
}

/// Absorb a sequence of byte slices with a pooled state and finalize.
pub(crate) fn hash_parts(parts: &[&[u8]]) -> Digest {
    let mut state = pool::hasher_pool().acquire();
    for part in parts {
        state.update(part);
    }
    let digest = state.finalize_reset();
    pool::hasher_pool().release(state);
    digest
}

/// One-shot digest of a non-empty buffer.
pub fn compute_hash(data: &[u8]) -> Result<Digest> {
    if data.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    Ok(hash_parts(&[data]))
}

/// Digest of `data` with `salt` absorbed first.
pub fn hash_with_salt(data: &[u8], salt: &[u8]) -> Result<Digest> {
    if data.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    Ok(hash_parts(&[salt, data]))
}

/// Digest of the concatenation of `chunks`, absorbed in order.
///
/// Fails with `EmptyData` when the list is empty or holds zero bytes in
/// total; interior empty chunks are absorbed as no-ops.
pub fn hash_multiple(chunks: &[&[u8]]) -> Result<Digest> {
    if chunks.is_empty() || chunks.iter().all(|c| c.is_empty()) {
        return Err(CryptoError::EmptyData);
    }
    Ok(hash_parts(chunks))
}

/// Digest of `a` followed by `b`.
pub fn hash_concat(a: &[u8], b: &[u8]) -> Result<Digest> {
    hash_multiple(&[a, b])
}

/// Hash chain `[h0, h1, .., hn]` with `h0 = H(data)` and `h(i+1) = H(hi)`.
pub fn hash_chain(data: &[u8], links: usize) -> Result<Vec<Digest>> {
    let mut chain = Vec::with_capacity(links + 1);
    chain.push(compute_hash(data)?);
    for i in 0..links {
        let next = hash_parts(&[chain[i].as_bytes()]);
        chain.push(next);
    }
    Ok(chain)
}

/// Recompute a chain produced by [`hash_chain`] and compare each link in
/// constant time. Mismatch position is not observable through timing.
pub fn verify_hash_chain(chain: &[Digest], data: &[u8]) -> Result<bool> {
    if chain.is_empty() {
        return Ok(false);
    }
    let mut ok = true;
    let mut expected = compute_hash(data)?;
    ok &= util::ct_eq(expected.as_bytes(), chain[0].as_bytes());
    for link in &chain[1..] {
        expected = hash_parts(&[expected.as_bytes()]);
        ok &= util::ct_eq(expected.as_bytes(), link.as_bytes());
    }
    Ok(ok)
}

/// Four chained rounds of the digest. Deterministic; no added entropy.
pub fn secure_hash(data: &[u8]) -> Result<Digest> {
    let mut digest = compute_hash(data)?;
    for _ in 1..SECURE_HASH_ROUNDS {
        digest = hash_parts(&[digest.as_bytes()]);
    }
    Ok(digest)
}

/// Bottom-up merkle root over `leaves`. An odd node at any level is paired
/// with itself.
pub fn merkle_root(leaves: &[&[u8]]) -> Result<Digest> {
    if leaves.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    let mut level = leaves
        .iter()
        .map(|leaf| compute_hash(leaf))
        .collect::<Result<Vec<_>>>()?;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_parts(&[pair[0].as_bytes(), right.as_bytes()]));
        }
        level = next;
    }
    Ok(level.swap_remove(0))
}

/// Digest every input on the worker pool, preserving input order.
///
/// An empty input list yields an empty output; any empty element fails the
/// whole batch with `EmptyData`.
pub fn batch_hash(inputs: &[&[u8]]) -> Result<Vec<Digest>> {
    let owned: Vec<Vec<u8>> = inputs
        .iter()
        .map(|input| {
            let mut buf = pool::byte_pool().acquire(input.len());
            buf.copy_from_slice(input);
            buf
        })
        .collect();
    worker::run_batch(worker::global(), owned, |data| {
        let digest = compute_hash(&data);
        pool::byte_pool().release(data);
        digest
    })
}

/// Fast non-chaining 512-bit digest backed by BLAKE3.
///
/// Distinct domain from [`compute_hash`]; the two never agree on the same
/// input.
pub fn fast_hash(data: &[u8]) -> Result<Digest> {
    if data.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    let mut out = [0u8; HASH_SIZE];
    let mut hasher = blake3::Hasher::new();
    hasher.update(data);
    hasher.finalize_xof().fill(&mut out);
    Ok(Digest(out))
}
