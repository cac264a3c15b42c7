//! Byte-level primitives: secure randomness, constant-time comparison,
//! zeroization, vectorized byte operations, and the hex codec.

use rand::rngs::OsRng;
use rand_core::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};

/// Fill a freshly allocated buffer with operating-system randomness.
pub fn secure_random(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|_| CryptoError::Random)?;
    Ok(buf)
}

/// Fixed-size variant of [`secure_random`].
pub fn secure_random_array<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|_| CryptoError::Random)?;
    Ok(buf)
}

/// Constant-time equality over byte slices.
///
/// Differences are folded into a single accumulator, eight bytes per lane
/// with a byte-wise tail, and the accumulator is tested against zero once
/// at the end. The running time depends only on the input length.
///
/// Every comparison of secret-bearing bytes in this crate routes through
/// this function.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u64;
    let lanes = a.len() - a.len() % 8;
    for (xa, xb) in a[..lanes].chunks_exact(8).zip(b[..lanes].chunks_exact(8)) {
        let mut la = [0u8; 8];
        let mut lb = [0u8; 8];
        la.copy_from_slice(xa);
        lb.copy_from_slice(xb);
        acc |= u64::from_ne_bytes(la) ^ u64::from_ne_bytes(lb);
    }
    for (xa, xb) in a[lanes..].iter().zip(b[lanes..].iter()) {
        acc |= u64::from(xa ^ xb);
    }
    acc.ct_eq(&0).into()
}

/// Overwrite a buffer with zeros in a way the compiler cannot elide.
pub fn secure_zero(data: &mut [u8]) {
    data.zeroize();
}

/// `out[i] = a[i] ^ b[i]` over equal-length buffers, eight bytes per lane.
pub fn xor_into(out: &mut [u8], a: &[u8], b: &[u8]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(out.len(), a.len());
    let lanes = a.len() - a.len() % 8;
    for ((o, xa), xb) in out[..lanes]
        .chunks_exact_mut(8)
        .zip(a[..lanes].chunks_exact(8))
        .zip(b[..lanes].chunks_exact(8))
    {
        let mut la = [0u8; 8];
        let mut lb = [0u8; 8];
        la.copy_from_slice(xa);
        lb.copy_from_slice(xb);
        o.copy_from_slice(&(u64::from_ne_bytes(la) ^ u64::from_ne_bytes(lb)).to_ne_bytes());
    }
    for ((o, xa), xb) in out[lanes..].iter_mut().zip(&a[lanes..]).zip(&b[lanes..]) {
        *o = xa ^ xb;
    }
}

/// `out[i] = a[i] & b[i]` over equal-length buffers.
pub fn and_into(out: &mut [u8], a: &[u8], b: &[u8]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(out.len(), a.len());
    for ((o, xa), xb) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *o = xa & xb;
    }
}

/// `out[i] = a[i] | b[i]` over equal-length buffers.
pub fn or_into(out: &mut [u8], a: &[u8], b: &[u8]) {
    assert_eq!(a.len(), b.len());
    assert_eq!(out.len(), a.len());
    for ((o, xa), xb) in out.iter_mut().zip(a.iter()).zip(b.iter()) {
        *o = xa | xb;
    }
}

/// Copy `src` into `dst`. Both buffers must have the same length.
pub fn fast_copy(dst: &mut [u8], src: &[u8]) {
    dst.copy_from_slice(src);
}

/// Set every byte of `buf` to `value`.
pub fn fast_fill(buf: &mut [u8], value: u8) {
    buf.fill(value);
}

/// Lowercase hex encoding, two characters per byte, no separators.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode a hex string produced by [`to_hex`]. Upper- and lowercase input
/// are both accepted.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|_| CryptoError::InvalidHex)
}
