use std::time::Instant;

use topay_z512::hash::compute_hash;
use topay_z512::kem::{encapsulate, keygen};
use topay_z512::keypair::{generate_key_pair, secure_erase_key_pair, KEY_SIZE};
use topay_z512::util::{ct_eq, secure_zero};

#[test]
fn test_constant_time_equality_semantics() {
    let a = vec![0x42u8; 64];
    let b = vec![0x42u8; 64];
    let mut c = b.clone();
    c[63] ^= 0x01;

    assert!(ct_eq(&a, &b));
    assert!(!ct_eq(&a, &c));
    assert!(!ct_eq(&a, &a[..32])); // Different lengths
}

#[test]
fn test_comparison_timing_is_position_independent() {
    // The mismatch position must not shift the running time: compare a
    // first-byte difference against a last-byte difference over many
    // rounds and require the means to stay within a loose band.
    const ROUNDS: usize = 200_000;
    let baseline = vec![0u8; 64];
    let mut early = baseline.clone();
    early[0] = 1;
    let mut late = baseline.clone();
    late[63] = 1;

    let measure = |other: &[u8]| {
        let start = Instant::now();
        let mut acc = false;
        for _ in 0..ROUNDS {
            acc |= ct_eq(std::hint::black_box(&baseline), std::hint::black_box(other));
        }
        assert!(!acc);
        start.elapsed().as_nanos() as f64
    };

    // Warm up caches before timing.
    measure(&early);
    let t_early = measure(&early);
    let t_late = measure(&late);

    let ratio = t_early.max(t_late) / t_early.min(t_late);
    assert!(
        ratio < 5.0,
        "timing ratio {ratio} suggests a position-dependent comparison"
    );
}

#[test]
fn test_secret_material_erasure() {
    let mut pair = generate_key_pair().expect("key generation should succeed");
    secure_erase_key_pair(&mut pair);
    assert_eq!(pair.secret_key.as_bytes(), &[0u8; KEY_SIZE]);
    assert_eq!(pair.public_key.as_bytes(), &[0u8; KEY_SIZE]);

    let mut buffer = vec![0x5au8; 512];
    secure_zero(&mut buffer);
    assert!(buffer.iter().all(|&b| b == 0));
}

#[test]
fn test_debug_output_never_prints_secrets() {
    let pair = generate_key_pair().expect("key generation should succeed");
    let printed = format!("{:?}", pair.secret_key);
    assert!(!printed.contains(&pair.secret_key.to_hex()));

    let kem_pair = keygen().expect("key generation should succeed");
    let (_, shared) = encapsulate(&kem_pair.public_key).expect("encapsulation should succeed");
    let printed = format!("{:?}", kem_pair.secret_key);
    assert!(!printed.contains(&kem_pair.secret_key.to_hex()));
    let printed = format!("{shared:?}");
    assert!(!printed.contains(&shared.to_hex()));
}

#[test]
fn test_shared_secret_equality_is_constant_time_backed() {
    let pair = keygen().expect("key generation should succeed");
    let (_, a) = encapsulate(&pair.public_key).expect("encapsulation should succeed");
    let (_, b) = encapsulate(&pair.public_key).expect("encapsulation should succeed");
    // Fresh sessions disagree; the comparison itself routes through the
    // constant-time primitive.
    assert!(a == a && !(a == b));
}

#[test]
fn test_digest_comparison_routes_through_ct_eq() {
    let x = compute_hash(b"left").expect("hashing should succeed");
    let y = compute_hash(b"right").expect("hashing should succeed");
    assert_ne!(x, y);
    assert!(ct_eq(x.as_bytes(), x.clone().as_bytes()));
}
