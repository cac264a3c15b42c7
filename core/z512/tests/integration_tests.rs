//! End-to-end flows combining the key, KEM, digest, and fragmentation
//! subsystems the way an application would.

use topay_z512::fragment::{
    deserialize_fragment, fragment_data, parallel_reconstruct_data, serialize_fragment,
};
use topay_z512::hash::{compute_hash, hash_with_salt};
use topay_z512::kem::{decapsulate_with_context, encapsulate_with_context, keygen};
use topay_z512::keypair::{generate_hd_wallet, recover_public_key, validate_key_pair_integrity};
use topay_z512::util::{ct_eq, secure_random};

#[test]
fn test_payload_transfer_flow() {
    // Sender and receiver agree on a session secret bound to a context.
    let receiver = keygen().expect("key generation should succeed");
    let (session_ct, sender_secret) =
        encapsulate_with_context(&receiver.public_key, b"transfer/v1")
            .expect("encapsulation should succeed");

    // The payload travels as serialized fragments.
    let payload = secure_random(16 * 1024).expect("randomness should be available");
    let fragmented = fragment_data(&payload).expect("fragmentation should succeed");
    let wire: Vec<Vec<u8>> = fragmented
        .fragments
        .iter()
        .map(serialize_fragment)
        .collect();

    // Receiver side: recover the session secret, decode and verify the
    // fragments, and reassemble the payload.
    let receiver_secret = decapsulate_with_context(&receiver.secret_key, &session_ct, b"transfer/v1")
        .expect("decapsulation should succeed");
    assert!(ct_eq(sender_secret.as_bytes(), receiver_secret.as_bytes()));

    let decoded: Vec<_> = wire
        .iter()
        .map(|bytes| deserialize_fragment(bytes).expect("decoding should succeed"))
        .collect();
    let reassembled =
        parallel_reconstruct_data(&decoded).expect("reconstruction should succeed");
    assert_eq!(reassembled.data, payload);
    assert_eq!(
        compute_hash(&reassembled.data).expect("hashing should succeed"),
        fragmented.metadata.checksum
    );

    // Both ends can now key a MAC-like digest from the shared secret.
    let sender_tag =
        hash_with_salt(&payload, sender_secret.as_bytes()).expect("hashing should succeed");
    let receiver_tag = hash_with_salt(&reassembled.data, receiver_secret.as_bytes())
        .expect("hashing should succeed");
    assert_eq!(sender_tag, receiver_tag);
}

#[test]
fn test_wallet_backed_identities() {
    let seed = secure_random(64).expect("randomness should be available");
    let wallet = generate_hd_wallet(&seed, 8).expect("wallet should derive");

    for pair in &wallet {
        assert!(validate_key_pair_integrity(pair));
        let recovered = recover_public_key(&pair.secret_key).expect("recovery should succeed");
        assert_eq!(recovered, pair.public_key);
    }

    // Losing the wallet is recoverable from the seed alone.
    let restored = generate_hd_wallet(&seed, 8).expect("wallet should derive");
    for (lost, found) in wallet.iter().zip(&restored) {
        assert!(ct_eq(
            lost.secret_key.as_bytes(),
            found.secret_key.as_bytes()
        ));
    }
}
