//! Size-adaptive fragmentation with per-fragment integrity.
//!
//! A buffer at or above the threshold is split into indexed fragments, each
//! carrying a checksum over its own bytes and a random 32-bit id binding it
//! to one fragmentation event. Reconstruction verifies identity, ordering,
//! and every checksum before concatenating. The wire layout of a single
//! fragment is fixed big-endian: `id | index | total | data_len | data |
//! checksum`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CryptoError, Result};
use crate::hash::{self, Digest, HASH_SIZE};
use crate::pool;
use crate::util;
use crate::worker;

/// Nominal fragment payload size in bytes.
pub const FRAGMENT_SIZE: usize = 256;

/// Buffers below this size take the single-fragment path.
pub const MIN_FRAGMENT_THRESHOLD: usize = 512;

/// Upper bound on the fragment count of one buffer.
pub const MAX_FRAGMENTS: usize = 1024;

/// Serialized header size: four big-endian `u32` fields.
const FRAGMENT_HEADER_SIZE: usize = 16;

const ALGORITHM_TAG: &str = "TOPAY-Z512";

/// An indexed, checksummed slice of a fragmented buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub id: u32,
    pub index: u32,
    pub total: u32,
    pub data: Vec<u8>,
    pub checksum: Digest,
}

/// Description of one fragmentation event.
#[derive(Clone, Debug)]
pub struct FragmentMetadata {
    pub original_size: u64,
    pub fragment_count: u32,
    /// Milliseconds since the Unix epoch; diagnostic only.
    pub timestamp: u64,
    pub algorithm_tag: String,
    /// Checksum over the whole original buffer.
    pub checksum: Digest,
}

/// Ordered fragments plus the metadata describing their origin.
#[derive(Clone, Debug)]
pub struct FragmentationResult {
    pub fragments: Vec<Fragment>,
    pub metadata: FragmentMetadata,
}

/// A verified, reassembled buffer.
#[derive(Clone, Debug)]
pub struct ReconstructionResult {
    pub data: Vec<u8>,
    pub is_complete: bool,
    pub missing_count: u32,
}

/// Whether a buffer of `len` bytes is fragmented at all.
pub fn should_fragment(len: usize) -> bool {
    len >= MIN_FRAGMENT_THRESHOLD
}

/// Number of fragments a buffer of `len` bytes splits into.
pub fn calculate_fragment_count(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    if !should_fragment(len) {
        return 1;
    }
    len.div_ceil(FRAGMENT_SIZE).min(MAX_FRAGMENTS)
}

// Actual slicing geometry. Once the count is capped the payload size grows,
// and re-deriving the count from it drops slots that would hold no bytes.
fn fragment_geometry(len: usize) -> (usize, usize) {
    let count = calculate_fragment_count(len);
    let size = len.div_ceil(count);
    (len.div_ceil(size), size)
}

fn fragment_slice(data: &[u8], index: usize, size: usize) -> &[u8] {
    let start = index * size;
    let end = (start + size).min(data.len());
    &data[start..end]
}

fn new_fragment_id() -> Result<u32> {
    Ok(u32::from_be_bytes(util::secure_random_array::<4>()?))
}

fn build_metadata(data: &[u8], count: usize) -> Result<FragmentMetadata> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64);
    Ok(FragmentMetadata {
        original_size: data.len() as u64,
        fragment_count: count as u32,
        timestamp,
        algorithm_tag: ALGORITHM_TAG.to_string(),
        checksum: hash::compute_hash(data)?,
    })
}

/// Split `data` into checksummed fragments, sequentially and in index
/// order.
pub fn fragment_data(data: &[u8]) -> Result<FragmentationResult> {
    if data.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    let (count, size) = fragment_geometry(data.len());
    let id = new_fragment_id()?;
    let metadata = build_metadata(data, count)?;

    let mut fragments = Vec::with_capacity(count);
    for index in 0..count {
        let chunk = fragment_slice(data, index, size);
        fragments.push(Fragment {
            id,
            index: index as u32,
            total: count as u32,
            data: chunk.to_vec(),
            checksum: hash::compute_hash(chunk)?,
        });
    }
    Ok(FragmentationResult {
        fragments,
        metadata,
    })
}

/// [`fragment_data`] with per-fragment work fanned out on the worker pool.
/// The output is in index order regardless of completion order.
pub fn parallel_fragment_data(data: &[u8]) -> Result<FragmentationResult> {
    if data.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    let (count, size) = fragment_geometry(data.len());
    let id = new_fragment_id()?;
    let metadata = build_metadata(data, count)?;

    let shared: Arc<Vec<u8>> = Arc::new(data.to_vec());
    let indices: Vec<usize> = (0..count).collect();
    let fragments = worker::run_batch(worker::global(), indices, move |index| {
        let chunk = fragment_slice(&shared, index, size);
        Ok(Fragment {
            id,
            index: index as u32,
            total: count as u32,
            data: chunk.to_vec(),
            checksum: hash::compute_hash(chunk)?,
        })
    })?;
    Ok(FragmentationResult {
        fragments,
        metadata,
    })
}

fn check_fragment_set(fragments: &[Fragment]) -> Result<(u32, u32)> {
    if fragments.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    let expected_id = fragments[0].id;
    let expected_total = fragments[0].total;
    if fragments.len() != expected_total as usize {
        return Err(CryptoError::InvalidFragmentCount);
    }
    Ok((expected_id, expected_total))
}

fn verify_fragment(
    fragment: &Fragment,
    position: u32,
    expected_id: u32,
    expected_total: u32,
) -> Result<()> {
    let identity = fragment.id == expected_id
        && fragment.index == position
        && fragment.total == expected_total;
    if !identity || fragment.data.is_empty() {
        return Err(CryptoError::ReconstructionFailed);
    }
    let recomputed = hash::compute_hash(&fragment.data)?;
    if !util::ct_eq(recomputed.as_bytes(), fragment.checksum.as_bytes()) {
        return Err(CryptoError::ReconstructionFailed);
    }
    Ok(())
}

/// Reassemble a buffer from its fragments.
///
/// Fragments may arrive in any order; they are sorted by index and every
/// one is verified against the set's identity and its own checksum before
/// the payloads are concatenated.
pub fn reconstruct_data(fragments: &[Fragment]) -> Result<ReconstructionResult> {
    let (expected_id, expected_total) = check_fragment_set(fragments)?;

    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|fragment| fragment.index);

    let mut data = Vec::with_capacity(ordered.iter().map(|f| f.data.len()).sum());
    for (position, fragment) in ordered.iter().enumerate() {
        verify_fragment(fragment, position as u32, expected_id, expected_total)?;
        data.extend_from_slice(&fragment.data);
    }
    Ok(ReconstructionResult {
        data,
        is_complete: true,
        missing_count: 0,
    })
}

/// [`reconstruct_data`] with checksum verification fanned out on the
/// worker pool.
pub fn parallel_reconstruct_data(fragments: &[Fragment]) -> Result<ReconstructionResult> {
    let (expected_id, expected_total) = check_fragment_set(fragments)?;

    let mut ordered: Vec<&Fragment> = fragments.iter().collect();
    ordered.sort_by_key(|fragment| fragment.index);

    let jobs: Vec<(u32, Fragment)> = ordered
        .iter()
        .enumerate()
        .map(|(position, fragment)| (position as u32, (*fragment).clone()))
        .collect();
    worker::run_batch(worker::global(), jobs, move |(position, fragment)| {
        verify_fragment(&fragment, position, expected_id, expected_total)
    })?;

    let mut data = Vec::with_capacity(ordered.iter().map(|f| f.data.len()).sum());
    for fragment in &ordered {
        data.extend_from_slice(&fragment.data);
    }
    Ok(ReconstructionResult {
        data,
        is_complete: true,
        missing_count: 0,
    })
}

/// A fragment is intact when its index is in range, its payload is
/// non-empty, and its checksum matches the payload.
pub fn validate_fragment_integrity(fragment: &Fragment) -> bool {
    if fragment.index >= fragment.total || fragment.data.is_empty() {
        return false;
    }
    match hash::compute_hash(&fragment.data) {
        Ok(recomputed) => util::ct_eq(recomputed.as_bytes(), fragment.checksum.as_bytes()),
        Err(_) => false,
    }
}

/// Rebuild fragment `fragment.index` from the authoritative original
/// buffer, recomputing its checksum.
pub fn repair_fragment(
    fragment: &Fragment,
    original_data: &[u8],
    fragment_size: usize,
) -> Result<Fragment> {
    if fragment_size == 0 {
        return Err(CryptoError::InvalidFragmentCount);
    }
    let start = fragment.index as usize * fragment_size;
    if start >= original_data.len() {
        return Err(CryptoError::InvalidFragmentCount);
    }
    let chunk = fragment_slice(original_data, fragment.index as usize, fragment_size);
    Ok(Fragment {
        id: fragment.id,
        index: fragment.index,
        total: fragment.total,
        data: chunk.to_vec(),
        checksum: hash::compute_hash(chunk)?,
    })
}

/// Encode a fragment in the fixed big-endian wire layout.
pub fn serialize_fragment(fragment: &Fragment) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(FRAGMENT_HEADER_SIZE + fragment.data.len() + HASH_SIZE);
    out.extend_from_slice(&fragment.id.to_be_bytes());
    out.extend_from_slice(&fragment.index.to_be_bytes());
    out.extend_from_slice(&fragment.total.to_be_bytes());
    out.extend_from_slice(&(fragment.data.len() as u32).to_be_bytes());
    out.extend_from_slice(&fragment.data);
    out.extend_from_slice(fragment.checksum.as_bytes());
    out
}

fn read_be_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_be_bytes(word)
}

/// Decode a fragment from the wire layout, rejecting truncated buffers.
pub fn deserialize_fragment(bytes: &[u8]) -> Result<Fragment> {
    if bytes.len() < FRAGMENT_HEADER_SIZE + HASH_SIZE {
        return Err(CryptoError::InvalidFragmentCount);
    }
    let id = read_be_u32(bytes, 0);
    let index = read_be_u32(bytes, 4);
    let total = read_be_u32(bytes, 8);
    let data_len = read_be_u32(bytes, 12) as usize;
    if bytes.len() != FRAGMENT_HEADER_SIZE + data_len + HASH_SIZE {
        return Err(CryptoError::InvalidFragmentCount);
    }
    let data = bytes[FRAGMENT_HEADER_SIZE..FRAGMENT_HEADER_SIZE + data_len].to_vec();
    let checksum = Digest::from_slice(&bytes[FRAGMENT_HEADER_SIZE + data_len..])?;
    Ok(Fragment {
        id,
        index,
        total,
        data,
        checksum,
    })
}

/// Digest a buffer through its fragment geometry.
///
/// Below the fragmentation threshold this equals [`hash::compute_hash`].
/// At or above it, each fragment's payload is hashed on the worker pool
/// and the fragment digests are folded, in index order, through a fresh
/// digest state. The result is a distinct combiner, not the plain digest
/// of `data`.
pub fn fragmented_hash(data: &[u8]) -> Result<Digest> {
    if data.is_empty() {
        return Err(CryptoError::EmptyData);
    }
    if !should_fragment(data.len()) {
        return hash::compute_hash(data);
    }
    let (count, size) = fragment_geometry(data.len());
    let chunks: Vec<&[u8]> = (0..count)
        .map(|index| fragment_slice(data, index, size))
        .collect();
    let digests = hash::batch_hash(&chunks)?;

    let mut state = pool::hasher_pool().acquire();
    for digest in &digests {
        state.update(digest.as_bytes());
    }
    let combined = state.finalize_reset();
    pool::hasher_pool().release(state);
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_follows_the_size_policy() {
        assert_eq!(calculate_fragment_count(0), 0);
        assert_eq!(calculate_fragment_count(1), 1);
        assert_eq!(calculate_fragment_count(511), 1);
        assert_eq!(calculate_fragment_count(512), 2);
        assert_eq!(calculate_fragment_count(4096), 16);
        assert_eq!(calculate_fragment_count(MAX_FRAGMENTS * FRAGMENT_SIZE * 2), MAX_FRAGMENTS);
    }

    #[test]
    fn oversized_buffers_never_produce_empty_fragments() {
        // Just above the cap boundary, naive ceil slicing would leave
        // trailing slots with no bytes.
        let len = MAX_FRAGMENTS * FRAGMENT_SIZE + 1;
        let data = vec![0x5au8; len];
        let result = fragment_data(&data).unwrap();
        assert!(result.fragments.len() <= MAX_FRAGMENTS);
        assert!(result.fragments.iter().all(|f| !f.data.is_empty()));
        let reconstructed = reconstruct_data(&result.fragments).unwrap();
        assert_eq!(reconstructed.data, data);
    }

    #[test]
    fn below_threshold_is_a_single_fragment() {
        let data = vec![1u8; MIN_FRAGMENT_THRESHOLD - 1];
        let result = fragment_data(&data).unwrap();
        assert_eq!(result.fragments.len(), 1);
        assert_eq!(result.fragments[0].data, data);
        assert_eq!(result.metadata.fragment_count, 1);
    }

    #[test]
    fn metadata_describes_the_original_buffer() {
        let data = vec![7u8; 2048];
        let result = fragment_data(&data).unwrap();
        assert_eq!(result.metadata.original_size, 2048);
        assert_eq!(result.metadata.algorithm_tag, ALGORITHM_TAG);
        assert_eq!(
            result.metadata.checksum,
            hash::compute_hash(&data).unwrap()
        );
    }

    #[test]
    fn wire_round_trip_is_identity() {
        let data = vec![0xabu8; 700];
        let result = fragment_data(&data).unwrap();
        for fragment in &result.fragments {
            let encoded = serialize_fragment(fragment);
            let decoded = deserialize_fragment(&encoded).unwrap();
            assert_eq!(&decoded, fragment);
            assert_eq!(serialize_fragment(&decoded), encoded);
        }
    }

    #[test]
    fn truncated_wire_buffers_are_rejected() {
        let data = vec![0x11u8; 600];
        let result = fragment_data(&data).unwrap();
        let encoded = serialize_fragment(&result.fragments[0]);

        assert!(matches!(
            deserialize_fragment(&encoded[..FRAGMENT_HEADER_SIZE + HASH_SIZE - 1]),
            Err(CryptoError::InvalidFragmentCount)
        ));
        assert!(matches!(
            deserialize_fragment(&encoded[..encoded.len() - 1]),
            Err(CryptoError::InvalidFragmentCount)
        ));
    }

    #[test]
    fn repair_restores_a_corrupted_fragment() {
        let data: Vec<u8> = (0..2048u32).map(|i| (i % 256) as u8).collect();
        let result = fragment_data(&data).unwrap();
        let size = result.fragments[0].data.len();

        let mut broken = result.fragments[2].clone();
        broken.data[0] ^= 0xff;
        assert!(!validate_fragment_integrity(&broken));

        let repaired = repair_fragment(&broken, &data, size).unwrap();
        assert!(validate_fragment_integrity(&repaired));
        assert_eq!(&repaired, &result.fragments[2]);

        let mut out_of_range = broken.clone();
        out_of_range.index = 10_000;
        assert!(matches!(
            repair_fragment(&out_of_range, &data, size),
            Err(CryptoError::InvalidFragmentCount)
        ));
    }

    #[test]
    fn fragmented_hash_is_a_distinct_combiner() {
        let small = vec![2u8; 100];
        assert_eq!(
            fragmented_hash(&small).unwrap(),
            hash::compute_hash(&small).unwrap()
        );

        let large = vec![3u8; 4096];
        let combined = fragmented_hash(&large).unwrap();
        assert_ne!(combined, hash::compute_hash(&large).unwrap());
        assert_eq!(combined, fragmented_hash(&large).unwrap());
    }
}
