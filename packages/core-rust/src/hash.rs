//! FNV-1a hashing for partition-key routing.
//!
//! The bus assigns a record to a partition from the hash of its key, so the
//! hash must be stable across processes and restarts. `std`'s `DefaultHasher`
//! is randomly seeded per process and cannot be used here.

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;

/// Computes a 32-bit FNV-1a hash over the UTF-8 bytes of `s`.
///
/// # Examples
///
/// ```
/// use inferq_core::hash::fnv1a_hash;
///
/// assert_eq!(fnv1a_hash(""), 2_166_136_261); // FNV offset basis
/// assert_eq!(fnv1a_hash("a"), 0xe40c_292c);
/// ```
#[must_use]
pub fn fnv1a_hash(s: &str) -> u32 {
    fnv1a_hash_bytes(s.as_bytes())
}

/// Computes a 32-bit FNV-1a hash over raw bytes.
#[must_use]
pub fn fnv1a_hash_bytes(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
