// 32-bit key hash for H(...) containers (LevelDB's Murmur-like Hash).

pub const SEED: u32 = 0xbc9f1d34;

pub fn hash(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0xc6a4a793;
    const R: u32 = 24;
    let mut h = seed ^ (data.len() as u32).wrapping_mul(M);

    let mut chunks = data.chunks_exact(4);
    for w in &mut chunks {
        h = h.wrapping_add(u32::from_le_bytes([w[0], w[1], w[2], w[3]]));
        h = h.wrapping_mul(M);
        h ^= h >> 16;
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        if rest.len() == 3 {
            h = h.wrapping_add(u32::from(rest[2]) << 16);
        }
        if rest.len() >= 2 {
            h = h.wrapping_add(u32::from(rest[1]) << 8);
        }
        h = h.wrapping_add(u32::from(rest[0]));
        h = h.wrapping_mul(M);
        h ^= h >> R;
    }
    h
}

/// Power-of-two bucket count for `entries` keys (at least one bucket).
pub fn bucket_count(entries: usize) -> u64 {
    (entries.max(1) as u64).next_power_of_two()
}

pub fn bucket_of(key: &[u8], buckets: u64) -> u64 {
    u64::from(hash(key, SEED)) & (buckets - 1)
}
