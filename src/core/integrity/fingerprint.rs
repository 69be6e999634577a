use std::path::Path;

use crate::core::error::{LauncherError, LauncherResult};

const SEED: u32 = 1;
const M: u32 = 0x5bd1_e995;
const R: u32 = 24;

/// Whitespace-normalised MurmurHash2, the identity mirrored mod hosts use for
/// files. Tab, LF, CR and space are dropped before hashing, so a file that only
/// differs in those bytes keeps the same fingerprint.
pub fn fingerprint_bytes(bytes: &[u8]) -> u64 {
    let normalized: Vec<u8> = bytes
        .iter()
        .copied()
        .filter(|b| !matches!(b, 9 | 10 | 13 | 32))
        .collect();
    murmur2(&normalized, SEED) as u64
}

pub async fn fingerprint_file(path: &Path) -> LauncherResult<u64> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| LauncherError::io(path, e))?;
    Ok(tokio::task::spawn_blocking(move || fingerprint_bytes(&bytes)).await?)
}

fn murmur2(data: &[u8], seed: u32) -> u32 {
    let mut h = seed ^ data.len() as u32;

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= (tail[2] as u32) << 16;
    }
    if tail.len() >= 2 {
        h ^= (tail[1] as u32) << 8;
    }
    if !tail.is_empty() {
        h ^= tail[0] as u32;
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;
    h
}
