use std::path::Path;

use animeflix_model::ContentHash;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::Result;

const READ_CHUNK: usize = 64 * 1024;

/// SHA-256 of an in-memory payload.
pub fn sha256_bytes(bytes: &[u8]) -> ContentHash {
    ContentHash::from_digest(Sha256::digest(bytes).into())
}

/// Streams a file through SHA-256 and returns the digest with the byte count.
pub async fn sha256_file(path: &Path) -> Result<(ContentHash, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut total: u64 = 0;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((ContentHash::from_digest(hasher.finalize().into()), total))
}

/// Short, filesystem-safe digest of an arbitrary key, used in cache file names.
pub fn key_digest(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..8])
}
