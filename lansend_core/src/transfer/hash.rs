use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::constants::BUFFER_SIZE;

/// Compute the SHA-256 of a file as lower-case hex
pub async fn compute_file_hash(file_path: &Path) -> std::io::Result<String> {
    let mut file = File::open(file_path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compare a peer-supplied digest against a computed one, ignoring case and surrounding space
pub fn hashes_match(expected: &str, computed: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(computed)
}
