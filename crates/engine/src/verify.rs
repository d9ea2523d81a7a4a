//! Integrity Verifier (§4.6): validates each merged file against its
//! expected byte length, and optionally computes a content hash when a
//! caller asks for one. There is no canonical digest for these artifacts,
//! so hashing is diagnostic only — never compared to an authority here.

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

use crate::error::EngineError;

const READ_BUF_SIZE: usize = 64 * 1024;

/// `verifyLength(path, expected) -> ok|mismatch{actual}` (§4.6). Mandatory
/// after every merge.
pub async fn verify_length(
    path: &std::path::Path,
    expected: u64,
) -> Result<(), EngineError> {
    let metadata = tokio::fs::metadata(path).await?;
    let actual = metadata.len();

    if actual == expected {
        Ok(())
    } else {
        Err(EngineError::IntegrityMismatch { expected, actual })
    }
}

/// `computeHash(path) -> 256-bit digest` (§4.6). Streams the file through a
/// buffered reader rather than loading it whole into memory — these
/// artifacts are multi-gigabyte.
pub async fn compute_hash(path: &std::path::Path) -> Result<String, EngineError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_BUF_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn verify_length_ok_when_sizes_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();

        assert!(verify_length(&path, 100).await.is_ok());
    }

    #[tokio::test]
    async fn verify_length_reports_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        tokio::fs::write(&path, vec![0u8; 99]).await.unwrap();

        let err = verify_length(&path, 100).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::IntegrityMismatch {
                expected: 100,
                actual: 99
            }
        ));
    }

    #[tokio::test]
    async fn compute_hash_is_deterministic_and_streams_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.bin");
        let mut file = tokio::fs::File::create(&path).await.unwrap();
        // exercise more than one read buffer's worth of data
        file.write_all(&vec![0xABu8; READ_BUF_SIZE * 3 + 17])
            .await
            .unwrap();
        file.flush().await.unwrap();

        let hash1 = compute_hash(&path).await.unwrap();
        let hash2 = compute_hash(&path).await.unwrap();
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }
}
