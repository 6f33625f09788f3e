use anyhow::{Result, bail};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::transfer_engine::FileHash;

/// Result of a successful verification
#[derive(Debug)]
pub struct VerifyResult {
    pub files_verified: u64,
    pub bytes_verified: u64,
}

#[derive(Debug)]
struct FileMismatch {
    relative_path: PathBuf,
    reason: MismatchReason,
}

#[derive(Debug)]
enum MismatchReason {
    HashMismatch,
    MissingInDestination,
    Unreadable,
}

/// Re-hash destination files and compare them with the hashes taken during
/// the copy. Only destination files are read.
pub async fn verify_from_hashes(
    job_id: &str,
    destination: &Path,
    file_hashes: &[FileHash],
) -> Result<VerifyResult> {
    let total = file_hashes.len() as u64;

    info!(job_id = %job_id, total_files = total, "Starting hash verification");

    let destination = destination.to_path_buf();
    let file_hashes = file_hashes.to_vec();
    let job_id = job_id.to_string();

    tokio::task::spawn_blocking(move || {
        let mut mismatches: Vec<FileMismatch> = Vec::new();
        let mut bytes_verified: u64 = 0;

        for fh in &file_hashes {
            let dest_path = destination.join(&fh.relative_path);

            if !dest_path.exists() {
                mismatches.push(FileMismatch {
                    relative_path: fh.relative_path.clone(),
                    reason: MismatchReason::MissingInDestination,
                });
                continue;
            }

            match hash_file_sync(&dest_path) {
                Ok(dest_hash) if dest_hash.as_bytes() == &fh.hash => bytes_verified += fh.size,
                Ok(_) => mismatches.push(FileMismatch {
                    relative_path: fh.relative_path.clone(),
                    reason: MismatchReason::HashMismatch,
                }),
                Err(e) => {
                    debug!(file = %fh.relative_path.display(), error = %e, "Failed to hash destination file");
                    mismatches.push(FileMismatch {
                        relative_path: fh.relative_path.clone(),
                        reason: MismatchReason::Unreadable,
                    });
                }
            }
        }

        if !mismatches.is_empty() {
            info!(job_id = %job_id, mismatches = mismatches.len(), "Verification failed");
            bail!(format_mismatch_error(&mismatches));
        }

        info!(job_id = %job_id, files_verified = total, bytes_verified, "Verification complete");

        Ok(VerifyResult {
            files_verified: total,
            bytes_verified,
        })
    })
    .await?
}

fn hash_file_sync(path: &Path) -> Result<blake3::Hash> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::with_capacity(128 * 1024, file);
    let mut hasher = blake3::Hasher::new();

    let mut buffer = vec![0u8; 128 * 1024];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

fn format_mismatch_error(mismatches: &[FileMismatch]) -> String {
    let mut msg = format!(
        "Verification failed: {} file(s) did not match",
        mismatches.len()
    );

    for m in mismatches.iter().take(10) {
        let reason = match &m.reason {
            MismatchReason::HashMismatch => "hash mismatch",
            MismatchReason::MissingInDestination => "missing in destination",
            MismatchReason::Unreadable => "unreadable",
        };
        msg.push_str(&format!("\n  - {}: {}", m.relative_path.display(), reason));
    }

    if mismatches.len() > 10 {
        msg.push_str(&format!("\n  ... and {} more", mismatches.len() - 10));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_hash(relative_path: &str, content: &[u8]) -> FileHash {
        FileHash {
            relative_path: PathBuf::from(relative_path),
            hash: *blake3::hash(content).as_bytes(),
            size: content.len() as u64,
        }
    }

    #[tokio::test]
    async fn test_verify_from_hashes_success() {
        let temp = tempdir().unwrap();
        let dest = temp.path();
        std::fs::create_dir_all(dest.join("subdir")).unwrap();
        std::fs::write(dest.join("file1.txt"), b"hello world").unwrap();
        std::fs::write(dest.join("subdir/nested.txt"), b"nested content").unwrap();

        let hashes = vec![
            make_hash("file1.txt", b"hello world"),
            make_hash("subdir/nested.txt", b"nested content"),
        ];

        let result = verify_from_hashes("test-job", dest, &hashes).await.unwrap();
        assert_eq!(result.files_verified, 2);
        assert_eq!(result.bytes_verified, 11 + 14);
    }

    #[tokio::test]
    async fn test_verify_from_hashes_reports_every_mismatch() {
        let temp = tempdir().unwrap();
        let dest = temp.path();
        std::fs::write(dest.join("a.txt"), b"wrong a").unwrap();

        let hashes = vec![make_hash("a.txt", b"content a"), make_hash("b.txt", b"content b")];

        let err = verify_from_hashes("test-job", dest, &hashes)
            .await
            .unwrap_err()
            .to_string();
        assert!(err.contains("2 file(s) did not match"));
        assert!(err.contains("a.txt: hash mismatch"));
        assert!(err.contains("b.txt: missing in destination"));
    }

    #[tokio::test]
    async fn test_verify_from_hashes_empty() {
        let temp = tempdir().unwrap();
        let result = verify_from_hashes("test-job", temp.path(), &[]).await.unwrap();
        assert_eq!(result.files_verified, 0);
        assert_eq!(result.bytes_verified, 0);
    }
}
