mod native_copy;

pub use native_copy::NativeCopyEngine;

use anyhow::Result;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// A request to copy the contents of `source` into `destination`.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub job_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// BLAKE3 hash of a copied file, relative to the transfer root.
#[derive(Debug, Clone)]
pub struct FileHash {
    pub relative_path: PathBuf,
    pub hash: [u8; 32],
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct TransferResult {
    pub files_copied: u64,
    pub total_bytes: u64,
    pub duration_secs: u64,
    pub file_hashes: Vec<FileHash>,
}

/// Recursive directory copy.
///
/// Implementations must create `destination` if needed, overwrite files that
/// already exist there, and never fail because a file or directory is already
/// present.
pub trait TransferEngine: Send + Sync {
    fn transfer(
        &self,
        req: &TransferRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult>> + Send>>;
}
