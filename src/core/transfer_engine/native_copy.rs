use crate::core::transfer_engine::{FileHash, TransferEngine, TransferRequest, TransferResult};
use crate::logging::ProgressThrottle;
use anyhow::{Context, Result, anyhow, bail};
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// Minimum time between per-file progress log lines
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_millis(500);

/// Native file copy transfer engine.
///
/// - Pre-scan so progress can be reported against a known total
/// - Large buffered I/O
/// - Existing destination files are truncated and rewritten
/// - BLAKE3 hash of every file computed while copying
/// - Metadata preservation (permissions, timestamps)
/// - Per-file fsync for durability
pub struct NativeCopyEngine {
    /// Whether to fsync each file after writing (safer but slower)
    pub sync_files: bool,
}

impl Default for NativeCopyEngine {
    fn default() -> Self {
        Self { sync_files: true }
    }
}

impl TransferEngine for NativeCopyEngine {
    fn transfer(
        &self,
        req: &TransferRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransferResult>> + Send>> {
        let req = req.clone();
        let sync_files = self.sync_files;

        Box::pin(async move {
            let span = info_span!(
                "native_copy",
                job_id = %req.job_id,
                source = %req.source.display(),
                destination = %req.destination.display()
            );

            async move {
                let start_time = Instant::now();

                tokio::fs::create_dir_all(&req.destination)
                    .await
                    .with_context(|| {
                        format!(
                            "Failed to create destination directory {}",
                            req.destination.display()
                        )
                    })?;

                let scan = scan_directory(&req.source)
                    .await
                    .context("Failed to scan source directory")?;

                info!(
                    total_files = scan.files.len(),
                    total_bytes = scan.total_bytes,
                    total_dirs = scan.directories.len(),
                    "Scan complete"
                );

                create_directory_structure(&req.source, &req.destination, &scan.directories)
                    .await
                    .context("Failed to create directory structure")?;

                let file_hashes = copy_files(
                    &req.source,
                    &req.destination,
                    &scan.files,
                    scan.total_bytes,
                    sync_files,
                )
                .await?;

                let total_bytes: u64 = file_hashes.iter().map(|h| h.size).sum();
                let duration_secs = start_time.elapsed().as_secs();

                info!(
                    files = file_hashes.len(),
                    total_bytes,
                    duration_secs,
                    "Native copy complete"
                );

                Ok(TransferResult {
                    files_copied: file_hashes.len() as u64,
                    total_bytes,
                    duration_secs,
                    file_hashes,
                })
            }
            .instrument(span)
            .await
        })
    }
}

/// Result of scanning a directory
struct ScanResult {
    files: Vec<FileInfo>,
    /// Directories in creation order (parents before children)
    directories: Vec<PathBuf>,
    total_bytes: u64,
}

#[derive(Clone)]
struct FileInfo {
    path: PathBuf,
    size: u64,
}

/// Scan a directory recursively, collecting files and directories.
async fn scan_directory(source: &Path) -> Result<ScanResult> {
    let source = source.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut scan = ScanResult {
            files: Vec::new(),
            directories: Vec::new(),
            total_bytes: 0,
        };

        scan_directory_recursive(&source, &mut scan)?;
        Ok(scan)
    })
    .await?
}

fn scan_directory_recursive(current: &Path, scan: &mut ScanResult) -> Result<()> {
    let entries = fs::read_dir(current)
        .map_err(|e| describe_io_error(e, &format!("read directory {}", current.display())))?;

    for entry in entries {
        let entry = entry.map_err(|e| describe_io_error(e, "read directory entry"))?;
        let path = entry.path();

        // Use symlink_metadata to avoid following symlinks
        let metadata = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                if is_device_removed_error(&e) {
                    bail!("Device appears to have been removed: {}", e);
                }
                warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if metadata.is_dir() {
            scan.directories.push(path.clone());
            scan_directory_recursive(&path, scan)?;
        } else if metadata.is_file() {
            scan.total_bytes += metadata.len();
            scan.files.push(FileInfo {
                path,
                size: metadata.len(),
            });
        }
        // Skip symlinks and other special files
    }

    Ok(())
}

/// Create all directories in the destination, preserving permissions.
/// Directories that already exist are reused.
async fn create_directory_structure(
    source: &Path,
    destination: &Path,
    directories: &[PathBuf],
) -> Result<()> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let directories = directories.to_vec();

    tokio::task::spawn_blocking(move || {
        for dir_path in &directories {
            let dest_dir = destination.join(relative_to(&source, dir_path)?);

            fs::create_dir_all(&dest_dir)
                .map_err(|e| describe_io_error(e, &format!("create {}", dest_dir.display())))?;

            if let Ok(metadata) = fs::metadata(dir_path) {
                if let Err(e) = fs::set_permissions(&dest_dir, metadata.permissions()) {
                    debug!(path = %dest_dir.display(), error = %e, "Failed to set directory permissions");
                }
            }
        }
        Ok(())
    })
    .await?
}

/// Copy all files, returning a hash for each one.
async fn copy_files(
    source: &Path,
    destination: &Path,
    files: &[FileInfo],
    total_bytes: u64,
    sync_files: bool,
) -> Result<Vec<FileHash>> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let files = files.to_vec();

    tokio::task::spawn_blocking(move || {
        let mut throttle = ProgressThrottle::new(PROGRESS_LOG_INTERVAL);
        let mut hashes = Vec::with_capacity(files.len());
        let mut bytes_copied: u64 = 0;
        let mut errors: Vec<CopyError> = Vec::new();

        for file_info in &files {
            let relative = relative_to(&source, &file_info.path)?;
            let dest_path = destination.join(&relative);
            let current_file = relative.to_string_lossy().to_string();

            match copy_single_file(&file_info.path, &dest_path, sync_files) {
                Ok((size, hash)) => {
                    bytes_copied += size;
                    hashes.push(FileHash {
                        relative_path: relative,
                        hash,
                        size,
                    });

                    if let Some(held_back) = throttle.tick() {
                        debug!(
                            file = %current_file,
                            size = file_info.size,
                            bytes_copied,
                            total_bytes,
                            held_back,
                            "Copy progress"
                        );
                    }
                }
                Err(e) => {
                    if e.is_device_removed {
                        return Err(anyhow!(
                            "Device removed during transfer at file: {}",
                            current_file
                        ));
                    }

                    error!(file = %current_file, error = %e.message, "Failed to copy file");
                    errors.push(CopyError {
                        file: current_file,
                        message: e.message,
                    });
                }
            }
        }

        if !errors.is_empty() {
            let mut summary = format!(
                "Transfer completed with {} error(s):\n{}",
                errors.len(),
                errors
                    .iter()
                    .take(10)
                    .map(|e| format!("  - {}: {}", e.file, e.message))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
            if errors.len() > 10 {
                summary.push_str(&format!("\n  ... and {} more errors", errors.len() - 10));
            }
            bail!(summary);
        }

        Ok(hashes)
    })
    .await?
}

fn relative_to(base: &Path, path: &Path) -> Result<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| anyhow!("{} is not under {}", path.display(), base.display()))
}

struct FileCopyError {
    message: String,
    is_device_removed: bool,
}

impl FileCopyError {
    fn new(action: &str, e: io::Error) -> Self {
        Self {
            message: format!("Failed to {}: {}", action, e),
            is_device_removed: is_device_removed_error(&e),
        }
    }
}

struct CopyError {
    file: String,
    message: String,
}

/// Copy a single file, hashing it on the way through.
/// An existing destination file is truncated.
fn copy_single_file(source: &Path, dest: &Path, sync_file: bool) -> Result<(u64, [u8; 32]), FileCopyError> {
    let source_metadata =
        fs::metadata(source).map_err(|e| FileCopyError::new("read source metadata", e))?;

    let source_file = File::open(source).map_err(|e| FileCopyError::new("open source file", e))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);

    let dest_file =
        File::create(dest).map_err(|e| FileCopyError::new("create destination file", e))?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| FileCopyError::new("read from source", e))?;

        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| FileCopyError::new("write to destination", e))?;
        hasher.update(&buffer[..bytes_read]);

        bytes_written += bytes_read as u64;
    }

    writer
        .flush()
        .map_err(|e| FileCopyError::new("flush destination file", e))?;

    if sync_file {
        let inner = writer
            .into_inner()
            .map_err(|e| FileCopyError::new("get inner file handle", e.into_error()))?;

        inner
            .sync_all()
            .map_err(|e| FileCopyError::new("sync file", e))?;
    }

    // Permission errors are expected on FAT/exFAT volumes
    if let Err(e) = fs::set_permissions(dest, source_metadata.permissions()) {
        debug!(dest = %dest.display(), error = %e, "Failed to set file permissions");
    }

    if let Err(e) = preserve_timestamps(&source_metadata, dest) {
        debug!(dest = %dest.display(), error = %e, "Failed to preserve file timestamps");
    }

    Ok((bytes_written, *hasher.finalize().as_bytes()))
}

fn preserve_timestamps(source_metadata: &fs::Metadata, dest: &Path) -> Result<()> {
    let atime = filetime::FileTime::from_last_access_time(source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(source_metadata);

    filetime::set_file_times(dest, atime, mtime)?;
    Ok(())
}

fn describe_io_error(e: io::Error, action: &str) -> anyhow::Error {
    if is_device_removed_error(&e) {
        anyhow!("Device appears to have been removed: {}", e)
    } else {
        anyhow!("Failed to {}: {}", action, e)
    }
}

/// Check if an I/O error indicates the device has been removed
fn is_device_removed_error(error: &io::Error) -> bool {
    match error.kind() {
        ErrorKind::NotFound => true,
        ErrorKind::PermissionDenied => false,
        ErrorKind::BrokenPipe => true,
        ErrorKind::ConnectionReset => true,
        ErrorKind::ConnectionAborted => true,
        ErrorKind::NotConnected => true,
        _ => {
            if let Some(os_error) = error.raw_os_error() {
                is_device_errno(os_error)
            } else {
                false
            }
        }
    }
}

#[cfg(target_os = "linux")]
fn is_device_errno(errno: i32) -> bool {
    matches!(
        errno,
        libc::EIO | libc::ENODEV | libc::ENXIO | libc::ENOMEDIUM | libc::EMEDIUMTYPE
    )
}

#[cfg(not(target_os = "linux"))]
fn is_device_errno(errno: i32) -> bool {
    matches!(errno, libc::EIO | libc::ENODEV | libc::ENXIO)
}
