use std::path::Path;

use crate::error::PlatformError;

/// Required bytes = `Σ totalSize` plus this fractional margin (§4.4 step 3).
pub const STORAGE_MARGIN_FRACTION: f64 = 0.20;

/// Returns the bytes available to an unprivileged writer at `path`'s
/// filesystem, creating `path` first if it does not yet exist (the engine
/// calls this before the destination directory is created).
pub async fn available_bytes(path: &Path) -> Result<u64, PlatformError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| PlatformError::DiskStat {
            path: path.to_path_buf(),
            source,
        })?;

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || available_bytes_blocking(&path))
        .await
        .expect("blocking disk-stat task panicked")
}

/// `required = Σ file.totalSize * (1 + STORAGE_MARGIN_FRACTION)` (§4.4).
pub fn required_with_margin(total_size: u64) -> u64 {
    (total_size as f64 * (1.0 + STORAGE_MARGIN_FRACTION)).ceil() as u64
}

#[cfg(unix)]
fn available_bytes_blocking(path: &Path) -> Result<u64, PlatformError> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| PlatformError::DiskStat {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains a NUL byte"),
    })?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };

    if rc != 0 {
        return Err(PlatformError::DiskStat {
            path: path.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    Ok(stat.f_bavail as u64 * stat.f_frsize as u64)
}

#[cfg(not(unix))]
fn available_bytes_blocking(path: &Path) -> Result<u64, PlatformError> {
    // No portable statvfs-equivalent wired up for this target; report the
    // error rather than silently pretending there is unlimited space.
    Err(PlatformError::DiskStat {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "free-space inspection is not implemented on this platform",
        ),
    })
}
