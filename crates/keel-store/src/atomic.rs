//! Atomic JSON file writes: serialize, write `<path>.tmp`, rename.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::StoreError;

/// Write a pretty-printed JSON document atomically.
///
/// The document is written to `<path>.tmp` (with `mode` applied on Unix
/// when given) and renamed over the target, so readers never observe a
/// partial file. Concurrent writers from distinct processes are not
/// coordinated; the store is single-process by design.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    mode: Option<u32>,
) -> Result<(), StoreError> {
    let data = serde_json::to_vec_pretty(value)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, &data)?;

    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    fs::rename(&tmp, path)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os: OsString = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}
