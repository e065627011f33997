//! Ambient configuration: data directory resolution and env-var driven tuning.
//!
//! Mirrors the embedding gateway's cache-directory resolution (`TURNVAULT_*`
//! env var first, then platform directories, then a relative fallback) so
//! every on-disk path in the crate is discovered the same way.

use std::path::PathBuf;

/// Resolve the directory turn data (SQLite db + vector index) lives in.
///
/// Order: `TURNVAULT_DATA_DIR` env var, then the platform data directory via
/// `directories::ProjectDirs`, then `.turnvault_data` under the cwd.
pub fn data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("TURNVAULT_DATA_DIR") {
        return PathBuf::from(path);
    }

    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "turnvault", "core") {
        return proj_dirs.data_dir().to_path_buf();
    }

    PathBuf::from(".turnvault_data")
}

/// Create `dir` (and parents) and, on Unix, restrict it to owner-only access.
pub fn ensure_private_dir(dir: &std::path::Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(dir, perms)?;
    }
    Ok(())
}

/// Restrict a file to owner-only read/write on Unix. No-op elsewhere.
pub fn harden_file_permissions(path: &std::path::Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if path.exists() {
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Resolve the configured UTC offset used by C11's relative-time filters
/// (`last N days`, `this week`, ...). Defaults to UTC (offset 0) when unset
/// or unparseable.
pub fn timezone_offset_minutes() -> i32 {
    std::env::var("TURNVAULT_TZ_OFFSET_MINUTES")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or(0)
}
