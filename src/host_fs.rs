//! Filesystem port.
//!
//! Stages address host files by their absolute on-host path
//! (`/etc/ssh/sshd_config`, `/home/<user>/.ssh`). `LocalFs` rebases those
//! paths under a root directory, which is `/` in production and a scratch
//! directory in tests.

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info};

use crate::error::{Result, ServerPrepError};

/// File operations the stages need from the host.
pub trait HostFs {
    /// Read a UTF-8 text file.
    fn read_to_string(&self, path: &Path) -> Result<String>;

    /// Replace `path` with `contents` atomically and set its mode.
    fn write_atomic(&self, path: &Path, contents: &str, mode: u32) -> Result<()>;

    /// Copy a file, preserving its permission bits.
    fn copy(&self, from: &Path, to: &Path) -> Result<()>;

    /// Create a directory (and parents) and set the leaf's mode.
    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()>;

    /// Remove a file.
    fn remove_file(&self, path: &Path) -> Result<()>;

    /// Whether the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Permission bits of an existing file.
    fn mode(&self, path: &Path) -> Result<u32>;

    /// Write `contents` to a fresh temporary file in the directory of
    /// `near`. The file is written even in dry-run and removed on drop.
    fn write_scratch(&self, near: &Path, contents: &str, mode: u32) -> Result<ScratchFile>;

    /// Whether writes are being skipped.
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Temporary file created by [`HostFs::write_scratch`].
#[derive(Debug)]
pub struct ScratchFile {
    host_path: PathBuf,
    _temp: TempPath,
}

impl ScratchFile {
    /// On-host path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.host_path
    }
}

/// Attach the offending path to an IO error.
fn io_context(path: &Path, err: std::io::Error) -> ServerPrepError {
    ServerPrepError::Io(std::io::Error::new(
        err.kind(),
        format!("{}: {}", path.display(), err),
    ))
}

/// `HostFs` backed by the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    dry_run: bool,
}

impl LocalFs {
    /// Filesystem rooted at `/`.
    pub fn new(dry_run: bool) -> Self {
        Self::with_root("/", dry_run)
    }

    /// Filesystem rebased under `root`.
    pub fn with_root(root: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            root: root.into(),
            dry_run,
        }
    }

    /// Map an on-host path to the real location under `root`.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.root.join(path.strip_prefix("/").unwrap_or(path))
    }

    /// Randomly named, exclusively created file beside `path`, holding
    /// `contents` with `mode` set on the open descriptor.
    fn temp_beside(&self, path: &Path, contents: &str, mode: u32) -> Result<NamedTempFile> {
        let real = self.resolve(path);
        let (Some(dir), Some(name)) = (real.parent(), real.file_name()) else {
            return Err(ServerPrepError::validation(format!(
                "not a file path: {}",
                path.display()
            )));
        };

        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{}.", name.to_string_lossy()))
            .tempfile_in(dir)
            .map_err(|e| io_context(path, e))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| io_context(file.path(), e))?;
        file.as_file()
            .sync_all()
            .map_err(|e| io_context(file.path(), e))?;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .map_err(|e| io_context(file.path(), e))?;
        Ok(file)
    }
}

impl HostFs for LocalFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let real = self.resolve(path);
        fs::read_to_string(&real).map_err(|e| io_context(path, e))
    }

    fn write_atomic(&self, path: &Path, contents: &str, mode: u32) -> Result<()> {
        if self.dry_run {
            info!(
                "[dry-run] would write {} ({} bytes, mode {:o})",
                path.display(),
                contents.len(),
                mode
            );
            return Ok(());
        }

        let file = self.temp_beside(path, contents, mode)?;
        file.persist(self.resolve(path))
            .map_err(|e| io_context(path, e.error))?;

        debug!("Wrote {} (mode {:o})", path.display(), mode);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would copy {} -> {}", from.display(), to.display());
            return Ok(());
        }
        fs::copy(self.resolve(from), self.resolve(to)).map_err(|e| io_context(to, e))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would create directory {} (mode {:o})", path.display(), mode);
            return Ok(());
        }
        let real = self.resolve(path);
        fs::create_dir_all(&real).map_err(|e| io_context(path, e))?;
        fs::set_permissions(&real, fs::Permissions::from_mode(mode))
            .map_err(|e| io_context(path, e))?;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        if self.dry_run {
            info!("[dry-run] would remove {}", path.display());
            return Ok(());
        }
        fs::remove_file(self.resolve(path)).map_err(|e| io_context(path, e))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).exists()
    }

    fn mode(&self, path: &Path) -> Result<u32> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| io_context(path, e))?;
        Ok(meta.permissions().mode() & 0o7777)
    }

    fn write_scratch(&self, near: &Path, contents: &str, mode: u32) -> Result<ScratchFile> {
        let temp = self.temp_beside(near, contents, mode)?.into_temp_path();
        let name = temp.file_name().unwrap_or_default().to_os_string();
        let host_path = near.with_file_name(name);
        debug!("Wrote scratch copy {}", host_path.display());
        Ok(ScratchFile {
            host_path,
            _temp: temp,
        })
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}
