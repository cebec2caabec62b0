//! Regular file device
//!
//! Opens (and creates if needed) a regular file for positioned I/O, with
//! optional `O_DIRECT`. Resizing uses `ftruncate`; discard punches a hole
//! with `fallocate(FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE)`, which leaves
//! the file size alone and makes the range read back as zeros.

use super::{io, stat_block_size, Device, DeviceKind};
use crate::Result;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

/// Regular file opened for read/write
pub struct FileDevice {
    path: PathBuf,
    file: File,
    block_size: u64,
    direct: bool,
}

impl FileDevice {
    /// Open or create `path`
    ///
    /// With `direct`, the file is opened with `O_DIRECT`; filesystems that
    /// refuse it (tmpfs) fail here rather than on the first I/O.
    pub fn open(path: &Path, direct: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        if direct {
            options.custom_flags(libc::O_DIRECT);
        }

        let file = options
            .open(path)
            .with_context(|| format!("Failed to open file: {}", path.display()))?;
        let block_size = stat_block_size(file.as_raw_fd());

        tracing::debug!(
            path = %path.display(),
            block_size,
            direct,
            "opened regular file"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            block_size,
            direct,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_direct(&self) -> bool {
        self.direct
    }
}

impl Device for FileDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::RegularFile
    }

    fn size(&self) -> Result<u64> {
        let metadata = self
            .file
            .metadata()
            .with_context(|| format!("Failed to get file metadata: {}", self.path.display()))?;
        Ok(metadata.len())
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        io::pread_full(self.file.as_raw_fd(), buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        io::pwrite_full(self.file.as_raw_fd(), buf, offset)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        let fd = self.file.as_raw_fd();
        // SAFETY: fd is owned by self.file and open
        let result = unsafe { libc::ftruncate(fd, len as libc::off_t) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "ftruncate failed: path={}, length={}",
                self.path.display(),
                len
            ));
        }
        Ok(())
    }

    fn discard(&self, offset: u64, len: u64) -> Result<()> {
        let fd = self.file.as_raw_fd();
        let mode = libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE;
        // SAFETY: fd is owned by self.file and open
        let result =
            unsafe { libc::fallocate(fd, mode, offset as libc::off_t, len as libc::off_t) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "fallocate(PUNCH_HOLE) failed: path={}, offset={}, length={}",
                self.path.display(),
                offset,
                len
            ));
        }
        Ok(())
    }
}
