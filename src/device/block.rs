//! Raw block device
//!
//! Block devices have a fixed size reported by `BLKGETSIZE64` and cannot be
//! created or resized. The block size comes from `BLKBSZGET`, falling back to
//! the larger of `st_blksize` and the page size. Discard issues
//! `BLKDISCARD`.
//!
//! Opening a block device read/write usually requires root.

use super::{io, stat_block_size, Device, DeviceKind};
use crate::Result;
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

// ioctl request codes from <linux/fs.h>
const BLKGETSIZE64: libc::c_ulong = 0x80081272;
const BLKBSZGET: libc::c_ulong = 0x80081270;
const BLKDISCARD: libc::c_ulong = 0x1277;

/// Raw block device
pub struct BlockDevice {
    path: PathBuf,
    file: File,
    device_size: u64,
    block_size: u64,
}

impl BlockDevice {
    /// Open `path`, which must be a block special file
    pub fn open(path: &Path, direct: bool) -> Result<Self> {
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat block device: {}", path.display()))?;
        if !metadata.file_type().is_block_device() {
            anyhow::bail!("Not a block device: {}", path.display());
        }

        let mut options = OpenOptions::new();
        options.read(true).write(true);
        if direct {
            options.custom_flags(libc::O_DIRECT);
        }

        let file = options
            .open(path)
            .with_context(|| format!("Failed to open block device: {}", path.display()))?;
        let fd = file.as_raw_fd();

        let device_size = detect_size(fd).with_context(|| path.display().to_string())?;
        let block_size = detect_block_size(fd);

        tracing::debug!(
            path = %path.display(),
            device_size,
            block_size,
            direct,
            "opened block device"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            device_size,
            block_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn detect_size(fd: RawFd) -> Result<u64> {
    let mut size: u64 = 0;
    // SAFETY: BLKGETSIZE64 writes one u64 through the pointer
    let result = unsafe { libc::ioctl(fd, BLKGETSIZE64, &mut size) };
    if result < 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context("ioctl(BLKGETSIZE64) failed");
    }
    Ok(size)
}

fn detect_block_size(fd: RawFd) -> u64 {
    let mut block_size: libc::c_int = 0;
    // SAFETY: BLKBSZGET writes one int through the pointer
    let result = unsafe { libc::ioctl(fd, BLKBSZGET, &mut block_size) };
    if result == 0 && block_size > 0 && (block_size as u64).is_power_of_two() {
        return block_size as u64;
    }
    let fallback = stat_block_size(fd);
    tracing::warn!(fallback, "BLKBSZGET unavailable, using stat block size");
    fallback
}

impl Device for BlockDevice {
    fn kind(&self) -> DeviceKind {
        DeviceKind::BlockDevice
    }

    fn size(&self) -> Result<u64> {
        Ok(self.device_size)
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
        anyhow::bail!(
            "Cannot resize block device: path={}, length={}",
            self.path.display(),
            len
        )
    }

    fn discard(&self, offset: u64, len: u64) -> Result<()> {
        let range: [u64; 2] = [offset, len];
        // SAFETY: BLKDISCARD reads two u64s (start, length) through the pointer
        let result = unsafe { libc::ioctl(self.file.as_raw_fd(), BLKDISCARD, range.as_ptr()) };
        if result < 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).context(format!(
                "ioctl(BLKDISCARD) failed: path={}, offset={}, length={}",
                self.path.display(),
                offset,
                len
            ));
        }
        Ok(())
    }
}
