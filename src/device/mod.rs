//! Device abstraction
//!
//! A device is the thing under test: a regular file or a raw block device.
//! The exerciser only ever talks to it through positioned reads and writes,
//! a resize, and a discard, so the [`Device`] trait is exactly that.
//!
//! # Implementations
//!
//! - [`FileDevice`](file::FileDevice): regular file, resizable, discard via
//!   hole punching
//! - [`BlockDevice`](block::BlockDevice): raw block device, fixed size,
//!   discard via `BLKDISCARD`
//! - [`MemDevice`](mock::MemDevice): in-memory stand-in with fault injection,
//!   used by tests
//!
//! # Example
//!
//! ```no_run
//! use blkx::device::open_device;
//! use std::path::Path;
//!
//! let device = open_device(Path::new("/tmp/blkx.dat"), false).unwrap();
//! let mut buf = vec![0u8; device.block_size() as usize];
//! device.read_at(&mut buf, 0).unwrap();
//! ```

use crate::Result;
use anyhow::Context;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::RawFd;
use std::path::Path;

pub mod block;
pub mod file;
pub mod io;
pub mod mock;

pub use block::BlockDevice;
pub use file::FileDevice;
pub use mock::MemDevice;

/// What kind of storage sits behind a [`Device`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    /// Resizable; bytes past EOF read as zero
    RegularFile,
    /// Fixed size; unwritten bytes hold whatever was there before
    BlockDevice,
}

impl DeviceKind {
    pub fn is_resizable(&self) -> bool {
        matches!(self, DeviceKind::RegularFile)
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::RegularFile => write!(f, "regular file"),
            DeviceKind::BlockDevice => write!(f, "block device"),
        }
    }
}

/// Storage under test
///
/// All offsets are absolute byte offsets. Calls block until the kernel
/// returns; there is no queueing and no retry.
pub trait Device: Send {
    fn kind(&self) -> DeviceKind;

    /// Current size in bytes
    ///
    /// For regular files this is the file length and changes with
    /// [`set_len`](Self::set_len) and writes past EOF.
    fn size(&self) -> Result<u64>;

    /// Minimum I/O unit; offsets and lengths of direct I/O must be multiples
    /// of it
    fn block_size(&self) -> u64;

    /// Read into `buf` from `offset`
    ///
    /// Returns the number of bytes read. A short count means end of file; the
    /// tail of `buf` is left untouched.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Write all of `buf` at `offset`
    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize>;

    /// Resize to `len` bytes (truncate or zero-extend)
    fn set_len(&self, len: u64) -> Result<()>;

    /// Tell the device that `[offset, offset + len)` is no longer needed
    fn discard(&self, offset: u64, len: u64) -> Result<()>;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn kind(&self) -> DeviceKind {
        (**self).kind()
    }

    fn size(&self) -> Result<u64> {
        (**self).size()
    }

    fn block_size(&self) -> u64 {
        (**self).block_size()
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        (**self).read_at(buf, offset)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        (**self).write_at(buf, offset)
    }

    fn set_len(&self, len: u64) -> Result<()> {
        (**self).set_len(len)
    }

    fn discard(&self, offset: u64, len: u64) -> Result<()> {
        (**self).discard(offset, len)
    }
}

/// Open `path` as the right kind of device
///
/// Block special files become a [`BlockDevice`]; anything else is treated as
/// a regular file and created if missing. Character devices, directories and
/// other special files are rejected.
pub fn open_device(path: &Path, direct: bool) -> Result<Box<dyn Device>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_block_device() => {
            Ok(Box::new(BlockDevice::open(path, direct)?))
        }
        Ok(meta) if meta.is_file() => Ok(Box::new(FileDevice::open(path, direct)?)),
        Ok(_) => anyhow::bail!(
            "Not a regular file or block device: {}",
            path.display()
        ),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(Box::new(FileDevice::open(path, direct)?))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    }
}

/// Host page size
pub fn page_size() -> u64 {
    // SAFETY: sysconf has no memory-safety preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// Block size derived from `fstat`: the larger of `st_blksize` and the page
/// size
pub(crate) fn stat_block_size(fd: RawFd) -> u64 {
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    // SAFETY: stat is a valid out-pointer for the duration of the call
    let result = unsafe { libc::fstat(fd, &mut stat) };
    let page = page_size();

    if result == 0 && stat.st_blksize > 0 {
        let blksize = stat.st_blksize as u64;
        if blksize.is_power_of_two() {
            return blksize.max(page);
        }
    }
    page
}
