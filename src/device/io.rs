//! Positioned read/write loops
//!
//! `pread`/`pwrite` may transfer fewer bytes than requested. These helpers
//! retry until the whole buffer is transferred, the read hits end of file, or
//! the kernel reports an error. `EINTR` is retried; every other error is
//! returned with the fd, offset and remaining length in its context.

use crate::Result;
use anyhow::Context;
use std::os::unix::io::RawFd;

/// Read up to `buf.len()` bytes at `offset`
///
/// Returns the number of bytes read; less than `buf.len()` only at EOF.
pub fn pread_full(fd: RawFd, buf: &mut [u8], offset: u64) -> Result<usize> {
    let length = buf.len();
    let mut total_read = 0;
    let mut current_offset = offset;

    while total_read < length {
        let remaining = length - total_read;
        let dst = buf[total_read..].as_mut_ptr();

        // SAFETY: dst points to `remaining` writable bytes borrowed from buf
        let result = unsafe {
            libc::pread(
                fd,
                dst as *mut libc::c_void,
                remaining,
                current_offset as libc::off_t,
            )
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err).context(format!(
                "pread failed: fd={}, offset={}, length={}",
                fd, current_offset, remaining
            ));
        }

        if result == 0 {
            break;
        }

        let bytes_read = result as usize;
        total_read += bytes_read;
        current_offset += bytes_read as u64;
    }

    Ok(total_read)
}

/// Write all of `buf` at `offset`
pub fn pwrite_full(fd: RawFd, buf: &[u8], offset: u64) -> Result<usize> {
    let length = buf.len();
    let mut total_written = 0;
    let mut current_offset = offset;

    while total_written < length {
        let remaining = length - total_written;
        let src = buf[total_written..].as_ptr();

        // SAFETY: src points to `remaining` readable bytes borrowed from buf
        let result = unsafe {
            libc::pwrite(
                fd,
                src as *const libc::c_void,
                remaining,
                current_offset as libc::off_t,
            )
        };

        if result < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err).context(format!(
                "pwrite failed: fd={}, offset={}, length={}",
                fd, current_offset, remaining
            ));
        }

        if result == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::WriteZero)).context(format!(
                "pwrite made no progress: fd={}, offset={}, length={}",
                fd, current_offset, remaining
            ));
        }

        let bytes_written = result as usize;
        total_written += bytes_written;
        current_offset += bytes_written as u64;
    }

    Ok(total_written)
}
