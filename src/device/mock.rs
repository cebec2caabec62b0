//! In-memory device for testing
//!
//! `MemDevice` behaves like a regular file or a raw block device without
//! touching the kernel, which makes executor and driver tests fast and
//! deterministic. Clones share state, so a test can keep a handle while the
//! exerciser owns another and inspect the operation log afterwards.
//!
//! # Fault injection
//!
//! - [`fail_next`](MemDevice::fail_next): the next operation of a kind fails
//!   with a chosen errno
//! - [`corrupt`](MemDevice::corrupt): overwrite stored bytes behind the
//!   exerciser's back
//!
//! Block mode starts filled with [`STALE_BYTE`] so that tests notice when
//! unwritten device content is mistaken for known content.

use super::{Device, DeviceKind};
use crate::error::OpKind;
use crate::Result;
use anyhow::Context;
use std::sync::{Arc, Mutex, MutexGuard};

/// Initial content of every byte of a block-mode device
pub const STALE_BYTE: u8 = 0xEE;

/// Record of one device call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationRecord {
    pub op: OpKind,
    pub offset: u64,
    pub length: u64,
}

struct MemState {
    data: Vec<u8>,
    ops: Vec<OperationRecord>,
    pending_failures: Vec<(OpKind, i32)>,
}

/// In-memory device
#[derive(Clone)]
pub struct MemDevice {
    kind: DeviceKind,
    block_size: u64,
    state: Arc<Mutex<MemState>>,
}

impl MemDevice {
    /// Empty, resizable device behaving like a regular file
    pub fn new_file(block_size: u64) -> Self {
        Self::with_data(DeviceKind::RegularFile, block_size, Vec::new())
    }

    /// Fixed-size device of `size` bytes filled with [`STALE_BYTE`]
    pub fn new_block(size: u64, block_size: u64) -> Self {
        Self::with_data(
            DeviceKind::BlockDevice,
            block_size,
            vec![STALE_BYTE; size as usize],
        )
    }

    fn with_data(kind: DeviceKind, block_size: u64, data: Vec<u8>) -> Self {
        Self {
            kind,
            block_size,
            state: Arc::new(Mutex::new(MemState {
                data,
                ops: Vec::new(),
                pending_failures: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `op` fail with `errno`
    pub fn fail_next(&self, op: OpKind, errno: i32) {
        self.state().pending_failures.push((op, errno));
    }

    /// Overwrite stored content at `offset` without logging an operation
    pub fn corrupt(&self, offset: u64, bytes: &[u8]) {
        let mut state = self.state();
        let start = offset as usize;
        let end = start + bytes.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(bytes);
    }

    /// Copy of the stored bytes in `[offset, offset + len)`, zero past the end
    pub fn contents(&self, offset: u64, len: u64) -> Vec<u8> {
        let state = self.state();
        let mut out = vec![0u8; len as usize];
        let start = (offset as usize).min(state.data.len());
        let end = ((offset + len) as usize).min(state.data.len());
        out[..end - start].copy_from_slice(&state.data[start..end]);
        out
    }

    /// All operations issued so far
    pub fn ops(&self) -> Vec<OperationRecord> {
        self.state().ops.clone()
    }

    pub fn op_count(&self) -> usize {
        self.state().ops.len()
    }

    pub fn count_of(&self, op: OpKind) -> usize {
        self.state().ops.iter().filter(|r| r.op == op).count()
    }

    /// Log the call and consume a pending failure for `op`, if any
    fn begin(state: &mut MemState, op: OpKind, offset: u64, length: u64) -> Result<()> {
        state.ops.push(OperationRecord { op, offset, length });
        if let Some(pos) = state.pending_failures.iter().position(|(kind, _)| *kind == op) {
            let (_, errno) = state.pending_failures.remove(pos);
            return Err(std::io::Error::from_raw_os_error(errno)).context(format!(
                "injected {} failure: offset={}, length={}",
                op, offset, length
            ));
        }
        Ok(())
    }
}

impl Device for MemDevice {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn size(&self) -> Result<u64> {
        Ok(self.state().data.len() as u64)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut state = self.state();
        Self::begin(&mut state, OpKind::Read, offset, buf.len() as u64)?;

        let len = state.data.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let available = ((len - offset) as usize).min(buf.len());
        let start = offset as usize;
        buf[..available].copy_from_slice(&state.data[start..start + available]);
        Ok(available)
    }

    fn write_at(&self, buf: &[u8], offset: u64) -> Result<usize> {
        let mut state = self.state();
        Self::begin(&mut state, OpKind::Write, offset, buf.len() as u64)?;

        let end = offset as usize + buf.len();
        if end > state.data.len() {
            if self.kind == DeviceKind::BlockDevice {
                return Err(std::io::Error::from_raw_os_error(libc::ENOSPC))
                    .context(format!("write past device end: offset={}", offset));
            }
            state.data.resize(end, 0);
        }
        state.data[offset as usize..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn set_len(&self, len: u64) -> Result<()> {
        let mut state = self.state();
        Self::begin(&mut state, OpKind::Truncate, len, 0)?;
        if self.kind == DeviceKind::BlockDevice {
            anyhow::bail!("Cannot resize block device: length={}", len);
        }
        state.data.resize(len as usize, 0);
        Ok(())
    }

    fn discard(&self, offset: u64, len: u64) -> Result<()> {
        let mut state = self.state();
        Self::begin(&mut state, OpKind::Discard, offset, len)?;

        let size = state.data.len() as u64;
        if self.kind == DeviceKind::BlockDevice && offset + len > size {
            return Err(std::io::Error::from_raw_os_error(libc::EINVAL))
                .context(format!("discard past device end: offset={}, length={}", offset, len));
        }
        let start = offset.min(size) as usize;
        let end = (offset + len).min(size) as usize;
        state.data[start..end].fill(0);
        Ok(())
    }
}
