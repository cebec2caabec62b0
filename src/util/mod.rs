//! Buffers, patterns and formatting helpers

pub mod buffer;
pub mod format;
pub mod verification;
