//! blkx - randomized block storage consistency exerciser
//!
//! blkx issues randomized reads, writes, truncates and discards against a
//! regular file or a raw block device, keeps an in-memory shadow of what the
//! device should contain, and stops at the first read that disagrees with it.
//!
//! # Architecture
//!
//! - **Devices**: regular files and block devices behind one positioned-I/O
//!   trait, plus an in-memory device for tests
//! - **Positions**: random or windowed aligned ranges confined to a zone
//! - **Shadow model**: dense, sparse or size-only record of expected bytes
//! - **Executors**: one per operation kind, each checked against the shadow
//! - **Zones**: disjoint partitions so a write instance and a discard instance
//!   can share one device
//! - **Engine**: the driver loop, run lifecycle and final report

pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod executor;
pub mod output;
pub mod position;
pub mod shadow;
pub mod util;
pub mod zone;

// Re-export commonly used types
pub use config::Config;
pub use device::Device;
pub use engine::{Exerciser, RunReport};
pub use error::{Divergence, ExerciserError};

/// Result type used throughout blkx
pub type Result<T> = anyhow::Result<T>;
