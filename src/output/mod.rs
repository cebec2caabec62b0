//! Report output
//!
//! - [`text`]: human-readable summary on stdout
//! - [`json`]: machine-readable report for harnesses

pub mod json;
pub mod text;
