//! # txlog testkit
//!
//! Test utilities for txlog.
//!
//! This crate provides:
//! - Property-based test generators using proptest, one family per kernel version
//! - Fixtures that write entries and whole log files
//! - Fuzz testing harnesses for every decoding path
//!
//! ## Usage
//!
//! ```rust
//! use txlog_testkit::prelude::*;
//! use txlog_core::KernelVersion;
//!
//! let backend = committed_log(KernelVersion::V5_20, 2).unwrap();
//! assert_eq!(fuzz_log_file(&backend.into_data()), 8);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod fuzz;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::fuzz::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
