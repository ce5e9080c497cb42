//! # txlog storage
//!
//! Byte-store backends underneath txlog transaction log files.
//!
//! Backends are **opaque byte stores**: they read, append, flush and
//! truncate. They know nothing about log headers, entries or envelopes;
//! `txlog_core` owns every byte of format interpretation.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - tests, tools and ephemeral logs
//! - [`FileBackend`] - log segment files on disk
//!
//! ## Example
//!
//! ```rust
//! use txlog_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"\x05\x01entry").unwrap();
//! assert_eq!(offset, 0);
//! assert_eq!(backend.read_at(2, 5).unwrap(), b"entry");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
