//! # Ring Buffer Store
//!
//! Persistent, memory-mapped circular cache of variable-length records keyed
//! by seqno.
//!
//! ## Lifecycle of a record
//!
//! ```text
//! allocate ──► write ──► commit(seqno) ──► release ──► reclaimed by a later allocate
//! ```
//!
//! ## Crash recovery
//!
//! [`RingBufferStore::open`] validates the previous contents. A file that was
//! not closed cleanly, or whose header or records disagree, is reset to an
//! empty cache. The outcome is reported by [`RingBufferStore::recovery`] and
//! logged, never returned as an error.

mod config;
mod error;
pub mod layout;
mod recovery;
mod store;

pub use config::{RingBufferConfig, MIN_SIZE};
pub use error::{Result, StoreError};
pub use layout::{HeaderField, DATA_OFFSET, SEQNO_NONE};
pub use recovery::{RecoveryInconsistency, RecoveryOutcome};
pub use store::{open_path, BufferHandle, RingBufferStore};
