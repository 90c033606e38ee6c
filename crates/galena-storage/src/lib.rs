//! # Galena Storage
//!
//! Durable gcache for galena: a memory-mapped ring buffer holding recent
//! write-sets by seqno, validated on every open.
//!
//! ```rust,no_run
//! use galena_storage::{RingBufferConfig, RingBufferStore};
//!
//! let store = RingBufferStore::open(RingBufferConfig::new("/var/lib/galena/galena.cache", 128 << 20))?;
//! if let Some((min, max)) = store.seqno_range() {
//!     println!("cache holds seqnos {min}..={max}");
//! }
//! # Ok::<(), galena_storage::StoreError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Memory-mapped ring buffer - persistent seqno cache with crash recovery
pub mod ring_buffer;

// Re-export key types
pub use ring_buffer::{
    BufferHandle, RecoveryInconsistency, RecoveryOutcome, RingBufferConfig, RingBufferStore,
    StoreError, SEQNO_NONE,
};
