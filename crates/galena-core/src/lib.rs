//! # Galena Core
//!
//! Admission primitives used by the galena replication engine.
//!
//! This crate provides:
//! - **Seqno monitor**: admits threads into a critical section strictly in
//!   increasing sequence-number order, with cancellation and interruption
//! - **Send monitor**: bounds concurrent senders and admits them in FIFO
//!   arrival order, with pause/resume flow control
//! - **Shared buffers**: reference-counted payloads that copy on first write
//!
//! ## Example
//!
//! ```rust
//! use galena_core::seqno::{MonitorConfig, SeqnoAdmissionMonitor};
//!
//! let monitor = SeqnoAdmissionMonitor::new(MonitorConfig::default()).unwrap();
//!
//! monitor.grab(0).unwrap();
//! // ... apply action 0 ...
//! monitor.release(0);
//!
//! // Seqno 1 is abandoned without entering the critical section.
//! monitor.self_cancel(1).unwrap();
//! assert_eq!(monitor.last_released(), Some(1));
//! ```
//!
//! ## Failure Model
//!
//! Expected outcomes (`Canceled`, `Closed`, `Interrupted`) are returned as
//! values. Breaking the grab/release protocol is a programming error: it is
//! logged at `ERROR` and then panics. Release builds set `panic = "abort"`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod buffer;
pub mod logging;
pub mod seqno;
pub mod send;

#[doc(hidden)]
pub use tracing as __tracing;

// Re-export key types
pub use buffer::SharedBuffer;
pub use seqno::{MonitorConfig, MonitorError, MonitorStats, SeqnoAdmissionMonitor};
pub use send::{SendMonitor, SendMonitorConfig, SendMonitorError, SendMonitorStats, WaiterHandle};

/// Logs a broken ordering contract and panics.
///
/// Used for double release, release without grab, seqno reuse and similar
/// caller bugs. No safe continuation exists after these.
#[macro_export]
macro_rules! protocol_violation {
    ($($arg:tt)+) => {{
        $crate::__tracing::error!($($arg)+);
        panic!($($arg)+)
    }};
}

/// Errors for invalid monitor configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The wait queue capacity is not a power of two.
    #[error("monitor capacity must be a power of two >= 2, got {0}")]
    CapacityNotPowerOfTwo(usize),

    /// The concurrency parameter is out of range.
    #[error("monitor concurrency must be in 1..={capacity}, got {concurrency}")]
    InvalidConcurrency {
        /// Requested concurrency.
        concurrency: usize,
        /// Configured capacity.
        capacity: usize,
    },
}

/// Validates a capacity/concurrency pair shared by both monitors.
pub(crate) fn validate_queue(capacity: usize, concurrency: usize) -> Result<(), ConfigError> {
    if capacity < 2 || !capacity.is_power_of_two() {
        return Err(ConfigError::CapacityNotPowerOfTwo(capacity));
    }
    if concurrency == 0 || concurrency > capacity {
        return Err(ConfigError::InvalidConcurrency {
            concurrency,
            capacity,
        });
    }
    Ok(())
}
