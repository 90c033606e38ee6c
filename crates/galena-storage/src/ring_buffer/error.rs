//! Error types for ring buffer operations.

/// Errors that can occur in ring buffer operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error while opening, mapping or flushing the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Not enough released space to satisfy the allocation.
    #[error("out of space: requested {requested} bytes, {available} available")]
    OutOfSpace {
        /// Bytes requested, including the record header.
        requested: usize,
        /// Bytes not held by unreleased records.
        available: usize,
    },

    /// The payload can never fit into this ring buffer.
    #[error("payload of {requested} bytes exceeds the maximum of {max}")]
    TooLarge {
        /// Requested payload length.
        requested: usize,
        /// Largest payload this ring accepts.
        max: usize,
    },

    /// Invalid configuration.
    #[error("invalid ring buffer configuration: {0}")]
    InvalidConfig(String),

    /// The handle does not point at a live record.
    #[error("no live buffer at offset {offset}")]
    UnknownBuffer {
        /// Offset named by the handle.
        offset: usize,
    },

    /// No record is indexed under this seqno.
    #[error("seqno {seqno} is not in the cache")]
    UnknownSeqno {
        /// Requested seqno.
        seqno: i64,
    },

    /// The record is still held by its writer.
    #[error("buffer for seqno {seqno} is still in use")]
    BufferInUse {
        /// Seqno of the record.
        seqno: i64,
    },
}

/// Result type for ring buffer operations.
pub type Result<T> = std::result::Result<T, StoreError>;
