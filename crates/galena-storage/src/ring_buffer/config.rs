//! Ring buffer configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{Result, StoreError};
use super::layout::BUFFER_HEADER_LEN;

/// Smallest accepted data region.
pub const MIN_SIZE: usize = 16 * BUFFER_HEADER_LEN;

/// Configuration for [`RingBufferStore`](super::RingBufferStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingBufferConfig {
    /// Cache file path. Created if missing.
    pub path: PathBuf,
    /// Size of the data region in bytes. The file adds a fixed-size header.
    pub size: usize,
}

impl RingBufferConfig {
    /// Creates a new configuration.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: usize) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidConfig`] if the size is below
    /// [`MIN_SIZE`] or the path is empty.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig("empty path".into()));
        }
        if self.size < MIN_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "size {} is below the minimum of {MIN_SIZE} bytes",
                self.size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(RingBufferConfig::new("/tmp/cache", 4096).validate().is_ok());
        assert!(matches!(
            RingBufferConfig::new("/tmp/cache", 8).validate(),
            Err(StoreError::InvalidConfig(_))
        ));
        assert!(RingBufferConfig::new("", 4096).validate().is_err());
    }
}
