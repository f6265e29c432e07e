use std::time::Duration;

use portchunk_frame::{DEFAULT_CHUNK_SIZE, FRAME_BUDGET, MIN_CHUNK_SIZE};

use crate::error::{Result, StreamError};

/// Environment variable read by [`StreamConfig::from_env`].
pub const CHUNK_SIZE_ENV: &str = "PORTCHUNK_CHUNK_SIZE";

/// Controls chunking behavior of a [`PortStream`](crate::PortStream).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Maximum bytes per frame. `0` disables chunking, so oversized
    /// messages fail at the port. Default: 64 MiB.
    pub chunk_size: usize,
    /// How long chunking may run before yielding. Default: half of a
    /// 60 fps frame.
    pub frame_budget: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            frame_budget: FRAME_BUDGET,
        }
    }
}

impl StreamConfig {
    /// Config with an explicit chunk size and default pacing.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    /// Defaults, with the chunk size taken from `PORTCHUNK_CHUNK_SIZE` if set.
    pub fn from_env() -> Result<Self> {
        Self::from_env_value(std::env::var(CHUNK_SIZE_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Result<Self> {
        let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::default());
        };
        let chunk_size = raw.parse::<usize>().map_err(|_| {
            StreamError::InvalidConfig(format!("{CHUNK_SIZE_ENV} must be a byte count, got {raw:?}"))
        })?;
        let config = Self::with_chunk_size(chunk_size);
        config.validate()?;
        Ok(config)
    }

    /// Reject a non-zero chunk size below [`MIN_CHUNK_SIZE`].
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size != 0 && self.chunk_size < MIN_CHUNK_SIZE {
            return Err(StreamError::ChunkSizeTooSmall {
                size: self.chunk_size,
                min: MIN_CHUNK_SIZE,
            });
        }
        Ok(())
    }

    /// Whether chunking is enabled.
    pub fn chunking_enabled(&self) -> bool {
        self.chunk_size > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.chunk_size, 64 * 1024 * 1024);
        assert_eq!(config.frame_budget, FRAME_BUDGET);
        assert!(config.chunking_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_disables_chunking() {
        let config = StreamConfig::with_chunk_size(0);
        assert!(config.validate().is_ok());
        assert!(!config.chunking_enabled());
    }

    #[test]
    fn rejects_small_chunk_sizes() {
        for size in [1, 10, MIN_CHUNK_SIZE - 1] {
            let err = StreamConfig::with_chunk_size(size).validate().unwrap_err();
            assert!(matches!(err, StreamError::ChunkSizeTooSmall { min: 24, .. }));
        }
        assert!(StreamConfig::with_chunk_size(MIN_CHUNK_SIZE).validate().is_ok());
    }

    #[test]
    fn env_value_parsing() {
        assert_eq!(StreamConfig::from_env_value(None).unwrap(), StreamConfig::default());
        assert_eq!(StreamConfig::from_env_value(Some("  ")).unwrap(), StreamConfig::default());
        assert_eq!(StreamConfig::from_env_value(Some("4096")).unwrap().chunk_size, 4096);
        assert_eq!(StreamConfig::from_env_value(Some("0")).unwrap().chunk_size, 0);
        assert!(matches!(
            StreamConfig::from_env_value(Some("lots")),
            Err(StreamError::InvalidConfig(_))
        ));
        assert!(matches!(
            StreamConfig::from_env_value(Some("12")),
            Err(StreamError::ChunkSizeTooSmall { .. })
        ));
    }
}
