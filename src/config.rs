use log::warn;

use crate::block::{ALIGNMENT, HEADER_SIZE, MAX_BLOCK_SIZE};
use crate::error::{AllocError, Result};

/// Default arena size, 64 KiB
pub const MEM_SIZE: usize = 64 * 1024;

/// Environment variable overriding the size of the process heap
pub const MEM_SIZE_ENV: &str = "FIXED_HEAP_MEM_SIZE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Total arena size in bytes, headers included
    pub mem_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig { mem_size: MEM_SIZE }
    }
}

impl HeapConfig {
    pub fn new(mem_size: usize) -> Self {
        HeapConfig { mem_size }
    }

    /// Reads [`MEM_SIZE_ENV`], falling back to the default when it is unset
    /// or does not hold a usable size
    pub fn from_env() -> Self {
        match std::env::var(MEM_SIZE_ENV) {
            Ok(raw) => HeapConfig::parse(&raw),
            Err(_) => HeapConfig::default(),
        }
    }

    fn parse(raw: &str) -> Self {
        let mem_size = match raw.trim().parse::<usize>() {
            Ok(mem_size) => mem_size,
            Err(err) => {
                warn!("ignoring {MEM_SIZE_ENV}={raw:?}: {err}");
                return HeapConfig::default();
            }
        };

        let config = HeapConfig::new(mem_size);
        match config.validate() {
            Ok(()) => config,
            Err(err) => {
                warn!("ignoring {MEM_SIZE_ENV}: {err}");
                HeapConfig::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason| AllocError::InvalidConfig {
            mem_size: self.mem_size,
            reason,
        };

        if self.mem_size <= HEADER_SIZE {
            return Err(invalid("must be larger than a block header"));
        }
        if self.mem_size % ALIGNMENT != 0 {
            return Err(invalid("must be a multiple of 8"));
        }
        if self.mem_size > MAX_BLOCK_SIZE {
            return Err(invalid("too large to describe in a block header"));
        }

        Ok(())
    }
}
