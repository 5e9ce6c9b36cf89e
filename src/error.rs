use core::fmt;

use thiserror::Error;

use crate::block::Handle;

/// Why a handle was refused by the heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleFault {
    Null,
    /// The offset lies outside the arena
    OutOfBounds,
    /// The offset is not the payload start of any block
    Unowned,
    /// The block behind the handle is already free
    AlreadyFree,
}

impl fmt::Display for HandleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            HandleFault::Null => "null handle",
            HandleFault::OutOfBounds => "outside of the arena",
            HandleFault::Unowned => "not a block of this heap",
            HandleFault::AlreadyFree => "block is already free",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Error)]
pub enum AllocError {
    /// No free block is large enough for the request
    #[error("no suitable free block for {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("invalid handle {handle}: {reason}")]
    InvalidHandle { handle: Handle, reason: HandleFault },

    /// The block headers disagree with each other. The heap has been written
    /// past a payload and must not be trusted any more.
    #[error("heap corrupted at offset {offset:#x}: {reason}")]
    InternalInconsistency { offset: usize, reason: &'static str },

    #[error("invalid heap size {mem_size}: {reason}")]
    InvalidConfig { mem_size: usize, reason: &'static str },

    #[error("failed to map the arena: {0}")]
    Map(#[from] std::io::Error),

    #[error("the process heap could not be initialized")]
    Unavailable,

    /// A thread panicked while holding the heap lock, which only happens when
    /// a header points outside the arena
    #[error("heap lock poisoned, the heap may be corrupted")]
    Poisoned,
}

pub type Result<T> = core::result::Result<T, AllocError>;
