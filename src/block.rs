use core::fmt;

use crate::arena::{Arena, WORD_SIZE};

/// Every payload size is rounded up to this, and every payload starts on it
pub const ALIGNMENT: usize = 8;

/// size, next, prev
pub const HEADER_SIZE: usize = 3 * WORD_SIZE;

/// The most significant bit of the size word marks a free block
const FREE_BIT: u64 = 1 << 63;
const NIL: u64 = u64::MAX;

/// Largest size a header can describe without touching the free bit
pub const MAX_BLOCK_SIZE: usize = (FREE_BIT - 1) as usize;

const SIZE_WORD: usize = 0;
const NEXT_WORD: usize = WORD_SIZE;
const PREV_WORD: usize = 2 * WORD_SIZE;

/// Rounds `size` up to the next multiple of [`ALIGNMENT`], `None` on overflow
pub const fn round_up(size: usize) -> Option<usize> {
    match size.checked_add(ALIGNMENT - 1) {
        Some(size) => Some(size & !(ALIGNMENT - 1)),
        None => None,
    }
}

/// Offset of a block header inside the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(usize);

impl BlockId {
    pub(crate) const fn new(offset: usize) -> Self {
        BlockId(offset)
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    pub const fn handle(self) -> Handle {
        Handle(self.0 + HEADER_SIZE)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Offset of a payload inside the arena, as handed out by `allocate`
/// No payload can start at offset 0, which makes it the null handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(usize);

impl Handle {
    pub const fn null() -> Handle {
        Handle(0)
    }

    pub const fn from_offset(offset: usize) -> Handle {
        Handle(offset)
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn offset(self) -> usize {
        self.0
    }

    /// The header this handle would belong to
    pub const fn block(self) -> Option<BlockId> {
        match self.0.checked_sub(HEADER_SIZE) {
            Some(offset) => Some(BlockId(offset)),
            None => None,
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Decoded block header
/// `next` and `prev` are free-list links and only mean something while `free` is set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub size: usize,
    pub free: bool,
    pub next: Option<BlockId>,
    pub prev: Option<BlockId>,
}

impl Header {
    pub fn free(size: usize, next: Option<BlockId>, prev: Option<BlockId>) -> Header {
        Header {
            size,
            free: true,
            next,
            prev,
        }
    }

    pub fn used(size: usize) -> Header {
        Header {
            size,
            free: false,
            next: None,
            prev: None,
        }
    }

    pub(crate) fn read(arena: &Arena, block: BlockId) -> Header {
        let size = arena.read_word(block.0 + SIZE_WORD);
        Header {
            size: (size & !FREE_BIT) as usize,
            free: size & FREE_BIT != 0,
            next: decode_link(arena.read_word(block.0 + NEXT_WORD)),
            prev: decode_link(arena.read_word(block.0 + PREV_WORD)),
        }
    }

    pub(crate) fn write(&self, arena: &mut Arena, block: BlockId) {
        debug_assert!(self.size <= MAX_BLOCK_SIZE);
        let flag = if self.free { FREE_BIT } else { 0 };
        arena.write_word(block.0 + SIZE_WORD, self.size as u64 | flag);
        arena.write_word(block.0 + NEXT_WORD, encode_link(self.next));
        arena.write_word(block.0 + PREV_WORD, encode_link(self.prev));
    }
}

fn encode_link(link: Option<BlockId>) -> u64 {
    link.map_or(NIL, |block| block.0 as u64)
}

fn decode_link(word: u64) -> Option<BlockId> {
    (word != NIL).then_some(BlockId(word as usize))
}
