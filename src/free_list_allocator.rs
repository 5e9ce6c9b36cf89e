use log::{debug, warn};

use crate::arena::Arena;
use crate::block::{ALIGNMENT, BlockId, HEADER_SIZE, Handle, Header};
use crate::config::HeapConfig;
use crate::error::{AllocError, HandleFault, Result};

// Headers are inlined to the arena
// Only a single arena is ever mapped and requests past it fail
// Free blocks form a doubly linked list kept in address order, and a released
// block is merged with its free neighbours right away
pub struct FreeListAllocator {
    pub(crate) arena: Arena,
    pub(crate) free_list_start: Option<BlockId>,
}

impl FreeListAllocator {
    pub fn new(config: HeapConfig) -> Result<Self> {
        const {
            assert!(HEADER_SIZE % ALIGNMENT == 0);
        }
        config.validate()?;

        let arena = Arena::map(config.mem_size)?;
        let mut heap = FreeListAllocator {
            arena,
            free_list_start: None,
        };
        heap.init();
        debug!(
            "heap of {} bytes ready, {} usable",
            heap.mem_size(),
            heap.capacity()
        );

        Ok(heap)
    }

    /// Forgets every allocation and goes back to a single free block
    pub fn reset(&mut self) {
        debug!("resetting heap");
        self.init();
    }

    fn init(&mut self) {
        let first = BlockId::new(0);
        self.write_header(first, Header::free(self.capacity(), None, None));
        self.free_list_start = Some(first);
    }

    pub fn mem_size(&self) -> usize {
        self.arena.len()
    }

    /// Payload size of the initial block, the largest request that can ever succeed
    pub fn capacity(&self) -> usize {
        self.arena.len() - HEADER_SIZE
    }

    pub fn free_list_start(&self) -> Option<BlockId> {
        self.free_list_start
    }

    pub fn payload(&self, handle: Handle) -> Result<&[u8]> {
        let block = self.find_block(handle)?;
        let size = self.header(block).size;
        Ok(self.arena.slice(handle.offset(), size))
    }

    pub fn payload_mut(&mut self, handle: Handle) -> Result<&mut [u8]> {
        let block = self.find_block(handle)?;
        let size = self.header(block).size;
        Ok(self.arena.slice_mut(handle.offset(), size))
    }

    /// Bytes reserved for `handle`, at least what was requested
    pub fn usable_size(&self, handle: Handle) -> Result<usize> {
        let block = self.find_block(handle)?;
        Ok(self.header(block).size)
    }

    pub(crate) fn payload_ptr(&self, handle: Handle) -> *mut u8 {
        self.arena.ptr_at(handle.offset())
    }

    pub(crate) fn header(&self, block: BlockId) -> Header {
        Header::read(&self.arena, block)
    }

    pub(crate) fn write_header(&mut self, block: BlockId, header: Header) {
        header.write(&mut self.arena, block);
    }

    /// Finds the occupied block whose payload starts at `handle`
    pub(crate) fn find_block(&self, handle: Handle) -> Result<BlockId> {
        let fault = |reason| {
            warn!("rejecting handle {handle}: {reason}");
            AllocError::InvalidHandle { handle, reason }
        };

        if handle.is_null() {
            return Err(fault(HandleFault::Null));
        }
        if handle.offset() >= self.arena.len() {
            return Err(fault(HandleFault::OutOfBounds));
        }
        let Some(target) = handle.block() else {
            return Err(fault(HandleFault::Unowned));
        };

        let mut current = Some(BlockId::new(0));
        while let Some(block) = current {
            if block == target {
                if self.header(block).free {
                    return Err(fault(HandleFault::AlreadyFree));
                }
                return Ok(block);
            }
            if block > target {
                break;
            }
            current = self.next_neighbor(block);
        }

        Err(fault(HandleFault::Unowned))
    }

    /// Points the free-list neighbours `prev` and `next` at `block`
    /// The links inside `block` itself have to be written by the caller
    pub(crate) fn link(&mut self, block: BlockId, prev: Option<BlockId>, next: Option<BlockId>) {
        match prev {
            Some(prev) => self.set_next(prev, Some(block)),
            None => self.free_list_start = Some(block),
        }
        if let Some(next) = next {
            self.set_prev(next, Some(block));
        }
    }

    /// Takes `block` out of the free list and joins its neighbours
    pub(crate) fn unlink(&mut self, block: BlockId) {
        let Header { next, prev, .. } = self.header(block);
        match prev {
            Some(prev) => self.set_next(prev, next),
            None => self.free_list_start = next,
        }
        if let Some(next) = next {
            self.set_prev(next, prev);
        }
    }

    fn set_next(&mut self, block: BlockId, next: Option<BlockId>) {
        let mut header = self.header(block);
        header.next = next;
        self.write_header(block, header);
    }

    fn set_prev(&mut self, block: BlockId, prev: Option<BlockId>) {
        let mut header = self.header(block);
        header.prev = prev;
        self.write_header(block, header);
    }
}
