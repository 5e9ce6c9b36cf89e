use log::{debug, trace, warn};

use crate::block::{BlockId, HEADER_SIZE, Handle, Header, round_up};
use crate::error::{AllocError, Result};
use crate::free_list_allocator::FreeListAllocator;

impl FreeListAllocator {
    /// Reserves at least `requested` bytes, rounded up to a multiple of 8
    ///
    /// The first block of the free list that is large enough is used. It is
    /// split when the rest can hold a header and at least one word, otherwise
    /// the whole block is handed out.
    pub fn allocate(&mut self, requested: usize) -> Result<Handle> {
        let out_of_memory = || {
            warn!("no suitable free block for {requested} bytes");
            AllocError::OutOfMemory { requested }
        };

        let padded = round_up(requested).ok_or_else(out_of_memory)?;
        let block = self.find_free_block(padded).ok_or_else(out_of_memory)?;
        let chosen = self.header(block);

        let remainder = chosen.size - padded;
        if remainder > HEADER_SIZE {
            let rest = BlockId::new(block.offset() + HEADER_SIZE + padded);
            debug!(
                "allocate {requested}: splitting block {block} of {} bytes, {} left at {rest}",
                chosen.size,
                remainder - HEADER_SIZE
            );

            // The rest takes the place of the chosen block in the free list
            self.write_header(
                rest,
                Header::free(remainder - HEADER_SIZE, chosen.next, chosen.prev),
            );
            self.link(rest, chosen.prev, chosen.next);
            self.write_header(block, Header::used(padded));
        } else {
            debug!(
                "allocate {requested}: handing out all of block {block} ({} bytes)",
                chosen.size
            );

            self.unlink(block);
            self.write_header(block, Header::used(chosen.size));
        }

        Ok(block.handle())
    }

    /// First block in free-list order with at least `size` bytes
    fn find_free_block(&self, size: usize) -> Option<BlockId> {
        let mut current = self.free_list_start;
        while let Some(block) = current {
            let header = self.header(block);
            if header.size >= size {
                return Some(block);
            }
            trace!("block {block} of {} bytes is too small", header.size);
            current = header.next;
        }

        None
    }
}
