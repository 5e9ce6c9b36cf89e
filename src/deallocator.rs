use log::debug;

use crate::block::{HEADER_SIZE, Handle, Header};
use crate::error::Result;
use crate::free_list_allocator::FreeListAllocator;

impl FreeListAllocator {
    /// Returns the block behind `handle` to the free list, merging it with
    /// whichever of its neighbours in memory are free
    ///
    /// Null, foreign and already freed handles are rejected and leave the
    /// heap untouched.
    pub fn deallocate(&mut self, handle: Handle) -> Result<()> {
        let block = self.find_block(handle)?;
        let this = self.header(block);

        let previous = self.previous_neighbor(block)?.filter(|b| self.is_free(*b));
        let next = self.next_neighbor(block).filter(|b| self.is_free(*b));

        match (previous, next) {
            (Some(previous), Some(next)) => {
                debug!("free {block}: merging with {previous} and {next}");
                let next_size = self.header(next).size;
                self.unlink(next);

                let mut merged = self.header(previous);
                merged.size += this.size + next_size + 2 * HEADER_SIZE;
                self.write_header(previous, merged);
            }
            (Some(previous), None) => {
                debug!("free {block}: merging into {previous}");
                let mut merged = self.header(previous);
                merged.size += this.size + HEADER_SIZE;
                self.write_header(previous, merged);
            }
            (None, Some(next)) => {
                debug!("free {block}: absorbing {next}");
                let absorbed = self.header(next);
                self.write_header(
                    block,
                    Header::free(
                        this.size + absorbed.size + HEADER_SIZE,
                        absorbed.next,
                        absorbed.prev,
                    ),
                );
                self.link(block, absorbed.prev, absorbed.next);
            }
            (None, None) => {
                // Insert behind the closest free block below, keeping the list in address order
                let prev = self.previous_free_block(block)?;
                let next = match prev {
                    Some(prev) => self.header(prev).next,
                    None => self.free_list_start,
                };
                debug!("free {block}: no free neighbours, linking after {prev:?}");

                self.write_header(block, Header::free(this.size, next, prev));
                self.link(block, prev, next);
            }
        }

        Ok(())
    }
}
