use log::error;

use crate::block::{BlockId, HEADER_SIZE};
use crate::error::{AllocError, Result};
use crate::free_list_allocator::FreeListAllocator;

pub(crate) fn inconsistency(block: BlockId, reason: &'static str) -> AllocError {
    error!("heap corrupted around block {block}: {reason}");
    AllocError::InternalInconsistency {
        offset: block.offset(),
        reason,
    }
}

impl FreeListAllocator {
    fn holds_header(&self, block: BlockId) -> bool {
        self.arena.contains(block.offset(), HEADER_SIZE)
    }

    /// Reads the free flag of `block`; ids outside of the arena are never free
    pub fn is_free(&self, block: BlockId) -> bool {
        self.holds_header(block) && self.header(block).free
    }

    /// Whether `block` can be reached from the start of the free list
    pub fn is_listed(&self, block: BlockId) -> bool {
        self.free_blocks().any(|info| info.block == block)
    }

    /// The block directly after `block` in memory, free or not
    pub fn next_neighbor(&self, block: BlockId) -> Option<BlockId> {
        if !self.holds_header(block) {
            return None;
        }

        let end = block
            .offset()
            .checked_add(HEADER_SIZE)?
            .checked_add(self.header(block).size)?;
        (end < self.arena.len()).then_some(BlockId::new(end))
    }

    /// The block directly before `block` in memory, free or not
    /// Headers carry no back pointer, so this walks from the start of the arena
    pub fn previous_neighbor(&self, block: BlockId) -> Result<Option<BlockId>> {
        if block.offset() == 0 {
            return Ok(None);
        }

        let mut current = BlockId::new(0);
        while let Some(next) = self.next_neighbor(current) {
            if next == block {
                return Ok(Some(current));
            }
            if next > block {
                break;
            }
            current = next;
        }

        Err(inconsistency(block, "no previous neighbour"))
    }

    /// The closest free block below `block` in memory
    pub fn previous_free_block(&self, block: BlockId) -> Result<Option<BlockId>> {
        let mut last_free = None;
        let mut current = Some(BlockId::new(0));

        while let Some(candidate) = current {
            if candidate == block {
                return Ok(last_free);
            }
            if candidate > block {
                break;
            }
            if self.is_free(candidate) {
                last_free = Some(candidate);
            }
            current = self.next_neighbor(candidate);
        }

        Err(inconsistency(block, "block is not on the block chain"))
    }

    /// The closest free block above `block` in memory
    /// For a free block this is its successor in the free list, which is kept
    /// in address order
    pub fn next_free_block(&self, block: BlockId) -> Option<BlockId> {
        if self.is_free(block) {
            return self.header(block).next;
        }

        let mut current = self.next_neighbor(block);
        while let Some(candidate) = current {
            if self.is_free(candidate) {
                return Some(candidate);
            }
            current = self.next_neighbor(candidate);
        }

        None
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::config::{HeapConfig, MEM_SIZE};

    /// Five 64 byte blocks followed by the free rest of the arena
    fn heap_with_five() -> (FreeListAllocator, Vec<BlockId>) {
        let mut heap = FreeListAllocator::new(HeapConfig::default()).unwrap();
        let blocks = (0..5)
            .map(|_| heap.allocate(64).unwrap().block().unwrap())
            .collect();
        (heap, blocks)
    }

    #[test]
    fn neighbours_follow_the_tiling() {
        let (heap, blocks) = heap_with_five();
        let step = HEADER_SIZE + 64;
        for (i, block) in blocks.iter().enumerate() {
            assert_eq!(block.offset(), i * step);
        }

        assert_eq!(heap.next_neighbor(blocks[0]), Some(blocks[1]));
        assert_eq!(heap.previous_neighbor(blocks[1]).unwrap(), Some(blocks[0]));
        assert_eq!(heap.previous_neighbor(blocks[0]).unwrap(), None);

        let rest = heap.next_neighbor(blocks[4]).unwrap();
        assert_eq!(rest.offset(), 5 * step);
        assert_eq!(heap.next_neighbor(rest), None);
        assert_eq!(heap.previous_neighbor(rest).unwrap(), Some(blocks[4]));
    }

    #[test]
    fn free_status_comes_from_the_header() {
        let (mut heap, blocks) = heap_with_five();
        heap.deallocate(blocks[1].handle()).unwrap();

        assert!(heap.is_free(blocks[1]));
        assert!(heap.is_listed(blocks[1]));
        assert!(!heap.is_free(blocks[2]));
        assert!(!heap.is_listed(blocks[2]));
        assert!(!heap.is_free(BlockId::new(MEM_SIZE)));
        assert!(!heap.is_free(BlockId::new(usize::MAX)));
    }

    #[test]
    fn free_blocks_around_a_block() {
        let (mut heap, blocks) = heap_with_five();
        let rest = heap.next_neighbor(blocks[4]).unwrap();
        heap.deallocate(blocks[1].handle()).unwrap();

        assert_eq!(heap.previous_free_block(blocks[3]).unwrap(), Some(blocks[1]));
        assert_eq!(heap.previous_free_block(blocks[1]).unwrap(), None);
        assert_eq!(heap.previous_free_block(blocks[0]).unwrap(), None);

        assert_eq!(heap.next_free_block(blocks[0]), Some(blocks[1]));
        assert_eq!(heap.next_free_block(blocks[1]), Some(rest));
        assert_eq!(heap.next_free_block(blocks[2]), Some(rest));
        assert_eq!(heap.next_free_block(rest), None);
    }

    #[test]
    fn no_free_block_past_a_full_arena() {
        let mut heap = FreeListAllocator::new(HeapConfig::default()).unwrap();
        let all = heap.allocate(heap.capacity()).unwrap();
        let block = all.block().unwrap();

        assert_eq!(heap.next_neighbor(block), None);
        assert_eq!(heap.next_free_block(block), None);
        assert_eq!(heap.previous_free_block(block).unwrap(), None);
    }

    #[test]
    fn stray_ids_are_reported() {
        let (heap, blocks) = heap_with_five();
        let inside = BlockId::new(blocks[1].offset() + 8);

        assert!(matches!(
            heap.previous_neighbor(inside),
            Err(AllocError::InternalInconsistency { .. })
        ));
        assert!(matches!(
            heap.previous_free_block(inside),
            Err(AllocError::InternalInconsistency { .. })
        ));
    }

    #[test]
    fn overwritten_size_breaks_the_chain() {
        let (mut heap, blocks) = heap_with_five();
        let mut header = heap.header(blocks[0]);
        header.size = 1000;
        heap.write_header(blocks[0], header);

        assert!(matches!(
            heap.previous_neighbor(blocks[2]),
            Err(AllocError::InternalInconsistency { .. })
        ));
    }
}
