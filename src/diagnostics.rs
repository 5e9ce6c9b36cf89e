use core::fmt;

use log::trace;

use crate::block::{ALIGNMENT, BlockId, HEADER_SIZE};
use crate::error::Result;
use crate::free_list_allocator::FreeListAllocator;
use crate::navigator::inconsistency;

/// One block as seen by the diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub block: BlockId,
    pub size: usize,
    pub free: bool,
    /// Successor in the free list, only set for free blocks
    pub next: Option<BlockId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub blocks: usize,
    pub used_blocks: usize,
    pub free_blocks: usize,
    /// Payload bytes of occupied blocks
    pub used_bytes: usize,
    /// Payload bytes of free blocks
    pub free_bytes: usize,
    pub largest_free: usize,
}

/// Every block in address order
pub struct Blocks<'a> {
    heap: &'a FreeListAllocator,
    current: Option<BlockId>,
}

impl Iterator for Blocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let block = self.current?;
        let info = self.heap.info(block);
        self.current = self.heap.next_neighbor(block);
        Some(info)
    }
}

/// Free blocks in free-list order
/// Stops after as many steps as the arena could hold blocks, so a corrupted
/// list with a cycle cannot keep it spinning
pub struct FreeBlocks<'a> {
    heap: &'a FreeListAllocator,
    current: Option<BlockId>,
    steps_left: usize,
}

impl Iterator for FreeBlocks<'_> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<BlockInfo> {
        let block = self.current?;
        if self.steps_left == 0 {
            return None;
        }
        self.steps_left -= 1;

        let info = self.heap.info(block);
        self.current = info.next;
        Some(info)
    }
}

/// Prints the free list, one line per block
pub struct FreeList<'a>(&'a FreeListAllocator);

impl FreeListAllocator {
    fn info(&self, block: BlockId) -> BlockInfo {
        let header = self.header(block);
        BlockInfo {
            block,
            size: header.size,
            free: header.free,
            next: header.next.filter(|_| header.free),
        }
    }

    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            heap: self,
            current: Some(BlockId::new(0)),
        }
    }

    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            heap: self,
            current: self.free_list_start,
            steps_left: self.arena.len() / HEADER_SIZE + 1,
        }
    }

    pub fn free_list(&self) -> FreeList<'_> {
        FreeList(self)
    }

    pub fn stats(&self) -> HeapStats {
        self.blocks().fold(HeapStats::default(), |mut stats, info| {
            stats.blocks += 1;
            if info.free {
                stats.free_blocks += 1;
                stats.free_bytes += info.size;
                stats.largest_free = stats.largest_free.max(info.size);
            } else {
                stats.used_blocks += 1;
                stats.used_bytes += info.size;
            }
            stats
        })
    }

    /// Checks every invariant the heap relies on:
    /// the blocks tile the arena, sizes are whole words, no two free blocks
    /// touch, and the free list holds exactly the free blocks in address order
    /// with matching back links
    pub fn verify(&self) -> Result<()> {
        let mut free_in_order = Vec::new();
        let mut previous_free = false;
        let mut end = 0;

        let mut current = Some(BlockId::new(0));
        while let Some(block) = current {
            if !self.arena.contains(block.offset(), HEADER_SIZE) {
                return Err(inconsistency(block, "header runs past the arena"));
            }
            let header = self.header(block);
            if header.size % ALIGNMENT != 0 {
                return Err(inconsistency(block, "size is not a multiple of 8"));
            }
            if header.free {
                if previous_free {
                    return Err(inconsistency(block, "two free blocks are adjacent"));
                }
                free_in_order.push(block);
            }

            previous_free = header.free;
            end = block.offset().saturating_add(HEADER_SIZE + header.size);
            current = self.next_neighbor(block);
        }
        if end != self.arena.len() {
            return Err(inconsistency(
                BlockId::new(end),
                "last block does not end at the arena end",
            ));
        }

        let mut listed = 0;
        let mut prev = None;
        let mut current = self.free_list_start;
        while let Some(block) = current {
            let Some(expected) = free_in_order.get(listed) else {
                return Err(inconsistency(block, "free list is longer than the free blocks"));
            };
            if block != *expected {
                return Err(inconsistency(block, "free list is out of address order"));
            }
            let header = self.header(block);
            if header.prev != prev {
                return Err(inconsistency(block, "free list back link is broken"));
            }

            listed += 1;
            prev = Some(block);
            current = header.next;
        }
        if listed != free_in_order.len() {
            return Err(inconsistency(
                free_in_order[listed],
                "free block is missing from the free list",
            ));
        }

        trace!("heap verified, {} free blocks", listed);
        Ok(())
    }
}

const RULE: &str = "|------+----------+----------+----------+----------|";

impl fmt::Display for FreeListAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{RULE}")?;
        writeln!(
            f,
            "| {:<4} | {:<8} | {:<8} | {:<8} | {:<8} |",
            "ID", "START", "SIZE", "NEXT", "TYPE"
        )?;
        writeln!(f, "{RULE}")?;

        for (id, info) in self.blocks().enumerate() {
            let next = info.next.map_or_else(|| "-".to_string(), |b| b.to_string());
            let kind = if info.free { "FREE" } else { "OCCUPIED" };
            writeln!(
                f,
                "| {id:<4} | {:<8} | {:<8} | {next:<8} | {kind:<8} |",
                info.block.to_string(),
                info.size
            )?;
        }

        write!(f, "{RULE}")
    }
}

impl fmt::Display for FreeList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, info) in self.0.free_blocks().enumerate() {
            let next = info.next.map_or_else(|| "-".to_string(), |b| b.to_string());
            writeln!(f, "{}: {} at {} (next {next})", i + 1, info.size, info.block)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::block::Header;
    use crate::config::HeapConfig;
    use crate::error::AllocError;

    fn heap() -> FreeListAllocator {
        FreeListAllocator::new(HeapConfig::default()).unwrap()
    }

    fn corrupted(heap: &FreeListAllocator) -> bool {
        matches!(heap.verify(), Err(AllocError::InternalInconsistency { .. }))
    }

    #[test]
    fn table_lists_every_block() {
        let mut heap = heap();
        let one = heap.allocate(20).unwrap();
        heap.allocate(100).unwrap();
        heap.deallocate(one).unwrap();

        let table = heap.to_string();
        let rows: Vec<_> = table.lines().skip(3).take(3).collect();
        assert!(rows[0].starts_with("| 0    | 0x0000   | 24       | 0x00b0"));
        assert!(rows[0].ends_with("| FREE     |"));
        assert!(rows[1].starts_with("| 1    | 0x0030   | 104      | -"));
        assert!(rows[1].ends_with("| OCCUPIED |"));
        assert!(rows[2].ends_with("| FREE     |"));
        assert_eq!(table.lines().count(), 7);
    }

    #[test]
    fn rendering_twice_gives_the_same_text() {
        let mut heap = heap();
        let one = heap.allocate(64).unwrap();
        heap.allocate(64).unwrap();
        heap.deallocate(one).unwrap();

        assert_eq!(heap.to_string(), heap.to_string());
        assert_eq!(heap.free_list().to_string(), heap.free_list().to_string());
        assert_eq!(
            heap.blocks().collect::<Vec<_>>(),
            heap.blocks().collect::<Vec<_>>()
        );
    }

    #[test]
    fn free_list_lines() {
        let mut heap = heap();
        let one = heap.allocate(8).unwrap();
        heap.allocate(8).unwrap();
        heap.deallocate(one).unwrap();

        let text = heap.free_list().to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "1: 8 at 0x0000 (next 0x0040)");
        assert!(lines[1].starts_with("2: "));
        assert!(lines[1].ends_with("(next -)"));
    }

    #[test]
    fn stats_add_up() {
        let mut heap = heap();
        assert_eq!(
            heap.stats(),
            HeapStats {
                blocks: 1,
                free_blocks: 1,
                free_bytes: heap.capacity(),
                largest_free: heap.capacity(),
                ..HeapStats::default()
            }
        );

        heap.allocate(100).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.blocks, 2);
        assert_eq!(stats.used_bytes, 104);
        assert_eq!(stats.free_bytes, heap.capacity() - 104 - HEADER_SIZE);
        assert_eq!(stats.largest_free, stats.free_bytes);
    }

    #[test]
    fn verify_catches_unlisted_free_block() {
        let mut heap = heap();
        let one = heap.allocate(64).unwrap().block().unwrap();
        heap.allocate(64).unwrap();
        heap.write_header(one, Header::free(64, None, None));

        assert!(corrupted(&heap));
    }

    #[test]
    fn verify_catches_adjacent_free_blocks() {
        let mut heap = heap();
        heap.allocate(64).unwrap();
        let two = heap.allocate(64).unwrap().block().unwrap();
        heap.write_header(two, Header::free(64, None, None));

        assert!(corrupted(&heap));
    }

    #[test]
    fn verify_catches_a_cycle() {
        let mut heap = heap();
        heap.allocate(64).unwrap();
        let rest = heap.free_list_start().unwrap();
        let mut header = heap.header(rest);
        header.next = Some(rest);
        heap.write_header(rest, header);

        assert!(corrupted(&heap));
        assert_eq!(heap.free_blocks().count(), heap.mem_size() / HEADER_SIZE + 1);
    }

    #[test]
    fn verify_catches_a_broken_tiling() {
        let mut heap = heap();
        let one = heap.allocate(64).unwrap().block().unwrap();
        heap.allocate(64).unwrap();
        heap.write_header(one, Header::used(72));

        assert!(corrupted(&heap));
    }
}
