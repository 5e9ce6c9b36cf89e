use core::ptr::{self, NonNull};
use core::slice;
use std::io;

use lazy_static::lazy_static;
use log::{error, trace};

use crate::error::Result;

lazy_static! {
    pub static ref PAGE_SIZE: usize = page_size();
}

fn page_size() -> usize {
    match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
        size if size > 0 => size as usize,
        _ => 4096,
    }
}

pub const WORD_SIZE: usize = size_of::<u64>();

/// A fixed region of anonymous memory
/// Every access goes through an offset checked against the region length
pub struct Arena {
    base: NonNull<u8>,
    len: usize,
    mapped: usize,
}

// The mapping is owned exclusively by the arena
unsafe impl Send for Arena {}

impl Arena {
    /// Maps `len` zeroed bytes, rounded up to whole pages behind the scenes
    pub fn map(len: usize) -> Result<Self> {
        let mapped = len
            .checked_next_multiple_of(*PAGE_SIZE)
            .ok_or_else(|| io::Error::from(io::ErrorKind::OutOfMemory))?;

        let mem_ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if mem_ptr == libc::MAP_FAILED {
            let err = io::Error::last_os_error();
            error!("failed to map {mapped} bytes for the arena: {err}");
            return Err(err.into());
        }

        let base = NonNull::new(mem_ptr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        trace!("mapped arena of {len} bytes at {:p}", base);

        Ok(Arena { base, len, mapped })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether `len` bytes starting at `offset` lie inside the arena
    pub fn contains(&self, offset: usize, len: usize) -> bool {
        offset.checked_add(len).is_some_and(|end| end <= self.len)
    }

    fn check(&self, offset: usize, len: usize) {
        assert!(
            self.contains(offset, len),
            "arena access of {len} bytes at {offset:#x} is outside of {:#x} bytes",
            self.len
        );
    }

    pub fn read_word(&self, offset: usize) -> u64 {
        self.check(offset, WORD_SIZE);
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().read_unaligned() }
    }

    pub fn write_word(&mut self, offset: usize, value: u64) {
        self.check(offset, WORD_SIZE);
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<u64>()
                .write_unaligned(value)
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        self.check(offset, len);
        unsafe { slice::from_raw_parts(self.base.as_ptr().add(offset), len) }
    }

    pub fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.check(offset, len);
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr().add(offset), len) }
    }

    /// Raw pointer to `offset`, for handing payloads out through `GlobalAlloc`
    pub fn ptr_at(&self, offset: usize) -> *mut u8 {
        self.check(offset, 0);
        unsafe { self.base.as_ptr().add(offset) }
    }

    /// Offset of `ptr` inside the arena, if it points into it
    pub fn offset_of(&self, ptr: *const u8) -> Option<usize> {
        ptr.addr()
            .checked_sub(self.base.as_ptr().addr())
            .filter(|offset| *offset < self.len)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.base.as_ptr().cast(), self.mapped) };
        if ret != 0 {
            error!(
                "failed to unmap the arena at {:p}: {}",
                self.base,
                io::Error::last_os_error()
            );
        }
    }
}
