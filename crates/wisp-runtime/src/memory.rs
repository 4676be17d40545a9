//! Memory instance implementation.
//!
//! A memory instance is the runtime representation of a linear memory.
//! It holds a vector of bytes with page-granular sizing.

use wisp_parser::{WispLimits, MAX_MEMORY_PAGES};

use crate::config::PAGE_SIZE;
use crate::error::WispTrap;

/// Memory instance - runtime representation of linear memory.
///
/// The data vector always has a size that is a multiple of PAGE_SIZE and
/// never exceeds `pages_limit` pages.
#[derive(Debug, Clone)]
pub struct WispMemInst {
    /// The declared limits.
    pub type_: WispLimits,
    data: Vec<u8>,
    pages_limit: u32,
}

impl WispMemInst {
    /// Create a new memory instance with the given limits.
    ///
    /// Allocates `min` pages of zeroed memory.
    pub fn new(type_: WispLimits) -> Self {
        let size = (type_.min as usize) * PAGE_SIZE;
        Self {
            type_,
            data: vec![0u8; size],
            pages_limit: type_.max.unwrap_or(MAX_MEMORY_PAGES).min(MAX_MEMORY_PAGES),
        }
    }

    /// Lower the page limit `grow` may reach.
    pub fn with_pages_limit(mut self, limit: u32) -> Self {
        self.pages_limit = self.pages_limit.min(limit);
        self
    }

    /// Get the current size in pages.
    #[inline]
    pub fn size_pages(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    /// Get the current size in bytes.
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Maximum number of pages this memory may grow to.
    #[inline]
    pub fn pages_limit(&self) -> u32 {
        self.pages_limit
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Grow the memory by the given number of pages.
    ///
    /// Returns the previous size in pages on success, or None if growth
    /// would exceed the limit. A failed grow leaves the memory untouched.
    pub fn grow(&mut self, delta: u32) -> Option<u32> {
        let old_pages = self.size_pages();
        let new_pages = old_pages.checked_add(delta)?;
        if new_pages > self.pages_limit {
            return None;
        }

        // Extend with zeros
        let new_size = (new_pages as usize) * PAGE_SIZE;
        self.data.resize(new_size, 0);

        Some(old_pages)
    }

    fn range(&self, address: u64, size: u32) -> Result<core::ops::Range<usize>, WispTrap> {
        let trap = WispTrap::MemoryOutOfBounds {
            address,
            size,
            memory_size: self.data.len(),
        };
        let end = address.checked_add(size as u64).ok_or(trap)?;
        if end > self.data.len() as u64 {
            return Err(trap);
        }
        Ok(address as usize..end as usize)
    }

    /// Read bytes from memory.
    ///
    /// Returns a trap if any byte of `[address, address + size)` is out of
    /// bounds.
    pub fn read(&self, address: u64, size: u32) -> Result<&[u8], WispTrap> {
        let range = self.range(address, size)?;
        Ok(&self.data[range])
    }

    /// Read exactly `N` bytes from memory.
    #[inline]
    pub fn read_array<const N: usize>(&self, address: u64) -> Result<[u8; N], WispTrap> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(address, N as u32)?);
        Ok(out)
    }

    /// Write bytes to memory.
    ///
    /// Returns a trap, writing nothing, if the access is out of bounds.
    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<(), WispTrap> {
        let range = self.range(address, bytes.len() as u32)?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    /// Read an i32 from memory (little-endian).
    #[inline]
    pub fn read_i32(&self, address: u64) -> Result<i32, WispTrap> {
        Ok(i32::from_le_bytes(self.read_array(address)?))
    }

    /// Write an i32 to memory (little-endian).
    #[inline]
    pub fn write_i32(&mut self, address: u64, value: i32) -> Result<(), WispTrap> {
        self.write(address, &value.to_le_bytes())
    }

    /// Read an i64 from memory (little-endian).
    #[inline]
    pub fn read_i64(&self, address: u64) -> Result<i64, WispTrap> {
        Ok(i64::from_le_bytes(self.read_array(address)?))
    }

    /// Write an i64 to memory (little-endian).
    #[inline]
    pub fn write_i64(&mut self, address: u64, value: i64) -> Result<(), WispTrap> {
        self.write(address, &value.to_le_bytes())
    }
}
