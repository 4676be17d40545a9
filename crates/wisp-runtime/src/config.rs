//! Runtime policy limits.

/// WebAssembly page size in bytes (64 KiB).
pub const PAGE_SIZE: usize = 65536;

/// Deepest call depth a call may run at. A call at a greater depth traps.
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 2048;

/// Default cap on linear memory size: 4096 pages, i.e. 256 MiB.
pub const DEFAULT_MEMORY_PAGES_LIMIT: u32 = 4096;

/// Default cap on table size: 1 Mi slots.
pub const DEFAULT_TABLE_ELEMENTS_LIMIT: u32 = 1 << 20;

/// Limits applied to an instance for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WispConfig {
    /// Calls at a depth above this trap with `CallStackExhausted`.
    pub max_call_depth: u32,
    /// Hard cap on memory pages, applied on top of the declared maximum both
    /// at instantiation and on `memory.grow`.
    pub memory_pages_limit: u32,
    /// Hard cap on table slots, applied like `memory_pages_limit`.
    pub table_elements_limit: u32,
}

impl WispConfig {
    pub fn new(max_call_depth: u32, memory_pages_limit: u32, table_elements_limit: u32) -> Self {
        Self {
            max_call_depth,
            memory_pages_limit,
            table_elements_limit,
        }
    }
}

impl Default for WispConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_CALL_DEPTH,
            DEFAULT_MEMORY_PAGES_LIMIT,
            DEFAULT_TABLE_ELEMENTS_LIMIT,
        )
    }
}
