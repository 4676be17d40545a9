//! Table instance implementation.
//!
//! A table instance is the runtime representation of a table,
//! holding function references for indirect calls.

use wisp_parser::WispLimits;

use crate::error::WispTrap;

/// Table instance - runtime representation of a `funcref` table.
///
/// Each slot is either empty (`None`) or holds an index into the function
/// index space of the owning instance's module.
#[derive(Debug, Clone)]
pub struct WispTableInst {
    /// The declared limits.
    pub type_: WispLimits,
    elem: Vec<Option<u32>>,
    elements_limit: u32,
}

impl WispTableInst {
    /// Create a new table instance with the given limits.
    ///
    /// Initializes all `min` elements to empty. Callers bound `min` first;
    /// the instantiator checks it against the configured elements limit.
    pub fn new(type_: WispLimits) -> Self {
        Self {
            type_,
            elem: vec![None; type_.min as usize],
            elements_limit: type_.max.unwrap_or(u32::MAX),
        }
    }

    /// Lower the size `grow` may reach.
    pub fn with_elements_limit(mut self, limit: u32) -> Self {
        self.elements_limit = self.elements_limit.min(limit);
        self
    }

    /// Maximum number of slots this table may grow to.
    #[inline]
    pub fn elements_limit(&self) -> u32 {
        self.elements_limit
    }

    /// Get the current size.
    #[inline]
    pub fn size(&self) -> u32 {
        self.elem.len() as u32
    }

    fn out_of_bounds(&self, index: u32) -> WispTrap {
        WispTrap::TableOutOfBounds {
            index,
            table_size: self.size(),
        }
    }

    /// Get an element at the given index.
    #[inline]
    pub fn get(&self, index: u32) -> Result<Option<u32>, WispTrap> {
        self.elem
            .get(index as usize)
            .copied()
            .ok_or_else(|| self.out_of_bounds(index))
    }

    /// Set an element at the given index.
    #[inline]
    pub fn set(&mut self, index: u32, value: Option<u32>) -> Result<(), WispTrap> {
        let trap = self.out_of_bounds(index);
        let slot = self.elem.get_mut(index as usize).ok_or(trap)?;
        *slot = value;
        Ok(())
    }

    /// Copy `func_indices` into consecutive slots starting at `offset`.
    ///
    /// Nothing is written if the range does not fit.
    pub fn init(&mut self, offset: u32, func_indices: &[u32]) -> Result<(), WispTrap> {
        let start = offset as usize;
        let end = start
            .checked_add(func_indices.len())
            .filter(|&end| end <= self.elem.len())
            .ok_or_else(|| self.out_of_bounds(offset))?;
        for (slot, &f) in self.elem[start..end].iter_mut().zip(func_indices) {
            *slot = Some(f);
        }
        Ok(())
    }

    /// Grow the table by the given number of elements.
    ///
    /// Returns the previous size on success, or None if growth would exceed
    /// the declared maximum or the elements limit.
    pub fn grow(&mut self, delta: u32, init: Option<u32>) -> Option<u32> {
        let old_size = self.size();
        let new_size = old_size.checked_add(delta)?;
        if new_size > self.elements_limit {
            return None;
        }

        self.elem.resize(new_size as usize, init);
        Some(old_size)
    }
}
