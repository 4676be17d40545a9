//! Global instance implementation.
//!
//! A global instance is the runtime representation of a global variable.

use wisp_parser::{WispGlobalType, WispValue};

/// Global instance - runtime representation of a global variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WispGlobalInst {
    /// The global type (mutability + value type).
    pub type_: WispGlobalType,
    value: WispValue,
}

impl WispGlobalInst {
    /// Create a new global instance.
    pub fn new(type_: WispGlobalType, value: WispValue) -> Self {
        Self { type_, value }
    }

    /// Get the current value.
    #[inline]
    pub fn get(&self) -> WispValue {
        self.value
    }

    /// Set the value (only if mutable).
    ///
    /// Returns false, leaving the value unchanged, if the global is immutable.
    #[inline]
    pub fn set(&mut self, value: WispValue) -> bool {
        if !self.type_.mutable {
            return false;
        }
        self.value = value;
        true
    }

    /// Check if this global is mutable.
    #[inline]
    pub fn is_mutable(&self) -> bool {
        self.type_.mutable
    }
}
