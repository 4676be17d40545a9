//! Call outcomes.

pub use wisp_parser::WispValue;

use crate::error::WispTrap;

/// The outcome of one call: a trap, a normal return without a value, or a
/// normal return carrying one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WispExecutionResult {
    Trap(WispTrap),
    Void,
    Value(WispValue),
}

impl WispExecutionResult {
    #[inline]
    pub fn trapped(&self) -> bool {
        matches!(self, WispExecutionResult::Trap(_))
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        matches!(self, WispExecutionResult::Value(_))
    }

    /// The returned value, if the call returned one.
    #[inline]
    pub fn value(&self) -> Option<WispValue> {
        match self {
            WispExecutionResult::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// The trap, if the call trapped.
    #[inline]
    pub fn trap(&self) -> Option<WispTrap> {
        match self {
            WispExecutionResult::Trap(t) => Some(*t),
            _ => None,
        }
    }
}

impl From<WispTrap> for WispExecutionResult {
    fn from(trap: WispTrap) -> Self {
        WispExecutionResult::Trap(trap)
    }
}

impl From<WispValue> for WispExecutionResult {
    fn from(value: WispValue) -> Self {
        WispExecutionResult::Value(value)
    }
}

impl From<Option<WispValue>> for WispExecutionResult {
    fn from(value: Option<WispValue>) -> Self {
        value.map_or(WispExecutionResult::Void, WispExecutionResult::Value)
    }
}
