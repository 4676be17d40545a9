//! Error types for the Wisp runtime.

use thiserror::Error;

use wisp_parser::{WispFuncType, WispLimits, WispValueType};

/// Errors that can occur during module instantiation.
///
/// Instantiation either yields a complete instance or one of these; a
/// partially initialized instance is never handed out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WispInstantiationError {
    /// Wrong number of imports of one kind supplied
    #[error("module requires {expected} imported {kind}(s), {provided} provided")]
    ImportCountMismatch {
        kind: &'static str,
        expected: usize,
        provided: usize,
    },
    /// Imported function signature mismatch
    #[error("import {module}.{name}: expected type {expected}, got {got}")]
    FunctionTypeMismatch {
        module: String,
        name: String,
        expected: WispFuncType,
        got: WispFuncType,
    },
    /// Imported global type mismatch
    #[error("import {module}.{name}: expected global of type {expected}, got {got}")]
    GlobalTypeMismatch {
        module: String,
        name: String,
        expected: WispValueType,
        got: WispValueType,
    },
    /// Imported memory or table does not satisfy the declared limits
    #[error("import {module}.{name}: limits {got:?} do not satisfy {expected:?}")]
    LimitsMismatch {
        module: String,
        name: String,
        expected: WispLimits,
        got: WispLimits,
    },
    /// Memory allocation failed
    #[error("cannot allocate memory of {requested_pages} pages (limit {limit})")]
    MemoryAllocationFailed { requested_pages: u32, limit: u32 },
    /// Table allocation failed
    #[error("cannot allocate table of {requested} elements (limit {limit})")]
    TableAllocationFailed { requested: u32, limit: u32 },
    /// Data segment out of bounds
    #[error("data segment {segment_idx} out of bounds: {offset}+{size} > {memory_size}")]
    DataSegmentOutOfBounds {
        segment_idx: u32,
        offset: u32,
        size: u32,
        memory_size: usize,
    },
    /// Element segment out of bounds
    #[error("element segment {segment_idx} out of bounds: {offset}+{size} > {table_size}")]
    ElementSegmentOutOfBounds {
        segment_idx: u32,
        offset: u32,
        size: u32,
        table_size: u32,
    },
    /// Start function trapped
    #[error("start function trapped: {0}")]
    StartFunctionTrapped(WispTrap),
    /// Invalid constant initializer expression
    #[error("invalid constant expression: {description}")]
    InvalidConstExpr { description: String },
}

/// Runtime trap - the uniform abnormal termination of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WispTrap {
    #[error("integer divide by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("invalid conversion to integer")]
    InvalidConversionToInteger,
    #[error("memory out of bounds: address={address}, size={size}, memory_size={memory_size}")]
    MemoryOutOfBounds {
        address: u64,
        size: u32,
        memory_size: usize,
    },
    #[error("table out of bounds: index={index}, table_size={table_size}")]
    TableOutOfBounds { index: u32, table_size: u32 },
    #[error("indirect call type mismatch: expected type {expected_type}")]
    IndirectCallTypeMismatch { expected_type: u32 },
    #[error("indirect call to uninitialized element")]
    IndirectCallToNull,
    #[error("unreachable executed")]
    Unreachable,
    #[error("call stack exhausted")]
    CallStackExhausted,
    /// Raised by a host function, or a host function returned a result
    /// that does not match its declared signature.
    #[error("host function trapped")]
    Host,
    #[error("function index {0} out of range")]
    InvalidFunctionIndex(u32),
    #[error("function expects {expected} argument(s), {provided} provided")]
    ArgumentCountMismatch { expected: usize, provided: usize },
}
