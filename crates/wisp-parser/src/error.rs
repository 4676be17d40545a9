//! Error types for the parser and validator.

use thiserror::Error;

use crate::types::WispValueType;

/// Reasons a binary fails to decode or validate.
///
/// Parsing fails closed: when any of these is returned no module exists.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WispParseError {
    #[error("unexpected end of input at offset {offset}")]
    UnexpectedEof { offset: usize },

    #[error("invalid magic number")]
    InvalidMagic,

    #[error("unsupported binary version {0}")]
    InvalidVersion(u32),

    /// LEB128 integer too long or with non-zero unused bits.
    #[error("malformed integer encoding at offset {offset}")]
    IntegerOverflow { offset: usize },

    #[error("unknown section id {0}")]
    InvalidSectionId(u8),

    #[error("section {id} is duplicated or out of order")]
    SectionOutOfOrder { id: u8 },

    #[error("section {id} declared {declared} bytes but {consumed} were consumed")]
    SectionSizeMismatch {
        id: u8,
        declared: usize,
        consumed: usize,
    },

    #[error("invalid value type 0x{0:02x}")]
    InvalidValueType(u8),

    #[error("invalid opcode 0x{opcode:02x} at offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("malformed {what} at offset {offset}")]
    Malformed { what: &'static str, offset: usize },

    #[error("invalid UTF-8 name at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("function section declares {func_count} functions, code section {code_count}")]
    FuncCodeMismatch { func_count: u32, code_count: u32 },

    #[error("duplicate export name {0:?}")]
    DuplicateExport(String),

    #[error("{space} index {index} out of bounds (count {count})")]
    IndexOutOfBounds {
        space: &'static str,
        index: u32,
        count: u32,
    },

    #[error("invalid limits: {0}")]
    InvalidLimits(&'static str),

    #[error("invalid constant expression: {0}")]
    InvalidConstExpr(&'static str),

    #[error("type mismatch in function {func_idx}: {message}")]
    TypeMismatch { func_idx: u32, message: String },

    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),

    #[error("function {func_idx} declares too many locals")]
    TooManyLocals { func_idx: u32 },

    #[error("trailing bytes after {0}")]
    TrailingBytes(&'static str),
}

impl WispParseError {
    pub(crate) fn type_mismatch(
        func_idx: u32,
        expected: Option<WispValueType>,
        got: Option<WispValueType>,
    ) -> Self {
        let show = |t: Option<WispValueType>| {
            t.map_or_else(|| "nothing".to_string(), |t| t.to_string())
        };
        WispParseError::TypeMismatch {
            func_idx,
            message: format!("expected {}, got {}", show(expected), show(got)),
        }
    }
}

pub type Result<T> = core::result::Result<T, WispParseError>;
