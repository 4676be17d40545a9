//! Wisp Parser - decoder and validator for WebAssembly binaries
//!
//! Turns an untrusted binary into a [`WispModule`] whose every function body
//! has been type-checked, or fails with a [`WispParseError`]. Nothing is
//! executed here; the runtime crate instantiates and runs modules.
//!
//! # Features
//!
//! - `parallel`: Validate function bodies in parallel with Rayon

pub mod error;
pub mod instructions;
pub mod module;
pub mod parser;
pub mod reader;
pub mod types;
pub mod validator;
pub mod value;

pub use error::WispParseError;
pub use instructions::{
    WispConstExpr, WispInstr, WispLoadKind, WispMemArg, WispNumOp, WispStoreKind,
};
pub use module::{WispCode, WispDataSegment, WispElementSegment, WispGlobal, WispModule};
pub use parser::{parse, validate, MAX_MEMORY_PAGES};
pub use types::{
    WispExport, WispExternalKind, WispFuncType, WispGlobalType, WispImport, WispImportDesc,
    WispLimits, WispValueType,
};
pub use value::WispValue;
