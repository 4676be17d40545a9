//! Wisp Runtime - A safe, minimal WebAssembly interpreter
//!
//! This crate instantiates and executes modules produced by `wisp-parser`.
//! Its main entry points are [`instantiate`] and [`execute`]; the parser's
//! public types are re-exported so an embedder only needs this crate.
//!
//! # Features
//!
//! - `parallel`: Validate function bodies in parallel with Rayon
//!
//! # Example
//!
//! ```ignore
//! let module = wisp_runtime::parse(&bytes)?;
//! let mut instance = wisp_runtime::instantiate(module, WispImports::new())?;
//! let func = instance.find_exported_function("run").unwrap();
//! let result = wisp_runtime::execute(&mut instance, func, &[], 0);
//! ```

pub mod config;
pub mod error;
pub mod execute;
pub mod func;
pub mod global;
pub mod imports;
pub mod instance;
pub mod memory;
mod numeric;
pub mod table;
pub mod type_convert;
pub mod values;

// Re-export key types
pub use config::{
    WispConfig, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MEMORY_PAGES_LIMIT, DEFAULT_TABLE_ELEMENTS_LIMIT,
    PAGE_SIZE,
};
pub use error::{WispInstantiationError, WispTrap};
pub use execute::execute;
pub use func::{WispExternalFunction, WispHostFunc};
pub use global::WispGlobalInst;
pub use imports::WispImports;
pub use instance::{instantiate, instantiate_with_config, WispInstance};
pub use memory::WispMemInst;
pub use table::WispTableInst;
pub use values::{WispExecutionResult, WispValue};

pub use wisp_parser::{
    parse, validate, WispExport, WispExternalKind, WispFuncType, WispGlobalType, WispLimits,
    WispModule, WispParseError, WispValueType,
};
