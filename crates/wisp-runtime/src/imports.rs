//! Import lists for module instantiation.
//!
//! The embedder provides imports as `WispImports`. Functions and globals are
//! matched positionally, in the order the module declares imports of that
//! kind; memory and table imports are moved into the instance.

use crate::func::WispExternalFunction;
use crate::global::WispGlobalInst;
use crate::memory::WispMemInst;
use crate::table::WispTableInst;

/// Host-provided imports for module instantiation.
#[derive(Debug, Default)]
pub struct WispImports {
    pub(crate) functions: Vec<WispExternalFunction>,
    pub(crate) globals: Vec<WispGlobalInst>,
    pub(crate) memory: Option<WispMemInst>,
    pub(crate) table: Option<WispTableInst>,
}

impl WispImports {
    /// Create a new empty import set.
    pub fn new() -> Self {
        Self::default()
    }

    /// An import set holding only functions, in declaration order.
    pub fn from_functions(functions: Vec<WispExternalFunction>) -> Self {
        Self {
            functions,
            ..Self::default()
        }
    }

    /// Append the next imported function.
    pub fn add_func(&mut self, func: WispExternalFunction) -> &mut Self {
        self.functions.push(func);
        self
    }

    /// Append the next imported global.
    pub fn add_global(&mut self, global: WispGlobalInst) -> &mut Self {
        self.globals.push(global);
        self
    }

    /// Provide the imported memory.
    pub fn set_memory(&mut self, mem: WispMemInst) -> &mut Self {
        self.memory = Some(mem);
        self
    }

    /// Provide the imported table.
    pub fn set_table(&mut self, table: WispTableInst) -> &mut Self {
        self.table = Some(table);
        self
    }

    pub fn functions(&self) -> &[WispExternalFunction] {
        &self.functions
    }
}
