//! The validated, immutable module representation.

use crate::instructions::{WispConstExpr, WispInstr};
use crate::types::{
    WispExport, WispExternalKind, WispFuncType, WispGlobalType, WispImport, WispLimits,
    WispValueType,
};

/// Body of a locally defined function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WispCode {
    /// Declared locals, excluding parameters.
    pub local_types: Vec<WispValueType>,
    /// Decoded instructions, ending with the function's final `End`.
    pub instrs: Vec<WispInstr>,
}

/// A locally defined global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WispGlobal {
    pub global_type: WispGlobalType,
    pub init: WispConstExpr,
}

/// An active element segment targeting table 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WispElementSegment {
    pub offset: WispConstExpr,
    pub func_indices: Vec<u32>,
}

/// An active data segment targeting memory 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WispDataSegment {
    pub offset: WispConstExpr,
    pub bytes: Vec<u8>,
}

/// A parsed and validated WebAssembly module.
///
/// Only [`crate::parse`] produces a `WispModule`; its contents are never
/// mutated afterwards. Index spaces list imports first, then local
/// definitions, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct WispModule {
    pub(crate) types: Vec<WispFuncType>,
    pub(crate) imports: Vec<WispImport>,
    /// Type index of every function, imported ones first.
    pub(crate) func_type_indices: Vec<u32>,
    pub(crate) num_imported_funcs: u32,
    pub(crate) imported_globals: Vec<WispGlobalType>,
    pub(crate) imported_table: Option<WispLimits>,
    pub(crate) imported_memory: Option<WispLimits>,
    pub(crate) table: Option<WispLimits>,
    pub(crate) memory: Option<WispLimits>,
    pub(crate) globals: Vec<WispGlobal>,
    pub(crate) exports: Vec<WispExport>,
    pub(crate) start: Option<u32>,
    pub(crate) elements: Vec<WispElementSegment>,
    pub(crate) codes: Vec<WispCode>,
    pub(crate) data: Vec<WispDataSegment>,
}

impl WispModule {
    /// The type section.
    pub fn types(&self) -> &[WispFuncType] {
        &self.types
    }

    /// All import declarations, in order.
    pub fn imports(&self) -> &[WispImport] {
        &self.imports
    }

    /// Total number of functions, imported and local.
    pub fn num_functions(&self) -> u32 {
        self.func_type_indices.len() as u32
    }

    pub fn num_imported_functions(&self) -> u32 {
        self.num_imported_funcs
    }

    /// Signature of the function at `func_idx` in the function index space.
    pub fn func_type(&self, func_idx: u32) -> Option<&WispFuncType> {
        let type_idx = *self.func_type_indices.get(func_idx as usize)?;
        self.types.get(type_idx as usize)
    }

    /// Signatures of imported functions, in declaration order.
    pub fn imported_function_types(&self) -> impl Iterator<Item = &WispFuncType> + '_ {
        self.func_type_indices[..self.num_imported_funcs as usize]
            .iter()
            .map(move |&t| &self.types[t as usize])
    }

    /// Types of imported globals, in declaration order.
    pub fn imported_globals(&self) -> &[WispGlobalType] {
        &self.imported_globals
    }

    pub fn imported_table(&self) -> Option<WispLimits> {
        self.imported_table
    }

    pub fn imported_memory(&self) -> Option<WispLimits> {
        self.imported_memory
    }

    /// Limits of the locally defined table.
    pub fn table(&self) -> Option<WispLimits> {
        self.table
    }

    /// Limits of the locally defined memory.
    pub fn memory(&self) -> Option<WispLimits> {
        self.memory
    }

    /// Locally defined globals.
    pub fn globals(&self) -> &[WispGlobal] {
        &self.globals
    }

    /// Type of the global at `idx` in the global index space.
    pub fn global_type(&self, idx: u32) -> Option<WispGlobalType> {
        let idx = idx as usize;
        let imported = self.imported_globals.len();
        if idx < imported {
            Some(self.imported_globals[idx])
        } else {
            self.globals.get(idx - imported).map(|g| g.global_type)
        }
    }

    pub fn exports(&self) -> &[WispExport] {
        &self.exports
    }

    pub fn start(&self) -> Option<u32> {
        self.start
    }

    pub fn elements(&self) -> &[WispElementSegment] {
        &self.elements
    }

    pub fn data(&self) -> &[WispDataSegment] {
        &self.data
    }

    /// Body of the function at `func_idx`, or `None` for imported functions.
    pub fn code(&self, func_idx: u32) -> Option<&WispCode> {
        let local_idx = func_idx.checked_sub(self.num_imported_funcs)?;
        self.codes.get(local_idx as usize)
    }

    /// Find an export by name.
    pub fn find_export(&self, name: &str) -> Option<&WispExport> {
        self.exports.iter().find(|e| e.name == name)
    }

    /// Resolve an exported function name to its function index.
    ///
    /// Returns `None` if there is no export of that name or it is not a
    /// function.
    pub fn find_exported_function(&self, name: &str) -> Option<u32> {
        self.find_export(name)
            .filter(|e| e.kind == WispExternalKind::Function)
            .map(|e| e.index)
    }
}
