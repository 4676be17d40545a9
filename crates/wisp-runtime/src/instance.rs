//! Module instance and instantiation.
//!
//! A module instance is the runtime representation of an instantiated module:
//! the shared, immutable `WispModule` plus the memory, table, globals and
//! bound host functions the instance owns.

use std::sync::Arc;

use log::debug;
use wisp_parser::{WispFuncType, WispImportDesc, WispLimits, WispModule, WispValue};

use crate::config::WispConfig;
use crate::error::WispInstantiationError;
use crate::execute::execute;
use crate::func::WispExternalFunction;
use crate::global::WispGlobalInst;
use crate::imports::WispImports;
use crate::memory::WispMemInst;
use crate::table::WispTableInst;
use crate::type_convert::{eval_const_expr, limits_match};
use crate::values::WispExecutionResult;

/// A live instantiation of a module.
#[derive(Debug)]
pub struct WispInstance {
    pub(crate) module: Arc<WispModule>,
    pub(crate) memory: Option<WispMemInst>,
    pub(crate) table: Option<WispTableInst>,
    /// Imported globals first, then local ones.
    pub(crate) globals: Vec<WispGlobalInst>,
    pub(crate) imported_functions: Vec<WispExternalFunction>,
    pub(crate) config: WispConfig,
}

/// Instantiate `module` with the default [`WispConfig`].
pub fn instantiate(
    module: WispModule,
    imports: WispImports,
) -> Result<WispInstance, WispInstantiationError> {
    instantiate_with_config(module, imports, WispConfig::default())
}

/// Instantiate `module`, binding `imports` and running the start function.
///
/// The module is consumed either way. On failure no instance exists, so
/// nothing a failed instantiation wrote is observable.
pub fn instantiate_with_config(
    module: WispModule,
    imports: WispImports,
    config: WispConfig,
) -> Result<WispInstance, WispInstantiationError> {
    let WispImports {
        functions,
        globals: provided_globals,
        memory: provided_memory,
        table: provided_table,
    } = imports;

    let imported_functions = link_functions(&module, functions)?;
    let mut globals = link_globals(&module, provided_globals)?;
    let mut memory = link_memory(&module, provided_memory, &config)?;
    let mut table = link_table(&module, provided_table, &config)?;

    for global in module.globals() {
        let value = eval_const_expr(&global.init, &globals)?;
        globals.push(WispGlobalInst::new(global.global_type, value));
    }

    init_segments(&module, &globals, memory.as_mut(), table.as_mut())?;

    debug!(
        "instantiated module: {} function(s), {} global(s), memory {} page(s), table {} slot(s)",
        module.num_functions(),
        globals.len(),
        memory.as_ref().map_or(0, WispMemInst::size_pages),
        table.as_ref().map_or(0, WispTableInst::size),
    );

    let start = module.start();
    let mut instance = WispInstance {
        module: Arc::new(module),
        memory,
        table,
        globals,
        imported_functions,
        config,
    };

    if let Some(start) = start {
        if let WispExecutionResult::Trap(trap) = execute(&mut instance, start, &[], 0) {
            debug!("start function {start} trapped: {trap}");
            return Err(WispInstantiationError::StartFunctionTrapped(trap));
        }
    }

    Ok(instance)
}

fn count_mismatch(kind: &'static str, expected: usize, provided: usize) -> WispInstantiationError {
    WispInstantiationError::ImportCountMismatch {
        kind,
        expected,
        provided,
    }
}

fn link_functions(
    module: &WispModule,
    provided: Vec<WispExternalFunction>,
) -> Result<Vec<WispExternalFunction>, WispInstantiationError> {
    let expected = module.num_imported_functions() as usize;
    if provided.len() != expected {
        return Err(count_mismatch("function", expected, provided.len()));
    }

    let declared = module.imports().iter().filter_map(|import| match import.desc {
        WispImportDesc::Function(type_idx) => Some((import, type_idx)),
        _ => None,
    });
    for ((import, type_idx), func) in declared.zip(&provided) {
        let expected_type = &module.types()[type_idx as usize];
        if &func.func_type != expected_type {
            return Err(WispInstantiationError::FunctionTypeMismatch {
                module: import.module.clone(),
                name: import.name.clone(),
                expected: expected_type.clone(),
                got: func.func_type.clone(),
            });
        }
    }
    Ok(provided)
}

fn link_globals(
    module: &WispModule,
    provided: Vec<WispGlobalInst>,
) -> Result<Vec<WispGlobalInst>, WispInstantiationError> {
    let expected = module.imported_globals().len();
    if provided.len() != expected {
        return Err(count_mismatch("global", expected, provided.len()));
    }

    let declared = module.imports().iter().filter_map(|import| match import.desc {
        WispImportDesc::Global(global_type) => Some((import, global_type)),
        _ => None,
    });
    let mut globals = Vec::with_capacity(expected + module.globals().len());
    for ((import, global_type), global) in declared.zip(provided) {
        if global.type_.value_type != global_type.value_type {
            return Err(WispInstantiationError::GlobalTypeMismatch {
                module: import.module.clone(),
                name: import.name.clone(),
                expected: global_type.value_type,
                got: global.type_.value_type,
            });
        }
        // The instance sees the global with its declared mutability.
        globals.push(WispGlobalInst::new(global_type, global.get()));
    }
    Ok(globals)
}

fn link_memory(
    module: &WispModule,
    provided: Option<WispMemInst>,
    config: &WispConfig,
) -> Result<Option<WispMemInst>, WispInstantiationError> {
    let limit = config.memory_pages_limit;
    match (module.imported_memory(), provided) {
        (Some(declared), Some(memory)) => {
            // A host memory that has grown is matched on its current size.
            let current = WispLimits::new(memory.size_pages(), memory.type_.max);
            if !limits_match(&declared, &current) {
                let (module_name, name) =
                    import_name(module, |d| matches!(d, WispImportDesc::Memory(_)));
                return Err(WispInstantiationError::LimitsMismatch {
                    module: module_name,
                    name,
                    expected: declared,
                    got: current,
                });
            }
            if memory.size_pages() > limit {
                return Err(WispInstantiationError::MemoryAllocationFailed {
                    requested_pages: memory.size_pages(),
                    limit,
                });
            }
            Ok(Some(memory.with_pages_limit(limit)))
        }
        (Some(_), None) => Err(count_mismatch("memory", 1, 0)),
        (None, Some(_)) => Err(count_mismatch("memory", 0, 1)),
        (None, None) => match module.memory() {
            Some(limits) if limits.min > limit => {
                Err(WispInstantiationError::MemoryAllocationFailed {
                    requested_pages: limits.min,
                    limit,
                })
            }
            Some(limits) => Ok(Some(WispMemInst::new(limits).with_pages_limit(limit))),
            None => Ok(None),
        },
    }
}

fn link_table(
    module: &WispModule,
    provided: Option<WispTableInst>,
    config: &WispConfig,
) -> Result<Option<WispTableInst>, WispInstantiationError> {
    let limit = config.table_elements_limit;
    match (module.imported_table(), provided) {
        (Some(declared), Some(table)) => {
            let current = WispLimits::new(table.size(), table.type_.max);
            if !limits_match(&declared, &current) {
                let (module_name, name) =
                    import_name(module, |d| matches!(d, WispImportDesc::Table(_)));
                return Err(WispInstantiationError::LimitsMismatch {
                    module: module_name,
                    name,
                    expected: declared,
                    got: current,
                });
            }
            if table.size() > limit {
                return Err(WispInstantiationError::TableAllocationFailed {
                    requested: table.size(),
                    limit,
                });
            }
            Ok(Some(table.with_elements_limit(limit)))
        }
        (Some(_), None) => Err(count_mismatch("table", 1, 0)),
        (None, Some(_)) => Err(count_mismatch("table", 0, 1)),
        (None, None) => match module.table() {
            // Checked before allocating: the declared minimum is untrusted.
            Some(limits) if limits.min > limit => {
                Err(WispInstantiationError::TableAllocationFailed {
                    requested: limits.min,
                    limit,
                })
            }
            Some(limits) => Ok(Some(WispTableInst::new(limits).with_elements_limit(limit))),
            None => Ok(None),
        },
    }
}

fn import_name(
    module: &WispModule,
    is_kind: impl Fn(&WispImportDesc) -> bool,
) -> (String, String) {
    module
        .imports()
        .iter()
        .find(|import| is_kind(&import.desc))
        .map(|import| (import.module.clone(), import.name.clone()))
        .unwrap_or_default()
}

/// Bounds-check every segment, then write them all.
fn init_segments(
    module: &WispModule,
    globals: &[WispGlobalInst],
    mut memory: Option<&mut WispMemInst>,
    mut table: Option<&mut WispTableInst>,
) -> Result<(), WispInstantiationError> {
    let table_size = table.as_ref().map_or(0, |t| t.size());
    let mut elem_offsets = Vec::with_capacity(module.elements().len());
    for (idx, segment) in module.elements().iter().enumerate() {
        let offset = eval_const_expr(&segment.offset, globals)?.as_u32();
        let size = segment.func_indices.len() as u32;
        if u64::from(offset) + u64::from(size) > u64::from(table_size) {
            return Err(WispInstantiationError::ElementSegmentOutOfBounds {
                segment_idx: idx as u32,
                offset,
                size,
                table_size,
            });
        }
        elem_offsets.push(offset);
    }

    let memory_size = memory.as_ref().map_or(0, |m| m.size_bytes());
    let mut data_offsets = Vec::with_capacity(module.data().len());
    for (idx, segment) in module.data().iter().enumerate() {
        let offset = eval_const_expr(&segment.offset, globals)?.as_u32();
        let size = segment.bytes.len() as u32;
        if u64::from(offset) + segment.bytes.len() as u64 > memory_size as u64 {
            return Err(WispInstantiationError::DataSegmentOutOfBounds {
                segment_idx: idx as u32,
                offset,
                size,
                memory_size,
            });
        }
        data_offsets.push(offset);
    }

    for (idx, (segment, &offset)) in module.elements().iter().zip(&elem_offsets).enumerate() {
        if let Some(table) = table.as_deref_mut() {
            table
                .init(offset, &segment.func_indices)
                .map_err(|_| WispInstantiationError::ElementSegmentOutOfBounds {
                    segment_idx: idx as u32,
                    offset,
                    size: segment.func_indices.len() as u32,
                    table_size,
                })?;
        }
    }
    for (idx, (segment, &offset)) in module.data().iter().zip(&data_offsets).enumerate() {
        if let Some(memory) = memory.as_deref_mut() {
            memory
                .write(u64::from(offset), &segment.bytes)
                .map_err(|_| WispInstantiationError::DataSegmentOutOfBounds {
                    segment_idx: idx as u32,
                    offset,
                    size: segment.bytes.len() as u32,
                    memory_size,
                })?;
        }
    }
    Ok(())
}

impl WispInstance {
    /// The module this instance was created from.
    #[inline]
    pub fn module(&self) -> &WispModule {
        &self.module
    }

    #[inline]
    pub fn config(&self) -> &WispConfig {
        &self.config
    }

    #[inline]
    pub fn memory(&self) -> Option<&WispMemInst> {
        self.memory.as_ref()
    }

    #[inline]
    pub fn memory_mut(&mut self) -> Option<&mut WispMemInst> {
        self.memory.as_mut()
    }

    /// The linear memory bytes, or `None` if the instance has no memory.
    ///
    /// The slice is invalidated by anything that may grow the memory.
    #[inline]
    pub fn memory_data(&self) -> Option<&[u8]> {
        self.memory.as_ref().map(WispMemInst::data)
    }

    #[inline]
    pub fn memory_data_mut(&mut self) -> Option<&mut [u8]> {
        self.memory.as_mut().map(WispMemInst::data_mut)
    }

    /// Linear memory size in bytes; 0 without a memory.
    #[inline]
    pub fn memory_size(&self) -> usize {
        self.memory.as_ref().map_or(0, WispMemInst::size_bytes)
    }

    #[inline]
    pub fn table(&self) -> Option<&WispTableInst> {
        self.table.as_ref()
    }

    /// Current value of global `idx` in the global index space.
    pub fn global(&self, idx: u32) -> Option<WispValue> {
        self.globals.get(idx as usize).map(WispGlobalInst::get)
    }

    /// Set mutable global `idx`. Returns false if it is absent or immutable.
    pub fn set_global(&mut self, idx: u32, value: WispValue) -> bool {
        self.globals
            .get_mut(idx as usize)
            .is_some_and(|global| global.set(value))
    }

    /// Signature of function `func_idx`.
    pub fn func_type(&self, func_idx: u32) -> Option<&WispFuncType> {
        self.module.func_type(func_idx)
    }

    /// Index of the function exported under `name`.
    pub fn find_exported_function(&self, name: &str) -> Option<u32> {
        self.module.find_exported_function(name)
    }
}
