//! Binary container decoding: header, sections and module-level validation.

use std::collections::HashSet;

use log::{debug, trace};

use crate::error::{Result, WispParseError};
use crate::instructions::WispConstExpr;
use crate::module::{WispDataSegment, WispElementSegment, WispGlobal, WispModule};
use crate::reader::WispReader;
use crate::types::{
    WispExport, WispExternalKind, WispFuncType, WispGlobalType, WispImport, WispImportDesc,
    WispLimits, WispValueType,
};
use crate::validator::WispValidationContext;

/// The `\0asm` magic number.
pub const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// The only supported binary format version.
pub const WASM_VERSION: u32 = 1;

/// Architectural limit on memory size in pages.
pub const MAX_MEMORY_PAGES: u32 = 65536;

const SECTION_CUSTOM: u8 = 0;
const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_TABLE: u8 = 4;
const SECTION_MEMORY: u8 = 5;
const SECTION_GLOBAL: u8 = 6;
const SECTION_EXPORT: u8 = 7;
const SECTION_START: u8 = 8;
const SECTION_ELEMENT: u8 = 9;
const SECTION_CODE: u8 = 10;
const SECTION_DATA: u8 = 11;

const FUNCREF: u8 = 0x70;

/// Parse and validate a binary module.
///
/// Either the whole module is valid and returned, or an error describes the
/// first problem found; no partially decoded module is ever produced.
pub fn parse(bytes: &[u8]) -> Result<WispModule> {
    let mut reader = WispReader::new(bytes);

    if reader.read_array::<4>()? != WASM_MAGIC {
        return Err(WispParseError::InvalidMagic);
    }
    let version = u32::from_le_bytes(reader.read_array()?);
    if version != WASM_VERSION {
        return Err(WispParseError::InvalidVersion(version));
    }

    let mut module = WispModule::default();
    let mut last_id = SECTION_CUSTOM;
    let mut code_count: Option<u32> = None;

    while !reader.is_finished() {
        let id = reader.read_u8()?;
        let size = reader.read_u32()? as usize;
        let base = reader.offset();
        let contents = reader.read_bytes(size)?;
        let mut section = WispReader::with_base(contents, base);
        trace!("section {id}: {size} bytes at offset {base}");

        if id == SECTION_CUSTOM {
            section.read_name()?;
            continue;
        }
        if id > SECTION_DATA {
            return Err(WispParseError::InvalidSectionId(id));
        }
        if id <= last_id {
            return Err(WispParseError::SectionOutOfOrder { id });
        }
        last_id = id;

        match id {
            SECTION_TYPE => parse_type_section(&mut section, &mut module)?,
            SECTION_IMPORT => parse_import_section(&mut section, &mut module)?,
            SECTION_FUNCTION => parse_function_section(&mut section, &mut module)?,
            SECTION_TABLE => parse_table_section(&mut section, &mut module)?,
            SECTION_MEMORY => parse_memory_section(&mut section, &mut module)?,
            SECTION_GLOBAL => parse_global_section(&mut section, &mut module)?,
            SECTION_EXPORT => parse_export_section(&mut section, &mut module)?,
            SECTION_START => parse_start_section(&mut section, &mut module)?,
            SECTION_ELEMENT => parse_element_section(&mut section, &mut module)?,
            SECTION_CODE => code_count = Some(parse_code_section(&mut section, &mut module)?),
            _ => parse_data_section(&mut section, &mut module)?,
        }

        if !section.is_finished() {
            return Err(WispParseError::SectionSizeMismatch {
                id,
                declared: size,
                consumed: size - section.remaining(),
            });
        }
    }

    let func_count = module.func_type_indices.len() as u32 - module.num_imported_funcs;
    let code_count = code_count.unwrap_or(0);
    if func_count != code_count {
        return Err(WispParseError::FuncCodeMismatch {
            func_count,
            code_count,
        });
    }

    debug!(
        "parsed module: {} types, {} functions ({} imported), {} globals, {} exports",
        module.types.len(),
        module.func_type_indices.len(),
        module.num_imported_funcs,
        module.imported_globals.len() + module.globals.len(),
        module.exports.len()
    );
    Ok(module)
}

/// Check that `bytes` is a valid module, discarding the result.
pub fn validate(bytes: &[u8]) -> bool {
    match parse(bytes) {
        Ok(_) => true,
        Err(e) => {
            debug!("validation failed: {e}");
            false
        }
    }
}

fn check_index(space: &'static str, index: u32, count: usize) -> Result<()> {
    if (index as usize) < count {
        Ok(())
    } else {
        Err(WispParseError::IndexOutOfBounds {
            space,
            index,
            count: count as u32,
        })
    }
}

fn parse_limits(reader: &mut WispReader<'_>) -> Result<WispLimits> {
    let offset = reader.offset();
    let limits = match reader.read_u8()? {
        0x00 => WispLimits::new(reader.read_u32()?, None),
        0x01 => WispLimits::new(reader.read_u32()?, Some(reader.read_u32()?)),
        _ => return Err(WispParseError::Malformed { what: "limits", offset }),
    };
    if limits.max.is_some_and(|max| max < limits.min) {
        return Err(WispParseError::InvalidLimits("maximum is below minimum"));
    }
    Ok(limits)
}

fn parse_memory_limits(reader: &mut WispReader<'_>) -> Result<WispLimits> {
    let limits = parse_limits(reader)?;
    if limits.min > MAX_MEMORY_PAGES || limits.max.is_some_and(|max| max > MAX_MEMORY_PAGES) {
        return Err(WispParseError::InvalidLimits("memory size must be at most 65536 pages"));
    }
    Ok(limits)
}

fn parse_table_type(reader: &mut WispReader<'_>) -> Result<WispLimits> {
    let offset = reader.offset();
    if reader.read_u8()? != FUNCREF {
        return Err(WispParseError::Malformed {
            what: "table element type",
            offset,
        });
    }
    parse_limits(reader)
}

fn parse_global_type(reader: &mut WispReader<'_>) -> Result<WispGlobalType> {
    let value_type = reader.read_value_type()?;
    let offset = reader.offset();
    match reader.read_u8()? {
        0x00 => Ok(WispGlobalType::immutable(value_type)),
        0x01 => Ok(WispGlobalType::mutable(value_type)),
        _ => Err(WispParseError::Malformed {
            what: "global mutability",
            offset,
        }),
    }
}

/// Parse a constant expression producing `expected`.
///
/// `global.get` may only refer to imported globals, which are immutable.
fn parse_const_expr(
    reader: &mut WispReader<'_>,
    expected: WispValueType,
    imported_globals: &[WispGlobalType],
) -> Result<WispConstExpr> {
    let offset = reader.offset();
    let (expr, value_type) = match reader.read_u8()? {
        0x41 => (WispConstExpr::I32(reader.read_i32()?), WispValueType::I32),
        0x42 => (WispConstExpr::I64(reader.read_i64()?), WispValueType::I64),
        0x43 => (WispConstExpr::F32(reader.read_f32_bits()?), WispValueType::F32),
        0x44 => (WispConstExpr::F64(reader.read_f64_bits()?), WispValueType::F64),
        0x23 => {
            let idx = reader.read_u32()?;
            check_index("imported global", idx, imported_globals.len())?;
            (WispConstExpr::GlobalGet(idx), imported_globals[idx as usize].value_type)
        }
        opcode => return Err(WispParseError::InvalidOpcode { opcode, offset }),
    };
    if reader.read_u8()? != 0x0b {
        return Err(WispParseError::InvalidConstExpr("expected end after a single instruction"));
    }
    if value_type != expected {
        return Err(WispParseError::InvalidConstExpr("result type does not match"));
    }
    Ok(expr)
}

fn parse_type_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(3)?;
    module.types.reserve(count as usize);
    for _ in 0..count {
        let offset = reader.offset();
        if reader.read_u8()? != 0x60 {
            return Err(WispParseError::Malformed {
                what: "function type",
                offset,
            });
        }
        let param_count = reader.read_vec_len(1)?;
        let params = (0..param_count)
            .map(|_| reader.read_value_type())
            .collect::<Result<Vec<_>>>()?;
        let result_count = reader.read_vec_len(1)?;
        let results = (0..result_count)
            .map(|_| reader.read_value_type())
            .collect::<Result<Vec<_>>>()?;
        if results.len() > 1 {
            return Err(WispParseError::Unsupported("multiple function results"));
        }
        module.types.push(WispFuncType::new(params, results));
    }
    Ok(())
}

fn parse_import_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(4)?;
    for _ in 0..count {
        let module_name = reader.read_name()?;
        let name = reader.read_name()?;
        let offset = reader.offset();
        let kind = WispExternalKind::from_byte(reader.read_u8()?)
            .ok_or(WispParseError::Malformed { what: "import kind", offset })?;
        let desc = match kind {
            WispExternalKind::Function => {
                let type_idx = reader.read_u32()?;
                check_index("type", type_idx, module.types.len())?;
                module.func_type_indices.push(type_idx);
                module.num_imported_funcs += 1;
                WispImportDesc::Function(type_idx)
            }
            WispExternalKind::Table => {
                let limits = parse_table_type(reader)?;
                if module.imported_table.is_some() {
                    return Err(WispParseError::Unsupported("multiple tables"));
                }
                module.imported_table = Some(limits);
                WispImportDesc::Table(limits)
            }
            WispExternalKind::Memory => {
                let limits = parse_memory_limits(reader)?;
                if module.imported_memory.is_some() {
                    return Err(WispParseError::Unsupported("multiple memories"));
                }
                module.imported_memory = Some(limits);
                WispImportDesc::Memory(limits)
            }
            WispExternalKind::Global => {
                let global_type = parse_global_type(reader)?;
                if global_type.mutable {
                    return Err(WispParseError::Unsupported("mutable global import"));
                }
                module.imported_globals.push(global_type);
                WispImportDesc::Global(global_type)
            }
        };
        module.imports.push(WispImport {
            module: module_name,
            name,
            desc,
        });
    }
    Ok(())
}

fn parse_function_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(1)?;
    for _ in 0..count {
        let type_idx = reader.read_u32()?;
        check_index("type", type_idx, module.types.len())?;
        module.func_type_indices.push(type_idx);
    }
    Ok(())
}

fn parse_table_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(3)?;
    for _ in 0..count {
        let limits = parse_table_type(reader)?;
        if module.imported_table.is_some() || module.table.is_some() {
            return Err(WispParseError::Unsupported("multiple tables"));
        }
        module.table = Some(limits);
    }
    Ok(())
}

fn parse_memory_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(2)?;
    for _ in 0..count {
        let limits = parse_memory_limits(reader)?;
        if module.imported_memory.is_some() || module.memory.is_some() {
            return Err(WispParseError::Unsupported("multiple memories"));
        }
        module.memory = Some(limits);
    }
    Ok(())
}

fn parse_global_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(4)?;
    for _ in 0..count {
        let global_type = parse_global_type(reader)?;
        let init = parse_const_expr(reader, global_type.value_type, &module.imported_globals)?;
        module.globals.push(WispGlobal { global_type, init });
    }
    Ok(())
}

fn parse_export_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(3)?;
    let mut names = HashSet::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader.read_name()?;
        let offset = reader.offset();
        let kind = WispExternalKind::from_byte(reader.read_u8()?)
            .ok_or(WispParseError::Malformed { what: "export kind", offset })?;
        let index = reader.read_u32()?;
        match kind {
            WispExternalKind::Function => {
                check_index("function", index, module.func_type_indices.len())?
            }
            WispExternalKind::Table => check_index(
                "table",
                index,
                (module.imported_table.is_some() || module.table.is_some()) as usize,
            )?,
            WispExternalKind::Memory => check_index(
                "memory",
                index,
                (module.imported_memory.is_some() || module.memory.is_some()) as usize,
            )?,
            WispExternalKind::Global => check_index(
                "global",
                index,
                module.imported_globals.len() + module.globals.len(),
            )?,
        }
        if !names.insert(name.clone()) {
            return Err(WispParseError::DuplicateExport(name));
        }
        module.exports.push(WispExport { name, kind, index });
    }
    Ok(())
}

fn parse_start_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let func_idx = reader.read_u32()?;
    check_index("function", func_idx, module.func_type_indices.len())?;
    let func_type = module.func_type(func_idx).ok_or(WispParseError::IndexOutOfBounds {
        space: "type",
        index: func_idx,
        count: module.types.len() as u32,
    })?;
    if !func_type.params.is_empty() || !func_type.results.is_empty() {
        return Err(WispParseError::TypeMismatch {
            func_idx,
            message: "start function must take no arguments and return nothing".into(),
        });
    }
    module.start = Some(func_idx);
    Ok(())
}

fn parse_element_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(4)?;
    let table_count = (module.imported_table.is_some() || module.table.is_some()) as usize;
    for _ in 0..count {
        let table_idx = reader.read_u32()?;
        check_index("table", table_idx, table_count)?;
        let offset = parse_const_expr(reader, WispValueType::I32, &module.imported_globals)?;
        let len = reader.read_vec_len(1)?;
        let mut func_indices = Vec::with_capacity(len as usize);
        for _ in 0..len {
            let func_idx = reader.read_u32()?;
            check_index("function", func_idx, module.func_type_indices.len())?;
            func_indices.push(func_idx);
        }
        module.elements.push(WispElementSegment {
            offset,
            func_indices,
        });
    }
    Ok(())
}

fn parse_code_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<u32> {
    let count = reader.read_vec_len(2)?;
    let func_count = module.func_type_indices.len() as u32 - module.num_imported_funcs;
    if count != func_count {
        return Err(WispParseError::FuncCodeMismatch {
            func_count,
            code_count: count,
        });
    }

    let mut bodies = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let size = reader.read_u32()? as usize;
        let base = reader.offset();
        bodies.push((reader.read_bytes(size)?, base));
    }

    let mut globals = module.imported_globals.clone();
    globals.extend(module.globals.iter().map(|g| g.global_type));
    let ctx = WispValidationContext {
        types: &module.types,
        func_type_indices: &module.func_type_indices,
        globals: &globals,
        has_memory: module.imported_memory.is_some() || module.memory.is_some(),
        has_table: module.imported_table.is_some() || module.table.is_some(),
    };
    let first = module.num_imported_funcs;

    #[cfg(feature = "parallel")]
    let codes = {
        use rayon::prelude::*;
        // Collected in order so the lowest-indexed failure is reported.
        bodies
            .par_iter()
            .enumerate()
            .map(|(i, &(body, base))| ctx.validate_body(first + i as u32, body, base))
            .collect::<Vec<_>>()
            .into_iter()
            .collect::<Result<Vec<_>>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let codes = bodies
        .iter()
        .enumerate()
        .map(|(i, &(body, base))| ctx.validate_body(first + i as u32, body, base))
        .collect::<Result<Vec<_>>>()?;

    module.codes = codes;
    Ok(count)
}

fn parse_data_section(reader: &mut WispReader<'_>, module: &mut WispModule) -> Result<()> {
    let count = reader.read_vec_len(4)?;
    let memory_count = (module.imported_memory.is_some() || module.memory.is_some()) as usize;
    for _ in 0..count {
        let memory_idx = reader.read_u32()?;
        check_index("memory", memory_idx, memory_count)?;
        let offset = parse_const_expr(reader, WispValueType::I32, &module.imported_globals)?;
        let len = reader.read_u32()? as usize;
        let bytes = reader.read_bytes(len)?.to_vec();
        module.data.push(WispDataSegment { offset, bytes });
    }
    Ok(())
}
