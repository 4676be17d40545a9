//! Static types of a WebAssembly module.

use core::fmt;

/// Value types in WebAssembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WispValueType {
    I32,
    I64,
    F32,
    F64,
}

impl WispValueType {
    /// Decode a value type from its binary encoding.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x7f => Some(WispValueType::I32),
            0x7e => Some(WispValueType::I64),
            0x7d => Some(WispValueType::F32),
            0x7c => Some(WispValueType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for WispValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WispValueType::I32 => "i32",
            WispValueType::I64 => "i64",
            WispValueType::F32 => "f32",
            WispValueType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Function type signature.
///
/// Two signatures are equal iff their parameter and result sequences are
/// equal, which is what import linking and `call_indirect` compare.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct WispFuncType {
    /// Parameter types.
    pub params: Vec<WispValueType>,
    /// Result types.
    pub results: Vec<WispValueType>,
}

impl WispFuncType {
    /// Create a new function type.
    pub fn new(params: Vec<WispValueType>, results: Vec<WispValueType>) -> Self {
        Self { params, results }
    }
}

impl fmt::Display for WispFuncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ")->(")?;
        for (i, r) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, ")")
    }
}

/// Size limits of a memory (in pages) or a table (in elements).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WispLimits {
    /// Minimum (initial) size.
    pub min: u32,
    /// Maximum size (if specified).
    pub max: Option<u32>,
}

impl WispLimits {
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }
}

/// Global type - the mutability and value type of a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WispGlobalType {
    /// The value type of the global.
    pub value_type: WispValueType,
    /// Whether the global is mutable.
    pub mutable: bool,
}

impl WispGlobalType {
    pub fn immutable(value_type: WispValueType) -> Self {
        Self {
            value_type,
            mutable: false,
        }
    }

    pub fn mutable(value_type: WispValueType) -> Self {
        Self {
            value_type,
            mutable: true,
        }
    }
}

/// The kind of an import or export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WispExternalKind {
    Function,
    Table,
    Memory,
    Global,
}

impl WispExternalKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(WispExternalKind::Function),
            0x01 => Some(WispExternalKind::Table),
            0x02 => Some(WispExternalKind::Memory),
            0x03 => Some(WispExternalKind::Global),
            _ => None,
        }
    }
}

impl fmt::Display for WispExternalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WispExternalKind::Function => "function",
            WispExternalKind::Table => "table",
            WispExternalKind::Memory => "memory",
            WispExternalKind::Global => "global",
        };
        f.write_str(name)
    }
}

/// What an import declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WispImportDesc {
    /// A function with the given type index.
    Function(u32),
    Table(WispLimits),
    Memory(WispLimits),
    Global(WispGlobalType),
}

/// A single import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WispImport {
    /// Module name (e.g. "env").
    pub module: String,
    /// Field name.
    pub name: String,
    pub desc: WispImportDesc,
}

/// A single export declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WispExport {
    pub name: String,
    pub kind: WispExternalKind,
    /// Index into the index space of `kind`.
    pub index: u32,
}
