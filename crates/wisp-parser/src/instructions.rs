//! Decoded instruction representation.
//!
//! Function bodies are decoded once into a flat `Vec<WispInstr>`. Structured
//! control instructions carry the positions of their matching `else`/`end`,
//! filled in while the body is validated, so the interpreter can jump
//! without scanning.

use crate::types::WispValueType;

/// Static operand of a load or store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WispMemArg {
    /// Alignment hint as a power of two.
    pub align: u32,
    /// Static offset added to the dynamic address.
    pub offset: u32,
}

/// Load instructions, `0x28..=0x35`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WispLoadKind {
    I32Load,
    I64Load,
    F32Load,
    F64Load,
    I32Load8S,
    I32Load8U,
    I32Load16S,
    I32Load16U,
    I64Load8S,
    I64Load8U,
    I64Load16S,
    I64Load16U,
    I64Load32S,
    I64Load32U,
}

impl WispLoadKind {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        use WispLoadKind::*;
        Some(match opcode {
            0x28 => I32Load,
            0x29 => I64Load,
            0x2a => F32Load,
            0x2b => F64Load,
            0x2c => I32Load8S,
            0x2d => I32Load8U,
            0x2e => I32Load16S,
            0x2f => I32Load16U,
            0x30 => I64Load8S,
            0x31 => I64Load8U,
            0x32 => I64Load16S,
            0x33 => I64Load16U,
            0x34 => I64Load32S,
            0x35 => I64Load32U,
            _ => return None,
        })
    }

    /// Number of bytes read from memory.
    pub fn width(self) -> u32 {
        use WispLoadKind::*;
        match self {
            I32Load8S | I32Load8U | I64Load8S | I64Load8U => 1,
            I32Load16S | I32Load16U | I64Load16S | I64Load16U => 2,
            I32Load | F32Load | I64Load32S | I64Load32U => 4,
            I64Load | F64Load => 8,
        }
    }

    /// Type pushed onto the stack.
    pub fn result_type(self) -> WispValueType {
        use WispLoadKind::*;
        match self {
            I32Load | I32Load8S | I32Load8U | I32Load16S | I32Load16U => WispValueType::I32,
            I64Load | I64Load8S | I64Load8U | I64Load16S | I64Load16U | I64Load32S
            | I64Load32U => WispValueType::I64,
            F32Load => WispValueType::F32,
            F64Load => WispValueType::F64,
        }
    }
}

/// Store instructions, `0x36..=0x3e`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WispStoreKind {
    I32Store,
    I64Store,
    F32Store,
    F64Store,
    I32Store8,
    I32Store16,
    I64Store8,
    I64Store16,
    I64Store32,
}

impl WispStoreKind {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        use WispStoreKind::*;
        Some(match opcode {
            0x36 => I32Store,
            0x37 => I64Store,
            0x38 => F32Store,
            0x39 => F64Store,
            0x3a => I32Store8,
            0x3b => I32Store16,
            0x3c => I64Store8,
            0x3d => I64Store16,
            0x3e => I64Store32,
            _ => return None,
        })
    }

    /// Number of bytes written to memory.
    pub fn width(self) -> u32 {
        use WispStoreKind::*;
        match self {
            I32Store8 | I64Store8 => 1,
            I32Store16 | I64Store16 => 2,
            I32Store | F32Store | I64Store32 => 4,
            I64Store | F64Store => 8,
        }
    }

    /// Type popped as the stored value.
    pub fn value_type(self) -> WispValueType {
        use WispStoreKind::*;
        match self {
            I32Store | I32Store8 | I32Store16 => WispValueType::I32,
            I64Store | I64Store8 | I64Store16 | I64Store32 => WispValueType::I64,
            F32Store => WispValueType::F32,
            F64Store => WispValueType::F64,
        }
    }
}

/// Numeric instructions without immediates, `0x45..=0xbf`.
///
/// The discriminant of each variant is its opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WispNumOp {
    I32Eqz = 0x45,
    I32Eq,
    I32Ne,
    I32LtS,
    I32LtU,
    I32GtS,
    I32GtU,
    I32LeS,
    I32LeU,
    I32GeS,
    I32GeU,

    I64Eqz = 0x50,
    I64Eq,
    I64Ne,
    I64LtS,
    I64LtU,
    I64GtS,
    I64GtU,
    I64LeS,
    I64LeU,
    I64GeS,
    I64GeU,

    F32Eq = 0x5b,
    F32Ne,
    F32Lt,
    F32Gt,
    F32Le,
    F32Ge,

    F64Eq = 0x61,
    F64Ne,
    F64Lt,
    F64Gt,
    F64Le,
    F64Ge,

    I32Clz = 0x67,
    I32Ctz,
    I32Popcnt,
    I32Add,
    I32Sub,
    I32Mul,
    I32DivS,
    I32DivU,
    I32RemS,
    I32RemU,
    I32And,
    I32Or,
    I32Xor,
    I32Shl,
    I32ShrS,
    I32ShrU,
    I32Rotl,
    I32Rotr,

    I64Clz = 0x79,
    I64Ctz,
    I64Popcnt,
    I64Add,
    I64Sub,
    I64Mul,
    I64DivS,
    I64DivU,
    I64RemS,
    I64RemU,
    I64And,
    I64Or,
    I64Xor,
    I64Shl,
    I64ShrS,
    I64ShrU,
    I64Rotl,
    I64Rotr,

    F32Abs = 0x8b,
    F32Neg,
    F32Ceil,
    F32Floor,
    F32Trunc,
    F32Nearest,
    F32Sqrt,
    F32Add,
    F32Sub,
    F32Mul,
    F32Div,
    F32Min,
    F32Max,
    F32Copysign,

    F64Abs = 0x99,
    F64Neg,
    F64Ceil,
    F64Floor,
    F64Trunc,
    F64Nearest,
    F64Sqrt,
    F64Add,
    F64Sub,
    F64Mul,
    F64Div,
    F64Min,
    F64Max,
    F64Copysign,

    I32WrapI64 = 0xa7,
    I32TruncF32S,
    I32TruncF32U,
    I32TruncF64S,
    I32TruncF64U,
    I64ExtendI32S,
    I64ExtendI32U,
    I64TruncF32S,
    I64TruncF32U,
    I64TruncF64S,
    I64TruncF64U,
    F32ConvertI32S,
    F32ConvertI32U,
    F32ConvertI64S,
    F32ConvertI64U,
    F32DemoteF64,
    F64ConvertI32S,
    F64ConvertI32U,
    F64ConvertI64S,
    F64ConvertI64U,
    F64PromoteF32,
    I32ReinterpretF32,
    I64ReinterpretF64,
    F32ReinterpretI32,
    F64ReinterpretI64,
}

const I32_1: &[WispValueType] = &[WispValueType::I32];
const I32_2: &[WispValueType] = &[WispValueType::I32, WispValueType::I32];
const I64_1: &[WispValueType] = &[WispValueType::I64];
const I64_2: &[WispValueType] = &[WispValueType::I64, WispValueType::I64];
const F32_1: &[WispValueType] = &[WispValueType::F32];
const F32_2: &[WispValueType] = &[WispValueType::F32, WispValueType::F32];
const F64_1: &[WispValueType] = &[WispValueType::F64];
const F64_2: &[WispValueType] = &[WispValueType::F64, WispValueType::F64];

impl WispNumOp {
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        use WispNumOp::*;
        Some(match opcode {
            0x45 => I32Eqz,
            0x46 => I32Eq,
            0x47 => I32Ne,
            0x48 => I32LtS,
            0x49 => I32LtU,
            0x4a => I32GtS,
            0x4b => I32GtU,
            0x4c => I32LeS,
            0x4d => I32LeU,
            0x4e => I32GeS,
            0x4f => I32GeU,
            0x50 => I64Eqz,
            0x51 => I64Eq,
            0x52 => I64Ne,
            0x53 => I64LtS,
            0x54 => I64LtU,
            0x55 => I64GtS,
            0x56 => I64GtU,
            0x57 => I64LeS,
            0x58 => I64LeU,
            0x59 => I64GeS,
            0x5a => I64GeU,
            0x5b => F32Eq,
            0x5c => F32Ne,
            0x5d => F32Lt,
            0x5e => F32Gt,
            0x5f => F32Le,
            0x60 => F32Ge,
            0x61 => F64Eq,
            0x62 => F64Ne,
            0x63 => F64Lt,
            0x64 => F64Gt,
            0x65 => F64Le,
            0x66 => F64Ge,
            0x67 => I32Clz,
            0x68 => I32Ctz,
            0x69 => I32Popcnt,
            0x6a => I32Add,
            0x6b => I32Sub,
            0x6c => I32Mul,
            0x6d => I32DivS,
            0x6e => I32DivU,
            0x6f => I32RemS,
            0x70 => I32RemU,
            0x71 => I32And,
            0x72 => I32Or,
            0x73 => I32Xor,
            0x74 => I32Shl,
            0x75 => I32ShrS,
            0x76 => I32ShrU,
            0x77 => I32Rotl,
            0x78 => I32Rotr,
            0x79 => I64Clz,
            0x7a => I64Ctz,
            0x7b => I64Popcnt,
            0x7c => I64Add,
            0x7d => I64Sub,
            0x7e => I64Mul,
            0x7f => I64DivS,
            0x80 => I64DivU,
            0x81 => I64RemS,
            0x82 => I64RemU,
            0x83 => I64And,
            0x84 => I64Or,
            0x85 => I64Xor,
            0x86 => I64Shl,
            0x87 => I64ShrS,
            0x88 => I64ShrU,
            0x89 => I64Rotl,
            0x8a => I64Rotr,
            0x8b => F32Abs,
            0x8c => F32Neg,
            0x8d => F32Ceil,
            0x8e => F32Floor,
            0x8f => F32Trunc,
            0x90 => F32Nearest,
            0x91 => F32Sqrt,
            0x92 => F32Add,
            0x93 => F32Sub,
            0x94 => F32Mul,
            0x95 => F32Div,
            0x96 => F32Min,
            0x97 => F32Max,
            0x98 => F32Copysign,
            0x99 => F64Abs,
            0x9a => F64Neg,
            0x9b => F64Ceil,
            0x9c => F64Floor,
            0x9d => F64Trunc,
            0x9e => F64Nearest,
            0x9f => F64Sqrt,
            0xa0 => F64Add,
            0xa1 => F64Sub,
            0xa2 => F64Mul,
            0xa3 => F64Div,
            0xa4 => F64Min,
            0xa5 => F64Max,
            0xa6 => F64Copysign,
            0xa7 => I32WrapI64,
            0xa8 => I32TruncF32S,
            0xa9 => I32TruncF32U,
            0xaa => I32TruncF64S,
            0xab => I32TruncF64U,
            0xac => I64ExtendI32S,
            0xad => I64ExtendI32U,
            0xae => I64TruncF32S,
            0xaf => I64TruncF32U,
            0xb0 => I64TruncF64S,
            0xb1 => I64TruncF64U,
            0xb2 => F32ConvertI32S,
            0xb3 => F32ConvertI32U,
            0xb4 => F32ConvertI64S,
            0xb5 => F32ConvertI64U,
            0xb6 => F32DemoteF64,
            0xb7 => F64ConvertI32S,
            0xb8 => F64ConvertI32U,
            0xb9 => F64ConvertI64S,
            0xba => F64ConvertI64U,
            0xbb => F64PromoteF32,
            0xbc => I32ReinterpretF32,
            0xbd => I64ReinterpretF64,
            0xbe => F32ReinterpretI32,
            0xbf => F64ReinterpretI64,
            _ => return None,
        })
    }

    /// Operand types (bottom to top) and the single result type.
    pub fn signature(self) -> (&'static [WispValueType], WispValueType) {
        use WispValueType::*;
        match self as u8 {
            0x45 => (I32_1, I32),
            0x46..=0x4f => (I32_2, I32),
            0x50 => (I64_1, I32),
            0x51..=0x5a => (I64_2, I32),
            0x5b..=0x60 => (F32_2, I32),
            0x61..=0x66 => (F64_2, I32),
            0x67..=0x69 => (I32_1, I32),
            0x6a..=0x78 => (I32_2, I32),
            0x79..=0x7b => (I64_1, I64),
            0x7c..=0x8a => (I64_2, I64),
            0x8b..=0x91 => (F32_1, F32),
            0x92..=0x98 => (F32_2, F32),
            0x99..=0x9f => (F64_1, F64),
            0xa0..=0xa6 => (F64_2, F64),
            0xa7 => (I64_1, I32),
            0xa8 | 0xa9 => (F32_1, I32),
            0xaa | 0xab => (F64_1, I32),
            0xac | 0xad => (I32_1, I64),
            0xae | 0xaf => (F32_1, I64),
            0xb0 | 0xb1 => (F64_1, I64),
            0xb2 | 0xb3 => (I32_1, F32),
            0xb4 | 0xb5 => (I64_1, F32),
            0xb6 => (F64_1, F32),
            0xb7 | 0xb8 => (I32_1, F64),
            0xb9 | 0xba => (I64_1, F64),
            0xbb => (F32_1, F64),
            0xbc => (F32_1, I32),
            0xbd => (F64_1, I64),
            0xbe => (I32_1, F32),
            _ => (I64_1, F64),
        }
    }
}

/// A single decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WispInstr {
    Unreachable,
    Nop,
    /// `end` is the index of the matching `End`.
    Block {
        result: Option<WispValueType>,
        end: u32,
    },
    Loop {
        result: Option<WispValueType>,
    },
    /// `else_` is the index of the matching `Else`, if present.
    If {
        result: Option<WispValueType>,
        else_: Option<u32>,
        end: u32,
    },
    Else {
        end: u32,
    },
    End,
    Br(u32),
    BrIf(u32),
    BrTable {
        targets: Box<[u32]>,
        default: u32,
    },
    Return,
    Call(u32),
    /// Operand is the expected type index.
    CallIndirect(u32),

    Drop,
    Select,

    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),

    Load(WispLoadKind, WispMemArg),
    Store(WispStoreKind, WispMemArg),
    MemorySize,
    MemoryGrow,

    I32Const(i32),
    I64Const(i64),
    /// Raw IEEE-754 bits.
    F32Const(u32),
    /// Raw IEEE-754 bits.
    F64Const(u64),

    Numeric(WispNumOp),
}

/// A constant initializer expression of a global or segment offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WispConstExpr {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    /// Value of an imported immutable global.
    GlobalGet(u32),
}
