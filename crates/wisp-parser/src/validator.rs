//! Function body decoding and type checking.
//!
//! A body is decoded and validated in one pass. The validator tracks a stack
//! of operand types and a stack of control frames; `None` on the operand
//! stack is a type that is unknown because the code after it is unreachable.

use crate::error::{Result, WispParseError};
use crate::instructions::{WispInstr, WispLoadKind, WispMemArg, WispNumOp, WispStoreKind};
use crate::module::WispCode;
use crate::reader::WispReader;
use crate::types::{WispFuncType, WispGlobalType, WispValueType};

/// Maximum number of locals in a function, parameters included.
pub const MAX_LOCALS: u64 = 50_000;

/// Module-level facts a function body is checked against.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WispValidationContext<'m> {
    pub types: &'m [WispFuncType],
    pub func_type_indices: &'m [u32],
    pub globals: &'m [WispGlobalType],
    pub has_memory: bool,
    pub has_table: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

#[derive(Debug)]
struct ControlFrame {
    kind: FrameKind,
    result: Option<WispValueType>,
    /// Operand stack height at frame entry.
    height: usize,
    unreachable: bool,
    /// Index of the opening `Block`/`Loop`/`If`.
    start: usize,
    /// Index of the `Else`, once seen.
    else_at: Option<usize>,
}

impl ControlFrame {
    /// Type carried by a branch to this frame.
    fn label_type(&self) -> Option<WispValueType> {
        match self.kind {
            FrameKind::Loop => None,
            _ => self.result,
        }
    }
}

struct BodyValidator<'c, 'm> {
    ctx: &'c WispValidationContext<'m>,
    func_idx: u32,
    locals: Vec<WispValueType>,
    operands: Vec<Option<WispValueType>>,
    frames: Vec<ControlFrame>,
    code: Vec<WispInstr>,
}

impl<'m> WispValidationContext<'m> {
    fn func_type(&self, func_idx: u32) -> Result<&'m WispFuncType> {
        let type_idx = *self
            .func_type_indices
            .get(func_idx as usize)
            .ok_or(WispParseError::IndexOutOfBounds {
                space: "function",
                index: func_idx,
                count: self.func_type_indices.len() as u32,
            })?;
        self.type_at(type_idx)
    }

    fn type_at(&self, type_idx: u32) -> Result<&'m WispFuncType> {
        self.types
            .get(type_idx as usize)
            .ok_or(WispParseError::IndexOutOfBounds {
                space: "type",
                index: type_idx,
                count: self.types.len() as u32,
            })
    }

    /// Decode and validate the body of the function at `func_idx`.
    ///
    /// `base` is the offset of `body` within the module binary.
    pub fn validate_body(&self, func_idx: u32, body: &[u8], base: usize) -> Result<WispCode> {
        let func_type = self.func_type(func_idx)?;
        let mut reader = WispReader::with_base(body, base);

        let mut local_types = Vec::new();
        let mut total = func_type.params.len() as u64;
        let groups = reader.read_vec_len(2)?;
        for _ in 0..groups {
            let count = reader.read_u32()?;
            let value_type = reader.read_value_type()?;
            total += count as u64;
            if total > MAX_LOCALS {
                return Err(WispParseError::TooManyLocals { func_idx });
            }
            local_types.extend(core::iter::repeat(value_type).take(count as usize));
        }

        let mut locals = func_type.params.clone();
        locals.extend_from_slice(&local_types);

        let mut validator = BodyValidator {
            ctx: self,
            func_idx,
            locals,
            operands: Vec::new(),
            frames: vec![ControlFrame {
                kind: FrameKind::Function,
                result: func_type.results.first().copied(),
                height: 0,
                unreachable: false,
                start: 0,
                else_at: None,
            }],
            code: Vec::new(),
        };

        while !validator.frames.is_empty() {
            validator.step(&mut reader)?;
        }
        if !reader.is_finished() {
            return Err(WispParseError::TrailingBytes("function body"));
        }

        Ok(WispCode {
            local_types,
            instrs: validator.code,
        })
    }
}

impl<'c, 'm> BodyValidator<'c, 'm> {
    fn mismatch(&self, message: impl Into<String>) -> WispParseError {
        WispParseError::TypeMismatch {
            func_idx: self.func_idx,
            message: message.into(),
        }
    }

    fn frame(&self) -> Result<&ControlFrame> {
        self.frames.last().ok_or_else(|| self.mismatch("no open block"))
    }

    fn push(&mut self, value_type: Option<WispValueType>) {
        self.operands.push(value_type);
    }

    /// Pop one operand; `Ok(None)` means any type is acceptable.
    fn pop(&mut self, expected: Option<WispValueType>) -> Result<Option<WispValueType>> {
        let frame = self.frame()?;
        if self.operands.len() == frame.height {
            if frame.unreachable {
                return Ok(None);
            }
            return Err(WispParseError::type_mismatch(self.func_idx, expected, None));
        }
        Ok(self.operands.pop().flatten())
    }

    fn pop_expect(&mut self, expected: WispValueType) -> Result<()> {
        match self.pop(Some(expected))? {
            Some(got) if got != expected => Err(WispParseError::type_mismatch(
                self.func_idx,
                Some(expected),
                Some(got),
            )),
            _ => Ok(()),
        }
    }

    fn pop_params(&mut self, params: &[WispValueType]) -> Result<()> {
        for &param in params.iter().rev() {
            self.pop_expect(param)?;
        }
        Ok(())
    }

    fn set_unreachable(&mut self) -> Result<()> {
        let frame = self.frames.last_mut().ok_or(WispParseError::TypeMismatch {
            func_idx: self.func_idx,
            message: "no open block".into(),
        })?;
        self.operands.truncate(frame.height);
        frame.unreachable = true;
        Ok(())
    }

    fn label(&self, depth: u32) -> Result<&ControlFrame> {
        let len = self.frames.len();
        if depth as usize >= len {
            return Err(WispParseError::IndexOutOfBounds {
                space: "label",
                index: depth,
                count: len as u32,
            });
        }
        Ok(&self.frames[len - 1 - depth as usize])
    }

    fn local(&self, idx: u32) -> Result<WispValueType> {
        self.locals
            .get(idx as usize)
            .copied()
            .ok_or(WispParseError::IndexOutOfBounds {
                space: "local",
                index: idx,
                count: self.locals.len() as u32,
            })
    }

    fn global(&self, idx: u32) -> Result<WispGlobalType> {
        self.ctx
            .globals
            .get(idx as usize)
            .copied()
            .ok_or(WispParseError::IndexOutOfBounds {
                space: "global",
                index: idx,
                count: self.ctx.globals.len() as u32,
            })
    }

    fn require_memory(&self) -> Result<()> {
        if self.ctx.has_memory {
            Ok(())
        } else {
            Err(WispParseError::IndexOutOfBounds {
                space: "memory",
                index: 0,
                count: 0,
            })
        }
    }

    fn read_block_type(reader: &mut WispReader<'_>) -> Result<Option<WispValueType>> {
        let byte = reader.read_u8()?;
        if byte == 0x40 {
            return Ok(None);
        }
        WispValueType::from_byte(byte)
            .map(Some)
            .ok_or(WispParseError::InvalidValueType(byte))
    }

    fn read_memarg(&self, reader: &mut WispReader<'_>, width: u32) -> Result<WispMemArg> {
        let align = reader.read_u32()?;
        let offset = reader.read_u32()?;
        if align >= 32 || (1u32 << align) > width {
            return Err(self.mismatch("alignment must not be larger than natural"));
        }
        Ok(WispMemArg { align, offset })
    }

    fn read_reserved_zero(reader: &mut WispReader<'_>) -> Result<()> {
        let offset = reader.offset();
        if reader.read_u8()? != 0 {
            return Err(WispParseError::Malformed {
                what: "reserved byte",
                offset,
            });
        }
        Ok(())
    }

    fn open(&mut self, kind: FrameKind, result: Option<WispValueType>, instr: WispInstr) {
        self.frames.push(ControlFrame {
            kind,
            result,
            height: self.operands.len(),
            unreachable: false,
            start: self.code.len(),
            else_at: None,
        });
        self.code.push(instr);
    }

    /// Check the operand stack holds exactly the frame's result.
    fn check_frame_end(&mut self) -> Result<()> {
        let result = self.frame()?.result;
        if let Some(t) = result {
            self.pop_expect(t)?;
        }
        let height = self.frame()?.height;
        if self.operands.len() != height {
            return Err(self.mismatch(format!(
                "{} unexpected value(s) left at end of block",
                self.operands.len() - height
            )));
        }
        Ok(())
    }

    fn step(&mut self, reader: &mut WispReader<'_>) -> Result<()> {
        use WispValueType::*;

        let offset = reader.offset();
        let opcode = reader.read_u8()?;
        match opcode {
            0x00 => {
                self.code.push(WispInstr::Unreachable);
                self.set_unreachable()?;
            }
            0x01 => self.code.push(WispInstr::Nop),
            0x02 => {
                let result = Self::read_block_type(reader)?;
                self.open(FrameKind::Block, result, WispInstr::Block { result, end: 0 });
            }
            0x03 => {
                let result = Self::read_block_type(reader)?;
                self.open(FrameKind::Loop, result, WispInstr::Loop { result });
            }
            0x04 => {
                let result = Self::read_block_type(reader)?;
                self.pop_expect(I32)?;
                self.open(
                    FrameKind::If,
                    result,
                    WispInstr::If {
                        result,
                        else_: None,
                        end: 0,
                    },
                );
            }
            0x05 => {
                if self.frame()?.kind != FrameKind::If {
                    return Err(self.mismatch("else without matching if"));
                }
                self.check_frame_end()?;
                let else_at = self.code.len();
                let start = {
                    let frame = self
                        .frames
                        .last_mut()
                        .ok_or(WispParseError::Malformed { what: "else", offset })?;
                    frame.kind = FrameKind::Else;
                    frame.unreachable = false;
                    frame.else_at = Some(else_at);
                    frame.start
                };
                if let WispInstr::If { else_, .. } = &mut self.code[start] {
                    *else_ = Some(else_at as u32);
                }
                self.code.push(WispInstr::Else { end: 0 });
            }
            0x0b => {
                self.check_frame_end()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or(WispParseError::Malformed { what: "end", offset })?;
                if frame.kind == FrameKind::If && frame.result.is_some() {
                    return Err(self.mismatch("if with a result requires an else branch"));
                }
                let end_at = self.code.len() as u32;
                if frame.kind != FrameKind::Function {
                    match &mut self.code[frame.start] {
                        WispInstr::Block { end, .. } | WispInstr::If { end, .. } => *end = end_at,
                        _ => {}
                    }
                }
                if let Some(else_at) = frame.else_at {
                    if let WispInstr::Else { end } = &mut self.code[else_at] {
                        *end = end_at;
                    }
                }
                self.code.push(WispInstr::End);
                if frame.kind != FrameKind::Function {
                    self.push(frame.result);
                }
            }
            0x0c => {
                let depth = reader.read_u32()?;
                if let Some(t) = self.label(depth)?.label_type() {
                    self.pop_expect(t)?;
                }
                self.code.push(WispInstr::Br(depth));
                self.set_unreachable()?;
            }
            0x0d => {
                let depth = reader.read_u32()?;
                self.pop_expect(I32)?;
                if let Some(t) = self.label(depth)?.label_type() {
                    self.pop_expect(t)?;
                    self.push(Some(t));
                }
                self.code.push(WispInstr::BrIf(depth));
            }
            0x0e => {
                let count = reader.read_vec_len(1)?;
                let mut targets = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    targets.push(reader.read_u32()?);
                }
                let default = reader.read_u32()?;
                self.pop_expect(I32)?;
                let arity = self.label(default)?.label_type();
                for &target in &targets {
                    if self.label(target)?.label_type() != arity {
                        return Err(self.mismatch("br_table targets have inconsistent types"));
                    }
                }
                if let Some(t) = arity {
                    self.pop_expect(t)?;
                }
                self.code.push(WispInstr::BrTable {
                    targets: targets.into_boxed_slice(),
                    default,
                });
                self.set_unreachable()?;
            }
            0x0f => {
                let result = self.frames.first().and_then(|f| f.result);
                if let Some(t) = result {
                    self.pop_expect(t)?;
                }
                self.code.push(WispInstr::Return);
                self.set_unreachable()?;
            }
            0x10 => {
                let callee = reader.read_u32()?;
                let func_type = self.ctx.func_type(callee)?;
                self.pop_params(&func_type.params)?;
                for &r in &func_type.results {
                    self.push(Some(r));
                }
                self.code.push(WispInstr::Call(callee));
            }
            0x11 => {
                let type_idx = reader.read_u32()?;
                Self::read_reserved_zero(reader)?;
                if !self.ctx.has_table {
                    return Err(WispParseError::IndexOutOfBounds {
                        space: "table",
                        index: 0,
                        count: 0,
                    });
                }
                let func_type = self.ctx.type_at(type_idx)?;
                self.pop_expect(I32)?;
                self.pop_params(&func_type.params)?;
                for &r in &func_type.results {
                    self.push(Some(r));
                }
                self.code.push(WispInstr::CallIndirect(type_idx));
            }
            0x1a => {
                self.pop(None)?;
                self.code.push(WispInstr::Drop);
            }
            0x1b => {
                self.pop_expect(I32)?;
                let first = self.pop(None)?;
                let second = self.pop(first)?;
                match (first, second) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(WispParseError::type_mismatch(self.func_idx, Some(a), Some(b)))
                    }
                    _ => {}
                }
                self.push(first.or(second));
                self.code.push(WispInstr::Select);
            }
            0x20 => {
                let idx = reader.read_u32()?;
                let t = self.local(idx)?;
                self.push(Some(t));
                self.code.push(WispInstr::LocalGet(idx));
            }
            0x21 => {
                let idx = reader.read_u32()?;
                let t = self.local(idx)?;
                self.pop_expect(t)?;
                self.code.push(WispInstr::LocalSet(idx));
            }
            0x22 => {
                let idx = reader.read_u32()?;
                let t = self.local(idx)?;
                self.pop_expect(t)?;
                self.push(Some(t));
                self.code.push(WispInstr::LocalTee(idx));
            }
            0x23 => {
                let idx = reader.read_u32()?;
                let global = self.global(idx)?;
                self.push(Some(global.value_type));
                self.code.push(WispInstr::GlobalGet(idx));
            }
            0x24 => {
                let idx = reader.read_u32()?;
                let global = self.global(idx)?;
                if !global.mutable {
                    return Err(self.mismatch(format!("global {idx} is immutable")));
                }
                self.pop_expect(global.value_type)?;
                self.code.push(WispInstr::GlobalSet(idx));
            }
            0x28..=0x35 => {
                let kind = WispLoadKind::from_opcode(opcode)
                    .ok_or(WispParseError::InvalidOpcode { opcode, offset })?;
                self.require_memory()?;
                let memarg = self.read_memarg(reader, kind.width())?;
                self.pop_expect(I32)?;
                self.push(Some(kind.result_type()));
                self.code.push(WispInstr::Load(kind, memarg));
            }
            0x36..=0x3e => {
                let kind = WispStoreKind::from_opcode(opcode)
                    .ok_or(WispParseError::InvalidOpcode { opcode, offset })?;
                self.require_memory()?;
                let memarg = self.read_memarg(reader, kind.width())?;
                self.pop_expect(kind.value_type())?;
                self.pop_expect(I32)?;
                self.code.push(WispInstr::Store(kind, memarg));
            }
            0x3f => {
                Self::read_reserved_zero(reader)?;
                self.require_memory()?;
                self.push(Some(I32));
                self.code.push(WispInstr::MemorySize);
            }
            0x40 => {
                Self::read_reserved_zero(reader)?;
                self.require_memory()?;
                self.pop_expect(I32)?;
                self.push(Some(I32));
                self.code.push(WispInstr::MemoryGrow);
            }
            0x41 => {
                let v = reader.read_i32()?;
                self.push(Some(I32));
                self.code.push(WispInstr::I32Const(v));
            }
            0x42 => {
                let v = reader.read_i64()?;
                self.push(Some(I64));
                self.code.push(WispInstr::I64Const(v));
            }
            0x43 => {
                let bits = reader.read_f32_bits()?;
                self.push(Some(F32));
                self.code.push(WispInstr::F32Const(bits));
            }
            0x44 => {
                let bits = reader.read_f64_bits()?;
                self.push(Some(F64));
                self.code.push(WispInstr::F64Const(bits));
            }
            _ => {
                let op = WispNumOp::from_opcode(opcode)
                    .ok_or(WispParseError::InvalidOpcode { opcode, offset })?;
                let (params, result) = op.signature();
                self.pop_params(params)?;
                self.push(Some(result));
                self.code.push(WispInstr::Numeric(op));
            }
        }
        Ok(())
    }
}
