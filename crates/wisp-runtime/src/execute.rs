//! The interpreter.
//!
//! Calls between interpreted functions run on an explicit frame stack inside
//! a single [`execute`] invocation, so the native stack does not grow with
//! wasm recursion. Host functions that re-enter the instance call `execute`
//! again; the depth counter they pass on bounds that recursion too.
//!
//! All frames of one invocation share an operand stack, a locals stack and
//! a label stack. Each frame records where its region of each begins.

use std::sync::Arc;

use log::{debug, trace};
use wisp_parser::{
    WispFuncType, WispInstr, WispLoadKind, WispMemArg, WispModule, WispStoreKind, WispValue,
};

use crate::error::WispTrap;
use crate::instance::WispInstance;
use crate::memory::WispMemInst;
use crate::numeric;
use crate::values::WispExecutionResult;

/// Call function `func_idx` of `instance` with `args` at call depth `depth`.
///
/// Top-level host calls pass depth 0. The call traps with
/// `CallStackExhausted` if `depth` exceeds the instance's configured maximum,
/// and every call it makes runs one level deeper.
///
/// A trap is reported in the result; memory and global writes that
/// completed before the trap remain visible.
pub fn execute(
    instance: &mut WispInstance,
    func_idx: u32,
    args: &[WispValue],
    depth: u32,
) -> WispExecutionResult {
    trace!("execute function {func_idx} at depth {depth} with {} argument(s)", args.len());
    let result = invoke(instance, func_idx, args, depth);
    if let WispExecutionResult::Trap(trap) = result {
        debug!("function {func_idx} trapped at depth {depth}: {trap}");
    }
    result
}

fn invoke(
    instance: &mut WispInstance,
    func_idx: u32,
    args: &[WispValue],
    depth: u32,
) -> WispExecutionResult {
    if depth > instance.config.max_call_depth {
        return WispTrap::CallStackExhausted.into();
    }

    let module = Arc::clone(&instance.module);
    let Some(func_type) = module.func_type(func_idx) else {
        return WispTrap::InvalidFunctionIndex(func_idx).into();
    };
    if args.len() != func_type.params.len() {
        return WispTrap::ArgumentCountMismatch {
            expected: func_type.params.len(),
            provided: args.len(),
        }
        .into();
    }

    // Host results are passed through as-is.
    if func_idx < module.num_imported_functions() {
        return match instance.imported_functions.get(func_idx as usize).cloned() {
            Some(host) => host.call(instance, args, depth),
            None => WispTrap::InvalidFunctionIndex(func_idx).into(),
        };
    }

    let mut machine = Machine::default();
    machine.stack.extend_from_slice(args);
    let outcome = machine
        .enter(&module, func_idx, depth)
        .and_then(|()| machine.run(instance, &module));
    match outcome {
        Ok(value) => value.into(),
        Err(trap) => trap.into(),
    }
}

/// A branch target.
#[derive(Debug, Clone, Copy)]
struct Label {
    /// Operand stack height when the label was entered.
    height: usize,
    /// Number of values a branch to this label carries.
    arity: usize,
    /// Instruction index a branch continues at.
    cont: usize,
}

#[derive(Debug)]
struct Frame<'m> {
    code: &'m [WispInstr],
    pc: usize,
    locals_base: usize,
    /// Index of the function-level label.
    labels_base: usize,
    stack_base: usize,
    arity: usize,
    depth: u32,
}

#[derive(Debug, Default)]
struct Machine<'m> {
    stack: Vec<WispValue>,
    locals: Vec<WispValue>,
    labels: Vec<Label>,
    frames: Vec<Frame<'m>>,
}

impl<'m> Machine<'m> {
    #[inline]
    fn pop(&mut self) -> WispValue {
        self.stack.pop().unwrap_or(WispValue::ZERO)
    }

    #[inline]
    fn push(&mut self, value: impl Into<WispValue>) {
        self.stack.push(value.into());
    }

    /// Push a frame for local function `func_idx`, whose arguments are on
    /// top of the operand stack.
    fn enter(&mut self, module: &'m WispModule, func_idx: u32, depth: u32) -> Result<(), WispTrap> {
        let (Some(func_type), Some(code)) = (module.func_type(func_idx), module.code(func_idx))
        else {
            return Err(WispTrap::InvalidFunctionIndex(func_idx));
        };
        let stack_base = self.stack.len() - func_type.params.len();
        let locals_base = self.locals.len();
        self.locals.extend(self.stack.drain(stack_base..));
        self.locals
            .extend(code.local_types.iter().map(|&t| WispValue::default_for_type(t)));

        let arity = func_type.results.len();
        self.labels.push(Label {
            height: stack_base,
            arity,
            cont: code.instrs.len(),
        });
        self.frames.push(Frame {
            code: &code.instrs,
            pc: 0,
            locals_base,
            labels_base: self.labels.len() - 1,
            stack_base,
            arity,
            depth,
        });
        Ok(())
    }

    /// Pop the finished top frame, leaving its results on the operand stack.
    /// Returns the final result once the outermost frame has returned.
    fn leave(&mut self) -> Option<Option<WispValue>> {
        let frame = self.frames.pop()?;
        let results_start = self.stack.len() - frame.arity;
        self.stack.drain(frame.stack_base..results_start);
        self.locals.truncate(frame.locals_base);
        self.labels.truncate(frame.labels_base);
        if self.frames.is_empty() {
            let result = (frame.arity == 1).then(|| self.pop());
            return Some(result);
        }
        None
    }

    /// Unwind to the label `relative` levels out and return where execution
    /// continues.
    fn branch(&mut self, relative: u32) -> usize {
        let target = self.labels.len() - 1 - relative as usize;
        let label = self.labels[target];
        let len = self.stack.len();
        self.stack.copy_within(len - label.arity..len, label.height);
        self.stack.truncate(label.height + label.arity);
        // Loops re-enter their label by executing the `Loop` again.
        self.labels.truncate(target);
        label.cont
    }

    fn memory<'i>(
        instance: &'i mut WispInstance,
        address: u64,
        size: u32,
    ) -> Result<&'i mut WispMemInst, WispTrap> {
        instance.memory.as_mut().ok_or(WispTrap::MemoryOutOfBounds {
            address,
            size,
            memory_size: 0,
        })
    }

    fn load(
        &mut self,
        instance: &mut WispInstance,
        kind: WispLoadKind,
        memarg: WispMemArg,
    ) -> Result<(), WispTrap> {
        let address = u64::from(self.pop().as_u32()) + u64::from(memarg.offset);
        let width = kind.width();
        let memory = Self::memory(instance, address, width)?;
        let mut buf = [0u8; 8];
        buf[..width as usize].copy_from_slice(memory.read(address, width)?);
        let bits = u64::from_le_bytes(buf);

        use WispLoadKind::*;
        let value = match kind {
            I32Load8S => WispValue::from(bits as u8 as i8 as i32),
            I32Load16S => WispValue::from(bits as u16 as i16 as i32),
            I64Load8S => WispValue::from(bits as u8 as i8 as i64),
            I64Load16S => WispValue::from(bits as u16 as i16 as i64),
            I64Load32S => WispValue::from(bits as u32 as i32 as i64),
            // Everything else is zero-extended, which is what the cell stores.
            _ => WispValue::from_bits(bits),
        };
        self.stack.push(value);
        Ok(())
    }

    fn store(
        &mut self,
        instance: &mut WispInstance,
        kind: WispStoreKind,
        memarg: WispMemArg,
    ) -> Result<(), WispTrap> {
        let value = self.pop();
        let address = u64::from(self.pop().as_u32()) + u64::from(memarg.offset);
        let width = kind.width();
        let memory = Self::memory(instance, address, width)?;
        // Narrow stores keep the low bytes of the cell.
        memory.write(address, &value.to_le_bytes()[..width as usize])
    }

    /// Call function `func_idx` from the current frame, whose `pc` already
    /// points past the call.
    fn call(
        &mut self,
        instance: &mut WispInstance,
        module: &'m WispModule,
        func_idx: u32,
        func_type: &WispFuncType,
        depth: u32,
    ) -> Result<(), WispTrap> {
        let callee_depth = depth + 1;
        if callee_depth > instance.config.max_call_depth {
            return Err(WispTrap::CallStackExhausted);
        }
        if func_idx >= module.num_imported_functions() {
            return self.enter(module, func_idx, callee_depth);
        }

        let host = instance
            .imported_functions
            .get(func_idx as usize)
            .cloned()
            .ok_or(WispTrap::InvalidFunctionIndex(func_idx))?;
        let args = self.stack.split_off(self.stack.len() - func_type.params.len());
        trace!("host call to function {func_idx} at depth {callee_depth}");
        match (host.call(instance, &args, callee_depth), func_type.results.len()) {
            (WispExecutionResult::Trap(trap), _) => Err(trap),
            (WispExecutionResult::Void, 0) => Ok(()),
            (WispExecutionResult::Value(value), 1) => {
                self.stack.push(value);
                Ok(())
            }
            (result, _) => {
                debug!("host function {func_idx} returned {result:?}, expected type {func_type}");
                Err(WispTrap::Host)
            }
        }
    }

    fn run(
        &mut self,
        instance: &mut WispInstance,
        module: &'m WispModule,
    ) -> Result<Option<WispValue>, WispTrap> {
        loop {
            let Some(frame) = self.frames.last() else {
                return Ok(None);
            };
            let (code, pc, depth) = (frame.code, frame.pc, frame.depth);
            if pc >= code.len() {
                if let Some(result) = self.leave() {
                    return Ok(result);
                }
                continue;
            }

            let mut next = pc + 1;
            match &code[pc] {
                WispInstr::Unreachable => return Err(WispTrap::Unreachable),
                WispInstr::Nop => {}
                WispInstr::Block { result, end } => self.labels.push(Label {
                    height: self.stack.len(),
                    arity: usize::from(result.is_some()),
                    cont: *end as usize + 1,
                }),
                WispInstr::Loop { .. } => self.labels.push(Label {
                    height: self.stack.len(),
                    arity: 0,
                    cont: pc,
                }),
                WispInstr::If { result, else_, end } => {
                    let condition = self.pop().as_i32();
                    let label = Label {
                        height: self.stack.len(),
                        arity: usize::from(result.is_some()),
                        cont: *end as usize + 1,
                    };
                    if condition != 0 {
                        self.labels.push(label);
                    } else if let Some(else_at) = else_ {
                        self.labels.push(label);
                        next = *else_at as usize + 1;
                    } else {
                        next = *end as usize + 1;
                    }
                }
                // Reached by falling out of the `then` arm.
                WispInstr::Else { end } => {
                    self.labels.pop();
                    next = *end as usize + 1;
                }
                WispInstr::End => {
                    self.labels.pop();
                }
                WispInstr::Br(relative) => next = self.branch(*relative),
                WispInstr::BrIf(relative) => {
                    if self.pop().as_i32() != 0 {
                        next = self.branch(*relative);
                    }
                }
                WispInstr::BrTable { targets, default } => {
                    let index = self.pop().as_u32() as usize;
                    let relative = targets.get(index).copied().unwrap_or(*default);
                    next = self.branch(relative);
                }
                WispInstr::Return => {
                    let labels_base = self.frames.last().map_or(0, |f| f.labels_base);
                    let relative = self.labels.len() - 1 - labels_base;
                    next = self.branch(relative as u32);
                }
                WispInstr::Call(func_idx) => {
                    let func_type = module
                        .func_type(*func_idx)
                        .ok_or(WispTrap::InvalidFunctionIndex(*func_idx))?;
                    self.set_pc(next);
                    self.call(instance, module, *func_idx, func_type, depth)?;
                    continue;
                }
                WispInstr::CallIndirect(type_idx) => {
                    let index = self.pop().as_u32();
                    let table = instance.table.as_ref().ok_or(WispTrap::TableOutOfBounds {
                        index,
                        table_size: 0,
                    })?;
                    let func_idx = table.get(index)?.ok_or(WispTrap::IndirectCallToNull)?;
                    let expected = module.types().get(*type_idx as usize);
                    let func_type = match module.func_type(func_idx) {
                        Some(actual) if Some(actual) == expected => actual,
                        _ => {
                            return Err(WispTrap::IndirectCallTypeMismatch {
                                expected_type: *type_idx,
                            })
                        }
                    };
                    self.set_pc(next);
                    self.call(instance, module, func_idx, func_type, depth)?;
                    continue;
                }

                WispInstr::Drop => {
                    self.pop();
                }
                WispInstr::Select => {
                    let condition = self.pop().as_i32();
                    let second = self.pop();
                    let first = self.pop();
                    self.stack.push(if condition != 0 { first } else { second });
                }

                WispInstr::LocalGet(idx) => {
                    let value = self.locals[self.locals_base() + *idx as usize];
                    self.stack.push(value);
                }
                WispInstr::LocalSet(idx) => {
                    let value = self.pop();
                    let slot = self.locals_base() + *idx as usize;
                    self.locals[slot] = value;
                }
                WispInstr::LocalTee(idx) => {
                    let value = self.stack.last().copied().unwrap_or(WispValue::ZERO);
                    let slot = self.locals_base() + *idx as usize;
                    self.locals[slot] = value;
                }
                WispInstr::GlobalGet(idx) => {
                    let value = instance.globals[*idx as usize].get();
                    self.stack.push(value);
                }
                WispInstr::GlobalSet(idx) => {
                    let value = self.pop();
                    instance.globals[*idx as usize].set(value);
                }

                WispInstr::Load(kind, memarg) => self.load(instance, *kind, *memarg)?,
                WispInstr::Store(kind, memarg) => self.store(instance, *kind, *memarg)?,
                WispInstr::MemorySize => {
                    let pages = instance.memory.as_ref().map_or(0, WispMemInst::size_pages);
                    self.push(pages);
                }
                WispInstr::MemoryGrow => {
                    let delta = self.pop().as_u32();
                    let old = instance.memory.as_mut().and_then(|m| m.grow(delta));
                    self.push(old.map_or(-1, |pages| pages as i32));
                }

                WispInstr::I32Const(v) => self.push(*v),
                WispInstr::I64Const(v) => self.push(*v),
                WispInstr::F32Const(bits) => self.push(*bits),
                WispInstr::F64Const(bits) => self.push(*bits),

                WispInstr::Numeric(op) => {
                    let value = numeric::eval(*op, &mut self.stack)?;
                    self.stack.push(value);
                }
            }
            self.set_pc(next);
        }
    }

    #[inline]
    fn set_pc(&mut self, pc: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = pc;
        }
    }

    #[inline]
    fn locals_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.locals_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imports::WispImports;
    use crate::instance::instantiate;
    use wisp_parser::parse;

    fn instance(wat: &str) -> WispInstance {
        let module = parse(&wat::parse_str(wat).unwrap()).unwrap();
        instantiate(module, WispImports::new()).unwrap()
    }

    fn call(instance: &mut WispInstance, name: &str, args: &[WispValue]) -> WispExecutionResult {
        let func_idx = instance.find_exported_function(name).unwrap();
        execute(instance, func_idx, args, 0)
    }

    #[test]
    fn test_add() {
        let mut inst = instance(
            r#"(module (func (export "add") (param i32 i32) (result i32)
                local.get 0 local.get 1 i32.add))"#,
        );
        let result = call(&mut inst, "add", &[2i32.into(), 40i32.into()]);
        assert_eq!(result, WispExecutionResult::Value(42i32.into()));
    }

    #[test]
    fn test_void_function() {
        let mut inst = instance(r#"(module (func (export "nop") nop))"#);
        assert_eq!(call(&mut inst, "nop", &[]), WispExecutionResult::Void);
    }

    #[test]
    fn test_locals_are_zeroed() {
        let mut inst = instance(
            r#"(module (func (export "f") (result i64) (local i64 f64)
                local.get 0))"#,
        );
        assert_eq!(call(&mut inst, "f", &[]).value().unwrap().as_i64(), 0);
    }

    #[test]
    fn test_block_branch_keeps_result() {
        let mut inst = instance(
            r#"(module (func (export "f") (param i32) (result i32)
                (block (result i32)
                    i32.const 1
                    i32.const 10
                    local.get 0
                    br_if 0
                    drop
                    drop
                    i32.const 20)))"#,
        );
        assert_eq!(call(&mut inst, "f", &[1i32.into()]).value().unwrap().as_i32(), 10);
        assert_eq!(call(&mut inst, "f", &[0i32.into()]).value().unwrap().as_i32(), 20);
    }

    #[test]
    fn test_if_else() {
        let mut inst = instance(
            r#"(module (func (export "max") (param i32 i32) (result i32)
                local.get 0 local.get 1 i32.gt_s
                if (result i32) local.get 0 else local.get 1 end))"#,
        );
        let max = |inst: &mut WispInstance, a: i32, b: i32| {
            call(inst, "max", &[a.into(), b.into()]).value().unwrap().as_i32()
        };
        assert_eq!(max(&mut inst, 3, 9), 9);
        assert_eq!(max(&mut inst, -3, -9), -3);
    }

    #[test]
    fn test_if_without_else() {
        let mut inst = instance(
            r#"(module (func (export "f") (param i32) (result i32) (local i32)
                i32.const 5 local.set 1
                local.get 0 if i32.const 7 local.set 1 end
                local.get 1))"#,
        );
        assert_eq!(call(&mut inst, "f", &[0i32.into()]).value().unwrap().as_i32(), 5);
        assert_eq!(call(&mut inst, "f", &[1i32.into()]).value().unwrap().as_i32(), 7);
    }

    #[test]
    fn test_loop_sum() {
        let mut inst = instance(
            r#"(module (func (export "sum") (param i32) (result i32) (local i32)
                (block
                    (loop
                        local.get 0 i32.eqz br_if 1
                        local.get 1 local.get 0 i32.add local.set 1
                        local.get 0 i32.const 1 i32.sub local.set 0
                        br 0))
                local.get 1))"#,
        );
        assert_eq!(call(&mut inst, "sum", &[100i32.into()]).value().unwrap().as_i32(), 5050);
    }

    #[test]
    fn test_br_table() {
        let mut inst = instance(
            r#"(module (func (export "classify") (param i32) (result i32)
                (block (block (block
                    local.get 0
                    br_table 0 1 2)
                    i32.const 100 return)
                    i32.const 101 return)
                i32.const 102))"#,
        );
        for (arg, expected) in [(0, 100), (1, 101), (2, 102), (7, 102), (-1, 102)] {
            let result = call(&mut inst, "classify", &[WispValue::from(arg)]);
            assert_eq!(result.value().unwrap().as_i32(), expected, "arg {arg}");
        }
    }

    #[test]
    fn test_return_from_nested_block() {
        let mut inst = instance(
            r#"(module (func (export "f") (result i32)
                (block (loop (block i32.const 3 i32.const 4 return)))
                i32.const 0))"#,
        );
        assert_eq!(call(&mut inst, "f", &[]).value().unwrap().as_i32(), 4);
    }

    #[test]
    fn test_recursive_factorial() {
        let mut inst = instance(
            r#"(module (func $fac (export "fac") (param i64) (result i64)
                local.get 0 i64.eqz
                if (result i64) i64.const 1
                else local.get 0 local.get 0 i64.const 1 i64.sub call $fac i64.mul end))"#,
        );
        let result = call(&mut inst, "fac", &[20i64.into()]);
        assert_eq!(result.value().unwrap().as_i64(), 2432902008176640000);
    }

    #[test]
    fn test_select_and_drop() {
        let mut inst = instance(
            r#"(module (func (export "f") (param i32) (result i64)
                i64.const 1 i64.const 2 local.get 0 select
                i32.const 9 drop))"#,
        );
        assert_eq!(call(&mut inst, "f", &[1i32.into()]).value().unwrap().as_i64(), 1);
        assert_eq!(call(&mut inst, "f", &[0i32.into()]).value().unwrap().as_i64(), 2);
    }

    #[test]
    fn test_sign_extending_loads_and_narrow_stores() {
        let mut inst = instance(
            r#"(module (memory 1)
                (func (export "f") (result i64)
                    i32.const 0 i64.const -1 i64.store8
                    i32.const 0 i64.load8_s)
                (func (export "g") (result i32)
                    i32.const 8 i32.const 0x12345678 i32.store16
                    i32.const 8 i32.load))"#,
        );
        assert_eq!(call(&mut inst, "f", &[]).value().unwrap().as_i64(), -1);
        assert_eq!(call(&mut inst, "g", &[]).value().unwrap().as_i32(), 0x5678);
    }

    #[test]
    fn test_effective_address_does_not_wrap() {
        let mut inst = instance(
            r#"(module (memory 1)
                (func (export "f") (param i32) (result i32)
                    local.get 0 i32.load offset=4))"#,
        );
        let result = call(&mut inst, "f", &[(-4i32).into()]);
        assert!(matches!(result, WispExecutionResult::Trap(WispTrap::MemoryOutOfBounds { .. })));
    }

    #[test]
    fn test_memory_size_and_grow() {
        let mut inst = instance(
            r#"(module (memory 1 2)
                (func (export "grow") (param i32) (result i32) local.get 0 memory.grow)
                (func (export "size") (result i32) memory.size))"#,
        );
        assert_eq!(call(&mut inst, "grow", &[1i32.into()]).value().unwrap().as_i32(), 1);
        assert_eq!(call(&mut inst, "size", &[]).value().unwrap().as_i32(), 2);
        assert_eq!(call(&mut inst, "grow", &[1i32.into()]).value().unwrap().as_i32(), -1);
        assert_eq!(inst.memory_size(), 2 * 65536);
    }

    #[test]
    fn test_invalid_function_index_and_arguments() {
        let mut inst = instance(r#"(module (func (export "f") (param i32)))"#);
        assert_eq!(
            execute(&mut inst, 5, &[], 0),
            WispExecutionResult::Trap(WispTrap::InvalidFunctionIndex(5))
        );
        assert_eq!(
            execute(&mut inst, 0, &[], 0),
            WispExecutionResult::Trap(WispTrap::ArgumentCountMismatch { expected: 1, provided: 0 })
        );
    }

    #[test]
    fn test_depth_above_maximum_traps_before_running() {
        let mut inst = instance(
            r#"(module (global (mut i32) (i32.const 0))
                (func (export "f") i32.const 1 global.set 0))"#,
        );
        let max = inst.config().max_call_depth;
        assert_eq!(
            execute(&mut inst, 0, &[], max + 1),
            WispExecutionResult::Trap(WispTrap::CallStackExhausted)
        );
        assert_eq!(inst.global(0).unwrap().as_i32(), 0);
        assert_eq!(execute(&mut inst, 0, &[], max), WispExecutionResult::Void);
        assert_eq!(inst.global(0).unwrap().as_i32(), 1);
    }
}
