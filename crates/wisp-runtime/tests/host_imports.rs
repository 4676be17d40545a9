//! Host function imports: binding, type checking, memory access and reentry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use wisp_runtime::{
    execute, instantiate, instantiate_with_config, parse, WispConfig, WispExecutionResult,
    WispExternalFunction, WispFuncType, WispHostFunc, WispImports, WispInstance,
    WispInstantiationError, WispModule, WispTrap, WispValue, WispValueType,
};

use WispValueType::I32;

fn module(wat: &str) -> WispModule {
    parse(&wat::parse_str(wat).unwrap()).unwrap()
}

fn adler32(bytes: &[u8]) -> u32 {
    const MOD: u32 = 65521;
    let (mut a, mut b) = (1u32, 0u32);
    for &byte in bytes {
        a = (a + u32::from(byte)) % MOD;
        b = (b + a) % MOD;
    }
    (b << 16) | a
}

/// `(ptr, len) -> checksum` over the caller's linear memory.
fn adler32_host(
    instance: &mut WispInstance,
    args: &[WispValue],
    _depth: u32,
) -> WispExecutionResult {
    let ptr = args[0].as_u32() as usize;
    let len = args[1].as_u32() as usize;
    let Some(data) = instance.memory_data() else {
        return WispExecutionResult::Trap(WispTrap::Host);
    };
    match ptr.checked_add(len).and_then(|end| data.get(ptr..end)) {
        Some(slice) => WispExecutionResult::Value(adler32(slice).into()),
        None => WispExecutionResult::Trap(WispTrap::Host),
    }
}

const CHECKSUM_WAT: &str = r#"
    (module
        (import "env" "adler32" (func $adler32 (param i32 i32) (result i32)))
        (memory (export "memory") 1)
        (data (i32.const 0) "Wikipedia")
        (func (export "checksum") (param i32 i32) (result i32)
            local.get 0
            local.get 1
            call $adler32))
"#;

fn checksum_import() -> WispExternalFunction {
    WispExternalFunction::new(adler32_host, WispFuncType::new(vec![I32, I32], vec![I32]))
}

#[test]
fn test_host_checksum_over_memory() {
    let mut imports = WispImports::new();
    imports.add_func(checksum_import());
    let mut instance = instantiate(module(CHECKSUM_WAT), imports).unwrap();

    let func = instance.find_exported_function("checksum").unwrap();
    let result = execute(&mut instance, func, &[0i32.into(), 9i32.into()], 0);
    assert_eq!(result.value().unwrap().as_u32(), 0x11e6_0398);

    // The host sees bytes the embedder writes directly.
    instance.memory_data_mut().unwrap()[100..103].copy_from_slice(b"abc");
    let result = execute(&mut instance, func, &[100i32.into(), 3i32.into()], 0);
    assert_eq!(result.value().unwrap().as_u32(), adler32(b"abc"));

    // An out-of-range slice is the host's trap, propagated unchanged.
    let result = execute(&mut instance, func, &[65530i32.into(), 16i32.into()], 0);
    assert_eq!(result, WispExecutionResult::Trap(WispTrap::Host));
}

#[test]
fn test_imported_function_can_be_executed_directly() {
    let mut imports = WispImports::new();
    imports.add_func(checksum_import());
    let mut instance = instantiate(module(CHECKSUM_WAT), imports).unwrap();
    let result = execute(&mut instance, 0, &[0i32.into(), 9i32.into()], 0);
    assert_eq!(result.value().unwrap().as_u32(), 0x11e6_0398);
}

#[test]
fn test_import_count_mismatch() {
    let result = instantiate(module(CHECKSUM_WAT), WispImports::new());
    assert_eq!(
        result.unwrap_err(),
        WispInstantiationError::ImportCountMismatch {
            kind: "function",
            expected: 1,
            provided: 0
        }
    );

    let mut imports = WispImports::new();
    imports.add_func(checksum_import()).add_func(checksum_import());
    assert!(matches!(
        instantiate(module(CHECKSUM_WAT), imports),
        Err(WispInstantiationError::ImportCountMismatch { provided: 2, .. })
    ));
}

#[test]
fn test_import_type_mismatch() {
    let mut imports = WispImports::new();
    imports.add_func(WispExternalFunction::new(
        adler32_host,
        WispFuncType::new(vec![I32], vec![I32]),
    ));
    match instantiate(module(CHECKSUM_WAT), imports).unwrap_err() {
        WispInstantiationError::FunctionTypeMismatch {
            module,
            name,
            expected,
            got,
        } => {
            assert_eq!(module, "env");
            assert_eq!(name, "adler32");
            assert_eq!(expected.to_string(), "(i32,i32)->(i32)");
            assert_eq!(got.params, vec![I32]);
        }
        other => panic!("expected FunctionTypeMismatch, got {:?}", other),
    }
}

/// A host function carrying its own context.
struct Counter {
    calls: Arc<AtomicU32>,
}

impl WispHostFunc for Counter {
    fn call(
        &self,
        _instance: &mut WispInstance,
        args: &[WispValue],
        _depth: u32,
    ) -> WispExecutionResult {
        self.calls.fetch_add(args[0].as_u32(), Ordering::SeqCst);
        WispExecutionResult::Void
    }
}

#[test]
fn test_host_context_and_void_result() {
    let calls = Arc::new(AtomicU32::new(0));
    let mut imports = WispImports::new();
    imports.add_func(WispExternalFunction::new(
        Counter { calls: Arc::clone(&calls) },
        WispFuncType::new(vec![I32], vec![]),
    ));
    let mut instance = instantiate(
        module(
            r#"(module
                (import "env" "tick" (func $tick (param i32)))
                (func (export "run")
                    i32.const 2 call $tick
                    i32.const 5 call $tick))"#,
        ),
        imports,
    )
    .unwrap();
    let func = instance.find_exported_function("run").unwrap();
    assert_eq!(execute(&mut instance, func, &[], 0), WispExecutionResult::Void);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
}

#[test]
fn test_host_result_must_match_signature() {
    fn wrong(_: &mut WispInstance, _: &[WispValue], _: u32) -> WispExecutionResult {
        WispExecutionResult::Void
    }
    let mut imports = WispImports::new();
    imports.add_func(WispExternalFunction::new(wrong, WispFuncType::new(vec![], vec![I32])));
    let mut instance = instantiate(
        module(
            r#"(module
                (import "env" "get" (func $get (result i32)))
                (func (export "f") (result i32) call $get))"#,
        ),
        imports,
    )
    .unwrap();
    let func = instance.find_exported_function("f").unwrap();
    assert_eq!(
        execute(&mut instance, func, &[], 0),
        WispExecutionResult::Trap(WispTrap::Host)
    );
}

const REENTRY_WAT: &str = r#"
    (module
        (import "env" "reenter" (func $reenter (param i32) (result i32)))
        (func (export "count_down") (param i32) (result i32)
            local.get 0
            i32.eqz
            if (result i32)
                i32.const 0
            else
                local.get 0
                i32.const 1
                i32.sub
                call $reenter
                i32.const 1
                i32.add
            end))
"#;

/// Calls back into `count_down`, one level deeper than it was called.
fn reenter(instance: &mut WispInstance, args: &[WispValue], depth: u32) -> WispExecutionResult {
    match instance.find_exported_function("count_down") {
        Some(func) => execute(instance, func, args, depth + 1),
        None => WispExecutionResult::Trap(WispTrap::Host),
    }
}

fn reentry_imports() -> WispImports {
    WispImports::from_functions(vec![WispExternalFunction::new(
        reenter,
        WispFuncType::new(vec![I32], vec![I32]),
    )])
}

#[test]
fn test_host_reentry() {
    let mut instance = instantiate(module(REENTRY_WAT), reentry_imports()).unwrap();
    let func = instance.find_exported_function("count_down").unwrap();
    let result = execute(&mut instance, func, &[10i32.into()], 0);
    assert_eq!(result.value().unwrap().as_i32(), 10);
}

#[test]
fn test_host_reentry_is_depth_limited() {
    let config = WispConfig {
        max_call_depth: 16,
        ..WispConfig::default()
    };
    let mut instance =
        instantiate_with_config(module(REENTRY_WAT), reentry_imports(), config).unwrap();
    let func = instance.find_exported_function("count_down").unwrap();

    // Each level costs two depth units: the host call and the reentry.
    let result = execute(&mut instance, func, &[8i32.into()], 0);
    assert_eq!(result.value().unwrap().as_i32(), 8);

    let result = execute(&mut instance, func, &[1000i32.into()], 0);
    assert_eq!(result, WispExecutionResult::Trap(WispTrap::CallStackExhausted));
}
