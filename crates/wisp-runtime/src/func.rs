//! Host function binding.
//!
//! An imported function is a host callable paired with the signature it
//! promises to implement. The callable has the same shape as the executor's
//! own entry point, so host and interpreted functions are interchangeable
//! callees and a host function may re-enter the instance through
//! [`crate::execute`].

use std::fmt;
use std::sync::Arc;

use wisp_parser::{WispFuncType, WispValue};

use crate::instance::WispInstance;
use crate::values::WispExecutionResult;

/// A callable implemented by the embedder.
///
/// `depth` is the call depth this call runs at; a host function calling back
/// into the instance must pass it on unchanged or incremented, never reset.
/// Any context the function needs is owned by the implementing value.
pub trait WispHostFunc: Send + Sync {
    fn call(
        &self,
        instance: &mut WispInstance,
        args: &[WispValue],
        depth: u32,
    ) -> WispExecutionResult;
}

impl<F> WispHostFunc for F
where
    F: Fn(&mut WispInstance, &[WispValue], u32) -> WispExecutionResult + Send + Sync,
{
    fn call(
        &self,
        instance: &mut WispInstance,
        args: &[WispValue],
        depth: u32,
    ) -> WispExecutionResult {
        self(instance, args, depth)
    }
}

/// A host function bound to its signature.
#[derive(Clone)]
pub struct WispExternalFunction {
    pub function: Arc<dyn WispHostFunc>,
    pub func_type: WispFuncType,
}

impl WispExternalFunction {
    pub fn new(function: impl WispHostFunc + 'static, func_type: WispFuncType) -> Self {
        Self {
            function: Arc::new(function),
            func_type,
        }
    }

    #[inline]
    pub fn call(
        &self,
        instance: &mut WispInstance,
        args: &[WispValue],
        depth: u32,
    ) -> WispExecutionResult {
        self.function.call(instance, args, depth)
    }
}

impl fmt::Debug for WispExternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WispExternalFunction")
            .field("func_type", &self.func_type)
            .finish_non_exhaustive()
    }
}
