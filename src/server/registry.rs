//! Name-keyed table of callable RPC functions
//!
//! Mutation takes the write lock; lookup and invocation take the read lock.
//! An invocation holds the read lock for its whole duration, so a slow
//! function delays pending registrations but never other invocations.
//!
//! Contained invocations replace the default panic report on stderr with a
//! captured backtrace, which is logged only when exception logging is on.
//! Panics elsewhere in the process still reach the previously installed hook.

use std::{
    backtrace::Backtrace,
    cell::{Cell, RefCell},
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, LazyLock, Once},
};

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{value::RawValue, Value};
use tracing::error;

use crate::errors::Error;
use crate::rpc::{ErrorCode, MetaData, RpcError};

pub type RpcResult = Result<Value, RpcError>;

/// Signature of a registered function: raw parameters and the call's
/// metadata set in, result or error out.
pub type RpcFunction = Arc<dyn Fn(Option<&RawValue>, &mut MetaData) -> RpcResult + Send + Sync>;

static BAD_SYMBOL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[^A-Za-z0-9_]").expect("valid function name pattern"));

pub fn check_function_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::EmptyFunctionName);
    }

    match BAD_SYMBOL.find(name) {
        Some(found) => {
            let symbol = found.as_str().chars().next().unwrap_or_default();
            Err(Error::BadSymbolInFunctionName(symbol))
        }
        None => Ok(()),
    }
}

/// How an invocation treats a panicking function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Containment {
    pub catch: bool,
    pub log: bool,
}

#[derive(Default)]
pub struct FunctionRegistry {
    functions: RwLock<HashMap<String, RpcFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F>(&self, name: &str, function: F) -> Result<(), Error>
    where
        F: Fn(Option<&RawValue>, &mut MetaData) -> RpcResult + Send + Sync + 'static,
    {
        check_function_name(name)?;

        let mut functions = self.functions.write();
        if functions.contains_key(name) {
            return Err(Error::duplicate_function(name));
        }

        functions.insert(name.to_string(), Arc::new(function));
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<(), Error> {
        self.functions
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::function_not_found(name))
    }

    pub fn lookup(&self, name: &str) -> Result<(), Error> {
        if self.functions.read().contains_key(name) {
            Ok(())
        } else {
            Err(Error::function_not_found(name))
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.functions.read().len()
    }

    /// Runs a registered function.
    ///
    /// An unregistered name yields "Unknown method" without running anything.
    /// With `containment.catch` a panic becomes "Internal RPC error";
    /// otherwise it unwinds through the caller.
    pub fn invoke(
        &self,
        name: &str,
        params: Option<&RawValue>,
        meta: &mut MetaData,
        containment: Containment,
    ) -> RpcResult {
        let functions = self.functions.read();
        let Some(function) = functions.get(name) else {
            return Err(RpcError::system_or_panic(ErrorCode::UNKNOWN_METHOD));
        };

        if !containment.catch {
            return function(params, meta);
        }

        run_contained(|| function(params, meta)).unwrap_or_else(|fault| {
            if containment.log {
                error!(
                    function = %name,
                    panic = %fault.message,
                    backtrace = fault.backtrace.as_deref().unwrap_or("unavailable"),
                    "rpc function panicked"
                );
            }
            Err(RpcError::system_or_panic(ErrorCode::INTERNAL_RPC_ERROR))
        })
    }
}

thread_local! {
    static CONTAINED: Cell<bool> = const { Cell::new(false) };
    static CAPTURED_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chains a process-wide panic hook that, on a thread running a contained
/// call, records a backtrace instead of printing the default report.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if CONTAINED.with(Cell::get) {
                let backtrace = Backtrace::force_capture().to_string();
                CAPTURED_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(backtrace));
                return;
            }
            previous(info);
        }));
    });
}

pub(crate) struct ContainedPanic {
    pub(crate) message: String,
    pub(crate) backtrace: Option<String>,
}

pub(crate) fn run_contained<T>(call: impl FnOnce() -> T) -> Result<T, ContainedPanic> {
    install_panic_hook();

    let outer = CONTAINED.with(|flag| flag.replace(true));
    CAPTURED_BACKTRACE.with(|slot| slot.borrow_mut().take());
    let outcome = panic::catch_unwind(AssertUnwindSafe(call));
    CONTAINED.with(|flag| flag.set(outer));

    outcome.map_err(|payload| ContainedPanic {
        message: panic_message(payload.as_ref()),
        backtrace: CAPTURED_BACKTRACE.with(|slot| slot.borrow_mut().take()),
    })
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }

    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }

    "non-string panic payload".to_string()
}
