use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::value::RawValue;

use crate::config::{ConfigError, ProcessorSettings};
use crate::errors::Error;
use crate::rpc::MetaData;
use crate::server::registry::{Containment, FunctionRegistry, RpcResult};

/// RPC processor: owns the function table and serves M1 requests.
///
/// Request counters are 64-bit and wrap around after `u64::MAX` calls.
pub struct Processor {
    settings: ProcessorSettings,
    registry: FunctionRegistry,
    requests_all: AtomicU64,
    requests_successful: AtomicU64,
}

impl Processor {
    pub fn new(settings: ProcessorSettings) -> Result<Self, ConfigError> {
        settings.check()?;

        Ok(Self {
            settings,
            registry: FunctionRegistry::new(),
            requests_all: AtomicU64::new(0),
            requests_successful: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &ProcessorSettings {
        &self.settings
    }

    pub fn add_function<F>(&self, name: &str, function: F) -> Result<(), Error>
    where
        F: Fn(Option<&RawValue>, &mut MetaData) -> RpcResult + Send + Sync + 'static,
    {
        self.registry.add(name, function)
    }

    /// # Panics
    ///
    /// Panics if the name is invalid or already registered.
    pub fn add_function_or_panic<F>(&self, name: &str, function: F)
    where
        F: Fn(Option<&RawValue>, &mut MetaData) -> RpcResult + Send + Sync + 'static,
    {
        if let Err(err) = self.add_function(name, function) {
            panic!("{err}");
        }
    }

    pub fn remove_function(&self, name: &str) -> Result<(), Error> {
        self.registry.remove(name)
    }

    pub fn lookup_function(&self, name: &str) -> Result<(), Error> {
        self.registry.lookup(name)
    }

    /// Runs a registered function under the configured containment policy.
    pub fn invoke(&self, name: &str, params: Option<&RawValue>, meta: &mut MetaData) -> RpcResult {
        let containment = Containment {
            catch: self.settings.catch_exceptions,
            log: self.settings.log_exceptions,
        };
        self.registry.invoke(name, params, meta, containment)
    }

    /// Returns the number of all received and of successful calls.
    pub fn requests_count(&self) -> (u64, u64) {
        (
            self.requests_all.load(Ordering::Relaxed),
            self.requests_successful.load(Ordering::Relaxed),
        )
    }

    pub(crate) fn count_received(&self) {
        if self.settings.count_requests {
            self.requests_all.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn count_successful(&self) {
        if self.settings.count_requests {
            self.requests_successful.fetch_add(1, Ordering::Relaxed);
        }
    }
}
