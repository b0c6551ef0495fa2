// Licensed under the Apache-2.0 license

use super::{Adapter, CpuifAdapter};
use crate::error::StructuralError;
use std::collections::BTreeMap;

pub type AdapterFactory = Box<dyn Fn() -> Adapter>;

/// Resolves CPU interface names to adapters.
///
/// # Example
///
/// ```
/// use registers_busdecoder::cpuif::{AdapterRegistry, CpuifAdapter, Family};
///
/// let registry = AdapterRegistry::new();
/// let adapter = registry.create("axi4-lite").unwrap();
/// assert_eq!(adapter.family(), Family::SplitChannel);
/// assert!(registry.create("wishbone").is_err());
/// ```
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    /// A registry holding the built-in adapters.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_adapter("apb3", || Adapter::Apb3);
        registry.register_adapter("apb4", || Adapter::Apb4);
        registry.register_adapter("taxi-apb", || Adapter::TaxiApb);
        registry.register_adapter("axi4-lite", || Adapter::AxiLite { strict: false });
        registry.register_adapter("axi4-lite-strict", || Adapter::AxiLite { strict: true });
        registry
    }

    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    fn register_adapter(&mut self, name: &str, factory: impl Fn() -> Adapter + 'static) {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Register a custom adapter. Replaces any adapter of the same name.
    pub fn register<A, F>(&mut self, name: &str, factory: F)
    where
        A: CpuifAdapter + 'static,
        F: Fn() -> A + 'static,
    {
        self.register_adapter(name, move || Adapter::Custom(Box::new(factory())));
    }

    pub fn create(&self, name: &str) -> Result<Adapter, StructuralError> {
        self.factories
            .get(name)
            .map(|f| f())
            .ok_or_else(|| StructuralError::UnknownCpuif {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
