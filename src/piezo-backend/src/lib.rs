// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;
use std::sync::Arc;

use piezo_core::{DynResult, PiezoHal};

pub mod sim;

pub use sim::{SimBus, SimCounters, SimSettings};

/// Settings handed to backend factories.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub sim: SimSettings,
}

pub type BackendFactory = fn(BackendOptions) -> DynResult<Arc<dyn PiezoHal>>;

/// Context for registering and instantiating controller backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    /// Create a new empty registration context.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "sim").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        let key = normalize_name(name);
        self.factories.insert(key, factory);
    }

    /// Check whether a backend name is registered.
    pub fn is_backend_registered(&self, name: &str) -> bool {
        let key = normalize_name(name);
        self.factories.contains_key(&key)
    }

    /// List registered backend names.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a backend by name.
    pub fn build_hal(&self, name: &str, options: BackendOptions) -> DynResult<Arc<dyn PiezoHal>> {
        let key = normalize_name(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| format!("Unknown controller backend: {}", name))?;
        factory(options)
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Register all built-in backends on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("sim", sim_factory);
}

fn sim_factory(options: BackendOptions) -> DynResult<Arc<dyn PiezoHal>> {
    Ok(Arc::new(SimBus::new(options.sim)))
}
