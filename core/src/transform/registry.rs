//! transform/registry.rs
//! Name → factory resolution for transforms.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::transform::builtin::{IdentityTransform, InvertTransform};
use crate::transform::types::{Transform, TransformError};
use crate::types::WorkerError;

/// Builds a fresh transform. Called on the thread that will own it.
pub type TransformFactory = Arc<dyn Fn() -> Result<Box<dyn Transform>, TransformError> + Send + Sync>;

#[derive(Clone)]
pub struct TransformRegistry {
    factories: BTreeMap<String, TransformFactory>,
}

impl TransformRegistry {
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// Registry preloaded with `identity` and `invert`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("identity", || Ok(Box::new(IdentityTransform) as Box<dyn Transform>));
        registry.register("invert", || Ok(Box::new(InvertTransform) as Box<dyn Transform>));
        registry
    }

    /// Register (or replace) a factory under `name`.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Result<Box<dyn Transform>, TransformError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn factory(&self, name: &str) -> Result<TransformFactory, WorkerError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| WorkerError::UnknownTransform(name.to_string()))
    }

    pub fn build(&self, name: &str) -> Result<Box<dyn Transform>, WorkerError> {
        let factory = self.factory(name)?;
        Ok(factory()?)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
