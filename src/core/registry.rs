use crate::core::model::{Instance, ModelType};
use crate::utils::error::{KylieError, Result};
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::sync::Arc;

/// Model types addressable by name, in registration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    models: IndexMap<String, Arc<ModelType>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model type under its own name, returning the one it replaced.
    pub fn insert(&mut self, model: Arc<ModelType>) -> Option<Arc<ModelType>> {
        self.models.insert(model.name().to_string(), model)
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ModelType>> {
        self.models.get(name).ok_or_else(|| KylieError::UnknownModel {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn deserialize(&self, model: &str, data: &Json) -> Result<Instance> {
        self.get(model)?.deserialize(data)
    }
}
