use crate::core::model::ModelType;
use crate::utils::error::{KylieError, Result};
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_DISCRIMINATOR_KEY: &str = "__type__";

pub type ResolveFn = dyn Fn(&Map<String, Json>) -> Result<Arc<ModelType>> + Send + Sync;

/// Picks the model type used to deserialize a nested mapping.
///
/// Serialization never consults the resolver: an instance is always written
/// through its own model type.
#[derive(Clone)]
pub enum Resolver {
    /// Always the same model type.
    Fixed(Arc<ModelType>),
    /// Looks up a tag value stored under a key of the nested mapping.
    Discriminated(Discriminated),
    /// Caller-supplied resolution function.
    Custom(Arc<ResolveFn>),
}

impl Resolver {
    pub fn custom<F>(resolve: F) -> Self
    where
        F: Fn(&Map<String, Json>) -> Result<Arc<ModelType>> + Send + Sync + 'static,
    {
        Resolver::Custom(Arc::new(resolve))
    }

    pub fn resolve(&self, data: &Map<String, Json>) -> Result<Arc<ModelType>> {
        match self {
            Resolver::Fixed(model) => Ok(model.clone()),
            Resolver::Discriminated(discriminated) => discriminated.resolve(data),
            Resolver::Custom(resolve) => resolve(data),
        }
    }
}

impl From<Arc<ModelType>> for Resolver {
    fn from(model: Arc<ModelType>) -> Self {
        Resolver::Fixed(model)
    }
}

impl From<&Arc<ModelType>> for Resolver {
    fn from(model: &Arc<ModelType>) -> Self {
        Resolver::Fixed(model.clone())
    }
}

impl From<Discriminated> for Resolver {
    fn from(discriminated: Discriminated) -> Self {
        Resolver::Discriminated(discriminated)
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Fixed(model) => f.debug_tuple("Fixed").field(&model.name()).finish(),
            Resolver::Discriminated(discriminated) => {
                f.debug_tuple("Discriminated").field(discriminated).finish()
            }
            Resolver::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Tag value -> model type table keyed on one field of the nested mapping.
///
/// A tag maps to exactly one model type. Registering a second, different
/// model under a taken tag keeps the first one and is reported by
/// [`Discriminated::check`], which `ModelBuilder::build` runs.
#[derive(Clone)]
pub struct Discriminated {
    key: String,
    choices: IndexMap<String, Arc<ModelType>>,
    conflict: Option<(String, String, String)>,
}

impl Discriminated {
    pub fn new() -> Self {
        Self {
            key: DEFAULT_DISCRIMINATOR_KEY.to_string(),
            choices: IndexMap::new(),
            conflict: None,
        }
    }

    /// Build the table from each model's declared tag.
    pub fn from_tags<'a, I>(models: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Arc<ModelType>>,
    {
        let mut discriminated = Self::new();
        for model in models {
            let tag = model.tag().ok_or_else(|| KylieError::MissingTag {
                model: model.name().to_string(),
            })?;
            discriminated.insert(tag.to_string(), model)?;
        }
        Ok(discriminated)
    }

    fn insert(&mut self, tag: String, model: &Arc<ModelType>) -> Result<()> {
        match self.choices.entry(tag) {
            Entry::Occupied(entry) if !Arc::ptr_eq(entry.get(), model) => Err(KylieError::DuplicateTag {
                tag: entry.key().clone(),
                first: entry.get().name().to_string(),
                second: model.name().to_string(),
            }),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(entry) => {
                entry.insert(model.clone());
                Ok(())
            }
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn variant(mut self, tag: impl Into<String>, model: &Arc<ModelType>) -> Self {
        if let Err(KylieError::DuplicateTag { tag, first, second }) = self.insert(tag.into(), model) {
            self.conflict.get_or_insert((tag, first, second));
        }
        self
    }

    /// Fails if two different model types were registered under one tag.
    pub fn check(&self) -> Result<()> {
        match &self.conflict {
            Some((tag, first, second)) => Err(KylieError::DuplicateTag {
                tag: tag.clone(),
                first: first.clone(),
                second: second.clone(),
            }),
            None => Ok(()),
        }
    }

    pub fn discriminator_key(&self) -> &str {
        &self.key
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.choices.keys().map(String::as_str)
    }

    pub fn resolve(&self, data: &Map<String, Json>) -> Result<Arc<ModelType>> {
        let raw = data
            .get(&self.key)
            .ok_or_else(|| KylieError::UnknownDiscriminator {
                key: self.key.clone(),
                value: None,
            })?;

        // Non-string tags never match a registered tag but are reported verbatim.
        let found = match raw {
            Json::String(tag) => self.choices.get(tag),
            _ => None,
        };

        found.cloned().ok_or_else(|| {
            let value = match raw {
                Json::String(tag) => tag.clone(),
                other => other.to_string(),
            };
            tracing::debug!(key = %self.key, %value, "no model registered for discriminator");
            KylieError::UnknownDiscriminator {
                key: self.key.clone(),
                value: Some(value),
            }
        })
    }
}

impl Default for Discriminated {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Discriminated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let choices: Vec<(&str, &str)> = self
            .choices
            .iter()
            .map(|(tag, model)| (tag.as_str(), model.name()))
            .collect();
        f.debug_struct("Discriminated")
            .field("key", &self.key)
            .field("choices", &choices)
            .finish()
    }
}
