//! Model types and model instances.
//!
//! A [`ModelType`] is declared once through [`ModelBuilder`] and is immutable
//! afterwards, so it can be shared freely between threads behind an `Arc`.
//! [`Instance`] is a plain value: an attribute-name -> [`Value`] map tagged with
//! the model type it belongs to.

use crate::core::field::{Descriptor, DescriptorKind};
use crate::core::resolver::Resolver;
use crate::domain::value::Value;
use crate::utils::error::{json_kind, KylieError, Result};
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Hook run after the descriptors have written the output mapping.
pub type PostSerializeHook = Arc<dyn Fn(&Instance, &mut Map<String, Json>) -> Result<()> + Send + Sync>;

pub struct ModelType {
    name: String,
    tag: Option<String>,
    tag_key: Option<String>,
    descriptors: Vec<Descriptor>,
    post_serialize: Option<PostSerializeHook>,
}

impl ModelType {
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, attribute: &str) -> Option<&Descriptor> {
        self.descriptors.iter().find(|d| d.attribute() == attribute)
    }

    /// Instance with no attributes set at all.
    pub fn blank(self: &Arc<Self>) -> Instance {
        Instance {
            model: self.clone(),
            attributes: IndexMap::with_capacity(self.descriptors.len()),
        }
    }

    /// Instance with every declared attribute set to null.
    pub fn new_instance(self: &Arc<Self>) -> Instance {
        let mut instance = self.blank();
        for descriptor in &self.descriptors {
            instance.set(descriptor.attribute(), Value::Null);
        }
        instance
    }

    /// Construct an instance directly from named values.
    ///
    /// Attributes not named stay null. Names are not checked against the
    /// declared descriptors; undeclared ones are kept but never serialized.
    pub fn instantiate<I, K, V>(self: &Arc<Self>, values: I) -> Instance
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut instance = self.new_instance();
        for (attribute, value) in values {
            instance.set(attribute, value);
        }
        instance
    }

    pub fn deserialize(self: &Arc<Self>, data: &Json) -> Result<Instance> {
        let map = data.as_object().ok_or_else(|| KylieError::NotAMapping {
            model: self.name.clone(),
            found: json_kind(data),
        })?;
        self.deserialize_map(map)
    }

    /// Fails on the first descriptor (in declaration order) that cannot be pulled.
    pub fn deserialize_map(self: &Arc<Self>, data: &Map<String, Json>) -> Result<Instance> {
        tracing::trace!(model = %self.name, keys = data.len(), "deserializing");
        let mut instance = self.blank();
        for descriptor in &self.descriptors {
            let value = descriptor.pull(&self.name, data)?;
            instance.set(descriptor.attribute(), value);
        }
        Ok(instance)
    }

    fn serialize_instance(&self, instance: &Instance) -> Result<Map<String, Json>> {
        tracing::trace!(model = %self.name, "serializing");
        let mut out = Map::with_capacity(self.descriptors.len() + 1);
        for descriptor in &self.descriptors {
            let value = instance.attributes.get(descriptor.attribute()).ok_or_else(|| {
                KylieError::AttributeNotSet {
                    model: self.name.clone(),
                    attribute: descriptor.attribute().to_string(),
                }
            })?;
            let (key, serialized) = descriptor.push(&self.name, value)?;
            out.insert(key, serialized);
        }

        if let (Some(key), Some(tag)) = (&self.tag_key, &self.tag) {
            out.insert(key.clone(), Json::String(tag.clone()));
        }
        if let Some(hook) = &self.post_serialize {
            hook(instance, &mut out)?;
        }
        Ok(out)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("tag_key", &self.tag_key)
            .field("descriptors", &self.descriptors)
            .field("post_serialize", &self.post_serialize.is_some())
            .finish()
    }
}

pub struct ModelBuilder {
    name: String,
    tag: Option<String>,
    tag_key: Option<String>,
    descriptors: Vec<Descriptor>,
    post_serialize: Option<PostSerializeHook>,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
            tag_key: None,
            descriptors: Vec::new(),
            post_serialize: None,
        }
    }

    pub fn field(mut self, descriptor: impl Into<Descriptor>) -> Self {
        self.descriptors.push(descriptor.into());
        self
    }

    /// Discriminator value identifying this model in polymorphic relations.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Write the tag into serialized output under `key`, before any custom hook runs.
    pub fn tag_key(mut self, key: impl Into<String>) -> Self {
        self.tag_key = Some(key.into());
        self
    }

    pub fn post_serialize<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Instance, &mut Map<String, Json>) -> Result<()> + Send + Sync + 'static,
    {
        self.post_serialize = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<Arc<ModelType>> {
        let mut attributes = HashSet::new();
        let mut keys = HashSet::new();
        for descriptor in &self.descriptors {
            if !attributes.insert(descriptor.attribute()) {
                return Err(KylieError::DuplicateAttribute {
                    model: self.name,
                    attribute: descriptor.attribute().to_string(),
                });
            }
            if !keys.insert(descriptor.key()) {
                return Err(KylieError::DuplicateKey {
                    model: self.name,
                    key: descriptor.key().to_string(),
                });
            }
            if let DescriptorKind::Relation {
                resolver: Resolver::Discriminated(discriminated),
                ..
            } = descriptor.kind()
            {
                discriminated.check()?;
            }
        }
        if let Some(tag_key) = &self.tag_key {
            // 標籤與欄位共用同一個輸出 mapping
            if keys.contains(tag_key.as_str()) {
                return Err(KylieError::DuplicateKey {
                    model: self.name,
                    key: tag_key.clone(),
                });
            }
            if self.tag.is_none() {
                return Err(KylieError::MissingTag { model: self.name });
            }
        }

        tracing::debug!(model = %self.name, fields = self.descriptors.len(), "declared model type");
        Ok(Arc::new(ModelType {
            name: self.name,
            tag: self.tag,
            tag_key: self.tag_key,
            descriptors: self.descriptors,
            post_serialize: self.post_serialize,
        }))
    }
}

#[derive(Clone)]
pub struct Instance {
    model: Arc<ModelType>,
    attributes: IndexMap<String, Value>,
}

impl Instance {
    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Whether this instance belongs to exactly `model`.
    pub fn is(&self, model: &Arc<ModelType>) -> bool {
        Arc::ptr_eq(&self.model, model)
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.attributes.get(attribute)
    }

    pub fn get_mut(&mut self, attribute: &str) -> Option<&mut Value> {
        self.attributes.get_mut(attribute)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.attributes.insert(attribute.into(), value.into())
    }

    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(attribute, value);
        self
    }

    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.attributes.shift_remove(attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn serialize(&self) -> Result<Json> {
        self.serialize_map().map(Json::Object)
    }

    pub fn serialize_map(&self) -> Result<Map<String, Json>> {
        self.model.serialize_instance(self)
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        self.model.name == other.model.name && self.attributes == other.attributes
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct(&self.model.name);
        for (name, value) in &self.attributes {
            s.field(name, value);
        }
        s.finish()
    }
}
