//! Field and relation descriptors.
//!
//! A descriptor knows where one attribute lives in the serialized mapping and
//! how to convert it. [`Field`] and [`Relation`] are the declaration-side
//! builders; both turn into a [`Descriptor`] when added to a model type.

use crate::core::convert::Converter;
use crate::core::model::Instance;
use crate::core::resolver::Resolver;
use crate::domain::value::Value;
use crate::utils::error::{ConversionError, Direction, KylieError, Result};
use serde_json::{Map, Value as Json};
use std::fmt;

/// Scalar field declaration.
#[derive(Debug, Clone)]
pub struct Field {
    attribute: String,
    key: Option<String>,
    optional: bool,
    converter: Converter,
}

impl Field {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            key: None,
            optional: false,
            converter: Converter::identity(),
        }
    }

    /// Serialized key, when it differs from the attribute name.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn inbound<I>(mut self, inbound: I) -> Self
    where
        I: Fn(&Json) -> std::result::Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.converter = self.converter.with_inbound(inbound);
        self
    }

    pub fn outbound<O>(mut self, outbound: O) -> Self
    where
        O: Fn(&Value) -> std::result::Result<Json, ConversionError> + Send + Sync + 'static,
    {
        self.converter = self.converter.with_outbound(outbound);
        self
    }
}

/// Nested model (or sequence of nested models) declaration.
#[derive(Debug, Clone)]
pub struct Relation {
    attribute: String,
    key: Option<String>,
    optional: bool,
    resolver: Resolver,
    sequence: bool,
}

impl Relation {
    pub fn new(attribute: impl Into<String>, resolver: impl Into<Resolver>) -> Self {
        Self {
            attribute: attribute.into(),
            key: None,
            optional: false,
            resolver: resolver.into(),
            sequence: false,
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn sequence(mut self) -> Self {
        self.sequence = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum DescriptorKind {
    Field(Converter),
    Relation { resolver: Resolver, sequence: bool },
}

#[derive(Clone)]
pub struct Descriptor {
    attribute: String,
    key: String,
    optional: bool,
    kind: DescriptorKind,
}

impl From<Field> for Descriptor {
    fn from(field: Field) -> Self {
        let key = field.key.unwrap_or_else(|| field.attribute.clone());
        Self {
            attribute: field.attribute,
            key,
            optional: field.optional,
            kind: DescriptorKind::Field(field.converter),
        }
    }
}

impl From<Relation> for Descriptor {
    fn from(relation: Relation) -> Self {
        let key = relation.key.unwrap_or_else(|| relation.attribute.clone());
        Self {
            attribute: relation.attribute,
            key,
            optional: relation.optional,
            kind: DescriptorKind::Relation {
                resolver: relation.resolver,
                sequence: relation.sequence,
            },
        }
    }
}

impl Descriptor {
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, DescriptorKind::Relation { .. })
    }

    /// Read this descriptor's entry out of `input` and convert it to a host value.
    ///
    /// An absent optional key and an explicit null both produce [`Value::Null`]
    /// without calling the converter.
    pub fn pull(&self, model: &str, input: &Map<String, Json>) -> Result<Value> {
        let raw = match input.get(&self.key) {
            Some(raw) => raw,
            None if self.optional => return Ok(Value::Null),
            None => {
                return Err(KylieError::MissingRequiredKey {
                    model: model.to_string(),
                    key: self.key.clone(),
                })
            }
        };

        if raw.is_null() {
            return Ok(Value::Null);
        }

        match &self.kind {
            DescriptorKind::Field(converter) => converter
                .to_host(raw)
                .map_err(|source| self.conversion_failure(model, Direction::Inbound, source)),
            DescriptorKind::Relation { resolver, sequence } => {
                if *sequence {
                    self.pull_sequence(model, resolver, raw)
                } else {
                    self.pull_one(model, resolver, raw).map(Value::from)
                }
            }
        }
    }

    fn pull_one(&self, model: &str, resolver: &Resolver, raw: &Json) -> Result<Instance> {
        let data = raw.as_object().ok_or_else(|| {
            self.conversion_failure(
                model,
                Direction::Inbound,
                ConversionError::expected("mapping", raw),
            )
        })?;
        let target = resolver.resolve(data)?;
        tracing::trace!(model, attribute = %self.attribute, target = target.name(), "resolved relation");
        target.deserialize_map(data)
    }

    fn pull_sequence(&self, model: &str, resolver: &Resolver, raw: &Json) -> Result<Value> {
        let items = raw.as_array().ok_or_else(|| {
            self.conversion_failure(
                model,
                Direction::Inbound,
                ConversionError::expected("sequence", raw),
            )
        })?;
        let instances = items
            .iter()
            .map(|item| self.pull_one(model, resolver, item))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Models(instances))
    }

    /// Convert a host value into this descriptor's `(serialized key, serialized value)` entry.
    ///
    /// The key is always emitted, so optional fields come back as null rather
    /// than being omitted.
    pub fn push(&self, model: &str, value: &Value) -> Result<(String, Json)> {
        if value.is_null() {
            return Ok((self.key.clone(), Json::Null));
        }

        let serialized = match &self.kind {
            DescriptorKind::Field(converter) => converter
                .to_serialized(value)
                .map_err(|source| self.conversion_failure(model, Direction::Outbound, source))?,
            DescriptorKind::Relation { sequence, .. } => self.push_relation(model, *sequence, value)?,
        };
        Ok((self.key.clone(), serialized))
    }

    fn push_relation(&self, model: &str, sequence: bool, value: &Value) -> Result<Json> {
        match (sequence, value) {
            (false, Value::Model(instance)) => instance.serialize(),
            (true, Value::Models(instances)) => instances
                .iter()
                .map(Instance::serialize)
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            (true, Value::List(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Model(instance) => instance.serialize(),
                    other => Err(self.relation_mismatch(model, "model instance", other)),
                })
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            (false, other) => Err(self.relation_mismatch(model, "model instance", other)),
            (true, other) => Err(self.relation_mismatch(model, "sequence of model instances", other)),
        }
    }

    fn relation_mismatch(&self, model: &str, expected: &str, found: &Value) -> KylieError {
        self.conversion_failure(
            model,
            Direction::Outbound,
            ConversionError::new(format!("expected {}, found {}", expected, found.kind())),
        )
    }

    fn conversion_failure(
        &self,
        model: &str,
        direction: Direction,
        source: ConversionError,
    ) -> KylieError {
        KylieError::ConversionFailure {
            model: model.to_string(),
            attribute: self.attribute.clone(),
            direction,
            source,
        }
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("attribute", &self.attribute)
            .field("key", &self.key)
            .field("optional", &self.optional)
            .field("kind", &self.kind)
            .finish()
    }
}
