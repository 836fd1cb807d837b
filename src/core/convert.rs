//! Value converters applied by field descriptors.
//!
//! A [`Converter`] pairs an inbound function (serialized -> host) with an
//! outbound function (host -> serialized). The pair is expected to be mutually
//! inverse; nothing checks it.

use crate::domain::value::Value;
use crate::utils::error::ConversionError;
use chrono::{DateTime, SecondsFormat};
use serde_json::{Number, Value as Json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

pub type InboundFn = dyn Fn(&Json) -> Result<Value, ConversionError> + Send + Sync;
pub type OutboundFn = dyn Fn(&Value) -> Result<Json, ConversionError> + Send + Sync;

#[derive(Clone)]
pub struct Converter {
    name: String,
    inbound: Arc<InboundFn>,
    outbound: Arc<OutboundFn>,
}

impl Converter {
    pub fn new<I, O>(name: impl Into<String>, inbound: I, outbound: O) -> Self
    where
        I: Fn(&Json) -> Result<Value, ConversionError> + Send + Sync + 'static,
        O: Fn(&Value) -> Result<Json, ConversionError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            inbound: Arc::new(inbound),
            outbound: Arc::new(outbound),
        }
    }

    pub fn identity() -> Self {
        Self::new("identity", identity_inbound, identity_outbound)
    }

    /// Replace the inbound half, keeping the outbound one.
    pub fn with_inbound<I>(mut self, inbound: I) -> Self
    where
        I: Fn(&Json) -> Result<Value, ConversionError> + Send + Sync + 'static,
    {
        self.inbound = Arc::new(inbound);
        self
    }

    /// Replace the outbound half, keeping the inbound one.
    pub fn with_outbound<O>(mut self, outbound: O) -> Self
    where
        O: Fn(&Value) -> Result<Json, ConversionError> + Send + Sync + 'static,
    {
        self.outbound = Arc::new(outbound);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn to_host(&self, raw: &Json) -> Result<Value, ConversionError> {
        (self.inbound)(raw)
    }

    pub fn to_serialized(&self, value: &Value) -> Result<Json, ConversionError> {
        (self.outbound)(value)
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Converter").field(&self.name).finish()
    }
}

fn identity_inbound(raw: &Json) -> Result<Value, ConversionError> {
    Ok(Value::from_json(raw.clone()))
}

fn identity_outbound(value: &Value) -> Result<Json, ConversionError> {
    value.to_json().ok_or_else(|| {
        ConversionError::new(format!(
            "{} has no serialized form without an outbound converter",
            value.kind()
        ))
    })
}

fn host_mismatch(expected: &str, found: &Value) -> ConversionError {
    ConversionError::new(format!("expected {}, found {}", expected, found.kind()))
}

fn is_integer(n: &Number) -> bool {
    n.is_i64() || n.is_u64()
}

pub fn boolean() -> Converter {
    Converter::new(
        "bool",
        |raw| match raw {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(ConversionError::expected("boolean", other)),
        },
        |value| match value {
            Value::Bool(b) => Ok(Json::Bool(*b)),
            other => Err(host_mismatch("boolean", other)),
        },
    )
}

pub fn integer() -> Converter {
    Converter::new(
        "int",
        |raw| match raw {
            Json::Number(n) if is_integer(n) => Ok(Value::Number(n.clone())),
            other => Err(ConversionError::expected("integer", other)),
        },
        |value| match value {
            Value::Number(n) if is_integer(n) => Ok(Json::Number(n.clone())),
            other => Err(host_mismatch("integer", other)),
        },
    )
}

pub fn float() -> Converter {
    Converter::new(
        "float",
        |raw| match raw {
            Json::Number(n) => Ok(Value::Number(n.clone())),
            other => Err(ConversionError::expected("number", other)),
        },
        |value| match value {
            Value::Number(n) => Ok(Json::Number(n.clone())),
            other => Err(host_mismatch("number", other)),
        },
    )
}

pub fn string() -> Converter {
    Converter::new(
        "string",
        |raw| match raw {
            Json::String(s) => Ok(Value::String(s.clone())),
            other => Err(ConversionError::expected("string", other)),
        },
        |value| match value {
            Value::String(s) => Ok(Json::String(s.clone())),
            other => Err(host_mismatch("string", other)),
        },
    )
}

/// `0`/`1` on the wire, `false`/`true` on the host. Any non-zero integer reads as `true`.
pub fn bool_from_int() -> Converter {
    Converter::new(
        "bool_from_int",
        |raw| match raw {
            Json::Number(n) if is_integer(n) => Ok(Value::Bool(n.as_i64() != Some(0))),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            other => Err(ConversionError::expected("integer", other)),
        },
        |value| match value {
            Value::Bool(b) => Ok(Json::Number(Number::from(*b as i64))),
            other => Err(host_mismatch("boolean", other)),
        },
    )
}

/// Integers carried as decimal strings on the wire.
pub fn int_from_string() -> Converter {
    Converter::new(
        "int_from_string",
        |raw| match raw {
            Json::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| Value::Number(Number::from(n)))
                .map_err(|e| ConversionError::new(format!("invalid integer '{}': {}", s, e))),
            other => Err(ConversionError::expected("string", other)),
        },
        |value| match value {
            Value::Number(n) if is_integer(n) => Ok(Json::String(n.to_string())),
            other => Err(host_mismatch("integer", other)),
        },
    )
}

/// RFC 3339 strings. A zero offset is written back as `Z`.
pub fn timestamp() -> Converter {
    Converter::new(
        "timestamp",
        |raw| match raw {
            Json::String(s) => DateTime::parse_from_rfc3339(s)
                .map(Value::Timestamp)
                .map_err(|e| ConversionError::new(format!("invalid timestamp '{}': {}", s, e))),
            other => Err(ConversionError::expected("string", other)),
        },
        |value| match value {
            Value::Timestamp(ts) => Ok(Json::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))),
            other => Err(host_mismatch("timestamp", other)),
        },
    )
}

/// Whole seconds since the Unix epoch, read as UTC.
pub fn unix_timestamp() -> Converter {
    Converter::new(
        "unix_timestamp",
        |raw| {
            let secs = raw
                .as_i64()
                .ok_or_else(|| ConversionError::expected("integer", raw))?;
            DateTime::from_timestamp(secs, 0)
                .map(|ts| Value::Timestamp(ts.fixed_offset()))
                .ok_or_else(|| ConversionError::new(format!("timestamp {} out of range", secs)))
        },
        |value| match value {
            Value::Timestamp(ts) => Ok(Json::Number(Number::from(ts.timestamp()))),
            other => Err(host_mismatch("timestamp", other)),
        },
    )
}

pub fn url() -> Converter {
    Converter::new(
        "url",
        |raw| match raw {
            Json::String(s) => Url::parse(s)
                .map(Value::Url)
                .map_err(|e| ConversionError::new(format!("invalid URL '{}': {}", s, e))),
            other => Err(ConversionError::expected("string", other)),
        },
        |value| match value {
            Value::Url(url) => Ok(Json::String(url.to_string())),
            other => Err(host_mismatch("url", other)),
        },
    )
}

/// Named converters available to declarative schemas.
#[derive(Debug, Clone)]
pub struct Converters {
    by_name: HashMap<String, Converter>,
}

impl Converters {
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut converters = Self::empty();
        for converter in [
            Converter::identity(),
            boolean(),
            integer(),
            float(),
            string(),
            bool_from_int(),
            int_from_string(),
            timestamp(),
            unix_timestamp(),
            url(),
        ] {
            converters.register(converter);
        }
        converters
    }

    /// Register under the converter's own name, replacing any previous entry.
    pub fn register(&mut self, converter: Converter) -> Option<Converter> {
        self.by_name.insert(converter.name().to_string(), converter)
    }

    pub fn get(&self, name: &str) -> Option<&Converter> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Converters {
    fn default() -> Self {
        Self::builtin()
    }
}
