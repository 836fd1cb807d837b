use std::fmt;
use thiserror::Error;

/// Which way a converter was being applied when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Serialized value -> host value (deserialize).
    Inbound,
    /// Host value -> serialized value (serialize).
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Error reported by a converter function.
///
/// Converters know nothing about the model or attribute they are attached to;
/// the descriptor wraps this into [`KylieError::ConversionFailure`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn expected(expected: &str, found: &serde_json::Value) -> Self {
        Self::new(format!("expected {}, found {}", expected, json_kind(found)))
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Short name of a generic value's shape, used in error messages.
pub fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "sequence",
        serde_json::Value::Object(_) => "mapping",
    }
}

#[derive(Error, Debug)]
pub enum KylieError {
    #[error("Missing required key '{key}' for model {model}")]
    MissingRequiredKey { model: String, key: String },

    #[error("Cannot convert attribute '{attribute}' of model {model} ({direction}): {source}")]
    ConversionFailure {
        model: String,
        attribute: String,
        direction: Direction,
        source: ConversionError,
    },

    #[error("{}", unknown_discriminator_message(.key, .value))]
    UnknownDiscriminator { key: String, value: Option<String> },

    #[error("Attribute '{attribute}' is not set on instance of model {model}")]
    AttributeNotSet { model: String, attribute: String },

    #[error("Model {model} can only be deserialized from a mapping, found {found}")]
    NotAMapping { model: String, found: &'static str },

    #[error("Model {model} declares serialized key '{key}' more than once")]
    DuplicateKey { model: String, key: String },

    #[error("Model {model} declares attribute '{attribute}' more than once")]
    DuplicateAttribute { model: String, attribute: String },

    #[error("Discriminator tag '{tag}' is claimed by both {first} and {second}")]
    DuplicateTag {
        tag: String,
        first: String,
        second: String,
    },

    #[error("Model {model} has no tag and cannot be used for discriminated resolution")]
    MissingTag { model: String },

    #[error("Unknown model: {name}")]
    UnknownModel { name: String },

    #[error("Record {index} failed: {source}")]
    RecordError {
        index: usize,
        source: Box<KylieError>,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

fn unknown_discriminator_message(key: &str, value: &Option<String>) -> String {
    match value {
        Some(value) => format!("No model registered for discriminator {}={}", key, value),
        None => format!("Discriminator key '{}' is missing", key),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The input document does not fit the declared models.
    Data,
    /// Model or resolver declarations are inconsistent.
    Declaration,
    /// Configuration file or command-line problems.
    Configuration,
    /// File system and encoding problems.
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl KylieError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            KylieError::MissingRequiredKey { .. }
            | KylieError::ConversionFailure { .. }
            | KylieError::UnknownDiscriminator { .. }
            | KylieError::NotAMapping { .. } => ErrorCategory::Data,
            KylieError::RecordError { source, .. } => source.category(),
            KylieError::AttributeNotSet { .. }
            | KylieError::DuplicateKey { .. }
            | KylieError::DuplicateAttribute { .. }
            | KylieError::DuplicateTag { .. }
            | KylieError::MissingTag { .. }
            | KylieError::UnknownModel { .. } => ErrorCategory::Declaration,
            KylieError::ConfigValidationError { .. }
            | KylieError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            KylieError::IoError(_)
            | KylieError::SerializationError(_)
            | KylieError::CsvError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Data => ErrorSeverity::Medium,
            ErrorCategory::Declaration | ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Data => format!("Input document does not match the schema: {}", self),
            ErrorCategory::Declaration => format!("Schema declaration problem: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            KylieError::MissingRequiredKey { .. } => {
                "Add the key to the input or mark the field as optional in the schema"
            }
            KylieError::ConversionFailure { .. } => {
                "Check the value type in the input against the field's converter"
            }
            KylieError::UnknownDiscriminator { .. } => {
                "Register a model for the discriminator value or fix the input's type tag"
            }
            KylieError::NotAMapping { .. } => "The top-level input must be a mapping or a sequence of mappings",
            KylieError::RecordError { source, .. } => source.recovery_suggestion(),
            KylieError::UnknownModel { .. } => "Check the model name against the schema file",
            KylieError::AttributeNotSet { .. } => "Set the attribute (possibly to null) before serializing",
            KylieError::DuplicateKey { .. } | KylieError::DuplicateAttribute { .. } => {
                "Give every field of a model a unique name and serialized key"
            }
            KylieError::DuplicateTag { .. } => "Give every model in a discriminated relation its own tag",
            KylieError::MissingTag { .. } => "Declare a tag on every model used in a discriminated relation",
            KylieError::ConfigValidationError { .. } | KylieError::InvalidConfigValueError { .. } => {
                "Fix the schema file or command-line arguments"
            }
            KylieError::IoError(_) => "Check that the file exists and is readable/writable",
            KylieError::SerializationError(_) => "Make sure the input is valid JSON",
            KylieError::CsvError(_) => "Try the json output format",
        }
    }
}

pub type Result<T> = std::result::Result<T, KylieError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_discriminator_messages() {
        let missing = KylieError::UnknownDiscriminator {
            key: "__type__".to_string(),
            value: None,
        };
        assert_eq!(missing.to_string(), "Discriminator key '__type__' is missing");

        let unregistered = KylieError::UnknownDiscriminator {
            key: "__type__".to_string(),
            value: Some("fish".to_string()),
        };
        assert_eq!(
            unregistered.to_string(),
            "No model registered for discriminator __type__=fish"
        );
    }

    #[test]
    fn test_record_error_inherits_category() {
        let err = KylieError::RecordError {
            index: 3,
            source: Box::new(KylieError::MissingRequiredKey {
                model: "Person".to_string(),
                key: "name".to_string(),
            }),
        };
        assert_eq!(err.category(), ErrorCategory::Data);
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.to_string().starts_with("Record 3 failed"));
    }

    #[test]
    fn test_duplicate_tag_is_a_declaration_error() {
        let err = KylieError::DuplicateTag {
            tag: "dog".to_string(),
            first: "Dog".to_string(),
            second: "Puppy".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Declaration);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.to_string(), "Discriminator tag 'dog' is claimed by both Dog and Puppy");
    }

    #[test]
    fn test_conversion_error_expected() {
        let err = ConversionError::expected("integer", &serde_json::json!("x"));
        assert_eq!(err.message(), "expected integer, found string");
    }
}
