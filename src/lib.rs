pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use config::{cli::LocalStorage, schema::SchemaConfig};
pub use crate::core::{
    convert::{Converter, Converters},
    field::{Descriptor, Field, Relation},
    model::{Instance, ModelBuilder, ModelType},
    normalizer::{NormalizeReport, Normalizer, OutputFormat},
    registry::Registry,
    resolver::{Discriminated, Resolver},
};
pub use domain::value::Value;
pub use utils::error::{KylieError, Result};
