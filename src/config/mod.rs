pub mod cli;
pub mod schema;

#[cfg(feature = "cli")]
use crate::core::normalizer::OutputFormat;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{
    validate_file_extensions, validate_non_empty_string, validate_path, Validate,
};
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "kylie")]
#[command(about = "Normalize JSON documents against a declarative model schema")]
pub struct CliConfig {
    #[arg(long, help = "TOML schema file declaring the model types")]
    pub schema: String,

    #[arg(long, help = "Name of the model type the input document holds")]
    pub model: String,

    #[arg(long, help = "JSON input document (a mapping or a sequence of mappings)")]
    pub input: String,

    #[arg(long, default_value = "./output")]
    pub output_path: String,

    #[arg(long, help = "Output file name (defaults to normalized.<format>)")]
    pub output_file: Option<String>,

    #[arg(long, default_value = "json")]
    pub format: OutputFormat,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn output_file(&self) -> String {
        self.output_file
            .clone()
            .unwrap_or_else(|| format!("normalized.{}", self.format.extension()))
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("schema", &self.schema)?;
        validate_file_extensions("schema", std::slice::from_ref(&self.schema), &["toml"])?;
        validate_path("input", &self.input)?;
        validate_file_extensions("input", std::slice::from_ref(&self.input), &["json"])?;
        validate_non_empty_string("model", &self.model)?;
        validate_path("output_path", &self.output_path)?;
        if let Some(file) = &self.output_file {
            validate_non_empty_string("output_file", file)?;
        }
        Ok(())
    }
}
