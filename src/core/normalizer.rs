use crate::core::registry::Registry;
use crate::domain::ports::Storage;
use crate::utils::error::{KylieError, Result};
use serde_json::Value as Json;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unsupported output format '{}' (expected json or csv)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeReport {
    pub records: usize,
    pub output_path: String,
}

/// Reads a document, pushes it through one model type both ways and writes
/// the canonical form back out.
pub struct Normalizer<S: Storage> {
    storage: S,
    registry: Registry,
    model: String,
    format: OutputFormat,
}

impl<S: Storage> Normalizer<S> {
    pub fn new(storage: S, registry: Registry, model: impl Into<String>) -> Self {
        Self {
            storage,
            registry,
            model: model.into(),
            format: OutputFormat::default(),
        }
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// A mapping yields one record; a sequence yields one record per element.
    pub fn normalize(&self, document: &Json) -> Result<Json> {
        let model = self.registry.get(&self.model)?;
        match document {
            Json::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    model
                        .deserialize(item)
                        .and_then(|instance| instance.serialize())
                        .map_err(|e| KylieError::RecordError {
                            index,
                            source: Box::new(e),
                        })
                })
                .collect::<Result<Vec<_>>>()
                .map(Json::Array),
            other => model.deserialize(other)?.serialize(),
        }
    }

    pub fn render(&self, normalized: &Json) -> Result<Vec<u8>> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_vec_pretty(normalized)?),
            OutputFormat::Csv => match normalized {
                Json::Array(records) => to_csv(records),
                single => to_csv(std::slice::from_ref(single)),
            },
        }
    }

    pub async fn run(&self, input: &str, output: &str) -> Result<NormalizeReport> {
        tracing::info!("📥 Reading {} as {}", input, self.model);
        let bytes = self.storage.read_file(input).await?;
        let document: Json = serde_json::from_slice(&bytes)?;

        let normalized = self.normalize(&document)?;
        let records = match &normalized {
            Json::Array(items) => items.len(),
            _ => 1,
        };
        tracing::debug!("Normalized {} record(s)", records);

        let data = self.render(&normalized)?;
        self.storage.write_file(output, &data).await?;
        tracing::info!("📁 Wrote {} record(s) to {} ({})", records, output, self.format);

        Ok(NormalizeReport {
            records,
            output_path: output.to_string(),
        })
    }
}

/// Header comes from the first record's keys; nested values are written as compact JSON.
fn to_csv(records: &[Json]) -> Result<Vec<u8>> {
    let header: Vec<String> = match records.first() {
        Some(Json::Object(first)) => first.keys().cloned().collect(),
        _ => return Ok(Vec::new()),
    };
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for record in records {
        let row: Vec<String> = header.iter().map(|key| csv_cell(record.get(key))).collect();
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| KylieError::IoError(e.into_error()))
}

fn csv_cell(value: Option<&Json>) -> String {
    match value {
        None | Some(Json::Null) => String::new(),
        Some(Json::String(s)) => s.clone(),
        Some(Json::Bool(b)) => b.to_string(),
        Some(Json::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::field::{Field, Relation};
    use crate::core::model::ModelType;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn put_file(&self, path: &str, data: &[u8]) {
            self.files.lock().await.insert(path.to_string(), data.to_vec());
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().await.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                KylieError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn registry() -> Registry {
        let wheel = ModelType::builder("Wheel")
            .field(Field::new("front"))
            .field(Field::new("side"))
            .build()
            .unwrap();
        let car = ModelType::builder("Car")
            .field(Field::new("color"))
            .field(Field::new("owner").optional())
            .field(Relation::new("wheels", &wheel).sequence())
            .build()
            .unwrap();
        let mut registry = Registry::new();
        registry.insert(wheel);
        registry.insert(car);
        registry
    }

    #[test]
    fn test_normalize_fills_optional_keys() {
        let normalizer = Normalizer::new(MockStorage::new(), registry(), "Car");
        let normalized = normalizer
            .normalize(&json!({"color": "red", "wheels": [], "extra": 1}))
            .unwrap();
        assert_eq!(normalized, json!({"color": "red", "owner": null, "wheels": []}));
    }

    #[test]
    fn test_normalize_sequence_reports_failing_index() {
        let normalizer = Normalizer::new(MockStorage::new(), registry(), "Wheel");
        let err = normalizer
            .normalize(&json!([{"front": true, "side": "Left"}, {"front": false}]))
            .unwrap_err();
        match err {
            KylieError::RecordError { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, KylieError::MissingRequiredKey { .. }));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_model() {
        let normalizer = Normalizer::new(MockStorage::new(), registry(), "Boat");
        assert!(matches!(
            normalizer.normalize(&json!({})),
            Err(KylieError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_csv_rendering() {
        let normalizer =
            Normalizer::new(MockStorage::new(), registry(), "Car").with_format(OutputFormat::Csv);
        let normalized = json!([
            {"color": "red", "owner": null, "wheels": [{"front": true, "side": "Left"}]},
            {"color": "blue, dark", "owner": "Sue", "wheels": []}
        ]);
        let csv = String::from_utf8(normalizer.render(&normalized).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "color,owner,wheels");
        assert_eq!(lines[1], r#"red,,"[{""front"":true,""side"":""Left""}]""#);
        assert_eq!(lines[2], r#""blue, dark",Sue,[]"#);
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("csv".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[tokio::test]
    async fn test_run_reads_and_writes_through_storage() {
        let storage = MockStorage::new();
        storage
            .put_file(
                "cars.json",
                br#"[{"color": "red", "wheels": [{"front": true, "side": "Middle"}]}]"#,
            )
            .await;

        let normalizer = Normalizer::new(storage.clone(), registry(), "Car");
        let report = normalizer.run("cars.json", "out/cars.json").await.unwrap();
        assert_eq!(report.records, 1);
        assert_eq!(report.output_path, "out/cars.json");

        let written = storage.get_file("out/cars.json").await.unwrap();
        let output: Json = serde_json::from_slice(&written).unwrap();
        assert_eq!(
            output,
            json!([{"color": "red", "owner": null, "wheels": [{"front": true, "side": "Middle"}]}])
        );
    }

    #[tokio::test]
    async fn test_run_missing_input() {
        let normalizer = Normalizer::new(MockStorage::new(), registry(), "Car");
        assert!(matches!(
            normalizer.run("absent.json", "out.json").await,
            Err(KylieError::IoError(_))
        ));
    }
}
