use anyhow::Result;
use kylie::{KylieError, LocalStorage, Normalizer, OutputFormat, SchemaConfig};
use tempfile::TempDir;

const GARAGE_SCHEMA: &str = r#"
[schema]
name = "garage"
description = "Cars, wheels and owners"
version = "1.0.0"

[[models]]
name = "Wheel"

[[models.fields]]
name = "front"
converter = "bool_from_int"

[[models.fields]]
name = "side"
converter = "string"

[[models]]
name = "Car"

[[models.fields]]
name = "car_id"
key = "id"
converter = "int"

[[models.fields]]
name = "color"

[[models.fields]]
name = "registered"
converter = "timestamp"
optional = true

[[models.fields]]
name = "wheels"
model = "Wheel"
sequence = true
"#;

async fn setup(input: &str) -> Result<(TempDir, String)> {
    let temp_dir = TempDir::new()?;
    let base = temp_dir.path().to_str().unwrap().replace('\\', "/");
    tokio::fs::write(format!("{}/garage.toml", base), GARAGE_SCHEMA).await?;
    tokio::fs::write(format!("{}/cars.json", base), input).await?;
    Ok((temp_dir, base))
}

#[tokio::test]
async fn test_normalize_sequence_to_json() -> Result<()> {
    let (_temp_dir, base) = setup(
        r#"[
            {"id": 1, "color": "red", "wheels": [{"front": 1, "side": "Left"}, {"front": 0, "side": "Right"}]},
            {"id": 2, "color": "blue", "registered": "2024-01-15T10:30:00Z", "wheels": []}
        ]"#,
    )
    .await?;

    let registry = SchemaConfig::from_file(format!("{}/garage.toml", base))?.build_registry()?;
    let normalizer = Normalizer::new(LocalStorage::new(base.clone()), registry, "Car");

    let report = normalizer.run("cars.json", "out/cars.json").await?;
    assert_eq!(report.records, 2);

    let written = tokio::fs::read(format!("{}/out/cars.json", base)).await?;
    let output: serde_json::Value = serde_json::from_slice(&written)?;
    println!("📊 Normalized output: {}", output);

    assert_eq!(
        output,
        serde_json::json!([
            {
                "id": 1,
                "color": "red",
                "registered": null,
                "wheels": [{"front": 1, "side": "Left"}, {"front": 0, "side": "Right"}]
            },
            {
                "id": 2,
                "color": "blue",
                "registered": "2024-01-15T10:30:00Z",
                "wheels": []
            }
        ])
    );
    Ok(())
}

#[tokio::test]
async fn test_normalize_single_mapping_to_csv() -> Result<()> {
    let (_temp_dir, base) = setup(r#"{"id": 7, "color": "green", "wheels": [{"front": 1, "side": "Middle"}]}"#).await?;

    let registry = SchemaConfig::from_file(format!("{}/garage.toml", base))?.build_registry()?;
    let normalizer = Normalizer::new(LocalStorage::new(base.clone()), registry, "Car")
        .with_format(OutputFormat::Csv);

    let report = normalizer.run("cars.json", "cars.csv").await?;
    assert_eq!(report.records, 1);

    let csv = tokio::fs::read_to_string(format!("{}/cars.csv", base)).await?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "id,color,registered,wheels");
    assert_eq!(lines[1], r#"7,green,,"[{""front"":1,""side"":""Middle""}]""#);
    Ok(())
}

#[tokio::test]
async fn test_normalize_reports_bad_record() -> Result<()> {
    let (_temp_dir, base) = setup(
        r#"[
            {"id": 1, "color": "red", "wheels": []},
            {"id": "two", "color": "red", "wheels": []}
        ]"#,
    )
    .await?;

    let registry = SchemaConfig::from_file(format!("{}/garage.toml", base))?.build_registry()?;
    let normalizer = Normalizer::new(LocalStorage::new(base.clone()), registry, "Car");

    match normalizer.run("cars.json", "out.json").await {
        Err(KylieError::RecordError { index, source }) => {
            assert_eq!(index, 1);
            assert!(matches!(*source, KylieError::ConversionFailure { .. }));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // Nothing is written when normalization fails.
    assert!(!std::path::Path::new(&format!("{}/out.json", base)).exists());
    Ok(())
}

#[tokio::test]
async fn test_invalid_json_input() -> Result<()> {
    let (_temp_dir, base) = setup("{not json").await?;

    let registry = SchemaConfig::from_file(format!("{}/garage.toml", base))?.build_registry()?;
    let normalizer = Normalizer::new(LocalStorage::new(base), registry, "Car");

    assert!(matches!(
        normalizer.run("cars.json", "out.json").await,
        Err(KylieError::SerializationError(_))
    ));
    Ok(())
}
