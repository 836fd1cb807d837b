use crate::core::convert::Converters;
use crate::core::field::{Field, Relation};
use crate::core::model::ModelType;
use crate::core::registry::Registry;
use crate::core::resolver::{Discriminated, Resolver, DEFAULT_DISCRIMINATOR_KEY};
use crate::utils::error::{KylieError, Result};
use crate::utils::validation::{validate_non_empty_string, validate_unique, Validate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub schema: SchemaInfo,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub tag: Option<String>,
    pub tag_key: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub key: Option<String>,
    pub converter: Option<String>,
    pub optional: Option<bool>,
    pub model: Option<String>,             // 固定關聯模型
    pub choices: Option<HashMap<String, String>>, // tag -> 模型名稱
    pub variants: Option<Vec<String>>,     // 依模型自身 tag 建立對應表
    pub discriminator: Option<String>,
    pub sequence: Option<bool>,
}

impl FieldConfig {
    pub fn is_relation(&self) -> bool {
        self.model.is_some() || self.choices.is_some() || self.variants.is_some()
    }

    pub fn serialized_key(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }

    /// Names of every model this field can point at.
    fn targets(&self) -> Vec<&str> {
        let mut targets: Vec<&str> = Vec::new();
        if let Some(model) = &self.model {
            targets.push(model);
        }
        if let Some(choices) = &self.choices {
            targets.extend(choices.values().map(String::as_str));
        }
        if let Some(variants) = &self.variants {
            targets.extend(variants.iter().map(String::as_str));
        }
        targets
    }
}

impl SchemaConfig {
    /// 從 TOML 檔案載入 schema
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(KylieError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析 schema
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| KylieError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${TAG_KEY})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| KylieError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.iter().find(|m| m.name == name)
    }

    /// 驗證 schema 的合理性
    pub fn validate_schema(&self, converters: &Converters) -> Result<()> {
        validate_non_empty_string("schema.name", &self.schema.name)?;
        validate_unique("models", self.models.iter().map(|m| m.name.as_str()))?;

        let known: HashSet<&str> = self.models.iter().map(|m| m.name.as_str()).collect();
        for model in &self.models {
            validate_non_empty_string("models.name", &model.name)?;
            if model.tag_key.is_some() && model.tag.is_none() {
                return Err(KylieError::ConfigValidationError {
                    field: format!("models.{}.tag_key", model.name),
                    message: "tag_key requires a tag".to_string(),
                });
            }

            let scope = format!("models.{}.fields", model.name);
            validate_unique(&scope, model.fields.iter().map(|f| f.name.as_str()))?;
            // tag_key 會寫進同一個輸出 mapping
            validate_unique(
                &scope,
                model
                    .fields
                    .iter()
                    .map(FieldConfig::serialized_key)
                    .chain(model.tag_key.as_deref()),
            )?;

            for field in &model.fields {
                self.validate_field(&scope, field, &known, converters)?;
            }
        }

        self.build_order().map(|_| ())
    }

    fn validate_field(
        &self,
        scope: &str,
        field: &FieldConfig,
        known: &HashSet<&str>,
        converters: &Converters,
    ) -> Result<()> {
        let path = format!("{}.{}", scope, field.name);
        validate_non_empty_string(&path, &field.name)?;

        let invalid = |reason: &str| KylieError::ConfigValidationError {
            field: path.clone(),
            message: reason.to_string(),
        };

        let relation_kinds = [
            field.model.is_some(),
            field.choices.is_some(),
            field.variants.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if relation_kinds > 1 {
            return Err(invalid("only one of model, choices or variants may be set"));
        }

        if field.is_relation() {
            if field.converter.is_some() {
                return Err(invalid("relations do not take a converter"));
            }
            if field.model.is_some() && field.discriminator.is_some() {
                return Err(invalid("discriminator requires choices or variants"));
            }
            for target in field.targets() {
                if !known.contains(target) {
                    return Err(KylieError::InvalidConfigValueError {
                        field: path.clone(),
                        value: target.to_string(),
                        reason: "relation targets an undeclared model".to_string(),
                    });
                }
            }
            if let Some(variants) = &field.variants {
                for variant in variants {
                    if self.model(variant).and_then(|m| m.tag.as_ref()).is_none() {
                        return Err(KylieError::InvalidConfigValueError {
                            field: path.clone(),
                            value: variant.clone(),
                            reason: "variant model declares no tag".to_string(),
                        });
                    }
                }
                validate_unique(
                    &format!("{}.variants", path),
                    variants
                        .iter()
                        .filter_map(|variant| self.model(variant).and_then(|m| m.tag.as_deref())),
                )?;
            }
        } else {
            if field.sequence.is_some() || field.discriminator.is_some() {
                return Err(invalid("sequence and discriminator only apply to relations"));
            }
            if let Some(name) = &field.converter {
                if !converters.contains(name) {
                    return Err(KylieError::InvalidConfigValueError {
                        field: path.clone(),
                        value: name.clone(),
                        reason: format!("unknown converter. Known converters: {}", converters.names().join(", ")),
                    });
                }
            }
        }

        Ok(())
    }

    /// Models ordered so every relation target comes before the model using it.
    fn build_order(&self) -> Result<Vec<&ModelConfig>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            schema: &'a SchemaConfig,
            model: &'a ModelConfig,
            marks: &mut HashMap<&'a str, Mark>,
            order: &mut Vec<&'a ModelConfig>,
        ) -> Result<()> {
            match marks.get(model.name.as_str()) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(KylieError::ConfigValidationError {
                        field: format!("models.{}", model.name),
                        message: "relation cycle detected; model graphs must be acyclic".to_string(),
                    })
                }
                None => {}
            }
            marks.insert(&model.name, Mark::Visiting);
            for field in &model.fields {
                for target in field.targets() {
                    if let Some(target) = schema.model(target) {
                        visit(schema, target, marks, order)?;
                    }
                }
            }
            marks.insert(&model.name, Mark::Done);
            order.push(model);
            Ok(())
        }

        let mut marks = HashMap::new();
        let mut order = Vec::with_capacity(self.models.len());
        for model in &self.models {
            visit(self, model, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    pub fn build_registry(&self) -> Result<Registry> {
        self.build_registry_with(&Converters::builtin())
    }

    /// 依照 schema 建立所有模型，converter 名稱由 `converters` 解析
    pub fn build_registry_with(&self, converters: &Converters) -> Result<Registry> {
        self.validate_schema(converters)?;

        let mut registry = Registry::new();
        for model in self.build_order()? {
            let built = Self::build_model(model, &registry, converters)?;
            registry.insert(built);
        }
        tracing::debug!("Built {} model type(s) from schema {}", registry.len(), self.schema.name);
        Ok(registry)
    }

    fn build_model(
        model: &ModelConfig,
        registry: &Registry,
        converters: &Converters,
    ) -> Result<Arc<ModelType>> {
        let mut builder = ModelType::builder(&model.name);
        if let Some(tag) = &model.tag {
            builder = builder.tag(tag);
        }
        if let Some(key) = &model.tag_key {
            builder = builder.tag_key(key);
        }

        for field in &model.fields {
            if field.is_relation() {
                let mut relation = Relation::new(&field.name, Self::resolver(field, registry)?);
                if let Some(key) = &field.key {
                    relation = relation.key(key);
                }
                if field.optional.unwrap_or(false) {
                    relation = relation.optional();
                }
                if field.sequence.unwrap_or(false) {
                    relation = relation.sequence();
                }
                builder = builder.field(relation);
            } else {
                let mut scalar = Field::new(&field.name);
                if let Some(key) = &field.key {
                    scalar = scalar.key(key);
                }
                if field.optional.unwrap_or(false) {
                    scalar = scalar.optional();
                }
                if let Some(name) = &field.converter {
                    let converter = converters.get(name).ok_or_else(|| KylieError::InvalidConfigValueError {
                        field: format!("models.{}.fields.{}", model.name, field.name),
                        value: name.clone(),
                        reason: "unknown converter".to_string(),
                    })?;
                    scalar = scalar.converter(converter.clone());
                }
                builder = builder.field(scalar);
            }
        }

        builder.build()
    }

    fn resolver(field: &FieldConfig, registry: &Registry) -> Result<Resolver> {
        let key = field
            .discriminator
            .as_deref()
            .unwrap_or(DEFAULT_DISCRIMINATOR_KEY);

        if let Some(model) = &field.model {
            return Ok(Resolver::from(registry.get(model)?));
        }
        if let Some(choices) = &field.choices {
            let mut discriminated = Discriminated::new().key(key);
            for (tag, model) in choices {
                discriminated = discriminated.variant(tag, registry.get(model)?);
            }
            return Ok(discriminated.into());
        }
        let variants = field.variants.as_deref().unwrap_or_default();
        let models = variants
            .iter()
            .map(|name| registry.get(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Discriminated::from_tags(models)?.key(key).into())
    }
}

impl Validate for SchemaConfig {
    fn validate(&self) -> Result<()> {
        self.validate_schema(&Converters::builtin())
    }
}
