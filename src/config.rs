use config::{Config, ConfigError, Environment, File};
use serde::de::{self, Deserializer, SeqAccess, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{FuncNetError, Result};
use crate::graph::shape::checked_product;
use crate::graph::{Activation, DType, DenseConfig, FlattenConfig, Input, Model, SymbolicTensor};
use crate::models::{REFERENCE_HIDDEN_UNITS, REFERENCE_INPUT_SHAPE, REFERENCE_NUM_CLASSES};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

/// Architecture description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name shown in its representation
    pub name: String,
    /// Per-sample input dimensions (e.g., [28, 28])
    #[serde(deserialize_with = "deserialize_dims")]
    pub input_shape: Vec<usize>,
    /// Fixed batch size; unspecified when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Input element type
    pub dtype: DType,
    /// Layers applied in order to the input
    pub layers: Vec<LayerSpec>,
}

/// One layer of a configured architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Flatten {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Dense {
        units: usize,
        #[serde(default)]
        activation: Activation,
        #[serde(default = "default_use_bias")]
        use_bias: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

fn default_use_bias() -> bool {
    true
}

/// Accepts `[28, 28]`, `"28,28"` or a bare `784`.
///
/// Environment overrides arrive as a string list (`FUNCNET__MODEL__INPUT_SHAPE=8,8`)
/// or, for a single dimension, as an already parsed integer.
fn deserialize_dims<'de, D>(deserializer: D) -> std::result::Result<Vec<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DimsVisitor)
}

struct DimsVisitor;

impl<'de> Visitor<'de> for DimsVisitor {
    type Value = Vec<usize>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of dimensions, a comma-separated string, or a single dimension")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        dim_from_u64(v).map(|d| vec![d])
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        dim_from_i64(v).map(|d| vec![d])
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Self::Value, E> {
        v.split(',').map(dim_from_str).collect()
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error> {
        let mut dims = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(Dim(d)) = seq.next_element()? {
            dims.push(d);
        }
        Ok(dims)
    }
}

/// A single dimension given as an integer or a numeric string
struct Dim(usize);

impl<'de> Deserialize<'de> for Dim {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DimVisitor;

        impl<'de> Visitor<'de> for DimVisitor {
            type Value = Dim;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative dimension")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Dim, E> {
                dim_from_u64(v).map(Dim)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Dim, E> {
                dim_from_i64(v).map(Dim)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Dim, E> {
                dim_from_str(v).map(Dim)
            }
        }

        deserializer.deserialize_any(DimVisitor)
    }
}

fn dim_from_u64<E: de::Error>(v: u64) -> std::result::Result<usize, E> {
    usize::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &"a dimension that fits in usize"))
}

fn dim_from_i64<E: de::Error>(v: i64) -> std::result::Result<usize, E> {
    u64::try_from(v)
        .map_err(|_| E::invalid_value(Unexpected::Signed(v), &"a non-negative dimension"))
        .and_then(dim_from_u64)
}

fn dim_from_str<E: de::Error>(v: &str) -> std::result::Result<usize, E> {
    v.trim()
        .parse()
        .map_err(|_| E::invalid_value(Unexpected::Str(v), &"a non-negative integer dimension"))
}

impl LayerSpec {
    /// Call the described layer on a symbolic handle
    pub fn call(&self, input: &SymbolicTensor) -> Result<SymbolicTensor> {
        match self {
            LayerSpec::Flatten { name } => FlattenConfig::new().with_name(name.clone()).call(input),
            LayerSpec::Dense {
                units,
                activation,
                use_bias,
                name,
            } => DenseConfig::new(*units)
                .with_activation(*activation)
                .with_use_bias(*use_bias)
                .with_name(name.clone())
                .call(input),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: crate::graph::DEFAULT_MODEL_NAME.to_string(),
            input_shape: REFERENCE_INPUT_SHAPE.to_vec(),
            batch_size: None,
            dtype: DType::Float32,
            layers: vec![
                LayerSpec::Flatten { name: None },
                LayerSpec::Dense {
                    units: REFERENCE_HIDDEN_UNITS,
                    activation: Activation::Relu,
                    use_bias: true,
                    name: None,
                },
                LayerSpec::Dense {
                    units: REFERENCE_NUM_CLASSES,
                    activation: Activation::Softmax,
                    use_bias: true,
                    name: None,
                },
            ],
        }
    }
}

impl ModelConfig {
    /// Thread an input through the configured layers and assemble the model
    pub fn build(&self) -> Result<Model> {
        let mut input = Input::new(self.input_shape.clone()).with_dtype(self.dtype);
        if let Some(batch_size) = self.batch_size {
            input = input.with_batch_size(batch_size);
        }
        let input = input.build()?;

        let mut x = input.clone();
        for layer in &self.layers {
            x = layer.call(&x)?;
        }

        Model::named(self.name.clone(), [input], [x])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seed for weight initialization; random when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> std::result::Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", default_log_level())?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("FUNCNET_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (FUNCNET__MODEL__NAME, etc.)
            .add_source(
                Environment::with_prefix("FUNCNET")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("model.input_shape"),
            );

        builder.build()?.try_deserialize()
    }

    /// Load a single configuration file, without environment overrides
    pub fn load_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.model.name.trim().is_empty() {
            errors.push("model.name must not be empty".to_string());
        }

        if self.model.input_shape.is_empty() {
            errors.push("model.input_shape must have at least one dimension".to_string());
        } else if self.model.input_shape.contains(&0) {
            errors.push(format!(
                "model.input_shape dimensions must be positive: {:?}",
                self.model.input_shape
            ));
        } else if checked_product(&self.model.input_shape).is_none() {
            errors.push(format!(
                "model.input_shape element count overflows: {:?}",
                self.model.input_shape
            ));
        }

        if self.model.batch_size == Some(0) {
            errors.push("model.batch_size must be positive".to_string());
        }

        if self.model.layers.is_empty() {
            errors.push("model.layers must contain at least one layer".to_string());
        }

        for (i, layer) in self.model.layers.iter().enumerate() {
            if let LayerSpec::Dense { units: 0, .. } = layer {
                errors.push(format!("model.layers[{}]: dense units must be positive", i));
            }
        }

        if self.logging.level.parse::<tracing::Level>().is_err() {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, then build the configured model
    pub fn build_model(&self) -> Result<Model> {
        self.validate().map_err(FuncNetError::Validation)?;
        self.model.build()
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    // Serializes tests that read or modify process environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const SHAPE_VAR: &str = "FUNCNET__MODEL__INPUT_SHAPE";

    #[test]
    fn test_default_is_reference_architecture() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let model = config.build_model().unwrap();
        assert_eq!(model.input_shapes()[0].dims(), &[28, 28]);
        assert_eq!(model.output_shapes()[0].dims(), &[10]);
        assert_eq!(model.count_params(), 101_770);
    }

    #[test]
    fn test_parse_toml_layers() {
        let text = r#"
            [model]
            name = "digits"
            input_shape = [8, 8]

            [[model.layers]]
            type = "flatten"

            [[model.layers]]
            type = "dense"
            units = 32
            activation = "tanh"
            name = "hidden"

            [[model.layers]]
            type = "dense"
            units = 10
            activation = "softmax"
            use_bias = false
        "#;
        let config: AppConfig = toml::from_str(text).unwrap();

        assert_eq!(config.model.name, "digits");
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(
            config.model.layers[1],
            LayerSpec::Dense {
                units: 32,
                activation: Activation::Tanh,
                use_bias: true,
                name: Some("hidden".to_string()),
            }
        );

        let model = config.build_model().unwrap();
        assert_eq!(model.name(), "digits");
        assert_eq!(model.count_params(), 64 * 32 + 32 + 32 * 10);
        assert!(model.get_layer("hidden").is_some());
    }

    #[test]
    fn test_validate_collects_errors() {
        let mut config = AppConfig::default();
        config.model.input_shape = vec![28, 0];
        config.model.layers.push(LayerSpec::Dense {
            units: 0,
            activation: Activation::Linear,
            use_bias: true,
            name: None,
        });
        config.logging.level = "loud".to_string();

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            config.build_model(),
            Err(FuncNetError::Validation(_))
        ));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        assert!(text.contains("type = \"dense\""));
        assert!(text.contains("activation = \"softmax\""));

        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = std::env::temp_dir().join("funcnet_missing_config_dir");
        let config = AppConfig::load_from(&dir).unwrap();
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn test_environment_file_overrides_default_file() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::remove_var("FUNCNET_ENV");

        let dir = std::env::temp_dir().join(format!("funcnet_layering_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("default.toml"),
            "[model]\nname = \"base\"\ninput_shape = [8, 8]\n\n[logging]\nlevel = \"info\"\n",
        )
        .unwrap();
        fs::write(dir.join("development.toml"), "[model]\nname = \"dev\"\n").unwrap();

        let config = AppConfig::load_from(&dir);
        fs::remove_dir_all(&dir).unwrap();
        let config = config.unwrap();

        assert_eq!(config.model.name, "dev");
        assert_eq!(config.model.input_shape, vec![8, 8]);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.model.layers, ModelConfig::default().layers);
    }

    #[test]
    fn test_env_var_sets_input_shape_list() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = std::env::temp_dir().join("funcnet_missing_config_dir");

        std::env::set_var(SHAPE_VAR, "8,8");
        let config = AppConfig::load_from(&dir);
        std::env::remove_var(SHAPE_VAR);

        let config = config.unwrap();
        assert_eq!(config.model.input_shape, vec![8, 8]);
        assert_eq!(config.build_model().unwrap().input_shapes()[0].dims(), &[8, 8]);
    }

    #[test]
    fn test_env_var_sets_single_dimension() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = std::env::temp_dir().join("funcnet_missing_config_dir");

        std::env::set_var(SHAPE_VAR, "784");
        let config = AppConfig::load_from(&dir);
        std::env::remove_var(SHAPE_VAR);

        assert_eq!(config.unwrap().model.input_shape, vec![784]);
    }

    #[test]
    fn test_input_shape_accepts_scalar_and_string() {
        let config: AppConfig = toml::from_str("[model]\ninput_shape = 784\n").unwrap();
        assert_eq!(config.model.input_shape, vec![784]);

        let config: AppConfig = toml::from_str("[model]\ninput_shape = \"28, 28\"\n").unwrap();
        assert_eq!(config.model.input_shape, vec![28, 28]);

        assert!(toml::from_str::<AppConfig>("[model]\ninput_shape = [-1]\n").is_err());
        assert!(toml::from_str::<AppConfig>("[model]\ninput_shape = \"a,b\"\n").is_err());
    }

    #[test]
    fn test_validate_rejects_overflowing_input_shape() {
        let mut config = AppConfig::default();
        config.model.input_shape = vec![1 << 32, 1 << 32];

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("overflows"));
        assert!(matches!(
            config.build_model(),
            Err(FuncNetError::Validation(_))
        ));
    }
}
