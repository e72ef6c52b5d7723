//! funcnet CLI
//!
//! Commands:
//! - `funcnet` / `funcnet build` - Build the configured model and print it
//! - `funcnet summary` - Layer table (or JSON with `--json`)
//! - `funcnet predict` - Run a random batch through the materialized model
//! - `funcnet config` - Show or validate the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn_ndarray::{NdArray, NdArrayDevice};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::AppConfig;
use crate::graph::{DType, Model};

/// Functional model builder
#[derive(Parser, Debug)]
#[command(name = "funcnet")]
#[command(author, version, about = "Build and inspect functional-style neural networks")]
pub struct Cli {
    /// Directory holding default.toml and per-environment overrides
    #[arg(long, env = "FUNCNET_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Single configuration file (skips directory and environment layering)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the model and print its representation
    Build,

    /// Print a per-layer summary
    Summary {
        /// Emit a JSON description instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Materialize the model and run a random batch through it
    Predict {
        /// Number of samples
        #[arg(short, long, default_value = "4")]
        batch: usize,
        /// Seed for weights and input (overrides runtime.seed)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration as TOML
    Show,
    /// Validate the effective configuration
    Validate,
}

impl Cli {
    /// Load the configuration selected by the flags
    pub fn load_config(&self) -> Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display())),
            None => AppConfig::load_from(&self.config_dir).with_context(|| {
                format!("Failed to load config from {}", self.config_dir.display())
            }),
        }
    }

    pub fn run(self, config: AppConfig) -> Result<()> {
        match self.command.unwrap_or(Commands::Build) {
            Commands::Build => build(&config),
            Commands::Summary { json } => summary(&config, json),
            Commands::Predict { batch, seed } => predict(&config, batch, seed.or(config.runtime.seed)),
            Commands::Config(ConfigCommands::Show) => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
            Commands::Config(ConfigCommands::Validate) => validate(&config),
        }
    }
}

fn build(config: &AppConfig) -> Result<()> {
    let model = config.build_model()?;
    info!(model = model.name(), params = model.count_params(), "built model");
    println!("{model}");
    Ok(())
}

fn summary(config: &AppConfig, json: bool) -> Result<()> {
    let model = config.build_model()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&model.describe())?);
    } else {
        print!("{}", model.summary());
    }
    Ok(())
}

fn predict(config: &AppConfig, batch: usize, seed: Option<u64>) -> Result<()> {
    anyhow::ensure!(batch > 0, "batch must be positive");

    let model = config.build_model()?;
    let device = NdArrayDevice::Cpu;
    match model.inputs()[0].dtype() {
        DType::Float32 => predict_on::<NdArray<f32>>(&model, batch, seed, &device),
        DType::Float64 => predict_on::<NdArray<f64>>(&model, batch, seed, &device),
    }
}

fn predict_on<B: Backend>(
    model: &Model,
    batch: usize,
    seed: Option<u64>,
    device: &B::Device,
) -> Result<()> {
    if let Some(seed) = seed {
        B::seed(seed);
    }

    let compiled = model.init::<B>(device)?;
    info!(
        model = compiled.name(),
        params = compiled.num_params(),
        batch,
        "materialized model"
    );

    let input = Tensor::<B, 2>::random(
        [batch, compiled.input_features()],
        Distribution::Uniform(0.0, 1.0),
        device,
    );
    let output = compiled.forward_flat(input)?;
    let values: Vec<f64> = output
        .into_data()
        .convert::<f64>()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read output: {:?}", e))?;

    for (i, row) in values.chunks(compiled.output_dim()).enumerate() {
        let (best, score) = row
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |acc, (j, v)| if v > acc.1 { (j, v) } else { acc });
        let total: f64 = row.iter().sum();
        println!("sample {i}: argmax={best} score={score:.4} sum={total:.4}");
    }
    Ok(())
}

fn validate(config: &AppConfig) -> Result<()> {
    match config.validate() {
        Ok(()) => {
            let model = config.model.build()?;
            println!("  \x1b[32m✓ configuration valid\x1b[0m ({model})");
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                println!("  \x1b[31m✗ {error}\x1b[0m");
            }
            anyhow::bail!("{} configuration error(s)", errors.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_defaults_to_build() {
        let cli = Cli::try_parse_from(["funcnet"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config_dir, PathBuf::from("config"));
    }

    #[test]
    fn test_parse_predict() {
        let cli = Cli::try_parse_from(["funcnet", "predict", "--batch", "2", "--seed", "7"]).unwrap();
        match cli.command {
            Some(Commands::Predict { batch, seed }) => {
                assert_eq!(batch, 2);
                assert_eq!(seed, Some(7));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["funcnet", "config", "show"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Config(ConfigCommands::Show))));
    }

    #[test]
    fn test_commands_run_on_default_config() {
        let config = AppConfig::default();
        assert!(build(&config).is_ok());
        assert!(summary(&config, true).is_ok());
        assert!(predict(&config, 2, Some(42)).is_ok());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_predict_runs_float64_model() {
        let mut config = AppConfig::default();
        config.model.dtype = DType::Float64;
        assert!(predict(&config, 2, Some(42)).is_ok());
    }
}
