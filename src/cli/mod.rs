//! Command line interface
//!
//! `despejar train -c options.yml` runs the full training schedule;
//! `despejar test -c options.yml --weights ckpt.safetensors` loads the
//! weights and runs one validation pass over the configured evaluation
//! sets. The process rank comes from the `RANK` environment variable.

use crate::config::{load_options, Options};
use crate::data::{build_dataloader, build_dataset, Loader};
use crate::error::{Error, Result};
use crate::model::BaseModel;
use crate::report::{LogLevel, Reporter};
use crate::train::Runner;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

/// Despejar: single-image reflection removal training
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "despejar")]
#[command(version)]
#[command(about = "Single-image reflection removal training framework")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except warnings
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Train a model from a YAML options file
    Train(TrainArgs),

    /// Evaluate pretrained weights on the configured evaluation sets
    Test(TestArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Path to the YAML options file
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override the manual seed
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for the test command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TestArgs {
    /// Path to the YAML options file
    #[arg(short = 'c', long = "config", value_name = "CONFIG")]
    pub config: PathBuf,

    /// Checkpoint to evaluate
    #[arg(short, long, value_name = "WEIGHTS")]
    pub weights: PathBuf,
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> std::result::Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Dispatch a parsed command line.
pub fn run_command(cli: Cli) -> Result<()> {
    let rank = rank_from_env();
    let level = LogLevel::from_flags(cli.verbose, cli.quiet);
    match cli.command {
        Command::Train(args) => run_train(&args, rank, level),
        Command::Test(args) => run_test(&args, rank, level),
    }
}

fn rank_from_env() -> usize {
    parse_rank(std::env::var("RANK").ok().as_deref())
}

fn parse_rank(value: Option<&str>) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn run_train(args: &TrainArgs, rank: usize, level: LogLevel) -> Result<()> {
    let mut opts = load_options(&args.config)?;
    opts.is_train = true;
    if let Some(seed) = args.seed {
        opts.manual_seed = seed;
    }

    fs::create_dir_all(&opts.path.checkpoints)?;
    let reporter = Reporter::new(rank, level)
        .with_scalar_log(opts.path.checkpoints.join("scalars.jsonl"))?;
    reporter.info(format!("Run [{}], seed {}", opts.name, opts.manual_seed));

    let mut train_loader = None;
    let mut val_loaders = Vec::new();
    for key in sorted_dataset_keys(&opts) {
        let ds_opts = &opts.datasets[&key];
        match ds_opts.phase.as_str() {
            "train" => {
                if train_loader.is_some() {
                    return Err(Error::ConfigError(
                        "more than one train dataset configured".to_string(),
                    ));
                }
                let dataset = build_dataset(ds_opts)?;
                reporter.info(format!(
                    "Train dataset [{}]: {} samples",
                    dataset.name(),
                    dataset.len()
                ));
                train_loader = Some(build_dataloader(
                    dataset,
                    ds_opts,
                    opts.manual_seed,
                    rank,
                    None,
                )?);
            }
            "val" => {
                let dataset = build_dataset(ds_opts)?;
                reporter.info(format!(
                    "Validation dataset [{}]: {} samples",
                    dataset.name(),
                    dataset.len()
                ));
                val_loaders.push(build_dataloader(
                    dataset,
                    ds_opts,
                    opts.manual_seed,
                    rank,
                    None,
                )?);
            }
            other => {
                reporter.verbose(format!("Dataset [{key}] with phase {other} not used"));
            }
        }
    }
    if train_loader.is_none() {
        return Err(Error::ConfigError(
            "no train dataset configured".to_string(),
        ));
    }

    let mut model = BaseModel::new(opts.clone())?;
    if let Some(pretrain) = &opts.path.pretrain_network_g {
        model.load_weights(
            pretrain,
            &opts.path.param_key_g,
            opts.path.strict_load_g,
            &reporter,
        )?;
    }

    let mut runner = Runner::new(model, train_loader, val_loaders, reporter);
    runner.fit()
}

fn run_test(args: &TestArgs, rank: usize, level: LogLevel) -> Result<()> {
    let mut opts = load_options(&args.config)?;
    opts.is_train = false;

    let reporter = Reporter::new(rank, level);
    reporter.info(format!("Evaluating [{}]", opts.name));

    let mut loaders: Vec<Loader> = Vec::new();
    for key in sorted_dataset_keys(&opts) {
        let ds_opts = &opts.datasets[&key];
        if matches!(ds_opts.phase.as_str(), "val" | "test") {
            let dataset = build_dataset(ds_opts)?;
            reporter.info(format!(
                "Test dataset [{}]: {} samples",
                dataset.name(),
                dataset.len()
            ));
            loaders.push(build_dataloader(
                dataset,
                ds_opts,
                opts.manual_seed,
                rank,
                None,
            )?);
        }
    }
    if loaders.is_empty() {
        return Err(Error::ConfigError(
            "no val or test dataset configured".to_string(),
        ));
    }

    let mut model = BaseModel::new(opts.clone())?;
    model.load_weights(
        &args.weights,
        &opts.path.param_key_g,
        opts.path.strict_load_g,
        &reporter,
    )?;

    let mut runner = Runner::new(model, None, loaders, reporter);
    runner.validate(0)?;
    Ok(())
}

/// Dataset sections in a stable order, so loader construction does not
/// depend on map iteration order.
fn sorted_dataset_keys(opts: &Options) -> Vec<String> {
    let mut keys: Vec<String> = opts.datasets.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_command() {
        let cli = parse_args(["despejar", "train", "-c", "options.yml", "--seed", "3"]).unwrap();
        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.config, PathBuf::from("options.yml"));
                assert_eq!(args.seed, Some(3));
            }
            Command::Test(_) => panic!("expected train command"),
        }
        assert!(!cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_parse_test_command() {
        let cli = parse_args([
            "despejar",
            "test",
            "--config",
            "options.yml",
            "--weights",
            "net_g.safetensors",
        ])
        .unwrap();
        match cli.command {
            Command::Test(args) => {
                assert_eq!(args.weights, PathBuf::from("net_g.safetensors"));
            }
            Command::Train(_) => panic!("expected test command"),
        }
    }

    #[test]
    fn test_test_command_requires_weights() {
        assert!(parse_args(["despejar", "test", "-c", "options.yml"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse_args(["despejar", "train", "-c", "o.yml", "-v"]).unwrap();
        assert!(cli.verbose);

        let cli = parse_args(["despejar", "train", "-c", "o.yml", "--quiet"]).unwrap();
        assert!(cli.quiet);
    }

    #[test]
    fn test_parse_rank() {
        assert_eq!(parse_rank(None), 0);
        assert_eq!(parse_rank(Some("2")), 2);
        assert_eq!(parse_rank(Some("not-a-rank")), 0);
    }

    #[test]
    fn test_missing_config_fails() {
        let cli = parse_args(["despejar", "train", "-c", "/proc/invalid/options.yml"]).unwrap();
        assert!(run_command(cli).is_err());
    }
}
