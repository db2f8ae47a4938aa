//! NQMP - Negation & Quantifier Minimal Pairs CLI
//!
//! The `nqmp` command generates minimal-pair datasets and grades a model on
//! them, resumably.
//!
//! ## Commands
//!
//! - `generate`: Write `dataset.jsonl` plus its manifest
//! - `run`: Ask every pending item of a dataset and append graded records
//! - `report`: Aggregate a run directory into `metrics.json` and `report.md`
//! - `all`: generate, run and report in one output directory
//!
//! The process exits non-zero when the run ledger holds a fatal service error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};

use nqmp_client::{client_from_name, ClientConfig, ClientKind};
use nqmp_core::{
    generate, run, write_report, Dataset, FsRunLedger, GenConfig, RunInfo, RunOptions,
    DATASET_FILE, GENERATOR_VERSION,
};

const RESULTS_DIR: &str = "results";

#[derive(Parser)]
#[command(name = "nqmp")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Negation & Quantifier Minimal Pairs benchmark", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct GenArgs {
    /// Number of minimal pairs
    #[arg(long, default_value_t = 100)]
    pairs: usize,

    /// Generation seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Smallest context size
    #[arg(long, default_value_t = 6)]
    min_items: usize,

    /// Largest context size
    #[arg(long, default_value_t = 14)]
    max_items: usize,

    /// Probability of placing a threshold on the observed count
    #[arg(long, default_value_t = 0.45)]
    boundary_bias: f64,
}

impl GenArgs {
    fn config(&self) -> GenConfig {
        GenConfig {
            seed: self.seed,
            pair_count: self.pairs,
            min_items: self.min_items,
            max_items: self.max_items,
            boundary_bias: self.boundary_bias,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct ClientArgs {
    /// Answering client: echo | openrouter
    #[arg(long, default_value = "echo")]
    client: ClientKind,

    /// Model name (default: MODEL_NAME, or "echo" for the echo client)
    #[arg(long, env = "MODEL_NAME")]
    model: Option<String>,

    /// Sampling temperature
    #[arg(long, default_value_t = 0.0)]
    temperature: f32,

    /// Continue the run already recorded in the output directory
    #[arg(long)]
    resume: bool,
}

impl ClientArgs {
    fn model(&self, config: &ClientConfig) -> String {
        match (&self.model, self.client) {
            (Some(model), _) => model.clone(),
            (None, ClientKind::Echo) => "echo".to_string(),
            (None, ClientKind::OpenRouter) => config.default_model.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a minimal-pair dataset
    Generate {
        #[command(flatten)]
        gen: GenArgs,

        /// Output directory
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Run a model over a dataset
    Run {
        /// Dataset file, or a directory containing dataset.jsonl
        #[arg(long = "in")]
        input: PathBuf,

        #[command(flatten)]
        client: ClientArgs,

        /// Run directory (default: results/<client>-<model>-pairs<N>-<timestamp>)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Aggregate a run directory into report artifacts
    Report {
        /// Run directory
        #[arg(long = "in")]
        input: PathBuf,

        /// Report directory (default: the run directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Generate, run and report in one directory
    All {
        #[command(flatten)]
        gen: GenArgs,

        #[command(flatten)]
        client: ClientArgs,

        /// Run directory (default: results/<client>-<model>-pairs<N>-<timestamp>)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct RunOutput<'a> {
    run_dir: &'a Path,
    total_items: usize,
    skipped: usize,
    graded: usize,
    errored: usize,
    item_accuracy: f64,
    pair_joint_accuracy: f64,
    has_fatal_errors: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    nqmp_core::telemetry::init_tracing(cli.json, level);

    let result = match cli.command {
        Commands::Generate { gen, out } => cmd_generate(&gen, &out).map(|_| false),
        Commands::Run { input, client, out } => cmd_run(&input, &client, out).await,
        Commands::Report { input, out } => cmd_report(&input, out.as_deref()),
        Commands::All { gen, client, out } => cmd_all(&gen, &client, out).await,
    };

    match result {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => {
            eprintln!("run ledger contains fatal service errors");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Generate a dataset into `out`; returns the dataset path.
fn cmd_generate(gen: &GenArgs, out: &Path) -> Result<PathBuf> {
    let dataset = generate(&gen.config()).context("Failed to generate dataset")?;
    write_dataset(&dataset, out)
}

fn write_dataset(dataset: &Dataset, out: &Path) -> Result<PathBuf> {
    let path = dataset
        .write_to_dir(out, GENERATOR_VERSION)
        .with_context(|| format!("Failed to write dataset to {:?}", out))?;

    println!(
        "Generated {} pairs ({} items) with seed {}",
        dataset.pair_count(),
        dataset.items.len(),
        dataset
            .seed
            .map_or_else(|| "unknown".to_string(), |s| s.to_string())
    );
    println!("Dataset: {}", path.display());
    Ok(path)
}

/// Run the dataset at `input`; returns whether the ledger holds fatal errors.
async fn cmd_run(input: &Path, args: &ClientArgs, out: Option<PathBuf>) -> Result<bool> {
    let dataset_path = if input.is_dir() {
        input.join(DATASET_FILE)
    } else {
        input.to_path_buf()
    };
    let dataset = Dataset::read(&dataset_path)
        .with_context(|| format!("Failed to read dataset {:?}", dataset_path))?;
    execute(&dataset, args, out).await
}

/// Generate, run and report in one directory.
///
/// With `--resume`, an existing `dataset.jsonl` is reused instead of
/// regenerated. Ledger checks run before any dataset bytes are written.
async fn cmd_all(gen: &GenArgs, args: &ClientArgs, out: Option<PathBuf>) -> Result<bool> {
    let config = ClientConfig::from_env();
    let model = args.model(&config);
    let out = resolve_run_dir(out, args, &model, gen.pairs)?;

    let existing = out.join(DATASET_FILE);
    let reuse = args.resume && existing.exists();
    let dataset = if reuse {
        let dataset = Dataset::read(&existing)
            .with_context(|| format!("Failed to read dataset {:?}", existing))?;
        if dataset.seed != Some(gen.seed) || dataset.pair_count() != gen.pairs {
            bail!(
                "cannot resume: {:?} holds {} pairs with seed {:?}, requested {} pairs with seed {}",
                existing,
                dataset.pair_count(),
                dataset.seed,
                gen.pairs,
                gen.seed
            );
        }
        info!("Reusing dataset {:?}", existing);
        dataset
    } else {
        generate(&gen.config()).context("Failed to generate dataset")?
    };

    let requested = requested_run(&dataset, args, &model)?;
    FsRunLedger::check_open(&out, &requested, args.resume)
        .with_context(|| format!("Failed to open run ledger in {:?}", out))?;
    if !reuse {
        write_dataset(&dataset, &out)?;
    }
    execute(&dataset, args, Some(out)).await
}

fn requested_run(dataset: &Dataset, args: &ClientArgs, model: &str) -> Result<RunInfo> {
    Ok(RunInfo::new(
        dataset.seed,
        dataset.pair_count(),
        dataset.digest()?,
        args.client.as_str(),
        model,
    ))
}

async fn execute(dataset: &Dataset, args: &ClientArgs, out: Option<PathBuf>) -> Result<bool> {
    let config = ClientConfig::from_env().with_temperature(args.temperature);
    let model = args.model(&config);
    let run_dir = resolve_run_dir(out, args, &model, dataset.pair_count())?;

    let client = client_from_name(args.client, config)
        .with_context(|| format!("Failed to create {} client", args.client))?;

    let requested = requested_run(dataset, args, &model)?;
    let mut ledger = FsRunLedger::open(&run_dir, &requested, args.resume)
        .with_context(|| format!("Failed to open run ledger in {:?}", run_dir))?;
    info!(
        "Running {} items against {} ({}) in {:?}",
        dataset.items.len(),
        args.client,
        model,
        run_dir
    );

    let options = RunOptions::new(ledger.info().run_id.to_string(), model.as_str());
    let summary = run(dataset, client.as_ref(), &mut ledger, &options)
        .await
        .context("Run aborted")?;
    drop(ledger);

    let (artifact, paths) = write_report(&run_dir, &run_dir)?;
    let output = RunOutput {
        run_dir: &run_dir,
        total_items: summary.total_items,
        skipped: summary.skipped,
        graded: summary.graded,
        errored: summary.errored(),
        item_accuracy: artifact.metrics.item_accuracy,
        pair_joint_accuracy: artifact.metrics.pair_joint_accuracy,
        has_fatal_errors: summary.has_fatal_errors,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    println!("Report: {}", paths.report.display());
    Ok(summary.has_fatal_errors)
}

fn cmd_report(input: &Path, out: Option<&Path>) -> Result<bool> {
    let out = out.unwrap_or(input);
    let (artifact, paths) = write_report(input, out)?;

    println!(
        "Item accuracy: {:.3} | Pair joint accuracy: {:.3} | Items: {} | Pairs: {}",
        artifact.metrics.item_accuracy,
        artifact.metrics.pair_joint_accuracy,
        artifact.metrics.items,
        artifact.metrics.pairs
    );
    println!("Metrics: {}", paths.metrics.display());
    println!("Report: {}", paths.report.display());
    Ok(artifact.has_fatal_errors)
}

/// Directory-name stem for automatically placed runs.
fn run_dir_prefix(client: ClientKind, model: &str, pairs: usize) -> String {
    let model: String = model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{client}-{model}-pairs{pairs}-")
}

/// Pick the run directory. With `--resume` and no `--out`, continue the most
/// recent automatically placed run with the same client, model and size.
fn resolve_run_dir(
    out: Option<PathBuf>,
    args: &ClientArgs,
    model: &str,
    pairs: usize,
) -> Result<PathBuf> {
    if let Some(out) = out {
        return Ok(out);
    }
    let prefix = run_dir_prefix(args.client, model, pairs);
    let results = Path::new(RESULTS_DIR);
    if args.resume {
        if let Some(latest) = latest_run_dir(results, &prefix)? {
            return Ok(latest);
        }
        bail!("--resume found no earlier run under {RESULTS_DIR}/{prefix}*; pass --out");
    }
    let stamp = Utc::now().format("%Y%m%d-%H%M%S");
    Ok(results.join(format!("{prefix}{stamp}")))
}

fn latest_run_dir(results: &Path, prefix: &str) -> Result<Option<PathBuf>> {
    if !results.is_dir() {
        return Ok(None);
    }
    let mut candidates = Vec::new();
    for entry in std::fs::read_dir(results).with_context(|| format!("read {:?}", results))? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && entry.path().is_dir() {
            candidates.push(name);
        }
    }
    // Timestamps sort lexically.
    candidates.sort();
    Ok(candidates.pop().map(|name| results.join(name)))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use nqmp_core::ledger::fs::PREDICTIONS_FILE;
    use nqmp_core::manifest_path;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "nqmp",
            "--json",
            "run",
            "--in",
            "data/dataset.jsonl",
            "--client",
            "openrouter",
            "--model",
            "openai/gpt-4o",
            "--resume",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Run { input, client, out } => {
                assert_eq!(input, PathBuf::from("data/dataset.jsonl"));
                assert_eq!(client.client, ClientKind::OpenRouter);
                assert_eq!(client.model.as_deref(), Some("openai/gpt-4o"));
                assert!(client.resume);
                assert!(out.is_none());
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn unknown_client_rejected() {
        assert!(Cli::try_parse_from(["nqmp", "run", "--in", "d", "--client", "nope"]).is_err());
    }

    #[test]
    fn run_dir_prefix_sanitizes_model() {
        assert_eq!(
            run_dir_prefix(ClientKind::OpenRouter, "openai/gpt-4o-mini", 100),
            "openrouter-openai_gpt-4o-mini-pairs100-"
        );
    }

    #[test]
    fn latest_run_dir_picks_newest_match() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "echo-echo-pairs10-20260101-000000",
            "echo-echo-pairs10-20260301-000000",
            "echo-echo-pairs20-20260401-000000",
        ] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let latest = latest_run_dir(dir.path(), "echo-echo-pairs10-").unwrap();
        assert_eq!(
            latest,
            Some(dir.path().join("echo-echo-pairs10-20260301-000000"))
        );
        assert!(latest_run_dir(dir.path(), "openrouter-").unwrap().is_none());
    }

    #[test]
    fn generate_writes_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let gen = GenArgs {
            pairs: 3,
            seed: 1,
            min_items: 6,
            max_items: 14,
            boundary_bias: 0.45,
        };
        let path = cmd_generate(&gen, dir.path()).unwrap();
        assert_eq!(Dataset::read(&path).unwrap().pair_count(), 3);
    }

    fn echo_args(resume: bool) -> ClientArgs {
        ClientArgs {
            client: ClientKind::Echo,
            model: None,
            temperature: 0.0,
            resume,
        }
    }

    #[tokio::test]
    async fn all_resume_with_other_seed_keeps_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let out = || Some(dir.path().to_path_buf());
        let gen = GenArgs {
            pairs: 4,
            seed: 42,
            min_items: 6,
            max_items: 14,
            boundary_bias: 0.45,
        };
        assert!(!cmd_all(&gen, &echo_args(false), out()).await.unwrap());

        let dataset_path = dir.path().join(DATASET_FILE);
        let dataset_before = std::fs::read(&dataset_path).unwrap();
        let manifest_before = std::fs::read(manifest_path(&dataset_path)).unwrap();
        let predictions_before = std::fs::read(dir.path().join(PREDICTIONS_FILE)).unwrap();

        let other = GenArgs { seed: 7, ..gen.clone() };
        assert!(cmd_all(&other, &echo_args(true), out()).await.is_err());
        assert!(cmd_all(&other, &echo_args(false), out()).await.is_err());

        assert_eq!(std::fs::read(&dataset_path).unwrap(), dataset_before);
        assert_eq!(
            std::fs::read(manifest_path(&dataset_path)).unwrap(),
            manifest_before
        );

        // The original run still resumes, with nothing left to ask.
        assert!(!cmd_run(dir.path(), &echo_args(true), out()).await.unwrap());
        assert!(!cmd_all(&gen, &echo_args(true), out()).await.unwrap());
        assert_eq!(std::fs::read(&dataset_path).unwrap(), dataset_before);
        assert_eq!(
            std::fs::read(dir.path().join(PREDICTIONS_FILE)).unwrap(),
            predictions_before
        );
    }

    #[tokio::test]
    async fn echo_run_then_report() {
        let dir = tempfile::tempdir().unwrap();
        let gen = GenArgs {
            pairs: 4,
            seed: 42,
            min_items: 6,
            max_items: 14,
            boundary_bias: 0.45,
        };
        let fatal = cmd_all(&gen, &echo_args(false), Some(dir.path().to_path_buf()))
            .await
            .unwrap();
        assert!(!fatal);
        assert!(dir.path().join("metrics.json").exists());
        assert!(!cmd_report(dir.path(), None).unwrap());
    }
}
