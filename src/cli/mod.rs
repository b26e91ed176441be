//! Command-line interface
//!
//! Flags mirror the training script this tool replaces, underscores
//! included. A JSON config file can supply any of them; flags given on the
//! command line win over the file.

use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::data::Task;
use crate::training::{CrossValidationOrchestrator, EnsembleConfig, EnsembleReport, MetricsRecord};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<16} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    println!("  {} {}...", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("  {} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

fn metrics_row(label: &str, m: &MetricsRecord) {
    println!("  {:<10} {:>14.4} {:>14.4} {:>14.4}", label, m.mae, m.rmse, m.mape);
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug, Default)]
#[command(name = "chainperf")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cross-validated MLP ensembles for blockchain throughput and latency")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON file with an ensemble config; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Mini-batch size [default: 32]
    #[arg(long = "batch_size")]
    pub batch_size: Option<usize>,

    /// Adam learning rate [default: 0.001]
    #[arg(long = "learning_rate")]
    pub learning_rate: Option<f64>,

    /// Dataset name: BPD-1, HFBTP or MMBPD [default: MMBPD]
    #[arg(long)]
    pub dataset: Option<String>,

    /// Prediction target: Throughput or Latency [default: Throughput]
    #[arg(long)]
    pub task: Option<Task>,

    /// Directory holding `<dataset>.csv` [default: ../data]
    #[arg(long = "data_dir")]
    pub data_dir: Option<PathBuf>,

    /// Root for checkpoints and result tables [default: .]
    #[arg(long = "output_dir")]
    pub output_dir: Option<PathBuf>,

    /// Upper bound on epochs per fold [default: 500]
    #[arg(long = "max_epochs")]
    pub max_epochs: Option<usize>,

    /// Validation rounds without improvement before stopping [default: 10]
    #[arg(long)]
    pub patience: Option<usize>,

    /// Validate every N epochs [default: 10]
    #[arg(long = "val_every")]
    pub val_every: Option<usize>,

    /// Base seed for weight init, shuffling and dropout [default: 1234]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Seed for the fold split [default: 42]
    #[arg(long = "split_seed")]
    pub split_seed: Option<u64>,

    /// Train the five folds concurrently
    #[arg(long = "parallel_folds")]
    pub parallel_folds: bool,
}

impl Cli {
    /// Resolve the effective config: file (or defaults), then flags
    pub fn ensemble_config(&self) -> anyhow::Result<EnsembleConfig> {
        let mut config = match &self.config {
            Some(path) => EnsembleConfig::from_json_file(path)?,
            None => EnsembleConfig::default(),
        };

        if let Some(dataset) = &self.dataset {
            config.dataset = dataset.clone();
        }
        if let Some(task) = self.task {
            config.task = task;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(seed) = self.split_seed {
            config.split_seed = seed;
        }
        if self.parallel_folds {
            config.parallel_folds = true;
        }

        let training = &mut config.training;
        if let Some(v) = self.batch_size {
            training.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            training.learning_rate = v;
        }
        if let Some(v) = self.max_epochs {
            training.max_epochs = v;
        }
        if let Some(v) = self.patience {
            training.patience = v;
        }
        if let Some(v) = self.val_every {
            training.val_every_n_epochs = v;
        }
        if let Some(v) = self.seed {
            training.seed = v;
        }

        training.validate()?;
        Ok(config)
    }
}

/// Run cross-validation with the parsed arguments and print a summary
pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.ensemble_config()?;

    section("Ensemble");
    kv("Dataset", &config.dataset);
    kv("Task", config.task.as_str());
    kv("Data", &config.data_dir.display().to_string());
    kv("Output", &config.output_dir.display().to_string());
    kv(
        "Training",
        &format!(
            "lr {} · batch {} · ≤{} epochs · patience {}",
            config.training.learning_rate,
            config.training.batch_size,
            config.training.max_epochs,
            config.training.patience
        ),
    );

    step_run("Training 5 folds");
    let start = Instant::now();
    let report = CrossValidationOrchestrator::new(config).run()?;
    step_done(&format!("{:.1?}", start.elapsed()));

    print_report(&report);
    Ok(())
}

fn print_report(report: &EnsembleReport) {
    section("Held-out metrics");
    println!(
        "  {:<10} {:>14} {:>14} {:>14}",
        muted("Fold"),
        muted("MAE"),
        muted("RMSE"),
        muted("MAPE")
    );
    println!("  {}", dim(&"─".repeat(56)));
    for fold in &report.folds {
        let label = format!(
            "{} {}",
            fold.member,
            if fold.history.stopped_early { "·" } else { " " }
        );
        metrics_row(&label, &fold.test_metrics);
    }
    println!("  {}", dim(&"─".repeat(56)));
    metrics_row("mean", &report.mean);
    metrics_row("std", &report.std);

    println!();
    println!("  {} {}", ok("saved"), report.result_path.display().to_string().white());
    println!("  {}", dim("· stopped early"));
    println!();
}
