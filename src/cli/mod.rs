//! Crashcast CLI Module
//!
//! Command-line interface for serving the API and running offline training.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::{FoldModelPolicy, ModelConfig, PipelineConfig};
use crate::data::read_csv_file;
use crate::serving::{is_valid_model_id, FsModelLoader};
use crate::training::{CrossValidationTrainer, TrainingReport};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "crashcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Road crash count regression: k-fold training and a prediction API")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API (default)
    Serve {
        /// Server port [env: API_PORT, default 8000]
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host [env: API_HOST, default 0.0.0.0]
        #[arg(long)]
        host: Option<String>,
    },

    /// Cross-validate on a CSV file and save the final model
    Train {
        /// Input CSV with a header row
        #[arg(short, long)]
        data: PathBuf,

        /// Training epochs per fold
        #[arg(short, long, default_value = "9")]
        epochs: usize,

        /// Number of folds
        #[arg(short, long, default_value = "5")]
        kfolds: usize,

        /// Artifact path for the final model
        #[arg(short, long, env = "ARTIFACT_PATH", default_value = "./crash_prediction_dnn_model.json")]
        output: PathBuf,

        /// Fold policy: fresh or carryover
        #[arg(long, env = "FOLD_POLICY", default_value = "fresh")]
        policy: FoldModelPolicy,

        /// Also publish the model under this id in the models directory
        #[arg(long)]
        model_id: Option<String>,

        /// Models directory used with --model-id
        #[arg(long, env = "MODELS_DIR", default_value = "./models")]
        models_dir: PathBuf,
    },
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    data_path: &PathBuf,
    epochs: usize,
    kfolds: usize,
    output: &PathBuf,
    policy: FoldModelPolicy,
    model_id: Option<&str>,
    models_dir: &PathBuf,
) -> anyhow::Result<()> {
    let publish_to = match model_id {
        Some(id) if !is_valid_model_id(id) => anyhow::bail!("Invalid model id: {}", id),
        Some(id) => Some(FsModelLoader::new(models_dir).publish_path(id)?),
        None => None,
    };

    section("Train");

    step_run("Loading data");
    let start = Instant::now();
    let df = read_csv_file(data_path)?;
    step_done(&format!("{} rows × {} cols in {:?}", df.height(), df.width(), start.elapsed()));

    let trainer = CrossValidationTrainer::new(PipelineConfig::from_env(), ModelConfig::default(), output)
        .with_policy(policy);

    step_run(&format!("Training {} folds × {} epochs", kfolds, epochs));
    let start = Instant::now();
    let outcome = trainer.train(&df, epochs, kfolds)?;
    step_done(&format!("{:?}", start.elapsed()));

    let copies: Vec<&std::path::Path> = publish_to.iter().map(|p| p.as_path()).collect();
    trainer.persist(&outcome.model, &copies)?;

    print_report(&outcome.report);
    println!("  {:<16} {}", muted("Saved"), output.display().to_string().white());
    if let Some(path) = &publish_to {
        println!("  {:<16} {}", muted("Published"), path.display().to_string().white());
    }
    println!();

    Ok(())
}

fn print_report(report: &TrainingReport) {
    println!();
    println!(
        "  {:<6} {:>8} {:>8} {:>12} {:>12} {:>10}",
        muted("Fold"),
        muted("Train"),
        muted("Test"),
        muted("MSE"),
        muted("MAE"),
        muted("R²")
    );
    for fold in &report.folds {
        println!(
            "  {:<6} {:>8} {:>8} {:>12.4} {:>12.4} {:>10.4}",
            fold.fold, fold.train_rows, fold.test_rows, fold.metrics.mse, fold.metrics.mae, fold.metrics.r2
        );
    }
    println!();
    println!("  {:<16} {}", muted("Average MSE"), format!("{:.4}", report.aggregate.mse).white().bold());
    println!("  {:<16} {}", muted("Average MAE"), format!("{:.4}", report.aggregate.mae).white().bold());
    println!("  {:<16} {}", muted("Average R²"), format!("{:.4}", report.aggregate.r2).white().bold());
    if report.rows_dropped > 0 {
        println!("  {:<16} {}", muted("Dropped rows"), report.rows_dropped.to_string().yellow());
    }
    println!("  {:<16} {}", muted("Time"), format!("{:.3}s", report.training_time_secs).white());
}

pub async fn cmd_serve(host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    use crate::server::{run_server, ServerConfig};

    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }

    section(&format!("Crashcast v{}", env!("CARGO_PKG_VERSION")));
    println!("  {:<10} {}", muted("API"), accent(&format!("http://{}:{}", config.host, config.port)));
    println!("  {:<10} {}", muted("Health"), accent(&format!("http://{}:{}/health", config.host, config.port)));
    println!("  {:<10} {}", muted("Models"), config.models_dir.display().to_string().white());
    println!("  {}", dim("ctrl+c to stop"));
    println!();

    run_server(config).await
}
