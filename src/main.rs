use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use encounter_io::{ExperimentName, GridReader, ObservationReader, ResultWriter};
use encounter_model::{PipelineConfig, SurfacePredictor, TrainedModel};
use encounter_survey::{HOURS_OF_DAY, TimeBucket, YEAR};

#[derive(Parser)]
#[command(name = "encounter")]
#[command(about = "Species encounter-rate modeling from biased citizen-science survey records")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Tuning parameters for the fitting pipeline.
#[derive(Args, Debug, Clone)]
struct FitArgs {
    /// Hexagon center spacing in kilometres for spatial strata
    #[arg(long, default_value_t = 5.0)]
    spacing_km: f64,

    /// Temporal strata: "year-week", "week", or "month"
    #[arg(long, default_value = "year-week")]
    time_bucket: String,

    /// Fraction of complete records assigned to training
    #[arg(long, default_value_t = 0.8)]
    train_fraction: f64,

    /// Number of trees in the forest
    #[arg(long, default_value_t = 1000)]
    n_trees: usize,

    /// Maximum tree depth (unlimited if not set)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Degrees of freedom of the calibration spline
    #[arg(long, default_value_t = 5)]
    calibration_df: usize,

    /// Number of candidate thresholds on [0, 1]
    #[arg(long, default_value_t = 101)]
    n_thresholds: usize,

    /// Minimum share of records an hour needs to hold the peak time
    #[arg(long, default_value_t = 0.01)]
    min_hour_share: f64,

    /// Grid points per partial-dependence curve
    #[arg(long, default_value_t = 25)]
    grid_resolution: usize,

    /// Number of top covariates with dependence curves
    #[arg(long, default_value_t = 6)]
    top_covariates: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Fit, calibrate, and assess an encounter-rate model
    Fit {
        /// Path to the survey records CSV file
        #[arg(long)]
        observations: PathBuf,

        /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        tuning: FitArgs,
    },

    /// Predict an encounter-rate surface over a habitat grid
    Predict {
        /// Path to the trained model binary
        #[arg(long)]
        model: PathBuf,

        /// Path to the prediction grid CSV file
        #[arg(long)]
        grid: PathBuf,

        /// Experiment name for output files
        #[arg(long)]
        experiment: String,

        /// Output directory for result files
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Survey start time to predict for (defaults to the fitted peak)
        #[arg(long)]
        hours_of_day: Option<f64>,

        /// Year to predict for (defaults to the latest training year)
        #[arg(long)]
        year: Option<i32>,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct FitOutput {
    experiment: String,
    n_input: usize,
    n_strata: usize,
    prevalence_before: f64,
    prevalence_after: f64,
    n_train: usize,
    n_test: usize,
    n_dropped: usize,
    threshold: f64,
    raw_auc: f64,
    calibrated_auc: f64,
    calibrated_kappa: f64,
    calibrated_mse: f64,
    top_covariate: Option<String>,
    peak_hours: Option<f64>,
    model_path: PathBuf,
}

#[derive(Serialize)]
struct PredictOutput {
    experiment: String,
    n_points: usize,
    mean_encounter_rate: f64,
    min_encounter_rate: f64,
    max_encounter_rate: f64,
    model_n_trees: usize,
    model_n_covariates: usize,
    surface_path: PathBuf,
}

fn parse_time_bucket(s: &str) -> Result<TimeBucket> {
    match s {
        "year-week" => Ok(TimeBucket::YearWeek),
        "week" => Ok(TimeBucket::Week),
        "month" => Ok(TimeBucket::Month),
        other => anyhow::bail!("unknown time bucket: {other} (expected year-week, week, or month)"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Fit {
            observations,
            experiment,
            output_dir,
            tuning,
        } => {
            let experiment_name =
                ExperimentName::new(experiment.clone()).context("invalid experiment name")?;
            let time_bucket = parse_time_bucket(&tuning.time_bucket)?;

            let set = ObservationReader::new(&observations)
                .read()
                .with_context(|| format!("failed to read {}", observations.display()))?;

            let config = PipelineConfig::new()
                .with_seed(cli.seed)
                .with_spacing_km(tuning.spacing_km)
                .with_time_bucket(time_bucket)
                .with_train_fraction(tuning.train_fraction)
                .with_n_trees(tuning.n_trees)
                .with_max_depth(tuning.max_depth)
                .with_calibration_df(tuning.calibration_df)
                .with_n_thresholds(tuning.n_thresholds)
                .with_min_hour_share(tuning.min_hour_share)
                .with_grid_resolution(tuning.grid_resolution)
                .with_top_covariates(tuning.top_covariates);

            info!(
                n_observations = set.len(),
                n_trees = tuning.n_trees,
                seed = cli.seed,
                "fitting encounter-rate model"
            );
            let out = config.run(&set).context("pipeline failed")?;

            let writer = ResultWriter::new(&output_dir, experiment_name)
                .context("failed to create result writer")?;
            let model_path = writer.model_path();
            out.model
                .save(&model_path)
                .with_context(|| format!("failed to save model to {}", model_path.display()))?;
            writer
                .write_assessment(&out.assessment, out.n_train, out.n_test)
                .context("failed to write assessment")?;
            writer
                .write_dependence(&out.importance, &out.curves, out.peak.as_ref())
                .context("failed to write dependence curves")?;

            let output = FitOutput {
                experiment,
                n_input: out.subsample.n_input,
                n_strata: out.subsample.n_strata,
                prevalence_before: out.subsample.prevalence_before,
                prevalence_after: out.subsample.prevalence_after,
                n_train: out.n_train,
                n_test: out.n_test,
                n_dropped: out.n_dropped,
                threshold: out.assessment.calibrated.threshold,
                raw_auc: out.assessment.raw.auc,
                calibrated_auc: out.assessment.calibrated.auc,
                calibrated_kappa: out.assessment.calibrated.kappa,
                calibrated_mse: out.assessment.calibrated.mse,
                top_covariate: out.importance.first().map(|c| c.name.clone()),
                peak_hours: out.peak.map(|p| p.hours),
                model_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Predict {
            model,
            grid,
            experiment,
            output_dir,
            hours_of_day,
            year,
        } => {
            let experiment_name =
                ExperimentName::new(experiment.clone()).context("invalid experiment name")?;

            let trained = TrainedModel::load(&model)
                .with_context(|| format!("failed to load model from {}", model.display()))?;
            let mut prediction_grid = GridReader::new(&grid)
                .read()
                .with_context(|| format!("failed to read {}", grid.display()))?;

            let names = trained.covariate_names();
            let mut reference = trained.reference_effort().clone();
            if let Some(hours) = hours_of_day {
                if !names.iter().any(|n| n == HOURS_OF_DAY) {
                    warn!("model has no time-of-day covariate, --hours-of-day ignored");
                }
                reference = reference.with_value(HOURS_OF_DAY, hours);
            }
            if let Some(year) = year {
                reference = reference.with_value(YEAR, f64::from(year));
            }
            let reference = reference.restricted_to(names);

            let summary = SurfacePredictor::new(&trained, reference)
                .apply(&mut prediction_grid)
                .context("surface prediction failed")?;

            let writer = ResultWriter::new(&output_dir, experiment_name)
                .context("failed to create result writer")?;
            let surface_path = writer
                .write_surface(&prediction_grid)
                .context("failed to write surface")?;

            let output = PredictOutput {
                experiment,
                n_points: summary.n_points,
                mean_encounter_rate: summary.mean_encounter_rate,
                min_encounter_rate: summary.min_encounter_rate,
                max_encounter_rate: summary.max_encounter_rate,
                model_n_trees: trained.ensemble().n_trees(),
                model_n_covariates: trained.ensemble().n_covariates(),
                surface_path,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
