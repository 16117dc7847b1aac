use clap::{Parser, Subcommand, ValueEnum};
use itertools::Itertools;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use std::process;

use prognos::artifact::SavedModel;
use prognos::data::Dataset;
use prognos::glm::{self, FitConfig, LinkFunction};
use prognos::metrics::{ConfusionOutcome, PositiveClass, evaluate_holdout};
use prognos::model::{DesignMatrix, ModelSpec, SpecError, binary_outcome};
use prognos::resample::{ResamplingPlan, compare, select_best};
use prognos::split::split_train_test;
use prognos::summary::{ColumnSummary, summarize, summarize_groups};

#[derive(Parser)]
#[command(
    name = "prognos",
    about = "Compare clinical outcome classifiers by repeated cross-validation",
    long_about = "A tool for comparing candidate classification models on tabular clinical data: \
                 seeded train/test partitioning, repeated v-fold cross-validation over candidate \
                 model formulas, selection by mean accuracy, and a held-out confusion matrix for \
                 the selected model."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PositiveClassCli {
    /// Treat the outcome label encoded as 0 as positive
    Zero,
    /// Treat the outcome label encoded as 1 as positive
    One,
}

impl From<PositiveClassCli> for PositiveClass {
    fn from(value: PositiveClassCli) -> Self {
        match value {
            PositiveClassCli::Zero => PositiveClass::Zero,
            PositiveClassCli::One => PositiveClass::One,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print per-column summary statistics
    Summarize {
        /// Path to a CSV file with a header row
        data: String,

        /// Group the tables by this column's levels
        #[arg(long, value_name = "COLUMN")]
        by: Option<String>,
    },

    /// Cross-validate candidate models and evaluate the winner on the holdout
    Compare {
        /// Path to a CSV file with a header row
        data: String,

        /// Candidate model formula, e.g. "HeartDisease ~ Age + MaxHR"; repeat for each candidate
        #[arg(long = "spec", value_name = "FORMULA", required = true)]
        specs: Vec<String>,

        /// Seed for the train/test partition and the fold assignments
        #[arg(long)]
        seed: u64,

        /// Number of cross-validation folds per repeat
        #[arg(long, default_value = "10")]
        folds: usize,

        /// Number of independent fold assignments
        #[arg(long, default_value = "3")]
        repeats: usize,

        /// Fraction of rows assigned to the training side
        #[arg(long, default_value = "0.8")]
        train_fraction: f64,

        /// Which outcome label counts as positive in the confusion matrix
        #[arg(long, value_enum, default_value_t = PositiveClassCli::Zero)]
        positive_class: PositiveClassCli,

        /// Maximum number of IRLS iterations per fit
        #[arg(long, default_value = "50")]
        max_iterations: usize,

        /// Convergence tolerance on the deviance change
        #[arg(long, default_value = "1e-8")]
        tolerance: f64,

        /// L2 penalty on non-intercept coefficients
        #[arg(long, default_value = "0.0")]
        ridge: f64,

        /// Write the selected model to this TOML file
        #[arg(long, value_name = "PATH")]
        save_model: Option<PathBuf>,
    },

    /// Fit a single model on the training split and report holdout performance
    Fit {
        /// Path to a CSV file with a header row
        data: String,

        /// Model formula; the link is chosen from the outcome (two categories: logit, otherwise identity)
        #[arg(long = "spec", value_name = "FORMULA")]
        spec: String,

        /// Seed for the train/test partition
        #[arg(long)]
        seed: u64,

        /// Fraction of rows assigned to the training side
        #[arg(long, default_value = "0.8")]
        train_fraction: f64,

        /// Maximum number of IRLS iterations
        #[arg(long, default_value = "50")]
        max_iterations: usize,

        /// Convergence tolerance on the deviance change
        #[arg(long, default_value = "1e-8")]
        tolerance: f64,

        /// L2 penalty on non-intercept coefficients
        #[arg(long, default_value = "0.0")]
        ridge: f64,

        /// Write the fitted model to this TOML file
        #[arg(long, value_name = "PATH")]
        save_model: Option<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Summarize { data, by } => summarize_command(&data, by.as_deref()),
        Commands::Compare {
            data,
            specs,
            seed,
            folds,
            repeats,
            train_fraction,
            positive_class,
            max_iterations,
            tolerance,
            ridge,
            save_model,
        } => compare_command(
            &data,
            &specs,
            seed,
            folds,
            repeats,
            train_fraction,
            positive_class.into(),
            fit_config(LinkFunction::Logit, max_iterations, tolerance, ridge),
            save_model.as_deref(),
        ),
        Commands::Fit {
            data,
            spec,
            seed,
            train_fraction,
            max_iterations,
            tolerance,
            ridge,
            save_model,
        } => fit_command(
            &data,
            &spec,
            seed,
            train_fraction,
            max_iterations,
            tolerance,
            ridge,
            save_model.as_deref(),
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn fit_config(link: LinkFunction, max_iterations: usize, tolerance: f64, ridge: f64) -> FitConfig {
    let mut config = FitConfig::new(link);
    config.max_iterations = max_iterations;
    config.tolerance = tolerance;
    config.ridge = ridge;
    config
}

fn summarize_command(data_path: &str, by: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let data = Dataset::from_csv(Path::new(data_path))?;
    println!(
        "{}: {} rows, {} columns",
        data_path,
        data.n_rows(),
        data.columns().len()
    );

    match by {
        None => print_summaries(&summarize(&data)),
        Some(column) => {
            for (label, summaries) in summarize_groups(&data, column)? {
                println!();
                println!("{column} = {label}:");
                print_summaries(&summaries);
            }
        }
    }
    Ok(())
}

fn print_summaries(summaries: &[ColumnSummary]) {
    for summary in summaries {
        match summary {
            ColumnSummary::Numeric(s) => println!(
                "  {:<16} n={:<5} mean={:<9.3} sd={:<9.3} min={:<8.3} median={:<8.3} max={:<8.3}",
                s.name, s.count, s.mean, s.std_dev, s.min, s.median, s.max
            ),
            ColumnSummary::Categorical { name, counts } => println!(
                "  {:<16} {}",
                name,
                counts
                    .iter()
                    .map(|c| format!("{}={}", c.level, c.count))
                    .join(", ")
            ),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn compare_command(
    data_path: &str,
    formulas: &[String],
    seed: u64,
    folds: usize,
    repeats: usize,
    train_fraction: f64,
    positive: PositiveClass,
    config: FitConfig,
    save_model: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = Dataset::from_csv(Path::new(data_path))?;
    println!(
        "Loaded {} rows, {} columns from {}",
        data.n_rows(),
        data.columns().len(),
        data_path
    );

    let specs: Vec<ModelSpec> = formulas
        .iter()
        .map(|f| ModelSpec::parse(f))
        .collect::<Result<_, _>>()?;

    let mut rng = StdRng::seed_from_u64(seed);
    let partition = split_train_test(data.n_rows(), train_fraction, &mut rng)?;
    let train = data.subset(&partition.train);
    let test = data.subset(&partition.test);
    println!(
        "Partition (seed {}): {} training rows, {} test rows",
        seed,
        train.n_rows(),
        test.n_rows()
    );

    let plan = ResamplingPlan::new(folds, repeats)?;
    let comparison = compare(&train, &specs, &plan, &config, &mut rng)?;

    println!();
    println!(
        "Mean accuracy over {} fold fits ({} folds x {} repeats):",
        folds * repeats,
        folds,
        repeats
    );
    let width = specs.iter().map(|s| s.label().len()).max().unwrap_or(0);
    for entry in &comparison.comparisons {
        println!(
            "  {:<width$}  {:.4}",
            entry.spec.label(),
            entry.mean_metric,
            width = width
        );
    }

    let best = select_best(&comparison)?;
    println!();
    println!("Selected model: {}", best.spec);

    let outcome = evaluate_holdout(&best.spec, &train, &test, &config, positive)?;
    print_confusion(&outcome, positive);

    if let Some(path) = save_model {
        let design = DesignMatrix::classification(&train, &best.spec)?;
        let fitted = glm::fit(design.x.view(), design.y.view(), &config)?;
        SavedModel::from_fit(&best.spec, &design.column_names, &fitted).save(path)?;
        println!();
        println!("Model saved to: {}", path.display());
    }
    Ok(())
}

fn print_confusion(outcome: &ConfusionOutcome, positive: PositiveClass) {
    let label = match positive {
        PositiveClass::Zero => "0",
        PositiveClass::One => "1",
    };
    println!();
    println!(
        "Holdout evaluation on {} test rows (positive class: {}):",
        outcome.total(),
        label
    );
    println!("  {:<10} {:>12} {:>12}", "", "predicted +", "predicted -");
    println!(
        "  {:<10} {:>12} {:>12}",
        "actual +", outcome.true_positive, outcome.false_negative
    );
    println!(
        "  {:<10} {:>12} {:>12}",
        "actual -", outcome.false_positive, outcome.true_negative
    );
    println!("  accuracy    {:.4}", outcome.accuracy());
    println!("  sensitivity {:.4}", outcome.sensitivity());
    println!("  specificity {:.4}", outcome.specificity());
}

#[allow(clippy::too_many_arguments)]
fn fit_command(
    data_path: &str,
    formula: &str,
    seed: u64,
    train_fraction: f64,
    max_iterations: usize,
    tolerance: f64,
    ridge: f64,
    save_model: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = Dataset::from_csv(Path::new(data_path))?;
    let spec = ModelSpec::parse(formula)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let partition = split_train_test(data.n_rows(), train_fraction, &mut rng)?;
    let train = data.subset(&partition.train);
    let test = data.subset(&partition.test);
    println!(
        "Partition (seed {}): {} training rows, {} test rows",
        seed,
        train.n_rows(),
        test.n_rows()
    );

    let link = detect_link_function(&train, &spec)?;
    println!("Link function: {:?}", link);
    let config = fit_config(link, max_iterations, tolerance, ridge);

    let (train_design, test_design) = match link {
        LinkFunction::Logit => (
            DesignMatrix::classification(&train, &spec)?,
            DesignMatrix::classification(&test, &spec)?,
        ),
        LinkFunction::Identity => (
            DesignMatrix::regression(&train, &spec)?,
            DesignMatrix::regression(&test, &spec)?,
        ),
    };

    let fitted = glm::fit(train_design.x.view(), train_design.y.view(), &config)?;
    println!();
    println!("Coefficients ({} iterations):", fitted.iterations);
    for (name, value) in train_design
        .column_names
        .iter()
        .zip(fitted.coefficients.iter())
    {
        println!("  {:<24} {:>12.6}", name, value);
    }
    println!("  deviance: {:.4}", fitted.deviance);

    println!();
    match link {
        LinkFunction::Logit => {
            let labels = fitted.classify(test_design.x.view());
            let holdout = prognos::metrics::accuracy(labels.view(), test_design.y.view());
            println!(
                "Holdout accuracy on {} test rows: {:.4}",
                test.n_rows(),
                holdout
            );
        }
        LinkFunction::Identity => {
            let predictions = fitted.predict_mean(test_design.x.view());
            let rmse = (&predictions - &test_design.y)
                .mapv(|v| v.powi(2))
                .mean()
                .unwrap_or(f64::NAN)
                .sqrt();
            println!("Holdout RMSE on {} test rows: {:.4}", test.n_rows(), rmse);
        }
    }

    if let Some(path) = save_model {
        SavedModel::from_fit(&spec, &train_design.column_names, &fitted).save(path)?;
        println!("Model saved to: {}", path.display());
    }
    Ok(())
}

/// Chooses the link from the outcome column: two categories mean a logistic
/// fit, anything else an ordinary least-squares fit.
fn detect_link_function(train: &Dataset, spec: &ModelSpec) -> Result<LinkFunction, SpecError> {
    match binary_outcome(train, &spec.outcome) {
        Ok(_) => Ok(LinkFunction::Logit),
        Err(SpecError::NonBinaryOutcome { .. }) => Ok(LinkFunction::Identity),
        Err(e) => Err(e),
    }
}
