//! Command line entrypoint: train on fold files, evaluate a saved model,
//! or write a prediction CSV for unlabeled images.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;

use proteinatlas::backend::{backend_name, default_device, TrainingBackend};
use proteinatlas::config::ModelParameter;
use proteinatlas::dataset::{read_fold_ids, DataGenerator, LabelTable};
use proteinatlas::inference::PredictGenerator;
use proteinatlas::training::Trainer;
use proteinatlas::utils::logging::{init_logging, LogConfig};

#[derive(Parser)]
#[command(name = "proteinatlas")]
#[command(about = "Multi-label protein localization classifier", version)]
struct Cli {
    /// Verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train on a fold split and save the model
    Train {
        /// Directory prefix holding <id>_<channel>.png images
        #[arg(long)]
        data_dir: String,

        /// Labels CSV with Id, Target and one column per class
        #[arg(long)]
        labels: PathBuf,

        /// Fold number; reads train_<fold>.csv and valid_<fold>.csv
        #[arg(long, default_value_t = 1)]
        fold: usize,

        /// Directory holding the fold CSVs
        #[arg(long)]
        folds_dir: PathBuf,

        /// Where to save the trained weights
        #[arg(long, default_value = "model")]
        output: PathBuf,

        /// Optional parameter JSON; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        epochs: Option<usize>,

        #[arg(long)]
        batch_size: Option<usize>,

        #[arg(long)]
        shuffle: bool,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Score a saved model on a fold's validation split
    Evaluate {
        #[arg(long)]
        data_dir: String,

        #[arg(long)]
        labels: PathBuf,

        /// Fold CSV listing the identifiers to score
        #[arg(long)]
        ids: PathBuf,

        /// Saved model weights
        #[arg(long)]
        model: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Write per-class probabilities for unlabeled images
    Predict {
        /// Directory prefix holding the images to predict
        #[arg(long)]
        data_dir: String,

        /// Labels CSV, used for the class column names
        #[arg(long)]
        labels: PathBuf,

        /// CSV listing the identifiers to predict
        #[arg(long)]
        ids: PathBuf,

        #[arg(long)]
        model: PathBuf,

        #[arg(long, default_value = "predictions.csv")]
        output: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(&log_config).map_err(anyhow::Error::msg)?;

    println!(
        "{} {} ({} backend)",
        "proteinatlas".bold().green(),
        proteinatlas::VERSION,
        backend_name()
    );

    match cli.command {
        Command::Train {
            data_dir,
            labels,
            fold,
            folds_dir,
            output,
            config,
            epochs,
            batch_size,
            shuffle,
            workers,
            seed,
        } => {
            let table = Arc::new(LabelTable::from_csv(&labels).context("reading labels")?);
            let mut params = base_params(config.as_deref(), data_dir)?
                .with_num_classes(table.num_classes());
            if let Some(epochs) = epochs {
                params = params.with_n_epochs(epochs);
            }
            if let Some(batch_size) = batch_size {
                params = params.with_batch_size(batch_size);
            }
            if shuffle {
                params = params.with_shuffle(true);
            }
            if let Some(workers) = workers {
                params = params.with_n_workers(workers);
            }
            if let Some(seed) = seed {
                params = params.with_seed(seed);
            }

            let train_ids = read_fold_ids(&folds_dir.join(format!("train_{}.csv", fold)))
                .context("reading training fold")?;
            let valid_ids = read_fold_ids(&folds_dir.join(format!("valid_{}.csv", fold)))
                .context("reading validation fold")?;
            println!(
                "fold {}: {} training, {} validation samples",
                fold,
                train_ids.len(),
                valid_ids.len()
            );

            let mut train = DataGenerator::new(train_ids, table.clone(), params.clone())?;
            let mut valid = DataGenerator::new(valid_ids, table, params.clone())?;

            let device = default_device();
            let mut trainer = Trainer::<TrainingBackend>::new(params, device)?;
            let report = trainer.fit(&mut train, &mut valid)?;

            if let Some(last) = report.epochs.last() {
                println!(
                    "{} loss {:.4}, {}",
                    "final:".bold(),
                    last.train_loss,
                    last.valid_metrics.summary()
                );
            }

            trainer.save(&output)?;
            println!("{} {}", "saved".green(), output.display());
        }

        Command::Evaluate {
            data_dir,
            labels,
            ids,
            model,
            config,
            batch_size,
        } => {
            let table = Arc::new(LabelTable::from_csv(&labels).context("reading labels")?);
            let mut params = base_params(config.as_deref(), data_dir)?
                .with_num_classes(table.num_classes());
            if let Some(batch_size) = batch_size {
                params = params.with_batch_size(batch_size);
            }

            let ids = read_fold_ids(&ids).context("reading identifier list")?;
            let generator = DataGenerator::new(ids, table, params.clone())?;

            let device = default_device();
            let mut trainer = Trainer::<TrainingBackend>::new(params, device)?;
            trainer.load(&model)?;

            let metrics = trainer.evaluate(&generator)?;
            println!("{} {}", "validation:".bold(), metrics.summary());
        }

        Command::Predict {
            data_dir,
            labels,
            ids,
            model,
            output,
            config,
        } => {
            let table = LabelTable::from_csv(&labels).context("reading labels")?;
            let params = base_params(config.as_deref(), data_dir.clone())?
                .with_num_classes(table.num_classes());

            let ids = read_fold_ids(&ids).context("reading identifier list")?;
            println!("predicting {} samples", ids.len());

            let device = default_device();
            let mut trainer = Trainer::<TrainingBackend>::new(params.clone(), device)?;
            trainer.load(&model)?;

            let generator = PredictGenerator::new(ids, &params, data_dir)?;
            let device = default_device();
            let model = burn::module::AutodiffModule::valid(trainer.model());
            let table_out = generator.predict(&model, &device)?;
            table_out.write_csv(&output, table.class_names())?;
            println!("{} {}", "wrote".green(), output.display());
        }
    }

    Ok(())
}

/// Parameters from an optional JSON file, rebased onto the given image
/// directory.
fn base_params(config: Option<&std::path::Path>, data_dir: String) -> anyhow::Result<ModelParameter> {
    let params = match config {
        Some(path) => {
            let mut params =
                ModelParameter::load(path).context("reading parameter JSON")?;
            params.basepath = data_dir;
            params
        }
        None => ModelParameter::new(data_dir),
    };
    Ok(params)
}
