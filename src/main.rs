//! fashion-mlp CLI
//!
//! ```bash
//! # Train on Fashion-MNIST IDX files
//! fashion-mlp train --data-dir data/fashion
//!
//! # Quick reproducible run without a dataset, no dropout (to watch it overfit)
//! fashion-mlp train --synthetic --epochs 5 --dropout 0
//!
//! # Print the default config as JSON
//! fashion-mlp config > experiment.json
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fashion_mlp::idx::{self, Split};
use fashion_mlp::synthetic::{self, SyntheticConfig};
use fashion_mlp::{
    ClassifierBuilder, Dataset, Error, ExperimentConfig, FASHION_MNIST_LABELS, Result, TextView,
    Trainer, View, infer,
};

#[derive(Parser, Debug)]
#[command(name = "fashion-mlp", version, about = "Train a dropout MLP classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train, validate every epoch, then classify one test image
    Train(TrainArgs),
    /// Print the default experiment config as JSON
    Config,
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Directory with the four uncompressed IDX files
    #[arg(long, required_unless_present = "synthetic", conflicts_with = "synthetic")]
    data_dir: Option<PathBuf>,

    /// Use seeded synthetic blobs instead of IDX files
    #[arg(long)]
    synthetic: bool,

    /// JSON experiment config; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    lr: Option<f32>,

    /// Dropout probability for hidden layers (0 disables it)
    #[arg(long)]
    dropout: Option<f32>,

    /// Seeds init, shuffling and dropout
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    no_shuffle: bool,

    /// Index of the test sample to classify after training
    #[arg(long, default_value_t = 0)]
    show: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Train(args) => train(args),
        Command::Config => ExperimentConfig::default()
            .to_json_string_pretty()
            .map(|json| println!("{json}")),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;
    let (train_set, test_set) = load_data(&args, &cfg)?;

    let mut model = ClassifierBuilder::from_config(&cfg.model)?
        .build_with_seed(cfg.model.num_classes, cfg.init_seed)?;
    let mut trainer = Trainer::new(&model, cfg.train)?;
    let history = trainer.fit_with(&mut model, &train_set, &test_set, |report| {
        println!("{report}");
    })?;

    if let Some(best) = history.best_epoch() {
        info!(epoch = best.epoch, test_loss = best.test_loss, "lowest validation loss");
    }

    if args.show >= test_set.len() {
        return Err(Error::InvalidConfig(format!(
            "--show {} is out of range for {} test samples",
            args.show,
            test_set.len()
        )));
    }
    let image = test_set.input(args.show);
    let prediction = infer::predict(&model, image)?;
    let labels = label_names(cfg.model.num_classes);
    let label_refs: Vec<&str> = labels.iter().map(String::as_str).collect();

    let mut view = TextView::new(io::stdout().lock(), image_width(image.len()));
    view.show(image, &prediction.probabilities, &label_refs)?;
    println!(
        "predicted: {} (true: {})",
        label_refs[prediction.class],
        label_refs[test_set.label(args.show)]
    );
    Ok(())
}

fn resolve_config(args: &TrainArgs) -> Result<ExperimentConfig> {
    let mut cfg = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        cfg.train.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        cfg.train.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        cfg.train.lr = lr;
    }
    if let Some(p) = args.dropout {
        cfg.model.dropout = p;
    }
    if let Some(seed) = args.seed {
        cfg.train.seed = seed;
        cfg.init_seed = seed;
    }
    if args.no_shuffle {
        cfg.train.shuffle = false;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn load_data(args: &TrainArgs, cfg: &ExperimentConfig) -> Result<(Dataset, Dataset)> {
    let (train, test) = match &args.data_dir {
        Some(dir) => (
            idx::load_split(dir, Split::Train)?,
            idx::load_split(dir, Split::Test)?,
        ),
        None => synthetic::train_test(
            &SyntheticConfig {
                samples: 2048,
                input_dim: cfg.model.input_dim,
                num_classes: cfg.model.num_classes,
                spread: 0.9,
                seed: cfg.train.seed,
            },
            512,
        )?,
    };
    if train.input_dim() != cfg.model.input_dim || train.num_classes() != cfg.model.num_classes {
        return Err(Error::InvalidConfig(format!(
            "data has input_dim {} and {} classes, model expects {} and {}",
            train.input_dim(),
            train.num_classes(),
            cfg.model.input_dim,
            cfg.model.num_classes
        )));
    }
    Ok((train, test))
}

fn label_names(num_classes: usize) -> Vec<String> {
    if num_classes == FASHION_MNIST_LABELS.len() {
        FASHION_MNIST_LABELS.iter().map(|s| s.to_string()).collect()
    } else {
        (0..num_classes).map(|c| format!("class {c}")).collect()
    }
}

/// Row length for square images, otherwise a single row.
fn image_width(len: usize) -> usize {
    let side = (len as f64).sqrt().round() as usize;
    if side * side == len { side } else { len }
}
