use std::path::PathBuf;

use clap::Parser;
use seqtag_trainer::{ConfigOverrides, TrainConfig, run_training};

/// Train the BiLSTM part-of-speech tagger, or evaluate a saved checkpoint.
#[derive(Parser, Debug)]
#[command(name = "train", version, about)]
struct Cli {
    /// JSON config file; flags given here take precedence
    #[arg(long, env = "SEQTAG_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: ConfigOverrides,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = TrainConfig::resolve(cli.config.as_deref(), &cli.overrides).and_then(run_training);

    if let Err(e) = result {
        eprintln!("Training failed: {e:#}");
        std::process::exit(1);
    }
}
