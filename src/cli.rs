use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ddpg-trader")]
#[command(version = "0.1.0")]
#[command(about = "Recurrent DDPG learner for stop-loss / take-profit trade sizing", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config", env = "TRADER_CONFIG_DIR")]
    pub config_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train on a historical OHLCV series
    Train {
        /// OHLCV column JSON (overrides data.path)
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Number of epochs (overrides rl.training.epochs)
        #[arg(short, long)]
        epochs: Option<usize>,
        /// Steps per epoch (overrides rl.training.steps_per_epoch)
        #[arg(short, long)]
        steps_per_epoch: Option<usize>,
        /// Checkpoint directory (overrides rl.training.checkpoint_dir)
        #[arg(long)]
        checkpoint_dir: Option<PathBuf>,
        /// Resume from a checkpoint file
        #[arg(long)]
        resume: Option<PathBuf>,
        /// RNG seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Print noise-free decisions of a trained model over a slice of the data
    Evaluate {
        /// Checkpoint file
        #[arg(short, long)]
        model: PathBuf,
        /// OHLCV column JSON (overrides data.path)
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// First bar index
        #[arg(long, default_value = "24")]
        start: usize,
        /// One past the last bar index
        #[arg(long, default_value = "96")]
        end: usize,
        /// Validation rollouts to average
        #[arg(long, default_value = "100")]
        steps: usize,
        /// RNG seed for the validation indices
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show the shapes stored in a checkpoint
    Info {
        /// Checkpoint file
        #[arg(short, long)]
        model: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train() {
        let cli = Cli::parse_from(["ddpg-trader", "train", "--epochs", "5", "--seed", "7"]);
        match cli.command {
            Commands::Train { epochs, seed, .. } => {
                assert_eq!(epochs, Some(5));
                assert_eq!(seed, Some(7));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_evaluate_defaults() {
        let cli = Cli::parse_from(["ddpg-trader", "evaluate", "--model", "m.json"]);
        match cli.command {
            Commands::Evaluate { start, end, .. } => {
                assert_eq!((start, end), (24, 96));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
