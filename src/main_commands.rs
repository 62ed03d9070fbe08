use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ddpg_trader::config::AppConfig;
use ddpg_trader::rl::environment::{HistoricalSeries, MarketDataSource};
use ddpg_trader::rl::training::{load_checkpoint, Checkpointer, FINAL_MODEL};
use ddpg_trader::rl::TradingSystem;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

/// Command-line overrides for `train`
pub(crate) struct TrainOverrides {
    pub data: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub steps_per_epoch: Option<usize>,
    pub checkpoint_dir: Option<PathBuf>,
    pub resume: Option<PathBuf>,
    pub seed: Option<u64>,
}

fn make_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

async fn load_series(config: &AppConfig) -> anyhow::Result<HistoricalSeries> {
    HistoricalSeries::load(&config.data.path, config.data.lookback, config.data.data_points)
        .await
        .with_context(|| format!("failed to load price data from {:?}", config.data.path))
}

fn check_config(config: &AppConfig) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(|errors| anyhow::anyhow!("invalid configuration: {}", errors.join("; ")))
}

pub(crate) async fn run_train(mut config: AppConfig, overrides: TrainOverrides) -> anyhow::Result<()> {
    if let Some(path) = overrides.data {
        config.data.path = path;
    }
    if let Some(epochs) = overrides.epochs {
        config.rl.training.epochs = epochs;
    }
    if let Some(steps) = overrides.steps_per_epoch {
        config.rl.training.steps_per_epoch = steps;
    }
    if let Some(dir) = overrides.checkpoint_dir {
        config.rl.training.checkpoint_dir = dir.to_string_lossy().into_owned();
    }
    if overrides.seed.is_some() {
        config.rl.training.seed = overrides.seed;
    }
    check_config(&config)?;

    let series = load_series(&config).await?;
    let training = config.rl.training.clone();
    let rng = make_rng(training.seed);
    let checkpointer = Checkpointer::new(&training.checkpoint_dir, training.max_checkpoints);

    let system = match &overrides.resume {
        Some(path) => {
            let checkpoint = load_checkpoint(path)
                .with_context(|| format!("failed to load checkpoint {:?}", path))?;
            TradingSystem::from_checkpoint(config.rl.clone(), checkpoint, rng)?
        }
        None => TradingSystem::new(config.rl.clone(), rng)?,
    };
    let mut system = system.with_checkpointer(checkpointer);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║           DDPG Trader - Training                             ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Bars:           {:>10}                                    ║", series.len());
    println!("║  Lookback:       {:>10}                                    ║", series.lookback());
    println!("║  Epochs:         {:>10}                                    ║", training.epochs);
    println!("║  Steps/Epoch:    {:>10}                                    ║", training.steps_per_epoch);
    println!("║  Batch Size:     {:>10}                                    ║", config.rl.replay.batch_size);
    println!("║  Tau:            {:>10.4}                                    ║", config.rl.ddpg.tau);
    println!("║  Resumed:        {:>10}                                    ║", overrides.resume.is_some());
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let summary = system.train(&series)?;
    system.save_checkpoint(FINAL_MODEL)?;

    let summary_path = Path::new(&training.checkpoint_dir).join("training_summary.json");
    std::fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .with_context(|| format!("failed to write {:?}", summary_path))?;
    info!(path = ?summary_path, "Wrote training summary");

    println!("\n=== Training Complete ===");
    println!("Epochs run:       {}", summary.epochs_run);
    println!("Final phase:      {:?}", summary.final_phase);
    match summary.best_validation_reward {
        Some(best) => println!("Best validation:  {:.4}", best),
        None => println!("Best validation:  n/a"),
    }
    println!(
        "Duration:         {}s",
        (summary.finished_at - summary.started_at).num_seconds()
    );

    Ok(())
}

pub(crate) async fn run_evaluate(
    mut config: AppConfig,
    model: &Path,
    data: Option<PathBuf>,
    range: Range<usize>,
    steps: usize,
    seed: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(path) = data {
        config.data.path = path;
    }
    check_config(&config)?;

    let checkpoint =
        load_checkpoint(model).with_context(|| format!("failed to load checkpoint {:?}", model))?;
    let series = load_series(&config).await?;
    let mut system = TradingSystem::from_checkpoint(config.rl.clone(), checkpoint, make_rng(seed))?;

    for decision in system.decisions(&series, range)? {
        let action = decision.action;
        println!(
            "[{:>5}] Trading Decision: Position/Dir[{:.2}] SL[{:.4}] TP[{:.4}]",
            decision.index, action.position_size, action.stop_loss, action.take_profit
        );
        println!("        price change: {:.6}", decision.price_change);
    }

    let validation = system.validate(&series, steps)?;
    println!("\nMean validation reward over {} rollouts: {:.4}", steps, validation);

    Ok(())
}

pub(crate) fn run_info(model: &Path) -> anyhow::Result<()> {
    let checkpoint =
        load_checkpoint(model).with_context(|| format!("failed to load checkpoint {:?}", model))?;

    println!("=== Checkpoint {:?} ===", model);
    println!(
        "Encoder:  input {} -> hidden {}",
        checkpoint.lstm.input_size, checkpoint.lstm.hidden_size
    );
    println!(
        "Learner:  state {} -> action {}",
        checkpoint.ddpg.state_size, checkpoint.ddpg.action_size
    );
    for (name, layer) in checkpoint.ddpg.actor_weights.layers() {
        println!("  actor.{:<12} {}x{}", name, layer.rows(), layer.cols());
    }
    for (name, layer) in checkpoint.ddpg.critic_weights.layers() {
        println!("  critic.{:<11} {}x{}", name, layer.rows(), layer.cols());
    }

    Ok(())
}
