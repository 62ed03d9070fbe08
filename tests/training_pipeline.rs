use ddpg_trader::rl::environment::{HistoricalSeries, MarketDataSource, OhlcvColumns};
use ddpg_trader::rl::training::{load_checkpoint, Checkpointer, BEST_MODEL, FINAL_MODEL};
use ddpg_trader::rl::{RLConfig, TradingSystem, TrainingPhase};
use ddpg_trader::AppConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;

const LOOKBACK: usize = 6;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ddpg_trader_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn columns(n: usize) -> OhlcvColumns {
    let close: Vec<f64> = (0..n)
        .map(|i| 1.10 + 0.02 * (i as f64 * 0.3).sin() + 0.0001 * i as f64)
        .collect();
    OhlcvColumns {
        open: close.iter().map(|c| c - 0.001).collect(),
        high: close.iter().map(|c| c + 0.004).collect(),
        low: close.iter().map(|c| c - 0.004).collect(),
        volume: (0..n).map(|i| 1000.0 + (i % 7) as f64 * 50.0).collect(),
        close,
    }
}

fn small_config() -> RLConfig {
    let mut config = RLConfig::default();
    config.encoder.hidden_size = 8;
    config.replay.capacity = 64;
    config.replay.batch_size = 8;
    config.training.epochs = 3;
    config.training.steps_per_epoch = 10;
    config.training.validation_steps = 5;
    config.training.bars_predicted = 3;
    config.training.checkpoint_every = 1;
    config
}

#[test]
fn test_series_normalized_and_indexed() {
    let series = HistoricalSeries::from_columns(&columns(150), LOOKBACK, 100).unwrap();
    assert_eq!(series.len(), 100);
    for bar in series.bars() {
        for v in bar.features() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    let state = series.get_state(LOOKBACK - 1).unwrap();
    assert_eq!(state.len(), LOOKBACK);
    assert!(series.get_state(LOOKBACK - 2).is_err());
    assert!(series.forward_path(96, 3).is_ok());
    assert!(series.forward_path(97, 3).is_err());
}

#[test]
fn test_train_save_and_resume() {
    let dir = scratch_dir("pipeline");
    let series = HistoricalSeries::from_columns(&columns(120), LOOKBACK, 120).unwrap();
    let checkpointer = Checkpointer::new(&dir, 2);

    let mut system = TradingSystem::new(small_config(), ChaCha8Rng::seed_from_u64(42))
        .unwrap()
        .with_checkpointer(checkpointer.clone());

    let summary = system.train(&series).unwrap();
    assert_eq!(summary.epochs_run, 3);
    assert_eq!(summary.final_phase, TrainingPhase::Done);
    assert!(summary.epochs.iter().any(|e| e.learn_steps > 0));
    for epoch in &summary.epochs {
        assert!((-1.0..=2.0).contains(&epoch.validation_reward));
        assert!(epoch.buffer_len <= 64);
    }

    // only the newest periodic checkpoints survive
    assert!(checkpointer.exists(BEST_MODEL));
    let epochs: Vec<usize> = checkpointer
        .epoch_checkpoints()
        .into_iter()
        .map(|(epoch, _)| epoch)
        .collect();
    assert_eq!(epochs, vec![2, 3]);

    let path = system.save_checkpoint(FINAL_MODEL).unwrap().unwrap();
    let checkpoint = load_checkpoint(&path).unwrap();
    let mut resumed =
        TradingSystem::from_checkpoint(small_config(), checkpoint, ChaCha8Rng::seed_from_u64(0))
            .unwrap();

    let state = series.get_state(50).unwrap();
    let original = system.predict(&state, false).unwrap();
    let restored = resumed.predict(&state, false).unwrap();
    assert_eq!(original.action, restored.action);
    assert_eq!(original.hidden_state, restored.hidden_state);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_resume_rejects_mismatched_hidden_size() {
    let system = TradingSystem::new(small_config(), ChaCha8Rng::seed_from_u64(1)).unwrap();
    let checkpoint = system.checkpoint();

    let mut config = small_config();
    config.encoder.hidden_size = 16;
    assert!(
        TradingSystem::from_checkpoint(config, checkpoint, ChaCha8Rng::seed_from_u64(1)).is_err()
    );
}

#[test]
fn test_evaluation_decisions_are_deterministic() {
    let series = HistoricalSeries::from_columns(&columns(80), LOOKBACK, 80).unwrap();
    let system = TradingSystem::new(small_config(), ChaCha8Rng::seed_from_u64(9)).unwrap();
    let checkpoint = system.checkpoint();

    let mut a =
        TradingSystem::from_checkpoint(small_config(), checkpoint.clone(), ChaCha8Rng::seed_from_u64(1))
            .unwrap();
    let mut b =
        TradingSystem::from_checkpoint(small_config(), checkpoint, ChaCha8Rng::seed_from_u64(2))
            .unwrap();

    let first = a.decisions(&series, 10..30).unwrap();
    let second = b.decisions(&series, 10..30).unwrap();
    assert_eq!(first.len(), 20);
    for (x, y) in first.iter().zip(&second) {
        assert_eq!(x.action, y.action);
        assert!(x.action.position_size.abs() >= 0.01);
    }
}

#[tokio::test]
async fn test_load_series_from_file() {
    let dir = scratch_dir("load");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bars.json");
    std::fs::write(&path, serde_json::to_string(&columns(60)).unwrap()).unwrap();

    let series = HistoricalSeries::load(&path, LOOKBACK, 50).await.unwrap();
    assert_eq!(series.len(), 50);
    assert_eq!(series.lookback(), LOOKBACK);

    assert!(HistoricalSeries::load(dir.join("missing.json"), LOOKBACK, 50)
        .await
        .is_err());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_shipped_config_loads() {
    let config = AppConfig::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config")).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.rl.encoder.hidden_size, 64);
    assert_eq!(config.rl.training.bars_predicted, 5);
}
