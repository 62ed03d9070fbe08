//! Model Checkpointing
//!
//! Save and load encoder and learner weights as JSON documents of the form
//! `{lstm: {...}, ddpg: {stateSize, actionSize, actorWeights, criticWeights}}`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, TraderError};
use crate::rl::algorithms::DdpgSnapshot;
use crate::rl::networks::LstmWeights;

/// Label of the checkpoint written whenever validation improves
pub const BEST_MODEL: &str = "best_model";
/// Label of the checkpoint written at the end of a run
pub const FINAL_MODEL: &str = "final_model";
/// Prefix of periodic checkpoints
pub const EPOCH_PREFIX: &str = "models_epoch_";

/// Persisted model state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCheckpoint {
    pub lstm: LstmWeights,
    pub ddpg: DdpgSnapshot,
}

impl ModelCheckpoint {
    /// Check that every declared size matches the stored matrices
    pub fn validate(&self) -> Result<()> {
        self.lstm.validate()?;
        if self.lstm.hidden_size != self.ddpg.state_size {
            return Err(TraderError::CheckpointShapeMismatch(format!(
                "encoder hidden size {} does not match learner state size {}",
                self.lstm.hidden_size, self.ddpg.state_size
            )));
        }
        self.ddpg
            .actor_weights
            .validate(self.ddpg.state_size, self.ddpg.action_size)?;
        self.ddpg
            .critic_weights
            .validate(self.ddpg.state_size, self.ddpg.action_size)
    }
}

/// Checkpointer for saving and loading models
#[derive(Debug, Clone)]
pub struct Checkpointer {
    /// Directory for checkpoints
    checkpoint_dir: PathBuf,
    /// Maximum periodic checkpoints to keep
    max_checkpoints: usize,
}

impl Checkpointer {
    /// Create a new checkpointer
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P, max_checkpoints: usize) -> Self {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();

        // Create directory if it doesn't exist
        if !checkpoint_dir.exists() {
            if let Err(e) = fs::create_dir_all(&checkpoint_dir) {
                warn!("Failed to create checkpoint directory: {}", e);
            }
        }

        Self {
            checkpoint_dir,
            max_checkpoints,
        }
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    /// Get checkpoint path for a given name
    pub fn checkpoint_path(&self, name: &str) -> PathBuf {
        self.checkpoint_dir.join(format!("{}.json", name))
    }

    /// Save a model under `name`
    pub fn save(&self, checkpoint: &ModelCheckpoint, name: &str) -> Result<PathBuf> {
        let path = self.checkpoint_path(name);
        fs::create_dir_all(&self.checkpoint_dir)?;
        fs::write(&path, serde_json::to_vec(checkpoint)?)?;

        info!("Saved checkpoint to {:?}", path);

        if name.starts_with(EPOCH_PREFIX) {
            self.cleanup_old_checkpoints();
        }

        Ok(path)
    }

    /// Load and validate a model
    pub fn load(&self, name: &str) -> Result<ModelCheckpoint> {
        load_checkpoint(self.checkpoint_path(name))
    }

    /// List available checkpoints
    pub fn list_checkpoints(&self) -> Vec<String> {
        let mut checkpoints = Vec::new();

        if let Ok(entries) = fs::read_dir(&self.checkpoint_dir) {
            for entry in entries.flatten() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Some(stem) = name.strip_suffix(".json") {
                        checkpoints.push(stem.to_string());
                    }
                }
            }
        }

        checkpoints.sort();
        checkpoints
    }

    /// Periodic checkpoints ordered by epoch
    pub fn epoch_checkpoints(&self) -> Vec<(usize, String)> {
        let mut epochs: Vec<(usize, String)> = self
            .list_checkpoints()
            .into_iter()
            .filter_map(|name| {
                let epoch = name.strip_prefix(EPOCH_PREFIX)?.parse().ok()?;
                Some((epoch, name))
            })
            .collect();
        epochs.sort();
        epochs
    }

    /// Get the most recent periodic checkpoint name
    pub fn latest_checkpoint(&self) -> Option<String> {
        self.epoch_checkpoints().pop().map(|(_, name)| name)
    }

    /// Remove the oldest periodic checkpoints beyond max_checkpoints
    fn cleanup_old_checkpoints(&self) {
        let checkpoints = self.epoch_checkpoints();

        if checkpoints.len() <= self.max_checkpoints {
            return;
        }

        let to_remove = checkpoints.len() - self.max_checkpoints;
        for (_, name) in checkpoints.into_iter().take(to_remove) {
            let path = self.checkpoint_path(&name);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old checkpoint {:?}: {}", path, e);
            } else {
                info!("Removed old checkpoint: {}", name);
            }
        }
    }

    /// Check if a checkpoint exists
    pub fn exists(&self, name: &str) -> bool {
        self.checkpoint_path(name).exists()
    }
}

impl Default for Checkpointer {
    fn default() -> Self {
        Self::new("./saved_models", 5)
    }
}

/// Read a checkpoint file from an explicit path and validate its shapes
pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<ModelCheckpoint> {
    let path = path.as_ref();
    let raw = fs::read(path)?;
    let checkpoint: ModelCheckpoint = serde_json::from_slice(&raw)?;
    checkpoint.validate()?;
    info!("Loaded checkpoint from {:?}", path);
    Ok(checkpoint)
}

/// Name of the periodic checkpoint for `epoch` (1-based)
pub fn epoch_name(epoch: usize) -> String {
    format!("{}{}", EPOCH_PREFIX, epoch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::algorithms::DdpgLearner;
    use crate::rl::config::{DdpgConfig, EncoderConfig};
    use crate::rl::networks::LstmEncoder;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::env::temp_dir;

    fn checkpoint(seed: u64) -> ModelCheckpoint {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let config = EncoderConfig {
            hidden_size: 8,
            ..Default::default()
        };
        let encoder = LstmEncoder::new(&config, &mut rng).unwrap();
        let learner = DdpgLearner::new(8, &DdpgConfig::default(), &mut rng).unwrap();
        ModelCheckpoint {
            lstm: encoder.weights().clone(),
            ddpg: learner.snapshot(),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = temp_dir().join(format!("ddpg_trader_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_checkpoint_path() {
        let checkpointer = Checkpointer::new(scratch_dir("path"), 5);
        let path = checkpointer.checkpoint_path("best_model");

        assert!(path.to_string_lossy().ends_with("best_model.json"));
    }

    #[test]
    fn test_epoch_name() {
        assert_eq!(epoch_name(10), "models_epoch_10");
    }

    #[test]
    fn test_save_load_round_trip() {
        let checkpointer = Checkpointer::new(scratch_dir("roundtrip"), 5);
        let ckpt = checkpoint(1);

        checkpointer.save(&ckpt, BEST_MODEL).unwrap();
        assert!(checkpointer.exists(BEST_MODEL));
        assert_eq!(checkpointer.load(BEST_MODEL).unwrap(), ckpt);
    }

    #[test]
    fn test_json_layout() {
        let json = serde_json::to_value(checkpoint(2)).unwrap();
        assert!(json["lstm"].get("Uo").is_some());
        assert_eq!(json["ddpg"]["stateSize"], 8);
        assert_eq!(json["ddpg"]["actionSize"], 3);
        assert!(json["ddpg"]["actorWeights"].get("layer1").is_some());
    }

    #[test]
    fn test_load_rejects_mismatched_sizes() {
        let dir = scratch_dir("mismatch");
        let checkpointer = Checkpointer::new(&dir, 5);
        let mut ckpt = checkpoint(3);
        ckpt.lstm.hidden_size = 16;

        checkpointer.save(&ckpt, "broken").unwrap();
        assert!(matches!(
            checkpointer.load("broken"),
            Err(TraderError::CheckpointShapeMismatch(_))
        ));
    }

    #[test]
    fn test_periodic_checkpoints_pruned_by_epoch() {
        let checkpointer = Checkpointer::new(scratch_dir("prune"), 2);
        let ckpt = checkpoint(4);

        checkpointer.save(&ckpt, BEST_MODEL).unwrap();
        for epoch in [10, 20, 100] {
            checkpointer.save(&ckpt, &epoch_name(epoch)).unwrap();
        }

        let names: Vec<String> = checkpointer
            .epoch_checkpoints()
            .into_iter()
            .map(|(_, n)| n)
            .collect();
        assert_eq!(names, vec!["models_epoch_20", "models_epoch_100"]);
        assert_eq!(checkpointer.latest_checkpoint().as_deref(), Some("models_epoch_100"));
        assert!(checkpointer.exists(BEST_MODEL));
    }
}
