//! Persistence for the consensus configuration.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use keel_types::ConsensusConfig;

use crate::atomic::write_json_atomic;
use crate::error::StoreError;

/// Read-modify-write access to `consensus.json`.
///
/// A missing file reads as the default configuration (threshold 0.5,
/// auto-discovered members). Saving normalizes the document: threshold
/// bounds are enforced and members are de-duplicated and sorted.
pub struct ConsensusStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ConsensusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Load the current configuration.
    pub fn load(&self) -> Result<ConsensusConfig, StoreError> {
        let _guard = self.lock.lock().expect("consensus config lock poisoned");
        self.load_locked()
    }

    /// Normalize, persist, and return the configuration.
    pub fn save(&self, config: ConsensusConfig) -> Result<ConsensusConfig, StoreError> {
        let _guard = self.lock.lock().expect("consensus config lock poisoned");
        let config = normalize(config)?;
        write_json_atomic(&self.path, &config, None)?;
        Ok(config)
    }

    fn load_locked(&self) -> Result<ConsensusConfig, StoreError> {
        match fs::read(&self.path) {
            Ok(data) => normalize(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConsensusConfig::default()),
            Err(e) => Err(e.into()),
        }
    }
}

fn normalize(mut config: ConsensusConfig) -> Result<ConsensusConfig, StoreError> {
    if !config.threshold.is_finite() || !(0.0..1.0).contains(&config.threshold) {
        return Err(StoreError::InvalidThreshold(config.threshold));
    }
    config.members.sort();
    config.members.dedup();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::NodeId;

    #[test]
    fn test_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsensusStore::new(dir.path().join("consensus.json"));
        let cfg = store.load().unwrap();
        assert_eq!(cfg.threshold, 0.5);
        assert!(cfg.members.is_empty());
    }

    #[test]
    fn test_save_normalizes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsensusStore::new(dir.path().join("consensus.json"));

        let a = NodeId::from_public_key(b"a");
        let b = NodeId::from_public_key(b"b");
        let saved = store
            .save(ConsensusConfig {
                threshold: 0.67,
                members: vec![b, a, b],
            })
            .unwrap();
        assert_eq!(saved.members.len(), 2);
        assert!(saved.members.windows(2).all(|w| w[0] < w[1]));

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded, saved);
    }

    #[test]
    fn test_threshold_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConsensusStore::new(dir.path().join("consensus.json"));
        for bad in [-0.1, 1.0, 1.5, f64::NAN] {
            let result = store.save(ConsensusConfig {
                threshold: bad,
                members: vec![],
            });
            assert!(matches!(result, Err(StoreError::InvalidThreshold(_))));
        }
        // 0.0 is allowed: any single yes vote wins.
        assert!(
            store
                .save(ConsensusConfig {
                    threshold: 0.0,
                    members: vec![],
                })
                .is_ok()
        );
    }
}
