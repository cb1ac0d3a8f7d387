use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential position ID, unique within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Deterministic configuration ID (hash of the engine configuration)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigId(pub String);

impl ConfigId {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }

    /// Short prefix used in directory names.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic dataset hash (content hash of the annotated candle stream)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn from_hash(hash: &str) -> Self {
        Self(hash.to_string())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic run ID (config + dataset)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId {
    pub config_id: ConfigId,
    pub dataset_hash: DatasetHash,
}

impl RunId {
    pub fn new(config_id: ConfigId, dataset_hash: DatasetHash) -> Self {
        Self {
            config_id,
            dataset_hash,
        }
    }

    /// BLAKE3 over the canonical JSON of both halves.
    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "config_id": &self.config_id.0,
            "dataset_hash": &self.dataset_hash.0,
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.config_id, self.dataset_hash)
    }
}
