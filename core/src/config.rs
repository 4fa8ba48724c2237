use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{IndexError, Result};

/// Knobs of one index build. Every field has a default so a partial JSON file
/// is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Build the stemmed variant (`indexStem/`).
    pub stem: bool,
    /// Documents per segment flush; derived from corpus size when unset.
    pub batch_size: Option<usize>,
    /// Average source file size used when deriving the batch size.
    pub avg_file_bytes: u64,
    /// Divisor applied on top of `corpus_bytes / avg_file_bytes`.
    pub batch_divisor: u64,
    /// Terms whose corpus frequency is below this are dropped at split time.
    pub min_total_tf: u64,
    /// Write buffer of every merge output and bucket file.
    pub merge_buffer_bytes: usize,
    /// Merge pairs run concurrently within one pass.
    pub merge_workers: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            stem: false,
            batch_size: None,
            avg_file_bytes: 512 * 1024,
            batch_divisor: 4,
            min_total_tf: 3,
            merge_buffer_bytes: 1024 * 1024,
            merge_workers: 1,
        }
    }
}

impl BuildConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| IndexError::input(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Documents per flush for a corpus of `corpus_bytes`.
    pub fn effective_batch_size(&self, corpus_bytes: u64) -> usize {
        match self.batch_size {
            Some(n) => n.max(1),
            None => derive_batch_size(corpus_bytes, self.avg_file_bytes, self.batch_divisor),
        }
    }
}

/// `corpus_bytes / avg_file_bytes / divisor`, never less than one document.
pub fn derive_batch_size(corpus_bytes: u64, avg_file_bytes: u64, divisor: u64) -> usize {
    let files = corpus_bytes / avg_file_bytes.max(1);
    (files / divisor.max(1)).max(1) as usize
}

/// Scoring constants of the ranking engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RankParams {
    pub k1: f64,
    pub b: f64,
    pub bm25_weight: f64,
    pub position_weight: f64,
    /// Flat per-position bonus for entity terms.
    pub entity_bonus: f64,
    /// Multiplier slope per adjacent matched position pair.
    pub adjacency_bonus: f64,
    pub top_k: usize,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            bm25_weight: 0.3,
            position_weight: 0.7,
            entity_bonus: 1.0,
            adjacency_bonus: 1.5,
            top_k: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(derive_batch_size(0, 1024, 4), 1);
        assert_eq!(derive_batch_size(1024 * 400, 1024, 4), 100);
        let cfg = BuildConfig { batch_size: Some(0), ..BuildConfig::default() };
        assert_eq!(cfg.effective_batch_size(1 << 30), 1);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: BuildConfig = serde_json::from_str(r#"{"stem": true, "min_total_tf": 10}"#).unwrap();
        assert!(cfg.stem);
        assert_eq!(cfg.min_total_tf, 10);
        assert_eq!(cfg.merge_workers, 1);
        assert_eq!(cfg.batch_size, None);
    }
}
