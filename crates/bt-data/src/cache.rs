//! File-backed cache for expensive tuning artifacts.
//!
//! An artifact that exists on disk is trusted as-is: nothing ties it to the
//! dataset, the search bounds or the code that produced it. Delete the file
//! to force recomputation.

use std::path::{Path, PathBuf};

use bt_types::{validation_error, BtResult, TuneError};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Key of the persisted optimization search result.
pub const SEARCH_RESULT_KEY: &str = "search_result";
/// Key of the persisted final cross-validation result.
pub const FINAL_CV_KEY: &str = "final_cv";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope<T> {
    key: String,
    created_at: DateTime<Utc>,
    payload: T,
}

/// Whether `get_or_compute` served the value from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Computed,
}

#[derive(Debug)]
pub struct ResultCache {
    dir: PathBuf,
    stats: RwLock<CacheStats>,
}

impl ResultCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> BtResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> BtResult<PathBuf> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('.') {
            return Err(validation_error!("invalid cache key '{}'", key));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn load_if_present<T: DeserializeOwned>(&self, key: &str) -> BtResult<Option<T>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            self.stats.write().misses += 1;
            return Ok(None);
        }

        let raw = std::fs::read(&path)?;
        let envelope: CacheEnvelope<T> =
            serde_json::from_slice(&raw).map_err(|e| TuneError::CacheCorrupt {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        if envelope.key != key {
            return Err(TuneError::CacheCorrupt {
                key: key.to_string(),
                message: format!("file holds artifact '{}'", envelope.key),
            }
            .into());
        }

        tracing::warn!(
            "Reusing cached artifact '{}' from {} without staleness check",
            key,
            envelope.created_at.to_rfc3339()
        );
        self.stats.write().hits += 1;
        Ok(Some(envelope.payload))
    }

    pub fn store<T: Serialize>(&self, key: &str, artifact: &T) -> BtResult<()> {
        let path = self.path_for(key)?;
        let envelope = CacheEnvelope {
            key: key.to_string(),
            created_at: Utc::now(),
            payload: artifact,
        };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;

        tracing::info!("Stored artifact '{}' at {}", key, path.display());
        self.stats.write().stores += 1;
        Ok(())
    }

    /// Load `key` if cached; otherwise run `compute` and store its output.
    /// A corrupt artifact is an error, not a trigger to recompute.
    pub fn get_or_compute<T, F>(&self, key: &str, compute: F) -> BtResult<(T, CacheOutcome)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> BtResult<T>,
    {
        if let Some(cached) = self.load_if_present(key)? {
            return Ok((cached, CacheOutcome::Hit));
        }

        let value = compute()?;
        self.store(key, &value)?;
        Ok((value, CacheOutcome::Computed))
    }

    pub fn remove(&self, key: &str) -> BtResult<bool> {
        let path = self.path_for(key)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn get_stats(&self) -> CacheStats {
        self.stats.read().clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
