// Local registry snapshot - serialized catalog copy with staleness check

use crate::error::RegistryError;
use crate::registry::{PluginMetadata, RegistryClient};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How old a snapshot may be before a refetch is attempted.
const MAX_SNAPSHOT_AGE_HOURS: i64 = 24;

/// A point-in-time copy of the registry catalog, kept on disk so that
/// downloads work without a registry round trip per plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// When this snapshot was fetched (RFC 3339)
    pub fetched_at: DateTime<Utc>,

    /// Catalog entries keyed by plugin name
    pub plugins: HashMap<String, PluginMetadata>,
}

impl RegistrySnapshot {
    pub fn new(plugins: Vec<PluginMetadata>) -> Self {
        Self {
            fetched_at: Utc::now(),
            plugins: plugins
                .into_iter()
                .map(|plugin| (plugin.name.clone(), plugin))
                .collect(),
        }
    }

    /// Look up one plugin's catalog entry.
    pub fn get(&self, name: &str) -> Option<&PluginMetadata> {
        self.plugins.get(name)
    }

    /// Whether the snapshot is older than the staleness window.
    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > ChronoDuration::hours(MAX_SNAPSHOT_AGE_HOURS)
    }

    /// Read a snapshot file.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Write the snapshot file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, contents)
    }

    /// Load the cached snapshot, refetching from the registry when the
    /// copy is missing or stale. A failed refetch falls back to the
    /// stale copy rather than blocking setup.
    pub async fn load_or_refresh(
        path: &Path,
        client: &RegistryClient,
        os: &str,
        distribution: &str,
        cancel: &CancellationToken,
    ) -> Result<Self, RegistryError> {
        let cached = match Self::load(path) {
            Ok(snapshot) => Some(snapshot),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "discarding unreadable snapshot");
                None
            }
        };

        if let Some(snapshot) = &cached {
            if !snapshot.is_stale() {
                debug!(path = %path.display(), "registry snapshot is fresh");
                return Ok(snapshot.clone());
            }
        }

        match client.available_plugins(os, distribution, cancel).await {
            Ok(plugins) => {
                let snapshot = Self::new(plugins);
                if let Err(e) = snapshot.save(path) {
                    warn!(path = %path.display(), error = %e, "failed to persist snapshot");
                }
                Ok(snapshot)
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(
                        error = %e,
                        fetched_at = %stale.fetched_at,
                        "registry refresh failed, using stale snapshot"
                    );
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }
}
