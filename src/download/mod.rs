// Plugin binary downloads - streamed, verified, atomically installed

pub mod snapshot;

pub use snapshot::RegistrySnapshot;

use crate::error::DownloadError;
use crate::exec::plugin_file_path;
use crate::registry::{PlatformBinary, PluginMetadata};
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Materializes registry plugins as verified executables on disk.
///
/// One linear streaming copy+hash per plugin; batch downloads run
/// sequentially so per-plugin failure logging stays ordered.
pub struct Downloader {
    plugin_dir: PathBuf,
    platform_key: String,
    http: reqwest::Client,
}

impl Downloader {
    pub fn new(plugin_dir: PathBuf, platform_key: String) -> Self {
        Self {
            plugin_dir,
            platform_key,
            http: reqwest::Client::new(),
        }
    }

    /// Download and install one plugin binary.
    ///
    /// No-op when a binary with the expected checksum is already
    /// installed. A checksum mismatch deletes the partial download and
    /// reports both digests; the final path never holds an unverified
    /// artifact.
    pub async fn download_plugin(
        &self,
        snapshot: &RegistrySnapshot,
        name: &str,
    ) -> Result<(), DownloadError> {
        let metadata = snapshot
            .get(name)
            .ok_or_else(|| DownloadError::UnknownPlugin(name.to_string()))?;

        let binary = metadata.binary_for(&self.platform_key).ok_or_else(|| {
            DownloadError::PlatformUnavailable {
                name: name.to_string(),
                platform: self.platform_key.clone(),
            }
        })?;
        validate_binary_record(name, binary)?;

        let target = plugin_file_path(&self.plugin_dir, name);
        if file_matches_checksum(&target, &binary.sha256)? {
            debug!(plugin = name, "installed binary is current, skipping download");
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.plugin_dir).await?;
        let staging = tempfile::Builder::new()
            .prefix(".devstrap-dl-")
            .tempfile_in(&self.plugin_dir)?
            .into_temp_path();

        let actual = self
            .stream_to_file(name, &binary.url, &staging)
            .await?;

        let expected = binary.sha256.to_lowercase();
        if actual != expected {
            // TempPath removes the staging file on drop.
            return Err(DownloadError::ChecksumMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }

        set_executable(&staging)?;
        staging
            .persist(&target)
            .map_err(|e| DownloadError::Io(e.error))?;

        info!(plugin = name, path = %target.display(), "plugin installed");
        Ok(())
    }

    /// Download a list of plugins, best-effort: individual failures are
    /// logged and the batch continues.
    pub async fn download_required(&self, snapshot: &RegistrySnapshot, names: &[String]) {
        for name in names {
            if let Err(e) = self.download_plugin(snapshot, name).await {
                warn!(plugin = %name, error = %e, "plugin download failed, continuing");
            }
        }
    }

    /// Search the snapshot by name, description, and tags.
    pub fn search_plugins(
        &self,
        snapshot: &RegistrySnapshot,
        query: &str,
    ) -> HashMap<String, PluginMetadata> {
        let needle = query.to_lowercase();
        snapshot
            .plugins
            .iter()
            .filter(|(name, metadata)| {
                name.to_lowercase().contains(&needle)
                    || metadata.description.to_lowercase().contains(&needle)
                    || metadata
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(&needle))
            })
            .map(|(name, metadata)| (name.clone(), metadata.clone()))
            .collect()
    }

    /// Stream the response body to `dest` while hashing it, returning
    /// the hex digest of what was written.
    async fn stream_to_file(
        &self,
        name: &str,
        url: &str,
        dest: &Path,
    ) -> Result<String, DownloadError> {
        let transfer_err = |reason: String| DownloadError::Transfer {
            name: name.to_string(),
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| transfer_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(transfer_err(format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transfer_err(e.to_string()))?;
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(hex::encode(hasher.finalize()))
    }
}

/// Reject binary records the registry has not fully populated. A zero
/// value means "not yet built for this platform", not a retry case.
fn validate_binary_record(name: &str, binary: &PlatformBinary) -> Result<(), DownloadError> {
    if binary.url.is_empty() {
        return Err(DownloadError::MissingUrl(name.to_string()));
    }
    if binary.sha256.is_empty() {
        return Err(DownloadError::MissingChecksum(name.to_string()));
    }
    if binary.size == 0 {
        return Err(DownloadError::ZeroSize(name.to_string()));
    }
    Ok(())
}

/// Whether the file at `path` already has the expected checksum.
///
/// An empty expected checksum is never current: an unverifiable
/// artifact is redownloaded rather than trusted.
fn file_matches_checksum(path: &Path, expected: &str) -> Result<bool, DownloadError> {
    if expected.is_empty() {
        return Ok(false);
    }
    let contents = match std::fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(DownloadError::Io(e)),
    };
    let actual = hex::encode(Sha256::digest(&contents));
    Ok(actual == expected.to_lowercase())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
