// Registry client - remote plugin catalog integration

pub mod cache;
pub mod client;
pub mod policy;
pub mod types;

pub use client::{RegistryClient, RegistryConfig};
pub use policy::validate_registry_url;
pub use types::{PlatformBinary, PluginMetadata, QueryFilters, RegistryMetadata};

use crate::error::RegistryError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Query seam between the Selector and the registry.
///
/// Implemented by [`RegistryClient`] for production and by in-memory
/// stubs in tests, so selection logic can run without a network.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Plugins the registry considers compatible with the platform.
    async fn compatible_plugins(
        &self,
        os: &str,
        distribution: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PluginMetadata>, RegistryError>;
}

#[async_trait]
impl CatalogSource for RegistryClient {
    async fn compatible_plugins(
        &self,
        os: &str,
        distribution: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PluginMetadata>, RegistryError> {
        self.available_plugins(os, distribution, cancel).await
    }
}
