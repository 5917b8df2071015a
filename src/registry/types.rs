// Registry API types - remote plugin catalog structures

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity and distribution info for one plugin, as described by the
/// remote catalog. The client only ever holds read-only copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginMetadata {
    /// Plugin name (unique key, e.g. "package-manager-apt")
    pub name: String,

    /// Semantic version string
    pub version: String,

    /// Human-readable description
    pub description: String,

    /// Plugin author
    #[serde(default)]
    pub author: String,

    /// Repository URL
    #[serde(default)]
    pub repository: String,

    /// Per-platform binaries, keyed by `os-arch` (e.g. "linux-amd64")
    #[serde(default)]
    pub binaries: HashMap<String, PlatformBinary>,

    /// Names of plugins this plugin depends on
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Free-text tags used for search
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PluginMetadata {
    /// Binary record for a platform key, if the registry lists one.
    pub fn binary_for(&self, platform_key: &str) -> Option<&PlatformBinary> {
        self.binaries.get(platform_key)
    }
}

/// Download coordinates for one platform build of a plugin.
///
/// A zero value in any field means the binary has not been built for
/// that platform and must be treated as unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformBinary {
    /// Download URL
    pub url: String,

    /// Hex-encoded SHA-256 checksum
    pub sha256: String,

    /// Size in bytes
    pub size: u64,
}

impl PlatformBinary {
    /// A binary is usable only if all three fields are populated.
    pub fn is_usable(&self) -> bool {
        !self.url.is_empty() && !self.sha256.is_empty() && self.size > 0
    }
}

/// Catalog-wide registry info, cached with a longer TTL than plugin
/// entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryMetadata {
    /// Catalog schema version
    pub version: String,

    /// When the catalog was last updated (RFC 3339)
    pub updated_at: String,

    /// Total number of plugins in the catalog
    pub plugin_count: u64,

    /// Platform keys the registry carries binaries for
    #[serde(default)]
    pub platforms: Vec<String>,

    /// Plugin counts per category
    #[serde(default)]
    pub categories: HashMap<String, u64>,
}

/// Filter set for the extended catalog query endpoint.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub os: String,
    pub distribution: String,
    pub desktop: Option<String>,
    pub plugin_type: Option<String>,
    pub category: Option<String>,
    pub include_beta: bool,
}

impl QueryFilters {
    /// Stable cache key for this filter combination.
    pub(crate) fn cache_key(&self) -> String {
        format!(
            "query:{}:{}:{}:{}:{}:{}",
            self.os,
            self.distribution,
            self.desktop.as_deref().unwrap_or(""),
            self.plugin_type.as_deref().unwrap_or(""),
            self.category.as_deref().unwrap_or(""),
            self.include_beta
        )
    }

    /// Query-string form for the registry endpoint.
    pub(crate) fn to_query_string(&self) -> String {
        let mut pairs = vec![
            format!("os={}", urlencoding::encode(&self.os)),
            format!("distribution={}", urlencoding::encode(&self.distribution)),
        ];
        if let Some(desktop) = &self.desktop {
            pairs.push(format!("desktop={}", urlencoding::encode(desktop)));
        }
        if let Some(plugin_type) = &self.plugin_type {
            pairs.push(format!("type={}", urlencoding::encode(plugin_type)));
        }
        if let Some(category) = &self.category {
            pairs.push(format!("category={}", urlencoding::encode(category)));
        }
        if self.include_beta {
            pairs.push("include_beta=true".to_string());
        }
        pairs.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plugin() -> PluginMetadata {
        let mut binaries = HashMap::new();
        binaries.insert(
            "linux-amd64".to_string(),
            PlatformBinary {
                url: "https://plugins.devstrap.dev/tool-git/1.2.0/linux-amd64".to_string(),
                sha256: "ab".repeat(32),
                size: 1024,
            },
        );
        PluginMetadata {
            name: "tool-git".to_string(),
            version: "1.2.0".to_string(),
            description: "Configures git".to_string(),
            author: "devstrap".to_string(),
            repository: "https://github.com/devstrap/plugins".to_string(),
            binaries,
            dependencies: vec!["package-manager-apt".to_string()],
            tags: vec!["git".to_string(), "vcs".to_string()],
        }
    }

    #[test]
    fn plugin_metadata_round_trip() {
        let plugin = sample_plugin();
        let json = serde_json::to_string(&plugin).unwrap();
        let parsed: PluginMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.name, "tool-git");
        assert_eq!(parsed.version, "1.2.0");
        assert_eq!(parsed.dependencies, vec!["package-manager-apt"]);
        assert!(parsed.binary_for("linux-amd64").is_some());
        assert!(parsed.binary_for("darwin-arm64").is_none());
    }

    #[test]
    fn plugin_metadata_tolerates_sparse_json() {
        let parsed: PluginMetadata = serde_json::from_str(
            r#"{"name":"tool-curl","version":"0.1.0","description":"curl"}"#,
        )
        .unwrap();
        assert!(parsed.binaries.is_empty());
        assert!(parsed.dependencies.is_empty());
        assert!(parsed.author.is_empty());
    }

    #[test]
    fn platform_binary_usability() {
        let usable = PlatformBinary {
            url: "https://plugins.devstrap.dev/x".to_string(),
            sha256: "ab".repeat(32),
            size: 10,
        };
        assert!(usable.is_usable());

        assert!(!PlatformBinary::default().is_usable());
        assert!(!PlatformBinary {
            url: String::new(),
            ..usable.clone()
        }
        .is_usable());
        assert!(!PlatformBinary {
            sha256: String::new(),
            ..usable.clone()
        }
        .is_usable());
        assert!(!PlatformBinary { size: 0, ..usable }.is_usable());
    }

    #[test]
    fn query_filters_cache_key_is_stable() {
        let filters = QueryFilters {
            os: "linux".to_string(),
            distribution: "ubuntu".to_string(),
            desktop: Some("gnome".to_string()),
            ..Default::default()
        };
        assert_eq!(filters.cache_key(), filters.clone().cache_key());

        let other = QueryFilters {
            desktop: None,
            ..filters.clone()
        };
        assert_ne!(filters.cache_key(), other.cache_key());
    }

    #[test]
    fn query_filters_query_string() {
        let filters = QueryFilters {
            os: "linux".to_string(),
            distribution: "arch linux".to_string(),
            include_beta: true,
            ..Default::default()
        };
        let qs = filters.to_query_string();
        assert!(qs.contains("os=linux"));
        assert!(qs.contains("distribution=arch%20linux"));
        assert!(qs.contains("include_beta=true"));
        assert!(!qs.contains("desktop="));
    }
}
