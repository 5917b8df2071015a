// Platform detection collaborator

use std::path::Path;

/// What the detector learned about the running machine.
#[derive(Debug, Clone, Default)]
pub struct DetectedPlatform {
    /// Operating system (e.g. "linux", "darwin")
    pub os: String,

    /// CPU architecture in registry spelling (e.g. "amd64", "arm64")
    pub arch: String,

    /// Distribution identifier (e.g. "ubuntu", "fedora"); empty when
    /// the OS has no distribution concept
    pub distribution: String,

    /// Detected desktop environment, if any (e.g. "gnome")
    pub desktop: Option<String>,

    /// Plugins the detector itself considers required, used when no
    /// static configuration covers the platform
    pub fallback_required: Vec<String>,
}

impl DetectedPlatform {
    /// Registry platform key, `os-arch`.
    pub fn platform_key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

/// Detection seam; the engine never probes the machine directly.
pub trait PlatformDetector: Send + Sync {
    fn detect(&self) -> DetectedPlatform;
}

/// Detector backed by the host: compile-time os/arch constants,
/// `/etc/os-release` for the distribution, `XDG_CURRENT_DESKTOP` for
/// the desktop environment.
#[derive(Debug, Default)]
pub struct HostPlatform;

impl PlatformDetector for HostPlatform {
    fn detect(&self) -> DetectedPlatform {
        DetectedPlatform {
            os: normalize_os(std::env::consts::OS),
            arch: normalize_arch(std::env::consts::ARCH),
            distribution: read_distribution(Path::new("/etc/os-release")),
            desktop: read_desktop(),
            fallback_required: Vec::new(),
        }
    }
}

/// Map Rust's os name onto the registry's spelling.
fn normalize_os(os: &str) -> String {
    match os {
        "macos" => "darwin".to_string(),
        other => other.to_string(),
    }
}

/// Map Rust's arch name onto the registry's spelling.
fn normalize_arch(arch: &str) -> String {
    match arch {
        "x86_64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" => "386".to_string(),
        other => other.to_string(),
    }
}

/// Pull the `ID=` field out of an os-release file.
fn read_distribution(path: &Path) -> String {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return String::new();
    };
    parse_os_release_id(&contents)
}

fn parse_os_release_id(contents: &str) -> String {
    for line in contents.lines() {
        if let Some(value) = line.strip_prefix("ID=") {
            return value.trim().trim_matches('"').to_ascii_lowercase();
        }
    }
    String::new()
}

fn read_desktop() -> Option<String> {
    let raw = std::env::var("XDG_CURRENT_DESKTOP").ok()?;
    // Values like "ubuntu:GNOME" list components; the last one names
    // the actual environment.
    let name = raw.split(':').next_back()?.trim().to_ascii_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
