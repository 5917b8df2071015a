// devstrap plugin engine
//
// The bootstrapper delegates real work - installing packages,
// configuring tools, editing shell files - to out-of-process plugins.
// This crate is the machinery around them: discovering what the remote
// registry offers, deciding which plugins apply to this machine,
// fetching and verifying their binaries, and talking to the installed
// ones over the introspection protocol.

pub mod cli;
pub mod download;
pub mod error;
pub mod exec;
pub mod registry;
pub mod select;

pub use download::{Downloader, RegistrySnapshot};
pub use error::{DevstrapError, DownloadError, ExecError, RegistryError, SelectError};
pub use exec::{ExecutableManager, PluginInfo};
pub use registry::{PluginMetadata, RegistryClient, RegistryConfig};
pub use select::{PluginConfig, Selector};
