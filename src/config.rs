//! Application configuration management.
//!
//! Settings are layered with figment, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `config.toml` (the `--config` path, else the platform config dir)
//! 3. `CTXBUILD_*` environment variables
//! 4. command-line flags (applied by [`crate::run_app`])
//!
//! ```toml
//! format = "cabinet"
//! overwrite = false
//! output_dir = "/media/recovered"
//! max_entry_size = 268435456
//! implicit_descriptors = true
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::container::ContainerFormat;

/// Prefix for environment overrides, e.g. `CTXBUILD_FORMAT=cabinet`.
pub const ENV_PREFIX: &str = "CTXBUILD_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Container layout to write.
    pub format: ContainerFormat,
    /// Replace existing `.ctx` files.
    pub overwrite: bool,
    /// Where to write containers when no output is given on the command line.
    pub output_dir: Option<PathBuf>,
    /// Largest payload file accepted, in bytes.
    pub max_entry_size: Option<u64>,
    /// Read device `Info.xml` documents by naming convention.
    pub implicit_descriptors: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: ContainerFormat::Packed,
            overwrite: false,
            output_dir: None,
            max_entry_size: None,
            implicit_descriptors: false,
        }
    }
}

impl Config {
    /// Load the configuration, falling back to defaults on any error.
    ///
    /// `path` overrides the platform-specific config file location.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        match Self::figment(path.as_deref()).extract() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring invalid configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Load strictly from one file plus the environment.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        Ok(Self::figment(Some(path)).extract()?)
    }

    /// The layered provider stack, without CLI overrides.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            log::debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Platform-specific configuration file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "cybertracker", "ctxbuild")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
