//! Data access component (DAC) location
//!
//! Each runtime flavor gets a [`DacStrategy`] that turns a [`ClrInfo`] into a
//! path the backend can load. The default strategy tries, in order:
//!
//! 1. the location declared by the runtime itself
//! 2. the packaged default file name, looked up in the search directories
//! 3. the bare packaged file name, left for the backend to resolve

use log::debug;
use std::collections::HashMap;
use std::path::PathBuf;

use super::{ClrInfo, RuntimeFlavor};
use crate::domain::DacResolutionError;

/// Resolves the data access component for one runtime flavor.
pub trait DacStrategy: Send + Sync {
    /// # Errors
    /// Returns an error if no candidate location exists at all.
    fn locate(&self, info: &ClrInfo) -> Result<PathBuf, DacResolutionError>;
}

/// Declared location first, then the packaged default file name.
#[derive(Debug, Clone)]
pub struct DeclaredThenDefault {
    packaged_default: &'static str,
    search_dirs: Vec<PathBuf>,
}

impl DeclaredThenDefault {
    #[must_use]
    pub fn new(packaged_default: &'static str, search_dirs: Vec<PathBuf>) -> Self {
        Self { packaged_default, search_dirs }
    }

    fn default_file_name<'a>(&'a self, info: &'a ClrInfo) -> &'a str {
        if info.dac.file_name.is_empty() {
            self.packaged_default
        } else {
            &info.dac.file_name
        }
    }
}

impl DacStrategy for DeclaredThenDefault {
    fn locate(&self, info: &ClrInfo) -> Result<PathBuf, DacResolutionError> {
        if let Some(declared) = info.try_get_dac_location() {
            debug!("Using declared DAC location {}", declared.display());
            return Ok(declared.to_path_buf());
        }

        let file_name = self.default_file_name(info);
        if file_name.is_empty() {
            return Err(DacResolutionError::NoLocation { version: info.to_string() });
        }

        for dir in &self.search_dirs {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                debug!("Found packaged DAC at {}", candidate.display());
                return Ok(candidate);
            }
        }

        debug!("No DAC found in search directories, falling back to {file_name}");
        Ok(PathBuf::from(file_name))
    }
}

/// Strategy lookup keyed by runtime flavor.
#[derive(Default)]
pub struct DacRegistry {
    strategies: HashMap<RuntimeFlavor, Box<dyn DacStrategy>>,
}

impl DacRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`DeclaredThenDefault`] for every known flavor.
    #[must_use]
    pub fn with_search_dirs(search_dirs: &[PathBuf]) -> Self {
        let mut registry = Self::new();
        for flavor in [RuntimeFlavor::Desktop, RuntimeFlavor::Core] {
            registry.register(
                flavor,
                Box::new(DeclaredThenDefault::new(flavor.dac_file_name(), search_dirs.to_vec())),
            );
        }
        registry
    }

    pub fn register(&mut self, flavor: RuntimeFlavor, strategy: Box<dyn DacStrategy>) {
        self.strategies.insert(flavor, strategy);
    }

    /// Locate the data access component for `info`.
    ///
    /// # Errors
    /// Returns [`DacResolutionError::Unsupported`] if no strategy is
    /// registered for the flavor, or the strategy's own error.
    pub fn locate(&self, info: &ClrInfo) -> Result<PathBuf, DacResolutionError> {
        let strategy = self
            .strategies
            .get(&info.flavor)
            .ok_or_else(|| DacResolutionError::Unsupported(info.to_string()))?;
        strategy.locate(info)
    }
}
