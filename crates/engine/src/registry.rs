//! Process-wide zone registry
//!
//! Zones are created once from configuration and then looked up by name
//! from any thread. A process normally installs one registry at startup
//! with [`ZoneRegistry::install`] and reaches it through
//! [`ZoneRegistry::global`].

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use shmtree_core::{Error, Result};
use tracing::debug;

use crate::config::ShmConfig;
use crate::zone::Zone;

static GLOBAL: OnceCell<ZoneRegistry> = OnceCell::new();

/// Named zones shared across threads
#[derive(Debug, Default)]
pub struct ZoneRegistry {
    zones: RwLock<FxHashMap<String, Arc<Zone>>>,
}

impl ZoneRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create every zone of a validated config
    pub fn from_config(config: &ShmConfig) -> Result<Self> {
        config.validate()?;
        let registry = Self::new();
        for zone in &config.zones {
            registry.register(Zone::from_config(zone)?)?;
        }
        debug!(zones = config.zones.len(), "zone registry built");
        Ok(registry)
    }

    /// Add a zone
    ///
    /// # Errors
    ///
    /// `Config` if a zone with the same name is already registered.
    pub fn register(&self, zone: Zone) -> Result<Arc<Zone>> {
        let mut zones = self.zones.write();
        if zones.contains_key(zone.name()) {
            return Err(Error::Config(format!(
                "zone '{}' is already registered",
                zone.name()
            )));
        }
        let zone = Arc::new(zone);
        zones.insert(zone.name().to_string(), Arc::clone(&zone));
        Ok(zone)
    }

    /// Look up a zone by name
    pub fn get(&self, name: &str) -> Option<Arc<Zone>> {
        self.zones.read().get(name).cloned()
    }

    /// Registered zone names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.zones.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered zones
    pub fn len(&self) -> usize {
        self.zones.read().len()
    }

    /// Whether no zone is registered
    pub fn is_empty(&self) -> bool {
        self.zones.read().is_empty()
    }

    /// Install the process-wide registry
    ///
    /// # Errors
    ///
    /// `Config` if one is already installed.
    pub fn install(registry: ZoneRegistry) -> Result<&'static ZoneRegistry> {
        GLOBAL
            .set(registry)
            .map_err(|_| Error::Config("zone registry is already installed".to_string()))?;
        Self::global().ok_or_else(|| Error::Config("zone registry not installed".to_string()))
    }

    /// The process-wide registry, if installed
    pub fn global() -> Option<&'static ZoneRegistry> {
        GLOBAL.get()
    }
}
