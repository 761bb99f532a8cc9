//! Provider registry.
//!
//! Providers are registered by name. Zones select a provider by name through their
//! settings (`backup.framework.enabled` / `backup.framework.provider.plugin`).
//! The whole state sits behind an `ArcSwap`: resolves are lock-free, and every
//! update publishes a new snapshot, so readers never observe a partial update.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::provider::BackupProvider;

/// Registry errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no backup provider configured for {0}")]
    NoProviderConfigured(String),

    #[error("zone must be specified, {0} backup providers are configured")]
    AmbiguousZone(usize),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Per-zone backup framework settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSettings {
    /// Whether the backup framework is enabled in this zone.
    #[serde(default)]
    pub enabled: bool,
    /// Name of the provider serving this zone.
    #[serde(default)]
    pub provider: String,
}

impl ZoneSettings {
    pub fn enabled(provider: &str) -> Self {
        Self {
            enabled: true,
            provider: provider.to_string(),
        }
    }

    fn active_provider(&self) -> Option<&str> {
        (self.enabled && !self.provider.is_empty()).then_some(self.provider.as_str())
    }
}

#[derive(Default, Clone)]
struct RegistryState {
    providers: HashMap<String, Arc<dyn BackupProvider>>,
    zones: BTreeMap<String, ZoneSettings>,
}

impl RegistryState {
    /// Distinct registered providers bound to at least one enabled zone.
    fn active_providers(&self) -> Vec<&Arc<dyn BackupProvider>> {
        let mut names: Vec<&str> = self
            .zones
            .values()
            .filter_map(ZoneSettings::active_provider)
            .filter(|name| self.providers.contains_key(*name))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
            .into_iter()
            .filter_map(|name| self.providers.get(name))
            .collect()
    }
}

/// Resolves the active backup provider for a zone.
pub struct ProviderRegistry {
    state: ArcSwap<RegistryState>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(RegistryState::default()),
        }
    }

    /// Register a provider under its name, replacing any provider with the same name.
    pub fn register(&self, provider: Arc<dyn BackupProvider>) {
        let name = provider.name().to_string();
        self.state.rcu(|current| {
            let mut next = RegistryState::clone(current);
            next.providers.insert(name.clone(), Arc::clone(&provider));
            next
        });
        info!(provider = %name, "Registered backup provider");
    }

    /// Replace all zone settings at once.
    pub fn reload_zones(&self, zones: BTreeMap<String, ZoneSettings>) {
        let count = zones.len();
        self.state.rcu(|current| RegistryState {
            providers: current.providers.clone(),
            zones: zones.clone(),
        });
        info!(zones = count, "Reloaded backup zone settings");
    }

    /// Replace providers and zone settings at once.
    pub fn replace(
        &self,
        providers: Vec<Arc<dyn BackupProvider>>,
        zones: BTreeMap<String, ZoneSettings>,
    ) {
        let providers = providers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();
        let next = RegistryState { providers, zones };
        self.state.store(Arc::new(next));
        info!("Replaced backup provider registry");
    }

    /// Resolve the provider for `zone_id`.
    ///
    /// Without a zone, resolves to the only active provider if there is exactly one.
    pub fn resolve(&self, zone_id: Option<&str>) -> Result<Arc<dyn BackupProvider>> {
        let state = self.state.load();

        let Some(zone_id) = zone_id else {
            let active = state.active_providers();
            return match active.as_slice() {
                [provider] => Ok(Arc::clone(provider)),
                [] => Err(RegistryError::NoProviderConfigured("any zone".to_string())),
                many => Err(RegistryError::AmbiguousZone(many.len())),
            };
        };

        let provider = state
            .zones
            .get(zone_id)
            .and_then(ZoneSettings::active_provider)
            .and_then(|name| state.providers.get(name))
            .ok_or_else(|| RegistryError::NoProviderConfigured(format!("zone {}", zone_id)))?;

        debug!(zone = %zone_id, provider = %provider.name(), "Resolved backup provider");
        Ok(Arc::clone(provider))
    }

    /// Registered providers, sorted by name.
    pub fn providers(&self) -> Vec<Arc<dyn BackupProvider>> {
        let state = self.state.load();
        let mut providers: Vec<_> = state.providers.values().cloned().collect();
        providers.sort_by(|a, b| a.name().cmp(b.name()));
        providers
    }

    /// Current zone settings.
    pub fn zones(&self) -> BTreeMap<String, ZoneSettings> {
        self.state.load().zones.clone()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
