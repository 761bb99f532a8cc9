//! Backup configuration.
//!
//! Loaded from a JSON file: the providers to register and the per-zone framework
//! settings that bind zones to them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::provider::dummy::DUMMY_PROVIDER_NAME;
use crate::provider::{BackupProvider, DummyProvider, HttpProvider};
use crate::registry::{ProviderRegistry, ZoneSettings};

/// A configured provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// In-memory provider. Without `policies`, the default catalogue is used.
    Dummy {
        #[serde(default = "default_dummy_name")]
        name: String,
        #[serde(default)]
        policies: Option<Vec<PolicyConfig>>,
    },
    /// REST provider.
    Http {
        name: String,
        endpoint: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub id: String,
    pub name: String,
}

fn default_dummy_name() -> String {
    DUMMY_PROVIDER_NAME.to_string()
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            ProviderConfig::Dummy { name, .. } | ProviderConfig::Http { name, .. } => name,
        }
    }

    /// Build the provider instance.
    pub fn build(&self) -> Result<Arc<dyn BackupProvider>> {
        if self.name().is_empty() {
            bail!("backup provider name must not be empty");
        }

        let provider: Arc<dyn BackupProvider> = match self {
            ProviderConfig::Dummy {
                name,
                policies: None,
            } if name == DUMMY_PROVIDER_NAME => Arc::new(DummyProvider::new()),
            ProviderConfig::Dummy { name, policies } => Arc::new(DummyProvider::with_policies(
                name,
                policies
                    .iter()
                    .flatten()
                    .map(|p| (p.id.clone(), p.name.clone()))
                    .collect(),
            )),
            ProviderConfig::Http {
                name,
                endpoint,
                description,
                token,
                timeout_secs,
            } => Arc::new(
                HttpProvider::new(
                    name,
                    description.clone(),
                    endpoint,
                    token.clone(),
                    timeout_secs.map(Duration::from_secs),
                )
                .with_context(|| format!("invalid backup provider '{}'", name))?,
            ),
        };
        Ok(provider)
    }
}

/// Backup framework configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Zone id -> settings. Zones not listed have the framework disabled.
    #[serde(default)]
    pub zones: BTreeMap<String, ZoneSettings>,
}

impl BackupConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse backup configuration")
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Build every configured provider.
    pub fn build_providers(&self) -> Result<Vec<Arc<dyn BackupProvider>>> {
        let mut seen = std::collections::HashSet::new();
        self.providers
            .iter()
            .map(|p| {
                if !seen.insert(p.name()) {
                    bail!("backup provider '{}' configured twice", p.name());
                }
                p.build()
            })
            .collect()
    }

    /// Build a registry from this configuration.
    pub fn build_registry(&self) -> Result<ProviderRegistry> {
        let registry = ProviderRegistry::new();
        self.apply(&registry)?;
        Ok(registry)
    }

    /// Swap this configuration into an existing registry in one step.
    pub fn apply(&self, registry: &ProviderRegistry) -> Result<()> {
        let providers = self.build_providers()?;
        registry.replace(providers, self.zones.clone());
        Ok(())
    }
}
