use std::collections::BTreeMap;
use std::sync::Arc;

use trackdb_core::AppConfig;

use crate::adapter::{CarrierAdapter, ClientSettings};
use crate::error::CarrierError;
use crate::purolator::PurolatorClient;
use crate::ups::UpsClient;

/// Maps carrier ids to adapters.
///
/// Built once at startup and then shared behind an `Arc`; lookups take `&self`
/// so concurrent resolution needs no locking.
#[derive(Clone, Default)]
pub struct CarrierRegistry {
    adapters: BTreeMap<String, Arc<dyn CarrierAdapter>>,
}

impl std::fmt::Debug for CarrierRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierRegistry")
            .field("supported", &self.list_supported())
            .finish()
    }
}

impl CarrierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every carrier whose credentials are present in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError`] if a carrier client cannot be constructed.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, CarrierError> {
        let settings = ClientSettings::from_app_config(config);
        let mut registry = Self::new();

        if let Some(credentials) = &config.purolator {
            let client = PurolatorClient::new(credentials.clone(), &settings)?;
            registry.register(crate::PUROLATOR, Arc::new(client));
        }
        if let Some(credentials) = &config.ups {
            let client = UpsClient::new(credentials.clone(), &settings)?;
            registry.register(crate::UPS, Arc::new(client));
        }

        if registry.adapters.is_empty() {
            tracing::warn!(
                "no carrier credentials configured; every carrier lookup will be rejected"
            );
        } else {
            tracing::info!(carriers = ?registry.list_supported(), "carrier registry ready");
        }
        Ok(registry)
    }

    /// Registers `adapter` under `carrier_id`, replacing any earlier entry.
    pub fn register(&mut self, carrier_id: impl Into<String>, adapter: Arc<dyn CarrierAdapter>) {
        let id = normalize_id(&carrier_id.into());
        if self.adapters.insert(id.clone(), adapter).is_some() {
            tracing::warn!(carrier = %id, "carrier adapter re-registered");
        }
    }

    /// Returns the adapter registered for `carrier_id`.
    ///
    /// # Errors
    ///
    /// Returns [`CarrierError::NotSupported`] naming the requested id and the
    /// supported set when nothing is registered under `carrier_id`.
    pub fn resolve(&self, carrier_id: &str) -> Result<Arc<dyn CarrierAdapter>, CarrierError> {
        self.adapters
            .get(&normalize_id(carrier_id))
            .cloned()
            .ok_or_else(|| CarrierError::NotSupported {
                requested: carrier_id.to_string(),
                supported: self.list_supported(),
            })
    }

    /// Registered carrier ids in sorted order.
    #[must_use]
    pub fn list_supported(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_supported(&self, carrier_id: &str) -> bool {
        self.adapters.contains_key(&normalize_id(carrier_id))
    }
}

/// Carrier ids are matched case-insensitively.
#[must_use]
pub fn normalize_id(carrier_id: &str) -> String {
    carrier_id.trim().to_ascii_lowercase()
}
