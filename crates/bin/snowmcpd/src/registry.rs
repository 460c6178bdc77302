use std::sync::Arc;

use snowmcp_core::services::{
    BuildSessionFn,
    RegistryError,
    SessionHandle,
    SessionRegistry,
    SessionRegistryConfig,
};
use snowmcp_core::warehouse::WarehouseClient;
use snowmcp_store::ErrorLogStore;

use crate::config::Config;

pub fn build_registry(config: &Config, error_log: ErrorLogStore) -> SessionRegistry {
    let profiles = config.profiles.clone();
    let options = config.client_options.clone();
    let build: BuildSessionFn = Arc::new(move |profile: String| {
        let profiles = profiles.clone();
        let options = options.clone();
        let error_log = error_log.clone();
        Box::pin(async move {
            let Some(connection) = profiles.get(&profile) else {
                return Err(RegistryError::UnknownProfile(profile));
            };
            let client = WarehouseClient::connect(connection.clone(), options)
                .await
                .map_err(|err| RegistryError::BuildFailed(err.to_string()))?;
            Ok(Arc::new(SessionHandle::new(Arc::new(client), Some(error_log))))
        })
    });

    let mut registry_config = SessionRegistryConfig::new(build)
        .with_sweep_interval(config.sweep_interval);
    if let Some(ttl) = config.registry_ttl {
        registry_config = registry_config.with_ttl(ttl);
    }
    if let Some(window) = config.revalidate_after {
        registry_config = registry_config.with_revalidate_after(window);
    }
    if let Some(max_entries) = config.max_entries {
        registry_config = registry_config.with_max_entries(max_entries);
    }

    SessionRegistry::new(registry_config)
}
