//! Shared process state built once per invocation.

use crate::http_adapter::HttpDestinationAdapter;
use std::sync::Arc;
use std::time::Duration;
use sync_config_and_utils::{Config, Paths};
use sync_core::AdapterRegistry;
use sync_database::AsyncDatabase;
use sync_worker::SyncWorkerConfig;
use tracing::info;
use unified_sync_manager::UnifiedSyncManager;

pub struct DaemonState {
    pub config: Config,
    pub db: AsyncDatabase,
    pub registry: AdapterRegistry,
    pub credential_key: Option<[u8; 32]>,
}

impl DaemonState {
    /// Open the database and register one HTTP adapter per configured
    /// destination endpoint.
    pub async fn init(config: Config, paths: &Paths) -> anyhow::Result<Self> {
        let credential_key = config.credential_key()?;
        let db = AsyncDatabase::open(&config.database_path(paths)).await?;

        let registry = AdapterRegistry::new();
        for endpoint in &config.destinations {
            let adapter = HttpDestinationAdapter::from_endpoint(endpoint)?;
            registry.register(endpoint.name.clone(), Arc::new(adapter));
            info!(destination = %endpoint.name, endpoint = %endpoint.endpoint, "Registered destination");
        }

        Ok(Self {
            config,
            db,
            registry,
            credential_key,
        })
    }

    pub fn worker_config(&self) -> SyncWorkerConfig {
        SyncWorkerConfig {
            poll_interval: Duration::from_millis(self.config.worker.poll_interval_ms),
            batch_size: self.config.worker.batch_size,
            credential_key: self.credential_key,
        }
    }

    pub fn manager(&self) -> UnifiedSyncManager {
        let manager = UnifiedSyncManager::new(self.db.clone(), self.registry.clone());
        match self.credential_key {
            Some(key) => manager.with_credential_key(key),
            None => manager,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_config_and_utils::{DestinationEndpoint, WorkerSettings};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_registers_configured_endpoints() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config {
            worker: WorkerSettings {
                poll_interval_ms: 250,
                batch_size: 4,
            },
            destinations: vec![
                DestinationEndpoint {
                    name: "tasks".to_string(),
                    endpoint: "http://127.0.0.1:9/tasks".to_string(),
                    auth_token: None,
                },
                DestinationEndpoint {
                    name: "notes".to_string(),
                    endpoint: "http://127.0.0.1:9/notes".to_string(),
                    auth_token: Some("tok".to_string()),
                },
            ],
            ..Config::default()
        };

        let state = DaemonState::init(config, &paths).await.unwrap();
        assert_eq!(state.registry.names(), vec!["notes", "tasks"]);
        assert!(paths.database_file().exists());

        let worker = state.worker_config();
        assert_eq!(worker.poll_interval, Duration::from_millis(250));
        assert_eq!(worker.batch_size, 4);
        assert!(worker.credential_key.is_none());
        assert_eq!(state.manager().target_names(), vec!["notes", "tasks"]);
    }

    #[tokio::test]
    async fn test_init_rejects_bad_credential_key() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        let config = Config {
            credential_key: Some("abcd".to_string()),
            ..Config::default()
        };
        assert!(DaemonState::init(config, &paths).await.is_err());
    }
}
