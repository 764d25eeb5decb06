use std::sync::Arc;

use config::shared::RefreshConfig;

use crate::cleanup::DataRefreshCleanupService;
use crate::orchestrator::DataRefreshOrchestrator;
use crate::record::RefreshRecord;
use crate::runner::DataRefreshRunner;
use crate::stage::RefreshStage;
use crate::store::HistoryStore;
use crate::store::memory::MemoryHistoryStore;
use crate::test_utils::fakes::FakeServices;

pub const REFRESH_TIER: &str = "P15";
pub const ACTIVE_TIER: &str = "S4";
pub const DORMANT_TIER: &str = "S0";

pub const DORMANT_DATABASE: &str = "donors-b";

pub const ACTIVE_VERSION: &str = "3.54.0";
pub const LATEST_VERSION: &str = "3.55.0";

pub fn test_refresh_config() -> RefreshConfig {
    RefreshConfig {
        refresh_tier: REFRESH_TIER.to_owned(),
        active_tier: ACTIVE_TIER.to_owned(),
        dormant_tier: DORMANT_TIER.to_owned(),
        heartbeat_interval_ms: RefreshConfig::DEFAULT_HEARTBEAT_INTERVAL_MS,
        stale_heartbeat_timeout_ms: RefreshConfig::DEFAULT_STALE_HEARTBEAT_TIMEOUT_MS,
    }
}

/// The pipeline wired to an in-memory history store and [`FakeServices`].
pub struct TestRefresh {
    pub store: MemoryHistoryStore,
    pub services: FakeServices,
    pub runner: DataRefreshRunner,
    pub orchestrator: DataRefreshOrchestrator,
    pub cleanup: DataRefreshCleanupService,
}

impl TestRefresh {
    /// Creates a pipeline where a newer nomenclature version is available.
    pub fn new() -> Self {
        Self::with_config(test_refresh_config())
    }

    pub fn with_config(config: RefreshConfig) -> Self {
        let store = MemoryHistoryStore::new();
        let services = FakeServices::new(ACTIVE_VERSION, LATEST_VERSION, DORMANT_DATABASE);

        let runner = DataRefreshRunner::new(
            config.clone(),
            Arc::new(store.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
            services.stage_workers(),
            Arc::new(services.clone()),
        );

        let orchestrator = DataRefreshOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
            runner.clone(),
        );

        let cleanup = DataRefreshCleanupService::new(
            config,
            Arc::new(store.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
            Arc::new(services.clone()),
        );

        Self {
            store,
            services,
            runner,
            orchestrator,
            cleanup,
        }
    }
}

impl TestRefresh {
    /// Stores an unfinished record at the latest version with the given stages completed.
    pub async fn seed_in_progress_record(&self, completed_stages: &[RefreshStage]) -> RefreshRecord {
        let mut record = RefreshRecord::new(DORMANT_DATABASE, LATEST_VERSION);
        record.completed_stages = completed_stages.iter().copied().collect();

        self.store.create(record.clone()).await.unwrap();

        record
    }

    /// Returns the most recently requested record.
    ///
    /// # Panics
    ///
    /// Panics if no record exists.
    pub async fn current_record(&self) -> RefreshRecord {
        self.store
            .get_current_record()
            .await
            .unwrap()
            .expect("a refresh record should exist")
    }
}

impl Default for TestRefresh {
    fn default() -> Self {
        Self::new()
    }
}
