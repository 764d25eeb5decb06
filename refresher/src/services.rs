//! HTTP client for the data services performing the stage work.
//!
//! Every collaborator of the refresh pipeline is backed by the same service. Stage endpoints are
//! synchronous and only respond once the work is done, hence the long request timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::shared::ServicesConfig;
use refresh::bail;
use refresh::database::{DatabaseSizeController, DonorImportTrigger, DormantDatabaseLocator};
use refresh::error::{ErrorKind, RefreshResult};
use refresh::refresh_error;
use refresh::version::VersionProvider;
use refresh::workers::base::{
    DonorDataWorker, DonorImportWorker, HlaWorker, IndexWorker, MetadataWorker,
    QueuedUpdateWorker, StageWorkers,
};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct DatabaseResponse {
    name: String,
}

#[derive(Debug, Serialize)]
struct ResizeRequest<'a> {
    tier: &'a str,
}

#[derive(Debug, Serialize)]
struct NomenclatureRequest<'a> {
    nomenclature_version: &'a str,
}

#[derive(Debug, Serialize)]
struct ProcessHlaRequest<'a> {
    nomenclature_version: &'a str,
    is_continuation: bool,
}

#[derive(Debug, Clone)]
pub struct DataServicesClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl DataServicesClient {
    pub fn new(config: &ServicesConfig) -> RefreshResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                refresh_error!(
                    ErrorKind::ConfigError,
                    "Data services client could not be created",
                    source: err
                )
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    /// Bundles this client as the stage workers of a runner.
    pub fn stage_workers(&self) -> StageWorkers {
        StageWorkers {
            metadata: Arc::new(self.clone()),
            indexes: Arc::new(self.clone()),
            donor_data: Arc::new(self.clone()),
            donor_import: Arc::new(self.clone()),
            hla: Arc::new(self.clone()),
            queued_updates: Arc::new(self.clone()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.request(method, self.url(path));

        match &self.api_key {
            Some(api_key) => request.header("apikey", api_key.expose_secret()),
            None => request,
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, kind: ErrorKind) -> RefreshResult<T> {
        let response = self.send(self.request(reqwest::Method::GET, path), path, kind).await?;

        response.json::<T>().await.map_err(|err| {
            refresh_error!(
                ErrorKind::DeserializationError,
                "Data services response could not be decoded",
                detail = format!("The response of '{path}' was not valid"),
                source: err
            )
        })
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
        kind: ErrorKind,
    ) -> RefreshResult<()> {
        let request = self.request(reqwest::Method::POST, path).json(body);
        self.send(request, path, kind).await?;

        Ok(())
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
        kind: ErrorKind,
    ) -> RefreshResult<reqwest::Response> {
        debug!(path, "calling data services");

        let response = request.send().await.map_err(|err| {
            refresh_error!(
                kind,
                "Data services request failed",
                detail = format!("The request to '{path}' could not be sent"),
                source: err
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_owned());

            bail!(
                kind,
                "Data services request failed",
                format!("The request to '{path}' returned status {status}: {body}")
            );
        }

        Ok(response)
    }
}

#[async_trait]
impl VersionProvider for DataServicesClient {
    async fn get_active_version(&self) -> RefreshResult<String> {
        let response: VersionResponse = self
            .get("nomenclature/active-version", ErrorKind::VersionProviderFailed)
            .await?;

        Ok(response.version)
    }

    async fn get_latest_version(&self) -> RefreshResult<String> {
        let response: VersionResponse = self
            .get("nomenclature/latest-version", ErrorKind::VersionProviderFailed)
            .await?;

        Ok(response.version)
    }
}

#[async_trait]
impl DormantDatabaseLocator for DataServicesClient {
    async fn get_dormant_database_name(&self) -> RefreshResult<String> {
        let response: DatabaseResponse = self
            .get("databases/dormant", ErrorKind::DormantDatabaseLookupFailed)
            .await?;

        Ok(response.name)
    }
}

#[async_trait]
impl DatabaseSizeController for DataServicesClient {
    async fn resize(&self, database: &str, tier: &str) -> RefreshResult<()> {
        self.post(
            &format!("databases/{database}/resize"),
            &ResizeRequest { tier },
            ErrorKind::DatabaseResizeFailed,
        )
        .await
    }
}

#[async_trait]
impl DonorImportTrigger for DataServicesClient {
    async fn enable(&self) -> RefreshResult<()> {
        self.post(
            "donor-import/trigger/enable",
            &(),
            ErrorKind::DonorImportTriggerFailed,
        )
        .await
    }

    async fn disable(&self) -> RefreshResult<()> {
        self.post(
            "donor-import/trigger/disable",
            &(),
            ErrorKind::DonorImportTriggerFailed,
        )
        .await
    }
}

#[async_trait]
impl MetadataWorker for DataServicesClient {
    async fn rebuild(&self, nomenclature_version: &str) -> RefreshResult<()> {
        self.post(
            "refresh/metadata-dictionary",
            &NomenclatureRequest {
                nomenclature_version,
            },
            ErrorKind::StageWorkerFailed,
        )
        .await
    }
}

#[async_trait]
impl IndexWorker for DataServicesClient {
    async fn remove(&self) -> RefreshResult<()> {
        self.post("refresh/indexes/remove", &(), ErrorKind::StageWorkerFailed)
            .await
    }

    async fn create(&self) -> RefreshResult<()> {
        self.post("refresh/indexes/create", &(), ErrorKind::StageWorkerFailed)
            .await
    }
}

#[async_trait]
impl DonorDataWorker for DataServicesClient {
    async fn delete_all(&self) -> RefreshResult<()> {
        self.post("refresh/donors/delete", &(), ErrorKind::StageWorkerFailed)
            .await
    }
}

#[async_trait]
impl DonorImportWorker for DataServicesClient {
    async fn import_all(&self) -> RefreshResult<()> {
        self.post("refresh/donors/import", &(), ErrorKind::StageWorkerFailed)
            .await
    }
}

#[async_trait]
impl HlaWorker for DataServicesClient {
    async fn process(
        &self,
        nomenclature_version: &str,
        is_continuation: bool,
    ) -> RefreshResult<()> {
        self.post(
            "refresh/hla",
            &ProcessHlaRequest {
                nomenclature_version,
                is_continuation,
            },
            ErrorKind::StageWorkerFailed,
        )
        .await
    }
}

#[async_trait]
impl QueuedUpdateWorker for DataServicesClient {
    async fn replay_during_refresh(&self) -> RefreshResult<()> {
        self.post(
            "refresh/queued-updates/replay",
            &(),
            ErrorKind::StageWorkerFailed,
        )
        .await
    }
}
