//! Pipeline orchestration: crawl → label → score, plus the user-triggered export.
//!
//! The [`Orchestrator`] owns the single [`PipelineStatus`] value and publishes
//! every transition on a `watch` channel. Stage operations move the status
//! through their fixed checkpoints; failures are reported through the status,
//! a [`Notification`], and the returned error.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{info, instrument, warn};

use euclid_client::ApiClient;
use euclid_shared::{
    DatasetPreview, DatasetSnapshot, EuclidError, ExportFormat, PipelineStatus, Result, Stage,
};

use crate::notify::{Notification, Notifier};
use crate::sink::{ExportArtifact, ExportSink};

/// Shown once crawl, label and score all succeeded.
const PIPELINE_READY_NOTICE: &str = "Pipeline completed! Ready for export.";

const PREVIEW_FAILED_NOTICE: &str = "Failed to load dataset preview";

const ANALYTICS_FAILED_NOTICE: &str = "Failed to load analytics";

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences remote pipeline stages and owns the pipeline status.
///
/// All methods take `&self`; share it behind an `Arc` to read status or fetch
/// previews while a run is in flight. Stage operations are serialized on an
/// internal lock, so a second caller waits for the first to finish.
pub struct Orchestrator {
    client: ApiClient,
    sink: Arc<dyn ExportSink>,
    status: watch::Sender<PipelineStatus>,
    snapshot: RwLock<DatasetSnapshot>,
    notifier: Notifier,
    stage_lock: Mutex<()>,
}

impl Orchestrator {
    /// Create an orchestrator in the `idle` state.
    pub fn new(client: ApiClient, sink: Arc<dyn ExportSink>) -> Self {
        let (status, _) = watch::channel(PipelineStatus::idle());
        Self {
            client,
            sink,
            status,
            snapshot: RwLock::new(DatasetSnapshot::default()),
            notifier: Notifier::new(),
            stage_lock: Mutex::new(()),
        }
    }

    /// Current pipeline status.
    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    /// Observe status transitions as they are published.
    pub fn subscribe_status(&self) -> watch::Receiver<PipelineStatus> {
        self.status.subscribe()
    }

    /// Receive user-facing notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifier.subscribe()
    }

    /// Most recently fetched dataset rows and stats.
    pub fn snapshot(&self) -> DatasetSnapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // -- Stage operations ---------------------------------------------------

    /// Trigger the crawl stage with a search query and optional seed URLs.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn start_crawl(&self, query: &str, urls: Option<&[String]>) -> Result<Value> {
        let _guard = self.stage_lock.lock().await;
        self.run_json_stage(Stage::Crawl, Some(crawl_body(query, urls)))
            .await
    }

    /// Trigger the labeling stage.
    #[instrument(skip_all)]
    pub async fn apply_labeling(&self) -> Result<Value> {
        let _guard = self.stage_lock.lock().await;
        self.run_json_stage(Stage::Label, None).await
    }

    /// Trigger the scoring stage.
    #[instrument(skip_all)]
    pub async fn score_dataset(&self) -> Result<Value> {
        let _guard = self.stage_lock.lock().await;
        self.run_json_stage(Stage::Score, None).await
    }

    /// Download the dataset in `format` and save it as `euclid_dataset.<format>`.
    #[instrument(skip_all, fields(format = %format))]
    pub async fn export_dataset(&self, format: ExportFormat) -> Result<ExportArtifact> {
        let _guard = self.stage_lock.lock().await;
        let stage = Stage::Export;

        self.enter(stage);
        match self.download(format).await {
            Ok(artifact) => {
                self.publish(PipelineStatus::succeeded(stage, artifact.to_payload()));
                self.notifier.success(stage.succeeded_message());
                info!(
                    file_name = %artifact.file_name,
                    bytes = artifact.bytes,
                    "export complete"
                );
                Ok(artifact)
            }
            Err(e) => Err(self.fail(stage, e)),
        }
    }

    // -- Orchestration ------------------------------------------------------

    /// Run crawl, label and score in order, stopping at the first failure.
    ///
    /// A failed stage has already moved the status to `error` and notified
    /// the user, so the failure is not returned here. Callers that need the
    /// outcome must inspect [`Orchestrator::status`] afterwards.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn run_pipeline(&self, query: &str, urls: Option<&[String]>) {
        let _guard = self.stage_lock.lock().await;
        info!("starting pipeline");

        let mut crawl = Some(crawl_body(query, urls));
        let mut last = None;

        for stage in Stage::AUTOMATIC {
            let body = if stage == Stage::Crawl {
                crawl.take()
            } else {
                None
            };

            match self.run_json_stage(stage, body).await {
                Ok(payload) => last = Some(payload),
                Err(e) => {
                    warn!(%stage, error = %e, "pipeline halted");
                    return;
                }
            }
        }

        self.publish(PipelineStatus::completed(last));
        self.notifier.success(PIPELINE_READY_NOTICE);
        info!("pipeline complete");
    }

    // -- Read operations ----------------------------------------------------

    /// Fetch a page of dataset rows with fresh stats, replacing the snapshot.
    #[instrument(skip_all, fields(limit = limit, offset = offset))]
    pub async fn fetch_preview(&self, limit: u32, offset: u32) -> Result<DatasetPreview> {
        let endpoint = format!("/dataset/preview?limit={limit}&offset={offset}");

        match self.client.get_json::<DatasetPreview>(&endpoint).await {
            Ok(preview) => {
                *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
                    DatasetSnapshot::from(&preview);
                info!(rows = preview.data.len(), "dataset preview loaded");
                Ok(preview)
            }
            Err(e) => {
                warn!(error = %e, "dataset preview failed");
                self.notifier.error(PREVIEW_FAILED_NOTICE);
                Err(e)
            }
        }
    }

    /// Fetch the analytics payload. Does not touch status or snapshot.
    #[instrument(skip_all)]
    pub async fn fetch_analytics(&self) -> Result<Value> {
        self.client.get_json("/analytics").await.map_err(|e| {
            warn!(error = %e, "analytics failed");
            self.notifier.error(ANALYTICS_FAILED_NOTICE);
            e
        })
    }

    // -- Reset --------------------------------------------------------------

    /// Return to the initial status and drop the dataset snapshot.
    pub fn reset(&self) {
        self.publish(PipelineStatus::idle());
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) =
            DatasetSnapshot::default();
        info!("pipeline reset");
    }

    // -- Internals ----------------------------------------------------------

    /// Enter `stage`, POST to its endpoint, and publish the outcome.
    async fn run_json_stage(&self, stage: Stage, body: Option<Value>) -> Result<Value> {
        self.enter(stage);

        match self.client.post_json::<Value>(stage.endpoint(), body).await {
            Ok(payload) => {
                self.publish(PipelineStatus::succeeded(stage, payload.clone()));
                info!(%stage, "stage succeeded");
                Ok(payload)
            }
            Err(e) => Err(self.fail(stage, e)),
        }
    }

    async fn download(&self, format: ExportFormat) -> Result<ExportArtifact> {
        let endpoint = format!("{}?format={format}", Stage::Export.endpoint());

        let bytes = self.client.fetch_bytes(&endpoint).await?;

        let file_name = format.file_name();
        let path = self.sink.save(&file_name, &bytes)?;

        Ok(ExportArtifact {
            format,
            file_name,
            path,
            bytes: bytes.len(),
        })
    }

    fn enter(&self, stage: Stage) {
        info!(%stage, "stage started");
        self.publish(PipelineStatus::entering(stage));
    }

    /// Record a stage failure and hand the error back for propagation.
    fn fail(&self, stage: Stage, err: EuclidError) -> EuclidError {
        let reason = err.to_string();
        warn!(%stage, error = %reason, "stage failed");

        self.publish(PipelineStatus::failed(stage, reason.clone()));
        self.notifier
            .error(format!("{}: {reason}", stage.failed_message()));
        err
    }

    fn publish(&self, status: PipelineStatus) {
        self.status.send_replace(status);
    }
}

/// `{query, urls?}`; `urls` is omitted entirely when not given.
fn crawl_body(query: &str, urls: Option<&[String]>) -> Value {
    let mut body = json!({ "query": query });
    if let Some(urls) = urls {
        body["urls"] = json!(urls);
    }
    body
}
