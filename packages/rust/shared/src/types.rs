//! Core domain types for the Euclid pipeline client.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EuclidError;

/// Message carried by a freshly created or reset status.
pub const READY_MESSAGE: &str = "Ready to start";

/// Message published once crawl, label and score have all succeeded.
pub const PIPELINE_COMPLETED_MESSAGE: &str = "Pipeline completed successfully!";

/// Fallback reason used when a failure carries no message.
const UNKNOWN_ERROR: &str = "Unknown error";

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One unit of remote work. The derived ordering is the pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crawl,
    Label,
    Score,
    Export,
}

impl Stage {
    /// Every stage, in pipeline order.
    pub const ALL: [Stage; 4] = [Stage::Crawl, Stage::Label, Stage::Score, Stage::Export];

    /// Stages run by the automatic pipeline. Export is always user-triggered.
    pub const AUTOMATIC: [Stage; 3] = [Stage::Crawl, Stage::Label, Stage::Score];

    /// The step reported while this stage is running.
    pub fn step(self) -> PipelineStep {
        match self {
            Self::Crawl => PipelineStep::Crawling,
            Self::Label => PipelineStep::Labeling,
            Self::Score => PipelineStep::Scoring,
            Self::Export => PipelineStep::Exporting,
        }
    }

    /// Path of the remote endpoint that performs this stage.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Crawl => "/crawl",
            Self::Label => "/label",
            Self::Score => "/score",
            Self::Export => "/export",
        }
    }

    /// Progress values on entering and on success.
    ///
    /// Dependent UIs key off these exact numbers.
    pub fn checkpoints(self) -> (u8, u8) {
        match self {
            Self::Crawl => (10, 50),
            Self::Label => (60, 80),
            Self::Score => (85, 95),
            Self::Export => (98, 100),
        }
    }

    pub fn entering_message(self) -> &'static str {
        match self {
            Self::Crawl => "Starting web crawl...",
            Self::Label => "Applying ML labeling...",
            Self::Score => "Calculating quality scores...",
            Self::Export => "Preparing export...",
        }
    }

    pub fn succeeded_message(self) -> &'static str {
        match self {
            Self::Crawl => "Crawling in progress...",
            Self::Label => "Labeling completed",
            Self::Score => "Scoring completed",
            Self::Export => "Dataset exported successfully!",
        }
    }

    pub fn failed_message(self) -> &'static str {
        match self {
            Self::Crawl => "Crawling failed",
            Self::Label => "Labeling failed",
            Self::Score => "Scoring failed",
            Self::Export => "Export failed",
        }
    }

    /// Human-readable title for listings.
    pub fn title(self) -> &'static str {
        match self {
            Self::Crawl => "Web Crawling",
            Self::Label => "ML Labeling",
            Self::Score => "Quality Scoring",
            Self::Export => "Export Ready",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crawl => "crawl",
            Self::Label => "label",
            Self::Score => "score",
            Self::Export => "export",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// PipelineStep
// ---------------------------------------------------------------------------

/// Current position of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Idle,
    Crawling,
    Labeling,
    Scoring,
    Exporting,
    Completed,
    Error,
}

impl PipelineStep {
    /// The stage this step belongs to, if it is a running step.
    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::Crawling => Some(Stage::Crawl),
            Self::Labeling => Some(Stage::Label),
            Self::Scoring => Some(Stage::Score),
            Self::Exporting => Some(Stage::Export),
            Self::Idle | Self::Completed | Self::Error => None,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Crawling => "crawling",
            Self::Labeling => "labeling",
            Self::Scoring => "scoring",
            Self::Exporting => "exporting",
            Self::Completed => "completed",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// PipelineStatus
// ---------------------------------------------------------------------------

/// Result of the most recent stage. The payload is opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Ok(serde_json::Value),
    Err(String),
}

/// How a single stage relates to the current status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Active,
    Completed,
    Error,
}

/// The single record describing pipeline progress.
///
/// Values are only built through the transition constructors, which keep
/// `error()` present exactly when `step() == PipelineStep::Error`.
/// Deserialized values are checked against the same rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPipelineStatus")]
pub struct PipelineStatus {
    step: PipelineStep,
    progress: u8,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outcome: Option<StageOutcome>,
}

/// Unchecked wire form of [`PipelineStatus`].
#[derive(Deserialize)]
struct RawPipelineStatus {
    step: PipelineStep,
    progress: u8,
    message: String,
    #[serde(default)]
    outcome: Option<StageOutcome>,
}

impl TryFrom<RawPipelineStatus> for PipelineStatus {
    type Error = EuclidError;

    fn try_from(raw: RawPipelineStatus) -> std::result::Result<Self, Self::Error> {
        let failed = matches!(raw.outcome, Some(StageOutcome::Err(_)));

        if raw.progress > 100 {
            return Err(EuclidError::validation(format!(
                "progress {} is above 100",
                raw.progress
            )));
        }
        if failed != (raw.step == PipelineStep::Error) {
            return Err(EuclidError::validation(format!(
                "step '{}' does not match its outcome",
                raw.step
            )));
        }
        match raw.step {
            PipelineStep::Idle | PipelineStep::Error if raw.progress != 0 => {
                return Err(EuclidError::validation(format!(
                    "step '{}' must have zero progress",
                    raw.step
                )));
            }
            PipelineStep::Idle if raw.outcome.is_some() => {
                return Err(EuclidError::validation("idle step carries no outcome"));
            }
            PipelineStep::Completed if raw.progress != 100 => {
                return Err(EuclidError::validation("completed step must be at 100"));
            }
            _ => {}
        }

        Ok(Self {
            step: raw.step,
            progress: raw.progress,
            message: raw.message,
            outcome: raw.outcome,
        })
    }
}

impl PipelineStatus {
    /// Initial status: `idle / 0 / "Ready to start"`.
    pub fn idle() -> Self {
        Self {
            step: PipelineStep::Idle,
            progress: 0,
            message: READY_MESSAGE.to_string(),
            outcome: None,
        }
    }

    /// Status published when a stage starts.
    pub fn entering(stage: Stage) -> Self {
        Self {
            step: stage.step(),
            progress: stage.checkpoints().0,
            message: stage.entering_message().to_string(),
            outcome: None,
        }
    }

    /// Status published when a stage's request resolved.
    ///
    /// A successful export ends the run, so it lands on `completed`.
    pub fn succeeded(stage: Stage, payload: serde_json::Value) -> Self {
        let step = match stage {
            Stage::Export => PipelineStep::Completed,
            other => other.step(),
        };
        Self {
            step,
            progress: stage.checkpoints().1,
            message: stage.succeeded_message().to_string(),
            outcome: Some(StageOutcome::Ok(payload)),
        }
    }

    /// Status published when a stage's request failed.
    pub fn failed(stage: Stage, reason: impl Into<String>) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = UNKNOWN_ERROR.to_string();
        }
        Self {
            step: PipelineStep::Error,
            progress: 0,
            message: stage.failed_message().to_string(),
            outcome: Some(StageOutcome::Err(reason)),
        }
    }

    /// Status published after crawl, label and score all succeeded.
    pub fn completed(last_payload: Option<serde_json::Value>) -> Self {
        Self {
            step: PipelineStep::Completed,
            progress: 100,
            message: PIPELINE_COMPLETED_MESSAGE.to_string(),
            outcome: last_payload.map(StageOutcome::Ok),
        }
    }

    pub fn step(&self) -> PipelineStep {
        self.step
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn outcome(&self) -> Option<&StageOutcome> {
        self.outcome.as_ref()
    }

    /// Payload of the most recent successful stage.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match &self.outcome {
            Some(StageOutcome::Ok(value)) => Some(value),
            _ => None,
        }
    }

    /// Failure reason; present iff the step is `error`.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Some(StageOutcome::Err(reason)) => Some(reason),
            _ => None,
        }
    }

    /// Whether an export may be offered to the user.
    pub fn export_ready(&self) -> bool {
        self.step == PipelineStep::Completed
    }

    /// Derive the display state of `stage` from the current step.
    pub fn stage_state(&self, stage: Stage) -> StageState {
        match self.step {
            PipelineStep::Error => StageState::Error,
            PipelineStep::Completed => StageState::Completed,
            step => match step.stage() {
                None => StageState::Pending,
                Some(current) => match stage.cmp(&current) {
                    Ordering::Less => StageState::Completed,
                    Ordering::Equal => StageState::Active,
                    Ordering::Greater => StageState::Pending,
                },
            },
        }
    }
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::idle()
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// A single labelled sample, as served by the pipeline service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Label confidence in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Diversity score in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Aggregates over the current dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: u64,
    #[serde(default)]
    pub label_distribution: BTreeMap<String, u64>,
    #[serde(default)]
    pub avg_confidence: f64,
    #[serde(default)]
    pub avg_diversity: f64,
}

/// Response body of `GET /dataset/preview`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetPreview {
    #[serde(default)]
    pub data: Vec<DatasetRow>,
    #[serde(default)]
    pub stats: Option<DatasetStats>,
}

/// Most recently fetched rows and stats, replaced wholesale on each fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSnapshot {
    pub rows: Vec<DatasetRow>,
    pub stats: Option<DatasetStats>,
}

impl DatasetSnapshot {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.stats.is_none()
    }
}

impl From<&DatasetPreview> for DatasetSnapshot {
    fn from(preview: &DatasetPreview) -> Self {
        Self {
            rows: preview.data.clone(),
            stats: preview.stats.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// ExportFormat
// ---------------------------------------------------------------------------

/// Format requested from `GET /export`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Jsonl,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        }
    }

    /// Name the exported artifact is saved under.
    pub fn file_name(self) -> String {
        format!("euclid_dataset.{}", self.as_str())
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = EuclidError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "jsonl" => Ok(Self::Jsonl),
            other => Err(EuclidError::validation(format!(
                "unknown export format '{other}': expected 'csv' or 'jsonl'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_status_matches_initial_value() {
        let status = PipelineStatus::default();
        assert_eq!(status.step(), PipelineStep::Idle);
        assert_eq!(status.progress(), 0);
        assert_eq!(status.message(), "Ready to start");
        assert!(status.data().is_none());
        assert!(status.error().is_none());
    }

    #[test]
    fn stage_checkpoints_are_increasing_in_pipeline_order() {
        let mut last = 0;
        for stage in Stage::ALL {
            let (enter, done) = stage.checkpoints();
            assert!(enter > last, "{stage} entering checkpoint regressed");
            assert!(done > enter);
            last = done;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn failed_status_carries_reason_and_zero_progress() {
        let status = PipelineStatus::failed(Stage::Score, "scoring engine unavailable");
        assert_eq!(status.step(), PipelineStep::Error);
        assert_eq!(status.progress(), 0);
        assert_eq!(status.message(), "Scoring failed");
        assert_eq!(status.error(), Some("scoring engine unavailable"));
        assert!(status.data().is_none());
        assert!(!status.export_ready());
    }

    #[test]
    fn failed_status_never_has_empty_reason() {
        let status = PipelineStatus::failed(Stage::Crawl, "  ");
        assert_eq!(status.error(), Some("Unknown error"));
    }

    #[test]
    fn error_present_only_in_error_step() {
        let payload = serde_json::json!({"pages": 3});
        let statuses = [
            PipelineStatus::idle(),
            PipelineStatus::entering(Stage::Label),
            PipelineStatus::succeeded(Stage::Crawl, payload.clone()),
            PipelineStatus::completed(Some(payload)),
            PipelineStatus::failed(Stage::Export, "disk full"),
        ];
        for status in statuses {
            assert_eq!(
                status.error().is_some(),
                status.step() == PipelineStep::Error,
                "{status:?}"
            );
        }
    }

    #[test]
    fn export_success_completes_the_run() {
        let status = PipelineStatus::succeeded(Stage::Export, serde_json::json!({}));
        assert_eq!(status.step(), PipelineStep::Completed);
        assert_eq!(status.progress(), 100);
        assert_eq!(status.message(), "Dataset exported successfully!");
        assert!(status.export_ready());
    }

    #[test]
    fn stage_state_follows_stage_order() {
        let status = PipelineStatus::entering(Stage::Label);
        assert_eq!(status.stage_state(Stage::Crawl), StageState::Completed);
        assert_eq!(status.stage_state(Stage::Label), StageState::Active);
        assert_eq!(status.stage_state(Stage::Score), StageState::Pending);
        assert_eq!(status.stage_state(Stage::Export), StageState::Pending);

        let idle = PipelineStatus::idle();
        assert!(Stage::ALL
            .iter()
            .all(|s| idle.stage_state(*s) == StageState::Pending));

        let failed = PipelineStatus::failed(Stage::Label, "boom");
        assert_eq!(failed.stage_state(Stage::Crawl), StageState::Error);

        let done = PipelineStatus::completed(None);
        assert_eq!(done.stage_state(Stage::Export), StageState::Completed);
    }

    #[test]
    fn status_serializes_with_lowercase_step() {
        let status = PipelineStatus::failed(Stage::Crawl, "refused");
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["step"], "error");
        assert_eq!(json["outcome"]["err"], "refused");
    }

    #[test]
    fn status_deserializes_from_its_own_output() {
        let statuses = [
            PipelineStatus::idle(),
            PipelineStatus::entering(Stage::Score),
            PipelineStatus::completed(Some(serde_json::json!({"scored": 10}))),
            PipelineStatus::failed(Stage::Crawl, "refused"),
        ];
        for status in statuses {
            let json = serde_json::to_string(&status).expect("serialize");
            let parsed: PipelineStatus = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn inconsistent_status_is_rejected() {
        let cases = [
            r#"{"step":"idle","progress":250,"message":"x","outcome":{"err":"boom"}}"#,
            r#"{"step":"idle","progress":0,"message":"x","outcome":{"err":"boom"}}"#,
            r#"{"step":"error","progress":0,"message":"Crawling failed"}"#,
            r#"{"step":"error","progress":40,"message":"x","outcome":{"err":"boom"}}"#,
            r#"{"step":"completed","progress":95,"message":"x"}"#,
            r#"{"step":"labeling","progress":101,"message":"x"}"#,
        ];
        for json in cases {
            assert!(
                serde_json::from_str::<PipelineStatus>(json).is_err(),
                "accepted {json}"
            );
        }
    }

    #[test]
    fn export_format_names() {
        assert_eq!(ExportFormat::default(), ExportFormat::Csv);
        assert_eq!(ExportFormat::Csv.file_name(), "euclid_dataset.csv");
        assert_eq!(ExportFormat::Jsonl.file_name(), "euclid_dataset.jsonl");
        assert_eq!("JSONL".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert!("parquet".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn preview_tolerates_missing_fields() {
        let preview: DatasetPreview = serde_json::from_str("{}").expect("parse empty");
        assert!(preview.data.is_empty());
        assert!(preview.stats.is_none());

        let json = r#"{
            "data": [{"id": "r1", "text": "hello", "label": "positive", "confidence": 0.91}],
            "stats": {
                "total_samples": 1,
                "label_distribution": {"positive": 1},
                "avg_confidence": 0.91,
                "avg_diversity": 0.4
            }
        }"#;
        let preview: DatasetPreview = serde_json::from_str(json).expect("parse");
        assert_eq!(preview.data[0].label.as_deref(), Some("positive"));
        assert!(preview.data[0].url.is_none());
        let stats = preview.stats.expect("stats");
        assert_eq!(stats.label_distribution["positive"], 1);
    }
}
