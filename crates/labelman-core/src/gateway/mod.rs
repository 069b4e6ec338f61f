//! Remote data gateway: the seam between the labeling core and the API.
//!
//! Every call is a single request/response; nothing here retries or times
//! out on its own. Failures surface through [`LabelmanError`].

pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{LabelmanError, Result};
use crate::models::{ClusterId, GroupTagMap, SuggestedTag, TrainingConfig, TrainingResults};

pub use http::HttpGateway;
pub use memory::{Endpoint, Fixture, GatewayCall, MemoryGateway};

#[async_trait]
pub trait Gateway: Send + Sync {
    async fn fetch_dataset_items(&self, dataset_id: &str) -> Result<DatasetPayload>;

    async fn fetch_cluster_result(&self, cluster_result_id: &str)
        -> Result<Vec<ClusterAssignment>>;

    async fn list_tags(&self, item_id: &str) -> Result<Vec<String>>;

    async fn add_tag(&self, item_id: &str, label: &str) -> Result<()>;

    async fn delete_tag(&self, item_id: &str, label: &str) -> Result<()>;

    /// Server-side fan-out of one label per cluster to every member.
    async fn bulk_tag_by_cluster(&self, request: &BulkTagRequest) -> Result<String>;

    async fn submit_training(&self, request: &TrainRequest) -> Result<TrainingResults>;

    async fn save_model(&self, request: &SaveModelRequest) -> Result<()>;
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: String,
    #[serde(default)]
    pub signed_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub image_id: String,
    pub storage_path: String,
    #[serde(default)]
    pub tags_ia: Vec<SuggestedTag>,
    #[serde(default)]
    pub custom_tags: Vec<String>,
}

/// Body of a successful dataset-items response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetPayload {
    #[serde(default)]
    pub dataset_name: Option<String>,
    #[serde(rename = "imageData", default)]
    pub image_data: Vec<ImageRef>,
    #[serde(rename = "analysisData", default)]
    pub analysis_data: Vec<AnalysisRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub storage_path: String,
    pub cluster_id: ClusterId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterResultData {
    #[serde(default)]
    pub results: Vec<ClusterAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTagRequest {
    #[serde(rename = "clusterResultId")]
    pub cluster_result_id: String,
    pub group_labels: GroupTagMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRequest {
    pub training_config: TrainingConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_cluster_result_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_labels: Option<GroupTagMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveModelRequest {
    pub model_display_name: String,
    pub temp_training_id: String,
    pub training_results: TrainingResults,
    pub source_dataset_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagRequest {
    pub tag: String,
}

/// The `{success, error, ...}` envelope every endpoint answers with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn ok(body: T) -> Self {
        Self {
            success: true,
            error: None,
            body,
        }
    }

    /// Unwraps the body, turning `success: false` into [`LabelmanError::Remote`].
    pub fn into_result(self, what: &str) -> Result<T> {
        if self.success {
            Ok(self.body)
        } else {
            Err(LabelmanError::Remote(
                self.error
                    .unwrap_or_else(|| format!("{what} failed without an error message")),
            ))
        }
    }
}

impl Envelope<Empty> {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            body: Empty {},
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterResultBody {
    #[serde(default)]
    pub data: Option<ClusterResultData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainBody {
    #[serde(default)]
    pub training_results: Option<TrainingResults>,
}
