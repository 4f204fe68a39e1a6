//! Wire types for the Custom Vision training and prediction APIs.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

/// Maximum number of images the service accepts in one batch upload.
pub const MAX_BATCH_SIZE: usize = 64;

/// A classification project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

/// A label that can be attached to images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_count: u32,
}

/// Training state of an iteration.
///
/// Values the client does not know are kept verbatim so they can be sent back
/// unchanged when the iteration is updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IterationStatus {
    Training,
    Completed,
    Failed,
    Other(String),
}

impl IterationStatus {
    /// Whether the service is still training this iteration.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, IterationStatus::Training)
    }
}

impl From<String> for IterationStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Training" => IterationStatus::Training,
            "Completed" => IterationStatus::Completed,
            "Failed" => IterationStatus::Failed,
            _ => IterationStatus::Other(s),
        }
    }
}

impl From<IterationStatus> for String {
    fn from(status: IterationStatus) -> Self {
        match status {
            IterationStatus::Training => "Training".to_string(),
            IterationStatus::Completed => "Completed".to_string(),
            IterationStatus::Failed => "Failed".to_string(),
            IterationStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from(self.clone()))
    }
}

/// One trained (or training) model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Iteration {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    pub status: IterationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<String>,
}

/// One image of a batch upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFileCreateEntry {
    pub name: String,
    #[serde(serialize_with = "serialize_base64")]
    pub contents: Vec<u8>,
}

/// A batch upload: all files share the same tag ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFileCreateBatch {
    pub images: Vec<ImageFileCreateEntry>,
    pub tag_ids: Vec<Uuid>,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

/// Per-image outcome of an upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCreateResult {
    #[serde(default)]
    pub source_url: Option<String>,
    pub status: String,
}

impl ImageCreateResult {
    /// The service reports `OK` for new images and `OKDuplicate` for repeats.
    pub fn is_accepted(&self) -> bool {
        self.status.starts_with("OK")
    }
}

/// Response of both upload endpoints.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCreateSummary {
    pub is_batch_successful: bool,
    #[serde(default)]
    pub images: Vec<ImageCreateResult>,
}

/// One tag probability from a prediction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub probability: f64,
    pub tag_id: Uuid,
    pub tag_name: String,
}

/// Prediction response for a single image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePrediction {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub project: Option<Uuid>,
    #[serde(default)]
    pub iteration: Option<Uuid>,
    #[serde(default)]
    pub predictions: Vec<Prediction>,
}

/// Error body returned by the service.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
