//! CustomVisionClient - handles communication with the Custom Vision REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::error::VisionError;
use super::service::VisionService;
use super::types::{
    ImageCreateSummary, ImageFileCreateBatch, ImagePrediction, Iteration, Project,
    ServiceErrorBody, Tag,
};

/// Default service endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://southcentralus.api.cognitive.microsoft.com";

/// Header carrying the training-plane key.
pub const TRAINING_KEY_HEADER: &str = "Training-Key";

/// Header carrying the prediction-plane key.
pub const PREDICTION_KEY_HEADER: &str = "Prediction-Key";

const TRAINING_PATH: &str = "/customvision/v2.0/Training";
const PREDICTION_PATH: &str = "/customvision/v2.0/Prediction";

/// Default timeout for HTTP requests; batch uploads can carry many megabytes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Custom Vision training and prediction endpoints.
///
/// Either key may be empty; calls on the plane whose key is missing fail with
/// [`VisionError::MissingTrainingKey`] or [`VisionError::MissingPredictionKey`].
pub struct CustomVisionClient {
    training_key: String,
    prediction_key: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for CustomVisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomVisionClient")
            .field("endpoint", &self.endpoint)
            .field("has_training_key", &!self.training_key.is_empty())
            .field("has_prediction_key", &!self.prediction_key.is_empty())
            .finish_non_exhaustive()
    }
}

impl CustomVisionClient {
    /// Create a client against the default endpoint.
    pub fn with_keys(training_key: String, prediction_key: String) -> Result<Self, VisionError> {
        Self::with_endpoint(training_key, prediction_key, DEFAULT_ENDPOINT.to_string())
    }

    /// Create a client against a custom endpoint (regional resource or mock server).
    ///
    /// # Errors
    ///
    /// Returns `VisionError::MissingTrainingKey` if neither key is set.
    pub fn with_endpoint(
        training_key: String,
        prediction_key: String,
        endpoint: String,
    ) -> Result<Self, VisionError> {
        if training_key.is_empty() && prediction_key.is_empty() {
            return Err(VisionError::MissingTrainingKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            training_key,
            prediction_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get the endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn has_training_key(&self) -> bool {
        !self.training_key.is_empty()
    }

    pub fn has_prediction_key(&self) -> bool {
        !self.prediction_key.is_empty()
    }

    fn training_url(&self, path: &str) -> String {
        format!("{}{}{}", self.endpoint, TRAINING_PATH, path)
    }

    fn prediction_url(&self, path: &str) -> String {
        format!("{}{}{}", self.endpoint, PREDICTION_PATH, path)
    }

    /// Start a training-plane request with the key attached.
    fn training(&self, method: reqwest::Method, path: &str) -> Result<RequestBuilder, VisionError> {
        if self.training_key.is_empty() {
            return Err(VisionError::MissingTrainingKey);
        }
        Ok(self
            .http_client
            .request(method, self.training_url(path))
            .header(TRAINING_KEY_HEADER, &self.training_key))
    }

    /// Send a request and decode a JSON response body.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, VisionError> {
        let response = request.send().await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl VisionService for CustomVisionClient {
    async fn create_project(&self, name: &str) -> Result<Project, VisionError> {
        let request = self
            .training(reqwest::Method::POST, "/projects")?
            .query(&[("name", name)])
            .body(Vec::new());
        let project: Project = self.send_json(request).await?;
        log::debug!("Created project {} ({})", project.name, project.id);
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Project, VisionError> {
        let request = self.training(reqwest::Method::GET, &format!("/projects/{}", project_id))?;
        self.send_json(request).await
    }

    async fn create_tag(&self, project_id: Uuid, name: &str) -> Result<Tag, VisionError> {
        let request = self
            .training(reqwest::Method::POST, &format!("/projects/{}/tags", project_id))?
            .query(&[("name", name)])
            .body(Vec::new());
        self.send_json(request).await
    }

    async fn get_tags(&self, project_id: Uuid) -> Result<Vec<Tag>, VisionError> {
        let request =
            self.training(reqwest::Method::GET, &format!("/projects/{}/tags", project_id))?;
        self.send_json(request).await
    }

    async fn upload_image(
        &self,
        project_id: Uuid,
        image: Vec<u8>,
        tag_ids: &[Uuid],
    ) -> Result<ImageCreateSummary, VisionError> {
        let mut request = self
            .training(reqwest::Method::POST, &format!("/projects/{}/images", project_id))?
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);
        if !tag_ids.is_empty() {
            request = request.query(&[("tagIds", join_ids(tag_ids))]);
        }
        self.send_json(request).await
    }

    async fn upload_image_batch(
        &self,
        project_id: Uuid,
        batch: ImageFileCreateBatch,
    ) -> Result<ImageCreateSummary, VisionError> {
        let request = self
            .training(
                reqwest::Method::POST,
                &format!("/projects/{}/images/files", project_id),
            )?
            .json(&batch);
        self.send_json(request).await
    }

    async fn train_project(&self, project_id: Uuid) -> Result<Iteration, VisionError> {
        let request = self
            .training(reqwest::Method::POST, &format!("/projects/{}/train", project_id))?
            .body(Vec::new());
        self.send_json(request).await
    }

    async fn get_iteration(
        &self,
        project_id: Uuid,
        iteration_id: Uuid,
    ) -> Result<Iteration, VisionError> {
        let request = self.training(
            reqwest::Method::GET,
            &format!("/projects/{}/iterations/{}", project_id, iteration_id),
        )?;
        self.send_json(request).await
    }

    async fn update_iteration(
        &self,
        project_id: Uuid,
        iteration: &Iteration,
    ) -> Result<Iteration, VisionError> {
        let request = self
            .training(
                reqwest::Method::PATCH,
                &format!("/projects/{}/iterations/{}", project_id, iteration.id),
            )?
            .json(iteration);
        self.send_json(request).await
    }

    async fn predict_image(
        &self,
        project_id: Uuid,
        image: Vec<u8>,
        iteration_id: Option<Uuid>,
    ) -> Result<ImagePrediction, VisionError> {
        if self.prediction_key.is_empty() {
            return Err(VisionError::MissingPredictionKey);
        }

        let mut request = self
            .http_client
            .post(self.prediction_url(&format!("/{}/image", project_id)))
            .header(PREDICTION_KEY_HEADER, &self.prediction_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image);
        if let Some(id) = iteration_id {
            request = request.query(&[("iterationId", id.to_string())]);
        }
        self.send_json(request).await
    }
}

fn join_ids(ids: &[Uuid]) -> String {
    ids.iter()
        .map(Uuid::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse the Retry-After header value to get retry delay in seconds.
fn parse_retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
}

/// Turn a non-success response into a typed error.
async fn check_status(response: Response) -> Result<Response, VisionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_secs = parse_retry_after(&response);
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let body: Option<ServiceErrorBody> = serde_json::from_str(&text).ok();
    let code = body.as_ref().and_then(|b| b.code.clone());
    let message = body
        .and_then(|b| b.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            log::warn!(
                "Rate limited by Custom Vision. Retry-After: {:?} seconds",
                retry_after_secs
            );
            Err(VisionError::RateLimit {
                message,
                retry_after_secs,
            })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(VisionError::Unauthorized { message })
        }
        _ => Err(VisionError::ApiError {
            status: status.as_u16(),
            code,
            message,
        }),
    }
}
