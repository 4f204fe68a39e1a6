//! The narrow interface the workflow needs from the vision service.

use async_trait::async_trait;
use uuid::Uuid;

use super::error::VisionError;
use super::types::{
    ImageCreateSummary, ImageFileCreateBatch, ImagePrediction, Iteration, Project, Tag,
};

/// Remote training and prediction operations.
///
/// [`CustomVisionClient`](super::CustomVisionClient) talks to the real
/// service; tests substitute an in-memory fake.
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn create_project(&self, name: &str) -> Result<Project, VisionError>;

    async fn get_project(&self, project_id: Uuid) -> Result<Project, VisionError>;

    async fn create_tag(&self, project_id: Uuid, name: &str) -> Result<Tag, VisionError>;

    async fn get_tags(&self, project_id: Uuid) -> Result<Vec<Tag>, VisionError>;

    /// Upload one image; every tag in `tag_ids` is applied to it.
    async fn upload_image(
        &self,
        project_id: Uuid,
        image: Vec<u8>,
        tag_ids: &[Uuid],
    ) -> Result<ImageCreateSummary, VisionError>;

    /// Upload several images in a single call.
    async fn upload_image_batch(
        &self,
        project_id: Uuid,
        batch: ImageFileCreateBatch,
    ) -> Result<ImageCreateSummary, VisionError>;

    /// Queue a training run. The returned iteration is usually still training.
    async fn train_project(&self, project_id: Uuid) -> Result<Iteration, VisionError>;

    async fn get_iteration(
        &self,
        project_id: Uuid,
        iteration_id: Uuid,
    ) -> Result<Iteration, VisionError>;

    /// Push changed iteration fields (name, default flag) back to the service.
    async fn update_iteration(
        &self,
        project_id: Uuid,
        iteration: &Iteration,
    ) -> Result<Iteration, VisionError>;

    /// Classify an image. Without an iteration id the default iteration is used.
    async fn predict_image(
        &self,
        project_id: Uuid,
        image: Vec<u8>,
        iteration_id: Option<Uuid>,
    ) -> Result<ImagePrediction, VisionError>;
}
