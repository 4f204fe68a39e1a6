//! Custom Vision integration module.
//!
//! This module provides project creation, tagged image upload, training and
//! prediction against the Custom Vision REST API. The HTTP client sits behind
//! the [`VisionService`] trait so the [`ProjectWorkflow`] can be driven by a
//! fake in tests.

mod client;
mod error;
mod service;
mod types;
mod workflow;

pub use client::{CustomVisionClient, DEFAULT_ENDPOINT, PREDICTION_KEY_HEADER, TRAINING_KEY_HEADER};
pub use error::VisionError;
pub use service::VisionService;
pub use types::{
    ImageCreateResult, ImageCreateSummary, ImageFileCreateBatch, ImageFileCreateEntry,
    ImagePrediction, Iteration, IterationStatus, Prediction, Project, Tag, MAX_BATCH_SIZE,
};
pub use workflow::{
    format_prediction, load_image_sets, ImageSets, ProjectWorkflow, RejectedImage, TagSet,
    UploadReport, WorkflowError, WorkflowSettings, DEFAULT_POLL_INTERVAL,
    DEFAULT_TRAINING_TIMEOUT, INVALID_TAG, VALID_TAG,
};
