//! Project workflow: the call sequences behind each user action.
//!
//! Holds the session's project, tag set and latest iteration, and narrates
//! progress to the [`LogSink`]. Every remote failure comes back as a
//! [`WorkflowError`] naming the operation; nothing here panics or retries.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use super::error::VisionError;
use super::service::VisionService;
use super::types::{
    ImageCreateSummary, ImageFileCreateBatch, ImageFileCreateEntry, Iteration, IterationStatus,
    Prediction, Project, Tag, MAX_BATCH_SIZE,
};
use crate::log_sink::LogSink;

/// Label for images that pass inspection.
pub const VALID_TAG: &str = "valid";

/// Label for images that fail inspection.
pub const INVALID_TAG: &str = "invalid";

/// Default interval between training status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default limit on how long to wait for training.
pub const DEFAULT_TRAINING_TIMEOUT: Duration = Duration::from_secs(600);

/// Inputs the workflow takes from configuration.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Name given to newly created projects
    pub project_name: String,
    /// Directory containing `valid/` and `invalid/` image folders
    pub images_root: PathBuf,
    pub poll_interval: Duration,
    pub training_timeout: Duration,
    /// Iteration to predict against when none was trained this session
    pub iteration_id: Option<Uuid>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            project_name: "planogram3".to_string(),
            images_root: PathBuf::from("Images"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            training_timeout: DEFAULT_TRAINING_TIMEOUT,
            iteration_id: None,
        }
    }
}

/// The two fixed tags of a project.
#[derive(Debug, Clone, PartialEq)]
pub struct TagSet {
    pub valid: Tag,
    pub invalid: Tag,
}

/// Local training images, sorted by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageSets {
    pub valid: Vec<PathBuf>,
    pub invalid: Vec<PathBuf>,
}

/// An image the service refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedImage {
    pub name: String,
    pub status: String,
}

/// Outcome of [`ProjectWorkflow::upload_images`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadReport {
    /// Files accepted through per-image upload
    pub uploaded: Vec<PathBuf>,
    /// Number of images accepted through batch upload
    pub batch_accepted: usize,
    pub rejected: Vec<RejectedImage>,
}

/// Errors from workflow operations. Each names the step that failed.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("No project yet. Create one first")]
    NoProject,

    #[error("Project creation failed: {0}")]
    CreateProject(#[source] VisionError),

    #[error("Could not open project {project_id}: {source}")]
    AttachProject {
        project_id: Uuid,
        source: VisionError,
    },

    #[error("Creating tag '{label}' failed: {source}")]
    CreateTag {
        label: String,
        source: VisionError,
    },

    #[error("Failed to list images in '{}': {source}", .path.display())]
    LoadImages {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read image '{}': {source}", .path.display())]
    ReadImage {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Upload of '{}' failed after {} image(s) uploaded: {source}", .file.display(), .uploaded.len())]
    Upload {
        file: PathBuf,
        /// Files that were uploaded before the failure
        uploaded: Vec<PathBuf>,
        source: VisionError,
    },

    #[error("Batch upload of {count} image(s) failed: {source}")]
    BatchUpload { count: usize, source: VisionError },

    #[error("Training request failed: {0}")]
    Train(#[source] VisionError),

    #[error("Checking iteration {iteration_id} failed: {source}")]
    PollIteration {
        iteration_id: Uuid,
        source: VisionError,
    },

    #[error("Iteration {iteration_id} finished with status {status}")]
    TrainingFailed {
        iteration_id: Uuid,
        status: IterationStatus,
    },

    #[error("Iteration {iteration_id} still training after {waited:?}")]
    TrainingTimeout { iteration_id: Uuid, waited: Duration },

    #[error("Marking iteration {iteration_id} as default failed: {source}")]
    MarkDefault {
        iteration_id: Uuid,
        source: VisionError,
    },

    #[error("Prediction failed: {0}")]
    Predict(#[source] VisionError),
}

/// Format one prediction the way the log pane shows it.
pub fn format_prediction(prediction: &Prediction) -> String {
    format!(
        "\t{}: {:.1}%",
        prediction.tag_name,
        prediction.probability * 100.0
    )
}

/// List regular files in `images_root/valid` and `images_root/invalid`.
pub fn load_image_sets(images_root: &Path) -> Result<ImageSets, WorkflowError> {
    Ok(ImageSets {
        valid: list_files(&images_root.join(VALID_TAG))?,
        invalid: list_files(&images_root.join(INVALID_TAG))?,
    })
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, WorkflowError> {
    let to_err = |source| WorkflowError::LoadImages {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(to_err)? {
        let entry = entry.map_err(to_err)?;
        if entry.file_type().map_err(to_err)?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn rejected_from(summary: &ImageCreateSummary, fallback_name: &str) -> Vec<RejectedImage> {
    summary
        .images
        .iter()
        .filter(|r| !r.is_accepted())
        .map(|r| RejectedImage {
            name: r
                .source_url
                .clone()
                .unwrap_or_else(|| fallback_name.to_string()),
            status: r.status.clone(),
        })
        .collect()
}

/// Session state plus the operations the UI and CLI trigger.
pub struct ProjectWorkflow {
    service: Arc<dyn VisionService>,
    settings: WorkflowSettings,
    log: LogSink,
    /// Project every call targets
    project_id: Option<Uuid>,
    /// Details of `project_id`, once fetched or created
    project: Option<Project>,
    tags: Option<TagSet>,
    iteration: Option<Iteration>,
}

impl ProjectWorkflow {
    pub fn new(service: Arc<dyn VisionService>, settings: WorkflowSettings, log: LogSink) -> Self {
        Self {
            service,
            settings,
            log,
            project_id: None,
            project: None,
            tags: None,
            iteration: None,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn project_id(&self) -> Option<Uuid> {
        self.project_id
    }

    /// Project name when known, otherwise its id.
    pub fn project_label(&self) -> Option<String> {
        match (&self.project, self.project_id) {
            (Some(project), _) => Some(project.name.clone()),
            (None, Some(id)) => Some(id.to_string()),
            (None, None) => None,
        }
    }

    pub fn tags(&self) -> Option<&TagSet> {
        self.tags.as_ref()
    }

    pub fn iteration(&self) -> Option<&Iteration> {
        self.iteration.as_ref()
    }

    fn require_project(&self) -> Result<Uuid, WorkflowError> {
        self.project_id.ok_or(WorkflowError::NoProject)
    }

    /// Tags of the current project, fetching (and repairing) them on first use.
    async fn require_tags(&mut self) -> Result<TagSet, WorkflowError> {
        if let Some(tags) = &self.tags {
            return Ok(tags.clone());
        }
        let project_id = self.require_project()?;
        self.attach_project(project_id).await?;
        self.tags.clone().ok_or(WorkflowError::NoProject)
    }

    /// Target an existing project by id without contacting the service.
    ///
    /// Enough for prediction and training. Upload fetches the project's tags
    /// when it first needs them.
    pub fn use_project_id(&mut self, project_id: Uuid) {
        if self.project_id == Some(project_id) {
            return;
        }
        self.project_id = Some(project_id);
        self.project = None;
        self.tags = None;
        self.iteration = None;
        self.log.log(format!("Using project {}", project_id));
    }

    async fn create_tag(&self, project_id: Uuid, label: &str) -> Result<Tag, WorkflowError> {
        self.service
            .create_tag(project_id, label)
            .await
            .map_err(|source| WorkflowError::CreateTag {
                label: label.to_string(),
                source,
            })
    }

    /// Create a project named after the settings, then its two tags.
    ///
    /// If the previous creation stopped after the project itself was made,
    /// that project's tags are completed instead of creating another.
    pub async fn create_project(&mut self) -> Result<Project, WorkflowError> {
        let half_created = match (&self.project, &self.tags) {
            (Some(project), None) => Some(project.clone()),
            _ => None,
        };
        if let Some(project) = half_created {
            self.log
                .log(format!("Completing tags for project {}", project.name));
            let tags = self.repair_tags(project.id).await?;
            self.log
                .log(format!("Tags {} - {} created ", tags.valid.name, tags.invalid.name));
            self.tags = Some(tags);
            self.log.log("Creation Completed");
            return Ok(project);
        }
        if let Some(existing) = self.project_id {
            log::warn!("Replacing session project {} with a new one", existing);
        }

        self.log.log("Creating new project:");
        let project = self
            .service
            .create_project(&self.settings.project_name)
            .await
            .map_err(WorkflowError::CreateProject)?;
        self.log
            .log(format!("Project {} - {} created ", project.name, project.id));

        self.project_id = Some(project.id);
        self.project = Some(project.clone());
        self.tags = None;
        self.iteration = None;

        let valid = self.create_tag(project.id, VALID_TAG).await?;
        let invalid = self.create_tag(project.id, INVALID_TAG).await?;
        self.log
            .log(format!("Tags {} - {} created ", valid.name, invalid.name));
        self.tags = Some(TagSet { valid, invalid });

        self.log.log("Creation Completed");
        Ok(project)
    }

    /// Use an existing project, creating whichever fixed tags it lacks.
    ///
    /// Needs the training key. Keeps the session iteration when the project
    /// is already the current one.
    pub async fn attach_project(&mut self, project_id: Uuid) -> Result<Project, WorkflowError> {
        let project = self
            .service
            .get_project(project_id)
            .await
            .map_err(|source| WorkflowError::AttachProject { project_id, source })?;
        let tags = self.repair_tags(project_id).await?;

        self.log
            .log(format!("Using project {} - {}", project.name, project.id));
        if self.project_id != Some(project_id) {
            self.iteration = None;
        }
        self.project_id = Some(project_id);
        self.project = Some(project.clone());
        self.tags = Some(tags);
        Ok(project)
    }

    /// Look up the fixed tags of `project_id`, creating any that are missing.
    async fn repair_tags(&self, project_id: Uuid) -> Result<TagSet, WorkflowError> {
        let existing = self
            .service
            .get_tags(project_id)
            .await
            .map_err(|source| WorkflowError::AttachProject { project_id, source })?;

        let find = |label: &str| existing.iter().find(|t| t.name == label).cloned();
        let valid = match find(VALID_TAG) {
            Some(tag) => tag,
            None => self.create_tag(project_id, VALID_TAG).await?,
        };
        let invalid = match find(INVALID_TAG) {
            Some(tag) => tag,
            None => self.create_tag(project_id, INVALID_TAG).await?,
        };
        Ok(TagSet { valid, invalid })
    }

    /// Upload valid images one call at a time and invalid images in batches.
    ///
    /// Stops at the first failed call; the error lists what was uploaded.
    pub async fn upload_images(&mut self) -> Result<UploadReport, WorkflowError> {
        let project_id = self.require_project()?;
        let tags = self.require_tags().await?;

        self.log.log("Loading Images from Disk");
        let images = load_image_sets(&self.settings.images_root)?;
        self.log.log("Loading Images Complete");

        self.log.log("Uploading images to service");
        let mut report = UploadReport::default();

        for path in &images.valid {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| WorkflowError::ReadImage {
                    path: path.clone(),
                    source,
                })?;

            let summary = self
                .service
                .upload_image(project_id, bytes, &[tags.valid.id])
                .await
                .map_err(|source| WorkflowError::Upload {
                    file: path.clone(),
                    uploaded: report.uploaded.clone(),
                    source,
                })?;

            let rejected = rejected_from(&summary, &file_name(path));
            if rejected.is_empty() {
                report.uploaded.push(path.clone());
            } else {
                report.rejected.extend(rejected);
            }
        }

        for chunk in images.invalid.chunks(MAX_BATCH_SIZE) {
            let mut entries = Vec::with_capacity(chunk.len());
            for path in chunk {
                let contents =
                    tokio::fs::read(path)
                        .await
                        .map_err(|source| WorkflowError::ReadImage {
                            path: path.clone(),
                            source,
                        })?;
                entries.push(ImageFileCreateEntry {
                    name: file_name(path),
                    contents,
                });
            }

            let count = entries.len();
            let batch = ImageFileCreateBatch {
                images: entries,
                tag_ids: vec![tags.invalid.id],
            };
            let summary = self
                .service
                .upload_image_batch(project_id, batch)
                .await
                .map_err(|source| WorkflowError::BatchUpload { count, source })?;

            let rejected = rejected_from(&summary, "<batch image>");
            report.batch_accepted += count - rejected.len().min(count);
            report.rejected.extend(rejected);
        }

        for rejected in &report.rejected {
            self.log
                .error(format!("Rejected {}: {}", rejected.name, rejected.status));
        }
        self.log.log("Images Uploaded");
        log::info!(
            "{} uploaded individually, {} in batch, {} rejected",
            report.uploaded.len(),
            report.batch_accepted,
            report.rejected.len()
        );
        Ok(report)
    }

    /// Train the project, wait for the iteration to finish, and make it the default.
    ///
    /// The wait is an async sleep between polls, so callers on a runtime stay
    /// responsive while training runs.
    pub async fn train(&mut self) -> Result<Iteration, WorkflowError> {
        let project_id = self.require_project()?;

        self.log.log("Training");
        let started = Instant::now();
        let mut iteration = self
            .service
            .train_project(project_id)
            .await
            .map_err(WorkflowError::Train)?;
        log::info!("Iteration {} queued ({})", iteration.id, iteration.status);

        while iteration.status.is_in_progress() {
            let waited = started.elapsed();
            if waited >= self.settings.training_timeout {
                return Err(WorkflowError::TrainingTimeout {
                    iteration_id: iteration.id,
                    waited,
                });
            }

            tokio::time::sleep(self.settings.poll_interval).await;

            let iteration_id = iteration.id;
            iteration = self
                .service
                .get_iteration(project_id, iteration_id)
                .await
                .map_err(|source| WorkflowError::PollIteration {
                    iteration_id,
                    source,
                })?;
            log::debug!("Iteration {} status: {}", iteration.id, iteration.status);
        }

        if iteration.status != IterationStatus::Completed {
            return Err(WorkflowError::TrainingFailed {
                iteration_id: iteration.id,
                status: iteration.status,
            });
        }

        iteration.is_default = true;
        let iteration_id = iteration.id;
        let updated = self
            .service
            .update_iteration(project_id, &iteration)
            .await
            .map_err(|source| WorkflowError::MarkDefault {
                iteration_id,
                source,
            })?;

        self.iteration = Some(updated.clone());
        self.log.log("Done Training!");
        Ok(updated)
    }

    /// Read an image file and classify it.
    pub async fn predict_file(&self, path: &Path) -> Result<Vec<Prediction>, WorkflowError> {
        let image = tokio::fs::read(path)
            .await
            .map_err(|source| WorkflowError::ReadImage {
                path: path.to_path_buf(),
                source,
            })?;
        self.predict(image).await
    }

    /// Classify image bytes and log each tag probability in service order.
    pub async fn predict(&self, image: Vec<u8>) -> Result<Vec<Prediction>, WorkflowError> {
        let project_id = self.require_project()?;
        let iteration_id = self
            .iteration
            .as_ref()
            .map(|i| i.id)
            .or(self.settings.iteration_id);

        self.log.log("Making a prediction:");
        let result = self
            .service
            .predict_image(project_id, image, iteration_id)
            .await
            .map_err(WorkflowError::Predict)?;

        for prediction in &result.predictions {
            self.log.log(format_prediction(prediction));
        }
        Ok(result.predictions)
    }
}
