//! Workflow tests against an in-memory vision service.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;
use visionsnap::log_sink::LogSink;
use visionsnap::vision::{
    ImageCreateResult, ImageCreateSummary, ImageFileCreateBatch, ImagePrediction, Iteration,
    IterationStatus, Prediction, Project, ProjectWorkflow, Tag, VisionError, VisionService,
    WorkflowError, WorkflowSettings,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    CreateProject(String),
    GetProject(Uuid),
    CreateTag(Uuid, String),
    GetTags(Uuid),
    UploadImage {
        project: Uuid,
        bytes: Vec<u8>,
        tags: Vec<Uuid>,
    },
    UploadBatch {
        project: Uuid,
        names: Vec<String>,
        tags: Vec<Uuid>,
    },
    Train(Uuid),
    GetIteration(Uuid, Uuid),
    UpdateIteration(Uuid, Iteration),
    Predict(Uuid, Vec<u8>, Option<Uuid>),
}

/// Records every call and answers from canned state.
#[derive(Default)]
struct FakeService {
    calls: Mutex<Vec<Call>>,
    /// Statuses returned by successive `get_iteration` calls; `Training` once empty
    statuses: Mutex<VecDeque<IterationStatus>>,
    existing_tags: Vec<Tag>,
    fail_create_project: bool,
    /// Number of upcoming `create_tag` calls that fail
    failing_tag_creates: Mutex<usize>,
    /// Zero-based index of the single upload that fails
    fail_upload_at: Option<usize>,
    /// Batch file names the service rejects
    reject_in_batch: Vec<String>,
    predictions: Vec<Prediction>,
}

const PROJECT_ID: Uuid = Uuid::from_u128(0x7f3c_2a10_5d4e_4c1b_9a8f_0e6d_5c4b_3a21);
const ITERATION_ID: Uuid = Uuid::from_u128(0xc0ff_ee00_1234_4abc_8def_0123_4567_89ab);

impl FakeService {
    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn iteration(status: IterationStatus) -> Iteration {
        Iteration {
            id: ITERATION_ID,
            name: "Iteration 1".to_string(),
            is_default: false,
            status,
            project_id: Some(PROJECT_ID),
            created: None,
            last_modified: None,
            trained_at: None,
        }
    }
}

fn api_error(message: &str) -> VisionError {
    VisionError::ApiError {
        status: 500,
        code: None,
        message: message.to_string(),
    }
}

#[async_trait]
impl VisionService for FakeService {
    async fn create_project(&self, name: &str) -> Result<Project, VisionError> {
        self.record(Call::CreateProject(name.to_string()));
        if self.fail_create_project {
            return Err(api_error("quota exceeded"));
        }
        Ok(Project {
            id: PROJECT_ID,
            name: name.to_string(),
            description: None,
            created: None,
            last_modified: None,
        })
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Project, VisionError> {
        self.record(Call::GetProject(project_id));
        Ok(Project {
            id: project_id,
            name: "existing".to_string(),
            description: None,
            created: None,
            last_modified: None,
        })
    }

    async fn create_tag(&self, project_id: Uuid, name: &str) -> Result<Tag, VisionError> {
        self.record(Call::CreateTag(project_id, name.to_string()));
        {
            let mut failing = self.failing_tag_creates.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(api_error("tag service unavailable"));
            }
        }
        Ok(Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            image_count: 0,
        })
    }

    async fn get_tags(&self, project_id: Uuid) -> Result<Vec<Tag>, VisionError> {
        self.record(Call::GetTags(project_id));
        Ok(self.existing_tags.clone())
    }

    async fn upload_image(
        &self,
        project_id: Uuid,
        image: Vec<u8>,
        tag_ids: &[Uuid],
    ) -> Result<ImageCreateSummary, VisionError> {
        let index = self.count(|c| matches!(c, Call::UploadImage { .. }));
        self.record(Call::UploadImage {
            project: project_id,
            bytes: image,
            tags: tag_ids.to_vec(),
        });
        if self.fail_upload_at == Some(index) {
            return Err(api_error("upload failed"));
        }
        Ok(ImageCreateSummary {
            is_batch_successful: true,
            images: vec![ImageCreateResult {
                source_url: None,
                status: "OK".to_string(),
            }],
        })
    }

    async fn upload_image_batch(
        &self,
        project_id: Uuid,
        batch: ImageFileCreateBatch,
    ) -> Result<ImageCreateSummary, VisionError> {
        let names: Vec<String> = batch.images.iter().map(|i| i.name.clone()).collect();
        let images = names
            .iter()
            .map(|name| ImageCreateResult {
                source_url: Some(name.clone()),
                status: if self.reject_in_batch.contains(name) {
                    "ErrorImageFormat".to_string()
                } else {
                    "OK".to_string()
                },
            })
            .collect::<Vec<_>>();
        self.record(Call::UploadBatch {
            project: project_id,
            names,
            tags: batch.tag_ids,
        });
        Ok(ImageCreateSummary {
            is_batch_successful: images.iter().all(|i| i.is_accepted()),
            images,
        })
    }

    async fn train_project(&self, project_id: Uuid) -> Result<Iteration, VisionError> {
        self.record(Call::Train(project_id));
        Ok(Self::iteration(IterationStatus::Training))
    }

    async fn get_iteration(
        &self,
        project_id: Uuid,
        iteration_id: Uuid,
    ) -> Result<Iteration, VisionError> {
        self.record(Call::GetIteration(project_id, iteration_id));
        let status = self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(IterationStatus::Training);
        Ok(Self::iteration(status))
    }

    async fn update_iteration(
        &self,
        project_id: Uuid,
        iteration: &Iteration,
    ) -> Result<Iteration, VisionError> {
        self.record(Call::UpdateIteration(project_id, iteration.clone()));
        Ok(iteration.clone())
    }

    async fn predict_image(
        &self,
        project_id: Uuid,
        image: Vec<u8>,
        iteration_id: Option<Uuid>,
    ) -> Result<ImagePrediction, VisionError> {
        self.record(Call::Predict(project_id, image, iteration_id));
        Ok(ImagePrediction {
            id: None,
            project: Some(project_id),
            iteration: iteration_id,
            predictions: self.predictions.clone(),
        })
    }
}

fn write_images(root: &Path, label: &str, count: usize) -> Vec<PathBuf> {
    let dir = root.join(label);
    std::fs::create_dir_all(&dir).unwrap();
    (0..count)
        .map(|i| {
            let path = dir.join(format!("{}_{:03}.jpg", label, i));
            std::fs::write(&path, format!("{}-{}", label, i)).unwrap();
            path
        })
        .collect()
}

fn settings(images_root: &Path) -> WorkflowSettings {
    WorkflowSettings {
        images_root: images_root.to_path_buf(),
        poll_interval: Duration::from_millis(1),
        ..WorkflowSettings::default()
    }
}

fn workflow(service: &Arc<FakeService>, images_root: &Path) -> (ProjectWorkflow, LogSink) {
    let log = LogSink::new();
    let service: Arc<dyn VisionService> = service.clone();
    (
        ProjectWorkflow::new(service, settings(images_root), log.clone()),
        log,
    )
}

#[tokio::test]
async fn test_create_project_creates_two_distinct_tags() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let (mut workflow, log) = workflow(&service, dir.path());

    let project = workflow.create_project().await.unwrap();
    assert_eq!(project.id, PROJECT_ID);

    assert_eq!(
        service.calls(),
        vec![
            Call::CreateProject("planogram3".to_string()),
            Call::CreateTag(PROJECT_ID, "valid".to_string()),
            Call::CreateTag(PROJECT_ID, "invalid".to_string()),
        ]
    );
    let tags = workflow.tags().unwrap();
    assert_ne!(tags.valid.id, tags.invalid.id);

    let text = log.text();
    assert!(text.contains("]: Creating new project:\n"));
    assert!(text.contains(&format!("]: Project planogram3 - {} created \n", PROJECT_ID)));
    assert!(text.contains("]: Tags valid - invalid created \n"));
    assert!(text.contains("]: Creation Completed\n"));
}

#[tokio::test]
async fn test_create_project_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService {
        fail_create_project: true,
        ..FakeService::default()
    });
    let (mut workflow, _log) = workflow(&service, dir.path());

    let err = workflow.create_project().await.unwrap_err();
    assert!(matches!(err, WorkflowError::CreateProject(_)));
    assert!(err.to_string().contains("quota exceeded"));
    assert!(workflow.project().is_none());
    assert_eq!(service.count(|c| matches!(c, Call::CreateTag(..))), 0);
}

#[tokio::test]
async fn test_upload_single_for_valid_and_one_batch_for_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let valid = write_images(dir.path(), "valid", 3);
    write_images(dir.path(), "invalid", 5);

    let service = Arc::new(FakeService::default());
    let (mut workflow, log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();
    let tags = workflow.tags().unwrap().clone();

    let report = workflow.upload_images().await.unwrap();
    assert_eq!(report.uploaded, valid);
    assert_eq!(report.batch_accepted, 5);
    assert!(report.rejected.is_empty());

    let singles: Vec<_> = service
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::UploadImage {
                project,
                bytes,
                tags,
            } => Some((project, bytes, tags)),
            _ => None,
        })
        .collect();
    assert_eq!(singles.len(), 3);
    for (i, (project, bytes, tag_ids)) in singles.iter().enumerate() {
        assert_eq!(*project, PROJECT_ID);
        assert_eq!(bytes, format!("valid-{}", i).as_bytes());
        assert_eq!(tag_ids, &vec![tags.valid.id]);
    }

    let batches: Vec<_> = service
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::UploadBatch { names, tags, .. } => Some((names, tags)),
            _ => None,
        })
        .collect();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].0.len(), 5);
    assert_eq!(batches[0].1, vec![tags.invalid.id]);

    let text = log.text();
    let order = [
        "Loading Images from Disk",
        "Loading Images Complete",
        "Uploading images to service",
        "Images Uploaded",
    ];
    let positions: Vec<usize> = order.iter().map(|m| text.find(m).unwrap()).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_upload_splits_large_batches() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), "valid", 0);
    write_images(dir.path(), "invalid", 70);

    let service = Arc::new(FakeService::default());
    let (mut workflow, _log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();

    let report = workflow.upload_images().await.unwrap();
    assert_eq!(report.batch_accepted, 70);

    let sizes: Vec<usize> = service
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::UploadBatch { names, .. } => Some(names.len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes, vec![64, 6]);
}

#[tokio::test]
async fn test_upload_with_no_invalid_images_skips_batch() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), "valid", 2);
    write_images(dir.path(), "invalid", 0);

    let service = Arc::new(FakeService::default());
    let (mut workflow, _log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();
    workflow.upload_images().await.unwrap();

    assert_eq!(service.count(|c| matches!(c, Call::UploadImage { .. })), 2);
    assert_eq!(service.count(|c| matches!(c, Call::UploadBatch { .. })), 0);
}

#[tokio::test]
async fn test_upload_stops_at_first_failure() {
    let dir = tempfile::tempdir().unwrap();
    let valid = write_images(dir.path(), "valid", 3);
    write_images(dir.path(), "invalid", 2);

    let service = Arc::new(FakeService {
        fail_upload_at: Some(1),
        ..FakeService::default()
    });
    let (mut workflow, _log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();

    match workflow.upload_images().await {
        Err(WorkflowError::Upload { file, uploaded, .. }) => {
            assert_eq!(file, valid[1]);
            assert_eq!(uploaded, vec![valid[0].clone()]);
        }
        other => panic!("Expected Upload error, got {:?}", other),
    }
    assert_eq!(service.count(|c| matches!(c, Call::UploadImage { .. })), 2);
    assert_eq!(service.count(|c| matches!(c, Call::UploadBatch { .. })), 0);
}

#[tokio::test]
async fn test_batch_rejections_are_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), "valid", 1);
    write_images(dir.path(), "invalid", 3);

    let service = Arc::new(FakeService {
        reject_in_batch: vec!["invalid_001.jpg".to_string()],
        ..FakeService::default()
    });
    let (mut workflow, log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();

    let report = workflow.upload_images().await.unwrap();
    assert_eq!(report.batch_accepted, 2);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].name, "invalid_001.jpg");
    assert!(log
        .text()
        .contains("ERROR: Rejected invalid_001.jpg: ErrorImageFormat"));
}

#[tokio::test]
async fn test_upload_requires_project() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let (mut workflow, _log) = workflow(&service, dir.path());

    let err = workflow.upload_images().await.unwrap_err();
    assert!(matches!(err, WorkflowError::NoProject));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn test_train_polls_until_complete_then_marks_default_once() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    service.statuses.lock().unwrap().extend([
        IterationStatus::Training,
        IterationStatus::Training,
        IterationStatus::Completed,
    ]);
    let (mut workflow, log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();

    let iteration = workflow.train().await.unwrap();
    assert!(iteration.is_default);
    assert_eq!(workflow.iteration().map(|i| i.id), Some(ITERATION_ID));

    assert_eq!(service.count(|c| matches!(c, Call::GetIteration(..))), 3);
    let updates: Vec<Iteration> = service
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::UpdateIteration(_, iteration) => Some(iteration),
            _ => None,
        })
        .collect();
    assert_eq!(updates.len(), 1);
    assert!(updates[0].is_default);
    assert_eq!(updates[0].status, IterationStatus::Completed);

    let text = log.text();
    assert!(text.find("]: Training\n").unwrap() < text.find("]: Done Training!\n").unwrap());
}

#[tokio::test]
async fn test_train_failed_iteration_is_not_marked_default() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    service
        .statuses
        .lock()
        .unwrap()
        .push_back(IterationStatus::Failed);
    let (mut workflow, log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();

    let err = workflow.train().await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::TrainingFailed {
            status: IterationStatus::Failed,
            ..
        }
    ));
    assert_eq!(service.count(|c| matches!(c, Call::UpdateIteration(..))), 0);
    assert!(!log.text().contains("Done Training!"));
}

#[tokio::test]
async fn test_train_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let log = LogSink::new();
    let settings = WorkflowSettings {
        poll_interval: Duration::from_millis(5),
        training_timeout: Duration::from_millis(30),
        ..settings(dir.path())
    };
    let shared: Arc<dyn VisionService> = service.clone();
    let mut workflow = ProjectWorkflow::new(shared, settings, log);
    workflow.create_project().await.unwrap();

    let err = workflow.train().await.unwrap_err();
    assert!(matches!(err, WorkflowError::TrainingTimeout { .. }));
    assert!(service.count(|c| matches!(c, Call::GetIteration(..))) >= 1);
    assert_eq!(service.count(|c| matches!(c, Call::UpdateIteration(..))), 0);
}

#[tokio::test]
async fn test_attach_creates_missing_tags_only() {
    let dir = tempfile::tempdir().unwrap();
    let valid = Tag {
        id: Uuid::from_u128(11),
        name: "valid".to_string(),
        description: None,
        image_count: 4,
    };
    let service = Arc::new(FakeService {
        existing_tags: vec![valid.clone()],
        ..FakeService::default()
    });
    let (mut workflow, _log) = workflow(&service, dir.path());

    workflow.attach_project(PROJECT_ID).await.unwrap();
    assert_eq!(
        service.calls(),
        vec![
            Call::GetProject(PROJECT_ID),
            Call::GetTags(PROJECT_ID),
            Call::CreateTag(PROJECT_ID, "invalid".to_string()),
        ]
    );
    assert_eq!(workflow.tags().unwrap().valid, valid);
}

#[tokio::test]
async fn test_predict_logs_each_tag_in_service_order() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("evaluated.jpg");
    std::fs::write(&image, b"snapshot").unwrap();

    let service = Arc::new(FakeService {
        predictions: vec![
            Prediction {
                probability: 0.91,
                tag_id: Uuid::from_u128(1),
                tag_name: "valid".to_string(),
            },
            Prediction {
                probability: 0.036,
                tag_id: Uuid::from_u128(2),
                tag_name: "invalid".to_string(),
            },
        ],
        ..FakeService::default()
    });
    service
        .statuses
        .lock()
        .unwrap()
        .push_back(IterationStatus::Completed);
    let (mut workflow, log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();
    workflow.train().await.unwrap();

    let predictions = workflow.predict_file(&image).await.unwrap();
    assert_eq!(predictions.len(), 2);
    assert!(service.calls().contains(&Call::Predict(
        PROJECT_ID,
        b"snapshot".to_vec(),
        Some(ITERATION_ID)
    )));

    let text = log.text();
    let making = text.find("]: Making a prediction:\n").unwrap();
    let valid = text.find("]: \tvalid: 91.0%\n").unwrap();
    let invalid = text.find("]: \tinvalid: 3.6%\n").unwrap();
    assert!(making < valid && valid < invalid);
}

#[tokio::test]
async fn test_predict_falls_back_to_configured_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let configured = Uuid::from_u128(99);
    let service = Arc::new(FakeService::default());
    let shared: Arc<dyn VisionService> = service.clone();
    let settings = WorkflowSettings {
        iteration_id: Some(configured),
        ..settings(dir.path())
    };
    let mut workflow = ProjectWorkflow::new(shared, settings, LogSink::new());
    workflow.attach_project(PROJECT_ID).await.unwrap();

    workflow.predict(b"img".to_vec()).await.unwrap();
    assert!(service
        .calls()
        .contains(&Call::Predict(PROJECT_ID, b"img".to_vec(), Some(configured))));
}

#[tokio::test]
async fn test_predict_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService::default());
    let (mut workflow, _log) = workflow(&service, dir.path());
    workflow.create_project().await.unwrap();

    let err = workflow
        .predict_file(&dir.path().join("missing.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ReadImage { .. }));
}

#[tokio::test]
async fn test_create_project_completes_tags_after_partial_failure() {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(FakeService {
        failing_tag_creates: Mutex::new(1),
        ..FakeService::default()
    });
    let (mut workflow, log) = workflow(&service, dir.path());

    let err = workflow.create_project().await.unwrap_err();
    assert!(matches!(err, WorkflowError::CreateTag { .. }));
    assert_eq!(workflow.project_id(), Some(PROJECT_ID));
    assert!(workflow.tags().is_none());

    let project = workflow.create_project().await.unwrap();
    assert_eq!(project.id, PROJECT_ID);
    assert_eq!(
        service.calls(),
        vec![
            Call::CreateProject("planogram3".to_string()),
            Call::CreateTag(PROJECT_ID, "valid".to_string()),
            Call::GetTags(PROJECT_ID),
            Call::CreateTag(PROJECT_ID, "valid".to_string()),
            Call::CreateTag(PROJECT_ID, "invalid".to_string()),
        ]
    );
    assert!(workflow.tags().is_some());
    assert!(log.text().contains("]: Completing tags for project planogram3\n"));
}

#[tokio::test]
async fn test_predict_by_project_id_only_calls_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("evaluated.jpg");
    std::fs::write(&image, b"frame").unwrap();

    let service = Arc::new(FakeService::default());
    let (mut workflow, log) = workflow(&service, dir.path());
    workflow.use_project_id(PROJECT_ID);

    workflow.predict_file(&image).await.unwrap();
    assert_eq!(
        service.calls(),
        vec![Call::Predict(PROJECT_ID, b"frame".to_vec(), None)]
    );
    assert_eq!(workflow.project_label(), Some(PROJECT_ID.to_string()));
    assert!(log.text().contains(&format!("]: Using project {}\n", PROJECT_ID)));
}

#[tokio::test]
async fn test_upload_by_project_id_fetches_tags_once() {
    let dir = tempfile::tempdir().unwrap();
    write_images(dir.path(), "valid", 1);
    write_images(dir.path(), "invalid", 0);

    let service = Arc::new(FakeService::default());
    let (mut workflow, _log) = workflow(&service, dir.path());
    workflow.use_project_id(PROJECT_ID);

    workflow.upload_images().await.unwrap();
    workflow.upload_images().await.unwrap();

    assert_eq!(service.count(|c| matches!(c, Call::GetProject(_))), 1);
    assert_eq!(service.count(|c| matches!(c, Call::GetTags(_))), 1);
    assert_eq!(service.count(|c| matches!(c, Call::CreateTag(..))), 2);
    assert_eq!(service.count(|c| matches!(c, Call::UploadImage { .. })), 2);
    assert_eq!(workflow.project_label(), Some("existing".to_string()));
}
