//! Subcommand handlers.
//!
//! Each handler returns a [`CommandError`]; `main` prints it as `Error: ...`
//! and exits with status 1.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::args::ConfigAction;
use crate::camera::{self, CameraError, CaptureEvent, CaptureSession};
use crate::config::{default_path, mask_key, Config, ConfigError, DEFAULT_CONFIG_TOML};
use crate::log_sink::LogSink;
use crate::snapshot::{frame_slot, snapshot_channel, FramePipeline, SnapshotSaved, SnapshotTrigger};
use crate::vision::{
    format_prediction, CustomVisionClient, ProjectWorkflow, VisionError, VisionService,
    WorkflowError,
};

/// How long a headless snapshot waits for the first frame.
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("No project id. Pass --project-id, set vision.project_id or CUSTOM_VISION_PROJECT_ID")]
    NoProjectId,

    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0}")]
    Capture(String),

    #[error("Terminal error: {0}")]
    Terminal(#[from] std::io::Error),

    #[error("No frame arrived within {0:?}")]
    SnapshotTimeout(Duration),
}

/// List available cameras and print them to stdout.
pub fn list_cameras() -> Result<(), CommandError> {
    let devices = camera::list_devices()?;
    if devices.is_empty() {
        println!("No video sources found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
    } else {
        println!("Available cameras:");
        for device in devices {
            println!("  {}", device);
        }
        println!();
        println!("Use --camera <index> to select a camera.");
    }
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(
    action: ConfigAction,
    config: &Config,
    config_path: Option<&Path>,
) -> Result<(), CommandError> {
    let path = config_path.map(PathBuf::from).unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            println!("Current configuration:");
            println!("  Endpoint: {}", config.vision.endpoint);
            println!("  Training key: {}", mask_key(&config.vision.training_key));
            println!("  Prediction key: {}", mask_key(&config.vision.prediction_key));
            println!("  Project name: {}", config.vision.project_name);
            println!("  Project id: {}", display_id(config.vision.project_id));
            println!("  Iteration id: {}", display_id(config.vision.iteration_id));
            println!("  Images: {}", config.images_root().display());
            println!("  Snapshot: {}", config.snapshot_path().display());
            println!(
                "  Training poll: {} ms, timeout {} s",
                config.training.poll_interval_ms, config.training.timeout_secs
            );
            println!(
                "  Camera: {} ({}x{} @ {} fps, mirror: {})",
                config.camera.device,
                config.camera.width,
                config.camera.height,
                config.camera.fps,
                if config.camera.mirror { "yes" } else { "no" }
            );
            println!();

            if path.exists() {
                println!("Config file: {} (exists)", path.display());
            } else {
                println!("Config file: {} (not found)", path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if path.exists() {
                return Err(CommandError::ConfigExists(path));
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CommandError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            std::fs::write(&path, DEFAULT_CONFIG_TOML).map_err(|source| CommandError::Io {
                path: path.clone(),
                source,
            })?;

            println!("Created config file: {}", path.display());
            Ok(())
        }
    }
}

fn display_id(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

/// Build the REST client from configuration.
pub fn build_service(config: &Config) -> Result<Arc<dyn VisionService>, VisionError> {
    let client = CustomVisionClient::with_endpoint(
        config.vision.training_key.clone(),
        config.vision.prediction_key.clone(),
        config.vision.endpoint.clone(),
    )?;
    log::debug!("Using {:?}", client);
    Ok(Arc::new(client))
}

fn workflow(config: &Config, log: LogSink) -> Result<ProjectWorkflow, CommandError> {
    let service = build_service(config)?;
    Ok(ProjectWorkflow::new(service, config.workflow_settings(), log))
}

/// A workflow targeting the configured project. No remote calls are made here.
fn project_workflow(config: &Config) -> Result<ProjectWorkflow, CommandError> {
    let project_id = config.vision.project_id.ok_or(CommandError::NoProjectId)?;
    let mut workflow = workflow(config, LogSink::new())?;
    workflow.use_project_id(project_id);
    Ok(workflow)
}

pub async fn create_project(config: &Config) -> Result<(), CommandError> {
    let mut workflow = workflow(config, LogSink::new())?;
    let project = workflow.create_project().await?;
    println!("Project: {} ({})", project.name, project.id);
    if let Some(tags) = workflow.tags() {
        println!("  {}: {}", tags.valid.name, tags.valid.id);
        println!("  {}: {}", tags.invalid.name, tags.invalid.id);
    }
    Ok(())
}

pub async fn upload(config: &Config) -> Result<(), CommandError> {
    let mut workflow = project_workflow(config)?;
    let report = workflow.upload_images().await?;
    println!(
        "Uploaded {} valid image(s), {} invalid image(s) in batch",
        report.uploaded.len(),
        report.batch_accepted
    );
    for rejected in &report.rejected {
        println!("  rejected {}: {}", rejected.name, rejected.status);
    }
    Ok(())
}

pub async fn train(config: &Config) -> Result<(), CommandError> {
    let mut workflow = project_workflow(config)?;
    let iteration = workflow.train().await?;
    println!("Iteration {} ({}) is now the default", iteration.id, iteration.status);
    Ok(())
}

pub async fn predict(config: &Config, image: Option<&Path>) -> Result<(), CommandError> {
    let workflow = project_workflow(config)?;
    let path = image
        .map(PathBuf::from)
        .unwrap_or_else(|| config.snapshot_path());
    let predictions = workflow.predict_file(&path).await?;
    for prediction in &predictions {
        println!("{}", format_prediction(prediction));
    }
    Ok(())
}

/// Capture one frame to the snapshot path, optionally classifying it.
pub async fn snapshot(config: &Config, then_predict: bool) -> Result<(), CommandError> {
    let saved = capture_snapshot(config).await?;
    println!("Saved frame {} to {}", saved.sequence, saved.path.display());

    if then_predict {
        predict(config, Some(&saved.path)).await?;
    }
    Ok(())
}

async fn capture_snapshot(config: &Config) -> Result<SnapshotSaved, CommandError> {
    let trigger = SnapshotTrigger::new();
    let (saved_tx, mut saved_rx) = snapshot_channel();
    let (publisher, _slot) = frame_slot();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let pipeline = FramePipeline::new(trigger.clone(), config.snapshot_path(), saved_tx, publisher);
    trigger.request();
    let settings = config.camera_settings();
    let mut session = tokio::task::spawn_blocking(move || {
        CaptureSession::start_camera(settings, pipeline, events_tx)
    })
    .await
    .map_err(|e| CommandError::Capture(e.to_string()))??;

    let deadline = tokio::time::sleep(SNAPSHOT_TIMEOUT);
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            saved = saved_rx.recv() => {
                break saved.ok_or_else(|| CommandError::Capture("Capture stopped before a frame was saved".to_string()));
            }
            event = events_rx.recv() => match event.map(|notice| notice.event) {
                Some(CaptureEvent::Fault(message)) => break Err(CommandError::Capture(message)),
                Some(CaptureEvent::Stopped) | None => {
                    break Err(CommandError::Capture("Capture stopped before a frame was saved".to_string()));
                }
                Some(CaptureEvent::Started { resolution }) => {
                    log::debug!("Capturing at {}x{}", resolution.width, resolution.height);
                }
            },
            _ = &mut deadline => break Err(CommandError::SnapshotTimeout(SNAPSHOT_TIMEOUT)),
        }
    };

    if tokio::task::spawn_blocking(move || session.stop()).await.is_err() {
        log::warn!("Capture session did not shut down cleanly");
    }
    result
}
