//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::Config;

/// Snap webcam frames and classify them with Custom Vision
#[derive(Parser, Debug)]
#[command(name = "visionsnap")]
#[command(version, about = "Webcam snapshots classified by a Custom Vision project", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Camera device index (from list-cameras)
    #[arg(long, global = true)]
    pub camera: Option<u32>,

    /// Mirror camera horizontally
    #[arg(long, global = true)]
    pub mirror: bool,

    /// Log at debug level
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras
    ListCameras,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Create a project with the valid/invalid tags
    CreateProject {
        /// Project name (default from config)
        #[arg(long)]
        name: Option<String>,
    },
    /// Upload the local training images
    Upload {
        #[arg(long)]
        project_id: Option<Uuid>,
    },
    /// Train the project and make the new iteration the default
    Train {
        #[arg(long)]
        project_id: Option<Uuid>,
    },
    /// Classify an image (default: the last snapshot)
    Predict {
        image: Option<PathBuf>,
        #[arg(long)]
        project_id: Option<Uuid>,
    },
    /// Capture one frame to the snapshot path
    Snapshot {
        /// Classify the snapshot after saving it
        #[arg(long)]
        predict: bool,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

impl Args {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(device) = self.camera {
            config.camera.device = device;
        }
        if self.mirror {
            config.camera.mirror = true;
        }
        match &self.command {
            Some(Command::CreateProject { name: Some(name) }) => {
                config.vision.project_name = name.clone();
            }
            Some(Command::Upload {
                project_id: Some(id),
            })
            | Some(Command::Train {
                project_id: Some(id),
            })
            | Some(Command::Predict {
                project_id: Some(id),
                ..
            }) => {
                config.vision.project_id = Some(*id);
            }
            _ => {}
        }
    }
}
