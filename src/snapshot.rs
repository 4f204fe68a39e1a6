//! Snapshot trigger and the per-frame pipeline that feeds the display.
//!
//! The capture thread hands frames to a [`FramePipeline`], which:
//! 1. consumes the [`SnapshotTrigger`] flag and, when it was set, writes the
//!    frame to the snapshot path and posts a [`SnapshotSaved`] notice on a
//!    one-capacity channel;
//! 2. publishes the frame into the [`FrameSlot`], a single-slot hand-off the
//!    display reads the latest frame from.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::ImageFormat;
use tokio::sync::{mpsc, watch};

use crate::camera::{to_rgb_image, Frame, FrameHandler, HandlerError};

/// Errors that can occur while persisting a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Frame {sequence} has {len} bytes, expected {width}x{height} RGB")]
    MalformedFrame {
        sequence: u64,
        len: usize,
        width: u32,
        height: u32,
    },

    #[error("Failed to prepare snapshot directory '{}': {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to encode snapshot '{}': {source}", .path.display())]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("Failed to move snapshot into place at '{}': {source}", .path.display())]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Single-use request to persist the next delivered frame.
///
/// Cloning shares the flag between the UI and the capture thread.
#[derive(Debug, Clone, Default)]
pub struct SnapshotTrigger {
    armed: Arc<AtomicBool>,
}

impl SnapshotTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the flag. Returns `false` if a snapshot was already pending.
    pub fn request(&self) -> bool {
        !self.armed.swap(true, Ordering::SeqCst)
    }

    /// Consume the flag, returning whether it was armed.
    pub fn take(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }

    pub fn is_pending(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// Notice that a snapshot file was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSaved {
    pub path: PathBuf,
    pub sequence: u64,
}

/// One-capacity channel for snapshot notices.
pub fn snapshot_channel() -> (mpsc::Sender<SnapshotSaved>, mpsc::Receiver<SnapshotSaved>) {
    mpsc::channel(1)
}

/// Encode `frame` as JPEG at `path`, replacing any existing file.
///
/// The image is written next to the target and renamed over it, so readers
/// never observe a partially written snapshot.
pub fn write_snapshot(frame: &Frame, path: &Path) -> Result<(), SnapshotError> {
    let image = to_rgb_image(frame).ok_or(SnapshotError::MalformedFrame {
        sequence: frame.sequence,
        len: frame.data.len(),
        width: frame.width,
        height: frame.height,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| SnapshotError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let staging = staging_path(path);
    image
        .save_with_format(&staging, ImageFormat::Jpeg)
        .map_err(|source| SnapshotError::Encode {
            path: staging.clone(),
            source,
        })?;

    std::fs::rename(&staging, path).map_err(|source| SnapshotError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Producer half of the display hand-off. Owned by the capture thread.
#[derive(Debug)]
pub struct FramePublisher {
    tx: watch::Sender<Option<Frame>>,
}

impl FramePublisher {
    /// Replace the slot contents with `frame`.
    pub fn publish(&self, frame: Frame) {
        self.tx.send_replace(Some(frame));
    }
}

/// Consumer half of the display hand-off: always holds the latest frame.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameSlot {
    /// Take the latest frame if it changed since the last call.
    pub fn take_new(&mut self) -> Option<Frame> {
        match self.rx.has_changed() {
            Ok(true) => self.rx.borrow_and_update().clone(),
            _ => None,
        }
    }

    /// Sequence number of the frame currently in the slot.
    pub fn current_sequence(&self) -> Option<u64> {
        self.rx.borrow().as_ref().map(|f| f.sequence)
    }

    /// Wait until a frame newer than the last observed one is published.
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Frame> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }
}

/// Create a connected publisher/slot pair.
pub fn frame_slot() -> (FramePublisher, FrameSlot) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx }, FrameSlot { rx })
}

/// Frame handler that persists requested snapshots and feeds the display.
pub struct FramePipeline {
    trigger: SnapshotTrigger,
    snapshot_path: PathBuf,
    saved_tx: mpsc::Sender<SnapshotSaved>,
    publisher: FramePublisher,
}

impl FramePipeline {
    pub fn new(
        trigger: SnapshotTrigger,
        snapshot_path: PathBuf,
        saved_tx: mpsc::Sender<SnapshotSaved>,
        publisher: FramePublisher,
    ) -> Self {
        Self {
            trigger,
            snapshot_path,
            saved_tx,
            publisher,
        }
    }

    /// Process one frame: persist it if a snapshot is pending, then publish.
    pub fn process(&mut self, frame: Frame) -> Result<(), SnapshotError> {
        if self.trigger.take() {
            write_snapshot(&frame, &self.snapshot_path)?;
            log::info!(
                "Saved frame {} to {}",
                frame.sequence,
                self.snapshot_path.display()
            );

            let notice = SnapshotSaved {
                path: self.snapshot_path.clone(),
                sequence: frame.sequence,
            };
            if let Err(mpsc::error::TrySendError::Full(_)) = self.saved_tx.try_send(notice) {
                log::warn!("Previous snapshot notice not yet consumed, dropping new notice");
            }
        }

        self.publisher.publish(frame);
        Ok(())
    }
}

impl FrameHandler for FramePipeline {
    fn handle_frame(&mut self, frame: Frame) -> Result<(), HandlerError> {
        self.process(frame).map_err(Into::into)
    }
}
