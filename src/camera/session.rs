//! Capture session: owns a frame source on a background thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc::UnboundedSender;

use super::source::{FrameSource, NokhwaSource};
use super::types::{CameraError, CameraSettings, Frame, Resolution};

/// Error type returned by frame handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receives every frame delivered by a capture session, in arrival order.
///
/// Runs on the capture thread. Returning an error stops the session and
/// emits [`CaptureEvent::Fault`].
pub trait FrameHandler: Send + 'static {
    fn handle_frame(&mut self, frame: Frame) -> Result<(), HandlerError>;
}

impl<F> FrameHandler for F
where
    F: FnMut(Frame) -> Result<(), HandlerError> + Send + 'static,
{
    fn handle_frame(&mut self, frame: Frame) -> Result<(), HandlerError> {
        self(frame)
    }
}

/// Identifies one capture session for the lifetime of the process.
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle notifications sent from the capture thread.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// The source opened and frames are flowing.
    Started { resolution: Resolution },
    /// Frame handling failed; the session has stopped itself.
    Fault(String),
    /// The capture thread exited.
    Stopped,
}

/// A [`CaptureEvent`] tagged with the session that produced it.
///
/// Events of a session that was already replaced can still be queued, so
/// receivers compare `session` against the session they hold.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: CaptureEvent,
}

/// A running capture session.
///
/// Dropping the session stops it.
pub struct CaptureSession {
    id: SessionId,
    stop_signal: Arc<AtomicBool>,
    capture_thread: Option<JoinHandle<()>>,
    resolution: Resolution,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("resolution", &self.resolution)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Start capturing from the nokhwa camera described by `settings`.
    pub fn start_camera<H: FrameHandler>(
        settings: CameraSettings,
        handler: H,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, CameraError> {
        Self::start(move || NokhwaSource::open(&settings), handler, events)
    }

    /// Start frame delivery from the source built by `open`.
    ///
    /// `open` runs on the capture thread. This call blocks until the source
    /// has opened, so open failures are returned here rather than as events.
    /// Async callers should run it on a blocking thread.
    pub fn start<F, S, H>(
        open: F,
        handler: H,
        events: UnboundedSender<SessionEvent>,
    ) -> Result<Self, CameraError>
    where
        F: FnOnce() -> Result<S, CameraError> + Send + 'static,
        S: FrameSource,
        H: FrameHandler,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&stop_signal);
        let (info_tx, info_rx) = mpsc::channel::<Result<Resolution, CameraError>>();

        let handle = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let source = match open() {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = info_tx.send(Err(e));
                        return;
                    }
                };
                let resolution = source.resolution();
                let _ = info_tx.send(Ok(resolution));
                let notify = |event: CaptureEvent| {
                    let _ = events.send(SessionEvent { session: id, event });
                };
                notify(CaptureEvent::Started { resolution });

                run_capture_loop(source, handler, &stop, &notify);
                notify(CaptureEvent::Stopped);
            })
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        match info_rx.recv() {
            Ok(Ok(resolution)) => Ok(Self {
                id,
                stop_signal,
                capture_thread: Some(handle),
                resolution,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(CameraError::StreamFailed(
                    "Capture thread terminated unexpectedly".to_string(),
                ))
            }
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Resolution negotiated by the source.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Signal the capture thread to halt and wait for it to finish.
    ///
    /// The frame handler is dropped with the thread, so no further frames are
    /// delivered after this returns. Waiting can take as long as one frame
    /// read; async callers should stop from a blocking thread.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.capture_thread.take() {
            if handle.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }

    /// Whether the capture thread is still delivering frames.
    pub fn is_running(&self) -> bool {
        self.capture_thread
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pull frames until stopped or faulted.
fn run_capture_loop<S: FrameSource, H: FrameHandler>(
    mut source: S,
    mut handler: H,
    stop: &AtomicBool,
    notify: &dyn Fn(CaptureEvent),
) {
    let mut sequence = 0u64;

    while !stop.load(Ordering::SeqCst) {
        let result = match source.next_frame() {
            Ok(Some(mut frame)) => {
                sequence += 1;
                frame.sequence = sequence;
                handler.handle_frame(frame)
            }
            Ok(None) => continue,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            log::error!("Capture fault on frame {}: {}", sequence, e);
            notify(CaptureEvent::Fault(format!("Error on new frame:\n{}", e)));
            break;
        }
    }

    source.close();
}
