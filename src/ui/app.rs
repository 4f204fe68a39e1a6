//! Application state and the event loop driving it.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use super::input::{map_key, Action};
use super::render;
use super::tui::Tui;
use crate::camera::{
    self, CameraError, CameraInfo, CaptureEvent, CaptureSession, Frame, SessionEvent,
};
use crate::config::Config;
use crate::log_sink::LogSink;
use crate::snapshot::{frame_slot, FramePipeline, FrameSlot, SnapshotSaved, SnapshotTrigger};
use crate::vision::{ProjectWorkflow, VisionService, WorkflowError};

/// Preview refresh interval (~15 FPS).
const TICK: Duration = Duration::from_millis(67);

/// A remote operation run against the shared workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    CreateProject,
    UploadImages,
    Train,
    Predict(PathBuf),
}

impl RemoteOp {
    pub fn label(&self) -> &'static str {
        match self {
            RemoteOp::CreateProject => "Creating project",
            RemoteOp::UploadImages => "Uploading",
            RemoteOp::Train => "Training",
            RemoteOp::Predict(_) => "Predicting",
        }
    }

    async fn execute(self, workflow: &mut ProjectWorkflow) -> Result<(), WorkflowError> {
        match self {
            RemoteOp::CreateProject => workflow.create_project().await.map(|_| ()),
            RemoteOp::UploadImages => workflow.upload_images().await.map(|_| ()),
            RemoteOp::Train => workflow.train().await.map(|_| ()),
            RemoteOp::Predict(path) => workflow.predict_file(&path).await.map(|_| ()),
        }
    }
}

/// Sent by a remote task when it finishes, successful or not.
#[derive(Debug)]
pub struct TaskDone {
    pub label: &'static str,
    /// Project name, or its id when the details were never fetched
    pub project: Option<String>,
}

/// A camera opened on a blocking thread, tagged with the request it answers.
pub struct OpenedSession {
    ticket: u64,
    result: Result<(CaptureSession, FrameSlot), CameraError>,
}

/// Sending halves handed to capture sessions and background tasks.
#[derive(Clone)]
pub struct AppSenders {
    pub saved: mpsc::Sender<SnapshotSaved>,
    pub capture: UnboundedSender<SessionEvent>,
    pub opened: UnboundedSender<OpenedSession>,
    pub tasks: UnboundedSender<TaskDone>,
}

/// Receiving halves polled by the event loop.
pub struct AppReceivers {
    pub saved: mpsc::Receiver<SnapshotSaved>,
    pub capture: UnboundedReceiver<SessionEvent>,
    pub opened: UnboundedReceiver<OpenedSession>,
    pub tasks: UnboundedReceiver<TaskDone>,
}

/// Create the channels connecting the app to its background work.
pub fn app_channels() -> (AppSenders, AppReceivers) {
    let (saved_tx, saved_rx) = crate::snapshot::snapshot_channel();
    let (capture_tx, capture_rx) = mpsc::unbounded_channel();
    let (opened_tx, opened_rx) = mpsc::unbounded_channel();
    let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
    (
        AppSenders {
            saved: saved_tx,
            capture: capture_tx,
            opened: opened_tx,
            tasks: tasks_tx,
        },
        AppReceivers {
            saved: saved_rx,
            capture: capture_rx,
            opened: opened_rx,
            tasks: tasks_rx,
        },
    )
}

/// Stop `session` without blocking the event loop on the capture thread.
fn stop_in_background(mut session: CaptureSession) {
    tokio::task::spawn_blocking(move || session.stop());
}

pub struct App {
    config: Config,
    log: LogSink,
    senders: AppSenders,
    devices: Vec<CameraInfo>,
    selected: usize,
    session: Option<CaptureSession>,
    /// Ticket of the camera open still in flight
    opening: Option<u64>,
    next_ticket: u64,
    slot: Option<FrameSlot>,
    frame: Option<Frame>,
    trigger: SnapshotTrigger,
    /// `Err` holds why remote operations are unavailable
    workflow: Result<Arc<Mutex<ProjectWorkflow>>, String>,
    project: Option<String>,
    busy: Option<&'static str>,
    alert: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new(
        config: Config,
        log: LogSink,
        service: Result<Arc<dyn VisionService>, String>,
        senders: AppSenders,
    ) -> Self {
        let workflow = service.map(|service| {
            Arc::new(Mutex::new(ProjectWorkflow::new(
                service,
                config.workflow_settings(),
                log.clone(),
            )))
        });

        Self {
            config,
            log,
            senders,
            devices: Vec::new(),
            selected: 0,
            session: None,
            opening: None,
            next_ticket: 0,
            slot: None,
            frame: None,
            trigger: SnapshotTrigger::new(),
            workflow,
            project: None,
            busy: None,
            alert: None,
            should_quit: false,
        }
    }

    /// Load the device list and attach to the configured project, if any.
    pub fn startup(&mut self, devices: Result<Vec<CameraInfo>, CameraError>) {
        match devices {
            Ok(devices) if !devices.is_empty() => {
                let preferred = camera::select_default(&devices, self.config.camera.device)
                    .map(|d| d.index);
                self.selected = devices
                    .iter()
                    .position(|d| Some(d.index) == preferred)
                    .unwrap_or(0);
                for device in &devices {
                    log::info!("Found camera {}", device);
                }
                self.devices = devices;
                if let Some(device) = self.device() {
                    self.log.log(format!("Selected camera {}", device.name));
                }
            }
            Ok(_) => self.show_alert(CameraError::NoDevices.to_string()),
            Err(e) => {
                log::error!("Device query failed: {}", e);
                self.show_alert(CameraError::NoDevices.to_string());
            }
        }

        match &self.workflow {
            Ok(workflow) => {
                if let Some(project_id) = self.config.vision.project_id {
                    match workflow.try_lock() {
                        Ok(mut workflow) => {
                            workflow.use_project_id(project_id);
                            self.project = workflow.project_label();
                        }
                        Err(_) => log::warn!("Workflow busy at startup, project not set"),
                    }
                }
            }
            Err(reason) => self
                .log
                .error(format!("Remote operations unavailable: {}", reason)),
        }
    }

    pub fn handle_action(&mut self, action: Action) {
        match action {
            Action::StartCapture => self.start_capture(),
            Action::StopCapture => self.stop_capture(),
            Action::SnapshotAndEvaluate => self.snapshot_and_evaluate(),
            Action::CreateProject => self.spawn_remote(RemoteOp::CreateProject),
            Action::UploadImages => self.spawn_remote(RemoteOp::UploadImages),
            Action::Train => self.spawn_remote(RemoteOp::Train),
            Action::NextDevice => self.next_device(),
            Action::ScrollUp => self.log.scroll_up(1),
            Action::ScrollDown => self.log.scroll_down(1),
            Action::DismissAlert => self.alert = None,
            Action::Quit => self.should_quit = true,
            Action::None => {}
        }
    }

    /// Open the selected camera on a blocking thread.
    ///
    /// The session is installed when [`OpenedSession`] comes back.
    fn start_capture(&mut self) {
        if self.session.is_some() || self.opening.is_some() {
            self.log.log("Camera already running");
            return;
        }
        let Some(device) = self.device().cloned() else {
            self.show_alert(CameraError::NoDevices.to_string());
            return;
        };

        let mut settings = self.config.camera_settings();
        settings.device_index = device.index;

        let (publisher, slot) = frame_slot();
        let pipeline = FramePipeline::new(
            self.trigger.clone(),
            self.config.snapshot_path(),
            self.senders.saved.clone(),
            publisher,
        );

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.opening = Some(ticket);

        let events = self.senders.capture.clone();
        let opened = self.senders.opened.clone();
        tokio::task::spawn_blocking(move || {
            let result = CaptureSession::start_camera(settings, pipeline, events)
                .map(|session| (session, slot));
            let _ = opened.send(OpenedSession { ticket, result });
        });
    }

    /// Install a freshly opened session, unless it was cancelled meanwhile.
    pub fn on_session_opened(&mut self, opened: OpenedSession) {
        if self.opening != Some(opened.ticket) {
            if let Ok((session, _)) = opened.result {
                log::debug!("Discarding camera session {} opened after cancel", session.id());
                stop_in_background(session);
            }
            return;
        }

        self.opening = None;
        match opened.result {
            Ok((session, slot)) => {
                self.session = Some(session);
                self.slot = Some(slot);
            }
            Err(e) => self.show_alert(e.to_string()),
        }
    }

    fn stop_capture(&mut self) {
        self.opening = None;
        if let Some(session) = self.session.take() {
            stop_in_background(session);
            self.log.log("Camera stopped");
        }
        self.slot = None;
        self.frame = None;
    }

    fn snapshot_and_evaluate(&mut self) {
        if self.session.is_none() {
            self.log.error("Start the camera before taking a snapshot");
            return;
        }
        if self.trigger.request() {
            self.log.log("I just snapped a picture.");
        } else {
            self.log.log("Snapshot already pending");
        }
    }

    fn next_device(&mut self) {
        if self.devices.is_empty() {
            self.show_alert(CameraError::NoDevices.to_string());
            return;
        }
        self.selected = (self.selected + 1) % self.devices.len();
        if let Some(device) = self.device() {
            self.log.log(format!("Selected camera {}", device.name));
        }
        if self.session.is_some() || self.opening.is_some() {
            self.stop_capture();
            self.start_capture();
        }
    }

    /// Run `op` on a spawned task. Refused while another operation holds the workflow.
    pub fn spawn_remote(&mut self, op: RemoteOp) {
        let workflow = match &self.workflow {
            Ok(workflow) => Arc::clone(workflow),
            Err(reason) => {
                self.log
                    .error(format!("{} unavailable: {}", op.label(), reason));
                return;
            }
        };

        let mut guard = match workflow.try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                self.log.log(format!(
                    "busy: {} still running, ignoring {}",
                    self.busy.unwrap_or("another operation"),
                    op.label()
                ));
                return;
            }
        };

        let label = op.label();
        self.busy = Some(label);
        let log = self.log.clone();
        let done = self.senders.tasks.clone();

        tokio::spawn(async move {
            if let Err(e) = op.execute(&mut guard).await {
                log.error(e.to_string());
            }
            let project = guard.project_label();
            drop(guard);
            let _ = done.send(TaskDone { label, project });
        });
    }

    pub fn on_task_done(&mut self, done: TaskDone) {
        log::debug!("{} finished", done.label);
        if self.busy == Some(done.label) {
            self.busy = None;
        }
        self.project = done.project;
    }

    pub fn on_capture_event(&mut self, notice: SessionEvent) {
        let current = self.session.as_ref().map(CaptureSession::id);
        if current != Some(notice.session) {
            log::debug!(
                "Ignoring {:?} from replaced session {}",
                notice.event,
                notice.session
            );
            return;
        }

        match notice.event {
            CaptureEvent::Started { resolution } => {
                let name = self.device().map(|d| d.name.clone()).unwrap_or_default();
                self.log.log(format!(
                    "Capturing from {} at {}x{}",
                    name, resolution.width, resolution.height
                ));
            }
            CaptureEvent::Fault(message) => {
                self.stop_capture();
                self.show_alert(message);
            }
            CaptureEvent::Stopped => self.stop_capture(),
        }
    }

    /// A snapshot landed on disk: classify exactly that file.
    pub fn on_snapshot_saved(&mut self, saved: SnapshotSaved) {
        log::debug!("Snapshot {} ready at {}", saved.sequence, saved.path.display());
        self.spawn_remote(RemoteOp::Predict(saved.path));
    }

    /// Pull the latest frame from the display slot.
    pub fn refresh_frame(&mut self) {
        if let Some(frame) = self.slot.as_mut().and_then(FrameSlot::take_new) {
            self.frame = Some(frame);
        }
    }

    fn show_alert(&mut self, message: String) {
        self.log.error(&message);
        self.alert = Some(message);
    }

    /// Stop capture and wait for the capture thread. In-flight remote tasks
    /// are dropped with the runtime.
    pub fn shutdown(&mut self) {
        self.opening = None;
        if let Some(mut session) = self.session.take() {
            session.stop();
        }
        self.slot = None;
        self.frame = None;
    }

    pub fn device(&self) -> Option<&CameraInfo> {
        self.devices.get(self.selected)
    }

    pub fn frame(&self) -> Option<&Frame> {
        self.frame.as_ref()
    }

    pub fn log(&self) -> &LogSink {
        &self.log
    }

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn busy(&self) -> Option<&'static str> {
        self.busy
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_opening(&self) -> bool {
        self.opening.is_some()
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }
}

/// Drive the app until the user quits.
///
/// Handles terminal input, camera opens, capture events, snapshot notices,
/// finished remote tasks and the preview tick concurrently.
pub async fn event_loop(app: &mut App, tui: &mut Tui, mut rx: AppReceivers) -> io::Result<()> {
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    while !app.should_quit() {
        tui.terminal().draw(|frame| render::draw(frame, app))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) => app.handle_action(map_key(key, app.alert().is_some())),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => break,
            },
            Some(opened) = rx.opened.recv() => app.on_session_opened(opened),
            Some(event) = rx.capture.recv() => app.on_capture_event(event),
            Some(saved) = rx.saved.recv() => app.on_snapshot_saved(saved),
            Some(done) = rx.tasks.recv() => app.on_task_done(done),
            _ = tick.tick() => app.refresh_frame(),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{FrameSource, Resolution};
    use crate::vision::{
        ImageCreateSummary, ImageFileCreateBatch, ImagePrediction, Iteration, IterationStatus,
        Prediction, Project, Tag, VisionError,
    };
    use async_trait::async_trait;
    use tokio::sync::Notify;
    use uuid::Uuid;

    const PROJECT_ID: Uuid = Uuid::from_u128(0x5eed);

    fn camera(index: u32) -> CameraInfo {
        CameraInfo {
            index,
            name: format!("Cam {}", index),
            description: String::new(),
            moniker: format!("/dev/video{}", index),
        }
    }

    fn offline_app() -> (App, AppReceivers) {
        let (senders, receivers) = app_channels();
        let app = App::new(
            Config::default(),
            LogSink::new(),
            Err("no keys".to_string()),
            senders,
        );
        (app, receivers)
    }

    /// Records calls by name. Training waits until `release_training` fires.
    #[derive(Default)]
    struct GatedService {
        calls: std::sync::Mutex<Vec<&'static str>>,
        predicted: std::sync::Mutex<Vec<Vec<u8>>>,
        release_training: Notify,
    }

    impl GatedService {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn project(id: Uuid, name: &str) -> Project {
        Project {
            id,
            name: name.to_string(),
            description: None,
            created: None,
            last_modified: None,
        }
    }

    fn iteration(status: IterationStatus) -> Iteration {
        Iteration {
            id: Uuid::from_u128(0x17),
            name: "Iteration 1".to_string(),
            is_default: false,
            status,
            project_id: Some(PROJECT_ID),
            created: None,
            last_modified: None,
            trained_at: None,
        }
    }

    #[async_trait]
    impl VisionService for GatedService {
        async fn create_project(&self, name: &str) -> Result<Project, VisionError> {
            self.record("create_project");
            Ok(project(PROJECT_ID, name))
        }

        async fn get_project(&self, project_id: Uuid) -> Result<Project, VisionError> {
            self.record("get_project");
            Ok(project(project_id, "existing"))
        }

        async fn create_tag(&self, _project_id: Uuid, name: &str) -> Result<Tag, VisionError> {
            self.record("create_tag");
            Ok(Tag {
                id: Uuid::from_u128(if name == "valid" { 1 } else { 2 }),
                name: name.to_string(),
                description: None,
                image_count: 0,
            })
        }

        async fn get_tags(&self, _project_id: Uuid) -> Result<Vec<Tag>, VisionError> {
            self.record("get_tags");
            Ok(Vec::new())
        }

        async fn upload_image(
            &self,
            _project_id: Uuid,
            _image: Vec<u8>,
            _tag_ids: &[Uuid],
        ) -> Result<ImageCreateSummary, VisionError> {
            self.record("upload_image");
            Ok(ImageCreateSummary {
                is_batch_successful: true,
                images: Vec::new(),
            })
        }

        async fn upload_image_batch(
            &self,
            _project_id: Uuid,
            _batch: ImageFileCreateBatch,
        ) -> Result<ImageCreateSummary, VisionError> {
            self.record("upload_image_batch");
            Ok(ImageCreateSummary {
                is_batch_successful: true,
                images: Vec::new(),
            })
        }

        async fn train_project(&self, _project_id: Uuid) -> Result<Iteration, VisionError> {
            self.record("train_project");
            self.release_training.notified().await;
            Ok(iteration(IterationStatus::Completed))
        }

        async fn get_iteration(
            &self,
            _project_id: Uuid,
            _iteration_id: Uuid,
        ) -> Result<Iteration, VisionError> {
            self.record("get_iteration");
            Ok(iteration(IterationStatus::Completed))
        }

        async fn update_iteration(
            &self,
            _project_id: Uuid,
            iteration: &Iteration,
        ) -> Result<Iteration, VisionError> {
            self.record("update_iteration");
            Ok(iteration.clone())
        }

        async fn predict_image(
            &self,
            project_id: Uuid,
            image: Vec<u8>,
            iteration_id: Option<Uuid>,
        ) -> Result<ImagePrediction, VisionError> {
            self.record("predict_image");
            self.predicted.lock().unwrap().push(image);
            Ok(ImagePrediction {
                id: None,
                project: Some(project_id),
                iteration: iteration_id,
                predictions: vec![Prediction {
                    probability: 0.91,
                    tag_id: Uuid::from_u128(1),
                    tag_name: "valid".to_string(),
                }],
            })
        }
    }

    fn online_app(service: &Arc<GatedService>, project_id: Option<Uuid>) -> (App, AppReceivers) {
        let (senders, receivers) = app_channels();
        let mut config = Config::default();
        config.vision.project_id = project_id;
        let service: Arc<dyn VisionService> = service.clone();
        let mut app = App::new(config, LogSink::new(), Ok(service), senders);
        app.startup(Ok(vec![camera(0)]));
        (app, receivers)
    }

    async fn next_done(rx: &mut AppReceivers) -> TaskDone {
        tokio::time::timeout(Duration::from_secs(5), rx.tasks.recv())
            .await
            .expect("remote task should finish")
            .expect("task channel open")
    }

    /// Opens instantly and never yields a frame.
    struct IdleSource;

    impl FrameSource for IdleSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(None)
        }

        fn resolution(&self) -> Resolution {
            Resolution::MEDIUM
        }
    }

    fn idle_session(app: &App) -> (CaptureSession, FrameSlot) {
        let (publisher, slot) = frame_slot();
        let pipeline = FramePipeline::new(
            app.trigger.clone(),
            std::env::temp_dir().join("visionsnap-idle.jpg"),
            app.senders.saved.clone(),
            publisher,
        );
        let session =
            CaptureSession::start(|| Ok(IdleSource), pipeline, app.senders.capture.clone())
                .unwrap();
        (session, slot)
    }

    fn install_session(app: &mut App) -> u64 {
        let (session, slot) = idle_session(app);
        let id = session.id();
        app.next_ticket += 1;
        app.opening = Some(app.next_ticket);
        app.on_session_opened(OpenedSession {
            ticket: app.next_ticket,
            result: Ok((session, slot)),
        });
        id
    }

    #[test]
    fn test_no_devices_raises_alert() {
        let (mut app, _rx) = offline_app();
        app.startup(Ok(Vec::new()));
        assert_eq!(app.alert(), Some("No video sources found"));

        app.handle_action(Action::StartCapture);
        assert!(!app.is_capturing());
        assert!(!app.is_opening());

        app.handle_action(Action::DismissAlert);
        assert!(app.alert().is_none());
    }

    #[test]
    fn test_configured_device_is_selected() {
        let (senders, _rx) = app_channels();
        let mut config = Config::default();
        config.camera.device = 2;
        let mut app = App::new(config, LogSink::new(), Err("offline".into()), senders);

        app.startup(Ok(vec![camera(0), camera(2)]));
        assert_eq!(app.device().map(|d| d.index), Some(2));

        app.handle_action(Action::NextDevice);
        assert_eq!(app.device().map(|d| d.index), Some(0));
    }

    #[test]
    fn test_snapshot_requires_running_camera() {
        let (mut app, _rx) = offline_app();
        app.startup(Ok(vec![camera(0)]));
        app.handle_action(Action::SnapshotAndEvaluate);
        assert!(!app.trigger.is_pending());
        assert!(app.log().text().contains("ERROR: Start the camera"));
    }

    #[test]
    fn test_remote_action_without_service_is_logged() {
        let (mut app, _rx) = offline_app();
        app.handle_action(Action::Train);
        assert!(app.busy().is_none());
        assert!(app.log().text().contains("Training unavailable: no keys"));
    }

    #[test]
    fn test_quit() {
        let (mut app, _rx) = offline_app();
        app.handle_action(Action::Quit);
        assert!(app.should_quit());
    }

    #[tokio::test]
    async fn test_configured_project_is_used_without_remote_calls() {
        let service = Arc::new(GatedService::default());
        let (app, _rx) = online_app(&service, Some(PROJECT_ID));

        let expected = PROJECT_ID.to_string();
        assert_eq!(app.project(), Some(expected.as_str()));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_remote_action_refused_while_busy() {
        let service = Arc::new(GatedService::default());
        let (mut app, mut rx) = online_app(&service, Some(PROJECT_ID));

        app.handle_action(Action::Train);
        assert_eq!(app.busy(), Some("Training"));

        app.handle_action(Action::CreateProject);
        assert!(app
            .log()
            .text()
            .contains("busy: Training still running, ignoring Creating project"));

        service.release_training.notify_one();
        let done = next_done(&mut rx).await;
        assert_eq!(done.label, "Training");
        app.on_task_done(done);

        assert!(app.busy().is_none());
        assert_eq!(service.calls(), vec!["train_project", "update_iteration"]);
    }

    #[tokio::test]
    async fn test_task_done_clears_busy_and_sets_project() {
        let service = Arc::new(GatedService::default());
        let (mut app, mut rx) = online_app(&service, None);
        assert!(app.project().is_none());

        app.handle_action(Action::CreateProject);
        assert_eq!(app.busy(), Some("Creating project"));

        let done = next_done(&mut rx).await;
        app.on_task_done(done);
        assert!(app.busy().is_none());
        assert_eq!(app.project(), Some("planogram3"));
    }

    #[tokio::test]
    async fn test_saved_snapshot_is_predicted_once() {
        let service = Arc::new(GatedService::default());
        let (mut app, mut rx) = online_app(&service, Some(PROJECT_ID));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evaluated.jpg");
        std::fs::write(&path, b"jpeg-bytes").unwrap();

        app.on_snapshot_saved(SnapshotSaved {
            path: path.clone(),
            sequence: 12,
        });
        let done = next_done(&mut rx).await;
        assert_eq!(done.label, "Predicting");

        assert_eq!(service.calls(), vec!["predict_image"]);
        assert_eq!(*service.predicted.lock().unwrap(), vec![b"jpeg-bytes".to_vec()]);
        assert!(app.log().text().contains("]: \tvalid: 91.0%\n"));
    }

    #[tokio::test]
    async fn test_fault_from_current_session_raises_alert() {
        let (mut app, _rx) = offline_app();
        let id = install_session(&mut app);
        assert!(app.is_capturing());

        app.on_capture_event(SessionEvent {
            session: id,
            event: CaptureEvent::Fault("Error on new frame:\ndisk full".into()),
        });
        assert_eq!(app.alert(), Some("Error on new frame:\ndisk full"));
        assert!(!app.is_capturing());
    }

    #[tokio::test]
    async fn test_events_from_replaced_session_are_ignored() {
        let (mut app, _rx) = offline_app();
        let old = install_session(&mut app);
        app.handle_action(Action::StopCapture);
        let current = install_session(&mut app);
        assert_ne!(old, current);

        app.on_capture_event(SessionEvent {
            session: old,
            event: CaptureEvent::Fault("Error on new frame:\nold".into()),
        });
        app.on_capture_event(SessionEvent {
            session: old,
            event: CaptureEvent::Stopped,
        });

        assert!(app.is_capturing());
        assert!(app.alert().is_none());
        app.shutdown();
    }

    #[tokio::test]
    async fn test_open_finishing_after_stop_is_discarded() {
        let (mut app, _rx) = offline_app();
        let (session, slot) = idle_session(&app);
        app.opening = Some(7);
        app.handle_action(Action::StopCapture);
        assert!(!app.is_opening());

        app.on_session_opened(OpenedSession {
            ticket: 7,
            result: Ok((session, slot)),
        });
        assert!(!app.is_capturing());
    }
}
