//! Terminal user interface.
//!
//! Live ASCII camera preview on the left, the activity log on the right, a
//! status bar with key help at the bottom, and a popup for blocking alerts.

mod app;
mod input;
mod preview;
mod render;
mod tui;

pub use app::{
    app_channels, event_loop, App, AppReceivers, AppSenders, OpenedSession, RemoteOp, TaskDone,
};
pub use input::{map_key, Action, KEY_HELP};
pub use preview::render_lines;
pub use tui::Tui;

use std::io;

use crate::camera;
use crate::cli::build_service;
use crate::config::Config;
use crate::log_sink::LogSink;

/// Run the interactive application until the user quits.
pub async fn run(config: Config) -> io::Result<()> {
    let log = LogSink::new();
    let service = build_service(&config).map_err(|e| e.to_string());
    let (senders, receivers) = app_channels();

    let mut app = App::new(config, log, service, senders);
    app.startup(camera::list_devices());

    let mut tui = Tui::new()?;
    let result = event_loop(&mut app, &mut tui, receivers).await;

    app.shutdown();
    tui.restore()?;
    result
}
