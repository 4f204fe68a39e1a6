//! Key bindings.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What a key press asks the application to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    StartCapture,
    StopCapture,
    SnapshotAndEvaluate,
    CreateProject,
    UploadImages,
    Train,
    NextDevice,
    ScrollUp,
    ScrollDown,
    DismissAlert,
    Quit,
    None,
}

/// Map a key event to an [`Action`].
///
/// While an alert is shown, only dismissal and quitting are accepted.
pub fn map_key(event: KeyEvent, alert_open: bool) -> Action {
    if event.kind == KeyEventKind::Release {
        return Action::None;
    }

    if event.modifiers.contains(KeyModifiers::CONTROL) {
        return match event.code {
            KeyCode::Char('c') | KeyCode::Char('C') => Action::Quit,
            _ => Action::None,
        };
    }

    if alert_open {
        return match event.code {
            KeyCode::Enter | KeyCode::Esc => Action::DismissAlert,
            KeyCode::Char('q') | KeyCode::Char('Q') => Action::Quit,
            _ => Action::None,
        };
    }

    match event.code {
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            's' => Action::StartCapture,
            'x' => Action::StopCapture,
            'e' => Action::SnapshotAndEvaluate,
            'c' => Action::CreateProject,
            'u' => Action::UploadImages,
            't' => Action::Train,
            'd' => Action::NextDevice,
            'q' => Action::Quit,
            _ => Action::None,
        },
        KeyCode::Esc => Action::Quit,
        KeyCode::Up | KeyCode::PageUp => Action::ScrollUp,
        KeyCode::Down | KeyCode::PageDown => Action::ScrollDown,
        _ => Action::None,
    }
}

/// One-line key reference for the status bar.
pub const KEY_HELP: &str =
    "s start  x stop  e snap+evaluate  c create  u upload  t train  d device  q quit";
