//! Layout rendering.
//!
//! Pure functions over ratatui frames; no terminal state is managed here.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use super::app::App;
use super::input::KEY_HELP;
use super::preview;

/// Render the whole screen: preview, log pane, status bar and any alert.
pub fn draw(frame: &mut ratatui::Frame, app: &App) {
    let area = frame.area();
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)])
        .split(area);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[0]);

    render_preview(frame, app, panes[0]);
    render_log(frame, app, panes[1]);
    render_status_bar(frame, app, rows[1]);

    if let Some(message) = app.alert() {
        render_alert(frame, message, area);
    }
}

fn render_preview(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let title = match app.device() {
        Some(device) => format!(" Camera: {} ", device.name),
        None => " Camera ".to_string(),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = match app.frame() {
        Some(camera_frame) => preview::render_lines(camera_frame, inner.width, inner.height)
            .into_iter()
            .map(Line::from)
            .collect(),
        None if app.is_capturing() || app.is_opening() => {
            vec![Line::from("Waiting for frames...")]
        }
        None => vec![Line::from("Camera stopped. Press s to start.")],
    };
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().fg(Color::White)),
        inner,
    );
}

fn render_log(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Log ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let lines: Vec<Line> = app
        .log()
        .visible(inner.height as usize)
        .into_iter()
        .map(|line| {
            let text = line.trim_end_matches('\n').replace('\t', "    ");
            if text.contains("]: ERROR: ") {
                Line::styled(text, Style::default().fg(Color::Red))
            } else {
                Line::from(text)
            }
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), inner);
}

/// Status bar text: camera state, project, running operation and key help.
pub fn status_text(app: &App) -> String {
    let camera = if app.is_capturing() {
        "cam:on"
    } else if app.is_opening() {
        "cam:opening"
    } else {
        "cam:off"
    };
    let project = app.project().unwrap_or("no project");
    let busy = app.busy().map(|b| format!("{}... | ", b)).unwrap_or_default();
    format!(" {} | {} | {}{} ", camera, project, busy, KEY_HELP)
}

fn render_status_bar(frame: &mut ratatui::Frame, app: &App, area: Rect) {
    let paragraph = Paragraph::new(status_text(app))
        .style(Style::default().fg(Color::Black).bg(Color::White));
    frame.render_widget(paragraph, area);
}

fn render_alert(frame: &mut ratatui::Frame, message: &str, area: Rect) {
    let popup = centered_rect(area, 60, 7);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Error ")
        .title_bottom(" Enter to dismiss ");
    let paragraph = Paragraph::new(message.to_string())
        .block(block)
        .style(Style::default().add_modifier(Modifier::BOLD))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, popup);
}

/// A rect of `percent_x`% width and `height` rows centered in `area`.
pub fn centered_rect(area: Rect, percent_x: u16, height: u16) -> Rect {
    let width = (area.width as u32 * percent_x.min(100) as u32 / 100) as u16;
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
