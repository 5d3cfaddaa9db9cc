use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    widgets::{Paragraph, Widget},
};
use std::time::Duration;

/// Counters shown in the `--debug` status line.
#[derive(Debug, Default)]
pub struct DebugState {
    pub enabled: bool,
    pub show_performance: bool,
    pub num_events: usize,
    pub num_frames: usize,
    pub last_key: Option<String>,
    pub last_render: Option<Duration>,
    pub last_task: Option<String>,
}

impl DebugState {
    pub fn on_key(&mut self, event: &KeyEvent) {
        if !self.enabled {
            return;
        }
        self.last_key = Some(describe_key(event));
    }

    pub fn on_render(&mut self, elapsed: Duration) {
        self.num_frames += 1;
        self.last_render = Some(elapsed);
    }

    pub fn status_line(&self) -> String {
        let mut parts = vec![
            format!("events: {}", self.num_events),
            format!("frames: {}", self.num_frames),
        ];
        if self.show_performance {
            if let Some(elapsed) = self.last_render {
                parts.push(format!("render: {:.1}ms", elapsed.as_secs_f64() * 1000.0));
            }
        }
        if let Some(key) = &self.last_key {
            parts.push(format!("key: {}", key));
        }
        if let Some(task) = &self.last_task {
            parts.push(format!("task: {}", task));
        }
        parts.join(" | ")
    }
}

fn describe_key(event: &KeyEvent) -> String {
    let key = match event.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        code => format!("{:?}", code),
    };
    let mut prefix = String::new();
    if event.modifiers.contains(KeyModifiers::CONTROL) {
        prefix.push_str("Ctrl+");
    }
    if event.modifiers.contains(KeyModifiers::ALT) {
        prefix.push_str("Alt+");
    }
    format!("{}{}", prefix, key)
}

impl Widget for &DebugState {
    fn render(self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.status_line())
            .style(Style::default().fg(Color::DarkGray))
            .render(area, buf);
    }
}
