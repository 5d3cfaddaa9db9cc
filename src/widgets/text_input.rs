use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    widgets::Widget,
};
use tui_textarea::{CursorMove, Input, Key, TextArea};

use crate::config::Theme;

/// Event emitted by TextInput widget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextInputEvent {
    None,
    Submit,
    Cancel,
}

/// Single-line text input wrapping tui-textarea
pub struct TextInput {
    textarea: TextArea<'static>,
    text_color: Option<Color>,
    focused: bool,
}

impl TextInput {
    pub fn new() -> Self {
        let mut input = Self {
            textarea: TextArea::default(),
            text_color: None,
            focused: false,
        };
        input.apply_style();
        input
    }

    pub fn with_theme(mut self, theme: &Theme) -> Self {
        self.text_color = Some(theme.get("text_primary"));
        self.apply_style();
        self
    }

    fn apply_style(&mut self) {
        let mut style = Style::default();
        if let Some(color) = self.text_color {
            style = style.fg(color);
        }
        self.textarea.set_style(style);
        self.textarea.set_cursor_line_style(Style::default());
        self.set_focused(self.focused);
    }

    pub fn set_focused(&mut self, focused: bool) {
        self.focused = focused;
        if focused {
            self.textarea
                .set_cursor_style(Style::default().add_modifier(Modifier::REVERSED));
        } else {
            // same style as the text hides the cursor
            let style = self.textarea.style();
            self.textarea.set_cursor_style(style);
        }
    }

    pub fn value(&self) -> &str {
        self.textarea
            .lines()
            .first()
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Replace the text and put the cursor at its end.
    pub fn set_value(&mut self, value: &str) {
        let single_line = value.replace(['\n', '\r'], " ");
        self.textarea = TextArea::new(vec![single_line]);
        self.apply_style();
        self.textarea.move_cursor(CursorMove::End);
    }

    pub fn clear(&mut self) {
        self.set_value("");
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> TextInputEvent {
        match event.code {
            KeyCode::Enter => TextInputEvent::Submit,
            KeyCode::Esc => TextInputEvent::Cancel,
            _ => {
                let input = key_event_to_input(event);
                if !matches!(input.key, Key::Null | Key::Char('\n') | Key::Char('\r')) {
                    self.textarea.input(input);
                }
                TextInputEvent::None
            }
        }
    }
}

fn key_event_to_input(event: &KeyEvent) -> Input {
    let key = match event.code {
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        _ => Key::Null,
    };
    Input {
        key,
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
    }
}

impl Default for TextInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Widget for &TextInput {
    fn render(self, area: Rect, buf: &mut ratatui::buffer::Buffer) {
        self.textarea.render(area, buf);

        // tui-textarea underlines the cursor line
        buf.set_style(area, Style::default().remove_modifier(Modifier::UNDERLINED));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_text_input_new() {
        let input = TextInput::new();
        assert_eq!(input.value(), "");
    }

    #[test]
    fn test_set_value_moves_cursor_to_end() {
        let mut input = TextInput::new();
        input.set_value("hello");
        input.handle_key(&key(KeyCode::Char('!')));
        assert_eq!(input.value(), "hello!");
    }

    #[test]
    fn test_typing_and_backspace() {
        let mut input = TextInput::new();
        input.set_value("ab");
        assert_eq!(input.handle_key(&key(KeyCode::Char('c'))), TextInputEvent::None);
        input.handle_key(&key(KeyCode::Backspace));
        input.handle_key(&key(KeyCode::Char('d')));
        assert_eq!(input.value(), "abd");
    }

    #[test]
    fn test_submit_and_cancel() {
        let mut input = TextInput::new();
        assert_eq!(input.handle_key(&key(KeyCode::Enter)), TextInputEvent::Submit);
        assert_eq!(input.handle_key(&key(KeyCode::Esc)), TextInputEvent::Cancel);
    }

    #[test]
    fn test_clear() {
        let mut input = TextInput::new();
        input.set_value("hello");
        input.clear();
        assert_eq!(input.value(), "");
    }
}
