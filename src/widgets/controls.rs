use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    widgets::{Paragraph, Widget},
};

/// Bottom bar of key hints with an optional right-aligned summary.
#[derive(Default)]
pub struct Controls {
    pub hints: Vec<(String, String)>,
    pub summary: Option<String>,
    pub dimmed: bool,
    pub key_color: Option<Color>,
    pub background: Option<Color>,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hints<K, L>(hints: impl IntoIterator<Item = (K, L)>) -> Self
    where
        K: Into<String>,
        L: Into<String>,
    {
        Self {
            hints: hints
                .into_iter()
                .map(|(k, l)| (k.into(), l.into()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_dimmed(mut self, dimmed: bool) -> Self {
        self.dimmed = dimmed;
        self
    }

    pub fn with_colors(mut self, key_color: Color, background: Color) -> Self {
        self.key_color = Some(key_color);
        self.background = Some(background);
        self
    }
}

impl Widget for &Controls {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut constraints = self.hints.iter().fold(vec![], |mut acc, (key, action)| {
            acc.push(Constraint::Length(key.chars().count() as u16 + 2));
            acc.push(Constraint::Length(action.chars().count() as u16 + 1));
            acc
        });
        constraints.push(Constraint::Fill(1));
        if let Some(summary) = &self.summary {
            constraints.push(Constraint::Length(summary.chars().count() as u16 + 1));
        }

        let layout = Layout::new(Direction::Horizontal, constraints).split(area);
        let background = self.background.unwrap_or(Color::DarkGray);

        // Busy state greys out every hint
        let base_style = if self.dimmed {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        let key_style = match (self.dimmed, self.key_color) {
            (false, Some(color)) => base_style.fg(color).bold(),
            _ => base_style.bold(),
        };

        for (i, (key, action)) in self.hints.iter().enumerate() {
            let j = i * 2;
            Paragraph::new(key.as_str())
                .style(key_style)
                .centered()
                .render(layout[j], buf);
            Paragraph::new(action.as_str())
                .style(base_style.bg(background))
                .render(layout[j + 1], buf);
        }

        let fill_idx = self.hints.len() * 2;
        Paragraph::new("")
            .style(base_style.bg(background))
            .render(layout[fill_idx], buf);

        if let Some(summary) = &self.summary {
            Paragraph::new(summary.as_str())
                .style(base_style.bg(background).fg(if self.dimmed {
                    Color::DarkGray
                } else {
                    Color::White
                }))
                .right_aligned()
                .render(layout[fill_idx + 1], buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect()
    }

    #[test]
    fn test_renders_hints_and_summary() {
        let controls = Controls::with_hints([("q", "Quit"), ("i", "Import")])
            .with_summary("Page 1/3");
        let area = Rect::new(0, 0, 40, 1);
        let mut buf = Buffer::empty(area);
        (&controls).render(area, &mut buf);
        let text = line(&buf, 0);
        assert!(text.contains("Quit"));
        assert!(text.contains("Import"));
        assert!(text.trim_end().ends_with("Page 1/3"));
    }

    #[test]
    fn test_dimmed_keys_are_gray() {
        let controls = Controls::with_hints([("q", "Quit")])
            .with_dimmed(true)
            .with_colors(Color::Cyan, Color::Black);
        let area = Rect::new(0, 0, 20, 1);
        let mut buf = Buffer::empty(area);
        (&controls).render(area, &mut buf);
        assert_eq!(buf[(1, 0)].fg, Color::DarkGray);
    }
}
