//! Plot view state: the loaded session, sidebar selection and key handling.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::ListState;

use crate::plot::PlotSession;

/// Which end of the time range the arrow keys move.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RangeBound {
    #[default]
    Start,
    End,
}

impl RangeBound {
    pub fn toggle(self) -> Self {
        match self {
            RangeBound::Start => RangeBound::End,
            RangeBound::End => RangeBound::Start,
        }
    }
}

/// What the shell should do after a key in the plot view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlotAction {
    None,
    Close,
    /// Ask for a PNG path and export the current plot.
    Export,
    /// Show a localized status message.
    Status(&'static str),
}

pub struct PlotModal {
    pub table: String,
    pub session: PlotSession,
    pub list_state: ListState,
    pub bound: RangeBound,
    pub show_legend: bool,
}

impl PlotModal {
    pub fn new(table: &str, session: PlotSession, show_legend: bool) -> Self {
        let mut list_state = ListState::default();
        list_state.select((session.column_count() > 0).then_some(0));
        Self {
            table: table.to_string(),
            session,
            list_state,
            bound: RangeBound::Start,
            show_legend,
        }
    }

    pub fn selected(&self) -> usize {
        self.list_state.selected().unwrap_or(0)
    }

    pub fn select_next(&mut self) {
        let count = self.session.column_count();
        if count > 0 {
            self.list_state.select(Some((self.selected() + 1) % count));
        }
    }

    pub fn select_previous(&mut self) {
        let count = self.session.column_count();
        if count > 0 {
            self.list_state
                .select(Some((self.selected() + count - 1) % count));
        }
    }

    /// Range step for an unmodified arrow key: about a twentieth of the timeline.
    pub fn coarse_step(&self) -> i64 {
        (self.session.timeline_len() / 20).max(1) as i64
    }

    pub fn move_bound(&mut self, delta: i64) {
        match self.bound {
            RangeBound::Start => self.session.move_start(delta),
            RangeBound::End => self.session.move_end(delta),
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> PlotAction {
        let fine = event.modifiers.contains(KeyModifiers::SHIFT);
        let step = if fine { 1 } else { self.coarse_step() };
        match event.code {
            KeyCode::Esc | KeyCode::Char('q') => return PlotAction::Close,
            KeyCode::Char('e') => return PlotAction::Export,
            KeyCode::Down | KeyCode::Char('j') => self.select_next(),
            KeyCode::Up | KeyCode::Char('k') => self.select_previous(),
            KeyCode::Char(' ') => self.session.toggle_plotted(self.selected()),
            KeyCode::Char('f') => self.session.toggle_filter_target(self.selected()),
            KeyCode::Tab | KeyCode::BackTab => self.bound = self.bound.toggle(),
            KeyCode::Left => self.move_bound(-step),
            KeyCode::Right => self.move_bound(step),
            KeyCode::Char('s') => {
                self.session.filters.spike_removal = !self.session.filters.spike_removal
            }
            KeyCode::Char('-') => self.session.filters.adjust_spike_window(-1),
            KeyCode::Char('+') | KeyCode::Char('=') => self.session.filters.adjust_spike_window(1),
            KeyCode::Char('m') => {
                self.session.filters.smoothing = self.session.filters.smoothing.next()
            }
            KeyCode::Char('<') | KeyCode::Char(',') => {
                self.session.filters.adjust_smoothing_window(-1)
            }
            KeyCode::Char('>') | KeyCode::Char('.') => {
                self.session.filters.adjust_smoothing_window(1)
            }
            KeyCode::Char('r') => {
                self.session.reset_filters();
                return PlotAction::Status("plot.filters_reset");
            }
            KeyCode::Char('g') => self.show_legend = !self.show_legend,
            _ => {}
        }
        PlotAction::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Smoothing;
    use polars::prelude::*;

    fn modal() -> PlotModal {
        let df = df!(
            "ts" => &[
                "01/01/2024 10:00:00.000",
                "01/01/2024 10:30:00.000",
                "01/01/2024 11:39:00.000",
            ],
            "a" => &[1.0_f64, 2.0, 3.0],
            "b" => &[4_i64, 5, 6]
        )
        .unwrap();
        PlotModal::new("t", PlotSession::from_frame(&df).unwrap(), true)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_selection_wraps() {
        let mut m = modal();
        assert_eq!(m.selected(), 0);
        m.handle_key(&key(KeyCode::Up));
        assert_eq!(m.selected(), 1);
        m.handle_key(&key(KeyCode::Down));
        assert_eq!(m.selected(), 0);
    }

    #[test]
    fn test_toggles_apply_to_selected_column() {
        let mut m = modal();
        m.handle_key(&key(KeyCode::Down));
        m.handle_key(&key(KeyCode::Char(' ')));
        m.handle_key(&key(KeyCode::Char('f')));
        assert!(m.session.is_plotted(1));
        assert!(m.session.is_filter_target(1));
        assert!(!m.session.is_filter_target(0));
    }

    #[test]
    fn test_range_moves_selected_bound() {
        let mut m = modal();
        // 100 one-minute slots, coarse step 5
        assert_eq!(m.session.timeline_len(), 100);
        assert_eq!(m.coarse_step(), 5);
        m.handle_key(&key(KeyCode::Right));
        assert_eq!(m.session.range(), (5, 99));
        m.handle_key(&key(KeyCode::Tab));
        m.handle_key(&KeyEvent::new(KeyCode::Left, KeyModifiers::SHIFT));
        assert_eq!(m.session.range(), (5, 98));
    }

    #[test]
    fn test_filter_keys_and_reset() {
        let mut m = modal();
        m.handle_key(&key(KeyCode::Char('s')));
        m.handle_key(&key(KeyCode::Char('+')));
        m.handle_key(&key(KeyCode::Char('m')));
        m.handle_key(&key(KeyCode::Char('>')));
        assert!(m.session.filters.spike_removal);
        assert_eq!(m.session.filters.spike_window, 4);
        assert_eq!(m.session.filters.smoothing, Smoothing::Sma);
        assert_eq!(m.session.filters.smoothing_window, 6);
        assert_eq!(
            m.handle_key(&key(KeyCode::Char('r'))),
            PlotAction::Status("plot.filters_reset")
        );
        assert!(m.session.filters.is_identity());
        assert_eq!(m.session.filters.spike_window, 3);
    }

    #[test]
    fn test_close_and_export() {
        let mut m = modal();
        assert_eq!(m.handle_key(&key(KeyCode::Char('e'))), PlotAction::Export);
        assert_eq!(m.handle_key(&key(KeyCode::Esc)), PlotAction::Close);
        m.handle_key(&key(KeyCode::Char('g')));
        assert!(!m.show_legend);
    }
}
