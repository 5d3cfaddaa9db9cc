use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;
use std::sync::{mpsc::Sender, Arc};
use std::time::Instant;

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Gauge, Paragraph, StatefulWidget, Wrap};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

pub mod cache;
pub mod cli;
pub mod config;
pub mod error_display;
pub mod filters;
pub mod grid;
pub mod i18n;
pub mod normalize;
pub mod plot;
pub mod plot_export;
pub mod plot_modal;
pub mod store;
pub mod widgets;
pub mod worker;

pub use cache::CacheManager;
pub use cli::Args;
pub use config::{
    rgb_to_256_color, rgb_to_basic_ansi, AppConfig, ColorParser, ConfigManager, Theme,
};
pub use grid::PagedTable;
pub use i18n::Localization;
pub use store::{CsvOptions, Delimiter, Store};

use error_display::user_message_from_report;
use plot::PlotSession;
use plot_export::PlotExportOptions;
use plot_modal::{PlotAction, PlotModal};
use widgets::controls::Controls;
use widgets::datatable::{DataTable, GridCursor};
use widgets::debug::DebugState;
use widgets::text_input::{TextInput, TextInputEvent};
use worker::{Progress, TaskEvent, TaskKind};

/// Application name used for config and cache directories
pub const APP_NAME: &str = "csvduck";

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    /// Open an existing table in the grid.
    OpenTable(String),
    /// Import a CSV file into the current table.
    Import(PathBuf),
    Task(TaskEvent),
    Exit,
    Resize(u16, u16), // resized (width, height)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    TableName,
    ImportPath,
    ExportPath,
    EditCell { row: usize, col: usize },
    PlotExportPath,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    Prompt(PromptKind),
    Plot,
}

#[derive(Default)]
pub struct ErrorModal {
    pub active: bool,
    pub message: String,
}

impl ErrorModal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, message: String) {
        self.active = true;
        self.message = message;
    }

    pub fn hide(&mut self) {
        self.active = false;
        self.message.clear();
    }
}

/// A background task in flight. Action keys are disabled until it reports back.
#[derive(Debug, Clone)]
pub struct Busy {
    pub kind: TaskKind,
    pub percent: u8,
    /// Path or table the task works on, for the completion message
    pub target: String,
}

pub struct App {
    store: Arc<Store>,
    events: Sender<AppEvent>,
    config: AppConfig,
    theme: Theme,
    loc: Localization,
    table_name: String,
    delimiter: Delimiter,
    grid: Option<PagedTable>,
    cursor: GridCursor,
    pub input_mode: InputMode,
    prompt: TextInput,
    plot: Option<PlotModal>,
    error_modal: ErrorModal,
    show_help: bool,
    status: String,
    busy: Option<Busy>,
    debug: DebugState,
}

impl App {
    pub fn new(events: Sender<AppEvent>, store: Arc<Store>) -> App {
        let theme = Theme::default();
        Self::new_with_config(events, store, theme, AppConfig::default())
    }

    pub fn new_with_config(
        events: Sender<AppEvent>,
        store: Arc<Store>,
        theme: Theme,
        app_config: AppConfig,
    ) -> App {
        let language = app_config
            .locale
            .language
            .clone()
            .unwrap_or_else(i18n::detect_language);
        let loc = match &app_config.locale.locales_dir {
            Some(dir) => Localization::with_dir(&language, std::path::Path::new(dir)),
            None => Localization::new(&language),
        };
        let status = loc.t("status.ready");
        let mut debug = DebugState {
            show_performance: app_config.debug.show_performance,
            ..DebugState::default()
        };
        debug.enabled = app_config.debug.enabled;

        App {
            store,
            events,
            table_name: app_config.database.table.clone().unwrap_or_default(),
            delimiter: app_config.csv_options().delimiter,
            grid: None,
            cursor: GridCursor::default(),
            input_mode: InputMode::Normal,
            prompt: TextInput::new().with_theme(&theme),
            plot: None,
            error_modal: ErrorModal::new(),
            show_help: false,
            status,
            busy: None,
            debug,
            theme,
            loc,
            config: app_config,
        }
    }

    pub fn enable_debug(&mut self) {
        self.debug.enabled = true;
    }

    pub fn send_event(&mut self, event: AppEvent) -> Result<()> {
        self.events.send(event)?;
        Ok(())
    }

    pub fn grid(&self) -> Option<&PagedTable> {
        self.grid.as_ref()
    }

    pub fn cursor(&self) -> &GridCursor {
        &self.cursor
    }

    pub fn plot(&self) -> Option<&PlotModal> {
        self.plot.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn delimiter(&self) -> Delimiter {
        self.delimiter
    }

    pub fn busy(&self) -> Option<&Busy> {
        self.busy.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_modal
            .active
            .then_some(self.error_modal.message.as_str())
    }

    pub fn localization(&self) -> &Localization {
        &self.loc
    }

    pub fn prompt_value(&self) -> &str {
        self.prompt.value()
    }

    fn set_status(&mut self, status: String) {
        tracing::debug!(%status, "status");
        self.status = status;
    }

    fn show_error(&mut self, message: String) {
        tracing::warn!(%message, "showing error");
        self.error_modal.show(message);
    }

    fn show_report(&mut self, report: &color_eyre::Report) {
        self.show_error(user_message_from_report(report));
    }

    fn csv_options(&self) -> CsvOptions {
        self.config.csv_options().with_delimiter(self.delimiter)
    }

    fn open_prompt(&mut self, kind: PromptKind, initial: &str) {
        self.prompt.set_value(initial);
        self.prompt.set_focused(true);
        self.input_mode = InputMode::Prompt(kind);
    }

    fn close_prompt(&mut self) {
        self.prompt.clear();
        self.prompt.set_focused(false);
        self.input_mode = if self.plot.is_some() {
            InputMode::Plot
        } else {
            InputMode::Normal
        };
    }

    fn prompt_title(&self, kind: PromptKind) -> String {
        match kind {
            PromptKind::TableName => self.loc.t("prompt.table_name"),
            PromptKind::ImportPath => self.loc.t("prompt.import_path"),
            PromptKind::ExportPath => self.loc.t("prompt.export_path"),
            PromptKind::PlotExportPath => self.loc.t("prompt.plot_export_path"),
            PromptKind::EditCell { col, .. } => {
                let column = self
                    .grid
                    .as_ref()
                    .and_then(|g| g.columns().get(col).cloned())
                    .unwrap_or_default();
                self.loc
                    .t_with("prompt.edit_cell", &[("column", &column)])
            }
        }
    }

    /// Write pending edits before the page is replaced. Returns false if the
    /// save failed and the caller should stay put.
    fn save_before_leaving_page(&mut self) -> bool {
        if !self.config.grid.save_before_navigate {
            return true;
        }
        let Some(grid) = self.grid.as_mut() else {
            return true;
        };
        if !grid.has_unsaved_edits() {
            return true;
        }
        match grid.save() {
            Ok(cells) => {
                let msg = self.loc.t_with("status.saved", &[("cells", &cells)]);
                self.set_status(msg);
                true
            }
            Err(e) => {
                self.show_report(&e);
                false
            }
        }
    }

    fn open_table(&mut self, table: &str) {
        let table = table.trim();
        if table.is_empty() {
            self.show_error(self.loc.t("error.empty_table_name"));
            return;
        }
        if !self.save_before_leaving_page() {
            return;
        }
        match self.store.table_exists(table) {
            Ok(true) => {}
            Ok(false) => {
                // remembered as the target of the next import
                self.table_name = table.to_string();
                self.grid = None;
                self.set_status(self.loc.t("status.no_table"));
                return;
            }
            Err(e) => {
                self.show_report(&e);
                return;
            }
        }
        match PagedTable::open(
            Arc::clone(&self.store),
            table,
            self.config.display.page_size,
            self.config.display.undo_limit,
        ) {
            Ok(grid) => {
                let msg = self.loc.t_with(
                    "status.loaded",
                    &[("table", &table), ("rows", &grid.total_rows())],
                );
                self.table_name = table.to_string();
                self.grid = Some(grid);
                self.cursor.reset();
                self.set_status(msg);
            }
            Err(e) => self.show_report(&e),
        }
    }

    fn start_task<F>(&mut self, kind: TaskKind, target: String, job: F)
    where
        F: FnOnce(&Progress) -> Result<usize> + Send + 'static,
    {
        if self.busy.is_some() {
            self.set_status(self.loc.t("error.busy"));
            return;
        }
        match worker::spawn_task(kind, self.events.clone(), job) {
            Ok(_handle) => {
                self.debug.last_task = Some(format!("{:?}", kind));
                self.busy = Some(Busy {
                    kind,
                    percent: 0,
                    target,
                });
            }
            Err(e) => self.show_report(&e),
        }
    }

    fn start_import(&mut self, path: PathBuf) {
        if self.table_name.trim().is_empty() {
            self.show_error(self.loc.t("error.no_table"));
            return;
        }
        if !self.save_before_leaving_page() {
            return;
        }
        let store = Arc::clone(&self.store);
        let table = self.table_name.clone();
        let opts = self.csv_options();
        self.start_task(TaskKind::Import, table.clone(), move |progress| {
            progress.report(10);
            let rows = store.import_csv(&path, &table, &opts)?;
            progress.report(100);
            Ok(rows)
        });
    }

    fn start_export(&mut self, path: PathBuf) {
        if self.grid.is_none() {
            self.show_error(self.loc.t("error.no_table"));
            return;
        }
        if !self.save_before_leaving_page() {
            return;
        }
        let Some(grid) = self.grid.as_ref() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let table = grid.table().to_string();
        let delimiter = self.delimiter;
        let target = path.display().to_string();
        self.start_task(TaskKind::Export, target, move |progress| {
            progress.report(10);
            let rows = store.export_table(&table, &path, delimiter)?;
            Ok(rows)
        });
    }

    fn start_reformat(&mut self) {
        if self.grid.is_none() {
            self.show_error(self.loc.t("error.no_table"));
            return;
        }
        if !self.save_before_leaving_page() {
            return;
        }
        let Some(grid) = self.grid.as_ref() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let table = grid.table().to_string();
        let opts = self.config.normalize.clone();
        self.start_task(TaskKind::ReformatDateTime, table.clone(), move |progress| {
            progress.report(10);
            let rows = store.reformat_datetime(&table, &opts)?;
            Ok(rows)
        });
    }

    fn start_save(&mut self) {
        let Some(grid) = self.grid.as_ref() else {
            self.show_error(self.loc.t("error.no_table"));
            return;
        };
        let edits = grid.pending_edits();
        let store = Arc::clone(grid.store());
        let table = grid.table().to_string();
        if edits.is_empty() {
            self.set_status(self.loc.t("status.nothing_to_save"));
            return;
        }
        self.start_task(TaskKind::SaveEdits, table.clone(), move |_| {
            let cells = store.update_cells(&table, &edits)?;
            Ok(cells)
        });
    }

    fn task_event(&mut self, event: &TaskEvent) {
        match event {
            TaskEvent::Progress { percent, .. } => {
                if let Some(busy) = self.busy.as_mut() {
                    busy.percent = *percent;
                }
            }
            TaskEvent::Finished { kind, rows } => {
                let target = self
                    .busy
                    .take()
                    .map(|b| b.target)
                    .unwrap_or_default();
                let rows = *rows;
                match kind {
                    TaskKind::Import => {
                        let table = target;
                        self.grid = None;
                        self.open_table(&table);
                        let msg = self
                            .loc
                            .t_with("status.imported", &[("rows", &rows), ("table", &table)]);
                        self.set_status(msg);
                    }
                    TaskKind::Export => {
                        let msg = self
                            .loc
                            .t_with("status.exported", &[("rows", &rows), ("path", &target)]);
                        self.set_status(msg);
                    }
                    TaskKind::ReformatDateTime => {
                        let page = self.grid.as_ref().map(|g| g.page_index()).unwrap_or(0);
                        let table = target;
                        self.grid = None;
                        self.open_table(&table);
                        if let Some(grid) = self.grid.as_mut() {
                            if let Err(e) = grid.load_page(page) {
                                self.show_report(&e);
                            }
                        }
                        let msg = self.loc.t_with("status.reformatted", &[("rows", &rows)]);
                        self.set_status(msg);
                    }
                    TaskKind::SaveEdits => {
                        if let Some(grid) = self.grid.as_mut() {
                            grid.mark_saved();
                        }
                        let msg = self.loc.t_with("status.saved", &[("cells", &rows)]);
                        self.set_status(msg);
                    }
                }
            }
            TaskEvent::Failed { kind, message } => {
                self.busy = None;
                let task = self.loc.t(kind.label_key());
                let msg = self.loc.t_with(
                    "error.task_failed",
                    &[("task", &task), ("message", message)],
                );
                self.show_error(msg);
            }
        }
    }

    fn navigate(&mut self, step: impl FnOnce(&mut PagedTable) -> Result<bool>) {
        if self.grid.is_none() || !self.save_before_leaving_page() {
            return;
        }
        let Some(grid) = self.grid.as_mut() else {
            return;
        };
        match step(grid) {
            Ok(true) => self.cursor.reset(),
            Ok(false) => {}
            Err(e) => self.show_report(&e),
        }
    }

    fn open_plot(&mut self) {
        if self.grid.is_none() {
            self.show_error(self.loc.t("error.no_table"));
            return;
        }
        if !self.save_before_leaving_page() {
            return;
        }
        let Some(table) = self.grid.as_ref().map(|g| g.table().to_string()) else {
            return;
        };
        let session = self.store.fetch_frame(&table).and_then(|df| {
            PlotSession::from_frame_with_defaults(&df, self.config.filter_defaults())
        });
        match session {
            Ok(session) => {
                self.plot = Some(PlotModal::new(&table, session, self.config.plot.show_legend));
                self.input_mode = InputMode::Plot;
            }
            Err(e) => self.show_report(&e),
        }
    }

    fn export_plot(&mut self, path: PathBuf) {
        let Some(plot) = self.plot.as_ref() else {
            return;
        };
        let series = plot.session.series();
        let names = plot.session.column_names();
        let color_index: Vec<usize> = series
            .iter()
            .map(|s| names.iter().position(|n| *n == s.name).unwrap_or(0))
            .collect();
        let options = PlotExportOptions {
            width: self.config.plot.export_width,
            height: self.config.plot.export_height,
            title: plot.table.clone(),
            x_label: plot.session.timestamp_column().to_string(),
            show_legend: plot.show_legend,
        };
        match plot_export::write_plot_png(&path, &series, &color_index, &options) {
            Ok(()) => {
                let msg = self
                    .loc
                    .t_with("plot.exported", &[("path", &path.display())]);
                self.set_status(msg);
            }
            Err(e) => self.show_report(&e),
        }
    }

    fn submit_prompt(&mut self, kind: PromptKind, raw: String) -> Option<AppEvent> {
        let value = raw.trim();
        match kind {
            PromptKind::EditCell { row, col } => {
                if let Some(grid) = self.grid.as_mut() {
                    grid.set(row, col, &raw);
                }
                return None;
            }
            PromptKind::TableName => {
                self.open_table(value);
                return None;
            }
            _ => {}
        }
        if value.is_empty() {
            self.show_error(self.loc.t("error.empty_path"));
            return None;
        }
        let path = PathBuf::from(value);
        match kind {
            PromptKind::ImportPath => Some(AppEvent::Import(path)),
            PromptKind::ExportPath => {
                self.start_export(path);
                None
            }
            PromptKind::PlotExportPath => {
                self.export_plot(path);
                None
            }
            PromptKind::TableName | PromptKind::EditCell { .. } => None,
        }
    }

    fn prompt_key(&mut self, kind: PromptKind, event: &KeyEvent) -> Option<AppEvent> {
        match self.prompt.handle_key(event) {
            TextInputEvent::None => None,
            TextInputEvent::Cancel => {
                self.close_prompt();
                None
            }
            TextInputEvent::Submit => {
                let value = self.prompt.value().to_string();
                self.close_prompt();
                self.submit_prompt(kind, value)
            }
        }
    }

    fn plot_key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        let Some(plot) = self.plot.as_mut() else {
            self.input_mode = InputMode::Normal;
            return None;
        };
        match plot.handle_key(event) {
            PlotAction::None => {}
            PlotAction::Close => {
                self.plot = None;
                self.input_mode = InputMode::Normal;
            }
            PlotAction::Export => {
                let initial = format!("{}.png", plot.table);
                self.open_prompt(PromptKind::PlotExportPath, &initial);
            }
            PlotAction::Status(key) => self.set_status(self.loc.t(key)),
        }
        None
    }

    fn normal_key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
        let rows = self.grid.as_ref().map(|g| g.row_count()).unwrap_or(0);
        let cols = self.grid.as_ref().map(|g| g.column_count()).unwrap_or(0);
        match event.code {
            KeyCode::Char('q') => {
                if self.save_before_leaving_page() {
                    return Some(AppEvent::Exit);
                }
            }
            KeyCode::Char('?') => self.show_help = true,
            KeyCode::Char('z') if ctrl => self.undo(),
            KeyCode::Char('y') if ctrl => self.redo(),
            KeyCode::Char('u') => self.undo(),
            KeyCode::Char('r') => self.redo(),
            KeyCode::Char('t') => {
                let initial = self.table_name.clone();
                self.open_prompt(PromptKind::TableName, &initial);
            }
            KeyCode::Char('i') => {
                if self.table_name.trim().is_empty() {
                    self.show_error(self.loc.t("error.no_table"));
                } else {
                    self.open_prompt(PromptKind::ImportPath, "");
                }
            }
            KeyCode::Char('x') => {
                if self.grid.is_some() {
                    let initial = format!("{}.csv", self.table_name);
                    self.open_prompt(PromptKind::ExportPath, &initial);
                } else {
                    self.show_error(self.loc.t("error.no_table"));
                }
            }
            KeyCode::Char('c') => {
                if self.save_before_leaving_page() {
                    self.grid = None;
                    self.cursor.reset();
                    self.set_status(self.loc.t("status.cleared"));
                }
            }
            KeyCode::Char('d') => self.start_reformat(),
            KeyCode::Char('p') => self.open_plot(),
            KeyCode::Char('w') => self.start_save(),
            KeyCode::Char('o') => {
                self.delimiter = self.delimiter.next();
                let name = self.loc.t(self.delimiter.label_key());
                let msg = self.loc.t_with("status.delimiter", &[("name", &name)]);
                self.set_status(msg);
            }
            KeyCode::Char('L') => {
                let lang = self.loc.cycle_language().to_string();
                let msg = self.loc.t_with("status.language", &[("lang", &lang)]);
                self.set_status(msg);
            }
            KeyCode::Char('[') | KeyCode::PageUp => self.navigate(|g| g.prev_page()),
            KeyCode::Char(']') | KeyCode::PageDown => self.navigate(|g| g.next_page()),
            KeyCode::Char('g') => self.navigate(|g| {
                let changed = g.page_index() != 0;
                g.load_page(0)?;
                Ok(changed)
            }),
            KeyCode::Char('G') => self.navigate(|g| {
                let last = g.max_page();
                let changed = g.page_index() != last;
                g.load_page(last)?;
                Ok(changed)
            }),
            KeyCode::Down | KeyCode::Char('j') => self.cursor.select_next(rows),
            KeyCode::Up | KeyCode::Char('k') => self.cursor.select_previous(),
            KeyCode::Right | KeyCode::Char('l') => self.cursor.select_right(cols),
            KeyCode::Left | KeyCode::Char('h') => self.cursor.select_left(),
            KeyCode::Home => self.cursor.select_first_row(),
            KeyCode::End => self.cursor.select_last_row(rows),
            KeyCode::Enter | KeyCode::Char('e') => {
                if let Some(grid) = self.grid.as_ref() {
                    if self.cursor.row < rows && self.cursor.col < cols {
                        let (row, col) = (self.cursor.row, self.cursor.col);
                        let value = grid.get(row, col).to_string();
                        self.open_prompt(PromptKind::EditCell { row, col }, &value);
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn undo(&mut self) {
        if let Some(grid) = self.grid.as_mut() {
            if !grid.undo() {
                self.set_status(self.loc.t("status.nothing_to_undo"));
            }
        }
    }

    fn redo(&mut self) {
        if let Some(grid) = self.grid.as_mut() {
            if !grid.redo() {
                self.set_status(self.loc.t("status.nothing_to_redo"));
            }
        }
    }

    fn key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        self.debug.on_key(event);

        // Error modal has highest priority
        if self.error_modal.active {
            if matches!(event.code, KeyCode::Esc | KeyCode::Enter) {
                self.error_modal.hide();
            }
            return None;
        }

        if self.show_help {
            if matches!(
                event.code,
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('?') | KeyCode::Char('q')
            ) {
                self.show_help = false;
            }
            return None;
        }

        if self.busy.is_some() {
            self.set_status(self.loc.t("error.busy"));
            return None;
        }

        match self.input_mode {
            InputMode::Prompt(kind) => self.prompt_key(kind, event),
            InputMode::Plot => self.plot_key(event),
            InputMode::Normal => self.normal_key(event),
        }
    }

    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        self.debug.num_events += 1;
        match event {
            AppEvent::Key(key) => self.key(key),
            AppEvent::OpenTable(table) => {
                self.open_table(table);
                None
            }
            AppEvent::Import(path) => {
                self.start_import(path.clone());
                None
            }
            AppEvent::Task(task) => {
                self.task_event(task);
                None
            }
            _ => None,
        }
    }

    fn control_hints(&self) -> Vec<(&'static str, String)> {
        let t = |key: &str| self.loc.t(key);
        match self.input_mode {
            InputMode::Plot => vec![
                ("Space", t("controls.toggle")),
                ("f", t("controls.filter")),
                ("Tab ←→", t("controls.range")),
                ("s", t("controls.spike")),
                ("m", t("controls.smoothing")),
                ("r", t("controls.reset")),
                ("g", t("controls.legend")),
                ("e", t("controls.export_png")),
                ("Esc", t("controls.close")),
            ],
            InputMode::Prompt(_) => vec![],
            InputMode::Normal => vec![
                ("t", t("controls.table")),
                ("i", t("controls.import")),
                ("x", t("controls.export")),
                ("c", t("controls.clear")),
                ("d", t("controls.reformat")),
                ("p", t("controls.plot")),
                ("e", t("controls.edit")),
                ("w", t("controls.save")),
                ("u", t("controls.undo")),
                ("r", t("controls.redo")),
                ("[ ]", t("controls.page")),
                ("o", t("controls.delimiter")),
                ("L", t("controls.language")),
                ("?", t("controls.help")),
                ("q", t("controls.quit")),
            ],
        }
    }

    fn controls_summary(&self) -> Option<String> {
        if let Some(busy) = &self.busy {
            let task = self.loc.t(busy.kind.label_key());
            return Some(self.loc.t_with(
                "status.working",
                &[("task", &task), ("percent", &busy.percent)],
            ));
        }
        if let InputMode::Prompt(_) = self.input_mode {
            return Some(self.loc.t("prompt.hint"));
        }
        let grid = self.grid.as_ref()?;
        let mut parts = vec![
            self.loc.t_with(
                "page.label",
                &[("page", &(grid.page_index() + 1)), ("max", &(grid.max_page() + 1))],
            ),
            self.loc.t_with("page.rows", &[("total", &grid.total_rows())]),
        ];
        let unsaved = grid.pending_edits().len();
        if unsaved > 0 {
            parts.push(self.loc.t_with("status.unsaved", &[("count", &unsaved)]));
        }
        Some(parts.join(" | "))
    }

    fn render_title(&self, area: Rect, buf: &mut Buffer) {
        let table = if self.table_name.is_empty() {
            "-"
        } else {
            self.table_name.as_str()
        };
        let delimiter = self.loc.t(self.delimiter.label_key());
        let title = format!(
            " {} | {} | {} | {}",
            self.loc.t("app.title"),
            self.store.location(),
            table,
            delimiter
        );
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Fill(1),
                Constraint::Length(self.status.chars().count() as u16 + 1),
            ])
            .split(area);
        let style = Style::default()
            .fg(self.theme.get("table_header"))
            .bg(self.theme.get("controls_bg"));
        Paragraph::new(Line::from(Span::styled(
            title,
            style.add_modifier(Modifier::BOLD),
        )))
        .style(style)
        .render(chunks[0], buf);
        Paragraph::new(self.status.as_str())
            .style(style.fg(self.theme.get("secondary")))
            .right_aligned()
            .render(chunks[1], buf);
    }

    fn render_busy_gauge(&self, busy: &Busy, area: Rect, buf: &mut Buffer) {
        let gauge_area = centered_rect_fixed(area, area.width / 3, 3);
        Clear.render(gauge_area, buf);
        Gauge::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.get("modal_border")))
                    .title(format!(" {} ", self.loc.t(busy.kind.label_key()))),
            )
            .gauge_style(Style::default().fg(self.theme.get("primary")))
            .percent(busy.percent.min(100) as u16)
            .render(gauge_area, buf);
    }

    fn render_help(&self, area: Rect, buf: &mut Buffer) {
        let popup_area = centered_rect(area, 70, 50);
        Clear.render(popup_area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.theme.get("modal_border")))
            .title(format!(" {} ", self.loc.t("help.title")));
        let lines: Vec<Line> = [
            "help.grid",
            "help.pages",
            "help.history",
            "help.actions",
            "help.settings",
            "help.plot",
            "help.plot_filters",
            "help.plot_output",
        ]
        .iter()
        .map(|key| Line::from(self.loc.t(key)))
        .collect();
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: true })
            .render(popup_area, buf);
    }

    fn render_error(&self, area: Rect, buf: &mut Buffer) {
        let popup_area = centered_rect(area, 70, 40);
        Clear.render(popup_area, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ", self.loc.t("error.title")))
            .border_style(Style::default().fg(self.theme.get("modal_border_error")));
        let inner_area = block.inner(popup_area);
        block.render(popup_area, buf);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(inner_area);

        Paragraph::new(self.error_modal.message.as_str())
            .style(Style::default().fg(self.theme.get("error")))
            .wrap(Wrap { trim: true })
            .render(chunks[0], buf);
        Paragraph::new(self.loc.t("error.dismiss"))
            .style(Style::default().fg(self.theme.get("modal_border_active")))
            .centered()
            .render(chunks[1], buf);
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let started = Instant::now();

        let prompting = matches!(self.input_mode, InputMode::Prompt(_));
        let mut constraints = vec![Constraint::Length(1), Constraint::Fill(1)];
        if prompting {
            constraints.push(Constraint::Length(3));
        }
        constraints.push(Constraint::Length(1)); // Controls
        if self.debug.enabled {
            constraints.push(Constraint::Length(1));
        }
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints(constraints)
            .split(area);

        self.render_title(layout[0], buf);
        let main_area = layout[1];

        if let Some(plot) = self.plot.as_mut() {
            widgets::chart::render_plot_view(main_area, buf, plot, &self.theme, &self.loc);
        } else if let Some(grid) = self.grid.as_ref() {
            let table = DataTable::new(grid)
                .with_colors(
                    self.theme.get("controls_bg"),
                    self.theme.get("table_header"),
                    self.theme.get("row_numbers"),
                    self.theme.get("cell_edited"),
                )
                .with_row_numbers(self.config.display.row_numbers)
                .with_max_column_width(self.config.display.max_column_width);
            table.render(main_area, buf, &mut self.cursor);
        } else {
            Paragraph::new(self.loc.t("status.no_table"))
                .style(Style::default().fg(self.theme.get("text_secondary")))
                .centered()
                .render(
                    centered_rect_fixed(main_area, main_area.width, 1),
                    buf,
                );
        }

        let mut next = 2;
        if let InputMode::Prompt(kind) = self.input_mode {
            let block = Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.get("modal_border_active")))
                .title(format!(" {} ", self.prompt_title(kind)));
            let inner = block.inner(layout[next]);
            block.render(layout[next], buf);
            (&self.prompt).render(inner, buf);
            next += 1;
        }

        let mut controls = Controls::with_hints(self.control_hints())
            .with_dimmed(self.busy.is_some() || self.error_modal.active || self.show_help)
            .with_colors(self.theme.get("keybind_hints"), self.theme.get("controls_bg"));
        if let Some(summary) = self.controls_summary() {
            controls = controls.with_summary(summary);
        }
        (&controls).render(layout[next], buf);
        next += 1;

        if let Some(busy) = self.busy.clone() {
            self.render_busy_gauge(&busy, main_area, buf);
        }
        if self.show_help {
            self.render_help(area, buf);
        }
        if self.error_modal.active {
            self.render_error(area, buf);
        }

        self.debug.on_render(started.elapsed());
        if self.debug.enabled && layout.len() > next {
            (&self.debug).render(layout[next], buf);
        }
    }
}

fn centered_rect(r: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn centered_rect_fixed(r: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(r.width);
    let height = height.min(r.height);
    Rect {
        x: r.x + (r.width - width) / 2,
        y: r.y + (r.height - height) / 2,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{channel, Receiver};

    fn app() -> (App, Receiver<AppEvent>) {
        let (tx, rx) = channel();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut config = AppConfig::default();
        config.locale.language = Some("en".to_string());
        (App::new_with_config(tx, store, Theme::default(), config), rx)
    }

    fn press(app: &mut App, code: KeyCode) -> Option<AppEvent> {
        app.event(&AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
    }

    #[test]
    fn test_centered_rect_fixed_stays_inside() {
        let outer = Rect::new(10, 5, 20, 10);
        let inner = centered_rect_fixed(outer, 40, 3);
        assert_eq!(inner, Rect::new(10, 8, 20, 3));
    }

    #[test]
    fn test_import_requires_table_name() {
        let (mut app, _rx) = app();
        press(&mut app, KeyCode::Char('i'));
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.error_message(), Some("Enter a table name first"));
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.error_message(), None);
    }

    #[test]
    fn test_cancelled_prompt_starts_empty_next_time() {
        let (mut app, _rx) = app();
        press(&mut app, KeyCode::Char('t'));
        for c in "abc".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        assert_eq!(app.prompt_value(), "abc");
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.prompt_value(), "");
    }

    #[test]
    fn test_unknown_table_shows_status() {
        let (mut app, _rx) = app();
        press(&mut app, KeyCode::Char('t'));
        assert_eq!(app.input_mode, InputMode::Prompt(PromptKind::TableName));
        for c in "missing".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.input_mode, InputMode::Normal);
        assert_eq!(app.table_name(), "missing");
        assert!(app.grid().is_none());
        assert_eq!(app.status(), "No table loaded");
    }

    #[test]
    fn test_delimiter_and_language_cycle() {
        let (mut app, _rx) = app();
        assert_eq!(app.delimiter(), Delimiter::Semicolon);
        press(&mut app, KeyCode::Char('o'));
        assert_eq!(app.delimiter(), Delimiter::Comma);
        assert_eq!(app.status(), "Delimiter: Comma (,)");
        press(&mut app, KeyCode::Char('L'));
        assert_eq!(app.localization().language(), "de");
    }

    #[test]
    fn test_quit_and_help() {
        let (mut app, _rx) = app();
        press(&mut app, KeyCode::Char('?'));
        assert!(press(&mut app, KeyCode::Char('q')).is_none());
        assert!(matches!(press(&mut app, KeyCode::Char('q')), Some(AppEvent::Exit)));
    }

    #[test]
    fn test_busy_blocks_action_keys() {
        let (mut app, _rx) = app();
        app.busy = Some(Busy {
            kind: TaskKind::Import,
            percent: 0,
            target: String::new(),
        });
        assert!(press(&mut app, KeyCode::Char('q')).is_none());
        assert_eq!(app.status(), "Another operation is still running");
        app.event(&AppEvent::Task(TaskEvent::Progress {
            kind: TaskKind::Import,
            percent: 40,
        }));
        assert_eq!(app.busy().map(|b| b.percent), Some(40));
        app.event(&AppEvent::Task(TaskEvent::Failed {
            kind: TaskKind::Import,
            message: "bad file".to_string(),
        }));
        assert!(!app.is_busy());
        assert_eq!(app.error_message(), Some("Import failed: bad file"));
    }

    #[test]
    fn test_render_without_table() {
        let (mut app, _rx) = app();
        let area = Rect::new(0, 0, 120, 20);
        let mut buf = Buffer::empty(area);
        (&mut app).render(area, &mut buf);
        let title: String = (0..area.width)
            .map(|x| buf[(x, 0)].symbol().to_string())
            .collect();
        assert!(title.contains("csvduck"));
        assert!(title.contains(":memory:"));
        assert_eq!(app.debug.num_frames, 1);
    }
}
