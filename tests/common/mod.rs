use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use csvduck::{App, AppConfig, AppEvent, Store, Theme};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Semicolon-separated export with split, prefixed date and time columns.
pub const SENSOR_CSV: &str = "\
Date;Time;temperature;humidity
D#2024-03-01;TOD#10:00:00.000;20.5;40
D#2024-03-01;TOD#10:01:00.000;21.0;41
D#2024-03-01;TOD#10:02:00.000;95.0;42
D#2024-03-01;TOD#10:03:00.000;21.5;43
D#2024-03-01;TOD#10:04:00.000;22.0;44
";

pub fn write_csv(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub fn test_app(page_size: usize) -> (App, Receiver<AppEvent>, Arc<Store>) {
    let (tx, rx) = mpsc::channel();
    let store = Arc::new(Store::open_in_memory().unwrap());
    let mut config = AppConfig::default();
    config.locale.language = Some("en".to_string());
    config.display.page_size = page_size;
    let app = App::new_with_config(tx, Arc::clone(&store), Theme::default(), config);
    (app, rx, store)
}

pub fn press(app: &mut App, code: KeyCode) -> Option<AppEvent> {
    app.event(&AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
}

pub fn type_text(app: &mut App, text: &str) {
    for c in text.chars() {
        press(app, KeyCode::Char(c));
    }
}

/// Feed channel events back into the app until the running task reports back.
pub fn wait_for_task(app: &mut App, rx: &Receiver<AppEvent>) {
    while app.is_busy() {
        let event = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("task finished in time");
        if let Some(next) = app.event(&event) {
            app.event(&next);
        }
    }
}

/// Open `table`, import `path` into it and wait for the import to finish.
pub fn import(app: &mut App, rx: &Receiver<AppEvent>, table: &str, path: &std::path::Path) {
    app.event(&AppEvent::OpenTable(table.to_string()));
    app.event(&AppEvent::Import(path.to_path_buf()));
    wait_for_task(app, rx);
}
