use clap::Parser;
use color_eyre::Result;
use csvduck::{App, AppConfig, AppEvent, Args, CacheManager, ConfigManager, Store, Theme};
use ratatui::DefaultTerminal;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn render(terminal: &mut DefaultTerminal, app: &mut App) -> Result<()> {
    terminal.draw(|frame| frame.render_widget(app, frame.area()))?;
    Ok(())
}

/// Apply command-line overrides on top of the loaded configuration.
fn apply_args(config: &mut AppConfig, args: &Args) {
    if let Some(db) = &args.db {
        config.database.path = db.clone();
    }
    if let Some(table) = &args.table {
        config.database.table = Some(table.clone());
    }
    if let Some(delimiter) = args.delimiter {
        config.file_loading.delimiter = Some(delimiter);
    }
    if let Some(lang) = &args.lang {
        config.locale.language = Some(lang.clone());
    }
    if args.debug {
        config.debug.enabled = true;
    }
}

/// Send log output to the cache directory; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let cache = CacheManager::new(csvduck::APP_NAME)?;
    cache.ensure_cache_dir()?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(cache.log_file())?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| color_eyre::eyre::eyre!("Failed to initialize logging: {}", e))?;
    Ok(())
}

fn run(mut terminal: DefaultTerminal, args: &Args, config: AppConfig) -> Result<()> {
    let (tx, rx) = channel::<AppEvent>();
    let store = Arc::new(Store::open(&config.database.path)?);
    let theme = Theme::from_config(&config.theme)?;
    let poll_interval = Duration::from_millis(config.performance.event_poll_interval_ms);
    let startup_table = config.database.table.clone();

    let mut app = App::new_with_config(tx.clone(), store, theme, config);
    render(&mut terminal, &mut app)?;

    if let Some(path) = &args.import {
        tx.send(AppEvent::Import(path.clone()))?;
    } else if let Some(table) = startup_table {
        tx.send(AppEvent::OpenTable(table))?;
    }

    loop {
        if crossterm::event::poll(poll_interval)? {
            match crossterm::event::read()? {
                crossterm::event::Event::Key(key) => tx.send(AppEvent::Key(key))?,
                crossterm::event::Event::Resize(cols, rows) => {
                    tx.send(AppEvent::Resize(cols, rows))?
                }
                _ => {}
            }
        }

        let updated = match rx.recv_timeout(Duration::from_millis(0)) {
            Ok(event) => {
                match event {
                    AppEvent::Exit => break,
                    event => {
                        if let Some(event) = app.event(&event) {
                            tx.send(event)?;
                        }
                    }
                }
                true
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => false,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        };

        if updated {
            render(&mut terminal, &mut app)?;
        }
    }
    tracing::info!("exiting");
    Ok(())
}

fn handle_early_exit_flags(args: &Args) -> Result<Option<()>> {
    if args.generate_config {
        let manager = ConfigManager::new(csvduck::APP_NAME)?;
        match manager.write_default_config(args.force) {
            Ok(path) => {
                println!("Wrote default configuration to {}", path.display());
                return Ok(Some(()));
            }
            Err(e) => {
                eprintln!("Error writing configuration: {}", e);
                std::process::exit(1);
            }
        }
    }

    if args.clear_logs {
        match CacheManager::new(csvduck::APP_NAME) {
            Ok(cache) => {
                match cache.clear_all() {
                    Ok(0) => println!("No logs to clear"),
                    Ok(_) => println!("Logs cleared successfully"),
                    Err(e) => {
                        eprintln!("Error clearing logs: {}", e);
                        std::process::exit(1);
                    }
                }
                return Ok(Some(()));
            }
            Err(_e) => {
                println!("No logs to clear");
                return Ok(Some(()));
            }
        }
    }

    Ok(None)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(()) = handle_early_exit_flags(&args)? {
        return Ok(());
    }

    color_eyre::install()?;
    if let Err(e) = init_logging() {
        eprintln!("Warning: {}", e);
    }

    let mut config = match AppConfig::load(csvduck::APP_NAME) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };
    apply_args(&mut config, &args);
    config.validate()?;
    tracing::info!(db = %config.database.path, "starting");

    let terminal = ratatui::init();
    let result = run(terminal, &args, config);
    ratatui::restore();
    if let Err(e) = result {
        tracing::error!(error = %e, "fatal error");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvduck::Delimiter;

    #[test]
    fn test_args_override_config() {
        let args = Args {
            db: Some(":memory:".to_string()),
            table: Some("readings".to_string()),
            delimiter: Some(Delimiter::Tab),
            lang: Some("pl".to_string()),
            debug: true,
            ..Args::default()
        };
        let mut config = AppConfig::default();
        apply_args(&mut config, &args);
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.database.table.as_deref(), Some("readings"));
        assert_eq!(config.csv_options().delimiter, Delimiter::Tab);
        assert_eq!(config.locale.language.as_deref(), Some("pl"));
        assert!(config.debug.enabled);
    }

    #[test]
    fn test_no_args_keep_config() {
        let mut config = AppConfig::default();
        let before = config.database.path.clone();
        apply_args(&mut config, &Args::default());
        assert_eq!(config.database.path, before);
        assert!(config.database.table.is_none());
    }
}
