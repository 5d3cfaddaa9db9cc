use csvduck::config::{AppConfig, ConfigManager};
use csvduck::filters::Smoothing;
use csvduck::Delimiter;
use std::fs;
use tempfile::TempDir;

// Helper to create a temporary config directory for testing
fn setup_test_config_dir() -> (TempDir, ConfigManager) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_manager = ConfigManager::with_dir(temp_dir.path().to_path_buf());
    (temp_dir, config_manager)
}

fn write_user_config(manager: &ConfigManager, content: &str) {
    manager.ensure_config_dir().unwrap();
    fs::write(manager.config_path("config.toml"), content).unwrap();
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();

    assert_eq!(config.version, "0.1");
    assert_eq!(config.database.path, "local.duckdb");
    assert!(config.database.table.is_none());

    assert_eq!(config.display.page_size, 1000);
    assert_eq!(config.display.undo_limit, 10);
    assert!(config.display.row_numbers);
    assert!(config.grid.save_before_navigate);

    assert_eq!(config.normalize.date_prefix, "D#");
    assert_eq!(config.normalize.time_prefix, "TOD#");

    assert_eq!(config.plot.spike_window, 3);
    assert_eq!(config.plot.smoothing_window, 5);
    assert!(config.plot.show_legend);

    assert_eq!(config.performance.event_poll_interval_ms, 25);
    assert_eq!(config.theme.colors.cell_edited, "yellow");
    assert!(!config.debug.enabled);

    let opts = config.csv_options();
    assert_eq!(opts.delimiter, Delimiter::Semicolon);
    assert!(opts.has_header);
    assert!(config.validate().is_ok());
}

#[test]
fn test_generated_config_is_valid_toml() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let template = config_manager.generate_default_config();

    for section in [
        "[database]",
        "[file_loading]",
        "[display]",
        "[grid]",
        "[normalize]",
        "[plot]",
        "[locale]",
        "[performance]",
        "[theme.colors]",
        "[debug]",
    ] {
        assert!(template.contains(section), "missing {}", section);
    }

    // Everything is commented out, so parsing yields the defaults
    let parsed: AppConfig = toml::from_str(&template).expect("template parses");
    assert_eq!(parsed.version, "0.1");
    assert_eq!(parsed.display.page_size, AppConfig::default().display.page_size);
}

#[test]
fn test_write_default_config_refuses_overwrite() {
    let (_temp_dir, config_manager) = setup_test_config_dir();

    let path = config_manager.write_default_config(false).unwrap();
    assert!(path.exists());

    let err = config_manager.write_default_config(false).unwrap_err();
    assert!(err.to_string().contains("--force"));
    assert!(config_manager.write_default_config(true).is_ok());
}

#[test]
fn test_load_without_user_config_uses_defaults() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config.display.page_size, 1000);
    assert_eq!(config.csv_options().delimiter, Delimiter::Semicolon);
}

#[test]
fn test_user_config_overrides_defaults() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_user_config(
        &config_manager,
        r#"
version = "0.1"

[database]
path = ":memory:"
table = "readings"

[file_loading]
delimiter = "comma"

[display]
page_size = 250

[plot]
spike_window = 7
smoothing_window = 12

[locale]
language = "de"

[theme.colors]
cell_edited = "bright_magenta"
"#,
    );

    let config = AppConfig::load_from(&config_manager).unwrap();
    assert_eq!(config.database.path, ":memory:");
    assert_eq!(config.database.table.as_deref(), Some("readings"));
    assert_eq!(config.csv_options().delimiter, Delimiter::Comma);
    assert_eq!(config.display.page_size, 250);
    // untouched settings keep their defaults
    assert_eq!(config.display.undo_limit, 10);
    assert_eq!(config.locale.language.as_deref(), Some("de"));
    assert_eq!(config.theme.colors.cell_edited, "bright_magenta");
    assert_eq!(config.theme.colors.modal_border, "cyan");

    let filters = config.filter_defaults();
    assert_eq!(filters.spike_window, 7);
    assert_eq!(filters.smoothing_window, 12);
    assert_eq!(filters.smoothing, Smoothing::None);
    assert!(!filters.spike_removal);
}

#[test]
fn test_invalid_user_config_is_rejected() {
    let (_temp_dir, config_manager) = setup_test_config_dir();
    write_user_config(&config_manager, "[display]\npage_size = \"lots\"\n");
    let err = AppConfig::load_from(&config_manager).unwrap_err();
    assert!(err.to_string().contains("Invalid config file"));
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = AppConfig::default();
    config.display.page_size = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.plot.spike_window = 0;
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.theme.color_mode = "sepia".to_string();
    assert!(config.validate().is_err());

    let mut config = AppConfig::default();
    config.theme.colors.error = "not-a-color".to_string();
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("error"));

    let mut config = AppConfig::default();
    config.version = "2.0".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_merge_keeps_base_when_other_is_default() {
    let mut base = AppConfig::default();
    base.display.page_size = 50;
    base.locale.language = Some("pl".to_string());
    base.merge(AppConfig::default());
    assert_eq!(base.display.page_size, 50);
    assert_eq!(base.locale.language.as_deref(), Some("pl"));
}
