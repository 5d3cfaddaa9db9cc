use crate::filters::{FilterSettings, SMOOTHING_WINDOW_RANGE, SPIKE_WINDOW_RANGE};
use crate::normalize::NormalizeOptions;
use crate::store::{CsvOptions, Delimiter};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use ratatui::style::Color;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use supports_color::Stream;

pub const CONFIG_FILE: &str = "config.toml";

const CONFIG_VERSION: &str = "0.1";

const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("../config/default.toml");

/// Locates the per-user config directory and writes the starter config file
#[derive(Clone)]
pub struct ConfigManager {
    pub(crate) config_dir: PathBuf,
}

impl ConfigManager {
    /// Use an explicit directory instead of the platform config dir (tests, portable installs)
    pub fn with_dir(config_dir: PathBuf) -> Self {
        Self { config_dir }
    }

    pub fn new(app_name: &str) -> Result<Self> {
        dirs::config_dir()
            .map(|base| Self::with_dir(base.join(app_name)))
            .ok_or_else(|| eyre!("No config directory available on this platform"))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_path(&self, file: &str) -> PathBuf {
        self.config_dir.join(file)
    }

    pub fn ensure_config_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .map_err(|e| eyre!("Cannot create {}: {}", self.config_dir.display(), e))
    }

    pub fn generate_default_config(&self) -> String {
        DEFAULT_CONFIG_TEMPLATE.to_owned()
    }

    /// Write the commented default configuration; refuses to overwrite unless `force`.
    pub fn write_default_config(&self, force: bool) -> Result<PathBuf> {
        let path = self.config_path(CONFIG_FILE);
        if !force && path.exists() {
            return Err(eyre!(
                "{} already exists; pass --force to replace it",
                path.display()
            ));
        }
        self.ensure_config_dir()?;
        std::fs::write(&path, DEFAULT_CONFIG_TEMPLATE)?;
        tracing::info!(path = %path.display(), "wrote default config");
        Ok(path)
    }
}

/// Declare a config section: the struct, its defaults, and a `merge` that
/// takes every field the other value changed from its default.
macro_rules! config_section {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty = $default:expr ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(default)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl Default for $name {
            fn default() -> Self {
                Self { $( $field: $default, )* }
            }
        }

        impl $name {
            pub fn merge(&mut self, other: Self) {
                let default = Self::default();
                $(
                    if other.$field != default.$field {
                        self.$field = other.$field;
                    }
                )*
            }
        }
    };
}

config_section! {
    DatabaseConfig {
        /// DuckDB file; `:memory:` keeps everything in RAM
        path: String = "local.duckdb".to_string(),
        /// Table name pre-filled at startup
        table: Option<String> = None,
    }
}

config_section! {
    /// CSV reader settings; unset values fall back to `CsvOptions::default()`
    FileLoadingConfig {
        delimiter: Option<Delimiter> = None,
        has_header: Option<bool> = None,
        ignore_errors: Option<bool> = None,
    }
}

config_section! {
    DisplayConfig {
        page_size: usize = crate::grid::DEFAULT_PAGE_SIZE,
        undo_limit: usize = crate::grid::DEFAULT_UNDO_LIMIT,
        row_numbers: bool = true,
        max_column_width: u16 = 30,
    }
}

config_section! {
    GridConfig {
        /// Write pending cell edits before changing page or reloading
        save_before_navigate: bool = true,
    }
}

config_section! {
    PlotConfig {
        spike_window: usize = crate::filters::DEFAULT_SPIKE_WINDOW,
        smoothing_window: usize = crate::filters::DEFAULT_SMOOTHING_WINDOW,
        show_legend: bool = true,
        export_width: u32 = 1024,
        export_height: u32 = 600,
    }
}

config_section! {
    LocaleConfig {
        /// Language code (en, de, pl, jp); detected from the environment when unset
        language: Option<String> = None,
        /// Directory with `<language>.json` files overriding the built-in strings
        locales_dir: Option<String> = None,
    }
}

config_section! {
    PerformanceConfig {
        event_poll_interval_ms: u64 = 25,
    }
}

config_section! {
    DebugConfig {
        enabled: bool = false,
        show_performance: bool = true,
    }
}

/// Color slots by name and default value; also generates `entries()`.
macro_rules! color_slots {
    ($($slot:ident = $default:literal),* $(,)?) => {
        config_section! {
            /// Theme colors: a name (`bright_red`), `#rrggbb` or `indexed(n)`
            ColorConfig { $( $slot: String = $default.to_string() ),* }
        }

        impl ColorConfig {
            /// (slot, value) pairs in declaration order
            pub fn entries(&self) -> Vec<(&'static str, &str)> {
                vec![$( (stringify!($slot), self.$slot.as_str()) ),*]
            }
        }
    };
}

color_slots! {
    primary = "cyan",
    secondary = "yellow",
    success = "green",
    error = "red",
    warning = "yellow",
    dimmed = "dark_gray",
    controls_bg = "indexed(236)",
    keybind_hints = "cyan",
    text_primary = "white",
    text_secondary = "dark_gray",
    table_header = "white",
    table_border = "cyan",
    table_selected = "reversed",
    row_numbers = "dark_gray",
    cell_edited = "yellow",
    modal_border = "cyan",
    modal_border_active = "yellow",
    modal_border_error = "red",
    chart_series_color_1 = "cyan",
    chart_series_color_2 = "magenta",
    chart_series_color_3 = "green",
    chart_series_color_4 = "yellow",
    chart_series_color_5 = "blue",
    chart_series_color_6 = "red",
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// "auto", "dark" or "light"
    pub color_mode: String,
    pub colors: ColorConfig,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            color_mode: "auto".to_string(),
            colors: ColorConfig::default(),
        }
    }
}

impl ThemeConfig {
    pub fn merge(&mut self, other: Self) {
        if other.color_mode != ThemeConfig::default().color_mode {
            self.color_mode = other.color_mode;
        }
        self.colors.merge(other.colors);
    }
}

/// Everything read from `config.toml`, layered over built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub version: String,
    pub database: DatabaseConfig,
    pub file_loading: FileLoadingConfig,
    pub display: DisplayConfig,
    pub grid: GridConfig,
    pub normalize: NormalizeOptions,
    pub plot: PlotConfig,
    pub locale: LocaleConfig,
    pub performance: PerformanceConfig,
    pub theme: ThemeConfig,
    pub debug: DebugConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            database: Default::default(),
            file_loading: Default::default(),
            display: Default::default(),
            grid: Default::default(),
            normalize: Default::default(),
            plot: Default::default(),
            locale: Default::default(),
            performance: Default::default(),
            theme: Default::default(),
            debug: Default::default(),
        }
    }
}

fn merge_normalize(base: &mut NormalizeOptions, other: NormalizeOptions) {
    let default = NormalizeOptions::default();
    let pairs = [
        (&mut base.date_prefix, other.date_prefix, default.date_prefix),
        (&mut base.time_prefix, other.time_prefix, default.time_prefix),
        (&mut base.input_format, other.input_format, default.input_format),
        (&mut base.output_format, other.output_format, default.output_format),
    ];
    for (slot, value, default) in pairs {
        if value != default {
            *slot = value;
        }
    }
}

impl AppConfig {
    /// Defaults overlaid with the user's config file from the platform config dir
    pub fn load(app_name: &str) -> Result<Self> {
        Self::load_from(&ConfigManager::new(app_name)?)
    }

    /// Defaults merged with `config.toml` in the manager's directory, then validated.
    pub fn load_from(manager: &ConfigManager) -> Result<Self> {
        let mut config = Self::default();
        let path = manager.config_path(CONFIG_FILE);
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| eyre!("Cannot read {}: {}", path.display(), e))?;
            let user: AppConfig = toml::from_str(&text)
                .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))?;
            tracing::debug!(path = %path.display(), "loaded user config");
            config.merge(user);
        }
        config.validate()?;
        Ok(config)
    }

    /// Overlay `other`; its non-default values win
    pub fn merge(&mut self, other: AppConfig) {
        if other.version != CONFIG_VERSION {
            self.version = other.version;
        }
        self.database.merge(other.database);
        self.file_loading.merge(other.file_loading);
        self.display.merge(other.display);
        self.grid.merge(other.grid);
        merge_normalize(&mut self.normalize, other.normalize);
        self.plot.merge(other.plot);
        self.locale.merge(other.locale);
        self.performance.merge(other.performance);
        self.theme.merge(other.theme);
        self.debug.merge(other.debug);
    }

    pub fn validate(&self) -> Result<()> {
        if !self.version.starts_with(CONFIG_VERSION) {
            return Err(eyre!(
                "Config version {} is not supported (expected {}.x)",
                self.version,
                CONFIG_VERSION
            ));
        }
        if self.database.path.trim().is_empty() {
            return Err(eyre!("database.path must not be empty"));
        }

        let positive = [
            ("display.page_size", self.display.page_size as u64),
            ("display.undo_limit", self.display.undo_limit as u64),
            (
                "performance.event_poll_interval_ms",
                self.performance.event_poll_interval_ms,
            ),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(eyre!("{} must be greater than 0", name));
        }

        for (name, value, (lo, hi)) in [
            ("plot.spike_window", self.plot.spike_window, SPIKE_WINDOW_RANGE),
            (
                "plot.smoothing_window",
                self.plot.smoothing_window,
                SMOOTHING_WINDOW_RANGE,
            ),
        ] {
            if !(lo..=hi).contains(&value) {
                return Err(eyre!("{} must be between {} and {}", name, lo, hi));
            }
        }

        if self.normalize.input_format.is_empty() || self.normalize.output_format.is_empty() {
            return Err(eyre!("normalize formats must not be empty"));
        }

        if !matches!(self.theme.color_mode.as_str(), "auto" | "dark" | "light") {
            return Err(eyre!(
                "theme.color_mode must be auto, dark or light, not {:?}",
                self.theme.color_mode
            ));
        }

        let parser = ColorParser::new();
        for (slot, value) in self.theme.colors.entries() {
            parser
                .parse(value)
                .map_err(|e| eyre!("theme.colors.{}: {}", slot, e))?;
        }
        Ok(())
    }

    pub fn csv_options(&self) -> CsvOptions {
        let defaults = CsvOptions::default();
        let loading = &self.file_loading;
        defaults
            .with_delimiter(loading.delimiter.unwrap_or(defaults.delimiter))
            .with_has_header(loading.has_header.unwrap_or(defaults.has_header))
            .with_ignore_errors(loading.ignore_errors.unwrap_or(defaults.ignore_errors))
    }

    pub fn filter_defaults(&self) -> FilterSettings {
        FilterSettings::default()
            .with_spike_window(self.plot.spike_window)
            .with_smoothing_window(self.plot.smoothing_window)
    }
}

const NAMED_COLORS: &[(&[&str], Color)] = &[
    (&["black"], Color::Black),
    (&["red"], Color::Red),
    (&["green"], Color::Green),
    (&["yellow"], Color::Yellow),
    (&["blue"], Color::Blue),
    (&["magenta"], Color::Magenta),
    (&["cyan"], Color::Cyan),
    (&["white"], Color::White),
    (&["bright_black"], Color::Indexed(8)),
    (&["bright_red"], Color::Indexed(9)),
    (&["bright_green"], Color::Indexed(10)),
    (&["bright_yellow"], Color::Indexed(11)),
    (&["bright_blue"], Color::Indexed(12)),
    (&["bright_magenta"], Color::Indexed(13)),
    (&["bright_cyan"], Color::Indexed(14)),
    (&["bright_white"], Color::Indexed(15)),
    (&["gray", "grey", "dark_gray", "dark_grey"], Color::Indexed(8)),
    (&["light_gray", "light_grey"], Color::Indexed(7)),
    // "reversed" is applied as a modifier at render time
    (&["reset", "reversed"], Color::Reset),
];

/// Turns theme strings into terminal colors, downgrading hex colors to what
/// the terminal can show. `NO_COLOR` maps everything to `Reset`.
pub struct ColorParser {
    true_color: bool,
    palette_256: bool,
    no_color: bool,
}

impl ColorParser {
    pub fn new() -> Self {
        let level = supports_color::on(Stream::Stdout);
        Self {
            true_color: level.as_ref().is_some_and(|l| l.has_16m),
            palette_256: level.as_ref().is_some_and(|l| l.has_256),
            no_color: std::env::var_os("NO_COLOR").is_some(),
        }
    }

    /// Parse `#rrggbb`, `indexed(n)` or a color name (case-insensitive, `_` or space).
    pub fn parse(&self, s: &str) -> Result<Color> {
        if self.no_color {
            return Ok(Color::Reset);
        }
        let text = s.trim();
        if text.starts_with('#') && text.len() == 7 {
            let (r, g, b) = parse_hex(text)?;
            return Ok(self.downgrade(r, g, b));
        }
        let lower = text.to_lowercase();
        if let Some(index) = lower
            .strip_prefix("indexed(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return index
                .trim()
                .parse::<u8>()
                .map(Color::Indexed)
                .map_err(|_| eyre!("{:?} is not a palette index; use indexed(0-255)", text));
        }
        let key = lower.replace(' ', "_");
        NAMED_COLORS
            .iter()
            .find(|(names, _)| names.contains(&key.as_str()))
            .map(|(_, color)| *color)
            .ok_or_else(|| {
                eyre!(
                    "Unknown color name: {:?}; use a color name such as red or bright_blue, \
                     #rrggbb or indexed(n)",
                    text
                )
            })
    }

    fn downgrade(&self, r: u8, g: u8, b: u8) -> Color {
        match (self.true_color, self.palette_256) {
            (true, _) => Color::Rgb(r, g, b),
            (false, true) => Color::Indexed(rgb_to_256_color(r, g, b)),
            (false, false) => rgb_to_basic_ansi(r, g, b),
        }
    }
}

impl Default for ColorParser {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_hex(s: &str) -> Result<(u8, u8, u8)> {
    let digits = s
        .strip_prefix('#')
        .filter(|d| d.len() == 6)
        .ok_or_else(|| eyre!("{:?} is not a #rrggbb color", s))?;
    let channel = |at: usize| {
        digits
            .get(at..at + 2)
            .and_then(|h| u8::from_str_radix(h, 16).ok())
            .ok_or_else(|| eyre!("{:?} has a bad hex digit", s))
    };
    Ok((channel(0)?, channel(2)?, channel(4)?))
}

/// Nearest xterm 256-color palette index
pub fn rgb_to_256_color(r: u8, g: u8, b: u8) -> u8 {
    let spread = r.max(g).max(b) - r.min(g).min(b);
    if spread < 10 {
        // grayscale ramp 232-255
        let gray = (r as u16 + g as u16 + b as u16) / 3;
        return match gray {
            0..=7 => 16,
            248.. => 231,
            _ => 232 + ((gray - 8) * 24 / 240) as u8,
        };
    }

    // 6x6x6 cube 16-231
    let step = |c: u8| (c as u16 * 5 / 255) as u8;
    16 + 36 * step(r) + 6 * step(g) + step(b)
}

const BASIC_ANSI: [Color; 8] = [
    Color::Black,
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
];

/// Nearest of the 8 basic ANSI colors
pub fn rgb_to_basic_ansi(r: u8, g: u8, b: u8) -> Color {
    let spread = r.max(g).max(b) - r.min(g).min(b);
    if spread < 30 {
        let luma = (r as u16 + g as u16 + b as u16) / 3;
        return if luma < 64 { Color::Black } else { Color::White };
    }
    // ANSI order is a bitmask: red 1, green 2, blue 4
    let bit = |c: u8, mask: usize| if c > 128 { mask } else { 0 };
    BASIC_ANSI[bit(r, 1) | bit(g, 2) | bit(b, 4)]
}

/// Parsed theme colors keyed by slot name
#[derive(Debug, Clone)]
pub struct Theme {
    pub colors: HashMap<String, Color>,
}

impl Theme {
    pub fn from_config(config: &ThemeConfig) -> Result<Self> {
        let parser = ColorParser::new();
        let colors = config
            .colors
            .entries()
            .into_iter()
            .map(|(slot, value)| -> Result<(String, Color)> {
                Ok((slot.to_string(), parser.parse(value)?))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(Self { colors })
    }

    /// Color by name; `Reset` if unknown
    pub fn get(&self, name: &str) -> Color {
        self.get_optional(name).unwrap_or(Color::Reset)
    }

    pub fn get_optional(&self, name: &str) -> Option<Color> {
        self.colors.get(name).copied()
    }
}

impl Default for Theme {
    fn default() -> Self {
        let parser = ColorParser::new();
        let colors = ColorConfig::default()
            .entries()
            .into_iter()
            .filter_map(|(slot, value)| Some((slot.to_string(), parser.parse(value).ok()?)))
            .collect();
        Self { colors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_merge_takes_changed_fields() {
        let mut base = DisplayConfig {
            page_size: 50,
            ..DisplayConfig::default()
        };
        base.merge(DisplayConfig {
            row_numbers: false,
            ..DisplayConfig::default()
        });
        assert_eq!(base.page_size, 50);
        assert!(!base.row_numbers);
    }

    #[test]
    fn test_color_entries_follow_declaration_order() {
        let colors = ColorConfig::default();
        let entries = colors.entries();
        assert_eq!(entries.len(), 24);
        assert_eq!(entries[0], ("primary", "cyan"));
        assert_eq!(entries[23], ("chart_series_color_6", "red"));
    }

    #[test]
    fn test_normalize_merge() {
        let mut base = NormalizeOptions::default();
        merge_normalize(
            &mut base,
            NormalizeOptions {
                date_prefix: "DATE:".to_string(),
                ..NormalizeOptions::default()
            },
        );
        assert_eq!(base.date_prefix, "DATE:");
        assert_eq!(base.time_prefix, "TOD#");
    }

    #[test]
    fn test_parse_hex_channels() {
        assert_eq!(parse_hex("#0a10ff").unwrap(), (10, 16, 255));
        assert!(parse_hex("#0a10f").is_err());
        assert!(parse_hex("#zz10ff").is_err());
    }
}
