//! Key/value string catalogs per language with English fallback.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

pub const DEFAULT_LANGUAGE: &str = "en";

const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en.json")),
    ("de", include_str!("../locales/de.json")),
    ("pl", include_str!("../locales/pl.json")),
    ("jp", include_str!("../locales/jp.json")),
];

/// Languages with a built-in catalog, in cycling order.
pub fn available_languages() -> Vec<&'static str> {
    BUILTIN_CATALOGS.iter().map(|(code, _)| *code).collect()
}

fn parse_catalog(text: &str) -> Result<HashMap<String, String>> {
    serde_json::from_str(text).map_err(|e| eyre!("Invalid locale file: {}", e))
}

fn builtin_catalog(language: &str) -> HashMap<String, String> {
    BUILTIN_CATALOGS
        .iter()
        .find(|(code, _)| *code == language)
        .and_then(|(_, text)| parse_catalog(text).ok())
        .unwrap_or_default()
}

/// Map a POSIX locale string such as `de_DE.UTF-8` to a catalog code.
pub fn language_from_locale(locale: &str) -> Option<String> {
    let trimmed = locale.trim();
    if trimmed.is_empty() || trimmed == "C" || trimmed == "POSIX" {
        return None;
    }
    let code: String = trimmed.chars().take(2).collect::<String>().to_lowercase();
    let code = match code.as_str() {
        "ja" => "jp".to_string(),
        _ => code,
    };
    available_languages()
        .contains(&code.as_str())
        .then_some(code)
}

/// Language from the environment (`LC_ALL`, `LC_MESSAGES`, `LANG`), or English.
pub fn detect_language() -> String {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| language_from_locale(&value))
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

/// Replace `{name}` placeholders with their values.
pub fn format_placeholders(template: &str, args: &[(&str, &dyn Display)]) -> String {
    let mut out = template.to_string();
    for (name, value) in args {
        out = out.replace(&format!("{{{}}}", name), &value.to_string());
    }
    out
}

#[derive(Debug, Clone)]
pub struct Localization {
    language: String,
    override_dir: Option<PathBuf>,
    strings: HashMap<String, String>,
    fallback: HashMap<String, String>,
}

impl Localization {
    pub fn new(language: &str) -> Self {
        Self::load(language, None)
    }

    /// Built-in catalogs overlaid with `<dir>/<language>.json` when present.
    pub fn with_dir(language: &str, dir: &Path) -> Self {
        Self::load(language, Some(dir.to_path_buf()))
    }

    fn load(language: &str, override_dir: Option<PathBuf>) -> Self {
        let mut loc = Self {
            language: DEFAULT_LANGUAGE.to_string(),
            override_dir,
            strings: HashMap::new(),
            fallback: HashMap::new(),
        };
        loc.fallback = loc.catalog(DEFAULT_LANGUAGE);
        loc.set_language(language);
        loc
    }

    fn catalog(&self, language: &str) -> HashMap<String, String> {
        let mut strings = builtin_catalog(language);
        if let Some(dir) = &self.override_dir {
            let path = dir.join(format!("{}.json", language));
            match std::fs::read_to_string(&path)
                .map_err(color_eyre::Report::from)
                .and_then(|text| parse_catalog(&text))
            {
                Ok(overrides) => strings.extend(overrides),
                Err(e) if path.exists() => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring locale file")
                }
                Err(_) => {}
            }
        }
        strings
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Switch catalogs. Unknown languages fall back to English entirely.
    pub fn set_language(&mut self, language: &str) {
        let strings = self.catalog(language);
        if strings.is_empty() && language != DEFAULT_LANGUAGE {
            tracing::warn!(language, "no catalog for language, using English");
            self.language = DEFAULT_LANGUAGE.to_string();
            self.strings = self.fallback.clone();
        } else {
            self.language = language.to_string();
            self.strings = strings;
        }
    }

    /// Advance to the next built-in language and return its code.
    pub fn cycle_language(&mut self) -> &str {
        let languages = available_languages();
        let idx = languages
            .iter()
            .position(|l| *l == self.language)
            .map(|i| (i + 1) % languages.len())
            .unwrap_or(0);
        self.set_language(languages[idx]);
        &self.language
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        self.strings
            .get(key)
            .or_else(|| self.fallback.get(key))
            .map(String::as_str)
    }

    /// Translated text, falling back to English, then to the key itself.
    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    /// Translated text, falling back to English, then to `default`.
    pub fn t_or(&self, key: &str, default: &str) -> String {
        self.lookup(key).unwrap_or(default).to_string()
    }

    /// Translated text with `{name}` placeholders filled in.
    pub fn t_with(&self, key: &str, args: &[(&str, &dyn Display)]) -> String {
        format_placeholders(self.lookup(key).unwrap_or(key), args)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.strings.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.strings.keys().map(String::as_str)
    }
}

impl Default for Localization {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_language_from_locale() {
        assert_eq!(language_from_locale("de_DE.UTF-8"), Some("de".to_string()));
        assert_eq!(language_from_locale("ja_JP.UTF-8"), Some("jp".to_string()));
        assert_eq!(language_from_locale("pl"), Some("pl".to_string()));
        assert_eq!(language_from_locale("fr_FR.UTF-8"), None);
        assert_eq!(language_from_locale("C"), None);
    }

    #[test]
    fn test_unknown_language_uses_english() {
        let loc = Localization::new("xx");
        assert_eq!(loc.language(), "en");
        assert_eq!(loc.t("controls.quit"), "Quit");
    }

    #[test]
    fn test_fallback_order() {
        let loc = Localization::new("de");
        assert_eq!(loc.t("no.such.key"), "no.such.key");
        assert_eq!(loc.t_or("no.such.key", "Default"), "Default");
        assert_ne!(loc.t("controls.quit"), "controls.quit");
    }

    #[test]
    fn test_placeholders() {
        let loc = Localization::new("en");
        let text = loc.t_with("page.label", &[("page", &2), ("max", &7)]);
        assert_eq!(text, "Page 2/7");
        assert_eq!(
            format_placeholders("{a}-{b}-{a}", &[("a", &1), ("b", &"x")]),
            "1-x-1"
        );
    }

    #[test]
    fn test_cycle_language_visits_all() {
        let mut loc = Localization::new("en");
        let mut seen = vec![loc.language().to_string()];
        for _ in 1..available_languages().len() {
            seen.push(loc.cycle_language().to_string());
        }
        assert_eq!(seen, available_languages());
        assert_eq!(loc.cycle_language(), "en");
    }

    #[test]
    fn test_override_dir_takes_precedence() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("en.json"), r#"{"controls.quit": "Leave"}"#).unwrap();
        let loc = Localization::with_dir("en", dir.path());
        assert_eq!(loc.t("controls.quit"), "Leave");
        assert_eq!(loc.t("controls.import"), "Import");
    }

    #[test]
    fn test_broken_override_is_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("en.json"), "not json").unwrap();
        let loc = Localization::with_dir("en", dir.path());
        assert_eq!(loc.t("controls.quit"), "Quit");
    }
}
