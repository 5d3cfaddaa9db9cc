use csvduck::i18n::{available_languages, Localization};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

fn read_catalog(language: &str) -> HashMap<String, String> {
    let path = Path::new("locales").join(format!("{}.json", language));
    let text = std::fs::read_to_string(&path).expect("locale file exists");
    serde_json::from_str(&text).expect("locale file is valid JSON")
}

fn placeholders(text: &str) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        match rest[start..].find('}') {
            Some(end) => {
                names.insert(rest[start + 1..start + end].to_string());
                rest = &rest[start + end + 1..];
            }
            None => break,
        }
    }
    names
}

#[test]
fn test_every_language_has_every_key() {
    let english = read_catalog("en");
    for language in available_languages() {
        let catalog = read_catalog(language);
        for key in english.keys() {
            assert!(catalog.contains_key(key), "{} is missing {}", language, key);
        }
        for key in catalog.keys() {
            assert!(english.contains_key(key), "{} has extra key {}", language, key);
        }
    }
}

#[test]
fn test_placeholders_match_english() {
    let english = read_catalog("en");
    for language in available_languages() {
        let catalog = read_catalog(language);
        for (key, text) in &english {
            assert_eq!(
                placeholders(text),
                placeholders(&catalog[key]),
                "{} placeholders differ for {}",
                language,
                key
            );
        }
    }
}

#[test]
fn test_no_empty_translations() {
    for language in available_languages() {
        for (key, text) in read_catalog(language) {
            assert!(!text.trim().is_empty(), "{} has empty {}", language, key);
        }
    }
}

#[test]
fn test_built_in_catalogs_translate() {
    let loc = Localization::new("de");
    assert_eq!(loc.language(), "de");
    assert_ne!(loc.t("controls.quit"), "controls.quit");
    assert_eq!(
        Localization::new("en").t_with("page.label", &[("page", &2), ("max", &5)]),
        "Page 2/5"
    );
}
