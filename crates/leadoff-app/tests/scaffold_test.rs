// Integration tests for the leadoff tracker scaffold.

use std::path::Path;

/// Verify that defaults/tracker.toml is valid TOML with every section.
#[test]
fn tracker_defaults_are_valid_toml() {
    let content = std::fs::read_to_string("defaults/tracker.toml")
        .expect("defaults/tracker.toml should exist");
    let parsed: toml::Value = toml::from_str(&content)
        .unwrap_or_else(|e| panic!("defaults/tracker.toml is not valid TOML: {e}"));
    for section in ["polling", "feed", "database", "watchlist"] {
        assert!(
            parsed.get(section).is_some(),
            "defaults/tracker.toml is missing [{section}]"
        );
    }
}

/// Verify that the recorded feed fixtures are valid JSON.
#[test]
fn feed_fixtures_are_valid_json() {
    let content = std::fs::read_to_string("tests/fixtures/live_feed_end_of_top_7th.json")
        .expect("live feed fixture should exist");
    let parsed: Result<serde_json::Value, _> = serde_json::from_str(&content);
    assert!(parsed.is_ok(), "fixture is not valid JSON: {:?}", parsed.err());
}

/// Verify that all expected directories exist.
#[test]
fn directory_structure_exists() {
    for dir in ["src", "defaults", "tests", "tests/fixtures"] {
        assert!(Path::new(dir).is_dir(), "Expected directory '{}' to exist", dir);
    }
}
