use std::path::Path;

use arbiter::{Config, EXAMPLE_CONFIG};

#[test]
fn test_example_file_matches_embedded_config() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("arbiter.example.toml");
    let from_file = Config::from_file(&path).expect("example config should load");

    assert_eq!(from_file.language_ids(), Config::default().language_ids());
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        EXAMPLE_CONFIG
    );
}

#[test]
fn test_every_language_resolves() {
    let config = Config::default();
    for id in ["python", "javascript", "java", "cpp", "c", "rust", "go"] {
        let language = config
            .resolve(id)
            .unwrap_or_else(|e| panic!("{id} should resolve: {e}"));
        assert!(!language.run_command().is_empty());
    }
}
