use std::time::Duration;
use tally_engine::common::{RiskLevel, Target};
use tally_engine::config::{ConfigLoader, TallyConfig};

#[test]
fn test_defaults_cover_every_target() {
    let config = TallyConfig::default();
    let registry = config.registry();

    assert_eq!(registry.len(), 3);
    for target in [Target::Risk, Target::Time, Target::Download] {
        let spec = registry.get(target).unwrap();
        assert!(!spec.structural_candidates.is_empty(), "{}", target);
        assert!(!spec.text_aliases.is_empty(), "{}", target);
    }
    assert_eq!(registry.get(Target::Time).unwrap().structural_candidates[0], "#timeHour");

    let policy = config.retry_policy();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay, Duration::from_secs(2));
    assert_eq!(config.data_extensions, vec![".csv", ".tsv"]);
}

#[test]
fn test_partial_yaml_keeps_other_defaults() {
    let yaml = r#"
site:
  base_url: "http://localhost:8080"
retry:
  max_attempts: 5
risk_aliases:
  intermedio: ["Moderado", "Intermedio"]
output:
  write_empty: true
"#;

    let config = ConfigLoader::parse(yaml).unwrap();

    assert_eq!(config.site.base_url, "http://localhost:8080");
    assert_eq!(config.site.login_path, "/login");
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.delay_ms, 2000);
    assert_eq!(config.timeouts.download_event_ms, 30000);
    assert!(config.output.write_empty);
    assert_eq!(config.selectors.len(), 3);
    // A configured table replaces the built-in one.
    assert!(!config.risk_aliases.contains_key("conservador"));
    assert_eq!(
        config.risk_labels(&RiskLevel::parse("intermedio")),
        vec!["Moderado", "Intermedio"]
    );
}

#[test]
fn test_selector_overrides() {
    let yaml = r##"
selectors:
  - target: download
    structural_candidates: ["#export"]
    text_aliases: ["Exportar CSV"]
"##;

    let config = ConfigLoader::parse(yaml).unwrap();
    let registry = config.registry();

    assert_eq!(registry.len(), 1);
    let spec = registry.get(Target::Download).unwrap();
    assert_eq!(spec.structural_candidates, vec!["#export"]);
    assert!(registry.get(Target::Risk).is_none());
}

#[test]
fn test_risk_labels_fall_back_to_key() {
    let config = TallyConfig::default();

    assert_eq!(
        config.risk_labels(&RiskLevel::parse("ultra agresivo"))[0],
        "Ultra Agresivo"
    );
    assert_eq!(
        config.risk_labels(&RiskLevel::parse("custom_level")),
        vec!["Custom Level", "custom_level"]
    );
}

#[test]
fn test_placeholders() {
    let config = TallyConfig::default();
    assert!(config.is_placeholder("Selecciona una hora"));
    assert!(config.is_placeholder("  "));
    assert!(!config.is_placeholder("09:40"));
}

#[test]
fn test_configured_risk_labels_drop_repeats() {
    let yaml = r#"
risk_aliases:
  sesion: ["Sesión", "SESIÓN", " sesión ", "Session"]
"#;
    let config = ConfigLoader::parse(yaml).unwrap();

    assert_eq!(
        config.risk_labels(&RiskLevel::parse("sesion")),
        vec!["Sesión", "Session", "Sesion"]
    );
}

#[test]
fn test_accented_placeholders_match_any_case() {
    let mut config = TallyConfig::default();
    config.placeholders.push("Elige una opción".into());

    assert!(config.is_placeholder("ELIGE UNA OPCIÓN"));
    assert!(!config.is_placeholder("Opción 1"));
}

#[test]
fn test_invalid_yaml_is_a_parse_error() {
    assert!(ConfigLoader::parse("retry: [1, 2").is_err());
}

#[tokio::test]
async fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.yaml");
    std::fs::write(&path, "timeouts:\n  step_ms: 500\n").unwrap();

    let config = ConfigLoader::load_from(&path).await.unwrap();
    assert_eq!(config.timeouts.step(), Duration::from_millis(500));

    assert!(ConfigLoader::load_from(&dir.path().join("missing.yaml")).await.is_err());
}

#[test]
fn test_search_paths_prefer_working_directory() {
    let paths = ConfigLoader::search_paths();
    assert_eq!(paths[0], std::path::PathBuf::from("tally.yaml"));
    if let Some(home) = paths.get(1) {
        assert!(home.ends_with(".tally/config.yaml"));
    }
}

#[tokio::test]
async fn test_load_first_existing_file_wins() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("tally.yaml");
    let home = dir.path().join("config.yaml");
    std::fs::write(&home, "retry:\n  max_attempts: 7\n").unwrap();

    let config = ConfigLoader::load_first(&[missing.clone(), home]).await.unwrap();
    assert_eq!(config.retry.max_attempts, 7);

    let config = ConfigLoader::load_first(&[missing]).await.unwrap();
    assert_eq!(config.retry.max_attempts, 3);

    std::fs::write(dir.path().join("bad.yaml"), "retry: [1, 2").unwrap();
    assert!(ConfigLoader::load_first(&[dir.path().join("bad.yaml")]).await.is_err());
}
