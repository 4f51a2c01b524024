use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tomodachi_testcontainers::Settings;
use tomodachi_testcontainers::container::{BuildBackend, ImageSource};

#[test]
fn test_settings_file_roundtrip() {
    let mut original = Settings::default();
    original.docker_network = "integration".to_string();
    original.readiness_timeout_secs = Some(45);
    original.image.dockerfile = Some(PathBuf::from("docker/Dockerfile"));
    original.image.target = Some("release".to_string());
    original.image.buildkit = true;

    let toml_str = original
        .to_toml_string()
        .expect("Should be able to serialize settings to TOML");
    assert!(toml_str.contains("docker_network"), "Should contain docker_network field");

    let mut temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    temp_file.write_all(toml_str.as_bytes()).unwrap();

    let loaded = Settings::from_toml_file(temp_file.path())
        .expect("Should be able to load settings from file");
    assert_eq!(original, loaded);
    assert_eq!(loaded.image.backend(), BuildBackend::BuildKit);
}

#[test]
fn test_settings_select_image_source() {
    let settings = Settings::from_toml_str(
        r#"
        [image]
        image_id = "registry.local/service:1.2.3"
        dockerfile = "ignored/Dockerfile"
        "#,
    )
    .unwrap();
    assert_eq!(
        ImageSource::from_settings(&settings),
        ImageSource::External("registry.local/service:1.2.3".to_string())
    );

    let settings = Settings::from_toml_str("[image]\ncontext = \"app\"\n").unwrap();
    match ImageSource::from_settings(&settings) {
        ImageSource::Build(params) => {
            assert_eq!(params.context, Some(PathBuf::from("app")));
            assert_eq!(params.dockerfile, None);
        }
        other => panic!("Expected a build source, got {:?}", other),
    }
}

#[test]
fn test_invalid_settings_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"docker_network = [not a string\n").unwrap();

    let err = Settings::from_toml_file(temp_file.path()).unwrap_err();
    assert!(err.to_string().contains("Invalid settings"));

    let err = Settings::from_toml_file("/nonexistent/testcontainers.toml").unwrap_err();
    assert!(err.to_string().contains("/nonexistent/testcontainers.toml"));
}
