use dupescan::config::{Config, ConfigError, Overrides};
use dupescan::scanner::HashAlgorithm;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

// Environment variables are process-wide.
static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn config_file(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_default_config_serializes() {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config).unwrap();
    assert!(toml_str.contains("hash_algorithm = \"sha512\""));
    assert!(toml_str.contains("queue_depth_factor = 10"));

    let parsed: Config = toml::from_str(&toml_str).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_partial_file_keeps_defaults() {
    let dir = TempDir::new().unwrap();
    let path = config_file(&dir, "shutdown_grace_secs = 30\ntraverse_links = true\n");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .extract()
        .unwrap();

    assert_eq!(config.shutdown_grace_secs, 30);
    assert!(config.traverse_links);
    assert_eq!(config.hash_algorithm, "sha512");
    assert_eq!(config.workers, 0);
}

#[test]
fn test_env_overrides_file_and_cli_overrides_env() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = config_file(&dir, "hash_algorithm = \"sha256\"\nworkers = 2\n");

    std::env::set_var("DUPESCAN_HASH_ALGORITHM", "blake3");
    std::env::set_var("DUPESCAN_WORKERS", "6");

    let from_env = Config::load(Some(&path), &Overrides::default());
    let from_cli = Config::load(
        Some(&path),
        &Overrides {
            workers: Some(9),
            ..Overrides::default()
        },
    );

    std::env::remove_var("DUPESCAN_HASH_ALGORITHM");
    std::env::remove_var("DUPESCAN_WORKERS");

    let from_env = from_env.unwrap();
    assert_eq!(from_env.algorithm().unwrap(), HashAlgorithm::Blake3);
    assert_eq!(from_env.workers, 6);

    let from_cli = from_cli.unwrap();
    assert_eq!(from_cli.workers, 9);
    assert_eq!(from_cli.hash_algorithm, "blake3");
}

#[test]
fn test_env_prefix_is_required() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    std::env::set_var("HASH_ALGORITHM", "blake3");

    let config: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DUPESCAN_").split("__"))
        .extract();

    std::env::remove_var("HASH_ALGORITHM");
    assert_eq!(config.unwrap().hash_algorithm, "sha512");
}

#[test]
fn test_invalid_toml_fails() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = config_file(&dir, "workers = [not valid");

    assert!(matches!(
        Config::load(Some(&path), &Overrides::default()),
        Err(ConfigError::Load(_))
    ));
}

#[test]
fn test_wrong_type_fails() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = config_file(&dir, "workers = \"many\"\n");

    assert!(Config::load(Some(&path), &Overrides::default()).is_err());
}

#[test]
fn test_unsupported_algorithm_in_file() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = config_file(&dir, "hash_algorithm = \"md5\"\n");

    let err = Config::load(Some(&path), &Overrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::UnsupportedAlgorithm(_)));
    assert!(err.to_string().contains("md5"));
}

#[test]
fn test_database_override() {
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let dir = TempDir::new().unwrap();
    let path = config_file(&dir, "database_path = \"/from/file.db\"\n");

    let config = Config::load(Some(&path), &Overrides::default()).unwrap();
    assert_eq!(config.database_path().unwrap(), PathBuf::from("/from/file.db"));

    let config = Config::load(
        Some(&path),
        &Overrides {
            database_path: Some(PathBuf::from("/from/cli.db")),
            ..Overrides::default()
        },
    )
    .unwrap();
    assert_eq!(config.database_path().unwrap(), PathBuf::from("/from/cli.db"));
}
