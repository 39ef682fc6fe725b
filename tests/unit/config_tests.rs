use mc_warden::{config::GlobalConfig, AppError};

fn toml_for(root: &str, state: &str, extra: &str) -> String {
    format!(
        r#"
server_root = '{root}'
state_dir = '{state}'
{extra}
"#
    )
}

#[test]
fn minimal_config_applies_defaults() {
    let root = tempfile::tempdir().expect("root");
    let state = tempfile::tempdir().expect("state");
    let raw = toml_for(
        root.path().to_str().expect("utf8"),
        state.path().to_str().expect("utf8"),
        "",
    );

    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(config.http_bind, "127.0.0.1");
    assert_eq!(config.http_port, 8765);
    assert_eq!(config.rcon.port, 25575);
    assert_eq!(config.launch.java, "java");
    assert!(config.logs.capacity >= config.logs.history_max);
    assert_eq!(
        config.server_root,
        root.path().canonicalize().expect("canonical")
    );
    assert!(config.db_path().starts_with(&config.state_dir));
    assert!(config.backup_dir().starts_with(&config.state_dir));
}

#[test]
fn sections_override_defaults() {
    let root = tempfile::tempdir().expect("root");
    let state = tempfile::tempdir().expect("state");
    let raw = toml_for(
        root.path().to_str().expect("utf8"),
        state.path().to_str().expect("utf8"),
        r#"
http_port = 9000

[rcon]
port = 25580
command_timeout_seconds = 3

[launch]
max_memory = "4G"
extra_args = ["-XX:+UseG1GC"]

[backups]
data_dirs = ["world"]
"#,
    );

    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    assert_eq!(config.http_port, 9000);
    assert_eq!(config.rcon.port, 25580);
    assert_eq!(config.rcon.command_timeout().as_secs(), 3);
    assert!(config.launch.memory_flags().contains(&"-Xmx4G".to_owned()));
    assert_eq!(config.backups.data_dirs, vec!["world"]);
}

#[test]
fn missing_server_root_is_rejected() {
    let state = tempfile::tempdir().expect("state");
    let raw = toml_for(
        "/definitely/not/a/real/root",
        state.path().to_str().expect("utf8"),
        "",
    );

    let result = GlobalConfig::from_toml_str(&raw);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn state_dir_inside_root_is_rejected() {
    let root = tempfile::tempdir().expect("root");
    let state = root.path().join(".mc-warden");
    let raw = toml_for(
        root.path().to_str().expect("utf8"),
        state.to_str().expect("utf8"),
        "",
    );

    let result = GlobalConfig::from_toml_str(&raw);

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn zero_log_capacity_is_rejected() {
    let root = tempfile::tempdir().expect("root");
    let state = tempfile::tempdir().expect("state");
    let raw = toml_for(
        root.path().to_str().expect("utf8"),
        state.path().to_str().expect("utf8"),
        "[logs]\ncapacity = 0\n",
    );

    assert!(GlobalConfig::from_toml_str(&raw).is_err());
}

#[test]
fn inverted_backoff_bounds_are_rejected() {
    let root = tempfile::tempdir().expect("root");
    let state = tempfile::tempdir().expect("state");
    let raw = toml_for(
        root.path().to_str().expect("utf8"),
        state.path().to_str().expect("utf8"),
        "[rcon]\nreconnect_floor_ms = 5000\nreconnect_ceiling_ms = 100\n",
    );

    assert!(GlobalConfig::from_toml_str(&raw).is_err());
}

#[test]
fn invalid_toml_is_a_config_error() {
    let result = GlobalConfig::from_toml_str("server_root = [");

    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
fn server_root_override_revalidates() {
    let root = tempfile::tempdir().expect("root");
    let other = tempfile::tempdir().expect("other");
    let state = tempfile::tempdir().expect("state");
    let raw = toml_for(
        root.path().to_str().expect("utf8"),
        state.path().to_str().expect("utf8"),
        "",
    );
    let mut config = GlobalConfig::from_toml_str(&raw).expect("valid config");

    config.override_server_root(other.path()).expect("override");
    assert_eq!(
        config.server_root,
        other.path().canonicalize().expect("canonical")
    );

    assert!(config.override_server_root("/no/such/root").is_err());
}
