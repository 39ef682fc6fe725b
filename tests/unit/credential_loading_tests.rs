//! Credential loading: keychain first, then environment.
//!
//! These tests mutate process-global env vars and run serially. The
//! `mc-warden` keychain service is absent in test environments, so the
//! env var path is the one exercised.

use mc_warden::config::{GlobalConfig, RCON_PASSWORD_KEYS, TOKEN_SECRET_KEYS};

fn make_config() -> (tempfile::TempDir, tempfile::TempDir, GlobalConfig) {
    let root = tempfile::tempdir().expect("root");
    let state = tempfile::tempdir().expect("state");
    let raw = format!(
        "server_root = '{}'\nstate_dir = '{}'\n",
        root.path().to_str().expect("utf8"),
        state.path().to_str().expect("utf8"),
    );
    let config = GlobalConfig::from_toml_str(&raw).expect("valid config");
    (root, state, config)
}

fn clear_env() {
    std::env::remove_var(RCON_PASSWORD_KEYS.1);
    std::env::remove_var(TOKEN_SECRET_KEYS.1);
}

#[tokio::test]
#[serial_test::serial]
async fn env_vars_fill_both_secrets() {
    let (_root, _state, mut config) = make_config();
    std::env::set_var(RCON_PASSWORD_KEYS.1, "rcon-from-env");
    std::env::set_var(TOKEN_SECRET_KEYS.1, "secret-from-env");

    let result = config.load_credentials().await;
    clear_env();

    result.expect("credentials load from env");
    assert_eq!(config.rcon.password, "rcon-from-env");
    assert_eq!(config.auth.token_secret, "secret-from-env");
}

#[tokio::test]
#[serial_test::serial]
async fn missing_secret_error_names_both_sources() {
    let (_root, _state, mut config) = make_config();
    clear_env();

    let err = config
        .load_credentials()
        .await
        .expect_err("no source provides the password");
    let msg = err.to_string();

    assert!(msg.contains("mc-warden"), "names keychain service: {msg}");
    assert!(msg.contains("MC_WARDEN_RCON_PASSWORD"), "names env var: {msg}");
}

#[tokio::test]
#[serial_test::serial]
async fn empty_env_var_counts_as_missing() {
    let (_root, _state, mut config) = make_config();
    std::env::set_var(RCON_PASSWORD_KEYS.1, "rcon-from-env");
    std::env::set_var(TOKEN_SECRET_KEYS.1, "");

    let result = config.load_credentials().await;
    clear_env();

    let msg = result.expect_err("empty secret rejected").to_string();
    assert!(msg.contains("MC_WARDEN_TOKEN_SECRET"), "got: {msg}");
}
