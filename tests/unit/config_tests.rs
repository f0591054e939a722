use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use git_webhook_listener::config::{
    load_dotenv, GlobalConfig, ENV_LISTEN_IP, ENV_LISTEN_PORT, ENV_REPOSITORY_PATH,
};
use git_webhook_listener::mode::FailureMode;
use git_webhook_listener::models::command::CommandSpec;
use git_webhook_listener::AppError;

fn sample_toml(repository: &str) -> String {
    format!(
        r#"
listen_ip = "127.0.0.1"
listen_port = 9000
repository_path = '{repository}'
output_dir = "site/public"
trigger_path = "/hooks/push"
on_failure = "keep_serving"
max_logged_body_bytes = 512

[commands]
sync = ["git", "pull", "--ff-only"]
generate = ["zola", "build"]
serve = ["zola", "serve", "--port", "1111"]

[server]
stop_grace_seconds = 3
"#
    )
}

fn minimal_toml(repository: &str) -> String {
    format!(
        r#"
listen_ip = "0.0.0.0"
listen_port = 8080
repository_path = '{repository}'
"#
    )
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().expect("canonicalize temp path")
}

#[test]
fn parses_valid_config() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = sample_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.listen_ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(config.listen_port, 9000);
    assert_eq!(config.repository_path, canonical(temp.path()));
    assert_eq!(config.output_dir, PathBuf::from("site/public"));
    assert_eq!(config.trigger_path, "/hooks/push");
    assert_eq!(config.on_failure, FailureMode::KeepServing);
    assert_eq!(config.max_logged_body_bytes, 512);
    assert_eq!(
        config.commands.sync,
        CommandSpec::new("git", ["pull", "--ff-only"])
    );
    assert_eq!(config.commands.generate, CommandSpec::new("zola", ["build"]));
    assert_eq!(config.commands.serve.program(), "zola");
    assert_eq!(config.server.stop_grace_seconds, 3);
}

#[test]
fn applies_defaults_for_optional_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.output_dir, PathBuf::from("public"));
    assert_eq!(config.trigger_path, "/trigger");
    assert_eq!(config.on_failure, FailureMode::Shutdown);
    assert_eq!(config.max_logged_body_bytes, 4096);
    assert_eq!(config.commands.sync, CommandSpec::new("git", ["pull"]));
    assert_eq!(config.commands.generate.to_string(), "hugo");
    assert_eq!(config.commands.serve.to_string(), "hugo server");
    assert_eq!(config.stop_grace().as_secs(), 10);
}

#[test]
fn derived_addresses_and_paths() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8 path"));

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");
    assert_eq!(config.output_path(), canonical(temp.path()).join("public"));
}

#[test]
fn environment_alone_supplies_required_values() {
    let temp = tempfile::tempdir().expect("tempdir");
    let repo = temp.path().to_str().expect("utf8 path");
    let env = env_from(&[
        (ENV_LISTEN_IP, "10.0.0.5"),
        (ENV_LISTEN_PORT, "7070"),
        (ENV_REPOSITORY_PATH, repo),
    ]);

    let config = GlobalConfig::from_toml_str_with_env("", env).expect("config resolves");

    assert_eq!(config.bind_addr().to_string(), "10.0.0.5:7070");
    assert_eq!(config.repository_path, canonical(temp.path()));
}

#[test]
fn environment_overrides_file_values() {
    let file_repo = tempfile::tempdir().expect("tempdir");
    let env_repo = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(file_repo.path().to_str().expect("utf8 path"));
    let env = env_from(&[
        (ENV_LISTEN_PORT, "9999"),
        (ENV_REPOSITORY_PATH, env_repo.path().to_str().expect("utf8")),
    ]);

    let config = GlobalConfig::from_toml_str_with_env(&toml, env).expect("config resolves");

    assert_eq!(config.listen_port, 9999);
    assert_eq!(config.listen_ip.to_string(), "0.0.0.0");
    assert_eq!(config.repository_path, canonical(env_repo.path()));
}

#[test]
fn rejects_missing_listen_ip_naming_env_var() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "listen_port = 8080\nrepository_path = '{}'\n",
        temp.path().to_str().expect("utf8")
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("listen_ip is required");

    assert!(matches!(err, AppError::Config(_)));
    assert!(
        err.to_string().contains(ENV_LISTEN_IP),
        "error should name the env var, got: {err}"
    );
}

#[test]
fn rejects_missing_repository_path() {
    let toml = "listen_ip = \"127.0.0.1\"\nlisten_port = 8080\n";
    let err = GlobalConfig::from_toml_str(toml).expect_err("repository_path is required");
    assert!(err.to_string().contains(ENV_REPOSITORY_PATH));
}

#[test]
fn rejects_nonexistent_repository_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let missing = temp.path().join("does-not-exist");
    let toml = minimal_toml(missing.to_str().expect("utf8"));

    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn rejects_repository_path_that_is_a_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let file = temp.path().join("README.md");
    std::fs::write(&file, "# site").expect("write file");
    let toml = minimal_toml(file.to_str().expect("utf8"));

    let err = GlobalConfig::from_toml_str(&toml).expect_err("file is not a repository");
    assert!(err.to_string().contains("not a directory"));
}

#[test]
fn accepts_port_given_as_string() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "listen_ip = \"127.0.0.1\"\nlisten_port = \"8081\"\nrepository_path = '{}'\n",
        temp.path().to_str().expect("utf8")
    );

    let config = GlobalConfig::from_toml_str(&toml).expect("config parses");
    assert_eq!(config.listen_port, 8081);
}

#[test]
fn rejects_out_of_range_port() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = env_from(&[(ENV_LISTEN_PORT, "70000")]);
    let toml = minimal_toml(temp.path().to_str().expect("utf8"));

    assert!(GlobalConfig::from_toml_str_with_env(&toml, env).is_err());
}

#[test]
fn rejects_invalid_listen_ip() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env = env_from(&[(ENV_LISTEN_IP, "not-an-ip")]);
    let toml = minimal_toml(temp.path().to_str().expect("utf8"));

    let err = GlobalConfig::from_toml_str_with_env(&toml, env).expect_err("ip must parse");
    assert!(err.to_string().contains("not-an-ip"));
}

#[test]
fn rejects_output_dir_escaping_repository() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "{}output_dir = \"../elsewhere\"\n",
        minimal_toml(temp.path().to_str().expect("utf8"))
    );

    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn rejects_trigger_path_without_leading_slash() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "{}trigger_path = \"trigger\"\n",
        minimal_toml(temp.path().to_str().expect("utf8"))
    );

    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn rejects_empty_command() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "{}\n[commands]\ngenerate = []\n",
        minimal_toml(temp.path().to_str().expect("utf8"))
    );

    let err = GlobalConfig::from_toml_str(&toml).expect_err("empty command rejected");
    assert!(err.to_string().contains("command must not be empty"));
}

#[test]
fn rejects_unknown_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = format!(
        "{}listen_addr = \"127.0.0.1\"\n",
        minimal_toml(temp.path().to_str().expect("utf8"))
    );

    assert!(GlobalConfig::from_toml_str(&toml).is_err());
}

#[test]
fn set_repository_path_canonicalizes_and_validates() {
    let temp = tempfile::tempdir().expect("tempdir");
    let other = tempfile::tempdir().expect("tempdir");
    let toml = minimal_toml(temp.path().to_str().expect("utf8"));
    let mut config = GlobalConfig::from_toml_str(&toml).expect("config parses");

    config
        .set_repository_path(other.path())
        .expect("existing directory accepted");
    assert_eq!(config.repository_path, canonical(other.path()));

    let result = config.set_repository_path(other.path().join("missing"));
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial_test::serial]
fn load_reads_file_from_disk() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("config.toml");
    std::fs::write(&path, sample_toml(temp.path().to_str().expect("utf8"))).expect("write");

    let config = GlobalConfig::load(Some(path.as_path())).expect("config loads");
    assert_eq!(config.trigger_path, "/hooks/push");
}

#[test]
fn load_reports_unreadable_file() {
    let temp = tempfile::tempdir().expect("tempdir");
    let err = GlobalConfig::load(Some(temp.path().join("absent.toml").as_path()))
        .expect_err("missing file fails");
    assert!(err.to_string().starts_with("config: failed to read config"));
}

#[test]
#[serial_test::serial]
fn load_without_file_uses_process_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::env::set_var(ENV_LISTEN_IP, "127.0.0.1");
    std::env::set_var(ENV_LISTEN_PORT, "6060");
    std::env::set_var(ENV_REPOSITORY_PATH, temp.path());

    let result = GlobalConfig::load(None);

    std::env::remove_var(ENV_LISTEN_IP);
    std::env::remove_var(ENV_LISTEN_PORT);
    std::env::remove_var(ENV_REPOSITORY_PATH);

    let config = result.expect("config from env");
    assert_eq!(config.listen_port, 6060);
    assert_eq!(config.repository_path, canonical(temp.path()));
}

#[test]
#[serial_test::serial]
fn load_without_file_or_environment_fails() {
    std::env::remove_var(ENV_LISTEN_IP);
    std::env::remove_var(ENV_LISTEN_PORT);
    std::env::remove_var(ENV_REPOSITORY_PATH);

    let result = GlobalConfig::load(None);
    assert!(matches!(result, Err(AppError::Config(_))));
}

#[test]
#[serial_test::serial]
fn dotenv_file_supplies_missing_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env_file = temp.path().join(".env");
    std::fs::write(
        &env_file,
        format!(
            "{ENV_LISTEN_IP}=127.0.0.1\n{ENV_LISTEN_PORT}=5050\n{ENV_REPOSITORY_PATH}={}\n",
            temp.path().display()
        ),
    )
    .expect("write .env");
    std::env::remove_var(ENV_LISTEN_IP);
    std::env::remove_var(ENV_LISTEN_PORT);
    std::env::remove_var(ENV_REPOSITORY_PATH);

    let loaded = load_dotenv(&env_file);
    let result = GlobalConfig::load(None);

    std::env::remove_var(ENV_LISTEN_IP);
    std::env::remove_var(ENV_LISTEN_PORT);
    std::env::remove_var(ENV_REPOSITORY_PATH);

    assert!(loaded.expect(".env parses"));
    let config = result.expect("config from .env");
    assert_eq!(config.listen_port, 5050);
    assert_eq!(config.repository_path, canonical(temp.path()));
}

#[test]
#[serial_test::serial]
fn dotenv_does_not_override_existing_environment() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env_file = temp.path().join(".env");
    std::fs::write(&env_file, format!("{ENV_LISTEN_PORT}=5050\n")).expect("write .env");
    std::env::set_var(ENV_LISTEN_PORT, "6060");

    let loaded = load_dotenv(&env_file);
    let port = std::env::var(ENV_LISTEN_PORT);

    std::env::remove_var(ENV_LISTEN_PORT);

    assert!(loaded.expect(".env parses"));
    assert_eq!(port.as_deref(), Ok("6060"));
}

#[test]
fn absent_dotenv_file_is_skipped() {
    let temp = tempfile::tempdir().expect("tempdir");
    let loaded = load_dotenv(&temp.path().join(".env")).expect("absent file is fine");
    assert!(!loaded);
}

#[test]
fn malformed_dotenv_file_is_config_error() {
    let temp = tempfile::tempdir().expect("tempdir");
    let env_file = temp.path().join(".env");
    std::fs::write(&env_file, "GIT_WEBHOOK_UNUSED_KEY='unterminated\n").expect("write .env");

    let err = load_dotenv(&env_file).expect_err("unterminated quote rejected");

    assert!(matches!(err, AppError::Config(_)));
    assert!(err.to_string().contains(".env"));
}
