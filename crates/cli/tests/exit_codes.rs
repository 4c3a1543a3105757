//! Drives the `epf` binary far enough to check configuration handling.
//! Every case here fails before a browser would be launched.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{Value, json};
use tempfile::TempDir;

fn epf_binary() -> PathBuf {
	let mut path = std::env::current_exe().expect("current_exe should resolve");
	path.pop();
	path.pop();
	path.push("epf");
	path
}

fn run_epf(config: &Path) -> Output {
	run_epf_with_env(config, &[])
}

fn run_epf_with_env(config: &Path, env: &[(&str, &str)]) -> Output {
	let mut cmd = Command::new(epf_binary());
	cmd.arg("--config").arg(config).env_remove("RUST_LOG").env_remove("EPF_CONFIG");
	for (key, _) in std::env::vars().filter(|(k, _)| k.starts_with("EPF_")) {
		cmd.env_remove(key);
	}
	cmd.envs(env.iter().copied());
	cmd.output().expect("failed to execute epf")
}

fn write_config(dir: &TempDir, doc: &Value) -> PathBuf {
	let path = dir.path().join("epf.json");
	std::fs::write(&path, serde_json::to_string_pretty(doc).unwrap()).unwrap();
	path
}

fn stderr(output: &Output) -> String {
	String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_config_file_exits_with_configuration_code() {
	let dir = TempDir::new().unwrap();
	let output = run_epf(&dir.path().join("absent.json"));

	assert_eq!(output.status.code(), Some(2), "stderr: {}", stderr(&output));
	assert!(stderr(&output).contains("cannot read configuration"));
}

#[test]
fn malformed_config_exits_with_configuration_code() {
	let dir = TempDir::new().unwrap();
	let path = dir.path().join("epf.json");
	std::fs::write(&path, "{ not json").unwrap();

	let output = run_epf(&path);
	assert_eq!(output.status.code(), Some(2));
	assert!(stderr(&output).contains("invalid configuration JSON"));
}

#[test]
fn missing_credentials_exit_before_any_browser_work() {
	let dir = TempDir::new().unwrap();
	let config = write_config(
		&dir,
		&json!({
			"paths": { "configStore": ".env", "diagnosticsDir": "diagnostics" },
			"logging": { "enabled": false }
		}),
	);

	let output = run_epf(&config);
	assert_eq!(output.status.code(), Some(2));
	assert!(stderr(&output).contains("username and password"));
	assert!(!dir.path().join("diagnostics").exists());
	assert!(!dir.path().join(".env").exists());
}

#[test]
fn credentials_file_satisfies_portal_login_but_not_bypass_url() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("credentials.env"), "PORTAL_USERNAME=alice\nPORTAL_PASSWORD='hunter2'\n").unwrap();
	let config = write_config(
		&dir,
		&json!({
			"loginMethod": "challenge-bypass",
			"paths": { "configStore": ".env", "credentialsFile": "credentials.env" },
			"logging": { "enabled": false }
		}),
	);

	let output = run_epf(&config);
	assert_eq!(output.status.code(), Some(2));
	let err = stderr(&output);
	assert!(err.contains("challengeServiceUrl"), "stderr: {err}");
	assert!(!err.contains("hunter2"));
}

#[test]
fn environment_fills_in_credentials_missing_from_file() {
	let dir = TempDir::new().unwrap();
	std::fs::write(dir.path().join("credentials.env"), "PORTAL_USERNAME=alice\n").unwrap();
	let config = write_config(
		&dir,
		&json!({
			"loginMethod": "challenge-bypass",
			"paths": { "configStore": ".env", "credentialsFile": "credentials.env" },
			"logging": { "enabled": false }
		}),
	);

	let without = run_epf(&config);
	assert_eq!(without.status.code(), Some(2));
	assert!(stderr(&without).contains("username and password"));

	let with = run_epf_with_env(&config, &[("EPF_PORTAL_PASSWORD", "hunter2"), ("EPF_PORTAL_USERNAME", "bob")]);
	assert_eq!(with.status.code(), Some(2));
	let err = stderr(&with);
	assert!(!err.contains("username and password"), "stderr: {err}");
	assert!(err.contains("challengeServiceUrl"), "stderr: {err}");
}

#[test]
fn rejected_configuration_is_appended_to_log_file() {
	let dir = TempDir::new().unwrap();
	let log = dir.path().join("logs/epf.log");
	std::fs::create_dir_all(log.parent().unwrap()).unwrap();
	std::fs::write(&log, "earlier run\n").unwrap();
	let config = write_config(
		&dir,
		&json!({
			"portal": { "username": "alice", "password": "hunter2" },
			"paths": { "configStore": ".env" },
			"configStoreKey": "NOT A KEY",
			"logging": { "file": "logs/epf.log", "level": "info" }
		}),
	);

	let output = run_epf(&config);
	assert_eq!(output.status.code(), Some(2));

	let contents = std::fs::read_to_string(&log).unwrap();
	assert!(contents.starts_with("earlier run\n"));
	assert!(contents.contains("configuration rejected"), "log: {contents}");
	assert!(!contents.contains('\u{1b}'), "log file should not carry ANSI escapes");
}
