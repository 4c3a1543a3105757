//! Compose service recreation.

use std::path::Path;

use async_trait::async_trait;
use epf_runtime::{ComposeProgram, ProcessOutput, RuntimeError, recreate_services};

use super::ProcessRestarter;
use crate::error::{EpfError, Result};

/// Recreates services through the compose front-end found on `PATH` (or
/// the configured command line).
#[derive(Debug, Clone, Default)]
pub struct ComposeRestarter {
	command: Option<String>,
}

impl ComposeRestarter {
	pub fn new(command: Option<String>) -> Self {
		Self { command }
	}
}

#[async_trait]
impl ProcessRestarter for ComposeRestarter {
	async fn recreate(&self, definition: &Path, services: &[String]) -> Result<ProcessOutput> {
		let command = self.command.clone();
		let definition = definition.to_path_buf();
		let services = services.to_vec();

		let result = tokio::task::spawn_blocking(move || {
			let program = ComposeProgram::resolve(command.as_deref())?;
			recreate_services(&program, &definition, &services)
		})
		.await
		.map_err(|e| EpfError::ContainerRestart(format!("restart task aborted: {e}")))?;

		result.map_err(|e| match e {
			RuntimeError::Failed { program, status, stdout, stderr } => EpfError::ContainerRestart(format!(
				"{program} exited with {status}; stdout: {}; stderr: {}",
				stdout.trim(),
				stderr.trim()
			)),
			other => EpfError::ContainerRestart(other.to_string()),
		})
	}
}

#[cfg(all(test, unix))]
mod tests {
	use std::os::unix::fs::PermissionsExt;

	use tempfile::TempDir;

	use super::*;

	fn script(dir: &TempDir, body: &str) -> String {
		let path = dir.path().join("compose");
		std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path.display().to_string()
	}

	#[tokio::test]
	async fn passes_definition_and_services() {
		let dir = TempDir::new().unwrap();
		let restarter = ComposeRestarter::new(Some(script(&dir, "echo \"$@\"")));
		let out = restarter
			.recreate(Path::new("/srv/compose.yml"), &["gluetun".into(), "qbittorrent".into()])
			.await
			.unwrap();
		assert_eq!(out.stdout.trim(), "-f /srv/compose.yml up -d --force-recreate gluetun qbittorrent");
	}

	#[tokio::test]
	async fn failure_carries_process_output() {
		let dir = TempDir::new().unwrap();
		let restarter = ComposeRestarter::new(Some(script(&dir, "echo pulling; echo 'no such service' >&2; exit 1")));
		let err = restarter.recreate(Path::new("compose.yml"), &["vpn".into()]).await.unwrap_err();
		let msg = err.to_string();
		assert!(matches!(err, EpfError::ContainerRestart(_)));
		assert!(msg.contains("no such service") && msg.contains("pulling"), "{msg}");
	}

	#[tokio::test]
	async fn missing_executable_is_a_restart_error() {
		let restarter = ComposeRestarter::new(Some("/nonexistent/compose-binary".into()));
		let err = restarter.recreate(Path::new("compose.yml"), &["vpn".into()]).await.unwrap_err();
		assert!(matches!(err, EpfError::ContainerRestart(_)));
	}
}
