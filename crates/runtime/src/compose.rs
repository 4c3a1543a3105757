//! Compose executable resolution and targeted service recreation.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Failure modes of a compose invocation.
#[derive(Debug, Error)]
pub enum RuntimeError {
	#[error("compose executable not found: {0}")]
	NotFound(String),

	#[error("failed to run {program}: {source}")]
	Spawn {
		program: String,
		#[source]
		source: std::io::Error,
	},

	#[error("{program} exited with {status}: {stderr}")]
	Failed {
		program: String,
		status: String,
		stdout: String,
		stderr: String,
	},
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// A resolved compose front-end: the executable plus any leading arguments
/// (`docker compose` resolves to `docker` with prefix `["compose"]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProgram {
	pub program: PathBuf,
	pub prefix: Vec<String>,
}

impl ComposeProgram {
	/// Resolves the compose front-end.
	///
	/// An explicit command line (e.g. `"docker compose"` or an absolute path)
	/// is looked up as given. Otherwise the standalone `docker-compose` on
	/// `PATH` is preferred, falling back to the `docker compose` plugin.
	pub fn resolve(explicit: Option<&str>) -> Result<Self> {
		if let Some(command) = explicit {
			let mut parts = command.split_whitespace();
			let head = parts.next().ok_or_else(|| RuntimeError::NotFound("empty compose command".into()))?;
			let program = which::which(head).map_err(|e| RuntimeError::NotFound(format!("{head}: {e}")))?;
			return Ok(Self {
				program,
				prefix: parts.map(str::to_string).collect(),
			});
		}

		if let Ok(program) = which::which("docker-compose") {
			return Ok(Self { program, prefix: Vec::new() });
		}

		match which::which("docker") {
			Ok(program) => Ok(Self {
				program,
				prefix: vec!["compose".to_string()],
			}),
			Err(_) => Err(RuntimeError::NotFound("neither docker-compose nor docker is on PATH".into())),
		}
	}

	/// Arguments that recreate exactly `services` from `definition`.
	pub fn recreate_args(&self, definition: &Path, services: &[String]) -> Vec<String> {
		let mut args = self.prefix.clone();
		args.push("-f".to_string());
		args.push(definition.display().to_string());
		args.extend(["up", "-d", "--force-recreate"].map(str::to_string));
		args.extend(services.iter().cloned());
		args
	}

	pub fn display(&self) -> String {
		let mut shown = self.program.display().to_string();
		for arg in &self.prefix {
			shown.push(' ');
			shown.push_str(arg);
		}
		shown
	}
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
	pub stdout: String,
	pub stderr: String,
}

/// Runs `<compose> -f <definition> up -d --force-recreate <services…>` and
/// waits for it to finish.
pub fn recreate_services(compose: &ComposeProgram, definition: &Path, services: &[String]) -> Result<ProcessOutput> {
	let args = compose.recreate_args(definition, services);
	debug!(target = "epf.runtime", program = %compose.display(), ?args, "running compose");

	let output = Command::new(&compose.program).args(&args).output().map_err(|source| {
		if source.kind() == std::io::ErrorKind::NotFound {
			RuntimeError::NotFound(compose.program.display().to_string())
		} else {
			RuntimeError::Spawn {
				program: compose.display(),
				source,
			}
		}
	})?;

	let stdout = String::from_utf8_lossy(&output.stdout).to_string();
	let stderr = String::from_utf8_lossy(&output.stderr).to_string();

	if !output.status.success() {
		return Err(RuntimeError::Failed {
			program: compose.display(),
			status: output.status.to_string(),
			stdout,
			stderr,
		});
	}

	Ok(ProcessOutput { stdout, stderr })
}
