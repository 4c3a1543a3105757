//! Error taxonomy for a run.
//!
//! Fatal errors abort the run before synchronisation and map to a non-zero
//! exit. `ConfigWrite`, `RemoteService` and `ContainerRestart` are only
//! ever raised inside the synchroniser, which records them in the report
//! and carries on.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EpfError>;

#[derive(Debug, Error)]
pub enum EpfError {
	/// Pre-flight validation failure; raised before any browser or network activity.
	#[error("configuration error: {0}")]
	Configuration(String),

	#[error("authentication failed: {0}")]
	Auth(String),

	/// The challenge-solving service could not provide a session.
	#[error("challenge bypass failed: {0}")]
	ChallengeBypass(String),

	#[error("timed out after {timeout:?} waiting for {step}")]
	NavigationTimeout { step: String, timeout: Duration },

	#[error("invalid port value {text:?}: {reason}")]
	PortParse { text: String, reason: String },

	#[error("config store write failed for {}: {reason}", path.display())]
	ConfigWrite { path: PathBuf, reason: String },

	#[error("remote service error: {0}")]
	RemoteService(String),

	#[error("container restart failed: {0}")]
	ContainerRestart(String),

	#[error("browser error: {0}")]
	Browser(String),

	#[error("another run{} holds the lock at {}", holder.map(|pid| format!(" (pid {pid})")).unwrap_or_default(), path.display())]
	RunLocked { path: PathBuf, holder: Option<u32> },

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl EpfError {
	pub fn navigation_timeout(step: impl Into<String>, timeout: Duration) -> Self {
		Self::NavigationTimeout { step: step.into(), timeout }
	}

	pub fn port_parse(text: impl Into<String>, reason: impl Into<String>) -> Self {
		Self::PortParse {
			text: text.into(),
			reason: reason.into(),
		}
	}

	/// True for authentication failures, including challenge-bypass failures.
	pub fn is_auth(&self) -> bool {
		matches!(self, Self::Auth(_) | Self::ChallengeBypass(_))
	}

	/// Whether this error aborts the run. Downstream propagation errors do not.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, Self::ConfigWrite { .. } | Self::RemoteService(_) | Self::ContainerRestart(_))
	}

	/// Short tag used in log lines and reports.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Configuration(_) => "ConfigurationError",
			Self::Auth(_) => "AuthError",
			Self::ChallengeBypass(_) => "ChallengeBypassError",
			Self::NavigationTimeout { .. } => "NavigationTimeout",
			Self::PortParse { .. } => "PortParseError",
			Self::ConfigWrite { .. } => "ConfigWriteError",
			Self::RemoteService(_) => "RemoteServiceError",
			Self::ContainerRestart(_) => "ContainerRestartError",
			Self::Browser(_) => "BrowserError",
			Self::RunLocked { .. } => "RunLocked",
			Self::Io(_) => "IoError",
			Self::Json(_) => "JsonError",
		}
	}

	/// Process exit status for this error.
	pub fn exit_code(&self) -> i32 {
		match self {
			Self::Configuration(_) => 2,
			_ => 1,
		}
	}
}
