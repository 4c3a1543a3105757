//! Propagation of a newly issued port to downstream targets.
//!
//! [`DownstreamSynchronizer::sync`] applies the port to the configuration
//! store, the torrent client preference and the compose process group, in
//! that order. Targets are independent: a failure is recorded in the
//! [`SyncReport`] and the next target is still attempted. There is no
//! rollback.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use epf_protocol::LISTEN_PORT_PREF;
use epf_runtime::ProcessOutput;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{EpfError, Result};
use crate::negotiate::{PortCandidate, parse_port};

pub mod config_store;
pub mod preferences;
pub mod restart;

pub use config_store::EnvFileStore;
pub use preferences::QbittorrentClient;
pub use restart::ComposeRestarter;

/// Line-oriented key/value store holding the forwarded port.
pub trait ConfigStore: Send + Sync {
	fn location(&self) -> &Path;

	/// Current value of `key`; a missing store reads as `None`.
	fn read(&self, key: &str) -> Result<Option<String>>;

	fn write(&self, key: &str, value: &str) -> Result<()>;
}

/// Remote client exposing named numeric preferences.
#[async_trait]
pub trait PreferenceClient: Send + Sync {
	async fn login(&self) -> Result<()>;

	async fn preference(&self, name: &str) -> Result<Option<i64>>;

	async fn set_preference(&self, name: &str, value: i64) -> Result<()>;
}

/// Recreates a named set of services from a definition file.
#[async_trait]
pub trait ProcessRestarter: Send + Sync {
	async fn recreate(&self, definition: &Path, services: &[String]) -> Result<ProcessOutput>;
}

/// Reads the port recorded by a previous run. Missing or unparseable
/// values read as `None`.
pub fn last_known_port(store: &dyn ConfigStore, key: &str) -> Option<u16> {
	match store.read(key) {
		Ok(Some(raw)) => match parse_port(&raw) {
			Ok(port) => Some(port),
			Err(e) => {
				warn!(target = "epf.sync", path = %store.location().display(), %key, error = %e, "stored port unusable; treating as unknown");
				None
			}
		},
		Ok(None) => None,
		Err(e) => {
			warn!(target = "epf.sync", path = %store.location().display(), error = %e, "config store unreadable; treating port as unknown");
			None
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTarget {
	ConfigStore,
	RemotePreference,
	ProcessGroup,
}

impl fmt::Display for SyncTarget {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::ConfigStore => "config-store",
			Self::RemotePreference => "remote-preference",
			Self::ProcessGroup => "process-group",
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	/// The issued port equals the last known one.
	Unchanged,
	/// The target's feature flag is off.
	Disabled,
	/// The process group definition file does not exist.
	DefinitionMissing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
	Skipped(SkipReason),
	AlreadyCurrent,
	Applied,
	Failed(String),
}

impl TargetOutcome {
	pub fn is_failed(&self) -> bool {
		matches!(self, Self::Failed(_))
	}
}

impl fmt::Display for TargetOutcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Skipped(SkipReason::Unchanged) => f.write_str("skipped (unchanged)"),
			Self::Skipped(SkipReason::Disabled) => f.write_str("skipped (disabled)"),
			Self::Skipped(SkipReason::DefinitionMissing) => f.write_str("skipped (definition missing)"),
			Self::AlreadyCurrent => f.write_str("already current"),
			Self::Applied => f.write_str("applied"),
			Self::Failed(reason) => write!(f, "failed: {reason}"),
		}
	}
}

/// Per-target result of one synchronisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
	pub config_store: TargetOutcome,
	pub remote_preference: TargetOutcome,
	pub process_group: TargetOutcome,
}

impl SyncReport {
	fn unchanged() -> Self {
		Self {
			config_store: TargetOutcome::Skipped(SkipReason::Unchanged),
			remote_preference: TargetOutcome::Skipped(SkipReason::Unchanged),
			process_group: TargetOutcome::Skipped(SkipReason::Unchanged),
		}
	}

	pub fn outcomes(&self) -> [(SyncTarget, &TargetOutcome); 3] {
		[
			(SyncTarget::ConfigStore, &self.config_store),
			(SyncTarget::RemotePreference, &self.remote_preference),
			(SyncTarget::ProcessGroup, &self.process_group),
		]
	}

	pub fn is_unchanged(&self) -> bool {
		self.outcomes().iter().all(|(_, o)| **o == TargetOutcome::Skipped(SkipReason::Unchanged))
	}

	pub fn failures(&self) -> Vec<SyncTarget> {
		self.outcomes().into_iter().filter(|(_, o)| o.is_failed()).map(|(t, _)| t).collect()
	}
}

impl fmt::Display for SyncReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for (target, outcome) in self.outcomes() {
			if !first {
				f.write_str(", ")?;
			}
			first = false;
			write!(f, "{target}: {outcome}")?;
		}
		Ok(())
	}
}

fn failed(target: SyncTarget, err: EpfError) -> TargetOutcome {
	error!(target = "epf.sync", sync_target = %target, kind = err.kind(), error = %err, "sync target failed");
	TargetOutcome::Failed(err.to_string())
}

/// Applies a port to every enabled downstream target.
pub struct DownstreamSynchronizer<'a> {
	config: &'a Config,
	store: &'a dyn ConfigStore,
	preferences: Option<&'a dyn PreferenceClient>,
	restarter: &'a dyn ProcessRestarter,
}

impl<'a> DownstreamSynchronizer<'a> {
	/// `preferences` is only consulted when `updateRemotePreference` is on.
	pub fn new(config: &'a Config, store: &'a dyn ConfigStore, preferences: Option<&'a dyn PreferenceClient>, restarter: &'a dyn ProcessRestarter) -> Self {
		Self {
			config,
			store,
			preferences,
			restarter,
		}
	}

	/// Never fails; every target outcome lands in the report.
	pub async fn sync(&self, candidate: &PortCandidate, last_known: Option<u16>) -> SyncReport {
		let port = candidate.value();
		if last_known == Some(port) {
			info!(target = "epf.sync", port, "port unchanged; nothing to propagate");
			return SyncReport::unchanged();
		}
		info!(target = "epf.sync", port, previous = ?last_known, "propagating new port");

		let config_store = match self.write_config_store(port).await {
			Ok(()) => TargetOutcome::Applied,
			Err(e) => failed(SyncTarget::ConfigStore, e),
		};
		let remote_preference = self.update_remote_preference(port).await;
		let process_group = self.restart_process_group().await;

		let report = SyncReport {
			config_store,
			remote_preference,
			process_group,
		};
		info!(target = "epf.sync", %report, "sync finished");
		report
	}

	async fn write_config_store(&self, port: u16) -> Result<()> {
		let key = self.config.config_store_key.as_str();
		let value = port.to_string();
		let path = self.store.location().to_path_buf();

		self.store.write(key, &value).map_err(|e| match e {
			EpfError::ConfigWrite { .. } => e,
			other => EpfError::ConfigWrite {
				path: path.clone(),
				reason: other.to_string(),
			},
		})?;

		let poll = self.config.config_store_poll;
		for attempt in 1..=poll.attempts {
			match self.store.read(key) {
				Ok(Some(current)) if current == value => {
					info!(target = "epf.sync", path = %path.display(), %key, port, attempt, "config store updated");
					return Ok(());
				}
				Ok(current) => debug!(target = "epf.sync", attempt, ?current, "config store not yet updated"),
				Err(e) => debug!(target = "epf.sync", attempt, error = %e, "config store read-back failed"),
			}
			if attempt < poll.attempts {
				tokio::time::sleep(poll.interval()).await;
			}
		}

		Err(EpfError::ConfigWrite {
			path,
			reason: format!("{key} did not read back as {value} after {} attempts", poll.attempts),
		})
	}

	async fn update_remote_preference(&self, port: u16) -> TargetOutcome {
		if !self.config.update_remote_preference {
			debug!(target = "epf.sync", "remote preference update disabled");
			return TargetOutcome::Skipped(SkipReason::Disabled);
		}
		let Some(client) = self.preferences else {
			return failed(SyncTarget::RemotePreference, EpfError::RemoteService("no torrent client configured".into()));
		};

		match Self::apply_preference(client, port).await {
			Ok(outcome) => outcome,
			Err(e) => {
				let e = match e {
					EpfError::RemoteService(_) => e,
					other => EpfError::RemoteService(other.to_string()),
				};
				failed(SyncTarget::RemotePreference, e)
			}
		}
	}

	async fn apply_preference(client: &dyn PreferenceClient, port: u16) -> Result<TargetOutcome> {
		client.login().await?;
		let current = client.preference(LISTEN_PORT_PREF).await?;
		if current == Some(i64::from(port)) {
			info!(target = "epf.sync", port, "torrent client already listening on port");
			return Ok(TargetOutcome::AlreadyCurrent);
		}
		client.set_preference(LISTEN_PORT_PREF, i64::from(port)).await?;
		info!(target = "epf.sync", port, previous = ?current, "torrent client listen port updated");
		Ok(TargetOutcome::Applied)
	}

	async fn restart_process_group(&self) -> TargetOutcome {
		if !self.config.restart_process_group {
			debug!(target = "epf.sync", "process group restart disabled");
			return TargetOutcome::Skipped(SkipReason::Disabled);
		}
		let group = &self.config.process_group;
		let Some(definition) = group.definition_path.as_deref().filter(|p| p.is_file()) else {
			warn!(target = "epf.sync", path = ?group.definition_path, "process group definition missing; skipping restart");
			return TargetOutcome::Skipped(SkipReason::DefinitionMissing);
		};
		let services: Vec<String> = group.services.iter().map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string).collect();

		info!(target = "epf.sync", definition = %definition.display(), ?services, "recreating services");
		match self.restarter.recreate(definition, &services).await {
			Ok(output) => {
				for line in output.stdout.lines().chain(output.stderr.lines()).filter(|l| !l.trim().is_empty()) {
					info!(target = "epf.sync", "compose: {line}");
				}
				TargetOutcome::Applied
			}
			Err(e) => {
				let e = match e {
					EpfError::ContainerRestart(_) => e,
					other => EpfError::ContainerRestart(other.to_string()),
				};
				failed(SyncTarget::ProcessGroup, e)
			}
		}
	}
}
