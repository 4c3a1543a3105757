//! One end-to-end run: session, negotiation, propagation.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::browser::{BrowserLauncher, PortalBrowser};
use crate::config::Config;
use crate::diagnostics::capture_failure;
use crate::error::{EpfError, Result};
use crate::lock::RunLock;
use crate::negotiate::{PortCandidate, PortNegotiator};
use crate::pacing::Pacer;
use crate::session::{ChallengeSolver, CookieStore, SessionAcquirer};
use crate::sync::{ConfigStore, DownstreamSynchronizer, PreferenceClient, ProcessRestarter, SyncReport, last_known_port};

/// Collaborators a run is wired with.
#[derive(Clone, Copy)]
pub struct RunDeps<'a> {
	pub launcher: &'a dyn BrowserLauncher,
	/// Required for the `challenge-bypass` login method.
	pub solver: Option<&'a dyn ChallengeSolver>,
	pub pacer: &'a dyn Pacer,
	pub config_store: &'a dyn ConfigStore,
	/// Required when `updateRemotePreference` is on.
	pub preferences: Option<&'a dyn PreferenceClient>,
	pub restarter: &'a dyn ProcessRestarter,
}

/// A run that obtained a port. Sync failures live in `report`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
	pub candidate: PortCandidate,
	pub last_known: Option<u16>,
	pub report: SyncReport,
}

/// A run that aborted before a port was obtained.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
	#[source]
	pub error: EpfError,
	/// Screenshot of the page the run failed on, when one was captured.
	pub artifact: Option<PathBuf>,
}

impl From<EpfError> for RunFailure {
	fn from(error: EpfError) -> Self {
		Self { error, artifact: None }
	}
}

/// Owns the run's browser and guarantees it is torn down.
///
/// [`release`](Self::release) closes the browser gracefully. If the lease is
/// dropped without it (panic, early return) the driver is dropped, which
/// kills the browser process.
pub struct BrowserLease {
	browser: Box<dyn PortalBrowser>,
	released: bool,
}

impl BrowserLease {
	pub fn new(browser: Box<dyn PortalBrowser>) -> Self {
		Self { browser, released: false }
	}

	pub fn browser(&mut self) -> &mut dyn PortalBrowser {
		self.browser.as_mut()
	}

	pub async fn release(mut self) {
		if let Err(e) = self.browser.close().await {
			warn!(target = "epf.run", error = %e, "browser did not close cleanly");
		}
		self.released = true;
	}
}

impl Drop for BrowserLease {
	fn drop(&mut self) {
		if !self.released {
			warn!(target = "epf.run", "browser lease dropped without release; killing browser");
		}
	}
}

/// Sequences the components for a single run.
pub struct Orchestrator<'a> {
	config: &'a Config,
	deps: RunDeps<'a>,
	cookie_store: CookieStore,
}

impl<'a> Orchestrator<'a> {
	pub fn new(config: &'a Config, deps: RunDeps<'a>) -> Self {
		Self {
			config,
			deps,
			cookie_store: CookieStore::new(config.paths.cookie_store.clone()),
		}
	}

	/// Runs once. Propagation never starts without a freshly issued port.
	pub async fn run(&self) -> std::result::Result<RunOutcome, RunFailure> {
		let _lock = self.config.paths.lock_file.as_deref().map(RunLock::acquire).transpose()?;

		let last_known = last_known_port(self.deps.config_store, &self.config.config_store_key);
		info!(target = "epf.run", last_known = ?last_known, method = ?self.config.login_method, "run started");

		let browser = self.deps.launcher.launch(&self.config.browser).await?;
		let mut lease = BrowserLease::new(browser);

		let candidate = match self.obtain_port(lease.browser()).await {
			Ok(candidate) => candidate,
			Err(error) => {
				let artifact = capture_failure(lease.browser(), &self.config.paths.diagnostics_dir()).await;
				lease.release().await;
				error!(
					target = "epf.run",
					kind = error.kind(),
					error = %error,
					artifact = ?artifact,
					"run aborted"
				);
				return Err(RunFailure { error, artifact });
			}
		};
		lease.release().await;

		let synchronizer = DownstreamSynchronizer::new(self.config, self.deps.config_store, self.deps.preferences, self.deps.restarter);
		let report = synchronizer.sync(&candidate, last_known).await;

		let failures = report.failures();
		if failures.is_empty() {
			info!(target = "epf.run", port = candidate.value(), "run finished");
		} else {
			warn!(target = "epf.run", port = candidate.value(), ?failures, "run finished with propagation failures");
		}

		Ok(RunOutcome {
			candidate,
			last_known,
			report,
		})
	}

	async fn obtain_port(&self, browser: &mut dyn PortalBrowser) -> Result<PortCandidate> {
		let acquirer = SessionAcquirer::new(self.config, &self.cookie_store, self.deps.solver, self.deps.pacer);
		let mut session = acquirer.acquire(browser).await?;
		info!(target = "epf.run", source = ?session.source, "session established");

		let mut negotiator = PortNegotiator::new(self.config, self.deps.pacer);
		negotiator.negotiate(&mut session).await.inspect_err(|_| {
			warn!(target = "epf.run", state = ?negotiator.state(), "negotiation stopped");
		})
	}
}
