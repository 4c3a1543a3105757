//! Wires the production collaborators into a single run.

use anyhow::{Context, Result};
use epf::browser::ChromiumLauncher;
use epf::pacing::HumanPacer;
use epf::session::{ChallengeSolver, FlareSolverrClient};
use epf::sync::{ComposeRestarter, EnvFileStore, PreferenceClient, QbittorrentClient};
use epf::{Config, LoginMethod, Orchestrator, RunDeps};
use tracing::{error, info};

/// Runs once against a validated configuration and returns the exit code.
///
/// Propagation failures still exit `0`; they are logged and reported in the
/// summary line.
pub async fn run(config: &Config) -> Result<i32> {
	let solver = match config.login_method {
		LoginMethod::ChallengeBypass => {
			let endpoint = config.challenge_service_url.as_deref().context("challengeServiceUrl is not set")?;
			Some(FlareSolverrClient::new(endpoint, config.timeouts.challenge_solver(), config.timeouts.http()).context("building challenge service client")?)
		}
		LoginMethod::Direct => None,
	};

	let preferences = if config.update_remote_preference {
		let tc = &config.torrent_client;
		let (Some(host), Some(username), Some(password)) = (tc.host.as_deref(), tc.username.as_deref(), tc.password.clone()) else {
			anyhow::bail!("torrentClient settings are incomplete");
		};
		Some(QbittorrentClient::new(host, username, password, config.timeouts.http()).context("building torrent client")?)
	} else {
		None
	};

	let store_path = config.paths.config_store.as_deref().context("paths.configStore is not set")?;
	let store = EnvFileStore::new(store_path);
	let restarter = ComposeRestarter::new(config.process_group.command.clone());
	let pacer = HumanPacer::default();

	let deps = RunDeps {
		launcher: &ChromiumLauncher,
		solver: solver.as_ref().map(|s| s as &dyn ChallengeSolver),
		pacer: &pacer,
		config_store: &store,
		preferences: preferences.as_ref().map(|p| p as &dyn PreferenceClient),
		restarter: &restarter,
	};

	match Orchestrator::new(config, deps).run().await {
		Ok(outcome) => {
			println!("port {}: {}", outcome.candidate, outcome.report);
			Ok(0)
		}
		Err(failure) => {
			if let Some(artifact) = &failure.artifact {
				info!(target = "epf.run", path = %artifact.display(), "diagnostic screenshot saved");
			}
			error!(target = "epf.run", kind = failure.error.kind(), error = %failure.error, "no port obtained");
			eprintln!("epf: {}", failure.error);
			Ok(failure.error.exit_code())
		}
	}
}
