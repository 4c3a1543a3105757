use std::path::PathBuf;

use epf::config::{PollConfig, Secret, Timeouts};
use epf::fake::{FakeConfigStore, FakeLauncher, FakePortal, FakePreferenceClient, FakeRestarter, FakeSolver};
use epf::pacing::NoPacer;
use epf::session::ChallengeSolver;
use epf::sync::{ConfigStore, EnvFileStore, PreferenceClient, SkipReason, TargetOutcome};
use epf::{Config, EpfError, LoginMethod, Orchestrator, RunDeps};
use epf_protocol::{Cookie, CookieJar, LISTEN_PORT_PREF};
use tempfile::TempDir;

const KEY: &str = "VPN_PORT_FORWARDED";

struct Workspace {
	dir: TempDir,
	config: Config,
}

impl Workspace {
	fn new() -> Self {
		let dir = TempDir::new().unwrap();
		let definition = dir.path().join("docker-compose.yml");
		std::fs::write(&definition, "services:\n  gluetun: {}\n  qbittorrent: {}\n").unwrap();

		let mut config = Config::default();
		config.portal.username = "alice".into();
		config.portal.password = Secret::new("hunter2");
		config.paths.config_store = Some(dir.path().join(".env"));
		config.paths.diagnostics_dir = Some(dir.path().join("diagnostics"));
		config.process_group.definition_path = Some(definition);
		config.config_store_poll = PollConfig { attempts: 3, interval_ms: 1 };
		config.timeouts = Timeouts::immediate();
		Self { dir, config }
	}

	fn diagnostics(&self) -> Vec<PathBuf> {
		match std::fs::read_dir(self.dir.path().join("diagnostics")) {
			Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
			Err(_) => Vec::new(),
		}
	}
}

fn deps<'a>(
	launcher: &'a FakeLauncher,
	store: &'a dyn ConfigStore,
	prefs: &'a FakePreferenceClient,
	restarter: &'a FakeRestarter,
	solver: Option<&'a FakeSolver>,
) -> RunDeps<'a> {
	RunDeps {
		launcher,
		solver: solver.map(|s| s as &dyn ChallengeSolver),
		pacer: &NoPacer,
		config_store: store,
		preferences: Some(prefs as &dyn PreferenceClient),
		restarter,
	}
}

#[tokio::test]
async fn unchanged_port_skips_every_target() {
	let ws = Workspace::new();
	let portal = FakePortal::default().with_existing_port().issuing("51413");
	let launcher = FakeLauncher::new(portal.clone());
	let store = FakeConfigStore::default().with_value(KEY, "51413");
	let prefs = FakePreferenceClient::default().with_preference(LISTEN_PORT_PREF, 1);
	let restarter = FakeRestarter::default();

	let outcome = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap();

	assert_eq!(outcome.candidate.value(), 51413);
	assert_eq!(outcome.last_known, Some(51413));
	assert!(outcome.report.is_unchanged());
	assert!(store.writes().is_empty());
	assert!(prefs.calls().is_empty());
	assert!(restarter.calls().is_empty());
	assert!(portal.is_closed());
}

#[tokio::test]
async fn new_port_propagates_to_all_targets() {
	let mut ws = Workspace::new();
	ws.config.update_remote_preference = true;
	let env_path = ws.dir.path().join(".env");
	std::fs::write(&env_path, "# vpn\nTZ=UTC\nVPN_PORT_FORWARDED=51413\n").unwrap();

	let portal = FakePortal::default().with_existing_port().issuing("60222");
	let launcher = FakeLauncher::new(portal.clone());
	let store = EnvFileStore::new(&env_path);
	let prefs = FakePreferenceClient::default().with_preference(LISTEN_PORT_PREF, 51413);
	let restarter = FakeRestarter::default();

	let outcome = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap();

	assert_eq!(outcome.candidate.value(), 60222);
	assert_eq!(outcome.last_known, Some(51413));
	assert_eq!(outcome.report.config_store, TargetOutcome::Applied);
	assert_eq!(outcome.report.remote_preference, TargetOutcome::Applied);
	assert_eq!(outcome.report.process_group, TargetOutcome::Applied);

	assert_eq!(std::fs::read_to_string(&env_path).unwrap(), "# vpn\nTZ=UTC\nVPN_PORT_FORWARDED=60222\n");
	assert_eq!(prefs.stored(LISTEN_PORT_PREF), Some(60222));
	assert_eq!(restarter.calls()[0].1, ["gluetun", "qbittorrent"]);
	assert!(!portal.has_existing_port());
	assert!(portal.is_closed());
}

#[tokio::test]
async fn unparseable_port_aborts_with_artifact_and_no_sync() {
	let ws = Workspace::new();
	let portal = FakePortal::default().issuing("abc");
	let launcher = FakeLauncher::new(portal.clone());
	let store = FakeConfigStore::default().with_value(KEY, "51413");
	let prefs = FakePreferenceClient::default();
	let restarter = FakeRestarter::default();

	let failure = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap_err();

	match &failure.error {
		EpfError::PortParse { text, .. } => assert_eq!(text, "abc"),
		other => panic!("expected PortParse, got {other:?}"),
	}
	assert_eq!(failure.error.exit_code(), 1);
	let artifact = failure.artifact.clone().expect("artifact should be captured");
	assert!(artifact.exists());
	assert!(artifact.file_name().unwrap().to_string_lossy().starts_with("epf-failure-"));
	assert_eq!(ws.diagnostics(), [artifact]);

	assert!(store.writes().is_empty());
	assert!(prefs.calls().is_empty());
	assert!(restarter.calls().is_empty());
	assert!(portal.is_closed());
}

#[tokio::test]
async fn unreachable_challenge_service_aborts_before_login() {
	let mut ws = Workspace::new();
	ws.config.login_method = LoginMethod::ChallengeBypass;
	ws.config.challenge_service_url = Some("http://127.0.0.1:9/v1".into());

	let portal = FakePortal::default().issuing("60222");
	let launcher = FakeLauncher::new(portal.clone());
	let store = FakeConfigStore::default();
	let prefs = FakePreferenceClient::default();
	let restarter = FakeRestarter::default();
	let solver = FakeSolver::unreachable();

	let failure = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, Some(&solver)))
		.run()
		.await
		.unwrap_err();

	assert!(matches!(failure.error, EpfError::ChallengeBypass(_)), "{:?}", failure.error);
	assert!(failure.error.is_auth());
	assert!(!portal.was_clicked(&ws.config.portal.selectors.login_button));
	assert!(portal.filled(&ws.config.portal.selectors.username_input).is_none());
	assert!(store.writes().is_empty());
	assert!(portal.is_closed());
}

#[tokio::test]
async fn login_timeout_is_fatal_and_captured() {
	let ws = Workspace::new();
	let portal = FakePortal::default().rejecting_login().issuing("60222");
	let launcher = FakeLauncher::new(portal.clone());
	let store = FakeConfigStore::default();
	let prefs = FakePreferenceClient::default();
	let restarter = FakeRestarter::default();

	let failure = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap_err();

	assert!(matches!(failure.error, EpfError::Auth(_)));
	assert!(failure.artifact.is_some());
	assert_eq!(portal.click_count(&ws.config.portal.selectors.login_button), 1);
	assert!(portal.is_closed());
}

#[tokio::test]
async fn launch_failure_has_no_artifact() {
	let ws = Workspace::new();
	let launcher = FakeLauncher::failing();
	let store = FakeConfigStore::default();
	let prefs = FakePreferenceClient::default();
	let restarter = FakeRestarter::default();

	let failure = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap_err();

	assert!(matches!(failure.error, EpfError::Browser(_)));
	assert!(failure.artifact.is_none());
	assert!(ws.diagnostics().is_empty());
}

#[tokio::test]
async fn stored_cookies_skip_the_login_form() {
	let mut ws = Workspace::new();
	let cookie_path = ws.dir.path().join("cookies.json");
	let cookie = Cookie::new(FakePortal::SESSION_COOKIE, "remembered").with_domain(".windscribe.com");
	std::fs::write(&cookie_path, CookieJar::new(vec![cookie.clone()]).to_json().unwrap()).unwrap();
	ws.config.paths.cookie_store = Some(cookie_path);
	ws.config.restart_process_group = false;

	let portal = FakePortal::default().with_replayable_cookie(cookie).issuing("60222");
	let launcher = FakeLauncher::new(portal.clone());
	let store = FakeConfigStore::default();
	let prefs = FakePreferenceClient::default();
	let restarter = FakeRestarter::default();

	let outcome = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap();

	assert_eq!(outcome.last_known, None);
	assert_eq!(outcome.report.config_store, TargetOutcome::Applied);
	assert_eq!(outcome.report.remote_preference, TargetOutcome::Skipped(SkipReason::Disabled));
	assert_eq!(outcome.report.process_group, TargetOutcome::Skipped(SkipReason::Disabled));
	assert!(!portal.was_clicked(&ws.config.portal.selectors.login_button));
}

#[tokio::test]
async fn live_lock_holder_blocks_the_run() {
	let mut ws = Workspace::new();
	let lock_path = ws.dir.path().join("epf.lock");
	std::fs::write(&lock_path, std::process::id().to_string()).unwrap();
	ws.config.paths.lock_file = Some(lock_path.clone());

	let launcher = FakeLauncher::new(FakePortal::default().issuing("60222"));
	let store = FakeConfigStore::default();
	let prefs = FakePreferenceClient::default();
	let restarter = FakeRestarter::default();

	let failure = Orchestrator::new(&ws.config, deps(&launcher, &store, &prefs, &restarter, None)).run().await.unwrap_err();

	assert!(matches!(failure.error, EpfError::RunLocked { .. }), "{:?}", failure.error);
	assert_eq!(launcher.launches(), 0);
	assert!(lock_path.exists());
}
