//! Run configuration.
//!
//! A [`Config`] is built once at startup (JSON file, then the optional
//! `KEY=VALUE` credentials file, then `EPF_*` environment variables),
//! validated, and passed by reference to every component. Nothing reads
//! configuration after that point.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use epf_protocol::EnvDocument;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::browser::Locator;
use crate::error::{EpfError, Result};

/// Prefix for environment variables that override configuration values.
pub const ENV_PREFIX: &str = "EPF_";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// How the portal session is established when no replayable cookies exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginMethod {
	#[default]
	Direct,
	ChallengeBypass,
}

/// A string whose value never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}

	pub fn is_empty(&self) -> bool {
		self.0.trim().is_empty()
	}
}

impl fmt::Debug for Secret {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() { f.write_str("\"\"") } else { f.write_str("\"***\"") }
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	pub login_method: LoginMethod,
	pub challenge_service_url: Option<String>,
	pub portal: PortalConfig,
	pub torrent_client: TorrentClientConfig,
	pub update_remote_preference: bool,
	pub restart_process_group: bool,
	pub process_group: ProcessGroupConfig,
	pub paths: PathsConfig,
	pub config_store_key: String,
	pub config_store_poll: PollConfig,
	pub timeouts: Timeouts,
	pub browser: BrowserSettings,
	pub logging: LoggingConfig,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			login_method: LoginMethod::Direct,
			challenge_service_url: None,
			portal: PortalConfig::default(),
			torrent_client: TorrentClientConfig::default(),
			update_remote_preference: false,
			restart_process_group: true,
			process_group: ProcessGroupConfig::default(),
			paths: PathsConfig::default(),
			config_store_key: "VPN_PORT_FORWARDED".to_string(),
			config_store_poll: PollConfig::default(),
			timeouts: Timeouts::default(),
			browser: BrowserSettings::default(),
			logging: LoggingConfig::default(),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortalConfig {
	pub username: String,
	pub password: Secret,
	pub base_url: String,
	pub login_path: String,
	pub account_path: String,
	pub selectors: PortalSelectors,
}

impl Default for PortalConfig {
	fn default() -> Self {
		Self {
			username: String::new(),
			password: Secret::default(),
			base_url: "https://windscribe.com".to_string(),
			login_path: "/login".to_string(),
			account_path: "/myaccount".to_string(),
			selectors: PortalSelectors::default(),
		}
	}
}

impl PortalConfig {
	pub fn login_url(&self) -> String {
		join_url(&self.base_url, &self.login_path)
	}

	pub fn account_url(&self) -> String {
		join_url(&self.base_url, &self.account_path)
	}
}

fn join_url(base: &str, path: &str) -> String {
	format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Element locators for the portal pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortalSelectors {
	pub username_input: Locator,
	pub password_input: Locator,
	pub login_button: Locator,
	pub port_forwarding_menu: Locator,
	pub ephemeral_tab: Locator,
	pub delete_port_button: Locator,
	/// Confirmation control some portal revisions show after "Delete Port".
	pub delete_confirm_button: Option<Locator>,
	pub request_port_button: Locator,
	pub port_value: Locator,
}

impl Default for PortalSelectors {
	fn default() -> Self {
		Self {
			username_input: Locator::css("#username"),
			password_input: Locator::css("#pass"),
			login_button: Locator::css("#login_button"),
			port_forwarding_menu: Locator::css("#menu-ports"),
			ephemeral_tab: Locator::css("#pf-eph-btn"),
			delete_port_button: Locator::xpath("//button[normalize-space()='Delete Port']"),
			delete_confirm_button: None,
			request_port_button: Locator::xpath("//button[normalize-space()='Request Matching Port']"),
			port_value: Locator::css("#epf-port-info > span"),
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TorrentClientConfig {
	pub host: Option<String>,
	pub username: Option<String>,
	pub password: Option<Secret>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessGroupConfig {
	pub definition_path: Option<PathBuf>,
	pub services: Vec<String>,
	/// Compose front-end command line; resolved from `PATH` when unset.
	pub command: Option<String>,
}

impl Default for ProcessGroupConfig {
	fn default() -> Self {
		Self {
			definition_path: None,
			services: vec!["gluetun".to_string(), "qbittorrent".to_string()],
			command: None,
		}
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PathsConfig {
	pub config_store: Option<PathBuf>,
	pub cookie_store: Option<PathBuf>,
	pub diagnostics_dir: Option<PathBuf>,
	pub credentials_file: Option<PathBuf>,
	pub lock_file: Option<PathBuf>,
}

impl PathsConfig {
	/// Directory for failure screenshots; the system temp dir when unset.
	pub fn diagnostics_dir(&self) -> PathBuf {
		self.diagnostics_dir.clone().unwrap_or_else(|| std::env::temp_dir().join("epf"))
	}
}

/// Read-after-write verification of the configuration store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollConfig {
	pub attempts: u32,
	pub interval_ms: u64,
}

impl Default for PollConfig {
	fn default() -> Self {
		Self {
			attempts: 5,
			interval_ms: 1000,
		}
	}
}

impl PollConfig {
	pub fn interval(&self) -> Duration {
		Duration::from_millis(self.interval_ms)
	}
}

/// Bounded waits, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Timeouts {
	pub navigation_ms: u64,
	pub login_ms: u64,
	pub cookie_replay_ms: u64,
	pub existing_port_ms: u64,
	pub delete_confirm_ms: u64,
	pub port_value_ms: u64,
	pub challenge_solver_ms: u64,
	pub http_ms: u64,
	pub poll_interval_ms: u64,
}

impl Default for Timeouts {
	fn default() -> Self {
		Self {
			navigation_ms: 20_000,
			login_ms: 20_000,
			cookie_replay_ms: 10_000,
			existing_port_ms: 5_000,
			delete_confirm_ms: 10_000,
			port_value_ms: 15_000,
			challenge_solver_ms: 20_000,
			http_ms: 10_000,
			poll_interval_ms: 250,
		}
	}
}

impl Timeouts {
	pub fn navigation(&self) -> Duration {
		Duration::from_millis(self.navigation_ms)
	}

	pub fn login(&self) -> Duration {
		Duration::from_millis(self.login_ms)
	}

	pub fn cookie_replay(&self) -> Duration {
		Duration::from_millis(self.cookie_replay_ms)
	}

	pub fn existing_port(&self) -> Duration {
		Duration::from_millis(self.existing_port_ms)
	}

	pub fn delete_confirm(&self) -> Duration {
		Duration::from_millis(self.delete_confirm_ms)
	}

	pub fn port_value(&self) -> Duration {
		Duration::from_millis(self.port_value_ms)
	}

	pub fn challenge_solver(&self) -> Duration {
		Duration::from_millis(self.challenge_solver_ms)
	}

	pub fn http(&self) -> Duration {
		Duration::from_millis(self.http_ms)
	}

	pub fn poll_interval(&self) -> Duration {
		Duration::from_millis(self.poll_interval_ms)
	}

	/// Millisecond timeouts for tests: every wait expires almost at once.
	pub fn immediate() -> Self {
		Self {
			navigation_ms: 30,
			login_ms: 30,
			cookie_replay_ms: 30,
			existing_port_ms: 30,
			delete_confirm_ms: 30,
			port_value_ms: 30,
			challenge_solver_ms: 500,
			http_ms: 2_000,
			poll_interval_ms: 5,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrowserSettings {
	pub headless: bool,
	pub user_agent: String,
	pub executable: Option<PathBuf>,
}

impl Default for BrowserSettings {
	fn default() -> Self {
		Self {
			headless: true,
			user_agent: DEFAULT_USER_AGENT.to_string(),
			executable: None,
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggingConfig {
	pub enabled: bool,
	pub file: Option<PathBuf>,
	pub level: String,
}

impl Default for LoggingConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			file: None,
			level: "info".to_string(),
		}
	}
}

impl Config {
	/// Parses a JSON configuration document without overlays or validation.
	pub fn from_json(json: &str) -> Result<Self> {
		serde_json::from_str(json).map_err(|e| EpfError::Configuration(format!("invalid configuration JSON: {e}")))
	}

	/// Loads the configuration file, resolves relative paths against its
	/// directory, then applies the credentials file and `EPF_*` environment
	/// overlays. Call [`Config::validate`] before using the result.
	pub fn load(path: &Path) -> Result<Self> {
		Self::load_with_env(path, std::env::vars())
	}

	/// [`Config::load`] with an explicit process environment.
	pub fn load_with_env<I>(path: &Path, env: I) -> Result<Self>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		let json = std::fs::read_to_string(path).map_err(|e| EpfError::Configuration(format!("cannot read configuration {}: {e}", path.display())))?;
		let mut config = Self::from_json(&json)?;

		if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			config.resolve_relative_paths(base);
		}

		if let Some(creds) = config.paths.credentials_file.clone() {
			let text = std::fs::read_to_string(&creds)
				.map_err(|e| EpfError::Configuration(format!("cannot read credentials file {}: {e}", creds.display())))?;
			let doc = EnvDocument::parse(&text);
			config.apply_overrides(doc.entries().map(|(k, v)| (k.to_string(), v)));
			debug!(target = "epf.config", path = %creds.display(), "applied credentials file");
		}

		config.apply_overrides(env.into_iter().filter_map(|(k, v)| k.strip_prefix(ENV_PREFIX).map(|k| (k.to_string(), v))));
		Ok(config)
	}

	/// Applies credential-style overrides keyed without the `EPF_` prefix.
	/// Unknown keys are ignored; empty values do not clear existing ones.
	pub fn apply_overrides<I>(&mut self, vars: I)
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			if value.trim().is_empty() {
				continue;
			}
			match key.as_str() {
				"PORTAL_USERNAME" | "WS_USERNAME" => self.portal.username = value,
				"PORTAL_PASSWORD" | "WS_PASSWORD" => self.portal.password = Secret::new(value),
				"TORRENT_HOST" | "QBIT_HOST" => self.torrent_client.host = Some(value),
				"TORRENT_USERNAME" | "QBIT_USERNAME" => self.torrent_client.username = Some(value),
				"TORRENT_PASSWORD" | "QBIT_PASSWORD" => self.torrent_client.password = Some(Secret::new(value)),
				"CHALLENGE_SERVICE_URL" => self.challenge_service_url = Some(value),
				_ => {}
			}
		}
	}

	fn resolve_relative_paths(&mut self, base: &Path) {
		let resolve = |p: &mut Option<PathBuf>| {
			if let Some(path) = p.as_mut() {
				if path.is_relative() {
					*path = base.join(&*path);
				}
			}
		};
		resolve(&mut self.paths.config_store);
		resolve(&mut self.paths.cookie_store);
		resolve(&mut self.paths.diagnostics_dir);
		resolve(&mut self.paths.credentials_file);
		resolve(&mut self.paths.lock_file);
		resolve(&mut self.process_group.definition_path);
		resolve(&mut self.logging.file);
	}

	/// Pre-flight checks. Runs before any browser or network activity.
	pub fn validate(&self) -> Result<()> {
		let fail = |msg: String| Err(EpfError::Configuration(msg));

		if self.portal.username.trim().is_empty() || self.portal.password.is_empty() {
			return fail("portal username and password are required (portal.username/portal.password or EPF_PORTAL_USERNAME/EPF_PORTAL_PASSWORD)".into());
		}
		check_http_url("portal.baseUrl", &self.portal.base_url)?;

		if self.login_method == LoginMethod::ChallengeBypass {
			match self.challenge_service_url.as_deref() {
				Some(url) if !url.trim().is_empty() => check_http_url("challengeServiceUrl", url)?,
				_ => return fail("loginMethod \"challenge-bypass\" requires challengeServiceUrl".into()),
			}
		}

		if self.paths.config_store.is_none() {
			return fail("paths.configStore is required".into());
		}
		let key = self.config_store_key.trim();
		if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
			return fail(format!("configStoreKey {:?} is not a valid KEY", self.config_store_key));
		}
		if self.config_store_poll.attempts == 0 {
			return fail("configStorePoll.attempts must be at least 1".into());
		}

		if self.update_remote_preference {
			let tc = &self.torrent_client;
			let host = tc.host.as_deref().filter(|h| !h.trim().is_empty());
			let user = tc.username.as_deref().filter(|u| !u.trim().is_empty());
			let pass = tc.password.as_ref().filter(|p| !p.is_empty());
			match (host, user, pass) {
				(Some(host), Some(_), Some(_)) => check_http_url("torrentClient.host", host)?,
				_ => return fail("updateRemotePreference requires torrentClient.host, username and password".into()),
			}
		}

		if self.restart_process_group {
			if self.process_group.definition_path.is_none() {
				return fail("restartProcessGroup requires processGroup.definitionPath".into());
			}
			if self.process_group.services.iter().all(|s| s.trim().is_empty()) {
				return fail("restartProcessGroup requires at least one service in processGroup.services".into());
			}
		}

		let t = &self.timeouts;
		if [
			t.navigation_ms,
			t.login_ms,
			t.cookie_replay_ms,
			t.existing_port_ms,
			t.delete_confirm_ms,
			t.port_value_ms,
			t.challenge_solver_ms,
			t.http_ms,
			t.poll_interval_ms,
		]
		.contains(&0)
		{
			return fail("timeouts must be greater than zero".into());
		}

		Ok(())
	}
}

fn check_http_url(field: &str, value: &str) -> Result<()> {
	match Url::parse(value) {
		Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
		Ok(url) => Err(EpfError::Configuration(format!("{field} must be http(s), got scheme {:?}", url.scheme()))),
		Err(e) => Err(EpfError::Configuration(format!("{field} {value:?} is not a valid URL: {e}"))),
	}
}
