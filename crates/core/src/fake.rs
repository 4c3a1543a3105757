//! In-memory stand-ins for every collaborator seam.
//!
//! Tests drive the real components against these fakes instead of a browser,
//! a solver service, a torrent client or a container runtime. Each fake is
//! cheaply cloneable and clones share state, so a test can hand one clone to
//! the code under test and inspect the other afterwards.
//!
//! # Example
//!
//! ```ignore
//! let portal = FakePortal::default().with_existing_port().issuing("60222");
//! let launcher = FakeLauncher::new(portal.clone());
//! // ... run the orchestrator with `launcher` ...
//! assert!(portal.is_closed());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use epf_protocol::Cookie;
use epf_runtime::ProcessOutput;
use parking_lot::Mutex;

use crate::browser::wait::urls_match;
use crate::browser::{BrowserLauncher, Locator, PortalBrowser};
use crate::config::{BrowserSettings, PortalConfig, PortalSelectors};
use crate::error::{EpfError, Result};
use crate::session::{ChallengeSolution, ChallengeSolver};
use crate::sync::{ConfigStore, PreferenceClient, ProcessRestarter};

#[derive(Debug)]
struct PortalState {
	base_url: String,
	login_url: String,
	account_url: String,
	selectors: PortalSelectors,

	// Behaviour knobs.
	login_succeeds: bool,
	replayable: Option<Cookie>,
	panel_available: bool,
	existing_port: bool,
	delete_removes: bool,
	delete_needs_confirm: bool,
	issued_port: Option<String>,
	screenshots_fail: bool,

	// Page state.
	url: Option<String>,
	logged_in: bool,
	menu_open: bool,
	tab_open: bool,
	confirm_pending: bool,
	requested: bool,
	filled: HashMap<Locator, String>,
	cookies: Vec<Cookie>,
	user_agent: Option<String>,

	// Observations.
	actions: Vec<String>,
	clicks: Vec<Locator>,
	screenshots: Vec<PathBuf>,
	closed: bool,
}

impl PortalState {
	fn new(portal: &PortalConfig) -> Self {
		Self {
			base_url: portal.base_url.clone(),
			login_url: portal.login_url(),
			account_url: portal.account_url(),
			selectors: portal.selectors.clone(),
			login_succeeds: true,
			replayable: None,
			panel_available: true,
			existing_port: false,
			delete_removes: true,
			delete_needs_confirm: false,
			issued_port: None,
			screenshots_fail: false,
			url: None,
			logged_in: false,
			menu_open: false,
			tab_open: false,
			confirm_pending: false,
			requested: false,
			filled: HashMap::new(),
			cookies: Vec::new(),
			user_agent: None,
			actions: Vec::new(),
			clicks: Vec::new(),
			screenshots: Vec::new(),
			closed: false,
		}
	}

	fn on(&self, page: &str) -> bool {
		self.url.as_deref().is_some_and(|url| urls_match(url, page))
	}

	fn visible(&self, locator: &Locator) -> bool {
		let sel = &self.selectors;
		let on_login = self.on(&self.login_url);
		let on_panel = self.logged_in && self.on(&self.account_url);

		if *locator == sel.username_input || *locator == sel.password_input || *locator == sel.login_button {
			on_login
		} else if *locator == sel.port_forwarding_menu {
			on_panel && self.panel_available
		} else if *locator == sel.ephemeral_tab {
			on_panel && self.menu_open
		} else if *locator == sel.delete_port_button {
			on_panel && self.tab_open && self.existing_port && !self.requested
		} else if sel.delete_confirm_button.as_ref() == Some(locator) {
			on_panel && self.confirm_pending
		} else if *locator == sel.request_port_button {
			on_panel && self.tab_open && !self.requested
		} else if *locator == sel.port_value {
			on_panel && self.requested && self.issued_port.is_some()
		} else {
			false
		}
	}

	fn set_cookie(&mut self, cookie: Cookie) {
		self.cookies.retain(|c| c.name != cookie.name);
		self.cookies.push(cookie);
	}

	fn holds_replayable(&self) -> bool {
		self.replayable
			.as_ref()
			.is_some_and(|valid| self.cookies.iter().any(|c| c.name == valid.name && c.value == valid.value))
	}
}

/// Scripted portal behind the [`PortalBrowser`] seam.
///
/// Pages follow the configured portal URLs: the account page redirects to
/// the login page until a login succeeds or a replayable cookie is present,
/// and panel controls appear in the order the real portal reveals them.
#[derive(Debug, Clone)]
pub struct FakePortal {
	state: Arc<Mutex<PortalState>>,
}

impl Default for FakePortal {
	fn default() -> Self {
		Self::new(&PortalConfig::default())
	}
}

impl FakePortal {
	pub const SESSION_COOKIE: &'static str = "ws_session_auth_hash";
	pub const ISSUED_SESSION_VALUE: &'static str = "fresh-session";

	pub fn new(portal: &PortalConfig) -> Self {
		Self {
			state: Arc::new(Mutex::new(PortalState::new(portal))),
		}
	}

	fn configure(self, f: impl FnOnce(&mut PortalState)) -> Self {
		f(&mut self.state.lock());
		self
	}

	/// Submitting the login form never reaches the account page.
	pub fn rejecting_login(self) -> Self {
		self.configure(|s| s.login_succeeds = false)
	}

	/// Cookie that restores a session when replayed.
	pub fn with_replayable_cookie(self, cookie: Cookie) -> Self {
		self.configure(|s| s.replayable = Some(cookie))
	}

	/// The port-forwarding menu never renders.
	pub fn without_panel(self) -> Self {
		self.configure(|s| s.panel_available = false)
	}

	/// An ephemeral port is already assigned and deleting it works.
	pub fn with_existing_port(self) -> Self {
		self.configure(|s| s.existing_port = true)
	}

	/// An ephemeral port is assigned and the delete control does nothing.
	pub fn with_stuck_existing_port(self) -> Self {
		self.configure(|s| {
			s.existing_port = true;
			s.delete_removes = false;
		})
	}

	/// Deleting requires clicking the configured confirmation control.
	pub fn with_delete_confirmation(self) -> Self {
		self.configure(|s| s.delete_needs_confirm = true)
	}

	/// Text rendered in the port element after a request.
	pub fn issuing(self, port_text: impl Into<String>) -> Self {
		let text = port_text.into();
		self.configure(|s| s.issued_port = Some(text))
	}

	pub fn failing_screenshots(self) -> Self {
		self.configure(|s| s.screenshots_fail = true)
	}

	pub fn actions(&self) -> Vec<String> {
		self.state.lock().actions.clone()
	}

	pub fn was_clicked(&self, locator: &Locator) -> bool {
		self.click_count(locator) > 0
	}

	pub fn click_count(&self, locator: &Locator) -> usize {
		self.state.lock().clicks.iter().filter(|l| *l == locator).count()
	}

	pub fn filled(&self, locator: &Locator) -> Option<String> {
		self.state.lock().filled.get(locator).cloned()
	}

	pub fn user_agent(&self) -> Option<String> {
		self.state.lock().user_agent.clone()
	}

	pub fn cookie_names(&self) -> Vec<String> {
		self.state.lock().cookies.iter().map(|c| c.name.clone()).collect()
	}

	pub fn screenshots(&self) -> Vec<PathBuf> {
		self.state.lock().screenshots.clone()
	}

	pub fn is_closed(&self) -> bool {
		self.state.lock().closed
	}

	/// Whether an ephemeral port entry is still listed.
	pub fn has_existing_port(&self) -> bool {
		self.state.lock().existing_port
	}
}

fn missing(locator: &Locator) -> EpfError {
	EpfError::Browser(format!("element {locator} not found"))
}

#[async_trait]
impl PortalBrowser for FakePortal {
	async fn goto(&mut self, url: &str) -> Result<()> {
		let mut s = self.state.lock();
		s.actions.push(format!("goto {url}"));
		let mut landed = url.to_string();
		if urls_match(url, &s.account_url) && !s.logged_in {
			if s.holds_replayable() {
				s.logged_in = true;
			} else {
				landed = s.login_url.clone();
			}
		}
		if urls_match(url, &s.base_url) || urls_match(&landed, &s.login_url) {
			s.menu_open = false;
			s.tab_open = false;
		}
		s.url = Some(landed);
		Ok(())
	}

	async fn current_url(&mut self) -> Result<Option<String>> {
		Ok(self.state.lock().url.clone())
	}

	async fn is_visible(&mut self, locator: &Locator) -> Result<bool> {
		Ok(self.state.lock().visible(locator))
	}

	async fn click(&mut self, locator: &Locator) -> Result<()> {
		let mut s = self.state.lock();
		if !s.visible(locator) {
			return Err(missing(locator));
		}
		s.actions.push(format!("click {locator}"));
		s.clicks.push(locator.clone());

		let sel = s.selectors.clone();
		if *locator == sel.login_button {
			if s.login_succeeds {
				s.logged_in = true;
				s.url = Some(s.account_url.clone());
				s.set_cookie(Cookie::new(Self::SESSION_COOKIE, Self::ISSUED_SESSION_VALUE).with_domain(".windscribe.com").with_path("/"));
			}
		} else if *locator == sel.port_forwarding_menu {
			s.menu_open = true;
		} else if *locator == sel.ephemeral_tab {
			s.tab_open = true;
		} else if *locator == sel.delete_port_button {
			if s.delete_needs_confirm && sel.delete_confirm_button.is_some() {
				s.confirm_pending = true;
			} else if s.delete_removes && !s.delete_needs_confirm {
				s.existing_port = false;
			}
		} else if sel.delete_confirm_button.as_ref() == Some(locator) {
			s.confirm_pending = false;
			if s.delete_removes {
				s.existing_port = false;
			}
		} else if *locator == sel.request_port_button {
			s.requested = true;
			s.existing_port = false;
		}
		Ok(())
	}

	async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()> {
		let mut s = self.state.lock();
		if !s.visible(locator) {
			return Err(missing(locator));
		}
		s.actions.push(format!("fill {locator}"));
		s.filled.insert(locator.clone(), text.to_string());
		Ok(())
	}

	async fn text(&mut self, locator: &Locator) -> Result<String> {
		let s = self.state.lock();
		if !s.visible(locator) {
			return Err(missing(locator));
		}
		if *locator == s.selectors.port_value {
			return Ok(s.issued_port.clone().unwrap_or_default());
		}
		Ok(String::new())
	}

	async fn cookies(&mut self) -> Result<Vec<Cookie>> {
		Ok(self.state.lock().cookies.clone())
	}

	async fn add_cookies(&mut self, cookies: &[Cookie]) -> Result<()> {
		let mut s = self.state.lock();
		s.actions.push(format!("add_cookies {}", cookies.len()));
		for cookie in cookies {
			s.set_cookie(cookie.clone());
		}
		Ok(())
	}

	async fn set_user_agent(&mut self, user_agent: &str) -> Result<()> {
		let mut s = self.state.lock();
		s.actions.push("set_user_agent".to_string());
		s.user_agent = Some(user_agent.to_string());
		Ok(())
	}

	async fn screenshot(&mut self, path: &Path) -> Result<()> {
		let mut s = self.state.lock();
		if s.screenshots_fail {
			return Err(EpfError::Browser("screenshot capture failed".into()));
		}
		std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
		s.screenshots.push(path.to_path_buf());
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.state.lock().closed = true;
		Ok(())
	}
}

/// Hands out clones of one [`FakePortal`], or fails to launch.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
	portal: FakePortal,
	fail: bool,
	launches: Arc<Mutex<usize>>,
}

impl FakeLauncher {
	pub fn new(portal: FakePortal) -> Self {
		Self {
			portal,
			fail: false,
			launches: Arc::new(Mutex::new(0)),
		}
	}

	pub fn failing() -> Self {
		Self {
			fail: true,
			..Self::new(FakePortal::default())
		}
	}

	pub fn launches(&self) -> usize {
		*self.launches.lock()
	}
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
	async fn launch(&self, _settings: &BrowserSettings) -> Result<Box<dyn PortalBrowser>> {
		*self.launches.lock() += 1;
		if self.fail {
			return Err(EpfError::Browser("chromium executable not found".into()));
		}
		Ok(Box::new(self.portal.clone()))
	}
}

/// Solver that returns a fixed solution or a fixed failure.
#[derive(Debug, Clone)]
pub struct FakeSolver {
	outcome: std::result::Result<ChallengeSolution, String>,
	calls: Arc<Mutex<Vec<String>>>,
}

impl FakeSolver {
	pub fn solving(solution: ChallengeSolution) -> Self {
		Self {
			outcome: Ok(solution),
			calls: Arc::default(),
		}
	}

	pub fn unreachable() -> Self {
		Self {
			outcome: Err("solver at http://127.0.0.1:8191/v1 unreachable: connection refused".into()),
			calls: Arc::default(),
		}
	}

	/// URLs the solver was asked to clear.
	pub fn calls(&self) -> Vec<String> {
		self.calls.lock().clone()
	}
}

#[async_trait]
impl ChallengeSolver for FakeSolver {
	async fn solve(&self, url: &str) -> Result<ChallengeSolution> {
		self.calls.lock().push(url.to_string());
		self.outcome.clone().map_err(EpfError::ChallengeBypass)
	}
}

#[derive(Debug, Default)]
struct StoreState {
	values: HashMap<String, String>,
	writes: Vec<(String, String)>,
	reads: usize,
	stale_reads: u32,
	stale_remaining: u32,
	stale_value: Option<String>,
	fail_writes: bool,
}

/// Key/value configuration store held in memory.
#[derive(Debug, Clone)]
pub struct FakeConfigStore {
	path: PathBuf,
	state: Arc<Mutex<StoreState>>,
}

impl Default for FakeConfigStore {
	fn default() -> Self {
		Self {
			path: PathBuf::from("/fake/.env"),
			state: Arc::default(),
		}
	}
}

impl FakeConfigStore {
	pub fn with_value(self, key: &str, value: &str) -> Self {
		self.state.lock().values.insert(key.to_string(), value.to_string());
		self
	}

	/// The first `reads` reads after each write still return the old value.
	pub fn lagging(self, reads: u32) -> Self {
		self.state.lock().stale_reads = reads;
		self
	}

	pub fn failing_writes(self) -> Self {
		self.state.lock().fail_writes = true;
		self
	}

	pub fn value(&self, key: &str) -> Option<String> {
		self.state.lock().values.get(key).cloned()
	}

	pub fn writes(&self) -> Vec<(String, String)> {
		self.state.lock().writes.clone()
	}

	pub fn reads(&self) -> usize {
		self.state.lock().reads
	}
}

impl ConfigStore for FakeConfigStore {
	fn location(&self) -> &Path {
		&self.path
	}

	fn read(&self, key: &str) -> Result<Option<String>> {
		let mut s = self.state.lock();
		s.reads += 1;
		if s.stale_remaining > 0 {
			s.stale_remaining -= 1;
			return Ok(s.stale_value.clone());
		}
		Ok(s.values.get(key).cloned())
	}

	fn write(&self, key: &str, value: &str) -> Result<()> {
		let mut s = self.state.lock();
		if s.fail_writes {
			return Err(EpfError::ConfigWrite {
				path: self.path.clone(),
				reason: "read-only file system".into(),
			});
		}
		s.writes.push((key.to_string(), value.to_string()));
		s.stale_value = s.values.insert(key.to_string(), value.to_string());
		s.stale_remaining = s.stale_reads;
		Ok(())
	}
}

#[derive(Debug, Default)]
struct PreferenceState {
	values: HashMap<String, i64>,
	calls: Vec<String>,
	fail_login: bool,
	fail_set: bool,
}

/// Torrent client that keeps preferences in memory.
#[derive(Debug, Clone, Default)]
pub struct FakePreferenceClient {
	state: Arc<Mutex<PreferenceState>>,
}

impl FakePreferenceClient {
	pub fn with_preference(self, name: &str, value: i64) -> Self {
		self.state.lock().values.insert(name.to_string(), value);
		self
	}

	pub fn rejecting_login(self) -> Self {
		self.state.lock().fail_login = true;
		self
	}

	pub fn failing_writes(self) -> Self {
		self.state.lock().fail_set = true;
		self
	}

	pub fn stored(&self, name: &str) -> Option<i64> {
		self.state.lock().values.get(name).copied()
	}

	/// Calls in order: `login`, `get <name>`, `set <name>=<value>`.
	pub fn calls(&self) -> Vec<String> {
		self.state.lock().calls.clone()
	}
}

#[async_trait]
impl PreferenceClient for FakePreferenceClient {
	async fn login(&self) -> Result<()> {
		let mut s = self.state.lock();
		s.calls.push("login".to_string());
		if s.fail_login {
			return Err(EpfError::RemoteService("login rejected: Fails.".into()));
		}
		Ok(())
	}

	async fn preference(&self, name: &str) -> Result<Option<i64>> {
		let mut s = self.state.lock();
		s.calls.push(format!("get {name}"));
		Ok(s.values.get(name).copied())
	}

	async fn set_preference(&self, name: &str, value: i64) -> Result<()> {
		let mut s = self.state.lock();
		s.calls.push(format!("set {name}={value}"));
		if s.fail_set {
			return Err(EpfError::RemoteService("setPreferences returned HTTP 500".into()));
		}
		s.values.insert(name.to_string(), value);
		Ok(())
	}
}

/// Records recreate requests instead of running a container runtime.
#[derive(Debug, Clone, Default)]
pub struct FakeRestarter {
	calls: Arc<Mutex<Vec<(PathBuf, Vec<String>)>>>,
	failure: Option<String>,
}

impl FakeRestarter {
	pub fn failing(reason: impl Into<String>) -> Self {
		Self {
			failure: Some(reason.into()),
			..Self::default()
		}
	}

	pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
		self.calls.lock().clone()
	}
}

#[async_trait]
impl ProcessRestarter for FakeRestarter {
	async fn recreate(&self, definition: &Path, services: &[String]) -> Result<ProcessOutput> {
		self.calls.lock().push((definition.to_path_buf(), services.to_vec()));
		match &self.failure {
			Some(reason) => Err(EpfError::ContainerRestart(reason.clone())),
			None => Ok(ProcessOutput {
				stdout: format!("Recreating {}", services.join(", ")),
				stderr: String::new(),
			}),
		}
	}
}
