//! Port negotiation on the portal's ephemeral port-forwarding panel.
//!
//! The panel is driven as a fixed sequence of states:
//!
//! ```text
//! Idle -> PanelOpened -> ExistingPortChecked -> [DeleteRequested -> DeleteConfirmed]
//!      -> RequestSubmitted -> PortParsed -> Done
//! ```
//!
//! Opening the panel, requesting a port and reading it back are mandatory
//! and time out with [`EpfError::NavigationTimeout`]. Removing a previous
//! entry is best effort: the portal replaces it anyway when a new port is
//! requested, so any failure there is only logged.

use tracing::{debug, info, warn};

use crate::browser::wait::urls_match;
use crate::browser::{Locator, PortalBrowser, wait_for_hidden, wait_for_visible};
use crate::config::Config;
use crate::error::{EpfError, Result};
use crate::pacing::{self, Pacer};
use crate::session::Session;

pub mod port;

pub use port::{PortCandidate, parse_port};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
	Idle,
	PanelOpened,
	ExistingPortChecked,
	DeleteRequested,
	DeleteConfirmed,
	RequestSubmitted,
	PortParsed,
	Done,
}

/// An ephemeral port entry already listed on the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingPort {
	pub delete_control: Locator,
}

pub struct PortNegotiator<'a> {
	config: &'a Config,
	pacer: &'a dyn Pacer,
	state: NegotiationState,
}

impl<'a> PortNegotiator<'a> {
	pub fn new(config: &'a Config, pacer: &'a dyn Pacer) -> Self {
		Self {
			config,
			pacer,
			state: NegotiationState::Idle,
		}
	}

	/// Last state reached; after a failure this is where negotiation stopped.
	pub fn state(&self) -> NegotiationState {
		self.state
	}

	/// Obtains a fresh port on an authenticated session.
	pub async fn negotiate(&mut self, session: &mut Session<'_>) -> Result<PortCandidate> {
		let browser = session.browser();
		self.state = NegotiationState::Idle;

		let account_url = self.config.portal.account_url();
		let on_account = browser.current_url().await?.is_some_and(|url| urls_match(&url, &account_url));
		if !on_account {
			browser.goto(&account_url).await?;
		}

		self.open_panel(browser).await?;

		if let Some(existing) = self.find_existing_port(browser).await? {
			self.delete_existing(browser, &existing).await;
		}

		self.request_port(browser).await?;
		let candidate = self.read_port(browser).await?;
		self.advance(NegotiationState::Done);
		Ok(candidate)
	}

	fn advance(&mut self, next: NegotiationState) {
		debug!(target = "epf.negotiate", from = ?self.state, to = ?next, "state transition");
		self.state = next;
	}

	async fn click_when_visible(&self, browser: &mut dyn PortalBrowser, locator: &Locator, step: &str) -> Result<()> {
		let timeouts = &self.config.timeouts;
		if !wait_for_visible(browser, locator, timeouts.navigation(), timeouts.poll_interval()).await? {
			return Err(EpfError::navigation_timeout(format!("{step} ({locator})"), timeouts.navigation()));
		}
		pacing::pause(self.pacer).await;
		browser.click(locator).await
	}

	async fn open_panel(&mut self, browser: &mut dyn PortalBrowser) -> Result<()> {
		let config = self.config;
		let sel = &config.portal.selectors;
		self.click_when_visible(browser, &sel.port_forwarding_menu, "port-forwarding menu").await?;
		self.click_when_visible(browser, &sel.ephemeral_tab, "ephemeral port tab").await?;
		self.advance(NegotiationState::PanelOpened);
		Ok(())
	}

	async fn find_existing_port(&mut self, browser: &mut dyn PortalBrowser) -> Result<Option<ExistingPort>> {
		let config = self.config;
		let sel = &config.portal.selectors;
		let timeouts = &config.timeouts;
		let listed = wait_for_visible(browser, &sel.delete_port_button, timeouts.existing_port(), timeouts.poll_interval()).await?;
		self.advance(NegotiationState::ExistingPortChecked);

		if listed {
			info!(target = "epf.negotiate", "existing ephemeral port found");
			Ok(Some(ExistingPort {
				delete_control: sel.delete_port_button.clone(),
			}))
		} else {
			debug!(target = "epf.negotiate", "no existing ephemeral port");
			Ok(None)
		}
	}

	async fn delete_existing(&mut self, browser: &mut dyn PortalBrowser, existing: &ExistingPort) {
		self.advance(NegotiationState::DeleteRequested);
		match self.try_delete(browser, existing).await {
			Ok(true) => {
				info!(target = "epf.negotiate", "existing ephemeral port deleted");
				self.advance(NegotiationState::DeleteConfirmed);
			}
			Ok(false) => warn!(
				target = "epf.negotiate",
				timeout = ?self.config.timeouts.delete_confirm(),
				"existing port still listed after delete; continuing"
			),
			Err(e) => warn!(target = "epf.negotiate", error = %e, "deleting existing port failed; continuing"),
		}
	}

	async fn try_delete(&self, browser: &mut dyn PortalBrowser, existing: &ExistingPort) -> Result<bool> {
		let timeouts = &self.config.timeouts;
		pacing::pause(self.pacer).await;
		browser.click(&existing.delete_control).await?;

		if let Some(confirm) = &self.config.portal.selectors.delete_confirm_button {
			if wait_for_visible(browser, confirm, timeouts.delete_confirm(), timeouts.poll_interval()).await? {
				pacing::pause(self.pacer).await;
				browser.click(confirm).await?;
			}
		}

		wait_for_hidden(browser, &existing.delete_control, timeouts.delete_confirm(), timeouts.poll_interval()).await
	}

	async fn request_port(&mut self, browser: &mut dyn PortalBrowser) -> Result<()> {
		let sel = &self.config.portal.selectors.request_port_button;
		self.click_when_visible(browser, sel, "request matching port button").await?;
		self.advance(NegotiationState::RequestSubmitted);
		Ok(())
	}

	async fn read_port(&mut self, browser: &mut dyn PortalBrowser) -> Result<PortCandidate> {
		let config = self.config;
		let sel = &config.portal.selectors;
		let timeouts = &config.timeouts;
		if !wait_for_visible(browser, &sel.port_value, timeouts.port_value(), timeouts.poll_interval()).await? {
			return Err(EpfError::navigation_timeout(format!("issued port ({})", sel.port_value), timeouts.port_value()));
		}

		let text = browser.text(&sel.port_value).await?;
		let candidate = PortCandidate::parse(&text)?;
		self.advance(NegotiationState::PortParsed);
		info!(target = "epf.negotiate", port = candidate.value(), "port issued");
		Ok(candidate)
	}
}

#[cfg(test)]
mod tests {
	use epf_protocol::CookieJar;

	use super::*;
	use crate::config::{Secret, Timeouts};
	use crate::fake::FakePortal;
	use crate::pacing::NoPacer;
	use crate::session::SessionSource;

	fn config() -> Config {
		let mut config = Config::default();
		config.portal.username = "alice".into();
		config.portal.password = Secret::new("hunter2");
		config.timeouts = Timeouts::immediate();
		config
	}

	/// A logged-in fake portal sitting on the account page.
	async fn logged_in(portal: FakePortal, config: &Config) -> FakePortal {
		let mut browser = portal;
		let sel = &config.portal.selectors;
		browser.goto(&config.portal.login_url()).await.unwrap();
		browser.fill(&sel.username_input, "alice").await.unwrap();
		browser.fill(&sel.password_input, "hunter2").await.unwrap();
		browser.click(&sel.login_button).await.unwrap();
		browser
	}

	async fn negotiate(portal: &mut FakePortal, config: &Config) -> (Result<PortCandidate>, NegotiationState) {
		let mut session = Session::new(portal, CookieJar::default(), SessionSource::FreshLogin, None);
		let mut negotiator = PortNegotiator::new(config, &NoPacer);
		let result = negotiator.negotiate(&mut session).await;
		(result, negotiator.state())
	}

	#[tokio::test]
	async fn requests_port_when_none_is_listed() {
		let config = config();
		let mut portal = logged_in(FakePortal::default().issuing(" 51413 "), &config).await;

		let (result, state) = negotiate(&mut portal, &config).await;
		assert_eq!(result.unwrap().value(), 51413);
		assert_eq!(state, NegotiationState::Done);
		assert!(!portal.was_clicked(&config.portal.selectors.delete_port_button));
	}

	#[tokio::test]
	async fn deletes_existing_port_before_requesting() {
		let config = config();
		let mut portal = logged_in(FakePortal::default().with_existing_port().issuing("60222"), &config).await;

		let (result, _) = negotiate(&mut portal, &config).await;
		assert_eq!(result.unwrap().value(), 60222);
		assert!(portal.was_clicked(&config.portal.selectors.delete_port_button));
		assert!(portal.was_clicked(&config.portal.selectors.request_port_button));
	}

	#[tokio::test]
	async fn failed_delete_is_tolerated() {
		let config = config();
		let mut portal = logged_in(FakePortal::default().with_stuck_existing_port().issuing("60222"), &config).await;

		let (result, state) = negotiate(&mut portal, &config).await;
		assert_eq!(result.unwrap().value(), 60222);
		assert_eq!(state, NegotiationState::Done);
	}

	#[tokio::test]
	async fn confirmation_control_is_clicked_when_configured() {
		let mut config = config();
		let confirm = Locator::xpath("//button[normalize-space()='Confirm']");
		config.portal.selectors.delete_confirm_button = Some(confirm.clone());
		let portal = FakePortal::new(&config.portal).with_existing_port().with_delete_confirmation().issuing("60222");
		let mut portal = logged_in(portal, &config).await;

		let (result, _) = negotiate(&mut portal, &config).await;
		assert_eq!(result.unwrap().value(), 60222);
		assert!(portal.was_clicked(&confirm));
	}

	#[tokio::test]
	async fn missing_panel_is_a_navigation_timeout() {
		let config = config();
		let mut portal = logged_in(FakePortal::default().without_panel().issuing("1"), &config).await;

		let (result, state) = negotiate(&mut portal, &config).await;
		assert!(matches!(result, Err(EpfError::NavigationTimeout { .. })), "{result:?}");
		assert_eq!(state, NegotiationState::Idle);
	}

	#[tokio::test]
	async fn unparseable_port_text_fails_with_the_text() {
		let config = config();
		let mut portal = logged_in(FakePortal::default().issuing("abc"), &config).await;

		let (result, state) = negotiate(&mut portal, &config).await;
		match result {
			Err(EpfError::PortParse { text, .. }) => assert_eq!(text, "abc"),
			other => panic!("expected PortParse, got {other:?}"),
		}
		assert_eq!(state, NegotiationState::RequestSubmitted);
	}

	#[tokio::test]
	async fn navigates_to_account_page_first() {
		let config = config();
		let mut portal = logged_in(FakePortal::default().issuing("51413"), &config).await;
		portal.goto(&config.portal.base_url).await.unwrap();

		let (result, _) = negotiate(&mut portal, &config).await;
		assert_eq!(result.unwrap().value(), 51413);
		assert!(portal.actions().contains(&format!("goto {}", config.portal.account_url())));
	}
}
