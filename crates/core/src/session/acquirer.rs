//! Session acquisition: cookie replay, credential login and challenge bypass.

use epf_protocol::CookieJar;
use tracing::{debug, info, warn};

use super::challenge::ChallengeSolver;
use super::cookie_store::CookieStore;
use super::strategy::{LoginStrategy, resolve_login_strategy};
use super::{Session, SessionSource};
use crate::browser::{PortalBrowser, wait_for_url, wait_for_visible};
use crate::config::Config;
use crate::error::{EpfError, Result};
use crate::pacing::{self, Pacer};

/// Establishes an authenticated portal session on a browser.
pub struct SessionAcquirer<'a> {
	config: &'a Config,
	cookie_store: &'a CookieStore,
	solver: Option<&'a dyn ChallengeSolver>,
	pacer: &'a dyn Pacer,
}

impl<'a> SessionAcquirer<'a> {
	pub fn new(config: &'a Config, cookie_store: &'a CookieStore, solver: Option<&'a dyn ChallengeSolver>, pacer: &'a dyn Pacer) -> Self {
		Self {
			config,
			cookie_store,
			solver,
			pacer,
		}
	}

	/// Runs the configured strategy. Login failures are fatal and never retried.
	pub async fn acquire<'b>(&self, browser: &'b mut dyn PortalBrowser) -> Result<Session<'b>> {
		let strategy = resolve_login_strategy(self.config.login_method, self.cookie_store.load());
		info!(target = "epf.session", strategy = strategy.name(), "acquiring portal session");

		match strategy {
			LoginStrategy::CookieReplay(jar) => {
				match self.replay(&mut *browser, &jar).await {
					Ok(true) => {
						info!(target = "epf.session", cookies = jar.len(), "stored session accepted");
						return Ok(Session::new(browser, jar, SessionSource::Replayed, None));
					}
					Ok(false) => info!(target = "epf.session", "stored session rejected; logging in"),
					Err(e) => warn!(target = "epf.session", error = %e, "cookie replay failed; logging in"),
				}
				self.credential_login(browser, SessionSource::FreshLogin, None).await
			}
			LoginStrategy::CredentialLogin => self.credential_login(browser, SessionSource::FreshLogin, None).await,
			LoginStrategy::ChallengeBypassThenLogin => self.bypass_then_login(browser).await,
		}
	}

	async fn replay(&self, browser: &mut dyn PortalBrowser, jar: &CookieJar) -> Result<bool> {
		let portal = &self.config.portal;
		let timeouts = &self.config.timeouts;
		let account_url = portal.account_url();

		browser.goto(&portal.base_url).await?;
		browser.add_cookies(&jar.cookies).await?;
		browser.goto(&account_url).await?;
		wait_for_url(browser, &account_url, timeouts.cookie_replay(), timeouts.poll_interval()).await
	}

	async fn bypass_then_login<'b>(&self, browser: &'b mut dyn PortalBrowser) -> Result<Session<'b>> {
		let portal = &self.config.portal;
		let solver = self
			.solver
			.ok_or_else(|| EpfError::ChallengeBypass("no challenge-solving service configured".into()))?;

		let solution = solver.solve(&portal.login_url()).await.map_err(|e| match e {
			EpfError::ChallengeBypass(_) => e,
			other => EpfError::ChallengeBypass(other.to_string()),
		})?;

		if let Some(ua) = &solution.user_agent {
			browser.set_user_agent(ua).await?;
		}
		browser.goto(&portal.base_url).await?;
		if !solution.cookies.is_empty() {
			browser.add_cookies(&solution.cookies).await?;
		}
		debug!(target = "epf.session", cookies = solution.cookies.len(), "injected challenge cookies");

		self.credential_login(browser, SessionSource::ChallengeBypass, solution.user_agent).await
	}

	async fn credential_login<'b>(&self, browser: &'b mut dyn PortalBrowser, source: SessionSource, user_agent: Option<String>) -> Result<Session<'b>> {
		let portal = &self.config.portal;
		let sel = &portal.selectors;
		let timeouts = &self.config.timeouts;
		let account_url = portal.account_url();

		browser.goto(&portal.login_url()).await?;
		if !wait_for_visible(&mut *browser, &sel.username_input, timeouts.login(), timeouts.poll_interval()).await? {
			return Err(EpfError::Auth(format!("login form ({}) did not appear within {:?}", sel.username_input, timeouts.login())));
		}

		browser.fill(&sel.username_input, &portal.username).await?;
		browser.fill(&sel.password_input, portal.password.expose()).await?;
		pacing::pause(self.pacer).await;
		browser.click(&sel.login_button).await?;

		if !wait_for_url(&mut *browser, &account_url, timeouts.login(), timeouts.poll_interval()).await? {
			return Err(EpfError::Auth(format!("account page not reached within {:?} after submitting credentials", timeouts.login())));
		}
		info!(target = "epf.session", source = ?source, "logged in");

		let cookies = match browser.cookies().await {
			Ok(cookies) => CookieJar::new(cookies),
			Err(e) => {
				warn!(target = "epf.session", error = %e, "could not read session cookies");
				CookieJar::default()
			}
		};
		if !cookies.is_empty() {
			if let Err(e) = self.cookie_store.save(&cookies) {
				warn!(target = "epf.session", error = %e, "failed to persist session cookies");
			}
		}

		Ok(Session::new(browser, cookies, source, user_agent))
	}
}
