//! Authenticated portal sessions.
//!
//! [`SessionAcquirer`] picks a login strategy (see [`strategy`]) and drives
//! the run's browser until the portal shows the account page. The resulting
//! [`Session`] borrows that browser exclusively; the orchestrator that owns
//! the browser gets it back once the session is dropped.

use std::fmt;

use epf_protocol::CookieJar;

use crate::browser::PortalBrowser;

pub mod acquirer;
pub mod challenge;
pub mod cookie_store;
pub mod strategy;

pub use acquirer::SessionAcquirer;
pub use challenge::{ChallengeSolution, ChallengeSolver, FlareSolverrClient};
pub use cookie_store::CookieStore;
pub use strategy::{LoginStrategy, resolve_login_strategy};

/// How the session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
	Replayed,
	FreshLogin,
	ChallengeBypass,
}

/// An authenticated portal session on the run's browser.
pub struct Session<'b> {
	browser: &'b mut dyn PortalBrowser,
	pub authenticated: bool,
	pub cookies: CookieJar,
	pub source: SessionSource,
	/// User agent the session was established with, when it was overridden.
	pub user_agent: Option<String>,
}

impl<'b> Session<'b> {
	pub(crate) fn new(browser: &'b mut dyn PortalBrowser, cookies: CookieJar, source: SessionSource, user_agent: Option<String>) -> Self {
		Self {
			browser,
			authenticated: true,
			cookies,
			source,
			user_agent,
		}
	}

	pub fn browser(&mut self) -> &mut dyn PortalBrowser {
		&mut *self.browser
	}
}

impl fmt::Debug for Session<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("authenticated", &self.authenticated)
			.field("cookies", &self.cookies.len())
			.field("source", &self.source)
			.field("user_agent", &self.user_agent)
			.finish_non_exhaustive()
	}
}
