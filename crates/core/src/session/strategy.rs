//! Login strategy selection.

use epf_protocol::CookieJar;

use crate::config::LoginMethod;

/// How [`SessionAcquirer`](super::SessionAcquirer) establishes the session.
#[derive(Debug, Clone, PartialEq)]
pub enum LoginStrategy {
	/// Restore stored cookies; falls through to credential login when rejected.
	CookieReplay(CookieJar),
	CredentialLogin,
	/// Obtain a pre-cleared session from the solver service, then log in.
	/// Never falls back to a direct login.
	ChallengeBypassThenLogin,
}

impl LoginStrategy {
	pub fn name(&self) -> &'static str {
		match self {
			Self::CookieReplay(_) => "cookie-replay",
			Self::CredentialLogin => "credential-login",
			Self::ChallengeBypassThenLogin => "challenge-bypass",
		}
	}
}

/// Picks the strategy from the configured method and whatever the cookie
/// store yielded. An empty jar counts as no jar.
pub fn resolve_login_strategy(method: LoginMethod, stored: Option<CookieJar>) -> LoginStrategy {
	match (method, stored) {
		(LoginMethod::ChallengeBypass, _) => LoginStrategy::ChallengeBypassThenLogin,
		(LoginMethod::Direct, Some(jar)) if !jar.is_empty() => LoginStrategy::CookieReplay(jar),
		(LoginMethod::Direct, _) => LoginStrategy::CredentialLogin,
	}
}

#[cfg(test)]
mod tests {
	use epf_protocol::Cookie;

	use super::*;

	fn jar() -> CookieJar {
		CookieJar::new(vec![Cookie::new("ws_session_auth_hash", "abc").with_domain(".windscribe.com")])
	}

	#[test]
	fn direct_with_cookies_replays() {
		let strategy = resolve_login_strategy(LoginMethod::Direct, Some(jar()));
		assert_eq!(strategy, LoginStrategy::CookieReplay(jar()));
	}

	#[test]
	fn direct_without_usable_cookies_logs_in() {
		assert_eq!(resolve_login_strategy(LoginMethod::Direct, None), LoginStrategy::CredentialLogin);
		assert_eq!(
			resolve_login_strategy(LoginMethod::Direct, Some(CookieJar::default())),
			LoginStrategy::CredentialLogin
		);
	}

	#[test]
	fn challenge_bypass_ignores_stored_cookies() {
		let strategy = resolve_login_strategy(LoginMethod::ChallengeBypass, Some(jar()));
		assert_eq!(strategy, LoginStrategy::ChallengeBypassThenLogin);
		assert_eq!(strategy.name(), "challenge-bypass");
	}
}
