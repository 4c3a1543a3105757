//! Bounded waits built on [`PortalBrowser`] probes.
//!
//! Each helper polls until its condition holds or `timeout` elapses and
//! returns whether the condition was met. Deciding if a miss is fatal is
//! left to the caller.

use std::time::{Duration, Instant};

use super::{Locator, PortalBrowser};
use crate::error::Result;

struct Deadline {
	start: Instant,
	timeout: Duration,
}

impl Deadline {
	fn after(timeout: Duration) -> Self {
		Self {
			start: Instant::now(),
			timeout,
		}
	}

	fn expired(&self) -> bool {
		self.start.elapsed() >= self.timeout
	}

	async fn pause(&self, interval: Duration) {
		let remaining = self.timeout.saturating_sub(self.start.elapsed());
		tokio::time::sleep(interval.min(remaining)).await;
	}
}

/// Waits for `locator` to match a visible element.
pub async fn wait_for_visible(browser: &mut dyn PortalBrowser, locator: &Locator, timeout: Duration, interval: Duration) -> Result<bool> {
	let deadline = Deadline::after(timeout);
	loop {
		if browser.is_visible(locator).await? {
			return Ok(true);
		}
		if deadline.expired() {
			return Ok(false);
		}
		deadline.pause(interval).await;
	}
}

/// Waits for `locator` to stop matching a visible element.
pub async fn wait_for_hidden(browser: &mut dyn PortalBrowser, locator: &Locator, timeout: Duration, interval: Duration) -> Result<bool> {
	let deadline = Deadline::after(timeout);
	loop {
		if !browser.is_visible(locator).await? {
			return Ok(true);
		}
		if deadline.expired() {
			return Ok(false);
		}
		deadline.pause(interval).await;
	}
}

/// Waits for the current URL to equal `expected`, ignoring a trailing slash.
pub async fn wait_for_url(browser: &mut dyn PortalBrowser, expected: &str, timeout: Duration, interval: Duration) -> Result<bool> {
	let deadline = Deadline::after(timeout);
	loop {
		if let Some(url) = browser.current_url().await? {
			if urls_match(&url, expected) {
				return Ok(true);
			}
		}
		if deadline.expired() {
			return Ok(false);
		}
		deadline.pause(interval).await;
	}
}

pub(crate) fn urls_match(actual: &str, expected: &str) -> bool {
	actual.trim_end_matches('/') == expected.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::fake::FakePortal;

	const TICK: Duration = Duration::from_millis(1);

	#[test]
	fn url_match_ignores_trailing_slash() {
		assert!(urls_match("https://windscribe.com/myaccount/", "https://windscribe.com/myaccount"));
		assert!(!urls_match("https://windscribe.com/login", "https://windscribe.com/myaccount"));
	}

	#[tokio::test]
	async fn visible_wait_gives_up_after_timeout() {
		let mut portal = FakePortal::default();
		let found = wait_for_visible(&mut portal, &Locator::css("#nope"), Duration::from_millis(20), TICK).await.unwrap();
		assert!(!found);
	}

	#[tokio::test]
	async fn hidden_wait_succeeds_for_absent_element() {
		let mut portal = FakePortal::default();
		let hidden = wait_for_hidden(&mut portal, &Locator::css("#gone"), Duration::from_millis(20), TICK).await.unwrap();
		assert!(hidden);
	}
}
