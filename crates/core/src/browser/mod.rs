//! Browser automation seam.
//!
//! The portal workflow only needs a handful of primitives from a browser:
//! navigate, read the URL, probe and click elements, type into inputs, read
//! text, move cookies in and out, override the user agent, and capture a
//! screenshot. [`PortalBrowser`] names exactly those; the waits in
//! [`wait`] are built on top of them by polling.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use epf_protocol::Cookie;
use serde::{Deserialize, Serialize};

use crate::config::BrowserSettings;
use crate::error::Result;

pub mod chromium;
pub mod wait;

pub use chromium::{ChromiumBrowser, ChromiumLauncher};
pub use wait::{wait_for_hidden, wait_for_url, wait_for_visible};

/// How to find an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locator {
	Css(String),
	Xpath(String),
}

impl Locator {
	pub fn css(selector: impl Into<String>) -> Self {
		Self::Css(selector.into())
	}

	pub fn xpath(expression: impl Into<String>) -> Self {
		Self::Xpath(expression.into())
	}

	/// JavaScript expression evaluating to the first matching element or `null`.
	pub fn js_lookup(&self) -> String {
		match self {
			Self::Css(sel) => {
				let sel = serde_json::to_string(sel).unwrap_or_else(|_| "\"\"".to_string());
				format!("document.querySelector({sel})")
			}
			Self::Xpath(expr) => {
				let expr = serde_json::to_string(expr).unwrap_or_else(|_| "\"\"".to_string());
				format!("document.evaluate({expr}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue")
			}
		}
	}
}

impl fmt::Display for Locator {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Css(sel) => write!(f, "css={sel}"),
			Self::Xpath(expr) => write!(f, "xpath={expr}"),
		}
	}
}

/// Minimal browser contract the portal workflow is written against.
///
/// Every method is a single round trip; none of them wait for elements to
/// appear. Callers that need to wait use the helpers in [`wait`].
#[async_trait]
pub trait PortalBrowser: Send {
	async fn goto(&mut self, url: &str) -> Result<()>;

	/// URL of the current page, if the page has one.
	async fn current_url(&mut self) -> Result<Option<String>>;

	/// Whether `locator` matches an element that is rendered and visible.
	async fn is_visible(&mut self, locator: &Locator) -> Result<bool>;

	async fn click(&mut self, locator: &Locator) -> Result<()>;

	async fn fill(&mut self, locator: &Locator, text: &str) -> Result<()>;

	/// Rendered text of the first element matching `locator`.
	async fn text(&mut self, locator: &Locator) -> Result<String>;

	async fn cookies(&mut self) -> Result<Vec<Cookie>>;

	async fn add_cookies(&mut self, cookies: &[Cookie]) -> Result<()>;

	async fn set_user_agent(&mut self, user_agent: &str) -> Result<()>;

	/// Writes a full-page PNG capture to `path`.
	async fn screenshot(&mut self, path: &Path) -> Result<()>;

	/// Tears down the browser and its process.
	async fn close(&mut self) -> Result<()>;
}

/// Creates the single browser a run works with.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
	async fn launch(&self, settings: &BrowserSettings) -> Result<Box<dyn PortalBrowser>>;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn css_lookup_escapes_selector() {
		let loc = Locator::css("#epf-port-info > span");
		assert_eq!(loc.js_lookup(), r##"document.querySelector("#epf-port-info > span")"##);
	}

	#[test]
	fn xpath_lookup_uses_document_evaluate() {
		let loc = Locator::xpath("//button[normalize-space()='Delete Port']");
		let js = loc.js_lookup();
		assert!(js.starts_with(r#"document.evaluate("//button[normalize-space()='Delete Port']""#));
		assert!(js.ends_with(".singleNodeValue"));
	}

	#[test]
	fn locators_deserialize_from_tagged_objects() {
		let loc: Locator = serde_json::from_str(r#"{ "xpath": "//span" }"#).unwrap();
		assert_eq!(loc, Locator::xpath("//span"));
		assert_eq!(loc.to_string(), "xpath=//span");
	}
}
