//! Cookie records and the persisted cookie jar.

use serde::{Deserialize, Serialize};

/// A single browser cookie as persisted between runs.
///
/// Only the attributes needed to replay a session are kept. `expires` is
/// seconds since the Unix epoch; `None` (or a negative value) marks a
/// session cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,
	pub value: String,
	#[serde(default)]
	pub domain: Option<String>,
	#[serde(default)]
	pub path: Option<String>,
	#[serde(default, alias = "expiry", skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,
	#[serde(default)]
	pub http_only: bool,
	#[serde(default)]
	pub secure: bool,
}

impl Cookie {
	pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: None,
			path: None,
			expires: None,
			http_only: false,
			secure: false,
		}
	}

	pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
		self.domain = Some(domain.into());
		self
	}

	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	pub fn with_expires(mut self, expires: f64) -> Self {
		self.expires = Some(expires);
		self
	}

	/// True when the cookie has no expiry and lives for the browser session.
	pub fn is_session(&self) -> bool {
		self.expires.is_none_or(|ts| ts < 0.0)
	}
}

/// Ordered cookie set persisted to the session-cookie store.
///
/// Order is preserved on load and save so a replay applies cookies in the
/// same order the browser reported them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieJar {
	#[serde(default)]
	pub cookies: Vec<Cookie>,
}

impl CookieJar {
	pub fn new(cookies: Vec<Cookie>) -> Self {
		Self { cookies }
	}

	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty()
	}

	pub fn len(&self) -> usize {
		self.cookies.len()
	}

	pub fn get(&self, name: &str) -> Option<&Cookie> {
		self.cookies.iter().find(|c| c.name == name)
	}

	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}

	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string_pretty(self)
	}
}

impl From<Vec<Cookie>> for CookieJar {
	fn from(cookies: Vec<Cookie>) -> Self {
		Self { cookies }
	}
}
