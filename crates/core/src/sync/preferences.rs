//! qBittorrent Web API preference client.

use std::time::Duration;

use async_trait::async_trait;
use epf_protocol::{APP_PREFERENCES_PATH, APP_SET_PREFERENCES_PATH, AUTH_LOGIN_PATH, LOGIN_OK_BODY, numeric_preference, set_preference_payload};
use reqwest::header::REFERER;
use serde_json::{Map, Value};
use tracing::debug;

use super::PreferenceClient;
use crate::config::Secret;
use crate::error::{EpfError, Result};

fn remote_err(context: &str, err: impl std::fmt::Display) -> EpfError {
	EpfError::RemoteService(format!("{context}: {err}"))
}

/// Web API v2 client. The session cookie from `login` is kept in the
/// client's cookie store for the calls that follow.
#[derive(Debug, Clone)]
pub struct QbittorrentClient {
	base: String,
	username: String,
	password: Secret,
	http: reqwest::Client,
}

impl QbittorrentClient {
	pub fn new(host: &str, username: impl Into<String>, password: Secret, timeout: Duration) -> Result<Self> {
		let http = reqwest::Client::builder()
			.cookie_store(true)
			.timeout(timeout)
			.build()
			.map_err(|e| remote_err("failed to build HTTP client", e))?;
		Ok(Self {
			base: host.trim_end_matches('/').to_string(),
			username: username.into(),
			password,
			http,
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{path}", self.base)
	}
}

#[async_trait]
impl PreferenceClient for QbittorrentClient {
	async fn login(&self) -> Result<()> {
		let response = self
			.http
			.post(self.url(AUTH_LOGIN_PATH))
			.header(REFERER, &self.base)
			.form(&[("username", self.username.as_str()), ("password", self.password.expose())])
			.send()
			.await
			.map_err(|e| remote_err(&format!("torrent client at {} unreachable", self.base), e))?;

		let status = response.status();
		let body = response.text().await.map_err(|e| remote_err("failed to read login response", e))?;
		if !status.is_success() || body.trim() != LOGIN_OK_BODY {
			return Err(EpfError::RemoteService(format!("login rejected (HTTP {status}): {}", body.trim())));
		}
		debug!(target = "epf.sync", host = %self.base, "torrent client login ok");
		Ok(())
	}

	async fn preference(&self, name: &str) -> Result<Option<i64>> {
		let response = self
			.http
			.get(self.url(APP_PREFERENCES_PATH))
			.header(REFERER, &self.base)
			.send()
			.await
			.map_err(|e| remote_err("preferences request failed", e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(EpfError::RemoteService(format!("preferences returned HTTP {status}")));
		}
		let prefs: Map<String, Value> = response.json().await.map_err(|e| remote_err("malformed preferences response", e))?;
		Ok(numeric_preference(&prefs, name))
	}

	async fn set_preference(&self, name: &str, value: i64) -> Result<()> {
		let payload = set_preference_payload(name, value);
		let response = self
			.http
			.post(self.url(APP_SET_PREFERENCES_PATH))
			.header(REFERER, &self.base)
			.form(&[("json", payload.as_str())])
			.send()
			.await
			.map_err(|e| remote_err("setPreferences request failed", e))?;

		let status = response.status();
		if !status.is_success() {
			return Err(EpfError::RemoteService(format!("setPreferences returned HTTP {status}")));
		}
		debug!(target = "epf.sync", %name, value, "preference updated");
		Ok(())
	}
}
