//! Challenge-solving service client.

use std::time::Duration;

use async_trait::async_trait;
use epf_protocol::{Cookie, SolverRequest, SolverResponse};
use tracing::{debug, info};

use crate::error::{EpfError, Result};

/// Cookies and user agent that cleared the portal's bot check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChallengeSolution {
	pub cookies: Vec<Cookie>,
	pub user_agent: Option<String>,
}

/// Obtains a pre-cleared session for a URL.
///
/// Every failure is reported as [`EpfError::ChallengeBypass`].
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
	async fn solve(&self, url: &str) -> Result<ChallengeSolution>;
}

/// Client for a FlareSolverr-compatible endpoint (`POST /v1`).
#[derive(Debug, Clone)]
pub struct FlareSolverrClient {
	endpoint: String,
	max_timeout: Duration,
	http: reqwest::Client,
}

impl FlareSolverrClient {
	/// `max_timeout` bounds the solve itself; the HTTP request is allowed
	/// `max_timeout + grace` before it is abandoned.
	pub fn new(endpoint: impl Into<String>, max_timeout: Duration, grace: Duration) -> Result<Self> {
		let http = reqwest::Client::builder()
			.timeout(max_timeout + grace)
			.build()
			.map_err(|e| EpfError::ChallengeBypass(format!("failed to build HTTP client: {e}")))?;
		Ok(Self {
			endpoint: endpoint.into(),
			max_timeout,
			http,
		})
	}
}

#[async_trait]
impl ChallengeSolver for FlareSolverrClient {
	async fn solve(&self, url: &str) -> Result<ChallengeSolution> {
		let fail = |msg: String| EpfError::ChallengeBypass(msg);
		let request = SolverRequest::get(url, self.max_timeout.as_millis() as u64);
		debug!(target = "epf.session", endpoint = %self.endpoint, %url, "requesting challenge solution");

		let response = self
			.http
			.post(&self.endpoint)
			.json(&request)
			.send()
			.await
			.map_err(|e| fail(format!("solver at {} unreachable: {e}", self.endpoint)))?;

		let status = response.status();
		let body = response.text().await.map_err(|e| fail(format!("failed to read solver response: {e}")))?;
		let parsed: SolverResponse = serde_json::from_str(&body).map_err(|e| {
			if status.is_success() {
				fail(format!("malformed solver response: {e}"))
			} else {
				fail(format!("solver returned HTTP {status}"))
			}
		})?;

		if !parsed.is_ok() {
			return Err(fail(format!("solver status {:?}: {}", parsed.status, parsed.message)));
		}
		let solution = parsed.solution.ok_or_else(|| fail("solver reported ok without a solution".into()))?;

		info!(target = "epf.session", cookies = solution.cookies.len(), "challenge solved");
		Ok(ChallengeSolution {
			cookies: solution.cookies,
			user_agent: Some(solution.user_agent).filter(|ua| !ua.trim().is_empty()),
		})
	}
}
