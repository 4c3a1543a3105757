//! Challenge-solving service wire types.
//!
//! The service speaks the FlareSolverr v1 API: a single JSON endpoint that
//! accepts a command object and answers with a status plus an optional
//! solution carrying the cleared cookies and the user agent that earned
//! them.

use serde::{Deserialize, Serialize};

use crate::cookie::Cookie;

/// Command name for a plain GET through the solver's browser.
pub const SOLVER_CMD_GET: &str = "request.get";

/// Status string the service reports for a successful solve.
pub const SOLVER_STATUS_OK: &str = "ok";

/// Request body posted to the solver endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverRequest {
	pub cmd: String,
	pub url: String,
	/// Upper bound for the solve, in milliseconds.
	pub max_timeout: u64,
}

impl SolverRequest {
	pub fn get(url: impl Into<String>, max_timeout_ms: u64) -> Self {
		Self {
			cmd: SOLVER_CMD_GET.to_string(),
			url: url.into(),
			max_timeout: max_timeout_ms,
		}
	}
}

/// Response body returned by the solver endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResponse {
	pub status: String,
	#[serde(default)]
	pub message: String,
	#[serde(default)]
	pub solution: Option<SolverSolution>,
}

impl SolverResponse {
	pub fn is_ok(&self) -> bool {
		self.status.eq_ignore_ascii_case(SOLVER_STATUS_OK)
	}
}

/// Pre-solved session handed back by the solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverSolution {
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub status: u16,
	#[serde(default)]
	pub cookies: Vec<Cookie>,
	pub user_agent: String,
}
