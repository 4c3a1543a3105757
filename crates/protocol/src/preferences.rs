//! Torrent client preference names and payloads (qBittorrent Web API v2).

use serde_json::{Map, Value};

/// Preference holding the client's incoming connection port.
pub const LISTEN_PORT_PREF: &str = "listen_port";

/// Body text the login endpoint returns on success.
pub const LOGIN_OK_BODY: &str = "Ok.";

pub const AUTH_LOGIN_PATH: &str = "/api/v2/auth/login";
pub const APP_PREFERENCES_PATH: &str = "/api/v2/app/preferences";
pub const APP_SET_PREFERENCES_PATH: &str = "/api/v2/app/setPreferences";

/// Reads a named numeric preference from a `preferences` response object.
///
/// Returns `None` when the key is absent or not an integer.
pub fn numeric_preference(prefs: &Map<String, Value>, name: &str) -> Option<i64> {
	match prefs.get(name)? {
		Value::Number(n) => n.as_i64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

/// Builds the `json=` form value for `setPreferences` with a single entry.
pub fn set_preference_payload(name: &str, value: i64) -> String {
	let mut map = Map::new();
	map.insert(name.to_string(), Value::from(value));
	Value::Object(map).to_string()
}
