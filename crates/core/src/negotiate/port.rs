//! Validated port values.

use std::fmt;

use chrono::{DateTime, Local};

use crate::error::{EpfError, Result};

/// Parses the text the portal renders for an issued port.
///
/// Surrounding whitespace is ignored; what remains must be ASCII digits
/// only and fall in `1..=65535`.
pub fn parse_port(raw: &str) -> Result<u16> {
	let text = raw.trim();
	if text.is_empty() {
		return Err(EpfError::port_parse(raw, "empty"));
	}
	if !text.bytes().all(|b| b.is_ascii_digit()) {
		return Err(EpfError::port_parse(raw, "not a decimal number"));
	}
	match text.parse::<u32>() {
		Ok(value @ 1..=65535) => Ok(value as u16),
		_ => Err(EpfError::port_parse(raw, "outside 1-65535")),
	}
}

/// A port issued by the provider during this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCandidate {
	value: u16,
	acquired_at: DateTime<Local>,
}

impl PortCandidate {
	/// Builds a candidate from portal text; see [`parse_port`].
	pub fn parse(raw: &str) -> Result<Self> {
		parse_port(raw).map(Self::stamp)
	}

	/// Builds a candidate from a known value; `0` is rejected.
	pub fn from_value(value: u16) -> Result<Self> {
		if value == 0 {
			return Err(EpfError::port_parse("0", "outside 1-65535"));
		}
		Ok(Self::stamp(value))
	}

	fn stamp(value: u16) -> Self {
		Self {
			value,
			acquired_at: Local::now(),
		}
	}

	pub fn value(&self) -> u16 {
		self.value
	}

	pub fn acquired_at(&self) -> DateTime<Local> {
		self.acquired_at
	}
}

impl fmt::Display for PortCandidate {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.value)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn reason(raw: &str) -> String {
		match parse_port(raw) {
			Err(EpfError::PortParse { text, reason }) => {
				assert_eq!(text, raw);
				reason
			}
			other => panic!("expected PortParse for {raw:?}, got {other:?}"),
		}
	}

	#[test]
	fn accepts_range_bounds_and_surrounding_whitespace() {
		assert_eq!(parse_port("1").unwrap(), 1);
		assert_eq!(parse_port("65535").unwrap(), 65535);
		assert_eq!(parse_port("  51413\n").unwrap(), 51413);
		assert_eq!(parse_port("00080").unwrap(), 80);
	}

	#[test]
	fn rejects_out_of_range_values() {
		assert_eq!(reason("0"), "outside 1-65535");
		assert_eq!(reason("65536"), "outside 1-65535");
		assert_eq!(reason("99999999999999999999"), "outside 1-65535");
	}

	#[test]
	fn rejects_non_numeric_text() {
		assert_eq!(reason("abc"), "not a decimal number");
		assert_eq!(reason("-5"), "not a decimal number");
		assert_eq!(reason("51 413"), "not a decimal number");
		assert_eq!(reason("5141३"), "not a decimal number");
		assert_eq!(reason("   "), "empty");
	}

	#[test]
	fn candidate_from_value_rejects_zero() {
		assert!(PortCandidate::from_value(0).is_err());
		let candidate = PortCandidate::from_value(60222).unwrap();
		assert_eq!(candidate.value(), 60222);
		assert_eq!(candidate.to_string(), "60222");
	}
}
