//! Line-oriented `KEY=VALUE` documents (compose `.env` style).
//!
//! Parsing keeps every line so that rewriting a single key leaves comments,
//! blank lines, ordering and unrelated entries exactly as they were.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvLine {
	Entry {
		export: bool,
		key: String,
		raw_value: String,
		/// Inline comment with its leading whitespace, e.g. `" # web ui"`.
		comment: String,
	},
	Other(String),
}

/// Parsed `KEY=VALUE` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvDocument {
	lines: Vec<EnvLine>,
}

impl EnvDocument {
	pub fn parse(text: &str) -> Self {
		let lines = text.lines().map(parse_line).collect();
		Self { lines }
	}

	/// Returns the unquoted value of `key`. The last assignment wins.
	pub fn get(&self, key: &str) -> Option<String> {
		self.lines.iter().rev().find_map(|line| match line {
			EnvLine::Entry { key: k, raw_value, .. } if k == key => Some(unquote(raw_value)),
			_ => None,
		})
	}

	/// Sets `key` to `value`, rewriting every existing assignment in place
	/// or appending a new line when the key is absent.
	pub fn set(&mut self, key: &str, value: &str) {
		let mut found = false;
		for line in &mut self.lines {
			if let EnvLine::Entry { key: k, raw_value, .. } = line {
				if k == key {
					*raw_value = value.to_string();
					found = true;
				}
			}
		}
		if !found {
			self.lines.push(EnvLine::Entry {
				export: false,
				key: key.to_string(),
				raw_value: value.to_string(),
				comment: String::new(),
			});
		}
	}

	/// Iterates `(key, unquoted value)` pairs in file order.
	pub fn entries(&self) -> impl Iterator<Item = (&str, String)> {
		self.lines.iter().filter_map(|line| match line {
			EnvLine::Entry { key, raw_value, .. } => Some((key.as_str(), unquote(raw_value))),
			EnvLine::Other(_) => None,
		})
	}

	pub fn render(&self) -> String {
		self.to_string()
	}
}

impl fmt::Display for EnvDocument {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for line in &self.lines {
			match line {
				EnvLine::Entry { export, key, raw_value, comment } => {
					if *export {
						f.write_str("export ")?;
					}
					writeln!(f, "{key}={raw_value}{comment}")?;
				}
				EnvLine::Other(raw) => writeln!(f, "{raw}")?,
			}
		}
		Ok(())
	}
}

fn parse_line(raw: &str) -> EnvLine {
	let trimmed = raw.trim_start();
	if trimmed.is_empty() || trimmed.starts_with('#') {
		return EnvLine::Other(raw.to_string());
	}

	let (export, body) = match trimmed.strip_prefix("export ") {
		Some(rest) => (true, rest.trim_start()),
		None => (false, trimmed),
	};

	let Some((key, value)) = body.split_once('=') else {
		return EnvLine::Other(raw.to_string());
	};
	let key = key.trim();
	if key.is_empty() || key.contains(char::is_whitespace) {
		return EnvLine::Other(raw.to_string());
	}

	let value = value.trim();
	let (raw_value, comment) = split_inline_comment(value);
	EnvLine::Entry {
		export,
		key: key.to_string(),
		raw_value: raw_value.to_string(),
		comment: comment.to_string(),
	}
}

/// Splits `value # comment` into the value and the comment suffix. A `#`
/// only starts a comment outside quotes and after whitespace.
fn split_inline_comment(value: &str) -> (&str, &str) {
	let search_from = match value.chars().next() {
		Some(quote @ ('"' | '\'')) => match value[1..].find(quote) {
			Some(close) => close + 2,
			None => return (value, ""),
		},
		_ => 0,
	};
	let bytes = value.as_bytes();
	let start = value[search_from..]
		.char_indices()
		.map(|(i, c)| (search_from + i, c))
		.find(|&(i, c)| c == '#' && i > 0 && bytes[i - 1].is_ascii_whitespace());
	match start {
		Some((idx, _)) => {
			let value_end = value[..idx].trim_end().len();
			(&value[..value_end], &value[value_end..])
		}
		None => (value, ""),
	}
}

fn unquote(raw: &str) -> String {
	for quote in ['"', '\''] {
		if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
			return raw[1..raw.len() - 1].to_string();
		}
	}
	raw.to_string()
}
