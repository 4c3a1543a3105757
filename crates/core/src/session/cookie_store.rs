//! Session-cookie persistence between runs.

use std::io::Write;
use std::path::{Path, PathBuf};

use epf_protocol::CookieJar;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::Result;

/// JSON cookie jar on disk. With no path configured nothing is loaded or saved.
#[derive(Debug, Clone, Default)]
pub struct CookieStore {
	path: Option<PathBuf>,
}

impl CookieStore {
	pub fn new(path: Option<PathBuf>) -> Self {
		Self { path }
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	/// Reads the stored jar. Missing, unreadable, corrupt and empty stores
	/// all yield `None`; only the last three are worth a warning.
	pub fn load(&self) -> Option<CookieJar> {
		let path = self.path.as_deref()?;
		let text = match std::fs::read_to_string(path) {
			Ok(text) => text,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				debug!(target = "epf.session", path = %path.display(), "no stored cookies");
				return None;
			}
			Err(e) => {
				warn!(target = "epf.session", path = %path.display(), error = %e, "cookie store unreadable; ignoring");
				return None;
			}
		};

		match CookieJar::from_json(&text) {
			Ok(jar) if jar.is_empty() => None,
			Ok(jar) => {
				debug!(target = "epf.session", path = %path.display(), cookies = jar.len(), "loaded stored cookies");
				Some(jar)
			}
			Err(e) => {
				warn!(target = "epf.session", path = %path.display(), error = %e, "cookie store corrupt; ignoring");
				None
			}
		}
	}

	/// Replaces the stored jar atomically. A no-op without a configured path.
	pub fn save(&self, jar: &CookieJar) -> Result<()> {
		let Some(path) = self.path.as_deref() else {
			return Ok(());
		};
		let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
		std::fs::create_dir_all(dir)?;

		let json = jar.to_json()?;
		let mut tmp = NamedTempFile::new_in(dir)?;
		tmp.write_all(json.as_bytes())?;
		tmp.as_file().sync_all()?;
		tmp.persist(path).map_err(|e| e.error)?;
		debug!(target = "epf.session", path = %path.display(), cookies = jar.len(), "saved session cookies");
		Ok(())
	}
}
