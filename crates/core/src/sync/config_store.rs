//! `KEY=VALUE` configuration store on disk.

use std::io::Write;
use std::path::{Path, PathBuf};

use epf_protocol::EnvDocument;
use tempfile::NamedTempFile;
use tracing::debug;

use super::ConfigStore;
use crate::error::{EpfError, Result};

/// Compose-style `.env` file.
///
/// Writes rewrite only the target key and replace the file atomically: the
/// new content goes to a temporary file in the same directory, inherits the
/// old file's permissions, and is renamed over the original.
#[derive(Debug, Clone)]
pub struct EnvFileStore {
	path: PathBuf,
}

impl EnvFileStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	fn write_error(&self, reason: impl ToString) -> EpfError {
		EpfError::ConfigWrite {
			path: self.path.clone(),
			reason: reason.to_string(),
		}
	}
}

impl ConfigStore for EnvFileStore {
	fn location(&self) -> &Path {
		&self.path
	}

	fn read(&self, key: &str) -> Result<Option<String>> {
		match std::fs::read_to_string(&self.path) {
			Ok(text) => Ok(EnvDocument::parse(&text).get(key)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	fn write(&self, key: &str, value: &str) -> Result<()> {
		let (existing, permissions) = match std::fs::read_to_string(&self.path) {
			Ok(text) => (text, std::fs::metadata(&self.path).ok().map(|m| m.permissions())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => (String::new(), None),
			Err(e) => return Err(self.write_error(e)),
		};

		let mut doc = EnvDocument::parse(&existing);
		doc.set(key, value);

		let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
		let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_error(e))?;
		tmp.write_all(doc.render().as_bytes()).map_err(|e| self.write_error(e))?;
		if let Some(permissions) = permissions {
			tmp.as_file().set_permissions(permissions).map_err(|e| self.write_error(e))?;
		}
		tmp.as_file().sync_all().map_err(|e| self.write_error(e))?;
		tmp.persist(&self.path).map_err(|e| self.write_error(e.error))?;

		debug!(target = "epf.sync", path = %self.path.display(), %key, %value, "config store written");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;

	use super::*;

	const ENV: &str = "# compose settings\nTZ=Europe/Berlin\n\nexport VPN_PORT_FORWARDED=\"51413\"\nQBT_WEBUI_PORT=8080 # web ui\n";

	#[test]
	fn rewrites_only_the_target_key() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join(".env");
		std::fs::write(&path, ENV).unwrap();

		let store = EnvFileStore::new(&path);
		assert_eq!(store.read("VPN_PORT_FORWARDED").unwrap().as_deref(), Some("51413"));
		store.write("VPN_PORT_FORWARDED", "60222").unwrap();

		let text = std::fs::read_to_string(&path).unwrap();
		assert_eq!(
			text,
			"# compose settings\nTZ=Europe/Berlin\n\nexport VPN_PORT_FORWARDED=60222\nQBT_WEBUI_PORT=8080 # web ui\n"
		);
		assert_eq!(store.read("VPN_PORT_FORWARDED").unwrap().as_deref(), Some("60222"));
		assert_eq!(store.read("QBT_WEBUI_PORT").unwrap().as_deref(), Some("8080"));
	}

	#[test]
	fn quoted_port_with_trailing_comment_is_last_known() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join(".env");
		std::fs::write(&path, "VPN_PORT_FORWARDED=\"51413\" # set by script\n").unwrap();

		let store = EnvFileStore::new(&path);
		assert_eq!(crate::sync::last_known_port(&store, "VPN_PORT_FORWARDED"), Some(51413));

		store.write("VPN_PORT_FORWARDED", "60222").unwrap();
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "VPN_PORT_FORWARDED=60222 # set by script\n");
	}

	#[test]
	fn appends_missing_key_and_creates_missing_file() {
		let dir = TempDir::new().unwrap();
		let store = EnvFileStore::new(dir.path().join(".env"));
		assert_eq!(store.read("VPN_PORT_FORWARDED").unwrap(), None);

		store.write("VPN_PORT_FORWARDED", "60222").unwrap();
		assert_eq!(std::fs::read_to_string(store.location()).unwrap(), "VPN_PORT_FORWARDED=60222\n");
	}

	#[cfg(unix)]
	#[test]
	fn preserves_file_permissions() {
		use std::os::unix::fs::PermissionsExt;

		let dir = TempDir::new().unwrap();
		let path = dir.path().join(".env");
		std::fs::write(&path, "A=1\n").unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o640)).unwrap();

		EnvFileStore::new(&path).write("A", "2").unwrap();
		let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
		assert_eq!(mode, 0o640);
	}

	#[test]
	fn missing_directory_is_a_config_write_error() {
		let dir = TempDir::new().unwrap();
		let store = EnvFileStore::new(dir.path().join("absent/.env"));
		let err = store.write("A", "1").unwrap_err();
		assert!(matches!(err, EpfError::ConfigWrite { .. }), "{err:?}");
	}
}
