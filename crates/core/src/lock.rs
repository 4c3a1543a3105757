//! Pid-file lock against overlapping runs.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use epf_runtime::pid_is_alive;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{EpfError, Result};

/// A lock file without a readable pid younger than this is assumed to
/// belong to a run that is still starting up.
const UNREADABLE_GRACE: Duration = Duration::from_secs(30);

/// Held for the duration of a run; the file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
	path: PathBuf,
}

impl RunLock {
	/// Installs the lock file with this process's pid.
	///
	/// The pid is written to a temporary file first and linked into place
	/// without clobbering, so the lock never exists without its pid. A lock
	/// whose recorded pid is no longer alive is reclaimed, as is an
	/// unreadable one older than a short grace period. Anything else yields
	/// [`EpfError::RunLocked`].
	pub fn acquire(path: &Path) -> Result<Self> {
		let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
			Some(dir) => dir,
			None => Path::new("."),
		};
		std::fs::create_dir_all(dir)?;

		for _ in 0..2 {
			let mut tmp = NamedTempFile::new_in(dir)?;
			write!(tmp, "{}", std::process::id())?;
			tmp.as_file().sync_all()?;

			match tmp.persist_noclobber(path) {
				Ok(_) => {
					debug!(target = "epf.run", path = %path.display(), "run lock acquired");
					return Ok(Self { path: path.to_path_buf() });
				}
				Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
					let holder = read_holder(path);
					if !is_stale(path, holder) {
						return Err(EpfError::RunLocked {
							path: path.to_path_buf(),
							holder,
						});
					}
					warn!(target = "epf.run", path = %path.display(), holder = ?holder, "reclaiming stale run lock");
					match std::fs::remove_file(path) {
						Ok(()) => {}
						Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
						Err(e) => return Err(e.into()),
					}
				}
				Err(e) => return Err(e.error.into()),
			}
		}

		// Another process installed its lock between our removal and retry.
		Err(EpfError::RunLocked {
			path: path.to_path_buf(),
			holder: read_holder(path),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for RunLock {
	fn drop(&mut self) {
		if let Err(e) = std::fs::remove_file(&self.path) {
			warn!(target = "epf.run", path = %self.path.display(), error = %e, "failed to remove run lock");
		}
	}
}

fn read_holder(path: &Path) -> Option<u32> {
	std::fs::read_to_string(path).ok().and_then(|s| s.trim().parse().ok())
}

fn is_stale(path: &Path, holder: Option<u32>) -> bool {
	match holder {
		Some(pid) => !pid_is_alive(pid),
		None => match std::fs::metadata(path).and_then(|m| m.modified()) {
			Ok(modified) => SystemTime::now().duration_since(modified).is_ok_and(|age| age >= UNREADABLE_GRACE),
			Err(e) => e.kind() == std::io::ErrorKind::NotFound,
		},
	}
}

#[cfg(test)]
mod tests {
	use std::fs::{File, FileTimes};

	use tempfile::TempDir;

	use super::*;

	fn backdate(path: &Path) {
		let old = SystemTime::now() - Duration::from_secs(3600);
		let file = File::options().write(true).open(path).unwrap();
		file.set_times(FileTimes::new().set_modified(old)).unwrap();
	}

	#[test]
	fn lock_is_released_on_drop() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("run/epf.lock");
		{
			let lock = RunLock::acquire(&path).unwrap();
			assert_eq!(std::fs::read_to_string(lock.path()).unwrap(), std::process::id().to_string());
		}
		assert!(!path.exists());
	}

	#[test]
	fn live_holder_is_rejected() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("epf.lock");
		let _held = RunLock::acquire(&path).unwrap();

		match RunLock::acquire(&path) {
			Err(EpfError::RunLocked { holder, .. }) => assert_eq!(holder, Some(std::process::id())),
			other => panic!("expected RunLocked, got {other:?}"),
		}
	}

	#[test]
	fn dead_holder_is_reclaimed() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("epf.lock");
		std::fs::write(&path, "0").unwrap();

		let lock = RunLock::acquire(&path).unwrap();
		assert_eq!(std::fs::read_to_string(lock.path()).unwrap(), std::process::id().to_string());
	}

	#[test]
	fn fresh_empty_lock_is_held() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("epf.lock");
		std::fs::write(&path, "").unwrap();

		match RunLock::acquire(&path) {
			Err(EpfError::RunLocked { holder, .. }) => assert_eq!(holder, None),
			other => panic!("expected RunLocked, got {other:?}"),
		}
		assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
	}

	#[test]
	fn old_unreadable_lock_is_reclaimed() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("epf.lock");
		std::fs::write(&path, "not a pid").unwrap();
		backdate(&path);

		let lock = RunLock::acquire(&path).unwrap();
		assert_eq!(std::fs::read_to_string(lock.path()).unwrap(), std::process::id().to_string());
	}

	#[test]
	fn no_temporary_files_are_left_behind() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("epf.lock");
		let lock = RunLock::acquire(&path).unwrap();
		let _ = RunLock::acquire(&path).unwrap_err();
		drop(lock);
		assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
	}
}
