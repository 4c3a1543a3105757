//! Failure screenshots.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::browser::PortalBrowser;

/// `<dir>/epf-failure-<YYYYmmdd-HHMMSS>.png`
pub fn artifact_path(dir: &Path, at: DateTime<Local>) -> PathBuf {
	dir.join(format!("epf-failure-{}.png", at.format("%Y%m%d-%H%M%S")))
}

/// Captures a full-page screenshot of the current page into `dir`.
///
/// Capture problems are logged and swallowed; the caller is already
/// handling a more important failure.
pub async fn capture_failure(browser: &mut dyn PortalBrowser, dir: &Path) -> Option<PathBuf> {
	if let Err(e) = std::fs::create_dir_all(dir) {
		warn!(target = "epf.run", dir = %dir.display(), error = %e, "cannot create diagnostics directory");
		return None;
	}
	let path = artifact_path(dir, Local::now());
	match browser.screenshot(&path).await {
		Ok(()) => {
			info!(target = "epf.run", artifact = %path.display(), "diagnostic screenshot saved");
			Some(path)
		}
		Err(e) => {
			warn!(target = "epf.run", error = %e, "diagnostic screenshot failed");
			None
		}
	}
}
