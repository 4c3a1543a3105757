use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use epf::config::LoggingConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber described by `config`.
///
/// `RUST_LOG` wins over `logging.level`. With `logging.file` set, records
/// are appended to that file without colour instead of going to stderr.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
	if !config.enabled {
		return Ok(());
	}

	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&config.level))
		.unwrap_or_else(|_| EnvFilter::new("info"));

	let file_layer = match &config.file {
		Some(path) => {
			if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
				std::fs::create_dir_all(dir).with_context(|| format!("creating log directory {}", dir.display()))?;
			}
			let file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(path)
				.with_context(|| format!("opening log file {}", path.display()))?;
			Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
		}
		None => None,
	};
	let stderr_layer = file_layer.is_none().then(|| fmt::layer().with_writer(std::io::stderr));

	tracing_subscriber::registry()
		.with(filter)
		.with(file_layer)
		.with(stderr_layer)
		.try_init()
		.context("installing tracing subscriber")
}
