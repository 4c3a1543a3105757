use clap::Parser;
use epf::Config;
use epf_cli::{app, cli::Cli, logging};
use tracing::error;

#[tokio::main(flavor = "current_thread")]
async fn main() {
	let cli = Cli::parse();

	let config = match Config::load(&cli.config) {
		Ok(config) => config,
		Err(err) => {
			eprintln!("epf: {err}");
			std::process::exit(err.exit_code());
		}
	};

	if let Err(err) = logging::init_logging(&config.logging) {
		eprintln!("epf: {err:#}");
		std::process::exit(2);
	}

	if let Err(err) = config.validate() {
		error!(target = "epf.config", error = %err, "configuration rejected");
		eprintln!("epf: {err}");
		std::process::exit(err.exit_code());
	}

	match app::run(&config).await {
		Ok(code) => std::process::exit(code),
		Err(err) => {
			error!(target = "epf", error = %err, "run could not start");
			eprintln!("epf: {err:#}");
			std::process::exit(1);
		}
	}
}
