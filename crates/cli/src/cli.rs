use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "epf")]
#[command(about = "Request a fresh ephemeral VPN port and propagate it to the local stack")]
#[command(version)]
pub struct Cli {
	/// Configuration file (JSON)
	#[arg(short, long, env = "EPF_CONFIG", value_name = "FILE", default_value = "epf.json")]
	pub config: PathBuf,
}
