pub mod worker;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use brief_coord::{CoordinationOptions, CoordinationStore};
use brief_service::BriefService;

#[derive(Debug, Parser)]
#[command(
	version = brief_cli::VERSION,
	rename_all = "kebab",
	styles = brief_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = brief_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let coord = CoordinationStore::new(CoordinationOptions::from_config(&config.coordination));
	let service = BriefService::connect(config, coord).await?;

	tracing::info!(version = brief_cli::VERSION, "Worker started.");

	worker::run_worker(service).await
}
