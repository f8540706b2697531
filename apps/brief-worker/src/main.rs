use clap::Parser;

use brief_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	brief_worker::run(Args::parse()).await
}
