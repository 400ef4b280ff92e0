//! bundlemux - multiplexing gateway for MCP servers

use clap::Parser;
use std::path::PathBuf;

use bundlemux_config::ConfigLoader;

#[derive(Debug, Parser)]
#[command(name = "bundlemux", about = "Multiplexing gateway for MCP servers")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, env = "BUNDLEMUX_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load(cli.config.as_ref())?;
    bundlemux_server::startup::init_tracing(&config);

    bundlemux_server::run(config).await
}
