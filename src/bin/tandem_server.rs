use std::error::Error;

use clap::Parser;
use log::info;
use tandem::protocol::CatalogServer;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Listen for new connections at address
    address: String,
    /// Number of connections served at once
    #[arg(long, default_value_t = 15, value_parser = clap::value_parser!(u16).range(1..))]
    workers: u16,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let server = CatalogServer::bind(&cli.address, usize::from(cli.workers))?;

    ctrlc::set_handler(|| {
        info!("interrupted, shutting down");
        std::process::exit(0);
    })?;

    server.listen()?;
    Ok(())
}
