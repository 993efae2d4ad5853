use std::{error::Error, io, time::Duration};

use clap::Parser;
use tandem::{Session, SessionOptions, cli};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Address of a tandem server
    address: String,
    /// Give up on a reply after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize env_logger; For logging to STDOUT/STDERR
    env_logger::init();

    let cli = Cli::parse();
    let mut options = SessionOptions::default();
    if let Some(ms) = cli.timeout_ms {
        options = options
            .with_read_timeout(Duration::from_millis(ms))
            .with_write_timeout(Duration::from_millis(ms));
    }
    let session = Session::connect(&cli.address, options)?;

    ctrlc::set_handler(|| {
        eprintln!("interrupted");
        std::process::exit(130);
    })?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    loop {
        let command = match cli::prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        match cli::run(&session, command, stdout.lock()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e}"),
        }
        if !session.is_open() {
            eprintln!("connection lost");
            break;
        }
    }

    session.close()?;
    Ok(())
}
