//! relay-client: writes standard input to a relay-reactor server.

use clap::Parser;
use relay_reactor::config::ClientArgs;
use relay_reactor::{client, init_logging};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = ClientArgs::parse();

    init_logging(&args.log_level);

    client::run(&args)?;
    Ok(())
}
