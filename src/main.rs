//! relay-reactor server
//!
//! Listens on a TCP port (8765 by default) and logs every chunk of bytes each
//! connection sends, trimmed, one line per read.
//!
//! Configuration via CLI arguments or TOML file.

use relay_reactor::config::Config;
use relay_reactor::{init_logging, runtime};
use tracing::info;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    init_logging(&config.log_level);

    info!(
        listen = %config.listen,
        backlog = config.backlog,
        "Starting relay-reactor"
    );

    runtime::run(config)?;
    Ok(())
}
