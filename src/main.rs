//! LanShare server binary.
//!
//! Parses CLI/environment configuration, then serves the root directory until
//! Ctrl+C or SIGTERM.

use clap::Parser;
use lanshare::{Args, FileServer, ServerError, logging};

/// Starts the file server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    logging::init_logging();

    let args = Args::parse();
    let config = args.into_server_config()?;
    FileServer::new(config).run_forever().await
}
