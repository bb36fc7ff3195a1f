use anyhow::{self, Context};
use tracing::info;

use connect_four_server::configuration::Configuration;
use connect_four_server::logger::{init_logger, init_stdout_logger};
use connect_four_server::server::Server;

fn main() -> anyhow::Result<()> {
    let config = Configuration::from_env();
    if config.log() {
        init_logger()?;
    } else {
        init_stdout_logger()?;
    }

    let server = Server::bind(config).context("creating server socket")?;
    info!(addr = %server.local_addr(), "connect four server ready");
    server.run()
}
