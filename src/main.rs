use anyhow::Result;
use clap::Parser;
use panegrid::cli::{self, Cli};
use tokio::runtime::Runtime;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Routes all log::info!() etc. to /tmp/panegrid_debug.log.
    // CLI --log-level takes precedence, then RUST_LOG, then DEBUG_LEVEL.
    panegrid::debug::init_log_bridge(cli.log_level.map(|l| l.to_level_filter()));
    log::info!("panegrid {} running {:?}", panegrid::VERSION, cli.command);

    let runtime = Runtime::new()?;
    let result = runtime.block_on(cli::commands::run(cli));
    runtime.shutdown_timeout(std::time::Duration::from_secs(2));

    match result {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("panegrid: error: {e:#}");
            std::process::exit(1);
        }
    }
}
