use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod util;

/// Install the global `tracing` subscriber, writing to stderr.
///
/// `RUST_LOG` wins over the command line flags when it is set.
pub fn init_logging(opts: &cli::GlobalOpts) -> Result<(), anyhow::Error> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(opts.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {}", e))
}
