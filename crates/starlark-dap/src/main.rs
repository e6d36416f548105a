use clap::Parser;
use std::path::PathBuf;

use starlark_config::BridgeConfig;

/// Debug adapter bridging DAP clients to a Starlark debug server.
///
/// Speaks DAP over stdio; logs go to stderr and/or the configured log file.
#[derive(Debug, Parser)]
#[command(name = "starlark-dap", version, about)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, env = "STARLARK_DAP_CONFIG")]
    config: Option<PathBuf>,

    /// Log at `debug` level regardless of the configured level.
    #[arg(long)]
    verbose: bool,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config);
    if cli.verbose {
        config.logging.set_verbose();
    }
    starlark_config::init_tracing_with_config(&config);
    tracing::info!(
        target: "starlark.dap",
        version = env!("CARGO_PKG_VERSION"),
        "starlark-dap starting"
    );

    starlark_dap::server::run_stdio(&config).await
}

fn load_config(path: Option<PathBuf>) -> BridgeConfig {
    let Some(path) = path else {
        return BridgeConfig::default();
    };

    match BridgeConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "starlark-dap: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            BridgeConfig::default()
        }
    }
}
