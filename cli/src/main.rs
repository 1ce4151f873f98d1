use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use testwatch_core::{config, ProcessRunState, RunCoordinator, SinkTarget};

mod console;
mod smoke;

/// Runs the built-in smoke suite once under the watchdog harness and exits
/// with its status code.
#[derive(Debug, Parser)]
#[command(name = "testwatch", version, about)]
struct Args {
    /// Directory receiving the <suite>-tests.log file
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// Override the watchdog timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Do not mirror suite output to the terminal
    #[arg(long)]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut cfg = config::load_default()?;
    if let Some(secs) = args.timeout_secs {
        cfg.timeout_secs = secs;
    }

    let state = Arc::new(ProcessRunState::new());
    let coordinator = RunCoordinator::new(state, cfg, Arc::new(smoke::SmokeSuite));

    // The mirror callback must stay alive for the whole run: the sink only
    // holds it weakly.
    let _mirror = if args.no_console {
        None
    } else {
        let mirror = console::mirror_target()?;
        coordinator
            .sink()
            .register_target(SinkTarget::new(Arc::downgrade(&mirror)));
        Some(mirror)
    };

    let outcome = coordinator.execute(&args.workdir).await;
    tracing::info!(
        target: "testwatch.cli",
        code = outcome.code,
        timed_out = outcome.timed_out,
        degraded = outcome.degradations.len(),
        "run complete"
    );
    std::process::exit(outcome.code);
}
