use clap::Parser;
use mpyrepl_runner::{run_command, Cli, Console, RunnerError, RunnerResult};
use mpyrepl_session::SessionManager;
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => {}
        // The traceback has already been printed.
        Err(RunnerError::RemoteException(_)) => std::process::exit(1),
        Err(err) => {
            eprintln!("error: {}", err);
            std::process::exit(1);
        }
    }
}

fn init_tracing(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Ctrl-C events, delivered to the command instead of killing the process.
fn interrupt_channel() -> RunnerResult<mpsc::UnboundedReceiver<()>> {
    let (tx, rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    Ok(rx)
}

async fn run(cli: Cli) -> RunnerResult<()> {
    mpyrepl_metrics::describe_metrics();
    let profile = cli.profile()?;
    let manager = SessionManager::new(profile.session_config());
    let session = manager.connect(&profile.connection).await?;

    let mut console = Console::new(std::io::stdout(), std::io::stderr(), cli.json);
    if cli.command.is_interruptible() {
        console = console.with_interrupts(interrupt_channel()?);
    }
    let outcome = run_command(&session, &cli.command, &mut console).await;

    if let Err(err) = manager.disconnect().await {
        warn!(error = %err, "disconnect failed");
    }
    outcome
}
