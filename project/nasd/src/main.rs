use clap::Parser;
use nasd::config::Config;
use nasd::service::scheduler::{Sweep, run_sweep};
use nasd::utils::cli::{Args, Command};
use nasd::utils::state::AppState;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = Config::load(&args.config).await?;
    if let Some(data_dir) = &args.data_dir {
        config.data_dir = data_dir.clone();
    }

    let state = AppState::new(config).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(state).await?,
        Command::Sweep => {
            for sweep in Sweep::ALL {
                run_sweep(&state.reclaimer, state.notifier.as_ref(), sweep).await;
            }
            if let Err(err) = state.mirror.run().await {
                error!("Volume mirror failed: {err}");
            }
            state.shutdown().await?;
        }
        Command::BackupIndex => {
            let report = state.backup.backup_all().await;
            for target in &report.written {
                println!("{}", target.display());
            }
            state.shutdown().await?;
            if !report.is_success() {
                anyhow::bail!("index backup failed on {} volume(s)", report.failed.len());
            }
        }
        Command::Ls { path } => {
            let children = state.files.list_children(&path).await;
            state.shutdown().await?;
            for node in children? {
                let kind = if node.is_directory { "d" } else { "-" };
                println!(
                    "{kind} {:>12} {} {}",
                    node.size,
                    node.modified_at.format("%Y-%m-%d %H:%M"),
                    node.file_name
                );
            }
        }
    }
    Ok(())
}

async fn run(state: AppState) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let handles = state.spawn_background(cancel.clone());
    info!("nasd running on {} volume(s)", state.config.storage.paths.len());

    shutdown_signal().await;
    cancel.cancel();
    for result in futures::future::join_all(handles).await {
        if let Err(err) = result {
            error!("Background task ended abnormally: {err}");
        }
    }
    state.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!("Failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down...");
}
