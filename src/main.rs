//! CLI entry point for `mimegate`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use mimegate::config::Config;
use mimegate::http::{self, AppState};
use mimegate::store::ContentStore;
use mimegate::sweeper::Sweeper;

#[derive(Parser)]
#[command(name = "mimegate", version, about = "Email parsing service with expiring attachment downloads")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Configuration file (defaults to $MIMEGATE_CONFIG or the user config dir)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Print the effective configuration as TOML
    Config,
    /// Remove attachment files left behind by earlier runs
    Clean,
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(Commands::Manpage) => return cmd_manpage(),
        _ => {}
    }

    let mut config = mimegate::config::load_config(cli.config.as_deref())
        .context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    setup_logging(&log_level, &config);

    match cli.command {
        None | Some(Commands::Serve) => cmd_serve(config).await,
        Some(Commands::Config) => cmd_config(&config),
        Some(Commands::Clean) => cmd_clean(&config).await,
        Some(Commands::Completions { .. }) | Some(Commands::Manpage) => Ok(()),
    }
}

/// Set up tracing with stderr output and optional daily-rotated file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let file_layer = config.general.log_dir.as_ref().and_then(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        let appender = tracing_appender::rolling::daily(dir, "mimegate.log");
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(appender),
        )
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

async fn cmd_serve(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let state = AppState::new(config);

    // Metadata is in memory only, so nothing already on disk can be served.
    let removed = state
        .vault
        .purge_orphans()
        .await
        .context("failed to clean the attachment directory")?;
    if removed > 0 {
        info!(removed, "Removed orphaned attachment files");
    }

    let sweeper = Arc::new(Sweeper::new(
        Arc::clone(&state.vault),
        Arc::clone(&state.tokens),
        state.config.cleanup_interval(),
    ));
    sweeper.start();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        %addr,
        base_url = %state.base_url,
        download_mode = ?state.config.attachments.download_mode,
        dir = %state.config.attachments.dir.display(),
        attachment_ttl_ms = state.vault.ttl().as_millis() as u64,
        max_size = %humansize::format_size(state.pipeline.policy().max_size(), humansize::BINARY),
        "Listening"
    );

    let stopping = Arc::clone(&sweeper);
    let shutdown = async move {
        shutdown_signal().await;
        info!("Shutting down");
        stopping.stop().await;
    };

    http::serve(listener, state, shutdown)
        .await
        .context("server error")?;

    // No-op if the shutdown path already stopped it.
    sweeper.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Print the effective configuration.
fn cmd_config(config: &Config) -> anyhow::Result<()> {
    if let Some(path) = mimegate::config::config_file_path() {
        println!("# config file: {}", path.display());
    }
    print!("{}", config.to_redacted_toml()?);
    Ok(())
}

/// Delete every file in the attachment directory.
async fn cmd_clean(config: &Config) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let store = ContentStore::new(config.attachments.dir.clone());
    let before = dir_size(store.dir()).await;
    let removed = store
        .purge_orphans(&Default::default())
        .await
        .with_context(|| format!("failed to clean {}", store.dir().display()))?;

    println!(
        "  Removed {removed} file(s), {} from {}",
        format_size(before.saturating_sub(dir_size(store.dir()).await), BINARY),
        store.dir().display()
    );
    Ok(())
}

async fn dir_size(dir: &std::path::Path) -> u64 {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return 0;
    };
    let mut total = 0;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Ok(meta) = entry.metadata().await {
            if meta.is_file() {
                total += meta.len();
            }
        }
    }
    total
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mimegate", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
