use anyhow::{Context as _, Result};
use clap::Parser;
use squaresd::{config::DaemonConfig, ipc, AppContext};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "squaresd",
    about = "Squares Host — background fetch broker for squares.io",
    version
)]
struct Args {
    /// WebSocket message-server port
    #[arg(long, env = "SQUARESD_PORT")]
    port: Option<u16>,

    /// Data directory for config, preferences, and granted origins
    #[arg(long, env = "SQUARESD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SQUARESD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1)
    #[arg(long, env = "SQUARESD_BIND")]
    bind_address: Option<String>,

    /// Companion site base URL
    #[arg(long, env = "SQUARESD_COMPANION_URL")]
    companion_url: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "SQUARESD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = DaemonConfig::new(
        args.port,
        args.data_dir,
        args.log,
        args.bind_address,
        args.companion_url,
    );

    let _log_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %config.data_dir.display(),
        "starting squaresd"
    );

    let ctx = std::sync::Arc::new(AppContext::new(config)?);

    // Keep the context-menu contributions tracking the ctxmenu preference.
    let menu_sync = std::sync::Arc::clone(&ctx.menu).spawn_sync(ctx.prefs.subscribe());

    let result = ipc::run(ctx).await;
    menu_sync.abort();
    result
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("squaresd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
