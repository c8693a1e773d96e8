use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use runtime::{AppConfig, CliArgs, DatabaseConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use url::Url;

use identity_sync::config::IdentitySyncConfig;
use identity_sync::domain::ports::{AuthChange, Session};
use identity_sync::infra::auth::ChannelAuthSource;
use identity_sync::infra::events::TracingEventPublisher;
use identity_sync::infra::storage::SqliteStoreOptions;
use identity_sync::module::{open_store, StoreSpec};
use identity_sync::IdentitySync;

/// Expand a sqlite DSN into an absolute-path DSN using a base directory.
/// - Keeps "sqlite::memory:" as-is.
/// - Normalizes backslashes into forward slashes (important on Windows).
fn absolutize_sqlite_dsn(dsn: &str, base_dir: &Path, create_dirs: bool) -> Result<String> {
    if dsn.eq_ignore_ascii_case("sqlite::memory:") || dsn.eq_ignore_ascii_case("sqlite://:memory:")
    {
        return Ok("sqlite::memory:".to_string());
    }
    let db_path = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| anyhow!("DSN must start with sqlite:// (got: {})", dsn))?;

    let (path_str, query) = match db_path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (db_path, None),
    };

    let mut p = PathBuf::from(path_str);
    if p.as_os_str().is_empty() {
        return Err(anyhow!("Empty SQLite path in DSN"));
    }
    if p.is_relative() {
        p = base_dir.join(p);
    }

    if let Some(dir) = p.parent() {
        if create_dirs {
            std::fs::create_dir_all(dir)?;
        }
    }

    let mut out = String::from("sqlite://");
    out.push_str(&p.to_string_lossy().replace('\\', "/"));
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

/// Identity Sync Server - mirrors provider identities into the user store
#[derive(Parser)]
#[command(name = "identity-sync-server")]
#[command(about = "Identity Sync Server - mirrors provider identities into the user store")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Use the in-memory user store
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed auth changes (JSON lines) through the identity bridge
    Run {
        /// File with one auth change per line, `-` for stdin
        #[arg(long, default_value = "-")]
        events: String,

        /// JSON session reported by the initial session read
        #[arg(long)]
        session: Option<PathBuf>,
    },
    /// Check configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
        mock: cli.mock,
    };

    // Load configuration (normalized home_dir is applied inside)
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    runtime::logging::init_logging_from_config(&logging_config, Path::new(&config.server.home_dir));
    tracing::info!("Identity Sync Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let command = cli.command.unwrap_or(Commands::Run {
        events: "-".to_string(),
        session: None,
    });
    match command {
        Commands::Run { events, session } => run_sync(config, args, events, session).await,
        Commands::Check => check_config(config),
    }
}

/// Only sqlite DSNs are accepted.
fn ensure_sqlite_dsn(cfg: &DatabaseConfig) -> Result<()> {
    let raw = cfg.url.trim();
    if raw.is_empty() {
        return Err(anyhow!("Database URL not configured"));
    }

    let url = Url::parse(raw).map_err(|e| anyhow!("Invalid database DSN '{}': {}", raw, e))?;
    match url.scheme() {
        "sqlite" => Ok(()),
        other => Err(anyhow!("Unsupported database type: {}", other)),
    }
}

fn store_spec(config: &AppConfig, args: &CliArgs) -> Result<StoreSpec> {
    if args.mock {
        return Ok(StoreSpec::Memory);
    }
    let Some(db_config) = config.database.as_ref() else {
        tracing::warn!("No database configuration found, using in-memory user store");
        return Ok(StoreSpec::Memory);
    };
    ensure_sqlite_dsn(db_config)?;

    // Base dir for resolving relative sqlite paths (already absolute & created)
    let base_dir = PathBuf::from(&config.server.home_dir);
    let url = absolutize_sqlite_dsn(db_config.url.trim(), &base_dir, true)?;

    let defaults = SqliteStoreOptions::default();
    let options = SqliteStoreOptions {
        max_conns: db_config.max_conns.unwrap_or(defaults.max_conns),
        busy_timeout: db_config
            .busy_timeout_ms
            .map(|ms| Duration::from_millis(ms as u64))
            .unwrap_or(defaults.busy_timeout),
        ..defaults
    };
    Ok(StoreSpec::Sqlite { url, options })
}

fn read_session(path: &Path) -> Result<Session> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid session JSON in {}", path.display()))
}

async fn open_feed(events: &str) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    if events == "-" {
        return Ok(Box::new(BufReader::new(tokio::io::stdin())));
    }
    let file = tokio::fs::File::open(events)
        .await
        .with_context(|| format!("Failed to open events file {events}"))?;
    Ok(Box::new(BufReader::new(file)))
}

/// Emit every well-formed line; blank lines and `#` comments are skipped.
async fn feed_changes(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    source: &ChannelAuthSource,
) -> Result<usize> {
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut fed = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<AuthChange>(line) {
            Ok(change) => {
                tracing::debug!(line = line_no, event = ?change.event, "Feeding auth change");
                source.emit(change);
                fed += 1;
            }
            Err(e) => tracing::warn!(line = line_no, error = %e, "Skipping malformed auth change"),
        }
    }
    Ok(fed)
}

async fn run_sync(
    config: AppConfig,
    args: CliArgs,
    events: String,
    session: Option<PathBuf>,
) -> Result<()> {
    let module_cfg: IdentitySyncConfig = config.module_config("identity_sync")?;
    let spec = store_spec(&config, &args)?;
    let store = open_store(&spec, &module_cfg).await?;

    let source = Arc::new(match session {
        Some(path) => ChannelAuthSource::with_session(read_session(&path)?),
        None => ChannelAuthSource::new(),
    });
    let sync = IdentitySync::new(
        &module_cfg,
        store,
        source.clone(),
        Arc::new(TracingEventPublisher),
    );

    let reader = open_feed(&events).await?;
    let active = sync.activate();

    let outcome = tokio::select! {
        res = async {
            let fed = feed_changes(reader, &source).await?;
            source.close();
            active.drain().await;
            Ok::<_, anyhow::Error>(fed)
        } => res,
        res = runtime::wait_for_shutdown() => {
            tracing::info!("Shutdown requested, stopping feed");
            res.map(|_| 0)
        }
    };

    let current = sync.current_user().get();
    active.deactivate().await;
    let fed = outcome?;
    tracing::info!(fed, "Auth change feed finished");

    match current {
        Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
        None => println!("No current user"),
    }
    Ok(())
}

fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    let module_cfg: IdentitySyncConfig = config.module_config("identity_sync")?;
    if let Some(db_config) = config.database.as_ref() {
        ensure_sqlite_dsn(db_config)?;
    }

    tracing::info!("Configuration is valid");
    println!("Configuration check passed");
    println!("Server config:");
    println!("{}", config.to_yaml()?);
    println!("identity_sync: {module_cfg:?}");

    Ok(())
}
