//! db-sync CLI - differential table synchronization for MySQL-compatible
//! servers.

use clap::{Args, Parser, Subcommand};
use db_sync::config::{DEFAULT_COMPARE_BULK, DEFAULT_MODIFY_BULK, DEFAULT_PK_BULK};
use db_sync::{EndpointConfig, Mode, SyncError, SyncOptions, SyncRunner};
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "db-sync")]
#[command(about = "Synchronize tables between two MySQL-compatible servers")]
#[command(version)]
struct Cli {
    /// Log verbosity: trace, debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Print the run report as JSON to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert rows missing on the target
    Copy {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Copy plus deletion of target-only rows
    Sync {
        #[command(flatten)]
        args: SyncArgs,
    },
}

#[derive(Args)]
struct SyncArgs {
    /// Source database host IP or name
    #[arg(long)]
    from_host: String,

    /// Source database port
    #[arg(long, default_value_t = 3306)]
    from_port: u16,

    /// Source database username
    #[arg(long)]
    from_user: String,

    /// Source database password
    #[arg(long, default_value = "")]
    from_pwd: String,

    /// Source database schema
    #[arg(long)]
    from_schema: String,

    /// Target database host IP or name
    #[arg(long)]
    to_host: String,

    /// Target database port
    #[arg(long, default_value_t = 3306)]
    to_port: u16,

    /// Target database username
    #[arg(long)]
    to_user: String,

    /// Target database password
    #[arg(long, default_value = "")]
    to_pwd: String,

    /// Target database schema
    #[arg(long)]
    to_schema: String,

    /// Refresh common rows whose content diverges
    #[arg(long)]
    update: bool,

    /// Execute without modifying the target database
    #[arg(long)]
    dry_run: bool,

    /// Log failed mutations and keep going instead of aborting
    #[arg(long)]
    no_fail: bool,

    /// Disable binary logging on the target sessions
    #[arg(long)]
    disable_binlog: bool,

    /// Tables to process (every base table of the source when omitted)
    #[arg(long, num_args = 1..)]
    tables: Vec<String>,

    /// Worker count (0 = number of CPU cores)
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Page size for primary-key scans
    #[arg(long, default_value_t = DEFAULT_PK_BULK)]
    pk_bulk: usize,

    /// Window size for content-compare selects
    #[arg(long, default_value_t = DEFAULT_COMPARE_BULK)]
    compare_bulk: usize,

    /// Batch size for write chunks (one chunk = one transaction)
    #[arg(long, default_value_t = DEFAULT_MODIFY_BULK)]
    modify_bulk: usize,
}

impl SyncArgs {
    fn into_parts(self, mode: Mode) -> (SyncOptions, EndpointConfig, EndpointConfig) {
        let options = SyncOptions {
            mode,
            update: self.update,
            dry_run: self.dry_run,
            disable_binlog: self.disable_binlog,
            no_fail: self.no_fail,
            pk_bulk: self.pk_bulk,
            compare_bulk: self.compare_bulk,
            modify_bulk: self.modify_bulk,
            tables: self.tables,
            jobs: self.jobs,
        };
        let source = EndpointConfig {
            host: self.from_host,
            port: self.from_port,
            user: self.from_user,
            password: self.from_pwd,
            schema: self.from_schema,
        };
        let target = EndpointConfig {
            host: self.to_host,
            port: self.to_port,
            user: self.to_user,
            password: self.to_pwd,
            schema: self.to_schema,
        };
        (options, source, target)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, SyncError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(SyncError::Config)?;

    let (mode, args) = match cli.command {
        Commands::Copy { args } => (Mode::Copy, args),
        Commands::Sync { args } => (Mode::Sync, args),
    };
    let (options, source, target) = args.into_parts(mode);

    // Graceful stop on SIGINT/SIGTERM/SIGQUIT: workers abandon their table
    // at the next chunk boundary, in-flight transactions roll back.
    let cancel_rx = setup_signal_handler()?;

    let runner = SyncRunner::new(options, source, target)?;
    let report = runner.run(Some(cancel_rx)).await?;

    if cli.output_json {
        println!("{}", report.to_json()?);
    } else {
        println!("\nRun {:?}", report.status);
        println!("  Mode: {}{}", report.mode, if report.dry_run { " (dry run)" } else { "" });
        println!("  Duration: {:.2}s", report.duration_seconds);
        println!("  Tables: {}/{}", report.tables_synced, report.tables_total);
        println!("  Rows touched: {}", report.rows_touched);
        println!("  Throughput: {} rows/sec", report.rows_per_second);
        if !report.failed_tables.is_empty() {
            println!("  Failed tables: {:?}", report.failed_tables);
        }
    }

    Ok(ExitCode::from(report.exit_code()))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity: {other}")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("db-sync {}", env!("CARGO_PKG_VERSION"));
    Ok(())
}

/// Install the stop-signal handlers before any worker starts.
/// Returns a watch channel receiver that flips to true on the first signal.
#[cfg(unix)]
fn setup_signal_handler() -> Result<watch::Receiver<bool>, SyncError> {
    use tokio::signal::unix::{signal, SignalKind};

    let (tx, rx) = watch::channel(false);

    let mut sigint =
        signal(SignalKind::interrupt()).map_err(|e| SyncError::Signal(e.to_string()))?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(|e| SyncError::Signal(e.to_string()))?;
    let mut sigquit = signal(SignalKind::quit()).map_err(|e| SyncError::Signal(e.to_string()))?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
            _ = sigquit.recv() => {}
        }
        eprintln!("\nStop signal received. Abandoning work at the next chunk boundary...");
        let _ = tx.send(true);
    });

    Ok(rx)
}

/// Windows fallback: Ctrl-C only.
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<watch::Receiver<bool>, SyncError> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nStop signal received. Abandoning work at the next chunk boundary...");
            let _ = tx.send(true);
        }
    });

    Ok(rx)
}
