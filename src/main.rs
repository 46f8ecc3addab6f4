use billsplit::application::engine::BillEngine;
use billsplit::domain::ports::UserStoreHandle;
use billsplit::infrastructure::identity::SessionIdentityProvider;
use billsplit::infrastructure::in_memory::{
    InMemoryBillStore, InMemoryLinkStore, InMemoryUserStore,
};
#[cfg(feature = "storage-rocksdb")]
use billsplit::infrastructure::rocksdb::RocksDBStore;
use billsplit::interfaces::csv::bill_writer::{BillWriter, report};
use billsplit::interfaces::csv::request_reader::RequestReader;
use billsplit::interfaces::csv::runner::ScriptRunner;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Request script CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "BILLSPLIT_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, env = "BILLSPLIT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .init();
}

fn in_memory_engine() -> BillEngine {
    let users: UserStoreHandle = Arc::new(InMemoryUserStore::new());
    BillEngine::new(
        Box::new(InMemoryBillStore::new()),
        users.clone(),
        Box::new(InMemoryLinkStore::new()),
        Box::new(SessionIdentityProvider::new(users)),
    )
}

fn build_engine(db_path: Option<PathBuf>) -> Result<BillEngine> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        // Use persistent storage (RocksDB)
        let store = RocksDBStore::open(&db_path).into_diagnostic()?;
        tracing::info!(path = %db_path.display(), "using RocksDB storage");
        let users: UserStoreHandle = Arc::new(store.clone());
        return Ok(BillEngine::new(
            Box::new(store.clone()),
            users.clone(),
            Box::new(store),
            Box::new(SessionIdentityProvider::new(users)),
        ));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }

    Ok(in_memory_engine())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let engine = build_engine(cli.db_path)?;

    // Replay the request script
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = RequestReader::new(file);
    let mut runner = ScriptRunner::new(&engine);
    for (index, request) in reader.requests().enumerate() {
        let row = index + 1;
        match request {
            Ok(request) => match runner.run(request).await {
                Ok(_) => {}
                Err(e) if e.is_rejection() => warn!(row, error = %e, "request rejected"),
                Err(e) => error!(row, error = %e, "request failed"),
            },
            Err(e) => error!(row, error = %e, "error reading request"),
        }
    }

    // Output final state
    let rows = report(&engine).await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BillWriter::new(stdout.lock());
    writer.write_bills(rows).into_diagnostic()?;

    Ok(())
}
