use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use wastepay::application::wallet::WalletEngine;
use wastepay::config::EngineConfig;
use wastepay::domain::ports::WalletStoreRef;
use wastepay::infrastructure::in_memory::InMemoryWalletStore;
use wastepay::infrastructure::notifier::TracingNotifier;
use wastepay::interfaces::csv::ledger_reader::LedgerReader;
use wastepay::interfaces::csv::wallet_writer::WalletWriter;
use wastepay::telemetry::{self, LogFormat};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input ledger CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log output format
    #[arg(long, env = "WASTEPAY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(flatten)]
    config: EngineConfig,
}

fn wallet_store(db_path: Option<PathBuf>) -> Result<WalletStoreRef> {
    #[cfg(feature = "storage-rocksdb")]
    if let Some(db_path) = db_path {
        let store = wastepay::infrastructure::rocksdb::RocksDBStore::open(db_path)?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "storage-rocksdb"))]
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }

    Ok(Arc::new(InMemoryWalletStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(cli.log_format);

    let engine = WalletEngine::new(
        wallet_store(cli.db_path)?,
        Arc::new(TracingNotifier),
        cli.config,
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    for (line, op) in LedgerReader::new(file).operations().enumerate() {
        // header is line 1
        let line = line + 2;
        match op {
            Ok(op) => {
                if let Err(e) = op.apply(&engine).await {
                    eprintln!("Error processing row {line}: {e}");
                }
            }
            Err(e) => eprintln!("Error reading row {line}: {e}"),
        }
    }

    let wallets = engine.all_wallets().await?;
    let stdout = io::stdout();
    WalletWriter::new(stdout.lock()).write_wallets(wallets)?;

    Ok(())
}
