use crate::domain::wallet::{Wallet, WalletStatus};
use crate::error::Result;
use serde::Serialize;
use std::io::Write;
use uuid::Uuid;

#[derive(Serialize)]
struct WalletRow<'a> {
    user: Uuid,
    balance: String,
    currency: &'a str,
    status: WalletStatus,
    entries: usize,
}

/// Writes wallet summaries as CSV, one row per wallet.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes `wallets` ordered by owner, so output is stable across runs.
    pub fn write_wallets(&mut self, mut wallets: Vec<Wallet>) -> Result<()> {
        wallets.sort_by_key(|w| w.user_id);
        if wallets.is_empty() {
            self.writer
                .write_record(["user", "balance", "currency", "status", "entries"])?;
        }
        for wallet in &wallets {
            self.writer.serialize(WalletRow {
                user: wallet.user_id,
                balance: wallet.balance.to_string(),
                currency: &wallet.currency,
                status: wallet.status,
                entries: wallet.transactions.len(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
