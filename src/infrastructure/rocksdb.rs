use crate::domain::job::{Job, JobFilter, JobKind, JobRef};
use crate::domain::payment::PaymentTransaction;
use crate::domain::ports::{JobStore, Mutation, PairMutation, PaymentStore, WalletStore};
use crate::domain::wallet::Wallet;
use crate::error::{LogisticsError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for collection requests, keyed by id.
pub const CF_COLLECTIONS: &str = "collections";
/// Column Family for orders, keyed by id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for payment transactions, keyed by id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family mapping a job reference to the id of its payment.
pub const CF_PAYMENTS_BY_JOB: &str = "payments_by_job";
/// Column Family for wallets, keyed by owner.
pub const CF_WALLETS: &str = "wallets";

const COLUMN_FAMILIES: [&str; 5] = [
    CF_COLLECTIONS,
    CF_ORDERS,
    CF_PAYMENTS,
    CF_PAYMENTS_BY_JOB,
    CF_WALLETS,
];

fn job_cf(kind: JobKind) -> &'static str {
    match kind {
        JobKind::Collection => CF_COLLECTIONS,
        JobKind::Order => CF_ORDERS,
    }
}

/// A persistent store implementation using RocksDB.
///
/// Documents are stored as JSON, one Column Family per entity. Reads go
/// straight to the database. Conditional writes are serialized through a
/// process-wide lock and committed with a single `WriteBatch`, so a
/// read-modify-write never interleaves with another and a two-wallet transfer
/// lands atomically.
///
/// `Clone` shares the underlying `Arc<DB>` and the write lock.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at `path`, creating any missing
    /// column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LogisticsError::Storage(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(&cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut docs = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_key, value) = item?;
            docs.push(serde_json::from_slice(&value)?);
        }
        Ok(docs)
    }

    fn put<T: Serialize>(&self, batch: &mut WriteBatch, cf_name: &str, key: &[u8], doc: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(&cf, key, serde_json::to_vec(doc)?);
        Ok(())
    }

    /// Runs `mutation` on the stored document and writes it back on success.
    /// The caller must hold `write_lock`.
    fn apply<T: Serialize + DeserializeOwned>(
        &self,
        cf_name: &str,
        key: Uuid,
        entity: &'static str,
        mutation: Mutation<T>,
    ) -> Result<T> {
        let mut doc: T = self
            .read(cf_name, key.as_bytes())?
            .ok_or_else(|| LogisticsError::not_found(entity, key))?;
        mutation(&mut doc)?;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, cf_name, key.as_bytes(), &doc)?;
        self.db.write(batch)?;
        Ok(doc)
    }
}

fn job_key(job: &JobRef) -> Vec<u8> {
    job.to_string().into_bytes()
}

#[async_trait]
impl<J: Job> JobStore<J> for RocksDBStore {
    async fn insert(&self, job: J) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, job_cf(J::KIND), job.id().as_bytes(), &job)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<J>> {
        self.read(job_cf(J::KIND), id.as_bytes())
    }

    async fn find(&self, filter: &JobFilter) -> Result<Vec<J>> {
        let mut found: Vec<J> = self
            .scan::<J>(job_cf(J::KIND))?
            .into_iter()
            .filter(|job| filter.matches(job))
            .collect();
        found.sort_by_key(|job| std::cmp::Reverse(job.created_at()));
        Ok(found)
    }

    async fn update_atomic(&self, id: Uuid, mutation: Mutation<J>) -> Result<J> {
        let _guard = self.write_lock.lock().await;
        self.apply(job_cf(J::KIND), id, J::KIND.label(), mutation)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert_for_job(&self, tx: PaymentTransaction) -> Result<(PaymentTransaction, bool)> {
        let _guard = self.write_lock.lock().await;
        let index_key = job_key(&tx.job);
        if let Some(id) = self.read::<Uuid>(CF_PAYMENTS_BY_JOB, &index_key)?
            && let Some(existing) = self.read(CF_PAYMENTS, id.as_bytes())?
        {
            return Ok((existing, false));
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_PAYMENTS, tx.id.as_bytes(), &tx)?;
        self.put(&mut batch, CF_PAYMENTS_BY_JOB, &index_key, &tx.id)?;
        self.db.write(batch)?;
        Ok((tx, true))
    }

    async fn get(&self, id: Uuid) -> Result<Option<PaymentTransaction>> {
        self.read(CF_PAYMENTS, id.as_bytes())
    }

    async fn find_for_job(&self, job: JobRef) -> Result<Option<PaymentTransaction>> {
        match self.read::<Uuid>(CF_PAYMENTS_BY_JOB, &job_key(&job))? {
            Some(id) => self.read(CF_PAYMENTS, id.as_bytes()),
            None => Ok(None),
        }
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let mut found: Vec<PaymentTransaction> = self
            .scan::<PaymentTransaction>(CF_PAYMENTS)?
            .into_iter()
            .filter(|tx| tx.involves(user_id))
            .collect();
        found.sort_by_key(|tx| std::cmp::Reverse(tx.created_at));
        Ok(found)
    }

    async fn update_atomic(
        &self,
        id: Uuid,
        mutation: Mutation<PaymentTransaction>,
    ) -> Result<PaymentTransaction> {
        let _guard = self.write_lock.lock().await;
        self.apply(CF_PAYMENTS, id, "Transaction", mutation)
    }
}

#[async_trait]
impl WalletStore for RocksDBStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        self.read(CF_WALLETS, user_id.as_bytes())
    }

    async fn get_or_insert(&self, wallet: Wallet) -> Result<Wallet> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.read(CF_WALLETS, wallet.user_id.as_bytes())? {
            return Ok(existing);
        }
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_WALLETS, wallet.user_id.as_bytes(), &wallet)?;
        self.db.write(batch)?;
        Ok(wallet)
    }

    async fn get_all(&self) -> Result<Vec<Wallet>> {
        self.scan(CF_WALLETS)
    }

    async fn update_atomic(&self, user_id: Uuid, mutation: Mutation<Wallet>) -> Result<Wallet> {
        let _guard = self.write_lock.lock().await;
        self.apply(CF_WALLETS, user_id, "Wallet", mutation)
    }

    async fn update_pair_atomic(
        &self,
        first: Uuid,
        second: Uuid,
        mutation: PairMutation<Wallet>,
    ) -> Result<(Wallet, Wallet)> {
        if first == second {
            return Err(LogisticsError::ValidationError(
                "a pair update needs two distinct wallets".to_string(),
            ));
        }
        let _guard = self.write_lock.lock().await;
        let mut a: Wallet = self
            .read(CF_WALLETS, first.as_bytes())?
            .ok_or_else(|| LogisticsError::not_found("Wallet", first))?;
        let mut b: Wallet = self
            .read(CF_WALLETS, second.as_bytes())?
            .ok_or_else(|| LogisticsError::not_found("Wallet", second))?;
        mutation(&mut a, &mut b)?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_WALLETS, first.as_bytes(), &a)?;
        self.put(&mut batch, CF_WALLETS, second.as_bytes(), &b)?;
        self.db.write(batch)?;
        Ok((a, b))
    }
}
