//! Persistence layer for the Confidant mediator. Defines the two store
//! traits (finalized encrypted transactions and sender-only raw
//! transactions) with a sled-backed node database and an in-memory backend
//! used by tests and embedded deployments.
//!
//! Records are keyed by their content address, so identical payloads land on
//! the same row on every node and page order is stable (sled key order).

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;
use sled::{Db, Tree};

use confidant_types::{EncryptedRawTransaction, EncryptedTransaction, MessageHash};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("hash collision on {0}: existing record holds different bytes")]
    HashCollision(MessageHash),
}

/// CRUD plus paged scan over finalized encrypted transactions.
///
/// `save` is idempotent by hash: re-saving identical bytes is a no-op, while
/// a differing payload under the same hash is a broken content-addressing
/// invariant and fails with [`StoreError::HashCollision`]. The paged scan
/// guarantees only that records present when the scan started appear in some
/// page before it ends; callers tolerate duplicates across pages.
pub trait TransactionStore: Send + Sync {
    fn save(&self, tx: &EncryptedTransaction) -> Result<(), StoreError>;
    fn retrieve(&self, hash: &MessageHash) -> Result<Option<EncryptedTransaction>, StoreError>;
    fn delete(&self, hash: &MessageHash) -> Result<(), StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn retrieve_page(&self, offset: u64, limit: u64)
        -> Result<Vec<EncryptedTransaction>, StoreError>;
}

/// CRUD over pre-encrypted raw transactions, stored only on the originating
/// node. Records are never mutated once written.
pub trait RawTransactionStore: Send + Sync {
    fn save(&self, tx: &EncryptedRawTransaction) -> Result<(), StoreError>;
    fn retrieve(&self, hash: &MessageHash) -> Result<Option<EncryptedRawTransaction>, StoreError>;
}

/// Sled-backed implementation of both stores.
pub struct SledStore {
    db: Db,
    transactions: Tree,
    raw_transactions: Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let transactions = db.open_tree("transactions")?;
        let raw_transactions = db.open_tree("raw_transactions")?;
        tracing::info!(
            transactions = transactions.len(),
            raw_transactions = raw_transactions.len(),
            "opened transaction store"
        );
        Ok(Self {
            db,
            transactions,
            raw_transactions,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

impl TransactionStore for SledStore {
    fn save(&self, tx: &EncryptedTransaction) -> Result<(), StoreError> {
        match self.transactions.get(tx.hash.as_bytes())? {
            Some(existing) if existing.as_ref() == tx.encoded_payload.as_slice() => Ok(()),
            Some(_) => Err(StoreError::HashCollision(tx.hash.clone())),
            None => {
                self.transactions
                    .insert(tx.hash.as_bytes(), tx.encoded_payload.clone())?;
                Ok(())
            }
        }
    }

    fn retrieve(&self, hash: &MessageHash) -> Result<Option<EncryptedTransaction>, StoreError> {
        Ok(self.transactions.get(hash.as_bytes())?.map(|value| {
            EncryptedTransaction {
                hash: hash.clone(),
                encoded_payload: value.to_vec(),
            }
        }))
    }

    fn delete(&self, hash: &MessageHash) -> Result<(), StoreError> {
        self.transactions.remove(hash.as_bytes())?;
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.transactions.len() as u64)
    }

    fn retrieve_page(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<EncryptedTransaction>, StoreError> {
        let mut page = Vec::new();
        for entry in self
            .transactions
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
        {
            let (key, value) = entry?;
            page.push(EncryptedTransaction {
                hash: MessageHash::new(key.to_vec()),
                encoded_payload: value.to_vec(),
            });
        }
        Ok(page)
    }
}

impl RawTransactionStore for SledStore {
    fn save(&self, tx: &EncryptedRawTransaction) -> Result<(), StoreError> {
        let value = bincode::serialize(tx)?;
        match self.raw_transactions.get(tx.hash.as_bytes())? {
            Some(existing) if existing.as_ref() == value.as_slice() => Ok(()),
            Some(_) => Err(StoreError::HashCollision(tx.hash.clone())),
            None => {
                self.raw_transactions.insert(tx.hash.as_bytes(), value)?;
                Ok(())
            }
        }
    }

    fn retrieve(&self, hash: &MessageHash) -> Result<Option<EncryptedRawTransaction>, StoreError> {
        self.raw_transactions
            .get(hash.as_bytes())?
            .map(|value| bincode::deserialize(&value))
            .transpose()
            .map_err(Into::into)
    }
}

/// In-memory implementation of both stores, mirroring the sled semantics
/// (including key-ordered paging).
#[derive(Default)]
pub struct MemoryStore {
    transactions: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    raw_transactions: RwLock<BTreeMap<Vec<u8>, EncryptedRawTransaction>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TransactionStore for MemoryStore {
    fn save(&self, tx: &EncryptedTransaction) -> Result<(), StoreError> {
        let mut transactions = self.transactions.write();
        match transactions.get(tx.hash.as_bytes()) {
            Some(existing) if *existing == tx.encoded_payload => Ok(()),
            Some(_) => Err(StoreError::HashCollision(tx.hash.clone())),
            None => {
                transactions.insert(tx.hash.as_bytes().to_vec(), tx.encoded_payload.clone());
                Ok(())
            }
        }
    }

    fn retrieve(&self, hash: &MessageHash) -> Result<Option<EncryptedTransaction>, StoreError> {
        Ok(self
            .transactions
            .read()
            .get(hash.as_bytes())
            .map(|value| EncryptedTransaction {
                hash: hash.clone(),
                encoded_payload: value.clone(),
            }))
    }

    fn delete(&self, hash: &MessageHash) -> Result<(), StoreError> {
        self.transactions.write().remove(hash.as_bytes());
        Ok(())
    }

    fn count(&self) -> Result<u64, StoreError> {
        Ok(self.transactions.read().len() as u64)
    }

    fn retrieve_page(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<EncryptedTransaction>, StoreError> {
        Ok(self
            .transactions
            .read()
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(key, value)| EncryptedTransaction {
                hash: MessageHash::new(key.clone()),
                encoded_payload: value.clone(),
            })
            .collect())
    }
}

impl RawTransactionStore for MemoryStore {
    fn save(&self, tx: &EncryptedRawTransaction) -> Result<(), StoreError> {
        let mut raw_transactions = self.raw_transactions.write();
        match raw_transactions.get(tx.hash.as_bytes()) {
            Some(existing) if existing == tx => Ok(()),
            Some(_) => Err(StoreError::HashCollision(tx.hash.clone())),
            None => {
                raw_transactions.insert(tx.hash.as_bytes().to_vec(), tx.clone());
                Ok(())
            }
        }
    }

    fn retrieve(&self, hash: &MessageHash) -> Result<Option<EncryptedRawTransaction>, StoreError> {
        Ok(self.raw_transactions.read().get(hash.as_bytes()).cloned())
    }
}
