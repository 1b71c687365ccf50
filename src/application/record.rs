use crate::domain::ports::{TransactionRecord, TransactionStoreBox};
use crate::domain::transaction::{Phase, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;

/// A bare transaction is its own record; `persist` has nothing to write to.
#[async_trait]
impl TransactionRecord for Transaction {
    fn transaction(&self) -> &Transaction {
        self
    }

    async fn set_reference_id(&mut self, id: &str, _persist: bool) -> Result<()> {
        self.assign_reference_id(id)
    }

    async fn set_extra(&mut self, key: &str, value: &str, _persist: bool) -> Result<()> {
        self.extra.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_phase(&mut self, phase: Phase, _persist: bool) -> Result<()> {
        self.advance(phase)
    }

    async fn set_verified(&mut self) -> Result<()> {
        self.mark_verified(Utc::now())
    }

    async fn set_reversed(&mut self) -> Result<()> {
        self.mark_reversed(Utc::now())
    }
}

/// A record that writes through to a `TransactionStore` whenever asked to persist.
pub struct StoredTransaction {
    tx: Transaction,
    store: TransactionStoreBox,
}

impl StoredTransaction {
    /// Saves the transaction once so the store knows about it from the start.
    pub async fn create(tx: Transaction, store: TransactionStoreBox) -> Result<Self> {
        store.store(tx.clone()).await?;
        Ok(Self { tx, store })
    }

    /// Loads an existing transaction by id.
    pub async fn load(tx_id: u64, store: TransactionStoreBox) -> Result<Option<Self>> {
        Ok(store.get(tx_id).await?.map(|tx| Self { tx, store }))
    }

    pub fn into_inner(self) -> Transaction {
        self.tx
    }

    /// Applies `change` to a copy and keeps it only once the store accepted it.
    async fn commit<F>(&mut self, persist: bool, change: F) -> Result<()>
    where
        F: FnOnce(&mut Transaction) -> Result<()> + Send,
    {
        let mut next = self.tx.clone();
        change(&mut next)?;
        if persist {
            self.store.store(next.clone()).await?;
        }
        self.tx = next;
        Ok(())
    }
}

#[async_trait]
impl TransactionRecord for StoredTransaction {
    fn transaction(&self) -> &Transaction {
        &self.tx
    }

    async fn set_reference_id(&mut self, id: &str, persist: bool) -> Result<()> {
        self.commit(persist, |tx| tx.assign_reference_id(id)).await
    }

    async fn set_extra(&mut self, key: &str, value: &str, persist: bool) -> Result<()> {
        self.commit(persist, |tx| {
            tx.extra.insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn set_phase(&mut self, phase: Phase, persist: bool) -> Result<()> {
        self.commit(persist, |tx| tx.advance(phase)).await
    }

    async fn set_verified(&mut self) -> Result<()> {
        self.commit(true, |tx| tx.mark_verified(Utc::now())).await
    }

    async fn set_reversed(&mut self) -> Result<()> {
        self.commit(true, |tx| tx.mark_reversed(Utc::now())).await
    }
}
