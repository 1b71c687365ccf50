use super::soap::{SoapRequest, SoapValue};
use super::transaction::{Phase, Transaction};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Persistence backend for transactions, keyed by transaction id.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn store(&self, tx: Transaction) -> Result<()>;
    async fn get(&self, tx_id: u64) -> Result<Option<Transaction>>;
}

pub type TransactionStoreBox = Box<dyn TransactionStore>;

/// The narrow view of the transaction record the lifecycle consults and mutates.
///
/// Atomicity of the underlying storage, and with it the at-most-once verify
/// guarantee across processes, belongs to the implementor.
#[async_trait]
pub trait TransactionRecord: Send + Sync {
    fn transaction(&self) -> &Transaction;

    fn check_for_request_token(&self) -> bool {
        self.transaction().check_for_request_token()
    }

    fn check_for_verify(&self) -> bool {
        self.transaction().check_for_verify()
    }

    fn check_for_reverse(&self) -> bool {
        self.transaction().check_for_reverse()
    }

    fn amount(&self) -> u64 {
        self.transaction().amount.value()
    }

    async fn set_reference_id(&mut self, id: &str, persist: bool) -> Result<()>;
    async fn set_extra(&mut self, key: &str, value: &str, persist: bool) -> Result<()>;
    async fn set_phase(&mut self, phase: Phase, persist: bool) -> Result<()>;
    /// Marks the transaction verified and persists it.
    async fn set_verified(&mut self) -> Result<()>;
    /// Marks the transaction reversed and persists it.
    async fn set_reversed(&mut self) -> Result<()>;
}

/// A single blocking-per-flow RPC round trip to a gateway service.
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn call(&self, wsdl: &str, request: SoapRequest) -> Result<SoapValue>;
}

pub type SoapTransportRef = Arc<dyn SoapTransport>;
