use crate::domain::gateway::RedirectForm;
use crate::domain::transaction::Transaction;
use crate::error::{GatewayError, Result};
use serde::Serialize;
use std::io::{Read, Write};

/// Reads one transaction from a JSON document.
pub fn read_transaction<R: Read>(source: R) -> Result<Transaction> {
    serde_json::from_reader(source)
        .map_err(|e| GatewayError::Store(format!("invalid transaction document: {e}")))
}

/// Output of `pay`: where to send the user, plus the record to keep for `verify`.
#[derive(Debug, Serialize)]
pub struct PaymentOutput<'a> {
    pub form: &'a RedirectForm,
    pub transaction: &'a Transaction,
}

/// Pretty-prints any serializable value followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut sink: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut sink, value)
        .map_err(|e| GatewayError::Store(format!("could not encode JSON: {e}")))?;
    writeln!(sink)?;
    Ok(())
}
