use super::transaction::Transaction;
use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// Resolves a declared field name to its current value. Empty values count as absent.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<Cow<'_, str>>;
}

/// Per-flow operation parameters: the common payment fields plus whatever
/// the gateway posts back on its callback.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterBag {
    pub amount: Option<u64>,
    pub order_id: Option<String>,
    pub redirect_url: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds amount, order id, redirect URL and description from the transaction.
    pub fn for_transaction(tx: &Transaction) -> Self {
        Self {
            amount: Some(tx.amount.value()),
            order_id: Some(tx.order_id.clone()),
            redirect_url: Some(tx.redirect_url.clone()),
            description: tx.description.clone(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extra.insert(key.into(), value.into());
    }

    pub fn merge<I, K, V>(&mut self, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in fields {
            self.set(key, value);
        }
    }

    /// Returns the field or a `MissingParameter` error naming it.
    pub fn value(&self, name: &str) -> Result<Cow<'_, str>> {
        self.field(name)
            .ok_or_else(|| GatewayError::MissingParameter(name.to_string()))
    }

    pub fn amount(&self) -> Result<u64> {
        self.amount
            .filter(|amount| *amount > 0)
            .ok_or_else(|| GatewayError::MissingParameter("amount".to_string()))
    }
}

impl FieldSource for ParameterBag {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        let value = match name {
            "amount" => self.amount.filter(|a| *a > 0).map(|a| Cow::Owned(a.to_string())),
            "order_id" => self.order_id.as_deref().map(Cow::Borrowed),
            "redirect_url" => self.redirect_url.as_deref().map(Cow::Borrowed),
            "description" => self.description.as_deref().map(Cow::Borrowed),
            other => self.extra.get(other).map(|v| Cow::Borrowed(v.as_str())),
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Fails on the first field that none of the sources can resolve.
pub fn require(sources: &[&dyn FieldSource], fields: &[&str]) -> Result<()> {
    for name in fields {
        if !sources.iter().any(|source| source.field(name).is_some()) {
            return Err(GatewayError::MissingParameter((*name).to_string()));
        }
    }
    Ok(())
}

/// Helper for credential structs: resolves an optional string, treating "" as absent.
pub fn optional(value: &Option<String>) -> Option<Cow<'_, str>> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(Cow::Borrowed)
}
