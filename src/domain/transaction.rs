use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A positive amount in the smallest currency unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(u64);

impl Amount {
    pub fn new(value: u64) -> Result<Self> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(GatewayError::InvalidParameter {
                field: "amount".to_string(),
                reason: "amount must be positive".to_string(),
            })
        }
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = GatewayError;

    fn try_from(value: u64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a payment attempt. Declaration order is the forward order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Created,
    TokenRequested,
    Redirected,
    CallbackReceived,
    Verified,
    Reversed,
    Failed,
}

impl Phase {
    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_advance_to(self, next: Phase) -> bool {
        match (self, next) {
            (Phase::Reversed | Phase::Failed, _) => false,
            (Phase::Verified, next) => next == Phase::Reversed,
            (_, Phase::Failed) => true,
            (_, Phase::Reversed) => false,
            (current, next) => next > current,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Reversed | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Created => "created",
            Phase::TokenRequested => "token_requested",
            Phase::Redirected => "redirected",
            Phase::CallbackReceived => "callback_received",
            Phase::Verified => "verified",
            Phase::Reversed => "reversed",
            Phase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One payment attempt, owned by the calling application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: u64,
    pub amount: Amount,
    pub order_id: String,
    pub redirect_url: String,
    pub gateway: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub phase: Phase,
    /// Gateway-specific auxiliary data such as trace numbers.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reversed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        id: u64,
        amount: Amount,
        order_id: impl Into<String>,
        redirect_url: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            id,
            amount,
            order_id: order_id.into(),
            redirect_url: redirect_url.into(),
            gateway: gateway.into(),
            description: None,
            reference_id: None,
            phase: Phase::Created,
            extra: BTreeMap::new(),
            verified_at: None,
            reversed_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn check_for_request_token(&self) -> bool {
        self.phase == Phase::Created && self.reference_id.is_none()
    }

    pub fn check_for_verify(&self) -> bool {
        matches!(self.phase, Phase::Redirected | Phase::CallbackReceived)
            && self.verified_at.is_none()
    }

    pub fn check_for_reverse(&self) -> bool {
        self.phase == Phase::Verified && self.reversed_at.is_none()
    }

    /// Moves the transaction forward, rejecting any backward step.
    pub fn advance(&mut self, next: Phase) -> Result<()> {
        if self.phase == next {
            return Ok(());
        }
        if !self.phase.can_advance_to(next) {
            return Err(GatewayError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Stores the gateway reference. Setting the same value twice is a no-op.
    pub fn assign_reference_id(&mut self, id: &str) -> Result<()> {
        match &self.reference_id {
            Some(existing) if existing == id => Ok(()),
            Some(existing) => Err(GatewayError::ReferenceAlreadySet(existing.clone())),
            None => {
                self.reference_id = Some(id.to_string());
                Ok(())
            }
        }
    }

    pub fn mark_verified(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.verified_at.is_some() {
            return Err(GatewayError::IllegalTransition {
                from: self.phase,
                to: Phase::Verified,
            });
        }
        self.advance(Phase::Verified)?;
        self.verified_at = Some(at);
        Ok(())
    }

    pub fn mark_reversed(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.advance(Phase::Reversed)?;
        self.reversed_at = Some(at);
        Ok(())
    }
}
