use crate::domain::gateway::{GatewayProtocol, Operation, RedirectForm};
use crate::domain::params::{FieldSource, ParameterBag, require};
use crate::domain::ports::TransactionRecord;
use crate::domain::transaction::{Phase, Transaction};
use crate::error::{GatewayError, Result};
use tracing::{info, warn};

/// Extra key holding a verify-phase reference that differs from the token.
pub const VERIFY_REFERENCE_KEY: &str = "verify_reference_id";

/// One lifecycle pass of one transaction through one gateway.
///
/// The flow owns the parameter bag and borrows the record; it enforces the
/// same gating and required-field rules whatever gateway sits underneath.
/// Every remote call happens at most once per operation.
pub struct PaymentFlow<'a> {
    gateway: &'a dyn GatewayProtocol,
    record: &'a mut dyn TransactionRecord,
    params: ParameterBag,
}

impl<'a> PaymentFlow<'a> {
    /// Starts a flow with parameters seeded from the transaction itself.
    pub fn new(gateway: &'a dyn GatewayProtocol, record: &'a mut dyn TransactionRecord) -> Self {
        let params = ParameterBag::for_transaction(record.transaction());
        Self::with_params(gateway, record, params)
    }

    pub fn with_params(
        gateway: &'a dyn GatewayProtocol,
        record: &'a mut dyn TransactionRecord,
        params: ParameterBag,
    ) -> Self {
        Self {
            gateway,
            record,
            params,
        }
    }

    pub fn params(&self) -> &ParameterBag {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut ParameterBag {
        &mut self.params
    }

    pub fn transaction(&self) -> &Transaction {
        self.record.transaction()
    }

    fn phase(&self) -> Phase {
        self.record.transaction().phase
    }

    fn invalid_phase(&self, operation: Operation) -> GatewayError {
        GatewayError::InvalidPhase {
            operation,
            phase: self.phase(),
        }
    }

    fn require(&self, operation: Operation) -> Result<()> {
        let sources: [&dyn FieldSource; 2] = [self.gateway.credentials(), &self.params];
        require(
            &sources,
            self.gateway.descriptor().required_fields(operation),
        )
    }

    pub async fn request_token(&mut self) -> Result<String> {
        if !self.record.check_for_request_token() {
            return Err(self.invalid_phase(Operation::RequestToken));
        }
        self.require(Operation::RequestToken)?;

        let gateway = self.gateway.descriptor().name;
        let token = self
            .gateway
            .request_token(&self.params, self.record.transaction())
            .await?;

        self.record.set_reference_id(&token, false).await?;
        self.record.set_phase(Phase::TokenRequested, true).await?;
        info!(gateway, tx = self.transaction().id, "token issued");
        Ok(token)
    }

    /// Redirect instructions for the end user. Token-issuing gateways need a
    /// successful `request_token` first; the others redirect straight from `Created`.
    pub async fn generate_form(&mut self) -> Result<RedirectForm> {
        let token = if self.gateway.issues_token() {
            let tx = self.record.transaction();
            match (&tx.reference_id, tx.phase) {
                (Some(token), Phase::TokenRequested) => Some(token.clone()),
                _ => return Err(self.invalid_phase(Operation::GenerateForm)),
            }
        } else {
            if self.phase() != Phase::Created {
                return Err(self.invalid_phase(Operation::GenerateForm));
            }
            None
        };
        self.require(Operation::GenerateForm)?;

        let form = self.gateway.redirect_form(&self.params, token.as_deref())?;
        self.record.set_phase(Phase::Redirected, true).await?;
        Ok(form)
    }

    /// Requests a token when the gateway needs one, then builds the redirect.
    pub async fn pay(&mut self) -> Result<RedirectForm> {
        if self.gateway.issues_token() {
            self.request_token().await?;
        }
        self.generate_form().await
    }

    /// Records the fields the gateway posted back to the merchant.
    pub async fn receive_callback<I, K, V>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        if !matches!(self.phase(), Phase::Redirected | Phase::CallbackReceived) {
            return Err(self.invalid_phase(Operation::Callback));
        }
        self.params.merge(fields);
        self.record.set_phase(Phase::CallbackReceived, true).await
    }

    pub fn can_continue_with_callback_parameters(&self) -> bool {
        self.gateway
            .can_continue_with_callback_parameters(&self.params)
    }

    pub async fn verify(&mut self) -> Result<bool> {
        if !self.record.check_for_verify() {
            return Err(self.invalid_phase(Operation::Verify));
        }
        self.require(Operation::Verify)?;

        let gateway = self.gateway.descriptor().name;
        let verification = match self
            .gateway
            .verify(&self.params, self.record.transaction())
            .await
        {
            Ok(verification) => verification,
            Err(err) => {
                warn!(gateway, tx = self.transaction().id, error = %err, "verification failed");
                return Err(err);
            }
        };

        for (key, value) in &verification.extras {
            self.record.set_extra(key, value, false).await?;
        }
        if let Some(reference) = verification.reference_id.as_deref() {
            match self.record.transaction().reference_id.clone() {
                None => self.record.set_reference_id(reference, false).await?,
                Some(existing) if existing != reference => {
                    self.record
                        .set_extra(VERIFY_REFERENCE_KEY, reference, false)
                        .await?
                }
                Some(_) => {}
            }
        }
        self.record.set_verified().await?;

        info!(
            gateway,
            tx = self.transaction().id,
            already_verified = verification.already_verified,
            "payment verified"
        );
        Ok(true)
    }

    pub async fn reverse(&mut self) -> Result<bool> {
        let descriptor = self.gateway.descriptor();
        let reversible = match self.gateway.as_reversible() {
            Some(reversible) if descriptor.supports_reverse => reversible,
            _ => return Err(GatewayError::CouldNotReverse),
        };
        if !self.record.check_for_reverse() {
            return Err(GatewayError::CouldNotReverse);
        }
        self.require(Operation::Reverse)?;

        reversible
            .reverse(&self.params, self.record.transaction())
            .await?;
        self.record.set_reversed().await?;
        info!(gateway = descriptor.name, tx = self.transaction().id, "payment reversed");
        Ok(true)
    }

    /// The gateway's reference from the callback, else the stored reference id.
    pub fn gateway_reference_id(&self) -> Result<String> {
        let fields = self
            .gateway
            .descriptor()
            .required_fields(Operation::ReferenceId);
        if let Some(value) = fields.iter().find_map(|field| self.params.field(field)) {
            return Ok(value.into_owned());
        }
        let field = fields.first().copied().unwrap_or("reference_id");
        self.record
            .transaction()
            .reference_id
            .clone()
            .ok_or_else(|| GatewayError::MissingParameter(field.to_string()))
    }

    /// Caller-driven terminal failure, e.g. after a business rejection.
    pub async fn mark_failed(&mut self) -> Result<()> {
        self.record.set_phase(Phase::Failed, true).await
    }
}
