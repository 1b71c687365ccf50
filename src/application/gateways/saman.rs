use crate::domain::gateway::{
    EndpointPair, GatewayDescriptor, GatewayProtocol, Mode, Operation, RedirectForm, Reversible,
    Verification,
};
use crate::domain::params::{FieldSource, ParameterBag, optional};
use crate::domain::ports::SoapTransportRef;
use crate::domain::soap::{SoapRequest, SoapValue};
use crate::domain::transaction::Transaction;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{debug, info, warn};

const NAMESPACE: &str = "urn:Foo";

const TOKEN_FIELDS: &[&str] = &["merchant_id", "order_id", "amount", "redirect_url"];

pub static DESCRIPTOR: GatewayDescriptor = GatewayDescriptor {
    name: "saman",
    wsdl: EndpointPair::new(
        "https://sep.shaparak.ir/payments/referencepayment.asmx?WSDL",
        "http://banktest.ir/gateway/saman/ws?wsdl",
    ),
    redirect: EndpointPair::new(
        "https://sep.shaparak.ir/Payment.aspx",
        "http://banktest.ir/gateway/saman/gate",
    ),
    supports_reverse: true,
    required: &[
        (Operation::RequestToken, TOKEN_FIELDS),
        (Operation::GenerateForm, TOKEN_FIELDS),
        (
            Operation::Verify,
            &["State", "RefNum", "ResNum", "merchant_id", "TRACENO"],
        ),
        (
            Operation::Reverse,
            &["RefNum", "merchant_id", "password", "amount"],
        ),
        (Operation::ReferenceId, &["RefNum"]),
    ],
};

/// The sandbox serves token requests from the same WSDL as everything else.
pub const TOKEN_WSDL: EndpointPair = EndpointPair::new(
    "https://sep.shaparak.ir/Payments/InitPayment.asmx?WSDL",
    "http://banktest.ir/gateway/saman/ws?wsdl",
);

/// Tokens are long strings; anything this short is a numeric error code.
const MIN_TOKEN_LEN: usize = 11;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SamanConfig {
    pub merchant_id: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub with_token: bool,
}

impl FieldSource for SamanConfig {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "merchant_id" => optional(&self.merchant_id),
            "password" => optional(&self.password),
            _ => None,
        }
    }
}

/// Direct-token gateway. Without `with_token` the form posts the payment
/// fields straight to the bank page.
pub struct Saman {
    config: SamanConfig,
    mode: Mode,
    wsdl: &'static str,
    token_wsdl: &'static str,
    endpoint: &'static str,
    transport: SoapTransportRef,
}

impl Saman {
    pub fn new(config: SamanConfig, mode: Mode, transport: SoapTransportRef) -> Self {
        Self {
            config,
            mode,
            wsdl: DESCRIPTOR.wsdl.resolve(mode),
            token_wsdl: TOKEN_WSDL.resolve(mode),
            endpoint: DESCRIPTOR.redirect.resolve(mode),
            transport,
        }
    }

    fn merchant_id(&self) -> Result<Cow<'_, str>> {
        self.config
            .field("merchant_id")
            .ok_or_else(|| GatewayError::MissingParameter("merchant_id".to_string()))
    }

    async fn call_text(&self, wsdl: &str, request: SoapRequest) -> Result<String> {
        let operation = request.operation.clone();
        let response = self.transport.call(wsdl, request).await?;
        let text = response.as_text().map(|t| t.trim().to_string()).ok_or_else(|| {
            GatewayError::Protocol(format!("`{operation}` returned a structured response"))
        })?;
        info!(operation = %operation, response = %text, "saman response");
        Ok(text)
    }
}

#[async_trait]
impl GatewayProtocol for Saman {
    fn descriptor(&self) -> &'static GatewayDescriptor {
        &DESCRIPTOR
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn credentials(&self) -> &dyn FieldSource {
        &self.config
    }

    fn issues_token(&self) -> bool {
        self.config.with_token
    }

    async fn request_token(&self, params: &ParameterBag, tx: &Transaction) -> Result<String> {
        let request = SoapRequest::new("RequestToken")
            .namespace(NAMESPACE)
            .param("TermID", self.merchant_id()?)
            .param("ResNum", params.value("order_id")?)
            .param("TotalAmount", params.amount()?.to_string());

        debug!(tx = tx.id, wsdl = self.token_wsdl, "RequestToken call");
        let response = self.call_text(self.token_wsdl, request).await?;
        if response.is_empty() {
            return Err(GatewayError::Protocol("empty token response".to_string()));
        }
        if response.len() >= MIN_TOKEN_LEN {
            Ok(response)
        } else {
            warn!(tx = tx.id, code = %response, "token request rejected");
            Err(GatewayError::business(response))
        }
    }

    fn redirect_form(&self, params: &ParameterBag, token: Option<&str>) -> Result<RedirectForm> {
        let form = RedirectForm::post(self.endpoint).field("RedirectURL", params.value("redirect_url")?);
        Ok(match token {
            Some(token) => form.field("Token", token),
            None => form
                .field("Amount", params.amount()?.to_string())
                .field("MID", self.merchant_id()?)
                .field("ResNum", params.value("order_id")?),
        })
    }

    fn can_continue_with_callback_parameters(&self, params: &ParameterBag) -> bool {
        params.field("RefNum").is_some() && params.field("State").as_deref() == Some("OK")
    }

    async fn verify(&self, params: &ParameterBag, tx: &Transaction) -> Result<Verification> {
        let state = params.value("State")?;
        if state != "OK" {
            return Err(GatewayError::business(state.into_owned()));
        }
        let ref_num = params.value("RefNum")?;
        let request = SoapRequest::new("verifyTransaction")
            .namespace(NAMESPACE)
            .param("RefNum", ref_num.as_ref())
            .param("MerchantID", self.merchant_id()?);

        debug!(tx = tx.id, ref_num = %ref_num, "verifyTransaction call");
        let response = self.call_text(self.wsdl, request).await?;
        match response.parse::<i64>() {
            Ok(paid) if u64::try_from(paid).ok() == Some(tx.amount.value()) => {
                Ok(Verification::with_reference(ref_num.into_owned())
                    .extra("trace_number", params.value("TRACENO")?))
            }
            _ => {
                warn!(tx = tx.id, response = %response, "verification rejected");
                Err(GatewayError::business(response))
            }
        }
    }

    fn as_reversible(&self) -> Option<&dyn Reversible> {
        Some(self)
    }
}

#[async_trait]
impl Reversible for Saman {
    async fn reverse(&self, params: &ParameterBag, tx: &Transaction) -> Result<()> {
        let password = self
            .config
            .field("password")
            .ok_or_else(|| GatewayError::MissingParameter("password".to_string()))?;
        let request = SoapRequest::new("reverseTransaction")
            .namespace(NAMESPACE)
            .param("RefNum", params.value("RefNum")?)
            .param("MID", self.merchant_id()?)
            .param("Password", password)
            .param("Amount", params.amount()?.to_string());

        debug!(tx = tx.id, "reverseTransaction call");
        let response = self.call_text(self.wsdl, request).await?;
        if response == "1" {
            Ok(())
        } else {
            warn!(tx = tx.id, response = %response, "reversal rejected");
            Err(GatewayError::business(response))
        }
    }
}
