use crate::domain::gateway::{
    EndpointPair, GatewayDescriptor, GatewayProtocol, Mode, Operation, RedirectForm, Verification,
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

const NAMESPACE: &str = "http://zarinpal.com/";

const AUTHORITY_PLACEHOLDER: &str = "{authority}";

/// Status of an accepted request or verification.
const STATUS_OK: &str = "100";

pub static DESCRIPTOR: GatewayDescriptor = GatewayDescriptor {
    name: "zarinpal",
    wsdl: EndpointPair::new(
        "https://www.zarinpal.com/pg/services/WebGate/wsdl",
        "https://sandbox.zarinpal.com/pg/services/WebGate/wsdl",
    ),
    redirect: EndpointPair::new(
        "https://www.zarinpal.com/pg/StartPay/{authority}",
        "https://sandbox.zarinpal.com/pg/StartPay/{authority}",
    ),
    supports_reverse: false,
    required: &[
        (
            Operation::RequestToken,
            &["merchant_id", "amount", "redirect_url"],
        ),
        (Operation::Verify, &["merchant_id", "amount", "Authority"]),
        (Operation::ReferenceId, &["Authority"]),
    ],
};

/// Which payment page the user lands on. The sandbox only has the normal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZarinpalGate {
    #[default]
    Normal,
    ZarinGate,
    MobileGate,
}

impl ZarinpalGate {
    fn suffix(self) -> &'static str {
        match self {
            ZarinpalGate::Normal => "",
            ZarinpalGate::ZarinGate => "/ZarinGate",
            ZarinpalGate::MobileGate => "/MobileGate",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZarinpalConfig {
    pub merchant_id: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    /// Used when the transaction carries no description of its own.
    pub description: Option<String>,
    #[serde(default)]
    pub gate: ZarinpalGate,
}

impl FieldSource for ZarinpalConfig {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "merchant_id" => optional(&self.merchant_id),
            "email" => optional(&self.email),
            "mobile" => optional(&self.mobile),
            _ => None,
        }
    }
}

pub struct Zarinpal {
    config: ZarinpalConfig,
    mode: Mode,
    wsdl: &'static str,
    redirect_template: String,
    transport: SoapTransportRef,
}

impl Zarinpal {
    pub fn new(config: ZarinpalConfig, mode: Mode, transport: SoapTransportRef) -> Self {
        let mut redirect_template = DESCRIPTOR.redirect.resolve(mode).to_string();
        if mode == Mode::Production {
            redirect_template.push_str(config.gate.suffix());
        }
        Self {
            config,
            mode,
            wsdl: DESCRIPTOR.wsdl.resolve(mode),
            redirect_template,
            transport,
        }
    }

    fn merchant_id(&self) -> Result<Cow<'_, str>> {
        self.config
            .field("merchant_id")
            .ok_or_else(|| GatewayError::MissingParameter("merchant_id".to_string()))
    }

    fn status(response: &SoapValue) -> Result<&str> {
        response
            .field_text("Status")
            .map(str::trim)
            .ok_or_else(|| GatewayError::Protocol("response has no `Status`".to_string()))
    }
}

#[async_trait]
impl GatewayProtocol for Zarinpal {
    fn descriptor(&self) -> &'static GatewayDescriptor {
        &DESCRIPTOR
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn credentials(&self) -> &dyn FieldSource {
        &self.config
    }

    async fn request_token(&self, params: &ParameterBag, tx: &Transaction) -> Result<String> {
        let description = params
            .field("description")
            .or_else(|| optional(&self.config.description))
            .unwrap_or_default();
        let request = SoapRequest::new("PaymentRequest")
            .namespace(NAMESPACE)
            .param("MerchantID", self.merchant_id()?)
            .param("Amount", params.amount()?.to_string())
            .param("Description", description)
            .param("Email", self.config.field("email").unwrap_or_default())
            .param("Mobile", self.config.field("mobile").unwrap_or_default())
            .param("CallbackURL", params.value("redirect_url")?);

        debug!(tx = tx.id, wsdl = self.wsdl, "PaymentRequest call");
        let response = self.transport.call(self.wsdl, request).await?;
        let status = Self::status(&response)?;
        info!(tx = tx.id, status, "PaymentRequest response");

        if status != STATUS_OK {
            warn!(tx = tx.id, status, "payment request rejected");
            return Err(GatewayError::business(status));
        }
        match response.field_text("Authority").map(str::trim) {
            Some(authority) if !authority.is_empty() => Ok(authority.to_string()),
            _ => Err(GatewayError::Protocol("accepted request has no `Authority`".to_string())),
        }
    }

    fn redirect_form(&self, _params: &ParameterBag, token: Option<&str>) -> Result<RedirectForm> {
        let authority = token.ok_or_else(|| GatewayError::MissingParameter("Authority".to_string()))?;
        Ok(RedirectForm::get(
            self.redirect_template.replace(AUTHORITY_PLACEHOLDER, authority),
        ))
    }

    fn can_continue_with_callback_parameters(&self, params: &ParameterBag) -> bool {
        params.field("Status").as_deref() == Some("OK")
    }

    async fn verify(&self, params: &ParameterBag, tx: &Transaction) -> Result<Verification> {
        let request = SoapRequest::new("PaymentVerification")
            .namespace(NAMESPACE)
            .param("MerchantID", self.merchant_id()?)
            .param("Authority", params.value("Authority")?)
            .param("Amount", params.amount()?.to_string());

        debug!(tx = tx.id, wsdl = self.wsdl, "PaymentVerification call");
        let response = self.transport.call(self.wsdl, request).await?;
        let status = Self::status(&response)?;
        let ref_id = response
            .field_text("RefID")
            .map(str::trim)
            .ok_or_else(|| GatewayError::Protocol("response has no `RefID`".to_string()))?;
        info!(tx = tx.id, status, ref_id, "PaymentVerification response");

        if status == STATUS_OK {
            Ok(Verification::with_reference(ref_id))
        } else {
            warn!(tx = tx.id, status, "verification rejected");
            Err(GatewayError::business(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gateway::FormMethod;
    use crate::infrastructure::unreachable::Unreachable;

    fn zarinpal(mode: Mode, gate: ZarinpalGate) -> Zarinpal {
        let config = ZarinpalConfig {
            merchant_id: Some("xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx".to_string()),
            gate,
            ..Default::default()
        };
        Zarinpal::new(config, mode, Unreachable::transport())
    }

    #[test]
    fn test_gate_suffix_in_production() {
        let form = zarinpal(Mode::Production, ZarinpalGate::ZarinGate)
            .redirect_form(&ParameterBag::new(), Some("A0001"))
            .unwrap();
        assert_eq!(form.method, FormMethod::Get);
        assert_eq!(form.endpoint, "https://www.zarinpal.com/pg/StartPay/A0001/ZarinGate");
        assert!(form.fields.is_empty());
    }

    #[test]
    fn test_sandbox_ignores_gate_kind() {
        let form = zarinpal(Mode::Sandbox, ZarinpalGate::MobileGate)
            .redirect_form(&ParameterBag::new(), Some("A0002"))
            .unwrap();
        assert_eq!(form.endpoint, "https://sandbox.zarinpal.com/pg/StartPay/A0002");
    }

    #[test]
    fn test_gate_kind_from_config_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            gate: ZarinpalGate,
        }
        let parsed: Wrapper = toml::from_str("gate = \"mobile-gate\"").unwrap();
        assert_eq!(parsed.gate, ZarinpalGate::MobileGate);
    }

    #[test]
    fn test_callback_status() {
        let gateway = zarinpal(Mode::Sandbox, ZarinpalGate::Normal);
        assert!(gateway.can_continue_with_callback_parameters(&ParameterBag::new().with("Status", "OK")));
        assert!(!gateway.can_continue_with_callback_parameters(&ParameterBag::new().with("Status", "NOK")));
    }
}
