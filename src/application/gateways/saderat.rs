use crate::domain::gateway::{
    EndpointPair, GatewayDescriptor, GatewayProtocol, Mode, Operation, RedirectForm, SignAction,
    SignSource, Verification,
};
use crate::domain::params::{FieldSource, ParameterBag};
use crate::domain::ports::SoapTransportRef;
use crate::domain::soap::{SoapRequest, SoapValue};
use crate::domain::transaction::Transaction;
use crate::error::{GatewayError, Result};
use crate::infrastructure::crypto::{CryptoError, RsaKeyPair};
use async_trait::async_trait;
use serde::Deserialize;
use std::borrow::Cow;
use std::path::PathBuf;
use tracing::{debug, info, warn};

const NAMESPACE: &str = "http://interfaces.core.sw.bps.com/";

pub static DESCRIPTOR: GatewayDescriptor = GatewayDescriptor {
    name: "saderat",
    wsdl: EndpointPair::new(
        "https://mabna.shaparak.ir/PayloadTokenService?wsdl",
        "http://mabna.shaparak.ir/PayloadTokenService?wsdl",
    ),
    redirect: EndpointPair::new("https://mabna.shaparak.ir", "http://mabna.shaparak.ir"),
    supports_reverse: false,
    required: &[
        (
            Operation::RequestToken,
            &["MID", "TID", "amount", "order_id", "redirect_url"],
        ),
        (
            Operation::Verify,
            &["MID", "TID", "RESCODE", "TRN", "CRN", "AMOUNT", "SIGNATURE"],
        ),
        (Operation::ReferenceId, &["TRN"]),
    ],
};

pub const VERIFY_WSDL: EndpointPair = EndpointPair::new(
    "https://mabna.shaparak.ir/TransactionReference/TransactionReference?wsdl",
    "http://mabna.shaparak.ir/TransactionReference/TransactionReference?wsdl",
);

/// RESCODE of a confirmation the gateway already accepted earlier.
const ALREADY_VERIFIED: i64 = 101;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaderatConfig {
    pub merchant_id: Option<String>,
    pub terminal_id: Option<String>,
    /// Gateway public key, PEM.
    pub public_key_path: PathBuf,
    /// Merchant private key, PEM.
    pub private_key_path: PathBuf,
}

impl FieldSource for SaderatConfig {
    fn field(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            "MID" | "merchant_id" => crate::domain::params::optional(&self.merchant_id),
            "TID" | "terminal_id" => crate::domain::params::optional(&self.terminal_id),
            _ => None,
        }
    }
}

/// Asymmetric-signature gateway: every sensitive field is RSA-encrypted and
/// each call is signed with the merchant key.
pub struct Saderat {
    config: SaderatConfig,
    keys: RsaKeyPair,
    mode: Mode,
    token_wsdl: &'static str,
    verify_wsdl: &'static str,
    endpoint: &'static str,
    transport: SoapTransportRef,
}

impl Saderat {
    /// Loads both keys. A missing or unparsable key fails construction.
    pub fn new(config: SaderatConfig, mode: Mode, transport: SoapTransportRef) -> Result<Self> {
        let keys = RsaKeyPair::load(&config.public_key_path, &config.private_key_path)?;
        Ok(Self::with_keys(config, keys, mode, transport))
    }

    pub fn with_keys(
        config: SaderatConfig,
        keys: RsaKeyPair,
        mode: Mode,
        transport: SoapTransportRef,
    ) -> Self {
        Self {
            config,
            keys,
            mode,
            token_wsdl: DESCRIPTOR.wsdl.resolve(mode),
            verify_wsdl: VERIFY_WSDL.resolve(mode),
            endpoint: DESCRIPTOR.redirect.resolve(mode),
            transport,
        }
    }

    fn credential(&self, name: &str) -> Result<Cow<'_, str>> {
        self.config
            .field(name)
            .ok_or_else(|| GatewayError::MissingParameter(name.to_string()))
    }

    fn encrypt(&self, plaintext: &str) -> Result<SoapValue> {
        Ok(SoapValue::text(self.keys.encrypt(plaintext)?))
    }

    fn signature(&self, action: SignAction, params: &ParameterBag) -> Result<SoapValue> {
        let source = self.sign_source(action, params)?;
        Ok(SoapValue::text(self.keys.sign(&source)?))
    }

    fn accept_confirmation(&self, result: &SoapValue) -> Result<Verification> {
        let field = |name: &str| {
            result
                .field_text(name)
                .ok_or_else(|| GatewayError::Protocol(format!("confirmation has no `{name}`")))
        };
        let rescode = field("RESCODE")?;
        let repeat = field("REPETETIVE")?;
        let amount = field("AMOUNT")?;
        let date = field("DATE")?;
        let time = field("TIME")?;
        let trn = field("TRN")?;
        let stan = field("STAN")?;

        let signed = format!("{rescode}{repeat}{amount}{date}{time}{trn}{stan}");
        if !self.keys.verify(&signed, field("SIGNATURE")?) {
            return Err(CryptoError::InvalidSignature("confirmation").into());
        }

        // DATE carries no year; a payment confirmed across New Year gets the new one.
        let year = chrono::Local::now().format("%Y");
        let mut verification = Verification::with_reference(trn);
        if let Some(description) = result.field_text("description").filter(|d| !d.is_empty()) {
            verification = verification.extra("description", description);
        }
        Ok(verification
            .extra("stan", stan)
            .extra("repeat", repeat)
            .extra("server_paid_at", format!("{year}{date} {time}")))
    }
}

#[async_trait]
impl GatewayProtocol for Saderat {
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
        let request = SoapRequest::new("reservation").namespace(NAMESPACE).nested(
            "Token_param",
            SoapValue::structure([
                ("AMOUNT", self.encrypt(&params.amount()?.to_string())?),
                ("CRN", self.encrypt(&params.value("order_id")?)?),
                ("MID", self.encrypt(&self.credential("MID")?)?),
                ("REFERALADRESS", self.encrypt(&params.value("redirect_url")?)?),
                ("SIGNATURE", self.signature(SignAction::Token, params)?),
                ("TID", self.encrypt(&self.credential("TID")?)?),
                (
                    "Payload",
                    SoapValue::text(tx.description.clone().unwrap_or_default()),
                ),
            ]),
        );

        debug!(tx = tx.id, wsdl = self.token_wsdl, "reservation call");
        let response = self.transport.call(self.token_wsdl, request).await?;
        let result = response
            .get("return")
            .ok_or_else(|| GatewayError::Protocol("reservation has no `return`".to_string()))?;

        let token = result.field_text("token").unwrap_or_default();
        let code = result.field_text("result").unwrap_or("0").trim();
        info!(tx = tx.id, result = code, "reservation response");
        if code.parse::<i64>().map_or(true, |code| code != 0) {
            warn!(tx = tx.id, result = code, "reservation rejected");
            return Err(GatewayError::Business {
                code: code.to_string(),
                message: token.to_string(),
            });
        }

        let signature = result
            .field_text("signature")
            .ok_or_else(|| GatewayError::Protocol("reservation has no `signature`".to_string()))?;
        if !self.keys.verify(token, signature) {
            return Err(CryptoError::InvalidSignature("token").into());
        }
        Ok(token.to_string())
    }

    fn redirect_form(&self, _params: &ParameterBag, token: Option<&str>) -> Result<RedirectForm> {
        let token = token.ok_or_else(|| GatewayError::MissingParameter("token".to_string()))?;
        Ok(RedirectForm::post(self.endpoint).field("token", token))
    }

    fn can_continue_with_callback_parameters(&self, params: &ParameterBag) -> bool {
        params.field("RESCODE").as_deref() == Some("00")
    }

    async fn verify(&self, params: &ParameterBag, tx: &Transaction) -> Result<Verification> {
        let request = SoapRequest::new("sendConfirmation").namespace(NAMESPACE).nested(
            "SaleConf_req",
            SoapValue::structure([
                ("MID", self.encrypt(&self.credential("MID")?)?),
                ("CRN", self.encrypt(&params.value("CRN")?)?),
                ("TRN", self.encrypt(&params.value("TRN")?)?),
                ("SIGNATURE", self.signature(SignAction::Verify, params)?),
            ]),
        );

        debug!(tx = tx.id, wsdl = self.verify_wsdl, "sendConfirmation call");
        let response = self.transport.call(self.verify_wsdl, request).await?;
        let result = response
            .get("return")
            .ok_or_else(|| GatewayError::Protocol("confirmation has no `return`".to_string()))?;
        let rescode = result
            .field_text("RESCODE")
            .ok_or_else(|| GatewayError::Protocol("confirmation has no `RESCODE`".to_string()))?
            .trim();
        info!(tx = tx.id, rescode, "sendConfirmation response");

        let successful = matches!(result.field_text("successful").map(str::trim), Some("true" | "1"));
        match rescode.parse::<i64>() {
            Ok(0) if successful => self.accept_confirmation(result),
            Ok(ALREADY_VERIFIED) => Ok(Verification {
                already_verified: true,
                ..Verification::default()
            }),
            Ok(code) if code > 0 => Err(GatewayError::business(rescode)),
            Ok(code) if code < 0 => Err(GatewayError::business((900 + code.abs()).to_string())),
            _ => Err(GatewayError::Protocol(format!(
                "unexpected confirmation code `{rescode}`"
            ))),
        }
    }

    fn as_sign_source(&self) -> Option<&dyn SignSource> {
        Some(self)
    }
}

impl SignSource for Saderat {
    fn sign_source(&self, action: SignAction, params: &ParameterBag) -> Result<String> {
        let mid = self.credential("MID")?;
        Ok(match action {
            SignAction::Token => format!(
                "{}{}{}{}{}",
                params.amount()?,
                params.value("order_id")?,
                mid,
                params.value("redirect_url")?,
                self.credential("TID")?,
            ),
            SignAction::Verify => {
                format!("{}{}{}", mid, params.value("TRN")?, params.value("CRN")?)
            }
        })
    }
}
