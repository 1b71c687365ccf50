use super::params::{FieldSource, ParameterBag};
use super::transaction::Transaction;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Which side of a gateway's endpoint pair an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Production,
    Sandbox,
}

impl FromStr for Mode {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" => Ok(Mode::Production),
            "sandbox" | "development" | "test" => Ok(Mode::Sandbox),
            other => Err(GatewayError::Config(format!("unknown mode `{other}`"))),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// A production/sandbox pair of fixed URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPair {
    pub production: &'static str,
    pub sandbox: &'static str,
}

impl EndpointPair {
    pub const fn new(production: &'static str, sandbox: &'static str) -> Self {
        Self {
            production,
            sandbox,
        }
    }

    pub fn resolve(&self, mode: Mode) -> &'static str {
        match mode {
            Mode::Production => self.production,
            Mode::Sandbox => self.sandbox,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RequestToken,
    GenerateForm,
    Callback,
    Verify,
    Reverse,
    ReferenceId,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::RequestToken => "request payment",
            Operation::GenerateForm => "generate form",
            Operation::Callback => "accept callback",
            Operation::Verify => "verify payment",
            Operation::Reverse => "reverse payment",
            Operation::ReferenceId => "read reference id",
        })
    }
}

/// Static metadata of one gateway.
#[derive(Debug)]
pub struct GatewayDescriptor {
    pub name: &'static str,
    pub wsdl: EndpointPair,
    pub redirect: EndpointPair,
    pub supports_reverse: bool,
    pub required: &'static [(Operation, &'static [&'static str])],
}

impl GatewayDescriptor {
    pub fn required_fields(&self, operation: Operation) -> &'static [&'static str] {
        self.required
            .iter()
            .find(|(op, _)| *op == operation)
            .map(|(_, fields)| *fields)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FormMethod {
    Get,
    Post,
}

/// Where to send the end user and what to post along. Rendering is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedirectForm {
    pub endpoint: String,
    pub method: FormMethod,
    pub fields: BTreeMap<String, String>,
}

impl RedirectForm {
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: FormMethod::Post,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: FormMethod::Get,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// What a successful verification tells the lifecycle to record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verification {
    pub reference_id: Option<String>,
    pub extras: Vec<(String, String)>,
    /// The gateway reported the payment as verified by an earlier call.
    pub already_verified: bool,
}

impl Verification {
    pub fn with_reference(reference_id: impl Into<String>) -> Self {
        Self {
            reference_id: Some(reference_id.into()),
            ..Self::default()
        }
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.push((key.into(), value.into()));
        self
    }
}

/// Protocol mapping every gateway adapter provides. Lifecycle gating and
/// required-field checks happen in the flow before any of these run.
#[async_trait]
pub trait GatewayProtocol: Send + Sync {
    fn descriptor(&self) -> &'static GatewayDescriptor;

    fn mode(&self) -> Mode;

    /// Gateway credentials, consulted alongside the parameter bag for required fields.
    fn credentials(&self) -> &dyn FieldSource;

    /// Whether the redirect needs a token from `request_token` first.
    fn issues_token(&self) -> bool {
        true
    }

    async fn request_token(&self, params: &ParameterBag, tx: &Transaction) -> Result<String>;

    fn redirect_form(&self, params: &ParameterBag, token: Option<&str>) -> Result<RedirectForm>;

    fn can_continue_with_callback_parameters(&self, params: &ParameterBag) -> bool;

    async fn verify(&self, params: &ParameterBag, tx: &Transaction) -> Result<Verification>;

    fn as_reversible(&self) -> Option<&dyn Reversible> {
        None
    }

    fn as_sign_source(&self) -> Option<&dyn SignSource> {
        None
    }
}

/// Optional capability: voiding a verified payment.
#[async_trait]
pub trait Reversible: Send + Sync {
    async fn reverse(&self, params: &ParameterBag, tx: &Transaction) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignAction {
    Token,
    Verify,
}

/// Optional capability: the canonical plaintext a signature is computed over.
pub trait SignSource {
    fn sign_source(&self, action: SignAction, params: &ParameterBag) -> Result<String>;
}
