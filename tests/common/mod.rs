#![allow(dead_code)]

use async_trait::async_trait;
use bankgate::domain::params::ParameterBag;
use bankgate::domain::ports::SoapTransport;
use bankgate::domain::soap::{SoapRequest, SoapValue};
use bankgate::domain::transaction::{Amount, Phase, Transaction};
use bankgate::error::{GatewayError, Result};
use bankgate::infrastructure::crypto::RsaKeyPair;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::pkcs8::EncodePublicKey;
use rsa::rand_core::OsRng;
use rsa::RsaPrivateKey;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use tempfile::TempDir;

pub const AMOUNT: u64 = 1000;
pub const ORDER_ID: &str = "ORD-1";
pub const REDIRECT_URL: &str = "https://shop.example/callback";

/// Scripted transport: answers calls in order and records every request.
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<SoapValue>>>,
    calls: Mutex<Vec<(String, SoapRequest)>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, value: SoapValue) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub fn fail(&self, error: GatewayError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<(String, SoapRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> (String, SoapRequest) {
        self.calls().pop().expect("no transport call was made")
    }
}

#[async_trait]
impl SoapTransport for MockTransport {
    async fn call(&self, wsdl: &str, request: SoapRequest) -> Result<SoapValue> {
        self.calls.lock().unwrap().push((wsdl.to_string(), request));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(GatewayError::transport("0", "no scripted response")))
    }
}

/// A `<xResponse><return>...</return></xResponse>` body with text children.
pub fn return_struct(fields: &[(&str, &str)]) -> SoapValue {
    SoapValue::structure([("return", fields_struct(fields))])
}

pub fn fields_struct(fields: &[(&str, &str)]) -> SoapValue {
    SoapValue::structure(fields.iter().map(|(k, v)| (*k, SoapValue::text(*v))))
}

/// A single-part response such as `<RequestTokenResult>...</RequestTokenResult>`.
pub fn single(name: &str, text: &str) -> SoapValue {
    SoapValue::structure([(name, SoapValue::text(text))])
}

/// Text of `field` inside the nested parameter `parent` of a recorded request.
pub fn nested_text<'a>(request: &'a SoapRequest, parent: &str, field: &str) -> Option<&'a str> {
    request
        .params
        .iter()
        .find(|(name, _)| name == parent)
        .and_then(|(_, value)| value.field_text(field))
}

pub fn private_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut OsRng, 1024).expect("key generation"))
}

/// One key pair standing in for both the gateway and the merchant.
pub fn key_pair() -> RsaKeyPair {
    let private = private_key().clone();
    RsaKeyPair::new(private.to_public_key(), private)
}

/// PEM files for the test key pair; removed when dropped.
pub struct KeyFiles {
    _dir: TempDir,
    pub public: PathBuf,
    pub private: PathBuf,
}

pub fn key_files() -> KeyFiles {
    let dir = tempfile::tempdir().unwrap();
    let public = dir.path().join("public.pem");
    let private = dir.path().join("private.pem");
    let key = private_key();
    let public_pem = key.to_public_key().to_public_key_pem(LineEnding::LF).unwrap();
    let private_pem = key.to_pkcs1_pem(LineEnding::LF).unwrap();
    std::fs::write(&public, public_pem).unwrap();
    std::fs::write(&private, private_pem.as_bytes()).unwrap();
    KeyFiles {
        _dir: dir,
        public,
        private,
    }
}

pub fn transaction(gateway: &str) -> Transaction {
    Transaction::new(1, Amount::new(AMOUNT).unwrap(), ORDER_ID, REDIRECT_URL, gateway)
}

/// A transaction the user has been sent to the bank for.
pub fn redirected(gateway: &str, reference: Option<&str>) -> Transaction {
    let mut tx = transaction(gateway);
    tx.reference_id = reference.map(str::to_string);
    tx.advance(Phase::Redirected).unwrap();
    tx
}

/// A transaction that already passed verification.
pub fn verified(gateway: &str, reference: Option<&str>) -> Transaction {
    let mut tx = redirected(gateway, reference);
    tx.mark_verified(chrono::Utc::now()).unwrap();
    tx
}

/// Drops a field from the bag, whether it is a common field or a callback one.
pub fn remove_field(params: &mut ParameterBag, field: &str) {
    match field {
        "amount" => params.amount = None,
        "order_id" => params.order_id = None,
        "redirect_url" => params.redirect_url = None,
        "description" => params.description = None,
        other => {
            params.extra.remove(other);
        }
    }
}
