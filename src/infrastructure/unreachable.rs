use crate::domain::ports::{SoapTransport, SoapTransportRef};
use crate::domain::soap::{SoapRequest, SoapValue};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport for unit tests that must never reach the network.
pub(crate) struct Unreachable;

impl Unreachable {
    pub(crate) fn transport() -> SoapTransportRef {
        Arc::new(Unreachable)
    }
}

#[async_trait]
impl SoapTransport for Unreachable {
    async fn call(&self, wsdl: &str, _: SoapRequest) -> Result<SoapValue> {
        Err(GatewayError::transport("0", format!("no route to {wsdl}")))
    }
}
