//! SOAP 1.1 over HTTP: envelope encoding, response decoding and WSDL address discovery.

use crate::domain::ports::SoapTransport;
use crate::domain::soap::{SoapRequest, SoapValue};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use reqwest::header::CONTENT_TYPE;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

const SOAP_ENV_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// HTTP transport. Each `call` is exactly one POST; nothing is retried.
pub struct HttpSoapTransport {
    client: reqwest::Client,
    addresses: RwLock<HashMap<String, String>>,
}

impl HttpSoapTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("could not build HTTP client: {e}")))?;
        Ok(Self {
            client,
            addresses: RwLock::new(HashMap::new()),
        })
    }

    /// The service URL declared by the WSDL, cached per WSDL URL.
    ///
    /// A failed fetch is a `Transport` error. A WSDL without `soap:address`
    /// falls back to the URL without its `?wsdl` query for this call only;
    /// only discovered addresses are cached.
    async fn service_address(&self, wsdl: &str) -> Result<String> {
        if let Some(address) = self.addresses.read().await.get(wsdl) {
            return Ok(address.clone());
        }

        let response = self.client.get(wsdl).send().await.map_err(|e| {
            warn!(wsdl, error = %e, "WSDL fetch failed");
            GatewayError::transport(e.status().map(|s| s.as_u16()).unwrap_or(0), e.to_string())
        })?;
        let status = response.status();
        if !status.is_success() {
            warn!(wsdl, status = %status, "WSDL fetch failed");
            return Err(GatewayError::transport(
                status.as_u16(),
                format!("could not fetch WSDL {wsdl}"),
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::transport(status.as_u16(), e.to_string()))?;

        match parse_wsdl_address(&body) {
            Some(address) => {
                self.addresses
                    .write()
                    .await
                    .insert(wsdl.to_string(), address.clone());
                Ok(address)
            }
            None => {
                warn!(wsdl, "WSDL declares no soap:address");
                Ok(strip_wsdl_query(wsdl))
            }
        }
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    async fn call(&self, wsdl: &str, request: SoapRequest) -> Result<SoapValue> {
        let address = self.service_address(wsdl).await?;
        let body = envelope(&request)?;
        debug!(address = %address, operation = %request.operation, "soap call");

        let response = self
            .client
            .post(&address)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", format!("\"{}\"", request.soap_action()))
            .body(body)
            .send()
            .await
            .map_err(|e| {
                GatewayError::transport(e.status().map(|s| s.as_u16()).unwrap_or(0), e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::transport(status.as_u16(), e.to_string()))?;

        // Faults usually come back as HTTP 500 with a regular envelope.
        match parse_response(&text) {
            Ok(value) if status.is_success() => Ok(value),
            Err(fault @ GatewayError::Transport { .. }) => Err(fault),
            Err(err) if status.is_success() => Err(err),
            _ => Err(GatewayError::transport(
                status.as_u16(),
                text.chars().take(200).collect::<String>(),
            )),
        }
    }
}

/// Builds a SOAP 1.1 envelope for the request.
pub fn envelope(request: &SoapRequest) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    let mut root = BytesStart::new("soapenv:Envelope");
    root.push_attribute(("xmlns:soapenv", SOAP_ENV_NS));
    write(&mut writer, Event::Start(root))?;
    write(&mut writer, Event::Start(BytesStart::new("soapenv:Body")))?;

    let operation = match request.namespace {
        Some(_) => format!("ns1:{}", request.operation),
        None => request.operation.clone(),
    };
    let mut start = BytesStart::new(operation.as_str());
    if let Some(ns) = request.namespace.as_deref() {
        start.push_attribute(("xmlns:ns1", ns));
    }
    write(&mut writer, Event::Start(start))?;
    for (name, value) in &request.params {
        write_value(&mut writer, name, value)?;
    }
    write(&mut writer, Event::End(BytesEnd::new(operation.as_str())))?;

    write(&mut writer, Event::End(BytesEnd::new("soapenv:Body")))?;
    write(&mut writer, Event::End(BytesEnd::new("soapenv:Envelope")))?;

    String::from_utf8(writer.into_inner()).map_err(|e| GatewayError::Protocol(e.to_string()))
}

fn write_value(writer: &mut Writer<Vec<u8>>, name: &str, value: &SoapValue) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    match value {
        SoapValue::Text(text) => write(writer, Event::Text(BytesText::new(text)))?,
        SoapValue::Struct(fields) => {
            for (child, child_value) in fields {
                write_value(writer, child, child_value)?;
            }
        }
    }
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| GatewayError::Protocol(format!("could not encode envelope: {e}")))
}

struct Frame {
    name: String,
    children: Vec<(String, SoapValue)>,
    text: String,
}

impl Frame {
    fn new(name: String) -> Self {
        Self {
            name,
            children: Vec::new(),
            text: String::new(),
        }
    }

    fn into_value(self) -> (String, SoapValue) {
        let value = if self.children.is_empty() {
            SoapValue::Text(self.text)
        } else {
            SoapValue::Struct(self.children)
        };
        (self.name, value)
    }
}

/// Decodes a response envelope into the content of its response element.
/// A `Fault` body becomes a `Transport` error carrying faultcode/faultstring.
pub fn parse_response(xml: &str) -> Result<SoapValue> {
    let (name, document) = parse_document(xml)?;
    if name != "Envelope" {
        return Err(GatewayError::Protocol(format!("unexpected root element `{name}`")));
    }
    let body = document
        .get("Body")
        .ok_or_else(|| GatewayError::Protocol("envelope has no body".to_string()))?;

    match body {
        SoapValue::Struct(children) => {
            let (name, value) = &children[0];
            if name == "Fault" {
                return Err(GatewayError::transport(
                    value.field_text("faultcode").unwrap_or("soap:Server"),
                    value.field_text("faultstring").unwrap_or_default(),
                ));
            }
            Ok(value.clone())
        }
        SoapValue::Text(_) => Err(GatewayError::Protocol("empty SOAP body".to_string())),
    }
}

fn parse_document(xml: &str) -> Result<(String, SoapValue)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| GatewayError::Protocol(format!("malformed XML: {e}")))?;
        match event {
            Event::Start(e) => stack.push(Frame::new(local_name(&e))),
            Event::Empty(e) => {
                let element = Frame::new(local_name(&e)).into_value();
                attach(&mut stack, &mut root, element);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| GatewayError::Protocol(format!("malformed XML text: {e}")))?;
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| GatewayError::Protocol("unbalanced XML".to_string()))?;
                attach(&mut stack, &mut root, frame.into_value());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| GatewayError::Protocol("empty XML document".to_string()))
}

fn attach(stack: &mut [Frame], root: &mut Option<(String, SoapValue)>, element: (String, SoapValue)) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => *root = Some(element),
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

/// `location` of the first `soap:address` (or `soap12:address`) element.
pub fn parse_wsdl_address(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"address" => {
                if let Ok(Some(attr)) = e.try_get_attribute("location") {
                    return attr.unescape_value().ok().map(|v| v.into_owned());
                }
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Fallback service URL: the WSDL URL without its `?wsdl` query.
pub fn strip_wsdl_query(wsdl: &str) -> String {
    match wsdl.rfind('?') {
        Some(idx) if wsdl[idx + 1..].eq_ignore_ascii_case("wsdl") => wsdl[..idx].to_string(),
        _ => wsdl.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_envelope_nests_params() {
        let request = SoapRequest::new("reservation")
            .namespace("http://interfaces.core.sw.bps.com/")
            .nested(
                "Token_param",
                SoapValue::structure([
                    ("AMOUNT", SoapValue::text("a&b")),
                    ("Payload", SoapValue::text("")),
                ]),
            );
        let xml = envelope(&request).unwrap();
        assert!(xml.starts_with("<soapenv:Envelope xmlns:soapenv="));
        assert!(xml.contains(
            "<ns1:reservation xmlns:ns1=\"http://interfaces.core.sw.bps.com/\"><Token_param><AMOUNT>a&amp;b</AMOUNT><Payload></Payload></Token_param></ns1:reservation>"
        ));
    }

    #[test]
    fn test_parse_response_returns_response_element_content() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
            <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
              <soap:Body>
                <ns2:PaymentRequestResponse xmlns:ns2="http://zarinpal.com/">
                  <Status>100</Status>
                  <Authority>000000000000000000000000000012345</Authority>
                </ns2:PaymentRequestResponse>
              </soap:Body>
            </soap:Envelope>"#;
        let value = parse_response(xml).unwrap();
        assert_eq!(value.field_text("Status"), Some("100"));
        assert_eq!(
            value.field_text("Authority"),
            Some("000000000000000000000000000012345")
        );
    }

    #[test]
    fn test_parse_response_handles_nested_and_empty_elements() {
        let xml = r#"<S:Envelope xmlns:S="http://schemas.xmlsoap.org/soap/envelope/"><S:Body>
            <ns2:sendConfirmationResponse><return><RESCODE>00</RESCODE><description/></return></ns2:sendConfirmationResponse>
            </S:Body></S:Envelope>"#;
        let value = parse_response(xml).unwrap();
        let ret = value.get("return").unwrap();
        assert_eq!(ret.field_text("RESCODE"), Some("00"));
        assert_eq!(ret.field_text("description"), Some(""));
    }

    #[test]
    fn test_fault_becomes_transport_error() {
        let xml = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
            <soap:Fault><faultcode>soap:Client</faultcode><faultstring>Invalid MID</faultstring></soap:Fault>
            </soap:Body></soap:Envelope>"#;
        let err = parse_response(xml).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transport { code, message } if code == "soap:Client" && message == "Invalid MID"
        ));
    }

    #[test]
    fn test_malformed_xml_is_protocol_error() {
        assert!(matches!(
            parse_response("<Envelope><Body>"),
            Err(GatewayError::Protocol(_))
        ));
        assert!(matches!(
            parse_response("<html>oops</html>"),
            Err(GatewayError::Protocol(_))
        ));
    }

    #[test]
    fn test_wsdl_address_discovery() {
        let wsdl = r#"<definitions xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/">
            <service name="WebGate"><port name="p">
            <soap:address location="https://www.zarinpal.com/pg/services/WebGate/service"/>
            </port></service></definitions>"#;
        assert_eq!(
            parse_wsdl_address(wsdl).as_deref(),
            Some("https://www.zarinpal.com/pg/services/WebGate/service")
        );
        assert_eq!(parse_wsdl_address("<definitions/>"), None);
    }

    #[test]
    fn test_strip_wsdl_query() {
        assert_eq!(
            strip_wsdl_query("https://sep.shaparak.ir/payments/referencepayment.asmx?WSDL"),
            "https://sep.shaparak.ir/payments/referencepayment.asmx"
        );
        assert_eq!(strip_wsdl_query("https://host/ws"), "https://host/ws");
    }

    #[tokio::test]
    async fn test_http_call_posts_envelope_to_wsdl_address() {
        let server = MockServer::start_async().await;
        let wsdl_body = format!(
            r#"<definitions xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"><soap:address location="{}"/></definitions>"#,
            server.url("/service")
        );
        let wsdl = server
            .mock_async(|when, then| {
                when.method(GET).path("/ws");
                then.status(200).body(wsdl_body);
            })
            .await;
        let call = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/service")
                    .header("SOAPAction", "\"urn:Foo/RequestToken\"")
                    .body_contains("<TermID>M-1</TermID>");
                then.status(200).body(
                    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><RequestTokenResponse><result>tok-1234567890</result></RequestTokenResponse></soap:Body></soap:Envelope>"#,
                );
            })
            .await;

        let transport = HttpSoapTransport::new(Duration::from_secs(5)).unwrap();
        let request = SoapRequest::new("RequestToken")
            .namespace("urn:Foo")
            .param("TermID", "M-1");
        let wsdl_url = server.url("/ws?wsdl");

        let value = transport.call(&wsdl_url, request.clone()).await.unwrap();
        assert_eq!(value.as_text(), Some("tok-1234567890"));
        transport.call(&wsdl_url, request).await.unwrap();

        wsdl.assert_async().await;
        call.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_http_fault_is_not_retried() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/ws");
                then.status(200).body("<definitions/>");
            })
            .await;
        let call = server
            .mock_async(|when, then| {
                when.method(POST).path("/ws");
                then.status(500).body(
                    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Server</faultcode><faultstring>down</faultstring></soap:Fault></soap:Body></soap:Envelope>"#,
                );
            })
            .await;

        let transport = HttpSoapTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport
            .call(&server.url("/ws?wsdl"), SoapRequest::new("Ping"))
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Transport { code, .. } if code == "soap:Server"));
        call.assert_hits_async(1).await;
    }

    #[tokio::test]
    async fn test_failed_wsdl_fetch_is_transport_error_and_not_cached() {
        let server = MockServer::start_async().await;
        let mut unavailable = server
            .mock_async(|when, then| {
                when.method(GET).path("/WebGate/wsdl");
                then.status(503);
            })
            .await;
        let posted_to_wsdl = server
            .mock_async(|when, then| {
                when.method(POST).path("/WebGate/wsdl");
                then.status(200);
            })
            .await;

        let transport = HttpSoapTransport::new(Duration::from_secs(5)).unwrap();
        let wsdl_url = server.url("/WebGate/wsdl");
        let err = transport
            .call(&wsdl_url, SoapRequest::new("PaymentRequest"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport { code, .. } if code == "503"));
        unavailable.assert_hits_async(1).await;
        unavailable.delete_async().await;

        let wsdl_body = format!(
            r#"<definitions xmlns:soap="http://schemas.xmlsoap.org/wsdl/soap/"><soap:address location="{}"/></definitions>"#,
            server.url("/service")
        );
        let recovered = server
            .mock_async(|when, then| {
                when.method(GET).path("/WebGate/wsdl");
                then.status(200).body(wsdl_body);
            })
            .await;
        let service = server
            .mock_async(|when, then| {
                when.method(POST).path("/service");
                then.status(200).body(
                    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><PaymentRequestResponse><Status>100</Status></PaymentRequestResponse></soap:Body></soap:Envelope>"#,
                );
            })
            .await;

        let value = transport
            .call(&wsdl_url, SoapRequest::new("PaymentRequest"))
            .await
            .unwrap();
        assert_eq!(value.field_text("Status"), Some("100"));
        recovered.assert_hits_async(1).await;
        service.assert_hits_async(1).await;
        posted_to_wsdl.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn test_wsdl_without_address_falls_back_per_call() {
        let server = MockServer::start_async().await;
        let wsdl = server
            .mock_async(|when, then| {
                when.method(GET).path("/ws");
                then.status(200).body("<definitions/>");
            })
            .await;
        let call = server
            .mock_async(|when, then| {
                when.method(POST).path("/ws");
                then.status(200).body(
                    r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><PingResponse><result>1</result></PingResponse></soap:Body></soap:Envelope>"#,
                );
            })
            .await;

        let transport = HttpSoapTransport::new(Duration::from_secs(5)).unwrap();
        let wsdl_url = server.url("/ws?wsdl");
        transport.call(&wsdl_url, SoapRequest::new("Ping")).await.unwrap();
        transport.call(&wsdl_url, SoapRequest::new("Ping")).await.unwrap();

        wsdl.assert_hits_async(2).await;
        call.assert_hits_async(2).await;
    }
}
