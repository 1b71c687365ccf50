//! Wire model for SOAP-style RPC calls, independent of the HTTP/XML transport.

/// A decoded SOAP value: either character data or an ordered list of child elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoapValue {
    Text(String),
    Struct(Vec<(String, SoapValue)>),
}

impl SoapValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn structure<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, SoapValue)>,
        K: Into<String>,
    {
        Self::Struct(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// First child element with the given name.
    pub fn get(&self, name: &str) -> Option<&SoapValue> {
        match self {
            Self::Struct(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            Self::Text(_) => None,
        }
    }

    /// Character data of this value. A struct holding exactly one child
    /// (the usual `<return>` wrapper of single-part responses) is unwrapped.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Struct(fields) if fields.len() == 1 => fields[0].1.as_text(),
            Self::Struct(_) => None,
        }
    }

    pub fn field_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SoapValue::as_text)
    }
}

/// An RPC call: the operation element and its ordered child parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub operation: String,
    pub namespace: Option<String>,
    pub params: Vec<(String, SoapValue)>,
}

impl SoapRequest {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            namespace: None,
            params: Vec::new(),
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), SoapValue::Text(value.into())));
        self
    }

    pub fn nested(mut self, name: impl Into<String>, value: SoapValue) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Value of the `SOAPAction` header.
    pub fn soap_action(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if ns.ends_with('/') || ns.ends_with('#') => {
                format!("{ns}{}", self.operation)
            }
            Some(ns) => format!("{ns}/{}", self.operation),
            None => self.operation.clone(),
        }
    }

    /// Text parameter lookup, used mostly by tests inspecting recorded calls.
    pub fn param_text(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_text())
    }
}
