use crate::domain::gateway::Operation;
use crate::domain::transaction::Phase;
use crate::infrastructure::crypto::CryptoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("missing required parameter `{0}`")]
    MissingParameter(String),
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },
    #[error("transport failure #{code}: {message}")]
    Transport { code: String, message: String },
    #[error("gateway rejected the request with code {code}: {message}")]
    Business { code: String, message: String },
    #[error("invalid gateway response: {0}")]
    Protocol(String),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("could not {operation} while transaction is {phase}")]
    InvalidPhase { operation: Operation, phase: Phase },
    #[error("illegal phase transition from {from} to {to}")]
    IllegalTransition { from: Phase, to: Phase },
    #[error("reference id already set to `{0}`")]
    ReferenceAlreadySet(String),
    #[error("could not reverse payment")]
    CouldNotReverse,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Builds a business rejection whose message is the native code itself.
    pub fn business(code: impl Into<String>) -> Self {
        let code = code.into();
        Self::Business {
            message: code.clone(),
            code,
        }
    }

    pub fn transport(code: impl ToString, message: impl Into<String>) -> Self {
        Self::Transport {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// The gateway's native code when this is a business rejection.
    pub fn business_code(&self) -> Option<&str> {
        match self {
            Self::Business { code, .. } => Some(code),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
