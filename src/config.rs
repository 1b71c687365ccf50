//! File-based settings: global mode, the enabled gateways and their credentials.

use crate::application::gateways::saderat::{Saderat, SaderatConfig};
use crate::application::gateways::saman::{Saman, SamanConfig};
use crate::application::gateways::zarinpal::{Zarinpal, ZarinpalConfig};
use crate::application::gateways::{self, saderat, saman, zarinpal};
use crate::domain::gateway::{GatewayDescriptor, GatewayProtocol, Mode};
use crate::domain::ports::SoapTransportRef;
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl TransportSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub gateways: Vec<String>,
    pub saderat: Option<SaderatConfig>,
    pub saman: Option<SamanConfig>,
    pub zarinpal: Option<ZarinpalConfig>,
    #[serde(default)]
    pub transport: TransportSettings,
}

impl Settings {
    /// Reads a TOML file. Relative key paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut settings = Self::parse(&contents)?;
        if let (Some(saderat), Some(base)) = (settings.saderat.as_mut(), path.parent()) {
            if saderat.public_key_path.is_relative() {
                saderat.public_key_path = base.join(&saderat.public_key_path);
            }
            if saderat.private_key_path.is_relative() {
                saderat.private_key_path = base.join(&saderat.private_key_path);
            }
        }
        Ok(settings)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(contents)
            .map_err(|e| GatewayError::Config(format!("invalid settings: {e}")))?;
        for name in &settings.gateways {
            if gateways::descriptor(name).is_none() {
                return Err(GatewayError::Config(format!("unknown gateway `{name}`")));
            }
        }
        Ok(settings)
    }

    /// Descriptors of the enabled gateways, in configured order.
    pub fn enabled(&self) -> impl Iterator<Item = &'static GatewayDescriptor> + '_ {
        self.gateways.iter().filter_map(|name| gateways::descriptor(name))
    }

    /// Builds the adapter for an enabled gateway.
    pub fn build_gateway(
        &self,
        name: &str,
        transport: SoapTransportRef,
    ) -> Result<Box<dyn GatewayProtocol>> {
        if !self.gateways.iter().any(|enabled| enabled == name) {
            return Err(GatewayError::Config(format!("gateway `{name}` is not enabled")));
        }
        let missing = || GatewayError::Config(format!("gateway `{name}` has no [{name}] section"));

        let gateway: Box<dyn GatewayProtocol> = match name {
            n if n == saderat::DESCRIPTOR.name => {
                let config = self.saderat.clone().ok_or_else(missing)?;
                Box::new(Saderat::new(config, self.mode, transport)?)
            }
            n if n == saman::DESCRIPTOR.name => {
                let config = self.saman.clone().ok_or_else(missing)?;
                Box::new(Saman::new(config, self.mode, transport))
            }
            n if n == zarinpal::DESCRIPTOR.name => {
                let config = self.zarinpal.clone().ok_or_else(missing)?;
                Box::new(Zarinpal::new(config, self.mode, transport))
            }
            other => return Err(GatewayError::Config(format!("unknown gateway `{other}`"))),
        };
        tracing::debug!(gateway = name, mode = ?self.mode, "gateway adapter built");
        Ok(gateway)
    }
}
