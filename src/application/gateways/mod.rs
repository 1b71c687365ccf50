//! One adapter per bank gateway. Each maps the common lifecycle onto its
//! gateway's SOAP operations and callback fields.

pub mod saderat;
pub mod saman;
pub mod zarinpal;

use crate::domain::gateway::GatewayDescriptor;

/// Every gateway this crate can talk to.
pub static ALL: [&GatewayDescriptor; 3] = [
    &saderat::DESCRIPTOR,
    &saman::DESCRIPTOR,
    &zarinpal::DESCRIPTOR,
];

pub fn descriptor(name: &str) -> Option<&'static GatewayDescriptor> {
    ALL.iter().copied().find(|d| d.name == name)
}
