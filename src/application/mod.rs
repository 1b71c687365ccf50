//! Application layer: the payment lifecycle and the gateway adapters it drives.
//!
//! `PaymentFlow` is the entry point. It gates every operation on the
//! transaction phase and the gateway's required fields before handing the
//! call to an adapter from `gateways`.

pub mod flow;
pub mod gateways;
pub mod record;
